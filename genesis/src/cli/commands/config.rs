//! Config command - configuration management

use crate::cli::{CliContext, OutputFormatter};
use crate::config::GenesisConfig;
use crate::error::{ErrorSeverity, GenesisError, GenesisResult};
use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show only a specific section (discovery, cache, resolver, converter)
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate,

    /// Initialize a new configuration file
    Init {
        /// Output path for the configuration file
        #[arg(short = 'p', long, default_value = "genesis.toml")]
        output: String,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },
}

pub async fn execute(ctx: &CliContext, command: ConfigCommand) -> GenesisResult<()> {
    let formatter = OutputFormatter::new(ctx.output_format);

    match &command {
        ConfigCommand::Show { section } => show_config(ctx, section.as_deref(), &formatter),
        ConfigCommand::Validate => validate_config(ctx, &formatter),
        ConfigCommand::Init { output, force } => init_config(output, *force, &formatter),
    }
}

fn show_config(ctx: &CliContext, section: Option<&str>, formatter: &OutputFormatter) -> GenesisResult<()> {
    let config = &ctx.config;
    if formatter.is_json() {
        return match section {
            None => formatter.document(config),
            Some("discovery") => formatter.document(&config.discovery),
            Some("cache") => formatter.document(&config.cache),
            Some("resolver") => formatter.document(&config.resolver),
            Some("converter") => formatter.document(&config.converter),
            Some(other) => {
                formatter.notice(ErrorSeverity::Error, &format!("Unknown section: {}", other));
                formatter.item("Available sections: discovery, cache, resolver, converter");
                Ok(())
            }
        };
    }

    formatter.heading("Configuration");
    formatter.field("Config file", ctx.config_path.display());

    if section.is_none() || section == Some("discovery") {
        let d = &config.discovery;
        formatter.heading("Discovery");
        if d.roots.is_empty() {
            formatter.field("Roots", "(none)");
        } else {
            for root in &d.roots {
                formatter.item(&root.display().to_string());
            }
        }
        formatter.field("Parallel", d.parallel);
        formatter.field("Max workers", d.max_workers);
        formatter.field("Candidate timeout (ms)", d.candidate_timeout_ms);
        formatter.field("Model families", d.model_families.join(", "));
        formatter.field("Variant attribute", &d.variant_attribute);
    }

    if section.is_none() || section == Some("cache") {
        formatter.heading("Cache");
        formatter.field("Default TTL (s)", config.cache.default_ttl_secs);
        formatter.field("Max entries", config.cache.max_entries);
    }

    if section.is_none() || section == Some("resolver") {
        let r = &config.resolver;
        formatter.heading("Resolver");
        formatter.field("Timeout (ms)", r.timeout_ms);
        formatter.field("Max depth", r.max_depth);
        formatter.field("Max serialized bytes", r.max_serialized_bytes);
        formatter.field("Environment variables", r.allow_environment_variables);
    }

    if section.is_none() || section == Some("converter") {
        let c = &config.converter;
        formatter.heading("Converter");
        formatter.field(
            "Deadline (ms)",
            c.deadline_ms.map_or_else(|| "none".to_string(), |d| d.to_string()),
        );
        formatter.field("Compliance", c.compliance);
        formatter.field("Implicit connections", c.implicit_connections);
        formatter.field("Parallel lookup", c.parallel_lookup);
        formatter.field("Runtime type", &c.runtime_type);
    }
    Ok(())
}

fn validate_config(ctx: &CliContext, formatter: &OutputFormatter) -> GenesisResult<()> {
    ctx.status(&format!("Validating configuration: {:?}", ctx.config_path));

    let warnings = ctx.validate_config();
    if warnings.is_empty() {
        formatter.done("Configuration is valid");
    } else {
        formatter.done("Configuration is valid with warnings:");
        for warning in warnings {
            formatter.notice(ErrorSeverity::Warning, &warning);
        }
    }
    Ok(())
}

fn init_config(output: &str, force: bool, formatter: &OutputFormatter) -> GenesisResult<()> {
    let path = std::path::Path::new(output);

    if path.exists() && !force {
        formatter.notice(
            ErrorSeverity::Error,
            &format!("File already exists: {}. Use --force to overwrite.", output),
        );
        return Ok(());
    }

    let body = GenesisConfig::default().to_toml_string()?;
    let content = format!("# Genesis configuration\n# Generated by: genesis config init\n\n{}", body);
    std::fs::write(path, content)
        .map_err(|e| GenesisError::Config(format!("Failed to write config file: {}", e)))?;

    formatter.done(&format!("Created configuration file: {}", output));
    Ok(())
}
