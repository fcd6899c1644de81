//! Genesis CLI
//!
//! # Usage
//!
//! ```bash
//! # Scan a code tree and list what was found
//! genesis discover ./components
//!
//! # Persistence-ready catalog records
//! genesis discover ./components --records -o json
//!
//! # Specification to flow graph and back
//! genesis convert to-flow agent.yaml --roots ./components --compliance
//! genesis convert to-spec flow.json --yaml
//!
//! # Validate a specification
//! genesis validate agent.yaml --compliance
//!
//! # Configuration commands
//! genesis config show
//! genesis config validate
//! genesis config init
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use genesis::cli::commands::{
    config::ConfigCommand, convert::ConvertCommand, discover::DiscoverArgs, validate::ValidateArgs,
};
use genesis::cli::{commands, CliContext, OutputFormat};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "genesis")]
#[command(version)]
#[command(about = "Genesis - component discovery and agent specification conversion", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    output_format: OutputFormat,

    /// Suppress status messages
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan code trees for components
    Discover(DiscoverArgs),

    /// Specification / flow graph conversion
    Convert {
        #[command(subcommand)]
        command: ConvertCommand,
    },

    /// Validate a specification
    Validate(ValidateArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let directive = if verbose { "genesis=debug" } else { "genesis=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let mut ctx = match cli.config {
        Some(path) => CliContext::new(path).context("Error loading configuration")?,
        None => CliContext::with_defaults().context("Error initializing context")?,
    };
    ctx.output_format = cli.output_format;
    ctx.quiet = cli.quiet;
    ctx.verbose = cli.verbose;

    let result = match cli.command {
        Commands::Discover(args) => commands::discover::execute(&ctx, args).await,
        Commands::Convert { command } => commands::convert::execute(&ctx, command).await,
        Commands::Validate(args) => commands::validate::execute(&ctx, args).await,
        Commands::Config { command } => commands::config::execute(&ctx, command).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
