//! Convert command - specification to flow graph and back

use crate::catalog::Catalog;
use crate::cli::{CliContext, OutputFormatter};
use crate::error::{ErrorSeverity, GenesisError, GenesisResult};
use crate::spec::{Converter, FlowGraph};
use clap::Subcommand;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Subcommand)]
pub enum ConvertCommand {
    /// Convert a specification (JSON or YAML) into a flow graph
    ToFlow {
        /// Specification file
        spec: PathBuf,

        /// Code trees to discover components in (defaults to discovery.roots)
        #[arg(short, long, num_args = 1..)]
        roots: Vec<PathBuf>,

        /// Apply regulated-domain checks and overhead
        #[arg(long)]
        compliance: bool,

        /// Infer input/agent/output and tool wiring
        #[arg(long)]
        implicit: bool,

        /// Write the flow graph to a file instead of stdout
        #[arg(short = 'w', long, value_name = "FILE")]
        write: Option<PathBuf>,
    },

    /// Convert a flow graph back into a specification
    ToSpec {
        /// Flow graph file
        flow: PathBuf,

        /// Emit YAML instead of JSON
        #[arg(long)]
        yaml: bool,

        /// Write the specification to a file instead of stdout
        #[arg(short = 'w', long, value_name = "FILE")]
        write: Option<PathBuf>,
    },
}

pub async fn execute(ctx: &CliContext, command: ConvertCommand) -> GenesisResult<()> {
    let formatter = OutputFormatter::new(ctx.output_format);

    match command {
        ConvertCommand::ToFlow {
            spec,
            roots,
            compliance,
            implicit,
            write,
        } => {
            let document = ctx.read_document(&spec)?;
            ctx.status("Discovering components...");
            let catalog = Arc::new(ctx.catalog(&roots).await);
            if catalog.is_empty() {
                formatter.notice(ErrorSeverity::Warning, "Catalog is empty; every component type will be unknown");
            }

            let mut config = ctx.config.clone();
            config.converter.compliance |= compliance;
            config.converter.implicit_connections |= implicit;
            let converter = Converter::new(catalog, &config);

            let result = match converter.spec_to_flow(&document).await {
                Ok(result) => result,
                Err(failure) => {
                    formatter.problems(failure.errors());
                    return Err(GenesisError::Pipeline(failure));
                }
            };

            if let Some(path) = write {
                write_json(&path, &result.flow)?;
                formatter.done(&format!("Wrote flow graph to {}", path.display()));
            } else if formatter.is_json() {
                return formatter.document(&result);
            } else {
                formatter.document(&result.flow)?;
            }

            formatter.problems(&result.warnings);
            formatter.conversion(&result.metrics, &result.memory);
            Ok(())
        }
        ConvertCommand::ToSpec { flow, yaml, write } => {
            let document = ctx.read_document(&flow)?;
            let graph: FlowGraph = serde_json::from_value(document)?;
            let converter = Converter::new(Arc::new(Catalog::default()), &ctx.config);

            let spec = match converter.flow_to_spec(&graph) {
                Ok(spec) => spec,
                Err(failure) => {
                    formatter.problems(failure.errors());
                    return Err(GenesisError::Pipeline(failure));
                }
            };

            let text = if yaml {
                serde_yaml::to_string(&spec)?
            } else {
                serde_json::to_string_pretty(&spec)?
            };
            match write {
                Some(path) => {
                    std::fs::write(&path, text)?;
                    formatter.done(&format!("Wrote specification to {}", path.display()));
                }
                None => println!("{}", text),
            }
            Ok(())
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> GenesisResult<()> {
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text)?;
    Ok(())
}
