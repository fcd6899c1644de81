//! Discover command - scan code trees and publish a catalog

use crate::catalog::{catalog_records, runtime_adapters};
use crate::cli::{CliContext, OutputFormatter};
use crate::error::{ErrorSeverity, GenesisResult};
use clap::Args;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Code trees to scan (defaults to discovery.roots)
    pub roots: Vec<PathBuf>,

    /// Load and introspect candidates one at a time
    #[arg(long)]
    pub sequential: bool,

    /// Worker pool size
    #[arg(short, long, value_name = "N")]
    pub workers: Option<usize>,

    /// Emit persistence-ready catalog records
    #[arg(long, conflicts_with = "adapters")]
    pub records: bool,

    /// Emit runtime adapter records
    #[arg(long)]
    pub adapters: bool,
}

pub async fn execute(ctx: &CliContext, args: DiscoverArgs) -> GenesisResult<()> {
    let formatter = OutputFormatter::new(ctx.output_format);
    let engine = ctx.discovery_engine(args.sequential, args.workers);
    let roots = if args.roots.is_empty() {
        engine.config().roots.clone()
    } else {
        args.roots
    };
    if roots.is_empty() {
        formatter.notice(ErrorSeverity::Error, "No roots given and discovery.roots is empty");
        return Ok(());
    }

    ctx.status(&format!(
        "Discovering components in {} root(s) with {} worker(s)",
        roots.len(),
        engine.config().effective_workers()
    ));
    let catalog = engine.discover(&roots).await;

    if args.records {
        return formatter.document(&catalog_records(&catalog));
    }
    if args.adapters {
        return formatter.document(&runtime_adapters(&catalog, &ctx.config.converter.runtime_type));
    }

    if formatter.is_json() {
        return formatter.document(&catalog);
    }
    formatter.catalog(&catalog);
    Ok(())
}
