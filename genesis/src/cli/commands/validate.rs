//! Validate command - structural and compliance checks

use crate::cli::{CliContext, OutputFormatter};
use crate::error::{GenesisError, GenesisResult};
use crate::spec::SpecificationValidator;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Specification file (JSON or YAML)
    pub spec: PathBuf,

    /// Run compliance rules on regulated components
    #[arg(long)]
    pub compliance: bool,

    /// Also check component types against a catalog discovered from these trees
    #[arg(short, long, num_args = 1..)]
    pub roots: Vec<PathBuf>,
}

pub async fn execute(ctx: &CliContext, args: ValidateArgs) -> GenesisResult<()> {
    let formatter = OutputFormatter::new(ctx.output_format);
    let document = ctx.read_document(&args.spec)?;

    let mut validator = SpecificationValidator::new();
    if !args.roots.is_empty() {
        ctx.status("Discovering components...");
        validator = validator.with_catalog(Arc::new(ctx.catalog(&args.roots).await));
    }

    let compliance = args.compliance || ctx.config.converter.compliance;
    ctx.status(&format!("Validating {}", args.spec.display()));
    let result = validator.validate(&document, compliance);

    if formatter.is_json() {
        formatter.document(&result)?;
    } else {
        formatter.problems(&result.errors);
        formatter.problems(&result.warnings);
        if result.valid {
            formatter.done(&format!(
                "Specification is valid ({} warning(s))",
                result.warnings.len()
            ));
        }
        if result.compliance_checked {
            formatter.field("Compliant", result.compliant);
        }
    }

    match result.into_outcome() {
        Ok(_) => Ok(()),
        Err(failure) => Err(GenesisError::Pipeline(failure)),
    }
}
