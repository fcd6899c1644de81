//! Genesis CLI module
//!
//! # Commands
//!
//! - `discover` - Scan code trees and publish a component catalog
//! - `convert` - Specification to flow graph and back
//! - `validate` - Structural and compliance checks on a specification
//! - `config` - Configuration (show, validate, init)

pub mod commands;
pub mod context;
pub mod output;

pub use context::CliContext;
pub use output::{OutputFormat, OutputFormatter};
