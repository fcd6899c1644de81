//! Component discovery: static scan, load, introspect, consolidate.

pub mod engine;
pub mod introspector;
pub mod loader;
pub mod parser;
pub mod scanner;
pub mod variants;

pub use engine::DiscoveryEngine;
pub use introspector::{genesis_name, infer_category, Introspection, Introspector};
pub use loader::{ComponentLoader, LoadError, LoadedClass, SourceLoader};
pub use scanner::{Candidate, ModuleIndex, ScanResult, StaticScanner};
pub use variants::{canonical_base_name, consolidate, VariantRules};
