//! Genesis: discover reusable components in a code tree and convert
//! declarative agent specifications into executable flow graphs.
//!
//! A discovery run ([`discovery::DiscoveryEngine`]) publishes an immutable
//! [`catalog::Catalog`]. The [`spec::Converter`] consumes it through the
//! [`catalog::MappingSource`] trait to turn specifications into
//! [`spec::FlowGraph`]s and back.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod discovery;
pub mod error;
pub mod spec;

#[cfg(feature = "cli")]
pub mod cli;

pub use cache::{CacheStats, ComponentMappingCache};
pub use catalog::{Catalog, ComponentCategory, ComponentMapping, DiscoveredComponent, MappingSource};
pub use config::GenesisConfig;
pub use discovery::DiscoveryEngine;
pub use error::{ErrorCategory, ErrorResult, Failure, FrameworkError, GenesisError, GenesisResult, Outcome};
pub use spec::{Converter, FlowGraph, ProcessingContext, Specification, SpecificationValidator};
