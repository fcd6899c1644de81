//! CLI commands module

pub mod config;
pub mod convert;
pub mod discover;
pub mod validate;
