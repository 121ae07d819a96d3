//! Configuration and shared utilities

pub mod configuration;

pub use configuration::{ConfigurationError, ExperimentConfiguration};
