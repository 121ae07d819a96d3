//! # AptaForge - SELEX sequencing data parser
//!
//! Converts raw high-throughput sequencing reads from aptamer SELEX
//! experiments into a deduplicated, counted aptamer pool partitioned by
//! selection cycle, together with per-position quality and nucleotide
//! composition metadata.
//!
//! The hot path is a concurrent producer/consumer pipeline: one thread
//! drives the configured file readers, a pool of workers assembles contigs
//! from (optionally paired) reads, anchors primers and barcodes by
//! approximate match, extracts the randomized region and interns it into
//! the shared pool while counting per cycle.

pub mod cli;
pub mod core;
pub mod experiment;
pub mod io;
pub mod parsing;
pub mod report;
pub mod utils;

// Re-export commonly used types at crate level
pub use crate::core::data_structures::*;
pub use crate::experiment::{AptamerPool, Experiment, Metadata, SelectionCycle};
pub use crate::parsing::AptaPlexParser;
pub use crate::utils::configuration::ExperimentConfiguration;

/// Result type used throughout the crate
pub type Result<T> = anyhow::Result<T>;

/// Error type used throughout the crate
pub type Error = anyhow::Error;
