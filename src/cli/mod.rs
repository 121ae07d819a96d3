//! Command line interface types

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "aptaforge",
    version,
    about = "SELEX sequencing data parser and aptamer pool builder"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse sequencing files into an aptamer pool
    Run {
        /// Configuration file (TOML/JSON/YAML); APTA__-prefixed environment
        /// variables override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the experiment overview as JSON to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load and validate a configuration without running the pipeline
    Check {
        /// Configuration file to validate
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
