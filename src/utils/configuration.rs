//! Experiment configuration
//!
//! Sectioned configuration for a parsing run, deserializable from a config
//! file layered with `APTA__`-prefixed environment variables. Every
//! inconsistency is rejected with a named field before the pipeline starts.

use crate::core::ReaderType;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Errors raised while loading or validating a configuration
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Validation error: {field} is invalid: {reason}")]
    Validation { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::Validation {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Complete configuration of one parsing run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfiguration {
    pub experiment: ExperimentSection,
    pub cycles: Vec<SelectionCycleSection>,
    pub parser: ParserSection,
    pub performance: PerformanceSection,
}

/// Experiment identity and primer layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentSection {
    pub name: String,
    pub description: Option<String>,
    /// 5' primer, required
    pub primer5: String,
    /// 3' primer; empty in batch mode
    pub primer3: String,
    /// Exact randomized region size; takes precedence over the bounds
    pub randomized_region_size: Option<usize>,
}

/// One selection cycle of the experiment. The position in the `cycles` list
/// doubles as the file index (per-file mode) and the barcode index
/// (multiplexed mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionCycleSection {
    pub name: String,
    pub round: usize,
    pub is_control_selection: bool,
    pub is_counter_selection: bool,
}

impl Default for SelectionCycleSection {
    fn default() -> Self {
        Self {
            name: String::new(),
            round: 0,
            is_control_selection: false,
            is_counter_selection: false,
        }
    }
}

/// Parser behaviour, tolerances and input files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserSection {
    /// File format backend
    pub backend: ReaderType,

    /// Ranged randomized-region size constraint; both or neither
    pub randomized_region_size_lower_bound: Option<usize>,
    pub randomized_region_size_upper_bound: Option<usize>,

    /// Demultiplexed input: one file (pair) per cycle
    pub is_per_file: bool,
    /// Reads are pre-extracted randomized regions; no primer or barcode
    /// handling at all
    pub batch_mode: bool,
    /// Reads contain only the randomized region; primers are added
    /// synthetically
    pub only_randomized_region_in_data: bool,
    /// Store the reverse complement of accepted sequences
    pub store_reverse_complement: bool,
    /// Retry failed reads on their reverse complement
    pub check_reverse_complement: bool,

    /// Comma-separated cycle barcodes adjacent to the primers
    pub barcodes5_prime: Option<String>,
    pub barcodes3_prime: Option<String>,

    /// Maximum primer mismatches
    pub primer_tolerance: u32,
    /// Maximum barcode mismatches
    pub barcode_tolerance: u32,

    /// Paired-end merging parameters
    pub paired_end_min_overlap: usize,
    pub paired_end_max_mutations: u32,
    pub paired_end_max_score_value: u8,

    /// Capacity of the producer/consumer queue
    pub blocking_queue_size: usize,

    pub forward_files: Vec<PathBuf>,
    pub reverse_files: Vec<PathBuf>,
}

impl Default for ParserSection {
    fn default() -> Self {
        Self {
            backend: ReaderType::Fastq,
            randomized_region_size_lower_bound: None,
            randomized_region_size_upper_bound: None,
            is_per_file: true,
            batch_mode: false,
            only_randomized_region_in_data: false,
            store_reverse_complement: false,
            check_reverse_complement: false,
            barcodes5_prime: None,
            barcodes3_prime: None,
            primer_tolerance: 3,
            barcode_tolerance: 1,
            paired_end_min_overlap: 15,
            paired_end_max_mutations: 5,
            paired_end_max_score_value: 55,
            blocking_queue_size: 5000,
            forward_files: Vec::new(),
            reverse_files: Vec::new(),
        }
    }
}

/// Resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSection {
    /// Upper bound on cores used by the pipeline
    pub max_cores: usize,
}

impl Default for PerformanceSection {
    fn default() -> Self {
        Self {
            max_cores: num_cpus::get(),
        }
    }
}

impl ExperimentConfiguration {
    /// Loads the configuration from an optional file layered with
    /// `APTA__`-prefixed environment variables, then validates it.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(Environment::with_prefix("APTA").separator("__"));

        let configuration: ExperimentConfiguration = builder.build()?.try_deserialize()?;
        configuration.validate()?;

        info!(
            experiment = %configuration.experiment.name,
            cycles = configuration.cycles.len(),
            files = configuration.parser.forward_files.len(),
            "configuration loaded"
        );
        Ok(configuration)
    }

    /// Parsed 5' barcode list, in cycle order
    pub fn barcodes5(&self) -> Vec<Vec<u8>> {
        Self::split_barcodes(self.parser.barcodes5_prime.as_deref())
    }

    /// Parsed 3' barcode list, in cycle order
    pub fn barcodes3(&self) -> Vec<Vec<u8>> {
        Self::split_barcodes(self.parser.barcodes3_prime.as_deref())
    }

    fn split_barcodes(raw: Option<&str>) -> Vec<Vec<u8>> {
        raw.map(|list| {
            list.split(',')
                .map(|barcode| barcode.trim().as_bytes().to_vec())
                .filter(|barcode| !barcode.is_empty())
                .collect()
        })
        .unwrap_or_default()
    }

    /// Rejects every inconsistency the pipeline cannot recover from.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let experiment = &self.experiment;
        let parser = &self.parser;

        if experiment.primer5.is_empty() {
            return Err(invalid("experiment.primer5", "5' primer is required"));
        }

        // Without a 3' primer the randomized region has no right anchor, so
        // an exact size is the only way to delimit it
        if experiment.primer3.is_empty() && experiment.randomized_region_size.is_none() {
            return Err(invalid(
                "experiment.primer3",
                "neither 3' primer nor exact randomized region size specified; \
                 at least one is required for extraction",
            ));
        }

        match (
            parser.randomized_region_size_lower_bound,
            parser.randomized_region_size_upper_bound,
        ) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(invalid(
                    "parser.randomized_region_size_lower_bound",
                    "lower and upper bounds must be specified together",
                ));
            }
            (Some(lower), Some(upper)) if lower >= upper => {
                return Err(invalid(
                    "parser.randomized_region_size_lower_bound",
                    format!("lower bound {lower} must be less than upper bound {upper}"),
                ));
            }
            _ => {}
        }

        if parser.forward_files.is_empty() {
            return Err(invalid(
                "parser.forward_files",
                "no forward read files specified",
            ));
        }

        if !parser.reverse_files.is_empty()
            && parser.reverse_files.len() != parser.forward_files.len()
        {
            return Err(invalid(
                "parser.reverse_files",
                format!(
                    "{} reverse files do not match {} forward files",
                    parser.reverse_files.len(),
                    parser.forward_files.len()
                ),
            ));
        }

        if self.cycles.is_empty() {
            return Err(invalid("cycles", "at least one selection cycle is required"));
        }

        let mut names = HashSet::new();
        for cycle in &self.cycles {
            if cycle.name.is_empty() {
                return Err(invalid("cycles.name", "cycle names must be non-empty"));
            }
            if !names.insert(cycle.name.as_str()) {
                return Err(invalid(
                    "cycles.name",
                    format!("duplicate cycle name '{}'", cycle.name),
                ));
            }
        }

        if parser.is_per_file && parser.forward_files.len() > self.cycles.len() {
            return Err(invalid(
                "parser.forward_files",
                "per-file mode requires one cycle per input file",
            ));
        }

        if parser.blocking_queue_size == 0 {
            return Err(invalid(
                "parser.blocking_queue_size",
                "queue capacity must be greater than 0",
            ));
        }

        if self.performance.max_cores == 0 {
            return Err(invalid(
                "performance.max_cores",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}
