//! Experiment overview
//!
//! Serializable summary assembled after a run: import statistics, cycle
//! composition, randomized-region size distribution, the pool listing and
//! the metadata snapshot. This is the structure handed to the external
//! layer for persistence; the core does no formatting beyond it.

use crate::core::{AptamerBounds, AptamerId};
use crate::experiment::{Experiment, MetadataSnapshot, SelectionCycle};
use crate::parsing::ProgressSnapshot;
use crate::utils::configuration::ExperimentConfiguration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cutoff separating singleton aptamers from enriched ones
const ENRICHMENT_CUTOFF: u64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentOverview {
    pub general: GeneralInformation,
    pub import_statistics: ProgressSnapshot,
    /// Share of accepted reads per cycle, in percent
    pub cycle_percentages: BTreeMap<String, f64>,
    /// Accepted randomized-region lengths and how many reads had them
    pub region_size_distribution: RegionSizeDistribution,
    pub cycles: Vec<CycleOverview>,
    /// Pool listing: identifier to stored sequence
    pub pool_sequences: BTreeMap<AptamerId, String>,
    /// Pool listing: identifier to randomized-region bounds
    pub pool_bounds: BTreeMap<AptamerId, AptamerBounds>,
    pub metadata: MetadataSnapshot,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralInformation {
    pub name: String,
    pub description: Option<String>,
    pub primer5: String,
    pub primer3: String,
    pub randomized_region_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionSizeDistribution {
    pub data: BTreeMap<usize, u64>,
    pub total: u64,
}

/// Per-cycle summary including its full count table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleOverview {
    pub name: String,
    pub round: usize,
    pub is_control_selection: bool,
    pub is_counter_selection: bool,
    pub barcode5_prime: Option<String>,
    pub barcode3_prime: Option<String>,
    pub size: u64,
    pub unique_size: u64,
    /// Fraction of aptamers seen exactly once, in percent of unique
    pub singleton_fraction: f64,
    /// Fraction of aptamers above the enrichment cutoff, in percent
    pub enriched_fraction: f64,
    /// Unique aptamers as a percentage of the cycle total
    pub unique_fraction: f64,
    pub counts: BTreeMap<AptamerId, u64>,
}

impl CycleOverview {
    fn from_cycle(cycle: &SelectionCycle) -> Self {
        let counts: BTreeMap<AptamerId, u64> = cycle.iter().collect();

        let mut singletons = 0u64;
        let mut enriched = 0u64;
        for count in counts.values() {
            if *count > ENRICHMENT_CUTOFF {
                enriched += 1;
            } else {
                singletons += 1;
            }
        }

        let unique = cycle.unique_size();
        let percent_of_unique = |part: u64| {
            if unique == 0 {
                0.0
            } else {
                part as f64 / unique as f64 * 100.0
            }
        };
        let unique_fraction = if cycle.size() == 0 {
            0.0
        } else {
            unique as f64 / cycle.size() as f64 * 100.0
        };

        Self {
            name: cycle.name().to_string(),
            round: cycle.round(),
            is_control_selection: cycle.is_control_selection(),
            is_counter_selection: cycle.is_counter_selection(),
            barcode5_prime: cycle
                .barcode_five_prime()
                .map(|barcode| String::from_utf8_lossy(&barcode).into_owned()),
            barcode3_prime: cycle
                .barcode_three_prime()
                .map(|barcode| String::from_utf8_lossy(&barcode).into_owned()),
            size: cycle.size(),
            unique_size: unique,
            singleton_fraction: percent_of_unique(singletons),
            enriched_fraction: percent_of_unique(enriched),
            unique_fraction,
            counts,
        }
    }
}

/// Builds the overview once the experiment has entered its read-only phase.
pub fn build_overview(
    experiment: &Experiment,
    progress: ProgressSnapshot,
    configuration: &ExperimentConfiguration,
) -> ExperimentOverview {
    let accepted = progress.accepted_reads;

    let cycle_percentages = experiment
        .cycles()
        .iter()
        .flatten()
        .filter(|_| accepted > 0)
        .map(|cycle| {
            (
                cycle.name().to_string(),
                cycle.size() as f64 * 100.0 / accepted as f64,
            )
        })
        .collect();

    let sizes = experiment.metadata().region_size_distribution();
    let region_size_distribution = RegionSizeDistribution {
        total: sizes.values().sum(),
        data: sizes,
    };

    let pool = experiment.pool();
    let pool_sequences = pool
        .iter_sequences()
        .map(|(id, sequence)| (id, String::from_utf8_lossy(&sequence).into_owned()))
        .collect();
    let pool_bounds = pool.iter_bounds().collect();

    ExperimentOverview {
        general: GeneralInformation {
            name: experiment.name().to_string(),
            description: experiment.description().map(str::to_string),
            primer5: configuration.experiment.primer5.clone(),
            primer3: configuration.experiment.primer3.clone(),
            randomized_region_size: configuration.experiment.randomized_region_size,
        },
        import_statistics: progress,
        cycle_percentages,
        region_size_distribution,
        cycles: experiment
            .cycles()
            .iter()
            .flatten()
            .map(|cycle| CycleOverview::from_cycle(cycle))
            .collect(),
        pool_sequences,
        pool_bounds,
        metadata: experiment.metadata().snapshot(),
        created_at: chrono::Utc::now().to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::configuration::{ExperimentConfiguration, SelectionCycleSection};
    use std::path::PathBuf;

    fn overview_fixture() -> (ExperimentConfiguration, ExperimentOverview) {
        let mut configuration = ExperimentConfiguration::default();
        configuration.experiment.name = "exp".into();
        configuration.experiment.primer5 = "AC".into();
        configuration.experiment.primer3 = "GT".into();
        configuration.cycles = vec![SelectionCycleSection {
            name: "round0".into(),
            round: 0,
            ..Default::default()
        }];
        configuration.parser.forward_files = vec![PathBuf::from("forward.fastq")];

        let experiment = Experiment::from_configuration(&configuration).unwrap();
        let cycle = experiment.cycle(0).unwrap();
        // Two copies of one aptamer, one singleton
        cycle.add(b"ACAAGT", 2, 4);
        cycle.add(b"ACAAGT", 2, 4);
        cycle.add(b"ACTTGT", 2, 4);
        for position in 0..2 {
            experiment
                .metadata()
                .add_accepted_nucleotide("round0", 2, position, b'A');
        }
        experiment.set_read_only();

        let progress = ProgressSnapshot {
            processed_reads: 3,
            accepted_reads: 3,
            ..Default::default()
        };
        let overview = build_overview(&experiment, progress, &configuration);
        (configuration, overview)
    }

    #[test]
    fn test_cycle_composition() {
        let (_, overview) = overview_fixture();
        let cycle = &overview.cycles[0];
        assert_eq!(cycle.size, 3);
        assert_eq!(cycle.unique_size, 2);
        assert!((cycle.singleton_fraction - 50.0).abs() < f64::EPSILON);
        assert!((cycle.enriched_fraction - 50.0).abs() < f64::EPSILON);
        assert_eq!(cycle.counts.len(), 2);
        assert!((overview.cycle_percentages["round0"] - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pool_listing_round_trips() {
        let (_, overview) = overview_fixture();
        assert_eq!(overview.pool_sequences.len(), 2);
        assert_eq!(overview.pool_bounds.len(), 2);
        for (id, sequence) in &overview.pool_sequences {
            let bounds = overview.pool_bounds[id];
            assert!(bounds.end <= sequence.len());
        }
    }

    #[test]
    fn test_region_sizes_from_accepted_distribution() {
        let (_, overview) = overview_fixture();
        assert_eq!(overview.region_size_distribution.data[&2], 1);
        assert_eq!(overview.region_size_distribution.total, 1);
    }

    #[test]
    fn test_overview_serializes() {
        let (_, overview) = overview_fixture();
        let json = serde_json::to_string(&overview).unwrap();
        assert!(json.contains("\"import_statistics\""));
        assert!(json.contains("\"round0\""));
    }
}
