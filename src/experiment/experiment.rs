//! Experiment aggregate
//!
//! Ties the aptamer pool, the selection cycles and the metadata store
//! together. Built once from a validated configuration before parsing
//! starts; flipped to the read-only observation phase when parsing ends.

use crate::experiment::metadata::Metadata;
use crate::experiment::pool::AptamerPool;
use crate::experiment::selection_cycle::SelectionCycle;
use crate::utils::configuration::ExperimentConfiguration;
use crate::Result;
use anyhow::ensure;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// A SELEX experiment: its cycles, the shared aptamer pool and metadata.
pub struct Experiment {
    name: String,
    description: Option<String>,
    /// Cycle list; the position is the cycle's file and barcode index.
    /// Empty slots are allowed to model missing rounds.
    cycles: Vec<Option<Arc<SelectionCycle>>>,
    pool: Arc<AptamerPool>,
    metadata: Arc<Metadata>,
}

impl Experiment {
    /// Builds the experiment from a validated configuration.
    pub fn from_configuration(configuration: &ExperimentConfiguration) -> Result<Self> {
        let started = Instant::now();

        let pool = Arc::new(AptamerPool::new());
        let barcodes5 = configuration.barcodes5();
        let barcodes3 = configuration.barcodes3();

        let mut cycles = Vec::with_capacity(configuration.cycles.len());
        for (index, section) in configuration.cycles.iter().enumerate() {
            ensure!(
                !section.name.is_empty(),
                "selection cycle {index} has an empty name"
            );

            let mut cycle = SelectionCycle::new(
                &section.name,
                section.round,
                index,
                section.is_control_selection,
                section.is_counter_selection,
                Arc::clone(&pool),
            );
            if let Some(barcode) = barcodes5.get(index) {
                cycle.set_barcode_five_prime(Some(barcode.as_slice()));
            }
            if let Some(barcode) = barcodes3.get(index) {
                cycle.set_barcode_three_prime(Some(barcode.as_slice()));
            }
            cycles.push(Some(Arc::new(cycle)));
        }

        let metadata = Arc::new(Metadata::new(
            configuration.cycles.iter().map(|section| section.name.clone()),
        ));

        info!(
            experiment = %configuration.experiment.name,
            cycles = cycles.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "experiment initialized"
        );

        Ok(Self {
            name: configuration.experiment.name.clone(),
            description: configuration.experiment.description.clone(),
            cycles,
            pool,
            metadata,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn cycles(&self) -> &[Option<Arc<SelectionCycle>>] {
        &self.cycles
    }

    /// Cycle at a list position, if present
    pub fn cycle(&self, index: usize) -> Option<Arc<SelectionCycle>> {
        self.cycles.get(index).and_then(|slot| slot.clone())
    }

    pub fn pool(&self) -> &Arc<AptamerPool> {
        &self.pool
    }

    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }

    /// Flips the pool and every cycle into the read-only observation phase.
    pub fn set_read_only(&self) {
        self.pool.set_read_only();
        for cycle in self.cycles.iter().flatten() {
            cycle.set_read_only();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::configuration::{
        ExperimentSection, ParserSection, PerformanceSection, SelectionCycleSection,
    };
    use std::path::PathBuf;

    fn configuration_with_cycles(count: usize) -> ExperimentConfiguration {
        ExperimentConfiguration {
            experiment: ExperimentSection {
                name: "exp".into(),
                description: Some("test experiment".into()),
                primer5: "ACGT".into(),
                primer3: "TTTT".into(),
                randomized_region_size: None,
            },
            cycles: (0..count)
                .map(|round| SelectionCycleSection {
                    name: format!("round{round}"),
                    round,
                    ..Default::default()
                })
                .collect(),
            parser: ParserSection {
                forward_files: vec![PathBuf::from("forward.fastq")],
                ..Default::default()
            },
            performance: PerformanceSection::default(),
        }
    }

    #[test]
    fn test_experiment_construction() {
        let experiment = Experiment::from_configuration(&configuration_with_cycles(3)).unwrap();
        assert_eq!(experiment.cycles().len(), 3);
        assert_eq!(experiment.cycle(1).unwrap().name(), "round1");
        assert!(experiment.cycle(5).is_none());
        assert_eq!(experiment.pool().len(), 0);
    }

    #[test]
    fn test_barcodes_attach_in_cycle_order() {
        let mut configuration = configuration_with_cycles(2);
        configuration.parser.barcodes5_prime = Some("GATC,TTAA".into());
        configuration.parser.barcodes3_prime = Some("CCGG".into());

        let experiment = Experiment::from_configuration(&configuration).unwrap();
        assert_eq!(
            experiment.cycle(0).unwrap().barcode_five_prime().unwrap(),
            b"GATC"
        );
        assert_eq!(
            experiment.cycle(1).unwrap().barcode_five_prime().unwrap(),
            b"TTAA"
        );
        assert_eq!(
            experiment.cycle(0).unwrap().barcode_three_prime().unwrap(),
            b"CCGG"
        );
        assert!(experiment.cycle(1).unwrap().barcode_three_prime().is_none());
    }

    #[test]
    fn test_read_only_propagates() {
        let experiment = Experiment::from_configuration(&configuration_with_cycles(2)).unwrap();
        experiment.set_read_only();
        assert!(experiment.pool().is_read_only());
        assert!(experiment.cycle(0).unwrap().is_read_only());
        assert!(experiment.cycle(1).unwrap().is_read_only());
    }
}
