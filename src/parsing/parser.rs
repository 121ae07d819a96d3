//! Pipeline orchestration
//!
//! Wires one producer thread and a pool of consumer threads to a bounded
//! queue, waits for all of them at the join barrier, then runs the
//! completion step: the pool and cycles become read-only and the progress
//! counters are snapshotted into the experiment metadata.

use crate::experiment::{Experiment, ParserStat};
use crate::parsing::consumer::Consumer;
use crate::parsing::producer::Producer;
use crate::parsing::progress::ParserProgress;
use crate::utils::configuration::ExperimentConfiguration;
use crate::Result;
use anyhow::{anyhow, Context};
use crossbeam_channel::bounded;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::info;

pub struct AptaPlexParser {
    configuration: ExperimentConfiguration,
    experiment: Arc<Experiment>,
    progress: Arc<ParserProgress>,
}

impl AptaPlexParser {
    pub fn new(configuration: ExperimentConfiguration, experiment: Arc<Experiment>) -> Self {
        Self {
            configuration,
            experiment,
            progress: Arc::new(ParserProgress::new()),
        }
    }

    pub fn progress(&self) -> &Arc<ParserProgress> {
        &self.progress
    }

    pub fn experiment(&self) -> &Arc<Experiment> {
        &self.experiment
    }

    /// Number of consumer threads: one core is reserved for the producer,
    /// and at least one consumer always runs.
    fn consumer_count(&self) -> usize {
        let cores = num_cpus::get().min(self.configuration.performance.max_cores);
        cores.saturating_sub(1).max(1)
    }

    /// Runs the full pipeline and the completion step.
    pub fn run(&self) -> Result<()> {
        let started = Instant::now();
        self.parse()?;
        self.parsing_completed();
        info!(
            elapsed_s = started.elapsed().as_secs_f64(),
            "parsing finished"
        );
        Ok(())
    }

    fn parse(&self) -> Result<()> {
        let (sender, receiver) = bounded(self.configuration.parser.blocking_queue_size);

        let producer = Producer::new(&self.configuration, sender.clone());
        // Unreadable input is a fatal error and must surface before any
        // thread starts
        producer.validate_files()?;

        let consumer_count = self.consumer_count();
        info!(consumers = consumer_count, "🧬 starting parsing pipeline");

        let producer_handle = thread::Builder::new()
            .name("aptaplex-producer".into())
            .spawn(move || producer.run())
            .context("failed to spawn producer thread")?;

        let mut consumer_handles = Vec::with_capacity(consumer_count);
        for worker in 0..consumer_count {
            let consumer = Consumer::new(
                &self.configuration,
                &self.experiment,
                receiver.clone(),
                sender.clone(),
                Arc::clone(&self.progress),
            );
            let handle = thread::Builder::new()
                .name(format!("aptaplex-consumer-{worker}"))
                .spawn(move || consumer.run())
                .context("failed to spawn consumer thread")?;
            consumer_handles.push(handle);
        }

        // The threads hold their own clones
        drop(sender);
        drop(receiver);

        // Join barrier: consumers first drain the queue down to the pill
        let produced = producer_handle
            .join()
            .map_err(|_| anyhow!("producer thread panicked"))?;
        for handle in consumer_handles {
            handle
                .join()
                .map_err(|_| anyhow!("consumer thread panicked"))?;
        }

        let total = produced?;
        info!(total_reads = total, "all pipeline threads joined");
        Ok(())
    }

    /// Completion step: freeze the data stores and persist the final
    /// counter values into the metadata statistics.
    fn parsing_completed(&self) {
        self.experiment.set_read_only();

        let metadata = self.experiment.metadata();
        let snapshot = self.progress.snapshot();
        metadata.set_statistic(ParserStat::ProcessedReads, snapshot.processed_reads);
        metadata.set_statistic(ParserStat::AcceptedReads, snapshot.accepted_reads);
        metadata.set_statistic(ParserStat::ContigAssemblyFails, snapshot.contig_assembly_fails);
        metadata.set_statistic(ParserStat::InvalidAlphabet, snapshot.invalid_alphabet);
        metadata.set_statistic(ParserStat::FivePrimeError, snapshot.unmatchable_primer5);
        metadata.set_statistic(ParserStat::ThreePrimeError, snapshot.unmatchable_primer3);
        metadata.set_statistic(ParserStat::InvalidCycle, snapshot.invalid_cycle);
        metadata.set_statistic(ParserStat::PrimerOverlaps, snapshot.primer_overlaps);

        info!("✅ data stores set to read-only, parser statistics recorded");
    }
}
