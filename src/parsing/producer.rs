//! Producer half of the parsing pipeline
//!
//! Drives the configured reader over every forward/reverse file pair,
//! enriches each read with its source paths (and, in per-file mode, its
//! selection cycle), and pushes it onto the bounded queue. Enqueueing
//! blocks while the queue is full, which is the pipeline's backpressure.
//!
//! On completion, and on every error path, exactly one poison pill is
//! enqueued. Consumers re-enqueue it among themselves, so a single pill
//! terminates any number of consumers.

use crate::core::{QueueItem, ReaderType, SequencingRead};
use crate::io::open_read_source;
use crate::utils::configuration::ExperimentConfiguration;
use crate::Result;
use anyhow::{bail, Context};
use crossbeam_channel::Sender;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

pub struct Producer {
    sender: Sender<QueueItem>,
    backend: ReaderType,
    forward_files: Vec<PathBuf>,
    reverse_files: Vec<PathBuf>,
    is_per_file: bool,
}

impl Producer {
    pub fn new(configuration: &ExperimentConfiguration, sender: Sender<QueueItem>) -> Self {
        Self {
            sender,
            backend: configuration.parser.backend,
            forward_files: configuration.parser.forward_files.clone(),
            reverse_files: configuration.parser.reverse_files.clone(),
            is_per_file: configuration.parser.is_per_file,
        }
    }

    /// Validates the file configuration. Called before the pipeline spawns
    /// so that unreadable input fails the run up front.
    pub fn validate_files(&self) -> Result<()> {
        if self.forward_files.is_empty() {
            bail!("no forward read files specified");
        }
        if !self.reverse_files.is_empty() && self.reverse_files.len() != self.forward_files.len() {
            bail!(
                "the number of forward ({}) and reverse ({}) read files must be identical",
                self.forward_files.len(),
                self.reverse_files.len()
            );
        }

        for file in self.forward_files.iter().chain(self.reverse_files.iter()) {
            std::fs::metadata(file)
                .with_context(|| format!("input file not readable: {}", file.display()))?;
        }

        Ok(())
    }

    /// Drains every file pair into the queue. A poison pill is enqueued in
    /// all cases, including errors, so consumers always terminate.
    pub fn run(&self) -> Result<u64> {
        let outcome = self.produce();

        if self.sender.send(QueueItem::EndOfStream).is_err() {
            error!("all consumers disconnected before the poison pill was enqueued");
        }

        match &outcome {
            Ok(total) => info!(total_reads = total, "producer completed"),
            Err(reason) => error!(%reason, "producer failed"),
        }
        outcome
    }

    fn produce(&self) -> Result<u64> {
        let mut total_reads = 0u64;

        for (file_index, forward) in self.forward_files.iter().enumerate() {
            let reverse = self.reverse_files.get(file_index);
            info!(
                pair = file_index + 1,
                pairs = self.forward_files.len(),
                forward = %forward.display(),
                reverse = ?reverse,
                "processing file pair"
            );

            total_reads += self.process_file_pair(forward, reverse.map(PathBuf::as_path), file_index)?;
        }

        Ok(total_reads)
    }

    fn process_file_pair(
        &self,
        forward: &Path,
        reverse: Option<&Path>,
        file_index: usize,
    ) -> Result<u64> {
        let mut reader = open_read_source(self.backend, forward, reverse)?;
        let mut file_reads = 0u64;

        while let Some(mut read) = reader.next_read()? {
            self.enrich(&mut read, forward, reverse, file_index);

            if self.sender.send(QueueItem::Read(Box::new(read))).is_err() {
                bail!("parsing queue closed while reads were pending");
            }
            file_reads += 1;

            if file_reads % 100_000 == 0 {
                debug!(file_reads, "reads enqueued from current file");
            }
        }

        info!(file_reads, forward = %forward.display(), "file pair drained");
        Ok(file_reads)
    }

    fn enrich(
        &self,
        read: &mut SequencingRead,
        forward: &Path,
        reverse: Option<&Path>,
        file_index: usize,
    ) {
        read.source_forward = Some(forward.to_path_buf());
        read.source_reverse = reverse.map(Path::to_path_buf);

        // Demultiplexed input: the file position selects the cycle. In
        // multiplexed mode the consumer assigns the cycle after barcode
        // matching instead.
        if self.is_per_file {
            read.cycle_index = Some(file_index);
        }
    }
}
