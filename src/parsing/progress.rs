//! Parser progress counters
//!
//! Eight independent atomics shared between all pipeline threads and the
//! caller. Per-read failures are never fatal; they land in exactly one of
//! these counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// The counter a rejected read is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFailure {
    ContigAssembly,
    InvalidAlphabet,
    Unmatched5Prime,
    Unmatched3Prime,
    InvalidCycle,
    PrimerOverlap,
}

/// Thread-safe progress of one parsing run.
#[derive(Debug, Default)]
pub struct ParserProgress {
    processed_reads: AtomicU64,
    accepted_reads: AtomicU64,
    contig_assembly_fails: AtomicU64,
    invalid_alphabet: AtomicU64,
    unmatchable_primer5: AtomicU64,
    unmatchable_primer3: AtomicU64,
    invalid_cycle: AtomicU64,
    primer_overlaps: AtomicU64,
}

impl ParserProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self) {
        self.processed_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.accepted_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, failure: ReadFailure) {
        self.counter(failure).fetch_add(1, Ordering::Relaxed);
    }

    /// Takes back a failure recorded by an earlier attempt on the same
    /// read, so at most one error is attributed per read after a
    /// reverse-complement retry.
    pub fn retract_failure(&self, failure: ReadFailure) {
        self.counter(failure).fetch_sub(1, Ordering::Relaxed);
    }

    fn counter(&self, failure: ReadFailure) -> &AtomicU64 {
        match failure {
            ReadFailure::ContigAssembly => &self.contig_assembly_fails,
            ReadFailure::InvalidAlphabet => &self.invalid_alphabet,
            ReadFailure::Unmatched5Prime => &self.unmatchable_primer5,
            ReadFailure::Unmatched3Prime => &self.unmatchable_primer3,
            ReadFailure::InvalidCycle => &self.invalid_cycle,
            ReadFailure::PrimerOverlap => &self.primer_overlaps,
        }
    }

    pub fn processed_reads(&self) -> u64 {
        self.processed_reads.load(Ordering::Relaxed)
    }

    pub fn accepted_reads(&self) -> u64 {
        self.accepted_reads.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            processed_reads: self.processed_reads.load(Ordering::Relaxed),
            accepted_reads: self.accepted_reads.load(Ordering::Relaxed),
            contig_assembly_fails: self.contig_assembly_fails.load(Ordering::Relaxed),
            invalid_alphabet: self.invalid_alphabet.load(Ordering::Relaxed),
            unmatchable_primer5: self.unmatchable_primer5.load(Ordering::Relaxed),
            unmatchable_primer3: self.unmatchable_primer3.load(Ordering::Relaxed),
            invalid_cycle: self.invalid_cycle.load(Ordering::Relaxed),
            primer_overlaps: self.primer_overlaps.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the progress counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub processed_reads: u64,
    pub accepted_reads: u64,
    pub contig_assembly_fails: u64,
    pub invalid_alphabet: u64,
    pub unmatchable_primer5: u64,
    pub unmatchable_primer3: u64,
    pub invalid_cycle: u64,
    pub primer_overlaps: u64,
}

impl ProgressSnapshot {
    /// Sum of all error counters
    pub fn error_total(&self) -> u64 {
        self.contig_assembly_fails
            + self.invalid_alphabet
            + self.unmatchable_primer5
            + self.unmatchable_primer3
            + self.invalid_cycle
            + self.primer_overlaps
    }
}
