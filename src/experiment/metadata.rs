//! Experiment metadata accumulators
//!
//! Side information collected while parsing: per-position quality score
//! averages, per-position nucleotide distributions (forward and reverse
//! lanes separately) and the nucleotide distribution of accepted randomized
//! regions keyed by region length. None of it is needed by the pipeline
//! itself, it exists for the benefit of downstream analysis.
//!
//! Outer maps are keyed by selection cycle name and registered up front;
//! inner per-position structures are allocated lazily on first write and
//! are safe under concurrent consumer threads.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

type Shared<K, V> = DashMap<K, V, ahash::RandomState>;
type PositionQualities = Shared<usize, QualityAccumulator>;
type PositionNucleotides = Shared<usize, NucleotideCounts>;
/// randomized-region length -> position -> nucleotide counts
type AcceptedDistribution = Shared<usize, PositionNucleotides>;

fn shared<K: std::hash::Hash + Eq, V>() -> Shared<K, V> {
    DashMap::with_hasher(ahash::RandomState::new())
}

/// Keys of the parser statistics written at run completion
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ParserStat {
    ProcessedReads,
    AcceptedReads,
    ContigAssemblyFails,
    InvalidAlphabet,
    FivePrimeError,
    ThreePrimeError,
    InvalidCycle,
    PrimerOverlaps,
}

impl ParserStat {
    pub const ALL: [ParserStat; 8] = [
        ParserStat::ProcessedReads,
        ParserStat::AcceptedReads,
        ParserStat::ContigAssemblyFails,
        ParserStat::InvalidAlphabet,
        ParserStat::FivePrimeError,
        ParserStat::ThreePrimeError,
        ParserStat::InvalidCycle,
        ParserStat::PrimerOverlaps,
    ];
}

/// Running mean of quality scores at one read position
#[derive(Debug, Default)]
pub struct QualityAccumulator {
    sum: AtomicU64,
    count: AtomicU64,
}

impl QualityAccumulator {
    pub fn add(&self, score: u64) {
        self.sum.fetch_add(score, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observations(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            self.sum.load(Ordering::Relaxed) as f64 / count as f64
        }
    }
}

/// Per-position counts over the {A, C, G, T, N} alphabet. Any byte outside
/// the alphabet is tallied under N.
#[derive(Debug, Default)]
pub struct NucleotideCounts {
    counts: [AtomicU64; 5],
}

const NUCLEOTIDE_KEYS: [u8; 5] = [b'A', b'C', b'G', b'T', b'N'];

#[inline]
fn nucleotide_slot(base: u8) -> usize {
    match base {
        b'A' => 0,
        b'C' => 1,
        b'G' => 2,
        b'T' => 3,
        _ => 4,
    }
}

impl NucleotideCounts {
    pub fn increment(&self, base: u8) {
        self.counts[nucleotide_slot(base)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, base: u8) -> u64 {
        self.counts[nucleotide_slot(base)].load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .sum()
    }

    fn to_map(&self) -> BTreeMap<char, u64> {
        NUCLEOTIDE_KEYS
            .iter()
            .enumerate()
            .map(|(slot, &key)| (key as char, self.counts[slot].load(Ordering::Relaxed)))
            .collect()
    }
}

/// Concurrent metadata store, one per experiment.
pub struct Metadata {
    quality_scores_forward: Shared<String, PositionQualities>,
    quality_scores_reverse: Shared<String, PositionQualities>,
    nucleotide_distribution_forward: Shared<String, PositionNucleotides>,
    nucleotide_distribution_reverse: Shared<String, PositionNucleotides>,
    nucleotide_distribution_accepted: Shared<String, AcceptedDistribution>,
    parser_statistics: Shared<ParserStat, u64>,
}

impl Metadata {
    /// Creates the store with one slot per selection cycle. Writes against
    /// an unregistered cycle name are dropped with a warning.
    pub fn new<I, S>(cycle_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let metadata = Self {
            quality_scores_forward: shared(),
            quality_scores_reverse: shared(),
            nucleotide_distribution_forward: shared(),
            nucleotide_distribution_reverse: shared(),
            nucleotide_distribution_accepted: shared(),
            parser_statistics: shared(),
        };

        for name in cycle_names {
            let name = name.into();
            metadata
                .quality_scores_forward
                .insert(name.clone(), shared());
            metadata
                .quality_scores_reverse
                .insert(name.clone(), shared());
            metadata
                .nucleotide_distribution_forward
                .insert(name.clone(), shared());
            metadata
                .nucleotide_distribution_reverse
                .insert(name.clone(), shared());
            metadata
                .nucleotide_distribution_accepted
                .insert(name, shared());
        }

        metadata
    }

    /// Adds a Phred-adjusted quality score observed at `position` of a
    /// forward read.
    pub fn add_forward_quality(&self, cycle: &str, position: usize, score: u64) {
        if let Some(positions) = self.quality_scores_forward.get(cycle) {
            positions.entry(position).or_default().add(score);
        }
    }

    pub fn add_reverse_quality(&self, cycle: &str, position: usize, score: u64) {
        if let Some(positions) = self.quality_scores_reverse.get(cycle) {
            positions.entry(position).or_default().add(score);
        }
    }

    pub fn add_forward_nucleotide(&self, cycle: &str, position: usize, base: u8) {
        if let Some(positions) = self.nucleotide_distribution_forward.get(cycle) {
            positions.entry(position).or_default().increment(base);
        }
    }

    pub fn add_reverse_nucleotide(&self, cycle: &str, position: usize, base: u8) {
        if let Some(positions) = self.nucleotide_distribution_reverse.get(cycle) {
            positions.entry(position).or_default().increment(base);
        }
    }

    /// Tallies one base of an accepted randomized region. `position` indexes
    /// into the extracted region, not the full read.
    pub fn add_accepted_nucleotide(
        &self,
        cycle: &str,
        region_length: usize,
        position: usize,
        base: u8,
    ) {
        let Some(by_length) = self.nucleotide_distribution_accepted.get(cycle) else {
            warn!(cycle, "no accepted distribution slot for cycle");
            return;
        };
        by_length
            .entry(region_length)
            .or_insert_with(shared)
            .entry(position)
            .or_default()
            .increment(base);
    }

    pub fn set_statistic(&self, stat: ParserStat, value: u64) {
        self.parser_statistics.insert(stat, value);
    }

    pub fn statistic(&self, stat: ParserStat) -> Option<u64> {
        self.parser_statistics.get(&stat).map(|value| *value)
    }

    /// Accepted-region counts at position 0 summed per region length across
    /// all cycles. Position 0 is incremented exactly once per accepted read,
    /// which makes this the randomized-region size distribution.
    pub fn region_size_distribution(&self) -> BTreeMap<usize, u64> {
        let mut totals = BTreeMap::new();
        for cycle_entry in self.nucleotide_distribution_accepted.iter() {
            for length_entry in cycle_entry.value().iter() {
                if let Some(first_position) = length_entry.value().get(&0) {
                    *totals.entry(*length_entry.key()).or_insert(0) += first_position.total();
                }
            }
        }
        totals
    }

    /// Freezes the concurrent state into plain ordered maps for
    /// serialization. Call after the pipeline's join barrier.
    pub fn snapshot(&self) -> MetadataSnapshot {
        let qualities = |source: &Shared<String, PositionQualities>| -> BTreeMap<String, BTreeMap<usize, QualitySummary>> {
            source
                .iter()
                .map(|cycle_entry| {
                    let positions = cycle_entry
                        .value()
                        .iter()
                        .map(|entry| {
                            (
                                *entry.key(),
                                QualitySummary {
                                    mean: entry.value().mean(),
                                    observations: entry.value().observations(),
                                },
                            )
                        })
                        .collect();
                    (cycle_entry.key().clone(), positions)
                })
                .collect()
        };

        let nucleotides = |source: &Shared<String, PositionNucleotides>| -> BTreeMap<String, BTreeMap<usize, BTreeMap<char, u64>>> {
            source
                .iter()
                .map(|cycle_entry| {
                    let positions = cycle_entry
                        .value()
                        .iter()
                        .map(|entry| (*entry.key(), entry.value().to_map()))
                        .collect();
                    (cycle_entry.key().clone(), positions)
                })
                .collect()
        };

        let accepted: BTreeMap<String, BTreeMap<usize, BTreeMap<usize, BTreeMap<char, u64>>>> = self
            .nucleotide_distribution_accepted
            .iter()
            .map(|cycle_entry| {
                let by_length = cycle_entry
                    .value()
                    .iter()
                    .map(|length_entry| {
                        let positions = length_entry
                            .value()
                            .iter()
                            .map(|entry| (*entry.key(), entry.value().to_map()))
                            .collect();
                        (*length_entry.key(), positions)
                    })
                    .collect();
                (cycle_entry.key().clone(), by_length)
            })
            .collect();

        MetadataSnapshot {
            quality_scores_forward: qualities(&self.quality_scores_forward),
            quality_scores_reverse: qualities(&self.quality_scores_reverse),
            nucleotide_distribution_forward: nucleotides(&self.nucleotide_distribution_forward),
            nucleotide_distribution_reverse: nucleotides(&self.nucleotide_distribution_reverse),
            nucleotide_distribution_accepted: accepted,
            parser_statistics: self
                .parser_statistics
                .iter()
                .map(|entry| (*entry.key(), *entry.value()))
                .collect(),
        }
    }
}

/// Mean and observation count of one quality accumulator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualitySummary {
    pub mean: f64,
    pub observations: u64,
}

/// Plain serializable form of the metadata, produced once parsing is done
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    pub quality_scores_forward: BTreeMap<String, BTreeMap<usize, QualitySummary>>,
    pub quality_scores_reverse: BTreeMap<String, BTreeMap<usize, QualitySummary>>,
    pub nucleotide_distribution_forward: BTreeMap<String, BTreeMap<usize, BTreeMap<char, u64>>>,
    pub nucleotide_distribution_reverse: BTreeMap<String, BTreeMap<usize, BTreeMap<char, u64>>>,
    pub nucleotide_distribution_accepted:
        BTreeMap<String, BTreeMap<usize, BTreeMap<usize, BTreeMap<char, u64>>>>,
    pub parser_statistics: BTreeMap<ParserStat, u64>,
}
