//! Selection cycles
//!
//! A selection cycle owns the per-round aptamer counts. Registration goes
//! through the shared pool first (interning the sequence, yielding the
//! identifier), then bumps the cycle-local counter plus the running total
//! and unique sizes. All of it is safe under concurrent consumer threads.

use crate::core::AptamerId;
use crate::experiment::pool::AptamerPool;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// One round of the SELEX experiment with its aptamer count table.
pub struct SelectionCycle {
    name: String,
    /// Round number of the selection, free-form and not necessarily
    /// contiguous (an experiment may keep rounds 3, 6 and 9 only)
    round: usize,
    /// Slot of this cycle in the experiment's cycle list; navigation and
    /// file/barcode indexing go through this, never through `round`
    position: usize,
    control_selection: bool,
    counter_selection: bool,

    /// Optional cycle-identifying barcodes used for demultiplexing
    barcode_five_prime: Option<Vec<u8>>,
    barcode_three_prime: Option<Vec<u8>>,

    /// id -> read count within this cycle
    counts: DashMap<AptamerId, AtomicU64, ahash::RandomState>,
    /// Sum of all counts
    total_size: AtomicU64,
    /// Number of distinct aptamers, i.e. the domain size of `counts`
    unique_size: AtomicU64,

    /// The cycle does not own the pool; it shares the experiment's handle
    pool: Arc<AptamerPool>,

    read_only: AtomicBool,
}

impl SelectionCycle {
    pub fn new(
        name: impl Into<String>,
        round: usize,
        position: usize,
        control_selection: bool,
        counter_selection: bool,
        pool: Arc<AptamerPool>,
    ) -> Self {
        Self {
            name: name.into(),
            round,
            position,
            control_selection,
            counter_selection,
            barcode_five_prime: None,
            barcode_three_prime: None,
            counts: DashMap::with_hasher(ahash::RandomState::new()),
            total_size: AtomicU64::new(0),
            unique_size: AtomicU64::new(0),
            pool,
            read_only: AtomicBool::new(false),
        }
    }

    /// Registers a sequence in the pool and counts it once for this cycle.
    pub fn add(&self, sequence: &[u8], rr_start: usize, rr_end: usize) -> AptamerId {
        self.add_with_count(sequence, rr_start, rr_end, 1)
    }

    /// Registers a sequence and increments its cycle counter by `count`.
    /// The unique size grows only when the counter transitions from absent.
    pub fn add_with_count(
        &self,
        sequence: &[u8],
        rr_start: usize,
        rr_end: usize,
        count: u64,
    ) -> AptamerId {
        let id = self.pool.register(sequence, rr_start, rr_end);

        match self.counts.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                existing.get().fetch_add(count, Ordering::Relaxed);
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(AtomicU64::new(count));
                self.unique_size.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.total_size.fetch_add(count, Ordering::Relaxed);
        id
    }

    pub fn contains_sequence(&self, sequence: &[u8]) -> bool {
        self.pool
            .id_for(sequence)
            .map(|id| self.contains_id(id))
            .unwrap_or(false)
    }

    pub fn contains_id(&self, id: AptamerId) -> bool {
        self.counts.contains_key(&id)
    }

    /// Count of a sequence in this cycle, 0 when absent
    pub fn cardinality_of_sequence(&self, sequence: &[u8]) -> u64 {
        self.pool
            .id_for(sequence)
            .map(|id| self.cardinality_of_id(id))
            .unwrap_or(0)
    }

    /// Count of an identifier in this cycle, 0 when absent
    pub fn cardinality_of_id(&self, id: AptamerId) -> u64 {
        self.counts
            .get(&id)
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Total number of reads registered in this cycle
    pub fn size(&self) -> u64 {
        self.total_size.load(Ordering::Relaxed)
    }

    /// Number of distinct aptamers in this cycle
    pub fn unique_size(&self) -> u64 {
        self.unique_size.load(Ordering::Relaxed)
    }

    /// Lazy iteration over (id, count) pairs. Consistent once the cycle is
    /// read-only.
    pub fn iter(&self) -> impl Iterator<Item = (AptamerId, u64)> + '_ {
        self.counts
            .iter()
            .map(|entry| (*entry.key(), entry.value().load(Ordering::Relaxed)))
    }

    /// Lazy iteration over (sequence, count) pairs resolved via the pool
    pub fn iter_sequences(&self) -> impl Iterator<Item = (Arc<[u8]>, u64)> + '_ {
        self.iter()
            .filter_map(|(id, count)| self.pool.sequence_for(id).map(|seq| (seq, count)))
    }

    pub fn ids(&self) -> impl Iterator<Item = AptamerId> + '_ {
        self.counts.iter().map(|entry| *entry.key())
    }

    /// Next non-empty cycle in the experiment's list, scanning upward from
    /// this cycle's own slot.
    pub fn next_cycle<'a>(
        &self,
        cycles: &'a [Option<Arc<SelectionCycle>>],
    ) -> Option<&'a Arc<SelectionCycle>> {
        cycles
            .iter()
            .skip(self.position + 1)
            .find_map(|candidate| candidate.as_ref())
    }

    /// Previous non-empty cycle in the experiment's list, scanning downward
    /// from this cycle's own slot.
    pub fn previous_cycle<'a>(
        &self,
        cycles: &'a [Option<Arc<SelectionCycle>>],
    ) -> Option<&'a Arc<SelectionCycle>> {
        cycles
            .iter()
            .take(self.position)
            .rev()
            .find_map(|candidate| candidate.as_ref())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn round(&self) -> usize {
        self.round
    }

    /// Slot of this cycle in the experiment's cycle list
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_control_selection(&self) -> bool {
        self.control_selection
    }

    pub fn is_counter_selection(&self) -> bool {
        self.counter_selection
    }

    pub fn set_barcode_five_prime(&mut self, barcode: Option<&[u8]>) {
        self.barcode_five_prime = barcode.map(|b| b.to_vec());
    }

    /// Defensive copy of the 5' barcode
    pub fn barcode_five_prime(&self) -> Option<Vec<u8>> {
        self.barcode_five_prime.clone()
    }

    pub fn set_barcode_three_prime(&mut self, barcode: Option<&[u8]>) {
        self.barcode_three_prime = barcode.map(|b| b.to_vec());
    }

    /// Defensive copy of the 3' barcode
    pub fn barcode_three_prime(&self) -> Option<Vec<u8>> {
        self.barcode_three_prime.clone()
    }

    pub fn set_read_only(&self) {
        self.read_only.store(true, Ordering::SeqCst);
    }

    pub fn set_read_write(&self) {
        self.read_only.store(false, Ordering::SeqCst);
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for SelectionCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionCycle")
            .field("name", &self.name)
            .field("round", &self.round)
            .field("size", &self.size())
            .field("unique_size", &self.unique_size())
            .finish()
    }
}
