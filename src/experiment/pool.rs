//! Shared aptamer pool
//!
//! Interns aptamer byte sequences into dense integer identifiers. The pool
//! is written concurrently by every consumer thread during parsing and
//! switched to a read-only observation phase once the run completes.
//!
//! Keys are content-hashed byte sequences; the same `Arc<[u8]>` allocation
//! backs both the forward (sequence to id) and inverse (id to sequence)
//! map so a sequence is stored exactly once.

use crate::core::{AptamerBounds, AptamerId};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Concurrent interning table for aptamer sequences.
pub struct AptamerPool {
    /// sequence -> id; `Arc<[u8]>` hashes and compares by byte content
    sequence_to_id: DashMap<Arc<[u8]>, AptamerId, ahash::RandomState>,
    /// id -> sequence (same allocation as the forward map's key)
    id_to_sequence: DashMap<AptamerId, Arc<[u8]>, ahash::RandomState>,
    /// id -> randomized region bounds recorded at first registration
    id_to_bounds: DashMap<AptamerId, AptamerBounds, ahash::RandomState>,
    /// Monotonic id source; ids start at 1
    id_counter: AtomicU32,
    /// Serializes the check-then-insert in `register`
    register_lock: Mutex<()>,
    /// Observation-phase marker; advisory for the in-memory variant
    read_only: AtomicBool,
}

impl AptamerPool {
    pub fn new() -> Self {
        debug!("instantiating in-memory aptamer pool");
        Self {
            sequence_to_id: DashMap::with_hasher(ahash::RandomState::new()),
            id_to_sequence: DashMap::with_hasher(ahash::RandomState::new()),
            id_to_bounds: DashMap::with_hasher(ahash::RandomState::new()),
            id_counter: AtomicU32::new(0),
            register_lock: Mutex::new(()),
            read_only: AtomicBool::new(false),
        }
    }

    /// Registers a sequence and returns its identifier.
    ///
    /// Idempotent: a sequence that is already interned keeps its identifier
    /// and its originally recorded bounds. Concurrent registrations of the
    /// same sequence consume exactly one new identifier.
    pub fn register(&self, sequence: &[u8], rr_start: usize, rr_end: usize) -> AptamerId {
        // Fast path without the lock for sequences seen before
        if let Some(id) = self.sequence_to_id.get(sequence) {
            return *id;
        }

        let _guard = self.register_lock.lock();

        // Re-check under the lock; another thread may have won the race
        if let Some(id) = self.sequence_to_id.get(sequence) {
            return *id;
        }

        let id = self.id_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let stored: Arc<[u8]> = Arc::from(sequence);

        self.id_to_sequence.insert(id, Arc::clone(&stored));
        self.id_to_bounds
            .insert(id, AptamerBounds::new(rr_start, rr_end));
        self.sequence_to_id.insert(stored, id);

        id
    }

    /// Identifier of a sequence, if interned
    pub fn id_for(&self, sequence: &[u8]) -> Option<AptamerId> {
        self.sequence_to_id.get(sequence).map(|entry| *entry)
    }

    /// Sequence behind an identifier, if assigned
    pub fn sequence_for(&self, id: AptamerId) -> Option<Arc<[u8]>> {
        self.id_to_sequence.get(&id).map(|entry| Arc::clone(&entry))
    }

    /// Randomized-region bounds recorded for an identifier
    pub fn bounds_for(&self, id: AptamerId) -> Option<AptamerBounds> {
        self.id_to_bounds.get(&id).map(|entry| *entry)
    }

    pub fn contains_sequence(&self, sequence: &[u8]) -> bool {
        self.sequence_to_id.contains_key(sequence)
    }

    pub fn contains_id(&self, id: AptamerId) -> bool {
        self.id_to_sequence.contains_key(&id)
    }

    /// Number of distinct interned sequences
    pub fn len(&self) -> usize {
        self.id_to_sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_sequence.is_empty()
    }

    /// Lazy iteration over (id, sequence) pairs. Only guaranteed to be a
    /// consistent snapshot once the pool is read-only.
    pub fn iter_sequences(&self) -> impl Iterator<Item = (AptamerId, Arc<[u8]>)> + '_ {
        self.id_to_sequence
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
    }

    /// Lazy iteration over (id, bounds) pairs
    pub fn iter_bounds(&self) -> impl Iterator<Item = (AptamerId, AptamerBounds)> + '_ {
        self.id_to_bounds
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
    }

    /// Lazy iteration over all assigned identifiers
    pub fn ids(&self) -> impl Iterator<Item = AptamerId> + '_ {
        self.id_to_sequence.iter().map(|entry| *entry.key())
    }

    /// Marks the pool read-only for the observation phase. The in-memory
    /// variant keeps this advisory; persistent variants flush here.
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

impl Default for AptamerPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_register_assigns_dense_ids_from_one() {
        let pool = AptamerPool::new();
        let first = pool.register(b"ACGT", 0, 4);
        let second = pool.register(b"TTTT", 0, 4);
        let third = pool.register(b"GGGG", 0, 4);

        let ids: HashSet<AptamerId> = pool.ids().collect();
        assert_eq!(ids, [first, second, third].into_iter().collect());
        assert_eq!(ids, (1..=3).collect());
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_register_is_idempotent() {
        let pool = AptamerPool::new();
        let id = pool.register(b"ACGTACGT", 2, 6);
        assert_eq!(pool.register(b"ACGTACGT", 2, 6), id);
        // A second registration must not grow the pool or touch the bounds
        assert_eq!(pool.register(b"ACGTACGT", 0, 8), id);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.bounds_for(id), Some(AptamerBounds::new(2, 6)));
    }

    #[test]
    fn test_lookup_round_trip() {
        let pool = AptamerPool::new();
        let id = pool.register(b"ACCGGT", 1, 5);

        let sequence = pool.sequence_for(id).expect("sequence must exist");
        assert_eq!(&sequence[..], b"ACCGGT");
        assert_eq!(pool.id_for(&sequence), Some(id));
        assert!(pool.contains_sequence(b"ACCGGT"));
        assert!(pool.contains_id(id));
        assert_eq!(pool.id_for(b"TTTTTT"), None);
        assert_eq!(pool.sequence_for(999), None);
    }

    #[test]
    fn test_concurrent_registration_consumes_one_id() {
        let pool = Arc::new(AptamerPool::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    let mut ids = Vec::new();
                    for _ in 0..200 {
                        ids.push(pool.register(b"ACGTACGTACGT", 4, 8));
                    }
                    ids
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            seen.extend(handle.join().unwrap());
        }

        assert_eq!(seen.len(), 1);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_concurrent_distinct_sequences_stay_dense() {
        let pool = Arc::new(AptamerPool::new());

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for i in 0..64 {
                        // Overlapping sequence sets across workers
                        let sequence = format!("ACGT{:03}{}", i, worker % 2);
                        pool.register(sequence.as_bytes(), 0, sequence.len());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let ids: HashSet<AptamerId> = pool.ids().collect();
        assert_eq!(ids.len(), pool.len());
        assert_eq!(ids, (1..=pool.len() as AptamerId).collect());
    }

    #[test]
    fn test_read_only_phase_flag() {
        let pool = AptamerPool::new();
        assert!(!pool.is_read_only());
        pool.set_read_only();
        assert!(pool.is_read_only());
        pool.set_read_write();
        assert!(!pool.is_read_only());
    }
}
