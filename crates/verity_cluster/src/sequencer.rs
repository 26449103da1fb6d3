//! Sequence number allocation.
//!
//! A sequencing run reads the pending set and the current mapping from the
//! consistency store, keeps every existing assignment, gives fresh numbers to
//! new entries in [`pending_entries_order`], and writes the result back with a
//! compare-and-swap on the mapping version. Assignments are therefore stable
//! across runs and across nodes: a lost race simply means the next run sees
//! the winner's mapping and reuses it.
//!
//! Mapped entries that have left the pending set are dropped only when the
//! serving tree head already covers them. Anything else means an entry
//! vanished before it was published, which the log cannot recover from.

use crate::consistent_store::{ConsistentStore, Mapping, SequenceMapping};
use crate::error::{FatalInconsistency, RecoverableError, SignerResult};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;
use verity_core::{Hash, Timestamp};
use verity_log::{pending_entries_order, LoggedEntry};
use verity_storage::{EntryStore, StoreError};

/// Counters describing one sequencing run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequencingReport {
    /// Entries given a sequence number for the first time
    pub newly_sequenced: u64,
    /// Pending entries that kept an existing assignment
    pub reused: u64,
    /// New entries left for a later run because they are inside the guard window
    pub deferred: u64,
    /// Mappings retired because the serving tree head covers them
    pub dropped: u64,
    /// Records written to the local store
    pub recorded_locally: u64,
}

/// An existing assignment and whether its entry is still pending
#[derive(Debug, Clone, Copy)]
struct Existing {
    sequence_number: u64,
    still_pending: bool,
}

/// Assigns sequence numbers to pending entries
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequencer {
    guard_window_ms: u64,
}

impl Sequencer {
    /// Create a sequencer that defers entries younger than `guard_window_ms`
    #[must_use]
    pub const fn new(guard_window_ms: u64) -> Self {
        Self { guard_window_ms }
    }

    /// Run one sequencing pass at wall clock time `now`.
    ///
    /// # Errors
    ///
    /// Recoverable if the consistency store fails or the mapping write loses a
    /// race; fatal if the stored mapping or pending set is inconsistent, an
    /// entry vanished before being served, or the local store fails.
    pub fn sequence_new_entries<C, E>(
        &self,
        consistent_store: &C,
        local_store: &E,
        now: Timestamp,
    ) -> SignerResult<SequencingReport>
    where
        C: ConsistentStore + ?Sized,
        E: EntryStore + ?Sized,
    {
        // Read before the mapping: a writer racing in between leaves the
        // counter behind the mapping, which is caught below as a stale number.
        let next = consistent_store.next_available_sequence_number()?;
        let mut next_sequence_number =
            u64::try_from(next).map_err(|_| RecoverableError::NegativeSequenceNumber(next))?;

        let mut mapping = consistent_store.get_sequence_mapping()?;
        let mut existing = index_mapping(&mapping.value)?;
        let mapped_numbers: HashSet<u64> =
            existing.values().map(|e| e.sequence_number).collect();

        let mut pending = consistent_store.get_pending_entries()?;
        pending.sort_by(pending_entries_order);
        debug!(
            pending = pending.len(),
            mapped = existing.len(),
            next_sequence_number,
            "sequencing pending entries"
        );

        let mut report = SequencingReport::default();
        let mut seen = HashSet::with_capacity(pending.len());
        let mut assignments = Vec::with_capacity(pending.len());
        let mut by_sequence = BTreeMap::new();

        for entry in pending {
            if let Some(sequence_number) = entry.sequence_number {
                return Err(FatalInconsistency::AlreadySequenced {
                    hash: entry.hash,
                    sequence_number,
                }
                .into());
            }
            if !seen.insert(entry.hash) {
                return Err(FatalInconsistency::DuplicateSequencing(entry.hash).into());
            }

            let sequence_number = if let Some(mapped) = existing.get_mut(&entry.hash) {
                mapped.still_pending = true;
                report.reused += 1;
                mapped.sequence_number
            } else {
                if now.millis_since(entry.timestamp) < self.guard_window_ms {
                    debug!(hash = %entry.hash.short(), timestamp = %entry.timestamp, "deferring entry inside guard window");
                    report.deferred += 1;
                    continue;
                }
                let assigned = next_sequence_number;
                if mapped_numbers.contains(&assigned) {
                    return Err(RecoverableError::StaleSequenceNumber(assigned).into());
                }
                next_sequence_number += 1;
                report.newly_sequenced += 1;
                debug!(hash = %entry.hash.short(), sequence_number = assigned, "assigned sequence number");
                assigned
            };

            assignments.push(Mapping {
                entry_hash: entry.hash,
                sequence_number,
            });
            if by_sequence
                .insert(sequence_number, entry.with_sequence_number(sequence_number))
                .is_some()
            {
                return Err(FatalInconsistency::DuplicateSequenceNumber(sequence_number).into());
            }
        }

        let serving_tree_size = consistent_store.get_serving_sth()?.tree_size;

        for (hash, mapped) in &existing {
            if mapped.still_pending {
                continue;
            }
            if mapped.sequence_number >= serving_tree_size {
                return Err(FatalInconsistency::VanishedAboveServing {
                    hash: *hash,
                    sequence_number: mapped.sequence_number,
                    serving_tree_size,
                }
                .into());
            }
            debug!(hash = %hash.short(), sequence_number = mapped.sequence_number, "dropping served mapping");
            report.dropped += 1;
        }

        assignments.sort_by_key(|m| m.sequence_number);
        if let Some(lowest) = assignments.first() {
            if lowest.sequence_number > serving_tree_size {
                return Err(FatalInconsistency::MappingGap {
                    lowest: lowest.sequence_number,
                    serving_tree_size,
                }
                .into());
            }
        }

        mapping.value = SequenceMapping::new(assignments);
        consistent_store.update_sequence_mapping(&mapping)?;

        report.recorded_locally = record_contiguous(local_store, by_sequence)?;
        Ok(report)
    }
}

/// Index the stored mapping by hash, rejecting duplicate hashes or numbers
fn index_mapping(
    mapping: &SequenceMapping,
) -> Result<BTreeMap<Hash, Existing>, FatalInconsistency> {
    let mut by_hash = BTreeMap::new();
    let mut numbers = HashSet::with_capacity(mapping.len());
    for m in &mapping.mappings {
        let fresh = Existing {
            sequence_number: m.sequence_number,
            still_pending: false,
        };
        if by_hash.insert(m.entry_hash, fresh).is_some() || !numbers.insert(m.sequence_number) {
            return Err(FatalInconsistency::DuplicateMapping {
                hash: m.entry_hash,
                sequence_number: m.sequence_number,
            });
        }
    }
    Ok(by_hash)
}

/// Write the run of assigned entries that extends the local store's
/// contiguous prefix; anything beyond the first gap waits for a later pass.
fn record_contiguous<E: EntryStore + ?Sized>(
    local_store: &E,
    mut by_sequence: BTreeMap<u64, LoggedEntry>,
) -> Result<u64, FatalInconsistency> {
    let mut next = local_store.tree_size()?;
    let mut recorded = 0;
    while let Some(entry) = by_sequence.remove(&next) {
        match local_store.create_sequenced_entry(&entry) {
            Ok(()) => recorded += 1,
            // Already recorded past an earlier gap by the same entry.
            Err(StoreError::SequenceNumberAlreadyInUse(seq))
                if local_store
                    .lookup_by_sequence(seq)?
                    .is_some_and(|stored| stored.hash == entry.hash) => {}
            Err(err) => return Err(err.into()),
        }
        next += 1;
    }
    Ok(recorded)
}
