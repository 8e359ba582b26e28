//! Fire-and-forget fact write-back.

use crate::outbox::Outbox;
use crate::types::AtomicFact;
use tracing::debug;

/// Facts below this importance are not worth storing.
pub const MIN_PERSIST_IMPORTANCE: u8 = 2;

/// Whether a fact clears the persistence threshold.
pub fn worth_persisting(fact: &AtomicFact) -> bool {
    fact.importance >= MIN_PERSIST_IMPORTANCE
}

/// Queue qualifying facts on the outbox and return how many were queued.
///
/// Nothing is awaited; delivery and failures belong to the outbox.
pub fn persist(outbox: &Outbox, entries: &[AtomicFact]) -> usize {
    let mut queued = 0;
    for fact in entries {
        if worth_persisting(fact) {
            outbox.store_fact(fact.clone());
            queued += 1;
        } else {
            debug!(fact = %fact.fact, importance = fact.importance, "below persistence threshold");
        }
    }
    queued
}
