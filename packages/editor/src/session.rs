//! # Edit Session Management
//!
//! Tracks editing state for one client of a shared document.
//!
//! An `EditSession` owns this client's copy of the document, a queue of
//! pending (unacknowledged) local deltas, and the client's priority used to
//! break transform ties. Local edits apply immediately; an incoming remote
//! delta is rebased against the pending queue through the transform engine,
//! applied, and leaves the queue itself rebased for retransmission.
//!
//! Priorities must be distinct across clients: both sides of an exchange
//! derive the tie winner from the same comparison, which is what keeps the
//! convergence guarantee.

use std::time::{SystemTime, UNIX_EPOCH};

use vellum_model::{transform_delta_sets, Delta, DeltaId, Document};

use crate::EditorError;

/// One client's view of a collaboratively edited document.
pub struct EditSession {
    /// Client identifier, used for logging and delta attribution.
    pub id: String,

    /// Tie-break priority; lower wins conflicts against higher.
    pub priority: u32,

    /// This client's document replica.
    pub document: Document,

    /// Local deltas applied here but not yet acknowledged by the other
    /// peers, in application order.
    pending: Vec<PendingDelta>,
}

/// A local delta waiting for acknowledgment.
#[derive(Debug, Clone)]
pub struct PendingDelta {
    pub id: DeltaId,
    pub delta: Delta,
    pub timestamp: u64,
}

impl EditSession {
    pub fn new(id: impl Into<String>, priority: u32, document: Document) -> Self {
        Self {
            id: id.into(),
            priority,
            document,
            pending: Vec::new(),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingDelta> {
        self.pending.iter()
    }

    /// Applies a local delta and queues it for acknowledgment.
    pub fn apply_local(&mut self, delta: Delta) -> Result<DeltaId, EditorError> {
        let id = delta.id;
        self.document.apply_delta(delta.clone())?;
        self.pending.push(PendingDelta {
            id,
            delta,
            timestamp: current_timestamp(),
        });
        tracing::debug!(session = %self.id, pending = self.pending.len(), "applied local delta");
        Ok(id)
    }

    /// Integrates a delta from a peer: rebases it past the pending local
    /// deltas, applies the rebased form, and keeps the symmetrically rebased
    /// pending queue.
    pub fn receive_remote(
        &mut self,
        delta: Delta,
        remote_priority: u32,
    ) -> Result<(), EditorError> {
        let remote_important = remote_priority < self.priority;
        let local: Vec<Delta> = self.pending.iter().map(|p| p.delta.clone()).collect();
        let (remote_rebased, local_rebased) =
            transform_delta_sets(&[delta], &local, remote_important);

        for rebased in remote_rebased {
            self.document.apply_delta(rebased)?;
        }

        if local_rebased.len() != self.pending.len() {
            return Err(EditorError::PendingMismatch);
        }
        for (entry, rebased) in self.pending.iter_mut().zip(local_rebased) {
            entry.delta = rebased;
        }
        tracing::debug!(session = %self.id, "integrated remote delta");
        Ok(())
    }

    /// Drops an acknowledged delta from the pending queue.
    pub fn confirm(&mut self, id: DeltaId) {
        self.pending.retain(|p| p.id != id);
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before the epoch")
        .as_secs()
}
