//! In-flight request table: the unit of response correlation.
//!
//! Every outstanding call owns one [`PendingEntry`] keyed by its request
//! id. Exactly one of three paths completes an entry: a matching response
//! line, the caller's timeout, or a generation drain after the worker
//! process dies. The table itself is not locked; the supervisor guards it
//! together with the worker state machine under a single mutex so that
//! registrations, completions, and drains are observed consistently.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;

use super::client::SidecarError;

/// Completion handle for one in-flight request.
#[derive(Debug)]
pub(crate) struct PendingEntry {
    method: String,
    generation: u64,
    tx: oneshot::Sender<Result<Value, SidecarError>>,
}

impl PendingEntry {
    pub fn new(
        method: &str,
        generation: u64,
        tx: oneshot::Sender<Result<Value, SidecarError>>,
    ) -> Self {
        Self {
            method: method.to_string(),
            generation,
            tx,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Resolve or reject the caller. A no-op when the caller has already
    /// gone away (timed out and dropped its receiver), which makes every
    /// completion path idempotent.
    pub fn complete(self, outcome: Result<Value, SidecarError>) {
        let _ = self.tx.send(outcome);
    }
}

/// Map of request id to completion handle.
#[derive(Debug, Default)]
pub(crate) struct PendingTable {
    entries: HashMap<u64, PendingEntry>,
}

impl PendingTable {
    /// Register an in-flight request. Ids are allocated from a monotonic
    /// counter and never reused, so a collision means a caller bug.
    pub fn register(&mut self, id: u64, entry: PendingEntry) {
        debug_assert!(
            !self.entries.contains_key(&id),
            "request id {id} already registered"
        );
        self.entries.insert(id, entry);
    }

    /// Remove an entry for completion, timeout, or a failed send. `None`
    /// for unknown ids: duplicate and late responses are silent no-ops.
    pub fn remove(&mut self, id: u64) -> Option<PendingEntry> {
        self.entries.remove(&id)
    }

    /// Remove every entry registered under `generation`. Entries from a
    /// newer worker process survive to be handled by its own lifecycle.
    pub fn drain_generation(&mut self, generation: u64) -> Vec<PendingEntry> {
        let ids: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.generation == generation)
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(generation: u64) -> (PendingEntry, oneshot::Receiver<Result<Value, SidecarError>>) {
        let (tx, rx) = oneshot::channel();
        (PendingEntry::new("test.method", generation, tx), rx)
    }

    #[test]
    fn remove_then_complete_resolves_caller() {
        let mut table = PendingTable::default();
        let (pending, mut rx) = entry(1);
        table.register(4, pending);

        let removed = table.remove(4).expect("entry registered");
        assert_eq!(removed.method(), "test.method");
        removed.complete(Ok(json!({"ok": true})));

        assert_eq!(rx.try_recv().unwrap().unwrap(), json!({"ok": true}));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn remove_unknown_id_is_noop() {
        let mut table = PendingTable::default();
        assert!(table.remove(99).is_none());
    }

    #[test]
    fn second_removal_is_noop() {
        let mut table = PendingTable::default();
        let (pending, _rx) = entry(1);
        table.register(1, pending);

        assert!(table.remove(1).is_some());
        assert!(table.remove(1).is_none());
    }

    #[test]
    fn complete_after_caller_gone_does_not_panic() {
        let mut table = PendingTable::default();
        let (pending, rx) = entry(1);
        table.register(2, pending);
        drop(rx);

        let removed = table.remove(2).expect("entry registered");
        removed.complete(Err(SidecarError::ProcessFault { code: Some(1) }));
    }

    #[test]
    fn drain_only_removes_matching_generation() {
        let mut table = PendingTable::default();
        let (old, mut old_rx) = entry(1);
        let (new, mut new_rx) = entry(2);
        table.register(1, old);
        table.register(2, new);

        let drained = table.drain_generation(1);
        assert_eq!(drained.len(), 1);
        for entry in drained {
            entry.complete(Err(SidecarError::ProcessFault { code: Some(7) }));
        }

        assert!(matches!(
            old_rx.try_recv().unwrap(),
            Err(SidecarError::ProcessFault { code: Some(7) })
        ));
        assert!(new_rx.try_recv().is_err());
        assert_eq!(table.len(), 1);
    }
}
