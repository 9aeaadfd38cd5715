//! Inbound request cancellation
//!
//! Tracks a [`CancellationToken`] per in-flight inbound request so that a
//! `notifications/cancelled` from the peer can cooperatively stop the handler
//! task currently processing that request. Grounded in the `local_ct_pool:
//! HashMap<RequestId, CancellationToken>` pattern used by the `rmcp` service
//! loop, backed here by a `DashMap` for lock-free concurrent access from
//! multiple dispatch tasks.

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::protocol::RequestId;

/// Registry of cancellation tokens for requests currently being handled.
#[derive(Debug, Default)]
pub struct CancellationTable {
    tokens: DashMap<RequestId, CancellationToken>,
}

impl CancellationTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            tokens: DashMap::new(),
        }
    }

    /// Register a fresh token for `id`, overwriting any stale entry.
    ///
    /// Call this when dispatch begins handling an inbound request; pass the
    /// returned token into the handler so it can observe cancellation.
    pub fn register(&self, id: RequestId) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.insert(id, token.clone());
        token
    }

    /// Signal cancellation for `id`, if it is still tracked.
    ///
    /// A second cancellation for an id that has already completed (and so is
    /// no longer tracked) is a no-op: the handler has nothing left to stop.
    pub fn cancel(&self, id: &RequestId) {
        if let Some((_, token)) = self.tokens.remove(id) {
            token.cancel();
        }
    }

    /// Stop tracking `id`, typically once its handler has finished.
    pub fn remove(&self, id: &RequestId) {
        self.tokens.remove(id);
    }

    /// Number of requests currently tracked.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no requests are currently tracked.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cancel_triggers_the_registered_token() {
        let table = CancellationTable::new();
        let id = RequestId::new_number(1);
        let token = table.register(id.clone());

        assert!(!token.is_cancelled());
        table.cancel(&id);
        assert!(token.is_cancelled());
        assert!(table.is_empty());
    }

    #[test]
    fn cancelling_an_unknown_or_already_completed_id_is_a_no_op() {
        let table = CancellationTable::new();
        table.cancel(&RequestId::new_number(42));
        assert!(table.is_empty());

        let id = RequestId::new_string("req-1");
        let token = table.register(id.clone());
        table.remove(&id);
        table.cancel(&id);
        assert!(!token.is_cancelled());
    }
}
