//! Primitive collections
//!
//! A `PrimitiveCollection<T>` is a name- or URI-keyed registry of tools,
//! prompts, or resources that a server exposes. Mutating the collection
//! (insert/remove) broadcasts a change event so a running server can emit
//! the matching `notifications/*/list_changed` once, regardless of how many
//! subscribers are listening. Grounded in the `DashMap` + background-task
//! idiom used by [`crate::correlation::manager::CorrelationManager`], adapted
//! here to a synchronous pub/sub broadcast rather than a request/response
//! channel.

use dashmap::DashMap;
use tokio::sync::broadcast;

/// Emitted whenever a collection's contents change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Changed;

/// A name-keyed registry of primitives (tools, prompts) or a URI-keyed
/// registry of resources, with change notification.
///
/// Cloning a `PrimitiveCollection` is cheap and shares the same backing map
/// and broadcast channel; this mirrors how a server hands the same
/// collection to multiple request handlers.
#[derive(Clone)]
pub struct PrimitiveCollection<T: Clone + Send + Sync + 'static> {
    items: std::sync::Arc<DashMap<String, T>>,
    changes: broadcast::Sender<Changed>,
}

impl<T: Clone + Send + Sync + 'static> PrimitiveCollection<T> {
    /// Create an empty collection.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            items: std::sync::Arc::new(DashMap::new()),
            changes,
        }
    }

    /// Insert or replace the entry keyed by `key`, then broadcast a change.
    pub fn insert(&self, key: impl Into<String>, value: T) {
        self.items.insert(key.into(), value);
        let _ = self.changes.send(Changed);
    }

    /// Remove the entry keyed by `key`, broadcasting a change only if something
    /// was actually removed.
    pub fn remove(&self, key: &str) -> Option<T> {
        let removed = self.items.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            let _ = self.changes.send(Changed);
        }
        removed
    }

    /// Look up a single entry by key.
    pub fn get(&self, key: &str) -> Option<T> {
        self.items.get(key).map(|entry| entry.value().clone())
    }

    /// Snapshot of every entry currently in the collection.
    pub fn list(&self) -> Vec<T> {
        self.items.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Number of entries currently in the collection.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection currently has no entries.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Subscribe to change events. Each subscriber gets its own receiver;
    /// a lagged receiver simply means "something changed, re-list to find out
    /// what" rather than an error.
    pub fn subscribe(&self) -> broadcast::Receiver<Changed> {
        self.changes.subscribe()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for PrimitiveCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::types::Tool;
    use serde_json::json;

    fn sample_tool(name: &str) -> Tool {
        Tool {
            name: name.to_string(),
            description: None,
            input_schema: json!({"type": "object"}),
        }
    }

    #[tokio::test]
    async fn insert_and_remove_broadcast_changes() {
        let tools: PrimitiveCollection<Tool> = PrimitiveCollection::new();
        let mut changes = tools.subscribe();

        tools.insert("echo", sample_tool("echo"));
        changes.recv().await.unwrap();
        assert_eq!(tools.len(), 1);

        tools.remove("echo");
        changes.recv().await.unwrap();
        assert!(tools.is_empty());
    }

    #[test]
    fn removing_a_missing_key_does_not_broadcast() {
        let tools: PrimitiveCollection<Tool> = PrimitiveCollection::new();
        let mut changes = tools.subscribe();
        assert!(tools.remove("missing").is_none());
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn get_and_list_reflect_current_contents() {
        let tools: PrimitiveCollection<Tool> = PrimitiveCollection::new();
        tools.insert("a", sample_tool("a"));
        tools.insert("b", sample_tool("b"));

        assert!(tools.get("a").is_some());
        assert!(tools.get("missing").is_none());
        assert_eq!(tools.list().len(), 2);
    }
}
