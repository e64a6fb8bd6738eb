//! In-memory storage shared between handles, one handle per simulated tab.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

use super::{KeyValueStore, Origin, StorageEvent, StoreError, StoreOp};

const EVENT_CAPACITY: usize = 64;

struct Shared {
    entries: RwLock<HashMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
    next_origin: AtomicU64,
}

pub struct MemoryStore {
    shared: Arc<Shared>,
    origin: Origin,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            entries: RwLock::new(HashMap::new()),
            events,
            next_origin: AtomicU64::new(1),
        });
        let origin = shared.next_origin.fetch_add(1, Ordering::SeqCst);
        Self { shared, origin }
    }

    /// Opens another handle on the same entries with its own origin.
    #[must_use]
    pub fn handle(&self) -> Self {
        let origin = self.shared.next_origin.fetch_add(1, Ordering::SeqCst);
        Self {
            shared: Arc::clone(&self.shared),
            origin,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shared
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .shared
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn apply(&self, ops: Vec<StoreOp>) -> Result<(), StoreError> {
        let mut changed = Vec::new();
        {
            let mut entries = self
                .shared
                .entries
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for op in ops {
                let key = op.key().to_string();
                let modified = match op {
                    StoreOp::Set(key, value) => {
                        entries.insert(key, value.clone()).as_ref() != Some(&value)
                    }
                    StoreOp::Remove(key) => entries.remove(&key).is_some(),
                };
                if modified {
                    changed.push(key);
                }
            }
        }

        for key in changed {
            // No subscribers is fine.
            let _ = self.shared.events.send(StorageEvent {
                key,
                origin: self.origin,
            });
        }

        Ok(())
    }

    fn origin(&self) -> Origin {
        self.origin
    }

    fn watch(&self) -> broadcast::Receiver<StorageEvent> {
        self.shared.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_share_entries() -> Result<(), StoreError> {
        let first = MemoryStore::new();
        let second = first.handle();
        first.set("authToken", "a.b.c")?;
        assert_eq!(second.get("authToken")?, Some("a.b.c".to_string()));
        second.remove("authToken")?;
        assert!(first.is_empty());
        Ok(())
    }

    #[test]
    fn handles_have_distinct_origins() {
        let first = MemoryStore::new();
        let second = first.handle();
        assert_ne!(first.origin(), second.origin());
        assert_ne!(first.origin(), super::super::EXTERNAL_ORIGIN);
    }

    #[test]
    fn changes_are_broadcast_with_origin() -> Result<(), StoreError> {
        let first = MemoryStore::new();
        let second = first.handle();
        let mut events = first.watch();

        second.set("userData", "{}")?;

        let event = events.try_recv().ok();
        assert_eq!(
            event,
            Some(StorageEvent {
                key: "userData".to_string(),
                origin: second.origin(),
            })
        );
        Ok(())
    }

    #[test]
    fn no_event_for_noop_changes() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        store.set("k", "v")?;
        let mut events = store.watch();
        store.set("k", "v")?;
        store.remove("missing")?;
        assert!(events.try_recv().is_err());
        Ok(())
    }
}
