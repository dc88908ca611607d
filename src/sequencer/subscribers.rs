// Subscriber registry - Ordered fan-out of transport events
// A failing subscriber is logged and skipped; the broadcast always completes

use super::events::TransportEvent;
use std::sync::{Arc, Mutex, MutexGuard};

/// Identifier a consumer subscribes under
pub type SubscriberId = String;

/// Error returned by a subscriber callback
#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

pub type SubscriberResult = Result<(), SubscriberError>;

/// Callback invoked for every transport event
pub type SubscriberCallback = Box<dyn FnMut(&TransportEvent) -> SubscriberResult + Send>;

type SharedCallback = Arc<Mutex<SubscriberCallback>>;

struct Entry {
    id: SubscriberId,
    callback: SharedCallback,
}

/// Registry of transport subscribers
///
/// Cloning yields another handle to the same registry, so a consumer can keep
/// a handle for unsubscribing without borrowing the transport.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    entries: Arc<Mutex<Vec<Entry>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        // The list itself is never left half-updated, so a poisoned lock is safe to reuse
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `callback` under `id`
    ///
    /// An existing id keeps its position and gets the new callback.
    pub fn subscribe(&self, id: impl Into<SubscriberId>, callback: SubscriberCallback) {
        let id = id.into();
        let callback = Arc::new(Mutex::new(callback));
        let mut entries = self.lock_entries();

        match entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => entry.callback = callback,
            None => entries.push(Entry { id, callback }),
        }
    }

    /// Remove a subscriber. Returns false if the id was unknown.
    pub fn unsubscribe(&self, id: &str) -> bool {
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock_entries().iter().any(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    /// Subscriber ids in broadcast order
    pub fn ids(&self) -> Vec<SubscriberId> {
        self.lock_entries()
            .iter()
            .map(|entry| entry.id.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.lock_entries().clear();
    }

    /// Deliver `event` to every subscriber in registration order
    ///
    /// The list is snapshotted first, so callbacks may subscribe or unsubscribe
    /// without deadlocking; such changes apply from the next broadcast.
    /// Returns the number of subscribers that failed.
    pub fn broadcast(&self, event: &TransportEvent) -> usize {
        let snapshot: Vec<(SubscriberId, SharedCallback)> = self
            .lock_entries()
            .iter()
            .map(|entry| (entry.id.clone(), Arc::clone(&entry.callback)))
            .collect();

        let mut failures = 0;
        for (id, callback) in snapshot {
            let mut callback = match callback.lock() {
                Ok(callback) => callback,
                Err(_) => {
                    log::error!(
                        "Timer subscriber '{}' is poisoned, skipping {} event",
                        id,
                        event.name()
                    );
                    failures += 1;
                    continue;
                }
            };

            if let Err(err) = (*callback)(event) {
                log::error!(
                    "Error in timer subscriber '{}' on {} event: {}",
                    id,
                    event.name(),
                    err
                );
                failures += 1;
            }
        }
        failures
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}
