//! Change notification.
//!
//! Each file exposes exactly one observation hook: a "changed" event carrying
//! the state and version before and after a mutation. Events are fanned out
//! over a `tokio::sync::broadcast` channel; sending never blocks and is a no-op
//! when nobody is subscribed.

use crate::buffer::{HistoryBuffer, Version};
use serde::Serialize;
use tokio::sync::broadcast;

/// A state paired with the version that names it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VersionedState<S> {
    pub state: S,
    pub version: Version,
}

impl<S: Clone> VersionedState<S> {
    /// The live state and version of a buffer.
    pub fn head(buffer: &HistoryBuffer<S>) -> Self {
        Self {
            state: buffer.state().clone(),
            version: buffer.current_version(),
        }
    }
}

/// Payload of the "changed" event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FileEvent<S> {
    pub old: VersionedState<S>,
    pub new: VersionedState<S>,
}

/// Broadcasts [`FileEvent`]s to subscribers.
#[derive(Debug)]
pub struct ChangeNotifier<S> {
    tx: broadcast::Sender<FileEvent<S>>,
}

impl<S: Clone + PartialEq> ChangeNotifier<S> {
    /// Create a notifier whose subscribers lag after `capacity` unread events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FileEvent<S>> {
        self.tx.subscribe()
    }

    /// Emit a change event iff the state or the version differs.
    /// Returns whether an event was emitted.
    pub fn notify(&self, old: VersionedState<S>, new: VersionedState<S>) -> bool {
        if old == new {
            return false;
        }
        let _ = self.tx.send(FileEvent { old, new });
        true
    }
}
