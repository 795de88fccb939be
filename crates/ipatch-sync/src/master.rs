//! The authoritative replica.
//!
//! A master consumes `sync` and `update` patches and answers with whatever the
//! sender needs to converge:
//!
//! ```text
//! sync                              -> full
//! update(V) with V == current       -> apply, accept (no response)
//! update(V) with base <= V < current -> forward(V .. current)
//! update(V) with V < base, or none  -> full
//! update(V) with V > current        -> retry
//! ```
//!
//! Only an accepted update mutates the master; every other branch is a read.

use crate::config::FileConfig;
use crate::error::{Result, Role, SyncError};
use crate::patch::{ModelPatch, Patch};
use ipatch_core::{DocumentModel, IdSource, InstanceId, UlidSource};
use ipatch_history::{
    ChangeNotifier, FileEvent, FileSnapshot, HistoryBuffer, Version, VersionedState,
};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Authoritative document holder.
pub struct MasterFile<M: DocumentModel> {
    id: InstanceId,
    history: HistoryBuffer<M::State>,
    events: ChangeNotifier<M::State>,
}

impl<M: DocumentModel> MasterFile<M> {
    /// Create an empty master with the default configuration.
    pub fn new() -> Self {
        Self::with_config(FileConfig::default(), &mut UlidSource)
    }

    pub fn with_config(config: FileConfig, ids: &mut impl IdSource) -> Self {
        Self {
            id: ids.next_id(),
            history: HistoryBuffer::with_capacity(M::empty(), config.history_capacity),
            events: ChangeNotifier::new(config.event_capacity),
        }
    }

    /// Rebuild a master from its persistence form.
    pub fn from_snapshot(
        snapshot: FileSnapshot<M::State>,
        config: FileConfig,
        ids: &mut impl IdSource,
    ) -> Self {
        Self {
            id: ids.next_id(),
            history: HistoryBuffer::from_snapshot(snapshot, config.history_capacity),
            events: ChangeNotifier::new(config.event_capacity),
        }
    }

    /// The current document.
    pub fn get(&self) -> &M::State {
        self.history.state()
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.id
    }

    /// Version of the oldest retained state.
    pub fn base_version(&self) -> Version {
        self.history.base_version()
    }

    pub fn current_version(&self) -> Version {
        self.history.current_version()
    }

    /// The retained window, live state last.
    pub fn history(&self) -> &HistoryBuffer<M::State> {
        &self.history
    }

    pub fn snapshot(&self) -> FileSnapshot<M::State> {
        self.history.snapshot()
    }

    /// Subscribe to "changed" events.
    pub fn subscribe(&self) -> broadcast::Receiver<FileEvent<M::State>> {
        self.events.subscribe()
    }

    /// Handle a patch from a slave. `Ok(None)` means the update was accepted
    /// and the sender needs nothing back.
    pub fn apply(&mut self, patch: &ModelPatch<M>) -> Result<Option<ModelPatch<M>>> {
        match patch {
            Patch::Sync { instance_id } => {
                debug!(from = %instance_id, "sync requested, sending full");
                Ok(Some(self.full()))
            }
            Patch::Update {
                instance_id,
                base_version,
                diff,
            } => self.apply_update(instance_id, *base_version, diff),
            other => {
                warn!(kind = %other.kind(), from = %other.instance_id(), "patch not valid for master");
                Err(SyncError::WrongRole {
                    kind: other.kind(),
                    role: Role::Master,
                })
            }
        }
    }

    /// Decode a wire patch, apply it and encode the response.
    pub fn apply_encoded(&mut self, wire: &str) -> Result<Option<String>> {
        let patch = ModelPatch::<M>::decode(wire)?;
        self.apply(&patch)?.map(|response| response.encode()).transpose()
    }

    fn apply_update(
        &mut self,
        from: &InstanceId,
        base: Option<Version>,
        diff: &M::Diff,
    ) -> Result<Option<ModelPatch<M>>> {
        let current = self.history.current_version();

        let Some(base) = base else {
            debug!(%from, "update from unsynced slave, sending full");
            return Ok(Some(self.full()));
        };

        if base == current {
            let next = M::apply_diff(self.history.state(), diff)
                .map_err(|source| SyncError::DiffRejected { version: base, source })?;
            let old = VersionedState::head(&self.history);
            self.history.push(next);
            self.events.notify(old, VersionedState::head(&self.history));
            trace!(%from, version = current + 1, "update accepted");
            return Ok(None);
        }

        if base > current {
            debug!(%from, base, current, "update from the future, asking for retry");
            return Ok(Some(Patch::Retry {
                instance_id: self.id.clone(),
            }));
        }

        match self.history.diffs_from::<M>(base) {
            Ok(diffs) => {
                debug!(%from, base, current, "stale update, sending forward");
                Ok(Some(Patch::Forward {
                    instance_id: self.id.clone(),
                    base_version: base,
                    diffs,
                }))
            }
            Err(err) => {
                debug!(%from, %err, "update older than history window, sending full");
                Ok(Some(self.full()))
            }
        }
    }

    fn full(&self) -> ModelPatch<M> {
        let base_version = self.history.base_version();
        Patch::Full {
            instance_id: self.id.clone(),
            base_version,
            base_state: self.history.oldest().clone(),
            diffs: self
                .history
                .diffs_from::<M>(base_version)
                .unwrap_or_default(),
        }
    }
}

impl<M: DocumentModel> Default for MasterFile<M> {
    fn default() -> Self {
        Self::new()
    }
}
