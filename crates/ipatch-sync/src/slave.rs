//! Optimistic replica.
//!
//! A slave applies every edit locally the moment it is made and reconciles
//! with the master afterwards. Its history window lines up with master version
//! numbers up to the *confirmed* version; states beyond it are tentative local
//! edits that the master has not acknowledged yet.
//!
//! ```text
//!   retained base        confirmed              current
//!        |                   |                     |
//!      [ master states ..... ][ tentative edits ... ]
//! ```
//!
//! ## One patch in flight
//!
//! A slave keeps at most one patch in flight. Every update carries the
//! confirmed version as its base and a diff from the confirmed state to the
//! live state, so the master's fast path (`baseVersion == currentVersion`)
//! matches whenever nobody else got there first. Edits made while a patch is
//! in flight are applied locally and queued; they go out as one batch when the
//! in-flight patch settles.
//!
//! ## Continuations
//!
//! Each outgoing update is a small state machine driven by the response:
//!
//! ```text
//!   Pending --accept(None)-----------------> Confirmed
//!   Pending --accept(forward | full)-------> Superseded (fresh update, same edits)
//!   Pending --accept(retry) / bad forward--> Pending (resend unchanged)
//!   Pending --reject()---------------------> Superseded
//! ```
//!
//! When a merge moves the confirmed version, master states win and the
//! pending edit functions are replayed on top of the merged state, so a
//! superseded update is always re-diffed against the freshest state.

use crate::config::FileConfig;
use crate::error::{Result, Role, SyncError};
use crate::patch::{ModelPatch, Patch};
use ipatch_core::{DocumentModel, IdSource, InstanceId, UlidSource};
use ipatch_history::{
    ChangeNotifier, FileEvent, FileSnapshot, HistoryBuffer, Version, VersionedState,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// A local edit: the new document as a function of the current one.
pub type EditFn<S> = Arc<dyn Fn(&S) -> S + Send + Sync>;

/// Identifies one outgoing patch of one slave.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

/// A patch waiting to be delivered to the master. Hand it back to
/// [`SlaveFile::accept`] or [`SlaveFile::reject`] together with the outcome.
#[derive(Clone, Debug)]
pub struct Outgoing<S, D> {
    ticket: Ticket,
    patch: Patch<S, D>,
}

impl<S, D> Outgoing<S, D> {
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// The patch to send.
    pub fn patch(&self) -> &Patch<S, D> {
        &self.patch
    }
}

/// Outgoing patch type for a document model.
pub type ModelOutgoing<M> = Outgoing<<M as DocumentModel>::State, <M as DocumentModel>::Diff>;

/// What the embedder should do after a continuation ran.
#[derive(Debug)]
pub enum Resolution<S, D> {
    /// The patch settled. `next` carries queued local edits, if any.
    Confirmed { next: Option<Outgoing<S, D>> },
    /// The master's state was merged; send this fresh update instead.
    Superseded(Outgoing<S, D>),
    /// The response could not be used; send the original patch again.
    Resend(Outgoing<S, D>),
    /// The patch was no longer in flight; nothing to do.
    Stale,
}

impl<S, D> Resolution<S, D> {
    /// The patch to send next, if any.
    pub fn into_outgoing(self) -> Option<Outgoing<S, D>> {
        match self {
            Resolution::Confirmed { next } => next,
            Resolution::Superseded(outgoing) | Resolution::Resend(outgoing) => Some(outgoing),
            Resolution::Stale => None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Resolution::Confirmed { .. })
    }
}

/// Resolution type for a document model.
pub type ModelResolution<M> =
    Resolution<<M as DocumentModel>::State, <M as DocumentModel>::Diff>;

enum Pending<S> {
    Sync,
    Update {
        base: Option<Version>,
        edits: Vec<EditFn<S>>,
    },
}

struct InFlight<S> {
    ticket: Ticket,
    pending: Pending<S>,
}

/// The last master state this slave matched. Kept apart from the window so
/// that local edits can never evict the base of the next update.
#[derive(Clone, Debug)]
struct Anchor<S> {
    version: Version,
    state: S,
}

/// Undo position: the version being shown, plus the states undone past it.
/// Redo states are held by value since a batch confirm may fold them out of
/// the window.
#[derive(Clone, Debug)]
struct UndoCursor<S> {
    position: Version,
    /// Oldest first, ending at the head undo started from
    redo: Vec<S>,
}

/// Replica holder with optimistic edits, undo/redo and reconciliation.
pub struct SlaveFile<M: DocumentModel> {
    id: InstanceId,
    history: HistoryBuffer<M::State>,
    /// `None` until the first sync
    confirmed: Option<Anchor<M::State>>,
    in_flight: Option<InFlight<M::State>>,
    /// Edits applied locally but not yet sent
    queued: Vec<EditFn<M::State>>,
    /// `None` at the live head
    undo: Option<UndoCursor<M::State>>,
    next_ticket: u64,
    events: ChangeNotifier<M::State>,
}

impl<M: DocumentModel> SlaveFile<M> {
    /// Create an empty, never-synced slave with the default configuration.
    pub fn new() -> Self {
        Self::with_config(FileConfig::default(), &mut UlidSource)
    }

    pub fn with_config(config: FileConfig, ids: &mut impl IdSource) -> Self {
        Self::from_parts(
            HistoryBuffer::with_capacity(M::empty(), config.history_capacity),
            None,
            &config,
            ids,
        )
    }

    /// Cold-start a slave from a snapshot of confirmed master state.
    pub fn from_snapshot(
        snapshot: FileSnapshot<M::State>,
        config: FileConfig,
        ids: &mut impl IdSource,
    ) -> Self {
        let history = HistoryBuffer::from_snapshot(snapshot, config.history_capacity);
        let anchor = Anchor {
            version: history.current_version(),
            state: history.state().clone(),
        };
        Self::from_parts(history, Some(anchor), &config, ids)
    }

    fn from_parts(
        history: HistoryBuffer<M::State>,
        confirmed: Option<Anchor<M::State>>,
        config: &FileConfig,
        ids: &mut impl IdSource,
    ) -> Self {
        Self {
            id: ids.next_id(),
            history,
            confirmed,
            in_flight: None,
            queued: Vec::new(),
            undo: None,
            next_ticket: 0,
            events: ChangeNotifier::new(config.event_capacity),
        }
    }

    /// The live document, including tentative local edits.
    pub fn get(&self) -> &M::State {
        self.history.state()
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.id
    }

    /// The last master version this slave has confirmed, `None` before the
    /// first sync.
    pub fn base_version(&self) -> Option<Version> {
        self.confirmed.as_ref().map(|anchor| anchor.version)
    }

    /// The master state at [`base_version`](Self::base_version).
    pub fn confirmed_state(&self) -> Option<&M::State> {
        self.confirmed.as_ref().map(|anchor| &anchor.state)
    }

    /// Local version of the live state.
    pub fn current_version(&self) -> Version {
        self.history.current_version()
    }

    pub fn history(&self) -> &HistoryBuffer<M::State> {
        &self.history
    }

    pub fn is_synced(&self) -> bool {
        self.confirmed.is_some()
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Number of local edits the master has not confirmed yet.
    pub fn pending_edits(&self) -> usize {
        self.in_flight_edits().len() + self.queued.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FileEvent<M::State>> {
        self.events.subscribe()
    }

    /// Snapshot of the confirmed prefix. Tentative edits are not persisted.
    pub fn snapshot(&self) -> Option<FileSnapshot<M::State>> {
        let anchor = self.confirmed.as_ref()?;
        let mut confirmed_only = self.history.clone();
        if confirmed_only.truncate_to(anchor.version).is_ok() {
            return Some(confirmed_only.snapshot());
        }
        Some(FileSnapshot {
            state: anchor.state.clone(),
            history: Vec::new(),
            base_version: anchor.version,
        })
    }

    /// Apply an edit optimistically. Returns the update to send, or `None`
    /// when another patch is in flight and the edit was queued behind it.
    pub fn update<F>(&mut self, edit: F) -> Option<ModelOutgoing<M>>
    where
        F: Fn(&M::State) -> M::State + Send + Sync + 'static,
    {
        self.undo = None;
        self.submit(Arc::new(edit))
    }

    /// Ask the master for its whole window. `None` while a patch is in flight;
    /// its response brings the slave up to date anyway.
    pub fn sync(&mut self) -> Option<ModelOutgoing<M>> {
        if self.in_flight.is_some() {
            return None;
        }
        let ticket = self.issue_ticket();
        self.in_flight = Some(InFlight {
            ticket,
            pending: Pending::Sync,
        });
        Some(Outgoing {
            ticket,
            patch: Patch::Sync {
                instance_id: self.id.clone(),
            },
        })
    }

    /// Send queued edits if nothing is in flight.
    pub fn flush(&mut self) -> Option<ModelOutgoing<M>> {
        if self.in_flight.is_some() || self.queued.is_empty() {
            return None;
        }

        let base = self.base_version();
        let from = self
            .confirmed_state()
            .unwrap_or_else(|| self.history.oldest());
        let diff = M::diff(from, self.history.state());

        let edits = std::mem::take(&mut self.queued);
        let ticket = self.issue_ticket();
        trace!(ticket = ticket.0, ?base, edits = edits.len(), "sending update");
        self.in_flight = Some(InFlight {
            ticket,
            pending: Pending::Update { base, edits },
        });
        Some(Outgoing {
            ticket,
            patch: Patch::Update {
                instance_id: self.id.clone(),
                base_version: base,
                diff,
            },
        })
    }

    /// Feed the master's answer to `outgoing` back in. `None` means the
    /// master accepted the update without sending anything.
    pub fn accept(
        &mut self,
        outgoing: ModelOutgoing<M>,
        response: Option<&ModelPatch<M>>,
    ) -> Result<ModelResolution<M>> {
        if !self.is_in_flight(outgoing.ticket) {
            debug!(ticket = outgoing.ticket.0, "response for a patch no longer in flight");
            return Ok(Resolution::Stale);
        }

        let Some(response) = response else {
            let is_update = matches!(
                self.in_flight,
                Some(InFlight {
                    pending: Pending::Update { .. },
                    ..
                })
            );
            if !is_update {
                // A sync always expects data back
                return Ok(Resolution::Resend(outgoing));
            }
            self.confirm();
            let next = self.flush().or_else(|| {
                if self.is_synced() {
                    None
                } else {
                    self.sync()
                }
            });
            return Ok(Resolution::Confirmed { next });
        };

        if !self.merge(response)? {
            debug!(kind = %response.kind(), "response not mergeable, resending");
            return Ok(Resolution::Resend(outgoing));
        }

        match self.take_update() {
            Some((_, edits)) => Ok(self.reissue(edits)),
            None => {
                self.in_flight = None;
                Ok(Resolution::Confirmed { next: self.flush() })
            }
        }
    }

    /// The patch was lost or refused without a response: re-issue it.
    pub fn reject(&mut self, outgoing: ModelOutgoing<M>) -> ModelResolution<M> {
        if !self.is_in_flight(outgoing.ticket) {
            return Resolution::Stale;
        }
        match self.take_update() {
            Some((_, edits)) => self.reissue(edits),
            None => Resolution::Resend(outgoing),
        }
    }

    /// Stop waiting for `outgoing`. Its edits stay applied locally and go
    /// back to the queue; call [`flush`](Self::flush) to send them again.
    pub fn abandon(&mut self, outgoing: &ModelOutgoing<M>) -> bool {
        if !self.is_in_flight(outgoing.ticket) {
            return false;
        }
        if let Some((_, mut edits)) = self.take_update() {
            edits.append(&mut self.queued);
            self.queued = edits;
        }
        self.in_flight = None;
        true
    }

    /// Merge a master patch into local history. Returns `false` when the
    /// patch cannot be used (retry, or a forward that does not start within
    /// the confirmed prefix).
    pub fn merge(&mut self, patch: &ModelPatch<M>) -> Result<bool> {
        match patch {
            Patch::Forward {
                base_version,
                diffs,
                ..
            } => self.merge_forward(*base_version, diffs),
            Patch::Full {
                base_version,
                base_state,
                diffs,
                ..
            } => {
                self.merge_full(*base_version, base_state, diffs)?;
                Ok(true)
            }
            Patch::Retry { instance_id } => {
                debug!(from = %instance_id, "master asked for a retry");
                Ok(false)
            }
            other => Err(SyncError::WrongRole {
                kind: other.kind(),
                role: Role::Slave,
            }),
        }
    }

    /// Step back `n` states and submit the older state as a new edit.
    pub fn undo(&mut self, n: usize) -> Option<ModelOutgoing<M>> {
        let position = self
            .undo
            .as_ref()
            .map_or(self.history.current_version(), |cursor| cursor.position);
        let target = position
            .saturating_sub(n.max(1) as Version)
            .max(self.history.base_version());
        if target >= position {
            return None;
        }

        let states = self.history.states_from(target).ok()?;
        let state = states[0].clone();
        let mut redo: Vec<M::State> = states
            .into_iter()
            .skip(1)
            .take((position - target) as usize)
            .cloned()
            .collect();
        if let Some(cursor) = self.undo.take() {
            redo.extend(cursor.redo);
        }

        let outgoing = self.submit(Arc::new(move |_: &M::State| state.clone()));
        self.undo = Some(UndoCursor {
            position: target,
            redo,
        });
        outgoing
    }

    /// Step forward `n` states towards where undo started.
    pub fn redo(&mut self, n: usize) -> Option<ModelOutgoing<M>> {
        let mut cursor = self.undo.take()?;
        if cursor.redo.is_empty() {
            return None;
        }
        let steps = n.max(1).min(cursor.redo.len());
        let state = cursor.redo[steps - 1].clone();
        cursor.redo.drain(..steps);
        cursor.position = cursor
            .position
            .saturating_add(steps as Version)
            .min(self.history.current_version());

        let outgoing = self.submit(Arc::new(move |_: &M::State| state.clone()));
        self.undo = (!cursor.redo.is_empty()).then_some(cursor);
        outgoing
    }

    pub fn can_undo(&self) -> bool {
        let position = self
            .undo
            .as_ref()
            .map_or(self.history.current_version(), |cursor| cursor.position);
        position > self.history.base_version()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.as_ref().is_some_and(|cursor| !cursor.redo.is_empty())
    }

    fn submit(&mut self, edit: EditFn<M::State>) -> Option<ModelOutgoing<M>> {
        let old = VersionedState::head(&self.history);
        let next = edit(self.history.state());
        self.history.push(next);
        self.queued.push(edit);
        self.events.notify(old, VersionedState::head(&self.history));

        if self.in_flight.is_some() {
            trace!(queued = self.queued.len(), "edit queued behind in-flight patch");
        }
        self.flush()
    }

    /// Put superseded edits back in front of the queue and send them fresh.
    fn reissue(&mut self, mut edits: Vec<EditFn<M::State>>) -> ModelResolution<M> {
        edits.append(&mut self.queued);
        self.queued = edits;
        match self.flush() {
            Some(next) => Resolution::Superseded(next),
            None => Resolution::Confirmed { next: None },
        }
    }

    /// The in-flight update was accepted as master version `base + 1`.
    fn confirm(&mut self) {
        let Some((base, edits)) = self.take_update() else {
            return;
        };
        let old = VersionedState::head(&self.history);

        match (base, self.confirmed.take()) {
            (Some(version), Some(anchor)) if anchor.version == version => {
                let count = edits.len() as Version;
                // The master now holds what the live state was when the
                // batch went out
                let state = match self.history.state_at(version + count) {
                    Ok(state) => state.clone(),
                    Err(_) => edits.iter().fold(anchor.state, |state, edit| edit(&state)),
                };
                if count > 1 {
                    self.collapse(version, count, state.clone());
                }
                trace!(version = version + 1, "update confirmed");
                self.confirmed = Some(Anchor {
                    version: version + 1,
                    state,
                });
            }
            (base, anchor) => {
                warn!(
                    ?base,
                    confirmed = ?anchor.map(|anchor| anchor.version),
                    "accepted update does not line up with local history, resyncing"
                );
            }
        }
        self.events.notify(old, VersionedState::head(&self.history));
    }

    /// The master records a batch of `count` edits as one version: fold their
    /// tentative states into the single state `base + 1`.
    fn collapse(&mut self, base: Version, count: Version, state: M::State) {
        let tail = self
            .history
            .states_from(base + count)
            .ok()
            .map(|states| states.into_iter().skip(1).cloned().collect::<Vec<_>>());

        match tail {
            Some(tail) if self.history.truncate_to(base).is_ok() => {
                self.history.push(state);
                for queued in tail {
                    self.history.push(queued);
                }
            }
            _ => {
                self.history.replace(state, Vec::new(), base + 1);
                self.replay_pending();
            }
        }

        // Versions past the batch shift down; a position inside it is gone
        let end = base + count;
        self.undo = self.undo.take().and_then(|mut cursor| {
            if cursor.position > base && cursor.position < end {
                return None;
            }
            if cursor.position >= end {
                cursor.position -= count - 1;
            }
            Some(cursor)
        });
    }

    fn merge_forward(&mut self, base: Version, diffs: &[M::Diff]) -> Result<bool> {
        let Some(confirmed) = self.base_version() else {
            debug!(base, "forward received before first sync");
            return Ok(false);
        };
        if base > confirmed {
            debug!(base, confirmed, "forward starts beyond confirmed version");
            return Ok(false);
        }

        let end = base + diffs.len() as Version;
        if end <= confirmed {
            trace!(end, confirmed, "forward carries nothing new");
            return Ok(true);
        }

        let start = match self.confirmed_state() {
            Some(state) if base == confirmed => state.clone(),
            _ => match self.history.state_at(base) {
                Ok(state) => state.clone(),
                Err(_) => {
                    debug!(
                        base,
                        retained = self.history.base_version(),
                        "forward outside retained window"
                    );
                    return Ok(false);
                }
            },
        };
        let mut replayed = M::replay(&start, diffs)
            .map_err(|source| SyncError::DiffRejected { version: base, source })?;

        let old = VersionedState::head(&self.history);
        if self.history.truncate_to(base).is_ok() {
            for state in replayed {
                self.history.push(state);
            }
        } else {
            let live = replayed.pop().unwrap_or_else(|| start.clone());
            let mut history = Vec::with_capacity(replayed.len() + 1);
            history.push(start);
            history.extend(replayed);
            self.history.replace(live, history, base);
        }
        self.settle_at(end, old);
        Ok(true)
    }

    fn merge_full(&mut self, base: Version, base_state: &M::State, diffs: &[M::Diff]) -> Result<()> {
        let mut states = M::replay(base_state, diffs)
            .map_err(|source| SyncError::DiffRejected { version: base, source })?;

        let old = VersionedState::head(&self.history);
        let (state, history) = match states.pop() {
            Some(live) => {
                let mut history = Vec::with_capacity(states.len() + 1);
                history.push(base_state.clone());
                history.extend(states);
                (live, history)
            }
            None => (base_state.clone(), Vec::new()),
        };
        self.history.replace(state, history, base);
        self.settle_at(base + diffs.len() as Version, old);
        Ok(())
    }

    /// Mark the live state as master version `version`, then replay pending
    /// edits on top of it.
    fn settle_at(&mut self, version: Version, old: VersionedState<M::State>) {
        self.confirmed = Some(Anchor {
            version,
            state: self.history.state().clone(),
        });
        self.undo = None;
        self.replay_pending();
        debug!(version, pending = self.pending_edits(), "merged master state");
        self.events.notify(old, VersionedState::head(&self.history));
    }

    fn replay_pending(&mut self) {
        for edit in self.pending_edit_fns() {
            let next = edit(self.history.state());
            self.history.push(next);
        }
    }

    fn in_flight_edits(&self) -> &[EditFn<M::State>] {
        match &self.in_flight {
            Some(InFlight {
                pending: Pending::Update { edits, .. },
                ..
            }) => edits,
            _ => &[],
        }
    }

    fn pending_edit_fns(&self) -> Vec<EditFn<M::State>> {
        self.in_flight_edits()
            .iter()
            .chain(self.queued.iter())
            .cloned()
            .collect()
    }

    /// Take the in-flight update apart. An in-flight sync stays in place.
    fn take_update(&mut self) -> Option<(Option<Version>, Vec<EditFn<M::State>>)> {
        match self.in_flight.take() {
            Some(InFlight {
                pending: Pending::Update { base, edits },
                ..
            }) => Some((base, edits)),
            other => {
                self.in_flight = other;
                None
            }
        }
    }

    fn is_in_flight(&self, ticket: Ticket) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.ticket == ticket)
    }

    fn issue_ticket(&mut self) -> Ticket {
        self.next_ticket += 1;
        Ticket(self.next_ticket)
    }
}

impl<M: DocumentModel> Default for SlaveFile<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileConfigBuilder;
    use crate::master::MasterFile;
    use crate::patch::PatchKind;
    use ipatch_core::JsonModel;
    use serde_json::{json, Value};

    type Slave = SlaveFile<JsonModel>;
    type Master = MasterFile<JsonModel>;

    fn set(key: &'static str, value: Value) -> impl Fn(&Value) -> Value + Send + Sync + 'static {
        move |state: &Value| {
            let mut next = state.clone();
            next[key] = value.clone();
            next
        }
    }

    fn drive(master: &mut Master, slave: &mut Slave, mut next: Option<ModelOutgoing<JsonModel>>) {
        while let Some(outgoing) = next {
            let response = master.apply(outgoing.patch()).unwrap();
            next = slave.accept(outgoing, response.as_ref()).unwrap().into_outgoing();
        }
    }

    fn synced(master: &mut Master) -> Slave {
        let mut slave = Slave::new();
        let sync = slave.sync().unwrap();
        let response = master.apply(sync.patch()).unwrap();
        assert!(slave.accept(sync, response.as_ref()).unwrap().is_confirmed());
        slave
    }

    #[test]
    fn test_update_is_visible_immediately() {
        let mut slave = Slave::new();
        let outgoing = slave.update(set("a", json!(1))).unwrap();

        assert_eq!(slave.get(), &json!({"a": 1}));
        assert_eq!(slave.current_version(), 1);
        assert_eq!(outgoing.patch().kind(), PatchKind::Update);
        assert_eq!(outgoing.patch().base_version(), None);
        assert!(slave.has_in_flight());
    }

    #[test]
    fn test_edits_queue_behind_in_flight_patch() {
        let mut master = Master::new();
        let mut slave = synced(&mut master);

        let first = slave.update(set("a", json!(1))).unwrap();
        assert!(slave.update(set("b", json!(2))).is_none());
        assert!(slave.update(set("c", json!(3))).is_none());
        assert_eq!(slave.pending_edits(), 3);
        assert!(slave.sync().is_none());

        let response = master.apply(first.patch()).unwrap();
        let next = match slave.accept(first, response.as_ref()).unwrap() {
            Resolution::Confirmed { next: Some(next) } => next,
            other => panic!("expected queued batch, got {:?}", other),
        };
        assert_eq!(slave.base_version(), Some(1));
        assert_eq!(next.patch().base_version(), Some(1));

        let response = master.apply(next.patch()).unwrap();
        assert!(response.is_none());
        let resolution = slave.accept(next, None).unwrap();
        assert!(matches!(resolution, Resolution::Confirmed { next: None }));

        // The two queued edits became one master version
        assert_eq!(master.current_version(), 2);
        assert_eq!(slave.base_version(), Some(2));
        assert_eq!(slave.current_version(), 2);
        assert_eq!(slave.get(), master.get());
        assert_eq!(slave.pending_edits(), 0);
    }

    #[test]
    fn test_retry_resends_original() {
        let mut slave = Slave::new();
        let outgoing = slave.update(set("a", json!(1))).unwrap();
        let original = outgoing.patch().clone();

        let retry = Patch::Retry {
            instance_id: InstanceId::from_string("master"),
        };
        match slave.accept(outgoing, Some(&retry)).unwrap() {
            Resolution::Resend(again) => assert_eq!(again.patch(), &original),
            other => panic!("expected resend, got {:?}", other),
        }
        assert_eq!(slave.get(), &json!({"a": 1}));
    }

    #[test]
    fn test_stale_ticket_is_ignored() {
        let mut master = Master::new();
        let mut slave = synced(&mut master);

        let outgoing = slave.update(set("a", json!(1))).unwrap();
        let copy = outgoing.clone();
        let response = master.apply(outgoing.patch()).unwrap();
        slave.accept(outgoing, response.as_ref()).unwrap();

        // A duplicated delivery of the same response changes nothing
        assert!(matches!(slave.accept(copy.clone(), None).unwrap(), Resolution::Stale));
        assert!(matches!(slave.reject(copy), Resolution::Stale));
        assert_eq!(slave.base_version(), Some(1));
    }

    #[test]
    fn test_reject_reissues_fresh_update() {
        let mut master = Master::new();
        let mut slave = synced(&mut master);

        let lost = slave.update(set("a", json!(1))).unwrap();
        let resent = match slave.reject(lost.clone()) {
            Resolution::Superseded(next) => next,
            other => panic!("expected superseded, got {:?}", other),
        };
        assert_ne!(resent.ticket(), lost.ticket());
        assert_eq!(resent.patch().base_version(), Some(0));
        assert_eq!(slave.get(), &json!({"a": 1}));

        let response = master.apply(resent.patch()).unwrap();
        assert!(slave.accept(resent, response.as_ref()).unwrap().is_confirmed());
        assert_eq!(master.get(), &json!({"a": 1}));
    }

    #[test]
    fn test_abandon_then_flush() {
        let mut master = Master::new();
        let mut slave = synced(&mut master);

        let outgoing = slave.update(set("a", json!(1))).unwrap();
        assert!(slave.abandon(&outgoing));
        assert!(!slave.has_in_flight());
        assert_eq!(slave.pending_edits(), 1);
        assert_eq!(slave.get(), &json!({"a": 1}));

        let again = slave.flush().unwrap();
        let response = master.apply(again.patch()).unwrap();
        assert!(slave.accept(again, response.as_ref()).unwrap().is_confirmed());
        assert_eq!(master.get(), slave.get());
        // The abandoned handle is now stale
        assert!(matches!(slave.accept(outgoing, None).unwrap(), Resolution::Stale));
    }

    #[test]
    fn test_merge_rejects_slave_patches() {
        let mut slave = Slave::new();
        let sync = Patch::Sync {
            instance_id: InstanceId::from_string("other"),
        };
        let err = slave.merge(&sync).unwrap_err();
        assert!(matches!(err, SyncError::WrongRole { role: Role::Slave, .. }));
    }

    #[test]
    fn test_forward_before_sync_is_unusable() {
        let mut slave = Slave::new();
        let forward = Patch::Forward {
            instance_id: InstanceId::from_string("master"),
            base_version: 0,
            diffs: vec![JsonModel::diff(&json!({}), &json!({"a": 1}))],
        };
        assert!(!slave.merge(&forward).unwrap());
        assert_eq!(slave.get(), &json!({}));
    }

    #[test]
    fn test_forward_beyond_confirmed_is_unusable() {
        let mut master = Master::new();
        let mut slave = synced(&mut master);
        let forward = Patch::Forward {
            instance_id: InstanceId::from_string("master"),
            base_version: 3,
            diffs: vec![JsonModel::diff(&json!({}), &json!({"a": 1}))],
        };
        assert!(!slave.merge(&forward).unwrap());
        assert_eq!(slave.base_version(), Some(0));
    }

    #[test]
    fn test_full_with_bad_diff_leaves_state_untouched() {
        let mut slave = Slave::new();
        slave.update(set("local", json!(true)));
        let full = Patch::Full {
            instance_id: InstanceId::from_string("master"),
            base_version: 0,
            base_state: json!({}),
            diffs: vec![JsonModel::diff(&json!({"x": {"y": 1}}), &json!({"x": {"y": 2}}))],
        };

        assert!(matches!(
            slave.merge(&full),
            Err(SyncError::DiffRejected { .. })
        ));
        assert_eq!(slave.get(), &json!({"local": true}));
        assert!(!slave.is_synced());
    }

    #[test]
    fn test_undo_redo_cursor() {
        let mut slave = Slave::new();
        slave.update(set("a", json!(1)));
        assert!(!slave.can_redo());
        assert!(slave.can_undo());

        slave.undo(1);
        assert_eq!(slave.get(), &json!({}));
        assert!(slave.can_redo());

        slave.redo(1);
        assert_eq!(slave.get(), &json!({"a": 1}));
        assert!(!slave.can_redo());
    }

    #[test]
    fn test_undo_clamps_to_window() {
        let mut slave = Slave::new();
        for i in 0..3 {
            slave.update(set("n", json!(i)));
        }
        slave.undo(50);
        assert_eq!(slave.get(), &json!({}));
        assert!(!slave.can_undo());
        assert!(slave.undo(1).is_none());

        slave.redo(50);
        assert_eq!(slave.get(), &json!({"n": 2}));
    }

    #[test]
    fn test_fresh_edit_clears_redo() {
        let mut slave = Slave::new();
        slave.update(set("a", json!(1)));
        slave.update(set("b", json!(2)));
        slave.undo(1);
        assert!(slave.can_redo());

        slave.update(set("c", json!(3)));
        assert!(!slave.can_redo());
        assert!(slave.redo(1).is_none());
        assert_eq!(slave.get(), &json!({"a": 1, "c": 3}));
    }

    #[test]
    fn test_redo_with_huge_count_stops_at_head() {
        let mut slave = Slave::new();
        slave.update(set("a", json!(1)));
        slave.update(set("b", json!(2)));
        slave.undo(1);
        assert_eq!(slave.get(), &json!({"a": 1}));

        slave.redo(usize::MAX);
        assert_eq!(slave.get(), &json!({"a": 1, "b": 2}));
        assert!(!slave.can_redo());
        assert!(slave.redo(usize::MAX).is_none());
    }

    #[test]
    fn test_forward_from_retained_base() {
        let config = FileConfigBuilder::new().history_capacity(2).build();
        let mut master = Master::new();
        let mut slave = Slave::with_config(config, &mut UlidSource);
        let sync = slave.sync();
        drive(&mut master, &mut slave, sync);
        for i in 0..4 {
            let outgoing = slave.update(set("n", json!(i)));
            drive(&mut master, &mut slave, outgoing);
        }
        assert_eq!(slave.base_version(), Some(4));
        assert_eq!(slave.history().base_version(), 2);

        let mut other = synced(&mut master);
        let outgoing = other.update(set("w", json!("x")));
        drive(&mut master, &mut other, outgoing);
        assert_eq!(master.current_version(), 5);

        let forward_from = |base: Version| Patch::Forward {
            instance_id: InstanceId::from_string("master"),
            base_version: base,
            diffs: master.history().diffs_from::<JsonModel>(base).unwrap(),
        };

        // Below the retained window there is nothing to replay onto
        assert!(!slave.merge(&forward_from(1)).unwrap());
        assert_eq!(slave.base_version(), Some(4));

        assert!(slave.merge(&forward_from(2)).unwrap());
        assert_eq!(slave.get(), master.get());
        assert_eq!(slave.base_version(), Some(5));
        assert_eq!(slave.current_version(), 5);
    }

    #[tokio::test]
    async fn test_change_events_follow_visible_changes() {
        let mut master = Master::new();
        let mut slave = synced(&mut master);
        let mut events = slave.subscribe();

        let first = slave.update(set("a", json!(1))).unwrap();
        let event = events.try_recv().unwrap();
        assert_eq!((event.old.version, event.new.version), (0, 1));
        assert_eq!(event.new.state, json!({"a": 1}));

        // Confirming a single edit changes neither state nor version
        let response = master.apply(first.patch()).unwrap();
        slave.accept(first, response.as_ref()).unwrap();
        assert!(events.try_recv().is_err());

        let first = slave.update(set("b", json!(2))).unwrap();
        slave.update(set("c", json!(3)));
        slave.update(set("d", json!(4)));
        for _ in 0..3 {
            events.try_recv().unwrap();
        }
        let response = master.apply(first.patch()).unwrap();
        let next = match slave.accept(first, response.as_ref()).unwrap() {
            Resolution::Confirmed { next: Some(next) } => next,
            other => panic!("expected queued batch, got {:?}", other),
        };
        assert!(events.try_recv().is_err());

        // The batch collapses into one version
        let response = master.apply(next.patch()).unwrap();
        slave.accept(next, response.as_ref()).unwrap();
        let event = events.try_recv().unwrap();
        assert_eq!((event.old.version, event.new.version), (4, 3));
        assert_eq!(event.old.state, event.new.state);
        assert!(events.try_recv().is_err());

        let mut other = synced(&mut master);
        let outgoing = other.update(set("w", json!("x")));
        drive(&mut master, &mut other, outgoing);

        let stale = slave.update(set("e", json!(5))).unwrap();
        events.try_recv().unwrap();
        let response = master.apply(stale.patch()).unwrap();
        assert_eq!(response.as_ref().map(Patch::kind), Some(PatchKind::Forward));
        let resolution = slave.accept(stale, response.as_ref()).unwrap();
        let event = events.try_recv().unwrap();
        assert_eq!(event.new.version, 5);
        assert_eq!(event.new.state["w"], json!("x"));
        assert_eq!(event.new.state["e"], json!(5));
        assert!(events.try_recv().is_err());
        drive(&mut master, &mut slave, resolution.into_outgoing());
        assert!(events.try_recv().is_err());

        let mut fresh = Slave::new();
        let mut fresh_events = fresh.subscribe();
        let outgoing = fresh.update(set("z", json!(0))).unwrap();
        fresh_events.try_recv().unwrap();
        let response = master.apply(outgoing.patch()).unwrap();
        assert_eq!(response.as_ref().map(Patch::kind), Some(PatchKind::Full));
        let resolution = fresh.accept(outgoing, response.as_ref()).unwrap();
        let event = fresh_events.try_recv().unwrap();
        assert_eq!(event.new.state["z"], json!(0));
        assert_eq!(event.new.state["e"], json!(5));
        assert!(fresh_events.try_recv().is_err());
        drive(&mut master, &mut fresh, resolution.into_outgoing());
        assert!(fresh_events.try_recv().is_err());
        assert_eq!(fresh.get(), master.get());
    }

    #[test]
    fn test_snapshot_excludes_tentative_edits() {
        let mut master = Master::new();
        let mut slave = synced(&mut master);
        assert!(Slave::new().snapshot().is_none());

        slave.update(set("a", json!(1)));
        let snapshot = slave.snapshot().unwrap();
        assert_eq!(snapshot.state, json!({}));
        assert_eq!(snapshot.current_version(), 0);

        let restored = Slave::from_snapshot(
            snapshot,
            FileConfig::default(),
            &mut ipatch_core::UlidSource,
        );
        assert_eq!(restored.base_version(), Some(0));
        assert_eq!(restored.get(), master.get());
    }
}
