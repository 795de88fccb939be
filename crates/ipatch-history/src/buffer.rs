//! Bounded, version-addressed window of document states.
//!
//! The buffer owns the live state and the states that preceded it, oldest
//! first. Versions are implicit: the oldest retained entry is `base_version`,
//! the live state is `base_version + history.len()`.

use crate::error::{HistoryError, Result};
use crate::snapshot::FileSnapshot;
use ipatch_core::DocumentModel;
use std::collections::VecDeque;

/// Version number naming a reachable document state.
pub type Version = u64;

/// Default number of past states retained.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Live state plus a sliding window of past states.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryBuffer<S> {
    /// The live state (version `current_version()`)
    state: S,
    /// Past states, oldest first
    history: VecDeque<S>,
    /// Version of `history[0]`, or of `state` when history is empty
    base_version: Version,
    /// Maximum number of past states retained
    capacity: usize,
}

impl<S: Clone> HistoryBuffer<S> {
    /// Create a buffer at version 0 with the default capacity.
    pub fn new(state: S) -> Self {
        Self::with_capacity(state, DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(state: S, capacity: usize) -> Self {
        Self {
            state,
            history: VecDeque::new(),
            base_version: 0,
            capacity,
        }
    }

    /// Build a buffer from raw parts, evicting the oldest entries if `history`
    /// exceeds `capacity`.
    pub fn from_parts(state: S, history: Vec<S>, base_version: Version, capacity: usize) -> Self {
        let mut buffer = Self::with_capacity(state, capacity);
        buffer.history = history.into();
        buffer.base_version = base_version;
        buffer.trim();
        buffer
    }

    pub fn from_snapshot(snapshot: FileSnapshot<S>, capacity: usize) -> Self {
        Self::from_parts(snapshot.state, snapshot.history, snapshot.base_version, capacity)
    }

    /// The live state.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Version of the oldest retained state.
    pub fn base_version(&self) -> Version {
        self.base_version
    }

    /// Version of the live state.
    pub fn current_version(&self) -> Version {
        self.base_version + self.history.len() as Version
    }

    /// Number of retained past states.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The oldest retained state (the live state when history is empty).
    pub fn oldest(&self) -> &S {
        self.history.front().unwrap_or(&self.state)
    }

    /// Past states, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &S> {
        self.history.iter()
    }

    /// Make `state` live, moving the previous live state into history.
    /// Returns the number of entries evicted from the front.
    pub fn push(&mut self, state: S) -> usize {
        let previous = std::mem::replace(&mut self.state, state);
        self.history.push_back(previous);
        self.trim()
    }

    /// Overwrite state, history and base version in one step.
    pub fn replace(&mut self, state: S, history: Vec<S>, base_version: Version) {
        self.state = state;
        self.history = history.into();
        self.base_version = base_version;
        self.trim();
    }

    /// Drop every state newer than `version`, making the state at `version` live.
    pub fn truncate_to(&mut self, version: Version) -> Result<()> {
        self.check(version)?;
        let keep = (version - self.base_version) as usize;
        if keep < self.history.len() {
            self.history.truncate(keep + 1);
            if let Some(state) = self.history.pop_back() {
                self.state = state;
            }
        }
        Ok(())
    }

    /// The state at `version`.
    pub fn state_at(&self, version: Version) -> Result<&S> {
        self.check(version)?;
        let offset = (version - self.base_version) as usize;
        Ok(self.history.get(offset).unwrap_or(&self.state))
    }

    /// Every state from `version` up to and including the live state.
    pub fn states_from(&self, version: Version) -> Result<Vec<&S>> {
        self.check(version)?;
        let offset = (version - self.base_version) as usize;
        Ok(self
            .history
            .iter()
            .skip(offset)
            .chain(std::iter::once(&self.state))
            .collect())
    }

    /// Consecutive diffs carrying the state at `version` to the live state.
    /// Recomputed from the retained states on every call.
    pub fn diffs_from<M>(&self, version: Version) -> Result<Vec<M::Diff>>
    where
        M: DocumentModel<State = S>,
    {
        let states = self.states_from(version)?;
        Ok(states.windows(2).map(|pair| M::diff(pair[0], pair[1])).collect())
    }

    /// Capture the buffer in its persistence form.
    pub fn snapshot(&self) -> FileSnapshot<S> {
        FileSnapshot {
            state: self.state.clone(),
            history: self.history.iter().cloned().collect(),
            base_version: self.base_version,
        }
    }

    fn check(&self, version: Version) -> Result<()> {
        if version < self.base_version || version > self.current_version() {
            return Err(HistoryError::OutOfWindow {
                version,
                base: self.base_version,
                current: self.current_version(),
            });
        }
        Ok(())
    }

    fn trim(&mut self) -> usize {
        let excess = self.history.len().saturating_sub(self.capacity);
        if excess > 0 {
            self.history.drain(..excess);
            self.base_version += excess as Version;
        }
        excess
    }
}
