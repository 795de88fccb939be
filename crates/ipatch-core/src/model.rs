//! The diff capability - the only thing the protocol needs to know about documents.
//!
//! A model pairs an immutable tree value (`State`) with a directed delta type
//! (`Diff`). The replication core never looks inside either; it only computes,
//! applies and ships them.
//!
//! Laws:
//!  - Diff law: `apply_diff(a, &diff(a, b)) == b` for all reachable `a`, `b`
//!  - Identity: `is_identity(&diff(a, a))`
//!  - Size: a diff grows with the structural difference, not the document

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use thiserror::Error;

/// Errors raised when a diff does not fit the state it is applied to.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiffError {
    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Type mismatch at {path}: expected {expected}")]
    TypeMismatch { path: String, expected: String },

    #[error("Index out of bounds at {path}: {index} (length: {length})")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        length: usize,
    },

    #[error("Cannot remove the document root")]
    RootRemoval,
}

/// A document value model with a structural diff.
pub trait DocumentModel {
    /// Immutable tree value. Equality is structural.
    type State: Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Directed delta between two states.
    type Diff: Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// The state every fresh file starts from.
    fn empty() -> Self::State;

    /// Compute the delta that turns `from` into `to`.
    fn diff(from: &Self::State, to: &Self::State) -> Self::Diff;

    /// Apply a delta, producing a new state. `state` is left untouched.
    fn apply_diff(state: &Self::State, diff: &Self::Diff) -> Result<Self::State, DiffError>;

    /// True if applying `diff` changes nothing.
    fn is_identity(diff: &Self::Diff) -> bool;

    /// Replay a chain of consecutive diffs, returning every intermediate state
    /// (excluding `base`). Fails on the first diff that does not apply.
    fn replay(base: &Self::State, diffs: &[Self::Diff]) -> Result<Vec<Self::State>, DiffError> {
        let mut states: Vec<Self::State> = Vec::with_capacity(diffs.len());
        for diff in diffs {
            let next = Self::apply_diff(states.last().unwrap_or(base), diff)?;
            states.push(next);
        }
        Ok(states)
    }
}
