//! Error types for the replication protocol.
//!
//! Only malformed input surfaces here. Version races, stale clients and
//! out-of-window requests are answered with response patches instead.

use crate::patch::PatchKind;
use ipatch_core::DiffError;
use ipatch_history::Version;
use std::fmt;
use thiserror::Error;

/// The side of the protocol handling a patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Master => write!(f, "master"),
            Role::Slave => write!(f, "slave"),
        }
    }
}

/// Errors that can occur while applying, merging or decoding patches.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Protocol error: a {kind} patch cannot be handled by a {role}")]
    WrongRole { kind: PatchKind, role: Role },

    #[error("Protocol error: diff does not apply at version {version}: {source}")]
    DiffRejected {
        version: Version,
        #[source]
        source: DiffError,
    },

    #[error("Codec error: {0}")]
    Codec(String),
}

impl SyncError {
    /// True for errors caused by a patch that is invalid for its receiver.
    pub fn is_protocol(&self) -> bool {
        !matches!(self, SyncError::Codec(_))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Codec(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
