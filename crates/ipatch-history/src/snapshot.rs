//! Persistence form of a file.
//!
//! A snapshot is everything needed to rebuild a file exactly: the live state,
//! the retained history and the version of its oldest entry. Used for cold
//! starts and for handing master state to a new process.

use crate::buffer::Version;
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// `{state, history, baseVersion}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSnapshot<S> {
    /// The live state.
    pub state: S,
    /// Past states, oldest first.
    pub history: Vec<S>,
    /// Version of `history[0]` (or of `state` when history is empty).
    pub base_version: Version,
}

impl<S> FileSnapshot<S> {
    /// Version of the live state.
    pub fn current_version(&self) -> Version {
        self.base_version + self.history.len() as Version
    }
}

impl<S: Serialize> FileSnapshot<S> {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl<S: DeserializeOwned> FileSnapshot<S> {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
