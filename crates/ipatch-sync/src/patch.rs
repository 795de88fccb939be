//! The five patch kinds and their wire codec.
//!
//! | Kind    | Producer | Meaning                                              |
//! |---------|----------|------------------------------------------------------|
//! | sync    | slave    | no usable state, send everything                     |
//! | update  | slave    | apply this diff, assuming `baseVersion`              |
//! | forward | master   | replay these diffs from `baseVersion` to my head     |
//! | full    | master   | start over at `baseState`/`baseVersion`, replay diffs |
//! | retry   | master   | claimed `baseVersion` is ahead of me, resend         |
//!
//! On the wire every patch is a JSON object whose `type` field names the kind.
//! Continuations never travel; they live with the slave that sent the patch.

use crate::error::Result;
use ipatch_core::{DocumentModel, InstanceId};
use ipatch_history::Version;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A protocol message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Patch<S, D> {
    Sync {
        #[serde(rename = "instanceId")]
        instance_id: InstanceId,
    },
    Update {
        #[serde(rename = "instanceId")]
        instance_id: InstanceId,
        /// `None` when the sender has never synced.
        #[serde(rename = "baseVersion")]
        base_version: Option<Version>,
        diff: D,
    },
    Forward {
        #[serde(rename = "instanceId")]
        instance_id: InstanceId,
        #[serde(rename = "baseVersion")]
        base_version: Version,
        diffs: Vec<D>,
    },
    Full {
        #[serde(rename = "instanceId")]
        instance_id: InstanceId,
        #[serde(rename = "baseVersion")]
        base_version: Version,
        #[serde(rename = "baseState")]
        base_state: S,
        diffs: Vec<D>,
    },
    Retry {
        #[serde(rename = "instanceId")]
        instance_id: InstanceId,
    },
}

/// Patch type for a document model.
pub type ModelPatch<M> = Patch<<M as DocumentModel>::State, <M as DocumentModel>::Diff>;

/// Discriminant of a [`Patch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PatchKind {
    Sync,
    Update,
    Forward,
    Full,
    Retry,
}

impl PatchKind {
    /// The wire discriminator.
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchKind::Sync => "sync",
            PatchKind::Update => "update",
            PatchKind::Forward => "forward",
            PatchKind::Full => "full",
            PatchKind::Retry => "retry",
        }
    }
}

impl fmt::Display for PatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<S, D> Patch<S, D> {
    pub fn kind(&self) -> PatchKind {
        match self {
            Patch::Sync { .. } => PatchKind::Sync,
            Patch::Update { .. } => PatchKind::Update,
            Patch::Forward { .. } => PatchKind::Forward,
            Patch::Full { .. } => PatchKind::Full,
            Patch::Retry { .. } => PatchKind::Retry,
        }
    }

    /// The instance that produced this patch.
    pub fn instance_id(&self) -> &InstanceId {
        match self {
            Patch::Sync { instance_id }
            | Patch::Update { instance_id, .. }
            | Patch::Forward { instance_id, .. }
            | Patch::Full { instance_id, .. }
            | Patch::Retry { instance_id } => instance_id,
        }
    }

    /// The version this patch assumes as its starting point, if any.
    pub fn base_version(&self) -> Option<Version> {
        match self {
            Patch::Update { base_version, .. } => *base_version,
            Patch::Forward { base_version, .. } | Patch::Full { base_version, .. } => {
                Some(*base_version)
            }
            Patch::Sync { .. } | Patch::Retry { .. } => None,
        }
    }
}

impl<S: Serialize, D: Serialize> Patch<S, D> {
    /// Encode to the JSON wire form.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl<S: DeserializeOwned, D: DeserializeOwned> Patch<S, D> {
    /// Decode from the JSON wire form.
    pub fn decode(wire: &str) -> Result<Self> {
        Ok(serde_json::from_str(wire)?)
    }
}
