//! # ipatch-sync
//!
//! Master/slave reconciliation of a replicated document.
//!
//! One [`MasterFile`] holds the authoritative copy. Any number of
//! [`SlaveFile`]s edit optimistically and exchange [`Patch`]es with it:
//!
//! ```text
//!   slave                                   master
//!   sync()            ---- Sync ---------->  apply()
//!                     <--- Full -----------
//!   update(f)         ---- Update(V, d) -->  V == current: accept (None)
//!                     <--- Forward / Full -  V behind: catch the slave up
//!                     <--- Retry ----------  V ahead: version race
//! ```
//!
//! Every outgoing slave patch comes back to the slave through
//! [`SlaveFile::accept`] or [`SlaveFile::reject`], which settle the edit or
//! produce the next patch to send.
//!
//! ## Example
//!
//! ```rust
//! use ipatch_sync::{JsonMasterFile, JsonSlaveFile};
//! use serde_json::json;
//!
//! let mut master = JsonMasterFile::new();
//! let mut slave = JsonSlaveFile::new();
//!
//! let mut outgoing = slave.update(|_| json!({"lol": "woot"}));
//! while let Some(patch) = outgoing {
//!     let response = master.apply(patch.patch()).unwrap();
//!     outgoing = slave.accept(patch, response.as_ref()).unwrap().into_outgoing();
//! }
//!
//! assert_eq!(master.get(), &json!({"lol": "woot"}));
//! assert_eq!(slave.get(), master.get());
//! assert_eq!(master.current_version(), 1);
//! ```

pub mod config;
pub mod error;
pub mod master;
pub mod patch;
pub mod slave;

pub use config::{FileConfig, FileConfigBuilder};
pub use error::{Result, Role, SyncError};
pub use master::MasterFile;
pub use patch::{ModelPatch, Patch, PatchKind};
pub use slave::{EditFn, ModelOutgoing, ModelResolution, Outgoing, Resolution, SlaveFile, Ticket};

pub use ipatch_core::{DocumentModel, InstanceId, JsonModel};
pub use ipatch_history::{FileEvent, FileSnapshot, Version, VersionedState};

/// Master over JSON documents.
pub type JsonMasterFile = MasterFile<JsonModel>;

/// Slave over JSON documents.
pub type JsonSlaveFile = SlaveFile<JsonModel>;
