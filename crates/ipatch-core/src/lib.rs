//! # ipatch-core
//!
//! Building blocks shared by every ipatch replica:
//! - [`DocumentModel`]: the structural diff capability the protocol is generic over
//! - [`JsonModel`]: a diff capability over `serde_json::Value` trees
//! - [`InstanceId`] and the injectable [`IdSource`] used to tag patches
//!
//! The diff law every model must satisfy:
//!
//! ```text
//! apply_diff(a, diff(a, b)) == b
//! ```

pub mod id;
pub mod json;
pub mod model;

pub use id::{IdSource, InstanceId, RngIdSource, UlidSource};
pub use json::{JsonDiff, JsonDiffOp, JsonModel, PathSegment};
pub use model::{DiffError, DocumentModel};
