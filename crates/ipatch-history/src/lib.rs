//! # ipatch-history
//!
//! Version bookkeeping shared by master and slave files:
//! - [`HistoryBuffer`]: the live state plus a bounded window of past states
//! - [`FileSnapshot`]: the `{state, history, baseVersion}` persistence form
//! - [`ChangeNotifier`] / [`FileEvent`]: the single "changed" observation hook
//!
//! ## Versioning
//!
//! ```text
//!   base_version                       current_version
//!        |                                   |
//!        v                                   v
//!      [ h0 ][ h1 ][ h2 ] ... [ hn-1 ]    state
//!
//!   current_version = base_version + history.len()
//! ```
//!
//! Pushing past the capacity evicts from the front and advances `base_version`
//! by the number of evicted entries.

pub mod buffer;
pub mod error;
pub mod events;
pub mod snapshot;

pub use buffer::{HistoryBuffer, Version, DEFAULT_HISTORY_CAPACITY};
pub use error::{HistoryError, Result};
pub use events::{ChangeNotifier, FileEvent, VersionedState};
pub use snapshot::FileSnapshot;
