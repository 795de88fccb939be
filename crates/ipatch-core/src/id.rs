//! Instance identifiers.
//!
//! Every file instance gets an id once, at construction. Ids are carried on
//! patches for traceability only; nothing in the protocol branches on them.
//! The source of randomness is injected so tests can be deterministic.

use rand::Rng;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifier of one master or slave file instance.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Generate a fresh ULID-based id.
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Wrap an existing id string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A capability that hands out instance ids.
pub trait IdSource {
    fn next_id(&mut self) -> InstanceId;
}

/// Time-ordered ULIDs from the system clock and thread RNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct UlidSource;

impl IdSource for UlidSource {
    fn next_id(&mut self) -> InstanceId {
        InstanceId::new()
    }
}

/// ULIDs drawn from a caller-supplied RNG with a zero timestamp.
/// Seed the RNG to get reproducible ids.
#[derive(Clone, Debug)]
pub struct RngIdSource<R> {
    rng: R,
}

impl<R: Rng> RngIdSource<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> IdSource for RngIdSource<R> {
    fn next_id(&mut self) -> InstanceId {
        let random: u128 = self.rng.gen();
        InstanceId(Ulid::from_parts(0, random).to_string())
    }
}
