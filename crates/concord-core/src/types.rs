//! Strong type definitions for Concord.
//!
//! Identifiers are newtypes so a client id can never be passed where a
//! timestamp or document id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical timestamp assigned by the originating client.
///
/// Monotonically increasing per client; unique per client, not globally.
pub type Timestamp = u64;

/// Identifier of an editing client.
///
/// Client ids are totally ordered; the order is what breaks ties between
/// concurrent edits at the same position, so every replica must agree on it.
/// Ids stay within 31 bits to fit the non-negative integer on the wire.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u32);

impl ClientId {
    /// Mask keeping ids inside the non-negative `i32` range.
    pub const MASK: u32 = 0x7FFF_FFFF;

    /// Derive a stable client id from a user identifier.
    ///
    /// The same user gets the same id across restarts and devices.
    pub fn derive(user_id: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"concord-client-v0:");
        hasher.update(user_id.as_bytes());
        let hash = hasher.finalize();
        let bytes = hash.as_bytes();
        let raw = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Self(raw & Self::MASK)
    }

    /// Generate a random client id (for unauthenticated clients).
    pub fn random() -> Self {
        use rand::Rng;
        Self(rand::thread_rng().gen::<u32>() & Self::MASK)
    }

    /// Get the raw value.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", self.0)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ClientId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Identifier of a collaboratively edited document (e.g. a channel).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a document id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
