//! Identifiers for runs, trajectories, memory items, and ontologies.
//!
//! Two id families coexist. *Minted* ids ([`RunId`], [`TrajectoryId`])
//! are created fresh per run and carry a short kind prefix (`run-…`,
//! `traj-…`) so a row in any store is self-describing. *Derived* ids are
//! pure functions of something else: a [`MemoryId`] is the leading hex
//! of a content digest (see [`MemoryId::from_digest`]), and an
//! [`OntologyId`] is whatever name the caller registered the ontology
//! under.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex chars of a content digest kept as a [`MemoryId`].
pub const MEMORY_ID_HEX: usize = 16;

macro_rules! ids {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an identifier produced elsewhere (a store row, a
            /// pack record, a caller-chosen name).
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier text.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    )+};
}

macro_rules! minted {
    ($($name:ident => $prefix:literal),+ $(,)?) => {$(
        impl $name {
            /// Mint a fresh, prefixed id for a new record.
            pub fn mint() -> Self {
                Self(format!(concat!($prefix, "-{}"), uuid::Uuid::new_v4()))
            }
        }
    )+};
}

ids! {
    /// Identifier of one caller-facing run.
    RunId,
    /// Identifier of one driver trajectory.
    TrajectoryId,
    /// Content-addressed identifier of a memory item.
    MemoryId,
    /// Name a loaded ontology is registered under (used for memory
    /// scoping).
    OntologyId,
}

minted! {
    RunId => "run",
    TrajectoryId => "traj",
}

impl MemoryId {
    /// Derive the id from a content digest: the first
    /// [`MEMORY_ID_HEX`] hex chars. Every store and pack that hashes
    /// the same content fields lands on the same id, which is what
    /// makes upserts and imports idempotent.
    pub fn from_digest(digest: &[u8]) -> Self {
        let mut hex = String::with_capacity(MEMORY_ID_HEX);
        for byte in digest {
            if hex.len() >= MEMORY_ID_HEX {
                break;
            }
            hex.push_str(&format!("{byte:02x}"));
        }
        hex.truncate(MEMORY_ID_HEX);
        Self(hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_ids_carry_their_kind_prefix() {
        assert!(RunId::mint().as_str().starts_with("run-"));
        assert!(TrajectoryId::mint().as_str().starts_with("traj-"));
    }

    #[test]
    fn minted_ids_are_unique() {
        assert_ne!(RunId::mint(), RunId::mint());
        assert_ne!(TrajectoryId::mint(), TrajectoryId::mint());
    }

    #[test]
    fn memory_id_from_digest_is_16_hex() {
        let id = MemoryId::from_digest(&[0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03, 0x04, 0x05]);
        assert_eq!(id.as_str(), "deadbeef01020304");
        assert_eq!(id.as_str().len(), MEMORY_ID_HEX);
    }

    #[test]
    fn short_digest_yields_short_id() {
        // Degenerate input stays deterministic rather than padding.
        assert_eq!(MemoryId::from_digest(&[0xab]).as_str(), "ab");
    }

    #[test]
    fn display_matches_inner() {
        assert_eq!(OntologyId::new("prov").to_string(), "prov");
    }

    #[test]
    fn serde_is_transparent() {
        let id = MemoryId::new("deadbeefdeadbeef");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"deadbeefdeadbeef\"");
        let back: MemoryId = serde_json::from_str("\"deadbeefdeadbeef\"").unwrap();
        assert_eq!(id, back);
    }
}
