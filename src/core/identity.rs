//! Identity atoms for mirrored images and peers.
//!
//! MirrorUuid: mirror identity of one image in a mirroring relationship
//! PeerUuid: one end of a mirror peer link
//! PoolId: storage pool housing an image

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mirror identity of an image. The nil uuid means "not mirrored".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MirrorUuid(Uuid);

impl MirrorUuid {
    pub const NIL: MirrorUuid = MirrorUuid(Uuid::nil());

    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Debug for MirrorUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MirrorUuid({})", self.0)
    }
}

impl fmt::Display for MirrorUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MirrorUuid {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<MirrorUuid> for Uuid {
    fn from(id: MirrorUuid) -> Uuid {
        id.0
    }
}

/// Identifier for one end of a mirror peer link.
///
/// A primary mirror snapshot lists the peer uuids that still have to sync
/// it before it may be unlinked. The nil uuid means "unresolved".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerUuid(Uuid);

impl PeerUuid {
    pub const NIL: PeerUuid = PeerUuid(Uuid::nil());

    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Debug for PeerUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerUuid({})", self.0)
    }
}

impl fmt::Display for PeerUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for PeerUuid {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<PeerUuid> for Uuid {
    fn from(id: PeerUuid) -> Uuid {
        id.0
    }
}

/// Storage pool identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(i64);

impl PoolId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Debug for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PoolId({})", self.0)
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PoolId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}
