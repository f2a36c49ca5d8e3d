//! Snapshot identifiers and mirror snapshot namespace records.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::identity::{MirrorUuid, PeerUuid};

/// Snapshot identifier assigned monotonically by the storage layer.
///
/// `NOSNAP` is the head sentinel: "the live image" in a range bound,
/// "no such snapshot" elsewhere. `ZERO` marks the initial image revision.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapId(u64);

impl SnapId {
    pub const ZERO: SnapId = SnapId(0);
    pub const NOSNAP: SnapId = SnapId(u64::MAX);

    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn is_head(self) -> bool {
        self == Self::NOSNAP
    }
}

impl fmt::Debug for SnapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_head() {
            write!(f, "SnapId(NOSNAP)")
        } else {
            write!(f, "SnapId({})", self.0)
        }
    }
}

impl fmt::Display for SnapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_head() {
            write!(f, "NOSNAP")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<u64> for SnapId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<SnapId> for u64 {
    fn from(id: SnapId) -> u64 {
        id.0
    }
}

/// Mapping from remote snapshot ids to the local snapshot ids that shadow
/// them, established by snapshot-copy and consumed by image-copy.
pub type SnapSeqs = BTreeMap<SnapId, SnapId>;

/// Role of a mirror snapshot, as persisted in its namespace record.
///
/// Stored as a raw byte so records written by a newer release still decode;
/// an unrecognized value fails classification instead of failing decode.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MirrorSnapshotState(u8);

impl MirrorSnapshotState {
    pub const PRIMARY: MirrorSnapshotState = MirrorSnapshotState(0);
    pub const PRIMARY_DEMOTED: MirrorSnapshotState = MirrorSnapshotState(1);
    pub const NON_PRIMARY: MirrorSnapshotState = MirrorSnapshotState(2);
    pub const NON_PRIMARY_DEMOTED: MirrorSnapshotState = MirrorSnapshotState(3);

    pub fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    pub fn is_primary(self) -> bool {
        matches!(self, Self::PRIMARY | Self::PRIMARY_DEMOTED)
    }

    pub fn is_non_primary(self) -> bool {
        matches!(self, Self::NON_PRIMARY | Self::NON_PRIMARY_DEMOTED)
    }

    pub fn is_demoted(self) -> bool {
        matches!(self, Self::PRIMARY_DEMOTED | Self::NON_PRIMARY_DEMOTED)
    }
}

impl fmt::Debug for MirrorSnapshotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::PRIMARY => write!(f, "primary"),
            Self::PRIMARY_DEMOTED => write!(f, "primary-demoted"),
            Self::NON_PRIMARY => write!(f, "non-primary"),
            Self::NON_PRIMARY_DEMOTED => write!(f, "non-primary-demoted"),
            Self(raw) => write!(f, "unknown({raw})"),
        }
    }
}

/// Per-snapshot mirror metadata persisted alongside the snapshot.
///
/// Written by the primary side when a mirror snapshot is taken and by the
/// replayer as it copies data (`complete`, `last_copied_object_number`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorSnapshotNamespace {
    pub state: MirrorSnapshotState,
    /// Source image mirror identity; set on non-primary snapshots.
    pub primary_mirror_uuid: MirrorUuid,
    /// Remote snapshot this local snapshot shadows; set on non-primary
    /// snapshots.
    pub primary_snap_id: SnapId,
    /// Peers that still have to sync this snapshot; set on primary
    /// snapshots.
    pub mirror_peer_uuids: BTreeSet<PeerUuid>,
    /// Snapshot metadata and data fully copied.
    pub complete: bool,
    pub snap_seqs: SnapSeqs,
    /// Resumable image-copy cursor.
    pub last_copied_object_number: u64,
}

impl MirrorSnapshotNamespace {
    pub fn primary<I>(peers: I) -> Self
    where
        I: IntoIterator<Item = PeerUuid>,
    {
        Self {
            state: MirrorSnapshotState::PRIMARY,
            mirror_peer_uuids: peers.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn non_primary(primary_mirror_uuid: MirrorUuid, primary_snap_id: SnapId) -> Self {
        Self {
            state: MirrorSnapshotState::NON_PRIMARY,
            primary_mirror_uuid,
            primary_snap_id,
            ..Self::default()
        }
    }

    pub fn demoted(mut self) -> Self {
        self.state = match self.state {
            MirrorSnapshotState::PRIMARY => MirrorSnapshotState::PRIMARY_DEMOTED,
            MirrorSnapshotState::NON_PRIMARY => MirrorSnapshotState::NON_PRIMARY_DEMOTED,
            other => other,
        };
        self
    }

    pub fn completed(mut self) -> Self {
        self.complete = true;
        self
    }

    pub fn is_primary(&self) -> bool {
        self.state.is_primary()
    }

    pub fn is_non_primary(&self) -> bool {
        self.state.is_non_primary()
    }

    pub fn is_demoted(&self) -> bool {
        self.state.is_demoted()
    }

    pub fn is_peer(&self, peer_uuid: &PeerUuid) -> bool {
        self.mirror_peer_uuids.contains(peer_uuid)
    }
}

impl Default for MirrorSnapshotNamespace {
    fn default() -> Self {
        Self {
            state: MirrorSnapshotState::NON_PRIMARY,
            primary_mirror_uuid: MirrorUuid::NIL,
            primary_snap_id: SnapId::ZERO,
            mirror_peer_uuids: BTreeSet::new(),
            complete: false,
            snap_seqs: SnapSeqs::new(),
            last_copied_object_number: 0,
        }
    }
}

/// One entry of an image's snapshot map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapInfo {
    pub name: String,
    /// Mirror namespace record; `None` for ordinary user snapshots.
    pub mirror: Option<MirrorSnapshotNamespace>,
}

impl SnapInfo {
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mirror: None,
        }
    }

    pub fn mirror(name: impl Into<String>, namespace: MirrorSnapshotNamespace) -> Self {
        Self {
            name: name.into(),
            mirror: Some(namespace),
        }
    }
}

/// An image's snapshots, ordered by ascending snapshot id.
pub type SnapshotMap = BTreeMap<SnapId, SnapInfo>;

/// Opaque image-state blob attached to a non-primary mirror snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageState(Bytes);

impl ImageState {
    pub fn new(bytes: Bytes) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn mirror_uuid(byte: u8) -> MirrorUuid {
        MirrorUuid::new(Uuid::from_bytes([byte; 16]))
    }

    #[test]
    fn snap_id_head_sentinel() {
        assert!(SnapId::NOSNAP.is_head());
        assert!(!SnapId::ZERO.is_head());
        assert!(SnapId::new(10) < SnapId::NOSNAP);
        assert_eq!(format!("{:?}", SnapId::NOSNAP), "SnapId(NOSNAP)");
        assert_eq!(format!("{}", SnapId::new(42)), "42");
    }

    #[test]
    fn state_classification_partitions_known_roles() {
        for state in [
            MirrorSnapshotState::PRIMARY,
            MirrorSnapshotState::PRIMARY_DEMOTED,
            MirrorSnapshotState::NON_PRIMARY,
            MirrorSnapshotState::NON_PRIMARY_DEMOTED,
        ] {
            assert!(state.is_primary() ^ state.is_non_primary());
        }

        let unknown = MirrorSnapshotState::from_raw(9);
        assert!(!unknown.is_primary());
        assert!(!unknown.is_non_primary());
        assert!(!unknown.is_demoted());
        assert_eq!(format!("{unknown:?}"), "unknown(9)");
    }

    #[test]
    fn demoted_builder_flips_state() {
        let primary = MirrorSnapshotNamespace::primary([]).demoted();
        assert!(primary.is_primary());
        assert!(primary.is_demoted());

        let non_primary =
            MirrorSnapshotNamespace::non_primary(mirror_uuid(1), SnapId::new(4)).demoted();
        assert!(non_primary.is_non_primary());
        assert!(non_primary.is_demoted());
    }

    #[test]
    fn peer_membership() {
        let peer = PeerUuid::new(Uuid::from_bytes([2u8; 16]));
        let other = PeerUuid::new(Uuid::from_bytes([3u8; 16]));
        let ns = MirrorSnapshotNamespace::primary([peer]);
        assert!(ns.is_peer(&peer));
        assert!(!ns.is_peer(&other));
    }

    #[test]
    fn namespace_round_trips_through_serde() {
        let ns = MirrorSnapshotNamespace {
            snap_seqs: SnapSeqs::from([(SnapId::new(10), SnapId::new(100))]),
            last_copied_object_number: 42,
            ..MirrorSnapshotNamespace::non_primary(mirror_uuid(1), SnapId::new(10)).completed()
        };
        let encoded = serde_json::to_string(&ns).expect("encode");
        let decoded: MirrorSnapshotNamespace = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, ns);
    }
}
