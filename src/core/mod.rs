//! Core domain types for snapshot-based mirroring.
//!
//! - identity: MirrorUuid, PeerUuid, PoolId
//! - snapshot: SnapId, mirror snapshot namespace records, snapshot maps
//! - error: abstract error vocabulary for image and copy operations

pub mod error;
pub mod identity;
pub mod snapshot;

pub use error::{ErrorKind, ImageError};
pub use identity::{MirrorUuid, PeerUuid, PoolId};
pub use snapshot::{
    ImageState, MirrorSnapshotNamespace, MirrorSnapshotState, SnapId, SnapInfo, SnapSeqs,
    SnapshotMap,
};
