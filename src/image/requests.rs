//! One-shot asynchronous copy primitives.
//!
//! The deep-copy machinery lives outside this crate; the replayer drives it
//! through [`CopyEngine`], one request in flight at a time. Every request
//! either completes its callback exactly once or never returns.

use std::sync::Arc;

use crate::core::{ImageError, ImageState, MirrorUuid, PeerUuid, SnapId, SnapSeqs};

pub type EngineCompletion<T> = Box<dyn FnOnce(Result<T, ImageError>) + Send>;

/// Receives image-copy progress callbacks. Invoked from the copy engine's
/// own threads; must not block.
pub trait CopyProgressHandler: Send + Sync {
    fn handle_progress(&self, object_number: u64, object_count: u64);
}

/// Bounds for copying snapshot metadata from the remote to the local image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotCopyParams {
    /// Last fully synced remote snapshot, exclusive lower bound; `ZERO`
    /// for an initial sync.
    pub remote_snap_id_start: SnapId,
    pub remote_snap_id_end: SnapId,
    pub local_snap_id_start: SnapId,
    pub flatten: bool,
}

/// Inputs for creating the local non-primary snapshot shadowing
/// `primary_snap_id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateNonPrimaryParams {
    pub demoted: bool,
    pub primary_mirror_uuid: MirrorUuid,
    pub primary_snap_id: SnapId,
    pub snap_seqs: SnapSeqs,
    pub image_state: ImageState,
}

/// Bounds and resume cursor for the byte-level delta copy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageCopyParams {
    pub remote_snap_id_start: SnapId,
    pub remote_snap_id_end: SnapId,
    pub local_snap_id_start: SnapId,
    pub flatten: bool,
    /// Resume mid-stream after this object when set.
    pub resume_object_number: Option<u64>,
    pub snap_seqs: SnapSeqs,
}

/// Factory surface for the copy requests. Implementations are constructed
/// around a fixed local/remote image pair.
pub trait CopyEngine: Send + Sync {
    /// Copy snapshot metadata in `(start, end]` to the local image and
    /// report the resulting remote-to-local snapshot id mapping.
    fn copy_snapshots(&self, params: SnapshotCopyParams, on_finish: EngineCompletion<SnapSeqs>);

    /// Fetch the opaque image-state blob recorded with a remote snapshot.
    fn get_image_state(&self, snap_id: SnapId, on_finish: EngineCompletion<ImageState>);

    /// Create the local non-primary snapshot and report its id.
    fn create_non_primary_snapshot(
        &self,
        params: CreateNonPrimaryParams,
        on_finish: EngineCompletion<SnapId>,
    );

    /// Copy the byte-level delta between the sync bounds.
    fn copy_image(
        &self,
        params: ImageCopyParams,
        progress: Arc<dyn CopyProgressHandler>,
        on_finish: EngineCompletion<()>,
    );

    /// Drop `peer_uuid` from the peer set of the superseded remote
    /// snapshot. Completing with `NotFound` is expected when another
    /// daemon instance already unlinked it.
    fn unlink_peer(&self, snap_id: SnapId, peer_uuid: PeerUuid, on_finish: EngineCompletion<()>);
}
