//! Image session seams consumed by the replayer.
//!
//! The replayer never opens or closes images; it borrows a local/remote pair
//! from its container and talks to both through these traits. Completions
//! may be invoked from any thread; the replayer re-queues them onto its work
//! queue before touching state.

pub mod pool_meta;
pub mod requests;

use std::sync::Arc;

use crate::core::{ImageError, MirrorUuid, PoolId, SnapId, SnapshotMap};

pub use pool_meta::{PoolMetaCache, RemotePoolMeta};
pub use requests::{
    CopyEngine, CopyProgressHandler, CreateNonPrimaryParams, EngineCompletion, ImageCopyParams,
    SnapshotCopyParams,
};

pub type ImageResult<T = ()> = Result<T, ImageError>;

/// One-shot completion for an asynchronous image operation.
pub type ImageCompletion = Box<dyn FnOnce(ImageResult) + Send>;

/// Registration handle for a remote-image update watch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatcherHandle(pub u64);

/// Receives remote-image change notifications. Implementations must be
/// reentrancy-safe and non-blocking; notifications can arrive from any
/// thread.
pub trait UpdateHandler: Send + Sync {
    fn handle_update(&self);
}

/// Shared surface of the local and remote image sessions.
pub trait Image: Send + Sync {
    fn mirror_uuid(&self) -> MirrorUuid;

    fn is_refresh_required(&self) -> bool;

    fn refresh(&self, on_finish: ImageCompletion);

    /// Snapshot map captured under the image read lock, ascending snap id.
    fn snapshots(&self) -> SnapshotMap;

    /// Broadcast a watch notification for this image's header.
    fn notify_update(&self, on_finish: ImageCompletion);
}

/// The destination image of the mirroring relationship.
pub trait LocalImage: Image {
    /// Write `(complete, last_copied_object_number)` into the mirror
    /// namespace record of `snap_id` via an atomic header object operation.
    fn update_mirror_snapshot(
        &self,
        snap_id: SnapId,
        complete: bool,
        last_copied_object_number: u64,
        on_finish: ImageCompletion,
    );
}

/// The source image of the mirroring relationship.
pub trait RemoteImage: Image {
    fn pool_id(&self) -> PoolId;

    fn register_update_watcher(
        &self,
        handler: Arc<dyn UpdateHandler>,
    ) -> ImageResult<WatcherHandle>;

    fn unregister_update_watcher(&self, handle: WatcherHandle, on_finish: ImageCompletion);
}
