//! Sync pipeline execution.
//!
//! Drives one sync plan through its stages: copy snapshot metadata, fetch
//! the remote image state, create the local non-primary snapshot, copy the
//! image delta, record completion, notify, unlink the superseded peer link.
//! Stages run strictly in order; every boundary checks whether the replayer
//! was torn down underneath the request.

use std::sync::{Arc, Weak};

use tracing::{debug, error, trace, warn};

use crate::core::{ImageState, SnapId, SnapSeqs};
use crate::image::{
    CopyProgressHandler, CreateNonPrimaryParams, ImageCopyParams, ImageResult, SnapshotCopyParams,
};

use super::core::Inner;
use super::error::ReplayError;

/// Relays image-copy progress back to the replayer without owning it.
pub(crate) struct CopyProgressRelay {
    pub(crate) replayer: Weak<Inner>,
}

impl CopyProgressHandler for CopyProgressRelay {
    fn handle_progress(&self, object_number: u64, object_count: u64) {
        if let Some(inner) = self.replayer.upgrade() {
            inner.handle_copy_image_progress(object_number, object_count);
        }
    }
}

impl Inner {
    pub(crate) fn copy_snapshots(&self) {
        debug!("copying snapshot metadata");

        let params = {
            let mut shared = self.shared();
            let sync = &mut shared.sync;
            assert!(!sync.remote_snap_id_start.is_head());
            assert!(
                sync.remote_snap_id_end > SnapId::ZERO && !sync.remote_snap_id_end.is_head()
            );
            assert!(!sync.local_snap_id_start.is_head());

            sync.local_snap_ns = Default::default();
            SnapshotCopyParams {
                remote_snap_id_start: sync.remote_snap_id_start,
                remote_snap_id_end: sync.remote_snap_id_end,
                local_snap_id_start: sync.local_snap_id_start,
                flatten: false,
            }
        };
        self.engine
            .copy_snapshots(params, self.queued(Inner::handle_copy_snapshots));
    }

    fn handle_copy_snapshots(&self, result: ImageResult<SnapSeqs>) {
        let snap_seqs = match result {
            Ok(snap_seqs) => snap_seqs,
            Err(err) => {
                error!(error = %err, "failed to copy snapshots from remote to local image");
                self.handle_replay_complete(
                    Err(ReplayError::SnapshotCopy(err)),
                    "failed to copy snapshots from remote to local image",
                );
                return;
            }
        };

        debug!(?snap_seqs, "snapshot metadata copied");
        if self.is_replay_interrupted() {
            return;
        }

        self.shared().sync.local_snap_ns.snap_seqs = snap_seqs;
        self.get_image_state();
    }

    fn get_image_state(&self) {
        debug!("fetching remote snapshot image state");

        let snap_id = self.shared().sync.remote_snap_id_end;
        self.engine
            .get_image_state(snap_id, self.queued(Inner::handle_get_image_state));
    }

    fn handle_get_image_state(&self, result: ImageResult<ImageState>) {
        let image_state = match result {
            Ok(image_state) => image_state,
            Err(err) => {
                error!(error = %err, "failed to retrieve remote snapshot image state");
                self.handle_replay_complete(
                    Err(ReplayError::GetImageState(err)),
                    "failed to retrieve remote snapshot image state",
                );
                return;
            }
        };

        if self.is_replay_interrupted() {
            return;
        }

        self.shared().sync.image_state = image_state;
        self.create_non_primary_snapshot();
    }

    fn create_non_primary_snapshot(&self) {
        debug!("creating local non-primary snapshot");

        let params = {
            let shared = self.shared();
            let sync = &shared.sync;
            CreateNonPrimaryParams {
                demoted: sync.remote_snap_ns.is_demoted(),
                primary_mirror_uuid: self.remote_image.mirror_uuid(),
                primary_snap_id: sync.remote_snap_id_end,
                snap_seqs: sync.local_snap_ns.snap_seqs.clone(),
                image_state: sync.image_state.clone(),
            }
        };
        self.engine.create_non_primary_snapshot(
            params,
            self.queued(Inner::handle_create_non_primary_snapshot),
        );
    }

    fn handle_create_non_primary_snapshot(&self, result: ImageResult<SnapId>) {
        let local_snap_id = match result {
            Ok(local_snap_id) => local_snap_id,
            Err(err) => {
                error!(error = %err, "failed to create local mirror snapshot");
                self.handle_replay_complete(
                    Err(ReplayError::CreateNonPrimarySnapshot(err)),
                    "failed to create local mirror snapshot",
                );
                return;
            }
        };

        debug!(local_snap_id_end = %local_snap_id, "created local non-primary snapshot");
        if self.is_replay_interrupted() {
            return;
        }

        self.shared().sync.local_snap_id_end = local_snap_id;
        self.copy_image();
    }

    pub(crate) fn copy_image(&self) {
        debug!("copying image delta");

        let params = {
            let mut shared = self.shared();
            let sync = &mut shared.sync;
            sync.last_flushed_object_number = sync.local_snap_ns.last_copied_object_number;
            ImageCopyParams {
                remote_snap_id_start: sync.remote_snap_id_start,
                remote_snap_id_end: sync.remote_snap_id_end,
                local_snap_id_start: sync.local_snap_id_start,
                flatten: false,
                resume_object_number: (sync.local_snap_ns.last_copied_object_number > 0)
                    .then_some(sync.local_snap_ns.last_copied_object_number),
                snap_seqs: sync.local_snap_ns.snap_seqs.clone(),
            }
        };
        let progress = Arc::new(CopyProgressRelay {
            replayer: self.self_ref.clone(),
        });
        self.engine
            .copy_image(params, progress, self.queued(Inner::handle_copy_image));
    }

    fn handle_copy_image(&self, result: ImageResult<()>) {
        if let Err(err) = result {
            error!(error = %err, "failed to copy remote image");
            self.handle_replay_complete(
                Err(ReplayError::ImageCopy(err)),
                "failed to copy remote image",
            );
            return;
        }

        debug!("image delta copied");
        if self.is_replay_interrupted() {
            return;
        }

        let defer = {
            let mut shared = self.shared();
            if shared.sync.progress_write_in_flight {
                shared.sync.pending_mark_complete = true;
                true
            } else {
                false
            }
        };
        if defer {
            // the completion record must not be overtaken by a stale cursor
            debug!("deferring completion record behind in-flight progress write");
            return;
        }

        self.mark_sync_complete();
    }

    /// Track image-copy progress; persist the cursor at the configured
    /// cadence so a restart can resume mid-stream.
    pub(crate) fn handle_copy_image_progress(&self, object_number: u64, object_count: u64) {
        trace!(object_number, object_count, "image copy progress");

        let flush = {
            let mut shared = self.shared();
            let sync = &mut shared.sync;
            if sync.local_snap_id_end.is_head() {
                return;
            }
            if object_number > sync.local_snap_ns.last_copied_object_number {
                sync.local_snap_ns.last_copied_object_number = object_number;
            }

            let cadence = self.tuning.progress_flush_objects;
            let due = cadence > 0
                && !sync.progress_write_in_flight
                && object_number.saturating_sub(sync.last_flushed_object_number) >= cadence;
            if due {
                sync.progress_write_in_flight = true;
                sync.last_flushed_object_number = object_number;
            }
            due
        };
        if flush {
            self.flush_copy_progress();
        }
    }

    fn flush_copy_progress(&self) {
        let (snap_id, object_number) = {
            let shared = self.shared();
            (
                shared.sync.local_snap_id_end,
                shared.sync.local_snap_ns.last_copied_object_number,
            )
        };

        debug!(%snap_id, object_number, "persisting copy progress");
        self.in_flight.start_op();
        self.local_image.update_mirror_snapshot(
            snap_id,
            false,
            object_number,
            self.queued(Inner::handle_flush_copy_progress),
        );
    }

    fn handle_flush_copy_progress(&self, result: ImageResult<()>) {
        if let Err(err) = result {
            // best effort; losing a cursor write only costs resume granularity
            warn!(error = %err, "failed to persist copy progress");
        }

        let pending = {
            let mut shared = self.shared();
            shared.sync.progress_write_in_flight = false;
            std::mem::take(&mut shared.sync.pending_mark_complete)
        };
        self.in_flight.finish_op();

        if pending {
            self.mark_sync_complete();
        }
    }

    fn mark_sync_complete(&self) {
        debug!("marking local mirror snapshot complete");

        let (snap_id, object_number) = {
            let mut shared = self.shared();
            shared.sync.local_snap_ns.complete = true;
            (
                shared.sync.local_snap_id_end,
                shared.sync.local_snap_ns.last_copied_object_number,
            )
        };
        self.local_image.update_mirror_snapshot(
            snap_id,
            true,
            object_number,
            self.queued(Inner::handle_mark_sync_complete),
        );
    }

    fn handle_mark_sync_complete(&self, result: ImageResult<()>) {
        if let Err(err) = result {
            error!(error = %err, "failed to update local snapshot progress");
            self.handle_replay_complete(
                Err(ReplayError::ProgressWrite(err)),
                "failed to update local snapshot progress",
            );
            return;
        }

        self.notify_image_update();
    }

    fn notify_image_update(&self) {
        debug!("notifying local image update");
        self.local_image
            .notify_update(self.queued(Inner::handle_notify_image_update));
    }

    fn handle_notify_image_update(&self, result: ImageResult<()>) {
        if let Err(err) = result {
            // watchers will catch up on their next refresh
            error!(error = %err, "failed to notify local image update");
        }

        if self.is_replay_interrupted() {
            return;
        }

        self.unlink_peer();
    }

    fn unlink_peer(&self) {
        let (snap_id, peer_uuid) = {
            let shared = self.shared();
            (
                shared.sync.remote_snap_id_start,
                shared.remote_mirror_peer_uuid,
            )
        };
        if snap_id == SnapId::ZERO {
            // initial sync: there is no superseded snapshot to unlink
            self.notify_status_updated();
            self.refresh_local_image();
            return;
        }

        debug!(remote_snap_id = %snap_id, "unlinking peer from superseded remote snapshot");
        self.engine
            .unlink_peer(snap_id, peer_uuid, self.queued(Inner::handle_unlink_peer));
    }

    fn handle_unlink_peer(&self, result: ImageResult<()>) {
        match result {
            Err(err) if !err.is_not_found() => {
                error!(error = %err, "failed to unlink local peer from remote image");
                self.handle_replay_complete(
                    Err(ReplayError::UnlinkPeer(err)),
                    "failed to unlink local peer from remote image",
                );
                return;
            }
            Err(_) => debug!("peer already unlinked"),
            Ok(()) => {}
        }

        self.notify_status_updated();
        self.refresh_local_image();
    }
}
