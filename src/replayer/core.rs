//! Replayer lifecycle state machine.
//!
//! One `Replayer` per mirrored image pair. All state transitions run on the
//! container's work queue; a single mutex guards the shared state so watcher
//! notifications and lifecycle calls arriving on other threads stay
//! coherent. Callbacks never execute while that mutex is held.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, error, info};

use crate::core::{ImageState, MirrorSnapshotNamespace, MirrorUuid, PeerUuid, SnapId};
use crate::config::ReplayerTuning;
use crate::image::{CopyEngine, LocalImage, PoolMetaCache, RemoteImage, WatcherHandle};
use crate::queue::WorkQueue;

use super::error::{Completion, ReplayError, ReplayHalt, ReplayResult};
use super::tracker::InFlightTracker;

/// Observes replayer state changes. Notifications are dispatched through
/// the work queue and never run under the replayer mutex; implementations
/// must be reentrancy-safe and non-blocking.
pub trait ReplayerListener: Send + Sync {
    fn handle_notification(&self);
}

/// Lifecycle state of a replayer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayerState {
    Init,
    Replaying,
    Idle,
    Complete,
}

/// Everything a replayer needs from its container.
pub struct ReplayerContext {
    pub local_mirror_uuid: MirrorUuid,
    pub pool_meta_cache: Arc<PoolMetaCache>,
    pub local_image: Arc<dyn LocalImage>,
    pub remote_image: Arc<dyn RemoteImage>,
    pub engine: Arc<dyn CopyEngine>,
    pub listener: Arc<dyn ReplayerListener>,
    pub work_queue: WorkQueue,
    pub tuning: ReplayerTuning,
}

/// Per-image snapshot-based mirror replayer.
pub struct Replayer {
    inner: Arc<Inner>,
}

impl Replayer {
    pub fn new(context: ReplayerContext) -> Self {
        let inner = Arc::new_cyclic(|self_ref| Inner {
            local_mirror_uuid: context.local_mirror_uuid,
            pool_meta_cache: context.pool_meta_cache,
            local_image: context.local_image,
            remote_image: context.remote_image,
            engine: context.engine,
            listener: context.listener,
            work_queue: context.work_queue,
            tuning: context.tuning,
            in_flight: InFlightTracker::new(),
            shared: Mutex::new(Shared::new()),
            self_ref: self_ref.clone(),
        });
        Self { inner }
    }

    /// Start replaying. Must be called exactly once, in state `Init`.
    ///
    /// `on_finish` fires once the update watcher is registered (or with the
    /// failure that prevented it); the first scan is kicked off afterwards.
    pub fn init(&self, on_finish: Completion) {
        debug!("init");
        self.inner.init(on_finish);
    }

    /// Stop replaying. May be called from any non-`Init` state, once.
    ///
    /// If a sync is in flight, teardown is deferred until the pipeline
    /// observes the state change at its next checkpoint; in-flight copy
    /// requests are not cancelled.
    pub fn shut_down(&self, on_finish: Completion) {
        debug!("shut down");
        self.inner.shut_down(on_finish);
    }

    /// Interface hook; completes immediately through the work queue.
    pub fn flush(&self, on_finish: Completion) {
        debug!("flush");
        self.inner.work_queue.queue(move || on_finish(Ok(())));
    }

    /// Free-form replay status. Not implemented for snapshot replay; the
    /// callback reports `AlreadyExists` to mark the description as
    /// unavailable.
    pub fn get_replay_status(&self, description: &mut String, on_finish: Completion) -> bool {
        description.clear();
        description.push_str("NOT IMPLEMENTED");
        self.inner
            .work_queue
            .queue(move || on_finish(Err(ReplayError::StatusUnavailable)));
        true
    }

    pub fn is_replaying(&self) -> bool {
        matches!(
            self.state(),
            ReplayerState::Replaying | ReplayerState::Idle
        )
    }

    pub fn state(&self) -> ReplayerState {
        self.inner.shared().state
    }

    /// Latched terminal outcome, once one exists.
    pub fn halt(&self) -> Option<ReplayHalt> {
        self.inner.shared().halt.clone()
    }
}

/// State guarded by the replayer mutex.
pub(crate) struct Shared {
    pub(crate) state: ReplayerState,
    pub(crate) halt: Option<ReplayHalt>,
    pub(crate) remote_image_updated: bool,
    pub(crate) on_init_shutdown: Option<Completion>,
    pub(crate) teardown_started: bool,
    pub(crate) watcher_handle: Option<WatcherHandle>,
    pub(crate) remote_mirror_peer_uuid: PeerUuid,
    pub(crate) sync: SyncContext,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: ReplayerState::Init,
            halt: None,
            remote_image_updated: false,
            on_init_shutdown: None,
            teardown_started: false,
            watcher_handle: None,
            remote_mirror_peer_uuid: PeerUuid::NIL,
            sync: SyncContext::default(),
        }
    }
}

/// Ephemeral context of the active sync plan.
pub(crate) struct SyncContext {
    pub(crate) local_snap_id_start: SnapId,
    pub(crate) local_snap_id_end: SnapId,
    pub(crate) local_snap_ns: MirrorSnapshotNamespace,
    pub(crate) remote_snap_id_start: SnapId,
    pub(crate) remote_snap_id_end: SnapId,
    pub(crate) remote_snap_ns: MirrorSnapshotNamespace,
    pub(crate) image_state: ImageState,
    pub(crate) progress_write_in_flight: bool,
    pub(crate) pending_mark_complete: bool,
    pub(crate) last_flushed_object_number: u64,
}

impl SyncContext {
    pub(crate) fn from_plan(plan: super::planner::SyncPlan) -> Self {
        Self {
            local_snap_id_start: plan.local_snap_id_start,
            local_snap_id_end: plan.local_snap_id_end,
            local_snap_ns: plan.local_snap_ns.unwrap_or_default(),
            remote_snap_id_start: plan.remote_snap_id_start,
            remote_snap_id_end: plan.remote_snap_id_end,
            remote_snap_ns: plan.remote_snap_ns,
            ..Self::default()
        }
    }
}

impl Default for SyncContext {
    fn default() -> Self {
        Self {
            local_snap_id_start: SnapId::ZERO,
            local_snap_id_end: SnapId::NOSNAP,
            local_snap_ns: MirrorSnapshotNamespace::default(),
            remote_snap_id_start: SnapId::ZERO,
            remote_snap_id_end: SnapId::NOSNAP,
            remote_snap_ns: MirrorSnapshotNamespace::default(),
            image_state: ImageState::default(),
            progress_write_in_flight: false,
            pending_mark_complete: false,
            last_flushed_object_number: 0,
        }
    }
}

pub(crate) struct Inner {
    pub(crate) local_mirror_uuid: MirrorUuid,
    pub(crate) pool_meta_cache: Arc<PoolMetaCache>,
    pub(crate) local_image: Arc<dyn LocalImage>,
    pub(crate) remote_image: Arc<dyn RemoteImage>,
    pub(crate) engine: Arc<dyn CopyEngine>,
    pub(crate) listener: Arc<dyn ReplayerListener>,
    pub(crate) work_queue: WorkQueue,
    pub(crate) tuning: ReplayerTuning,
    pub(crate) in_flight: InFlightTracker,
    pub(crate) shared: Mutex<Shared>,
    pub(crate) self_ref: Weak<Inner>,
}

impl Inner {
    pub(crate) fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().expect("replayer lock")
    }

    /// Wrap a handler so the completion re-enters on the work queue. The
    /// closure holds a non-owning reference; if the replayer is gone by the
    /// time the completion fires, it is dropped.
    pub(crate) fn queued<T, F>(&self, handler: F) -> Box<dyn FnOnce(T) + Send>
    where
        T: Send + 'static,
        F: FnOnce(&Inner, T) + Send + 'static,
    {
        let replayer = self.self_ref.clone();
        let queue = self.work_queue.clone();
        Box::new(move |result| {
            queue.queue(move || {
                if let Some(inner) = replayer.upgrade() {
                    handler(&inner, result);
                }
            });
        })
    }

    fn init(&self, on_finish: Completion) {
        {
            let mut shared = self.shared();
            assert_eq!(shared.state, ReplayerState::Init, "init outside Init state");

            let peer_uuid = self
                .pool_meta_cache
                .remote_pool_meta(self.remote_image.pool_id())
                .map(|meta| meta.mirror_peer_uuid)
                .unwrap_or(PeerUuid::NIL);
            if peer_uuid.is_nil() {
                error!("failed to retrieve mirror peer uuid from remote pool");
                shared.state = ReplayerState::Complete;
                shared.halt.get_or_insert(ReplayHalt {
                    error: Some(ReplayError::PeerUnresolved),
                    description: ReplayError::PeerUnresolved.to_string(),
                });
                drop(shared);
                self.work_queue
                    .queue(move || on_finish(Err(ReplayError::PeerUnresolved)));
                return;
            }

            debug!(remote_mirror_peer_uuid = %peer_uuid, "resolved mirror peer");
            shared.remote_mirror_peer_uuid = peer_uuid;
            assert!(
                shared.on_init_shutdown.is_none(),
                "init/shutdown already pending"
            );
            shared.on_init_shutdown = Some(on_finish);
        }

        self.register_update_watcher();
    }

    fn shut_down(&self, on_finish: Completion) {
        let mut shared = self.shared();
        assert!(
            shared.on_init_shutdown.is_none(),
            "init/shutdown already pending"
        );
        assert_ne!(shared.state, ReplayerState::Init, "shut_down in Init state");
        shared.on_init_shutdown = Some(on_finish);

        let previous = std::mem::replace(&mut shared.state, ReplayerState::Complete);
        if previous == ReplayerState::Replaying {
            debug!("shut down pending on completion of snapshot replay");
            return;
        }

        shared.teardown_started = true;
        drop(shared);

        self.unregister_update_watcher();
    }

    /// Latch the first terminal outcome and transition to `Complete`.
    ///
    /// When the pipeline fails while a deferred shutdown is pending, the
    /// stalled teardown is resumed here.
    pub(crate) fn handle_replay_complete(&self, result: ReplayResult, description: &str) {
        let mut shared = self.shared();
        if shared.halt.is_none() {
            shared.halt = Some(ReplayHalt {
                error: result.err(),
                description: description.to_string(),
            });
        }

        if !matches!(
            shared.state,
            ReplayerState::Replaying | ReplayerState::Idle
        ) {
            let resume = shared.state == ReplayerState::Complete
                && shared.on_init_shutdown.is_some()
                && !shared.teardown_started;
            if resume {
                shared.teardown_started = true;
                drop(shared);
                debug!("resuming pending shut down");
                self.unregister_update_watcher();
            }
            return;
        }

        shared.state = ReplayerState::Complete;
        self.notify_status_updated();
    }

    /// Stage-boundary checkpoint. Returns true when the pipeline must stop;
    /// resumes a deferred teardown if one is pending.
    pub(crate) fn is_replay_interrupted(&self) -> bool {
        let mut shared = self.shared();
        if shared.state != ReplayerState::Complete {
            return false;
        }
        let resume = shared.on_init_shutdown.is_some() && !shared.teardown_started;
        if resume {
            shared.teardown_started = true;
        }
        drop(shared);

        if resume {
            debug!("resuming pending shut down");
            self.unregister_update_watcher();
        }
        true
    }

    /// Enqueue a tracked listener notification.
    pub(crate) fn notify_status_updated(&self) {
        self.in_flight.start_op();
        let replayer = self.self_ref.clone();
        self.work_queue.queue(move || {
            if let Some(inner) = replayer.upgrade() {
                inner.listener.handle_notification();
                inner.in_flight.finish_op();
            }
        });
    }

    pub(crate) fn wait_for_in_flight_ops(&self) {
        debug!("waiting for in-flight ops");
        let replayer = self.self_ref.clone();
        let queue = self.work_queue.clone();
        self.in_flight.wait_for_ops(Box::new(move || {
            queue.queue(move || {
                if let Some(inner) = replayer.upgrade() {
                    inner.handle_wait_for_in_flight_ops();
                }
            });
        }));
    }

    fn handle_wait_for_in_flight_ops(&self) {
        let (on_finish, result) = {
            let mut shared = self.shared();
            let on_finish = shared
                .on_init_shutdown
                .take()
                .expect("shutdown callback armed");
            let result = match &shared.halt {
                Some(halt) => halt.error.clone().map_or(Ok(()), Err),
                None => Ok(()),
            };
            (on_finish, result)
        };

        info!("shut down complete");
        on_finish(result);
    }
}
