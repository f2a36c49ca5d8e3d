//! Remote image update watching.
//!
//! The watch context holds a non-owning reference back to the replayer: the
//! replayer outlives the watch for its registered lifetime, but a straggling
//! notification after teardown must not revive it.

use std::sync::{Arc, Weak};

use tracing::{debug, error};

use crate::image::{ImageResult, UpdateHandler, WatcherHandle};

use super::core::{Inner, ReplayerState};
use super::error::ReplayError;

pub(crate) struct UpdateWatchCtx {
    pub(crate) replayer: Weak<Inner>,
}

impl UpdateHandler for UpdateWatchCtx {
    fn handle_update(&self) {
        if let Some(inner) = self.replayer.upgrade() {
            inner.handle_remote_image_update_notify();
        }
    }
}

impl Inner {
    pub(crate) fn register_update_watcher(&self) {
        debug!("registering remote image update watcher");

        let handler = Arc::new(UpdateWatchCtx {
            replayer: self.self_ref.clone(),
        });
        let result = self.remote_image.register_update_watcher(handler);

        let replayer = self.self_ref.clone();
        self.work_queue.queue(move || {
            if let Some(inner) = replayer.upgrade() {
                inner.handle_register_update_watcher(result);
            }
        });
    }

    fn handle_register_update_watcher(&self, result: ImageResult<WatcherHandle>) {
        match result {
            Ok(handle) => {
                let on_init = {
                    let mut shared = self.shared();
                    shared.watcher_handle = Some(handle);
                    shared.state = ReplayerState::Replaying;
                    shared.on_init_shutdown.take().expect("init callback armed")
                };
                on_init(Ok(()));

                // the initial scan is delayed until the container has seen
                // the init result
                self.notify_status_updated();
                self.refresh_local_image();
            }
            Err(err) => {
                error!(error = %err, "failed to register update watcher");
                let replay_err = ReplayError::RegisterWatcher(err);
                self.handle_replay_complete(
                    Err(replay_err.clone()),
                    "failed to register remote image update watcher",
                );
                let on_init = {
                    let mut shared = self.shared();
                    shared.state = ReplayerState::Complete;
                    shared.on_init_shutdown.take().expect("init callback armed")
                };
                on_init(Err(replay_err));
            }
        }
    }

    pub(crate) fn unregister_update_watcher(&self) {
        debug!("unregistering remote image update watcher");

        let handle = self.shared().watcher_handle.take();
        match handle {
            Some(handle) => {
                self.remote_image.unregister_update_watcher(
                    handle,
                    self.queued(Inner::handle_unregister_update_watcher),
                );
            }
            None => {
                // registration never happened or already failed
                self.wait_for_in_flight_ops();
            }
        }
    }

    fn handle_unregister_update_watcher(&self, result: ImageResult) {
        if let Err(err) = result {
            error!(error = %err, "failed to unregister update watcher");
            self.handle_replay_complete(
                Err(ReplayError::UnregisterWatcher(err)),
                "failed to unregister remote image update watcher",
            );
        }

        self.wait_for_in_flight_ops();
    }

    pub(crate) fn handle_remote_image_update_notify(&self) {
        let mut shared = self.shared();
        match shared.state {
            ReplayerState::Replaying => {
                debug!("flagging snapshot rescan required");
                shared.remote_image_updated = true;
            }
            ReplayerState::Idle => {
                shared.state = ReplayerState::Replaying;
                drop(shared);

                debug!("restarting idle replayer");
                let replayer = self.self_ref.clone();
                self.work_queue.queue(move || {
                    if let Some(inner) = replayer.upgrade() {
                        inner.refresh_local_image();
                    }
                });
            }
            ReplayerState::Init | ReplayerState::Complete => {}
        }
    }
}
