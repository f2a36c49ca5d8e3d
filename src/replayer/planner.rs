//! Two-phase snapshot scan planning.
//!
//! [`plan`] is pure: it walks the local then the remote snapshot map and
//! decides what the replayer should do next, without touching any I/O. The
//! replayer drives it from `scan_mirror_snapshots` after refreshing both
//! images.

use thiserror::Error;
use tracing::{debug, error, info};

use crate::core::{
    MirrorSnapshotNamespace, MirrorSnapshotState, MirrorUuid, PeerUuid, SnapId, SnapshotMap,
};
use crate::image::ImageResult;

use super::core::{Inner, ReplayerState, SyncContext};
use super::error::ReplayError;

/// The next delta to apply, as computed by [`plan`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncPlan {
    /// Last fully synced remote snapshot; `ZERO` for an initial sync.
    pub remote_snap_id_start: SnapId,
    /// Remote snapshot to reach; never `NOSNAP` inside a plan.
    pub remote_snap_id_end: SnapId,
    /// Matching local lower bound; `ZERO` for an initial sync.
    pub local_snap_id_start: SnapId,
    /// Existing in-progress local snapshot, or `NOSNAP` when one still has
    /// to be created.
    pub local_snap_id_end: SnapId,
    /// Namespace of the end snapshot on the remote image.
    pub remote_snap_ns: MirrorSnapshotNamespace,
    /// Namespace of the newest local mirror snapshot, when one exists;
    /// carries the snap_seqs and resume cursor of an interrupted sync.
    pub local_snap_ns: Option<MirrorSnapshotNamespace>,
    /// Re-enter image-copy mid-stream instead of starting a fresh sync.
    pub resume: bool,
}

/// Fatal verdicts of the scan.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("incomplete local primary snapshot")]
    IncompleteLocalPrimarySnapshot,

    #[error("invalid local mirror snapshot state")]
    InvalidLocalSnapshotState,

    #[error("invalid remote mirror snapshot state")]
    InvalidRemoteSnapshotState,

    #[error("local image linked to unknown peer: {primary_mirror_uuid}")]
    UnknownPeer { primary_mirror_uuid: MirrorUuid },
}

impl From<PlanError> for ReplayError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::IncompleteLocalPrimarySnapshot => {
                ReplayError::IncompleteLocalPrimarySnapshot
            }
            PlanError::InvalidLocalSnapshotState => ReplayError::InvalidLocalSnapshotState,
            PlanError::InvalidRemoteSnapshotState => ReplayError::InvalidRemoteSnapshotState,
            PlanError::UnknownPeer {
                primary_mirror_uuid,
            } => ReplayError::UnknownPeer {
                primary_mirror_uuid,
            },
        }
    }
}

/// Verdict of one scan pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlanOutcome {
    /// A remote snapshot is ready to sync.
    Sync(SyncPlan),
    /// Nothing to do until the next update notification. `remote_demoted`
    /// reports whether the newest scanned remote primary snapshot marked a
    /// demotion handoff.
    Idle { remote_demoted: bool },
    /// The local image was force-promoted; this cluster is now the source
    /// of truth and replay must stop.
    Promoted,
    Error(PlanError),
}

/// Baseline derived from the local snapshot map.
struct LocalBaseline {
    local_snap_id_start: SnapId,
    local_snap_id_end: SnapId,
    local_snap_ns: Option<MirrorSnapshotNamespace>,
}

impl LocalBaseline {
    fn has_mirror_snapshot(&self) -> bool {
        self.local_snap_id_start > SnapId::ZERO || !self.local_snap_id_end.is_head()
    }
}

/// Compute the next sync plan from the two snapshot maps.
///
/// `peer_uuid` is our identity in the remote image's peer sets;
/// `remote_mirror_uuid` / `local_mirror_uuid` are the mirror identities of
/// the two images.
pub fn plan(
    local_snaps: &SnapshotMap,
    remote_snaps: &SnapshotMap,
    peer_uuid: PeerUuid,
    remote_mirror_uuid: MirrorUuid,
    local_mirror_uuid: MirrorUuid,
) -> PlanOutcome {
    let baseline = match scan_local(local_snaps) {
        Ok(baseline) => baseline,
        Err(err) => return PlanOutcome::Error(err),
    };

    let mut remote_snap_id_start = SnapId::ZERO;
    if baseline.has_mirror_snapshot() {
        let local_ns = baseline
            .local_snap_ns
            .as_ref()
            .expect("mirror snapshot recorded with namespace");
        if local_ns.is_non_primary() && local_ns.primary_mirror_uuid != remote_mirror_uuid {
            return PlanOutcome::Error(PlanError::UnknownPeer {
                primary_mirror_uuid: local_ns.primary_mirror_uuid,
            });
        } else if local_ns.state == MirrorSnapshotState::PRIMARY {
            return PlanOutcome::Promoted;
        }

        if local_ns.complete {
            // the remote sync resumes after the snapshot this one shadows
            remote_snap_id_start = local_ns.primary_snap_id;
        }
    }

    scan_remote(
        remote_snaps,
        &baseline,
        remote_snap_id_start,
        peer_uuid,
        local_mirror_uuid,
    )
}

fn scan_local(local_snaps: &SnapshotMap) -> Result<LocalBaseline, PlanError> {
    let mut local_snap_id_start = SnapId::ZERO;
    let mut local_snap_id_end = SnapId::NOSNAP;
    let mut local_snap_ns = None;

    for (snap_id, info) in local_snaps {
        let Some(mirror_ns) = &info.mirror else {
            continue;
        };
        local_snap_ns = Some(mirror_ns.clone());

        if mirror_ns.is_non_primary() {
            if mirror_ns.complete {
                local_snap_id_start = *snap_id;
                local_snap_id_end = SnapId::NOSNAP;
            } else {
                // resume candidate; start stays at the last complete snap
                local_snap_id_end = *snap_id;
            }
        } else if mirror_ns.is_primary() {
            if mirror_ns.complete {
                // post-promotion baseline
                local_snap_id_start = *snap_id;
                local_snap_id_end = SnapId::NOSNAP;
            } else {
                return Err(PlanError::IncompleteLocalPrimarySnapshot);
            }
        } else {
            return Err(PlanError::InvalidLocalSnapshotState);
        }
    }

    Ok(LocalBaseline {
        local_snap_id_start,
        local_snap_id_end,
        local_snap_ns,
    })
}

fn scan_remote(
    remote_snaps: &SnapshotMap,
    baseline: &LocalBaseline,
    mut remote_snap_id_start: SnapId,
    peer_uuid: PeerUuid,
    local_mirror_uuid: MirrorUuid,
) -> PlanOutcome {
    let mut remote_demoted = false;
    let mut remote_end: Option<(SnapId, &MirrorSnapshotNamespace)> = None;

    for (remote_snap_id, info) in remote_snaps {
        let Some(mirror_ns) = &info.mirror else {
            continue;
        };
        if !mirror_ns.is_primary() && !mirror_ns.is_non_primary() {
            return PlanOutcome::Error(PlanError::InvalidRemoteSnapshotState);
        }
        remote_demoted = mirror_ns.is_primary() && mirror_ns.is_demoted();

        if baseline.has_mirror_snapshot() {
            let local_ns = baseline
                .local_snap_ns
                .as_ref()
                .expect("mirror snapshot recorded with namespace");
            if local_ns.is_non_primary() {
                if local_ns.complete && local_ns.primary_snap_id >= *remote_snap_id {
                    // already synced
                    remote_snap_id_start = *remote_snap_id;
                    continue;
                } else if !local_ns.complete && local_ns.primary_snap_id > *remote_snap_id {
                    // skip until the in-progress remote snapshot
                    remote_snap_id_start = *remote_snap_id;
                    continue;
                }
            } else if local_ns.state == MirrorSnapshotState::PRIMARY_DEMOTED {
                assert!(
                    baseline.local_snap_id_start > SnapId::ZERO,
                    "demoted local baseline without a complete snapshot"
                );
                if mirror_ns.state == MirrorSnapshotState::NON_PRIMARY_DEMOTED
                    && mirror_ns.primary_mirror_uuid == local_mirror_uuid
                    && mirror_ns.primary_snap_id == baseline.local_snap_id_start
                {
                    // matching demotion snapshot: the handoff point
                    remote_snap_id_start = *remote_snap_id;
                    continue;
                } else if remote_snap_id_start == SnapId::ZERO {
                    // still searching for the demotion snapshot
                    continue;
                }
            } else {
                unreachable!(
                    "local mirror snapshot baseline is neither non-primary nor demoted primary"
                );
            }
        }

        // first snapshot past the synced region where we are listed as a peer
        if !mirror_ns.is_primary() {
            continue;
        }
        if !mirror_ns.is_peer(&peer_uuid) {
            continue;
        }

        remote_end = Some((*remote_snap_id, mirror_ns));
        break;
    }

    let Some((remote_snap_id_end, remote_snap_ns)) = remote_end else {
        return PlanOutcome::Idle { remote_demoted };
    };

    if !remote_snap_ns.complete {
        // raced with the creation of the remote snapshot; rescan once it
        // completes
        return PlanOutcome::Idle { remote_demoted };
    }

    let resume = !baseline.local_snap_id_end.is_head()
        && baseline
            .local_snap_ns
            .as_ref()
            .is_some_and(|ns| !ns.complete);
    PlanOutcome::Sync(SyncPlan {
        remote_snap_id_start,
        remote_snap_id_end,
        local_snap_id_start: baseline.local_snap_id_start,
        local_snap_id_end: baseline.local_snap_id_end,
        remote_snap_ns: remote_snap_ns.clone(),
        local_snap_ns: baseline.local_snap_ns.clone(),
        resume,
    })
}

impl Inner {
    pub(crate) fn refresh_local_image(&self) {
        if !self.local_image.is_refresh_required() {
            self.refresh_remote_image();
            return;
        }

        debug!("refreshing local image");
        self.local_image
            .refresh(self.queued(Inner::handle_refresh_local_image));
    }

    fn handle_refresh_local_image(&self, result: ImageResult<()>) {
        if let Err(err) = result {
            error!(error = %err, "failed to refresh local image");
            self.handle_replay_complete(
                Err(ReplayError::RefreshLocal(err)),
                "failed to refresh local image",
            );
            return;
        }

        self.refresh_remote_image();
    }

    fn refresh_remote_image(&self) {
        if !self.remote_image.is_refresh_required() {
            self.scan_mirror_snapshots();
            return;
        }

        debug!("refreshing remote image");
        self.remote_image
            .refresh(self.queued(Inner::handle_refresh_remote_image));
    }

    fn handle_refresh_remote_image(&self, result: ImageResult<()>) {
        if let Err(err) = result {
            error!(error = %err, "failed to refresh remote image");
            self.handle_replay_complete(
                Err(ReplayError::RefreshRemote(err)),
                "failed to refresh remote image",
            );
            return;
        }

        self.scan_mirror_snapshots();
    }

    fn scan_mirror_snapshots(&self) {
        if self.is_replay_interrupted() {
            return;
        }

        debug!("scanning for mirror snapshots");
        self.shared().sync = SyncContext::default();

        let local_snaps = self.local_image.snapshots();
        // clear the dirty flag first: a notification landing during the
        // remote read must force a rescan
        let peer_uuid = {
            let mut shared = self.shared();
            shared.remote_image_updated = false;
            shared.remote_mirror_peer_uuid
        };
        let remote_snaps = self.remote_image.snapshots();

        let outcome = plan(
            &local_snaps,
            &remote_snaps,
            peer_uuid,
            self.remote_image.mirror_uuid(),
            self.local_mirror_uuid,
        );
        match outcome {
            PlanOutcome::Error(err) => {
                let description = err.to_string();
                error!("snapshot scan failed: {description}");
                self.handle_replay_complete(Err(err.into()), &description);
            }
            PlanOutcome::Promoted => {
                info!("local image promoted");
                self.handle_replay_complete(Ok(()), "force promoted");
            }
            PlanOutcome::Sync(sync_plan) => {
                debug!(
                    remote_snap_id_start = %sync_plan.remote_snap_id_start,
                    remote_snap_id_end = %sync_plan.remote_snap_id_end,
                    local_snap_id_start = %sync_plan.local_snap_id_start,
                    local_snap_id_end = %sync_plan.local_snap_id_end,
                    resume = sync_plan.resume,
                    "found remote mirror snapshot to sync"
                );
                let resume = sync_plan.resume;
                self.shared().sync = SyncContext::from_plan(sync_plan);
                if resume {
                    debug!("local image contains in-progress mirror snapshot");
                    self.copy_image();
                } else {
                    self.copy_snapshots();
                }
            }
            PlanOutcome::Idle { remote_demoted } => self.handle_scan_idle(remote_demoted),
        }
    }

    fn handle_scan_idle(&self, remote_demoted: bool) {
        let mut shared = self.shared();
        if shared.remote_image_updated {
            shared.remote_image_updated = false;
            drop(shared);

            debug!("restarting snapshot scan due to remote update notification");
            self.refresh_local_image();
            return;
        }

        if shared.state == ReplayerState::Complete {
            let resume = shared.on_init_shutdown.is_some() && !shared.teardown_started;
            if resume {
                shared.teardown_started = true;
            }
            drop(shared);

            if resume {
                debug!("resuming pending shut down");
                self.unregister_update_watcher();
            }
            return;
        }

        if remote_demoted {
            drop(shared);

            info!("remote image demoted");
            self.handle_replay_complete(Ok(()), "remote image demoted");
            return;
        }

        debug!("all remote snapshots synced: idling waiting for new snapshot");
        assert_eq!(shared.state, ReplayerState::Replaying);
        shared.state = ReplayerState::Idle;
        self.notify_status_updated();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SnapInfo, SnapSeqs};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use uuid::Uuid;

    fn local_uuid() -> MirrorUuid {
        MirrorUuid::new(Uuid::from_bytes([1u8; 16]))
    }

    fn remote_uuid() -> MirrorUuid {
        MirrorUuid::new(Uuid::from_bytes([2u8; 16]))
    }

    fn peer() -> PeerUuid {
        PeerUuid::new(Uuid::from_bytes([3u8; 16]))
    }

    fn other_peer() -> PeerUuid {
        PeerUuid::new(Uuid::from_bytes([4u8; 16]))
    }

    fn snaps<I>(entries: I) -> SnapshotMap
    where
        I: IntoIterator<Item = (u64, MirrorSnapshotNamespace)>,
    {
        entries
            .into_iter()
            .map(|(id, ns)| (SnapId::new(id), SnapInfo::mirror(format!("snap-{id}"), ns)))
            .collect()
    }

    fn run(local: &SnapshotMap, remote: &SnapshotMap) -> PlanOutcome {
        plan(local, remote, peer(), remote_uuid(), local_uuid())
    }

    fn primary_complete() -> MirrorSnapshotNamespace {
        MirrorSnapshotNamespace::primary([peer()]).completed()
    }

    fn synced(primary_snap_id: u64) -> MirrorSnapshotNamespace {
        MirrorSnapshotNamespace::non_primary(remote_uuid(), SnapId::new(primary_snap_id))
            .completed()
    }

    #[test]
    fn cold_sync_plans_from_zero() {
        let local = SnapshotMap::new();
        let remote = snaps([(10, primary_complete())]);

        let PlanOutcome::Sync(plan) = run(&local, &remote) else {
            panic!("expected sync plan");
        };
        assert_eq!(plan.remote_snap_id_start, SnapId::ZERO);
        assert_eq!(plan.remote_snap_id_end, SnapId::new(10));
        assert_eq!(plan.local_snap_id_start, SnapId::ZERO);
        assert_eq!(plan.local_snap_id_end, SnapId::NOSNAP);
        assert!(!plan.resume);
    }

    #[test]
    fn incremental_sync_skips_synced_snapshots() {
        let local = snaps([(100, synced(10))]);
        let remote = snaps([(10, primary_complete()), (20, primary_complete())]);

        let PlanOutcome::Sync(plan) = run(&local, &remote) else {
            panic!("expected sync plan");
        };
        assert_eq!(plan.remote_snap_id_start, SnapId::new(10));
        assert_eq!(plan.remote_snap_id_end, SnapId::new(20));
        assert_eq!(plan.local_snap_id_start, SnapId::new(100));
        assert!(!plan.resume);
    }

    #[test]
    fn interrupted_sync_resumes_at_image_copy() {
        let mut in_progress =
            MirrorSnapshotNamespace::non_primary(remote_uuid(), SnapId::new(20));
        in_progress.snap_seqs = SnapSeqs::from([(SnapId::new(20), SnapId::new(110))]);
        in_progress.last_copied_object_number = 42;

        let local = snaps([(100, synced(10)), (110, in_progress.clone())]);
        let remote = snaps([(10, primary_complete()), (20, primary_complete())]);

        let PlanOutcome::Sync(plan) = run(&local, &remote) else {
            panic!("expected sync plan");
        };
        assert!(plan.resume);
        assert_eq!(plan.remote_snap_id_start, SnapId::new(10));
        assert_eq!(plan.remote_snap_id_end, SnapId::new(20));
        assert_eq!(plan.local_snap_id_start, SnapId::new(100));
        assert_eq!(plan.local_snap_id_end, SnapId::new(110));
        assert_eq!(plan.local_snap_ns, Some(in_progress));
    }

    #[test]
    fn synced_history_is_idle() {
        let local = snaps([(100, synced(10)), (110, synced(20))]);
        let remote = snaps([(10, primary_complete()), (20, primary_complete())]);

        assert_eq!(
            run(&local, &remote),
            PlanOutcome::Idle {
                remote_demoted: false
            }
        );
    }

    #[test]
    fn incomplete_remote_end_waits() {
        let local = SnapshotMap::new();
        let remote = snaps([(10, MirrorSnapshotNamespace::primary([peer()]))]);

        assert_eq!(
            run(&local, &remote),
            PlanOutcome::Idle {
                remote_demoted: false
            }
        );
    }

    #[test]
    fn remote_snapshot_without_our_peer_is_skipped() {
        let local = SnapshotMap::new();
        let remote = snaps([(
            10,
            MirrorSnapshotNamespace::primary([other_peer()]).completed(),
        )]);

        assert_eq!(
            run(&local, &remote),
            PlanOutcome::Idle {
                remote_demoted: false
            }
        );
    }

    #[test]
    fn live_local_primary_reports_promoted() {
        let local = snaps([(200, MirrorSnapshotNamespace::primary([]).completed())]);
        let remote = snaps([(10, primary_complete())]);

        assert_eq!(run(&local, &remote), PlanOutcome::Promoted);
    }

    #[test]
    fn incomplete_local_primary_is_fatal() {
        let local = snaps([(200, MirrorSnapshotNamespace::primary([]))]);
        assert_eq!(
            run(&local, &SnapshotMap::new()),
            PlanOutcome::Error(PlanError::IncompleteLocalPrimarySnapshot)
        );
    }

    #[test]
    fn unknown_local_state_is_fatal() {
        let mut ns = MirrorSnapshotNamespace::default();
        ns.state = MirrorSnapshotState::from_raw(200);
        let local = snaps([(100, ns)]);
        assert_eq!(
            run(&local, &SnapshotMap::new()),
            PlanOutcome::Error(PlanError::InvalidLocalSnapshotState)
        );
    }

    #[test]
    fn unknown_remote_state_is_fatal() {
        let mut ns = MirrorSnapshotNamespace::default();
        ns.state = MirrorSnapshotState::from_raw(77);
        let remote = snaps([(10, ns)]);
        assert_eq!(
            run(&SnapshotMap::new(), &remote),
            PlanOutcome::Error(PlanError::InvalidRemoteSnapshotState)
        );
    }

    #[test]
    fn foreign_peer_link_is_rejected_regardless_of_remote_content() {
        let foreign = MirrorUuid::new(Uuid::from_bytes([9u8; 16]));
        let local = snaps([(
            100,
            MirrorSnapshotNamespace::non_primary(foreign, SnapId::new(10)).completed(),
        )]);

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..32 {
            let remote = random_remote_history(&mut rng);
            assert_eq!(
                run(&local, &remote),
                PlanOutcome::Error(PlanError::UnknownPeer {
                    primary_mirror_uuid: foreign
                })
            );
        }
    }

    #[test]
    fn remote_demotion_with_no_new_work_reports_demoted() {
        let local = snaps([(100, synced(10))]);
        let remote = snaps([(
            10,
            MirrorSnapshotNamespace::primary([peer()]).demoted().completed(),
        )]);

        assert_eq!(
            run(&local, &remote),
            PlanOutcome::Idle {
                remote_demoted: true
            }
        );
    }

    #[test]
    fn demoted_local_baseline_matches_remote_demotion_snapshot() {
        // this cluster was primary, demoted at local snap 300; the remote
        // picked up the handoff at its snap 30 and has new work at 40
        let local = snaps([(
            300,
            MirrorSnapshotNamespace::primary([]).demoted().completed(),
        )]);
        let remote = snaps([
            (
                30,
                MirrorSnapshotNamespace::non_primary(local_uuid(), SnapId::new(300))
                    .demoted()
                    .completed(),
            ),
            (40, primary_complete()),
        ]);

        let PlanOutcome::Sync(plan) = run(&local, &remote) else {
            panic!("expected sync plan");
        };
        assert_eq!(plan.remote_snap_id_start, SnapId::new(30));
        assert_eq!(plan.remote_snap_id_end, SnapId::new(40));
        assert_eq!(plan.local_snap_id_start, SnapId::new(300));
    }

    #[test]
    fn demoted_local_baseline_without_match_idles() {
        let local = snaps([(
            300,
            MirrorSnapshotNamespace::primary([]).demoted().completed(),
        )]);
        let remote = snaps([(
            30,
            MirrorSnapshotNamespace::non_primary(local_uuid(), SnapId::new(299))
                .demoted()
                .completed(),
        )]);

        assert_eq!(
            run(&local, &remote),
            PlanOutcome::Idle {
                remote_demoted: false
            }
        );
    }

    #[test]
    fn user_snapshots_are_ignored() {
        let mut local = snaps([(100, synced(10))]);
        local.insert(SnapId::new(105), SnapInfo::user("backup"));
        let mut remote = snaps([(10, primary_complete()), (20, primary_complete())]);
        remote.insert(SnapId::new(15), SnapInfo::user("backup"));

        let PlanOutcome::Sync(plan) = run(&local, &remote) else {
            panic!("expected sync plan");
        };
        assert_eq!(plan.remote_snap_id_end, SnapId::new(20));
    }

    fn random_remote_history(rng: &mut StdRng) -> SnapshotMap {
        let mut map = SnapshotMap::new();
        let mut id = 0u64;
        for _ in 0..rng.random_range(0..8) {
            id += rng.random_range(1..20);
            let ns = match rng.random_range(0..4) {
                0 => MirrorSnapshotNamespace::primary([peer()]).completed(),
                1 => MirrorSnapshotNamespace::primary([peer()]),
                2 => MirrorSnapshotNamespace::primary([other_peer()]).completed(),
                _ => MirrorSnapshotNamespace::primary([peer()]).demoted().completed(),
            };
            map.insert(SnapId::new(id), SnapInfo::mirror(format!("snap-{id}"), ns));
        }
        map
    }

    fn random_synced_prefix(rng: &mut StdRng, remote: &SnapshotMap) -> SnapshotMap {
        // local history mirroring some prefix of the syncable remote snaps
        let synced_ids: Vec<SnapId> = remote
            .iter()
            .filter_map(|(id, info)| {
                let ns = info.mirror.as_ref()?;
                (ns.is_primary() && ns.complete && ns.is_peer(&peer())).then_some(*id)
            })
            .collect();
        let take = if synced_ids.is_empty() {
            0
        } else {
            rng.random_range(0..=synced_ids.len())
        };
        let mut local = SnapshotMap::new();
        let mut local_id = 1000u64;
        for remote_id in synced_ids.into_iter().take(take) {
            local.insert(
                SnapId::new(local_id),
                SnapInfo::mirror(format!("snap-{local_id}"), synced(remote_id.get())),
            );
            local_id += 10;
        }
        local
    }

    #[test]
    fn plan_bounds_are_ordered_for_arbitrary_histories() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..256 {
            let remote = random_remote_history(&mut rng);
            let local = random_synced_prefix(&mut rng, &remote);
            match run(&local, &remote) {
                PlanOutcome::Sync(plan) => {
                    assert!(plan.remote_snap_id_start <= plan.remote_snap_id_end);
                    assert!(!plan.remote_snap_id_end.is_head());
                    assert!(plan.local_snap_id_start <= plan.local_snap_id_end);
                }
                PlanOutcome::Idle { .. } => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }
    }

    #[test]
    fn plan_is_idempotent_over_stable_input() {
        // after a full sync of every syncable snapshot, a rescan with the
        // same input must idle
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..128 {
            let mut remote = SnapshotMap::new();
            let mut id = 0u64;
            for _ in 0..rng.random_range(1..6) {
                id += rng.random_range(1..20);
                remote.insert(
                    SnapId::new(id),
                    SnapInfo::mirror(format!("snap-{id}"), primary_complete()),
                );
            }
            let full_local: SnapshotMap = remote
                .keys()
                .enumerate()
                .map(|(i, remote_id)| {
                    let local_id = SnapId::new(1000 + (i as u64) * 10);
                    (
                        local_id,
                        SnapInfo::mirror(format!("snap-{local_id}"), synced(remote_id.get())),
                    )
                })
                .collect();

            assert_eq!(
                run(&full_local, &remote),
                PlanOutcome::Idle {
                    remote_demoted: false
                }
            );
        }
    }
}
