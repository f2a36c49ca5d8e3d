//! Replay terminal taxonomy.

use thiserror::Error;

use crate::core::{ErrorKind, ImageError, MirrorUuid};

/// Terminal failure of a replay session. The first terminal observation is
/// latched; later ones are dropped.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReplayError {
    #[error("failed to retrieve mirror peer uuid from remote pool")]
    PeerUnresolved,

    #[error("failed to refresh local image: {0}")]
    RefreshLocal(ImageError),

    #[error("failed to refresh remote image: {0}")]
    RefreshRemote(ImageError),

    #[error("incomplete local primary snapshot")]
    IncompleteLocalPrimarySnapshot,

    #[error("invalid local mirror snapshot state")]
    InvalidLocalSnapshotState,

    #[error("invalid remote mirror snapshot state")]
    InvalidRemoteSnapshotState,

    #[error("local image linked to unknown peer: {primary_mirror_uuid}")]
    UnknownPeer { primary_mirror_uuid: MirrorUuid },

    #[error("failed to copy snapshots from remote to local image: {0}")]
    SnapshotCopy(ImageError),

    #[error("failed to retrieve remote snapshot image state: {0}")]
    GetImageState(ImageError),

    #[error("failed to create local mirror snapshot: {0}")]
    CreateNonPrimarySnapshot(ImageError),

    #[error("failed to copy remote image: {0}")]
    ImageCopy(ImageError),

    #[error("failed to update local snapshot progress: {0}")]
    ProgressWrite(ImageError),

    #[error("failed to unlink local peer from remote image: {0}")]
    UnlinkPeer(ImageError),

    #[error("failed to register remote image update watcher: {0}")]
    RegisterWatcher(ImageError),

    #[error("failed to unregister remote image update watcher: {0}")]
    UnregisterWatcher(ImageError),

    #[error("replay status not available")]
    StatusUnavailable,
}

impl ReplayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReplayError::PeerUnresolved => ErrorKind::NotFound,
            ReplayError::IncompleteLocalPrimarySnapshot
            | ReplayError::InvalidLocalSnapshotState
            | ReplayError::InvalidRemoteSnapshotState => ErrorKind::Invalid,
            ReplayError::UnknownPeer { .. } | ReplayError::StatusUnavailable => {
                ErrorKind::AlreadyExists
            }
            ReplayError::RefreshLocal(err)
            | ReplayError::RefreshRemote(err)
            | ReplayError::SnapshotCopy(err)
            | ReplayError::GetImageState(err)
            | ReplayError::CreateNonPrimarySnapshot(err)
            | ReplayError::ImageCopy(err)
            | ReplayError::ProgressWrite(err)
            | ReplayError::UnlinkPeer(err)
            | ReplayError::RegisterWatcher(err)
            | ReplayError::UnregisterWatcher(err) => err.kind,
        }
    }
}

/// Latched terminal outcome. `error: None` marks a clean stop, e.g. after a
/// promotion or demotion handoff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayHalt {
    pub error: Option<ReplayError>,
    pub description: String,
}

impl ReplayHalt {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

pub type ReplayResult = Result<(), ReplayError>;

/// One-shot lifecycle completion.
pub type Completion = Box<dyn FnOnce(ReplayResult) + Send>;
