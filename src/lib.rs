#![forbid(unsafe_code)]

pub mod config;
pub mod core;
pub mod error;
pub mod image;
pub mod queue;
pub mod replayer;
pub mod telemetry;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export core types at crate root for convenience
pub use crate::core::{
    ErrorKind, ImageError, ImageState, MirrorSnapshotNamespace, MirrorSnapshotState, MirrorUuid,
    PeerUuid, PoolId, SnapId, SnapInfo, SnapSeqs, SnapshotMap,
};
pub use crate::replayer::{
    Replayer, ReplayerContext, ReplayerListener, ReplayerState, ReplayError, ReplayHalt,
    ReplayResult,
};
