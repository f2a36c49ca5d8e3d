use thiserror::Error;

use crate::config::ConfigError;
use crate::core::ImageError;
use crate::replayer::ReplayError;

/// Crate-level convenience error.
///
/// A thin wrapper over the canonical subsystem errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
