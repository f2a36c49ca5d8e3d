//! Per-image snapshot-based mirror replayer.

pub mod error;

mod core;
mod executor;
mod planner;
mod tracker;
mod watcher;

pub use core::{Replayer, ReplayerContext, ReplayerListener, ReplayerState};
pub use error::{Completion, ReplayError, ReplayHalt, ReplayResult};
pub use planner::{PlanError, PlanOutcome, SyncPlan, plan};
pub use tracker::InFlightTracker;
