// Relay Application Layer

pub mod commands;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod signature;
pub mod state;

pub use dedup::{DedupCoordinator, RunOutcome, SweeperHandle, WorkAborted};
pub use dispatch::{DeliveryDispatcher, DispatchOutcome};
pub use error::AppError;
pub use metrics::Metrics;
pub use state::AppState;
