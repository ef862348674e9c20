use std::sync::Arc;

use relay_domain::RuntimeConfig;

use crate::{AppError, DedupCoordinator, DeliveryDispatcher, Metrics};

#[derive(Clone)]
pub struct AppState {
    pub config: RuntimeConfig,
    pub dispatcher: Arc<DeliveryDispatcher>,
    pub dedup: DedupCoordinator<AppError>,
    pub metrics: Arc<Metrics>,
}
