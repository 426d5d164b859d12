use std::sync::Arc;

use common::{engine::EngineHandle, utils::config::AppConfig};
use graph_manager::{GraphManager, RequestResolver};

#[derive(Clone)]
pub struct ApiState {
    pub config: AppConfig,
    pub manager: Arc<GraphManager>,
    pub resolver: RequestResolver,
}

impl ApiState {
    pub fn new(config: &AppConfig, manager: Arc<GraphManager>, default_instance: EngineHandle) -> Self {
        let resolver = RequestResolver::new(Arc::clone(&manager), default_instance);

        Self {
            config: config.clone(),
            manager,
            resolver,
        }
    }
}
