use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::config::EngineConfig;
use crate::db::DatabaseProxy;
use crate::services::mastery_engine::MasteryEngine;

#[derive(Clone)]
pub struct AppState {
    engine: MasteryEngine,
    started_at: Instant,
    started_at_system: SystemTime,
}

impl AppState {
    pub fn new(proxy: DatabaseProxy, config: Arc<EngineConfig>) -> Self {
        Self {
            engine: MasteryEngine::new(proxy, config),
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
        }
    }

    pub fn engine(&self) -> &MasteryEngine {
        &self.engine
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
