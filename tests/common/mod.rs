#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;

use skill_mastery_engine::config::EngineConfig;
use skill_mastery_engine::db::DatabaseProxy;
use skill_mastery_engine::services::mastery_engine::MasteryEngine;
use skill_mastery_engine::state::AppState;
use skill_mastery_engine::types::{AssessmentPhase, ResponseEvent};

pub const LEARNER: &str = "learner-1";
pub const COURSE: &str = "course-1";

pub struct TestDb {
    pub proxy: DatabaseProxy,
    _dir: TempDir,
}

pub async fn open_test_db() -> TestDb {
    let dir = TempDir::new().expect("tempdir");
    let proxy = DatabaseProxy::open(&dir.path().join("mastery.db"))
        .await
        .expect("open test database");
    TestDb { proxy, _dir: dir }
}

pub async fn create_test_engine(config: EngineConfig) -> (TestDb, MasteryEngine) {
    let db = open_test_db().await;
    let engine = MasteryEngine::new(db.proxy.clone(), Arc::new(config));
    (db, engine)
}

pub async fn create_test_app() -> (TestDb, Router) {
    let db = open_test_db().await;
    let state = AppState::new(db.proxy.clone(), Arc::new(EngineConfig::default()));
    (db, skill_mastery_engine::create_app(state))
}

/// Events for one skill in answer order.
pub fn answers(skill: &str, outcomes: &[bool], phase: AssessmentPhase) -> Vec<ResponseEvent> {
    outcomes
        .iter()
        .enumerate()
        .map(|(i, &correct)| {
            ResponseEvent::new(LEARNER, skill, correct)
                .with_phase(phase)
                .with_sequence(i as i64)
        })
        .collect()
}
