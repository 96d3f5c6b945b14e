use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::response::{ok, AppError};
use crate::services::improvement::ImprovementAnalysis;
use crate::services::mastery_engine::{MAX_BATCH_SIZE, DEFAULT_SOURCE};
use crate::services::recommendation::RecommendationStatus;
use crate::state::AppState;
use crate::types::{AssessmentPhase, MasterySnapshot, ResponseEvent, SkillId};

const DEFAULT_HISTORY_LIMIT: i64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/config", get(get_config))
        .route("/learners/:learnerId/status", get(learner_status))
        .route(
            "/learners/:learnerId/courses/:courseId/batch",
            post(process_batch),
        )
        .route(
            "/learners/:learnerId/courses/:courseId/pre-assessment",
            post(pre_assessment),
        )
        .route(
            "/learners/:learnerId/courses/:courseId/post-assessment",
            post(post_assessment),
        )
        .route(
            "/learners/:learnerId/courses/:courseId/recommendations",
            get(recommendations),
        )
        .route(
            "/learners/:learnerId/courses/:courseId/mastery",
            get(current_mastery),
        )
        .route(
            "/learners/:learnerId/courses/:courseId/history",
            get(history),
        )
        .route(
            "/learners/:learnerId/courses/:courseId/improvement",
            get(improvement),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchRequest {
    #[serde(default)]
    evidence: Vec<ResponseEvent>,
    phase: Option<AssessmentPhase>,
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreAssessmentRequest {
    #[serde(default)]
    evidence: Vec<ResponseEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostAssessmentRequest {
    #[serde(default)]
    evidence: Vec<ResponseEvent>,
    raw_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendationQuery {
    threshold: Option<f64>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    limit: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigResponse {
    #[serde(flatten)]
    engine: EngineConfig,
    max_batch_size: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CurrentMasteryResponse {
    status: RecommendationStatus,
    total_skills: usize,
    mastered_count: usize,
    masteries: BTreeMap<SkillId, MasterySnapshot>,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum ImprovementStatus {
    Ok,
    NoData,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImprovementResponse {
    status: ImprovementStatus,
    #[serde(flatten)]
    analysis: Option<ImprovementAnalysis>,
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| AppError::validation(format!("invalid JSON body: {e}")))
}

async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    ok(ConfigResponse {
        engine: state.engine().config().clone(),
        max_batch_size: MAX_BATCH_SIZE,
    })
}

async fn learner_status(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let status = state.engine().get_learner_status(&learner_id).await?;
    Ok(ok(status))
}

async fn process_batch(
    State(state): State<AppState>,
    Path((learner_id, course_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: BatchRequest = parse_json(&body)?;
    let source = payload
        .source
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SOURCE.to_string());
    let phase = payload
        .phase
        .unwrap_or_else(|| AssessmentPhase::from_source(&source));

    let outcome = state
        .engine()
        .process_batch(&learner_id, &course_id, &payload.evidence, phase, &source)
        .await?;
    Ok(ok(outcome))
}

async fn pre_assessment(
    State(state): State<AppState>,
    Path((learner_id, course_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: PreAssessmentRequest = parse_json(&body)?;
    let outcome = state
        .engine()
        .process_pre_assessment(&learner_id, &course_id, &payload.evidence)
        .await?;
    Ok(ok(outcome))
}

async fn post_assessment(
    State(state): State<AppState>,
    Path((learner_id, course_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: PostAssessmentRequest = parse_json(&body)?;
    if let Some(score) = payload.raw_score {
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(AppError::bad_request("rawScore must be between 0 and 1"));
        }
    }

    let outcome = state
        .engine()
        .process_post_assessment(&learner_id, &course_id, &payload.evidence, payload.raw_score)
        .await?;
    Ok(ok(outcome))
}

async fn recommendations(
    State(state): State<AppState>,
    Path((learner_id, course_id)): Path<(String, String)>,
    Query(query): Query<RecommendationQuery>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(threshold) = query.threshold {
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(AppError::bad_request("threshold must be between 0 and 1"));
        }
    }
    if query.limit == Some(0) {
        return Err(AppError::bad_request("limit must be at least 1"));
    }

    let result = state
        .engine()
        .get_recommendations(&learner_id, &course_id, query.threshold, query.limit)
        .await?;
    Ok(ok(result))
}

async fn current_mastery(
    State(state): State<AppState>,
    Path((learner_id, course_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let masteries = state
        .engine()
        .get_current_mastery(&learner_id, &course_id)
        .await?;

    let status = if masteries.is_empty() {
        RecommendationStatus::NoAssessmentsTaken
    } else {
        RecommendationStatus::RecommendationsReady
    };
    let mastered_count = masteries.values().filter(|m| m.is_mastered).count();

    Ok(ok(CurrentMasteryResponse {
        status,
        total_skills: masteries.len(),
        mastered_count,
        masteries,
    }))
}

async fn history(
    State(state): State<AppState>,
    Path((learner_id, course_id)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if limit < 1 {
        return Err(AppError::bad_request("limit must be at least 1"));
    }

    let history = state
        .engine()
        .get_history(&learner_id, &course_id, Some(limit))
        .await?;
    Ok(ok(history))
}

async fn improvement(
    State(state): State<AppState>,
    Path((learner_id, course_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let analysis = state
        .engine()
        .get_improvement_analysis(&learner_id, &course_id)
        .await?;

    let status = if analysis.is_some() {
        ImprovementStatus::Ok
    } else {
        ImprovementStatus::NoData
    };
    Ok(ok(ImprovementResponse { status, analysis }))
}
