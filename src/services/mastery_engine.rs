//! Batch pipeline: evidence -> BKT -> transactional persistence, plus the
//! read-side queries (recommendations, eligibility, improvement).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::db::operations::mastery::{self as store, MasteryEvent, Provenance};
use crate::db::{DatabaseProxy, StoreError};
use crate::services::bkt::{self, clamp01};
use crate::services::eligibility::{self, EligibilityDecision, EligibilityReason, EligibilityRule};
use crate::services::evidence::{self, AggregateOptions, SkillEvidence};
use crate::services::improvement::{self, ImprovementAnalysis};
use crate::services::recommendation::{self, Recommendations};
use crate::types::{
    AssessmentPhase, MasteryHistoryRecord, MasteryRecord, MasterySnapshot, ResponseEvent, SkillId,
};

pub const MAX_BATCH_SIZE: usize = 500;
pub const DEFAULT_SOURCE: &str = "general_assessment";
pub const PRE_ASSESSMENT_SOURCE: &str = "pre_assessment";
pub const POST_ASSESSMENT_SOURCE: &str = "post_assessment";

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),
    /// The batch was rolled back; nothing from it was persisted.
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),
    #[error("gave up after {attempts} concurrent write conflicts")]
    WriteContention { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Ok,
    /// No skill-tagged evidence at all.
    NoData,
    /// Evidence existed but every skill was below the minimum response count.
    NoUpdates,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub status: BatchStatus,
    pub phase: AssessmentPhase,
    pub source: String,
    pub updated_masteries: BTreeMap<SkillId, f64>,
    pub skipped_skills: Vec<SkillId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreAssessmentOutcome {
    #[serde(flatten)]
    pub batch: BatchOutcome,
    /// Skills below the general mastery threshold.
    pub recommend: Vec<SkillId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAssessmentOutcome {
    #[serde(flatten)]
    pub batch: BatchOutcome,
    pub completion_eligible: bool,
    pub eligibility_reason: EligibilityReason,
    pub bkt_eligible: bool,
    pub score_eligible: bool,
    pub overall_score: f64,
    pub correct_count: usize,
    pub total_count: usize,
    pub mastered_count: usize,
    pub improvement_analysis: ImprovementAnalysis,
    pub recommended_after_post: Vec<SkillId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryHistory {
    pub records: Vec<MasteryHistoryRecord>,
    pub assessment_phases: Vec<AssessmentPhase>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerStatus {
    pub records: Vec<MasteryRecord>,
    pub total_skills: usize,
    pub mastered_count: usize,
}

#[derive(Clone)]
pub struct MasteryEngine {
    proxy: DatabaseProxy,
    config: Arc<EngineConfig>,
}

impl MasteryEngine {
    pub fn new(proxy: DatabaseProxy, config: Arc<EngineConfig>) -> Self {
        Self { proxy, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn proxy(&self) -> &DatabaseProxy {
        &self.proxy
    }

    /// Groups the evidence by skill, runs the filter and persists one current
    /// row plus one history row per updated skill.
    pub async fn process_batch(
        &self,
        learner_id: &str,
        course_id: &str,
        events: &[ResponseEvent],
        phase: AssessmentPhase,
        source: &str,
    ) -> Result<BatchOutcome, EngineError> {
        validate_key(learner_id, course_id)?;
        if events.len() > MAX_BATCH_SIZE {
            return Err(EngineError::Validation(format!(
                "evidence array exceeds maximum size of {MAX_BATCH_SIZE}"
            )));
        }
        let source = if source.trim().is_empty() {
            DEFAULT_SOURCE
        } else {
            source.trim()
        };

        let aggregated = evidence::aggregate(
            events,
            AggregateOptions {
                learner_id,
                phase: phase_filter(phase),
                min_responses_per_skill: self.config.min_responses_per_skill,
            },
        );

        if aggregated.per_skill.is_empty() {
            let status = if aggregated.usable_events == 0 {
                BatchStatus::NoData
            } else {
                BatchStatus::NoUpdates
            };
            debug!(learner_id, course_id, %phase, source, ?status, "nothing to update");
            return Ok(BatchOutcome {
                status,
                phase,
                source: source.to_string(),
                updated_masteries: BTreeMap::new(),
                skipped_skills: aggregated.skipped_skills,
            });
        }

        let updated_masteries = self
            .persist(learner_id, course_id, &aggregated.per_skill, phase, source)
            .await?;

        info!(
            learner_id,
            course_id,
            %phase,
            source,
            skills = updated_masteries.len(),
            "mastery batch processed"
        );

        Ok(BatchOutcome {
            status: BatchStatus::Ok,
            phase,
            source: source.to_string(),
            updated_masteries,
            skipped_skills: aggregated.skipped_skills,
        })
    }

    /// Diagnostic baseline; its history rows are what improvement is measured against.
    pub async fn process_pre_assessment(
        &self,
        learner_id: &str,
        course_id: &str,
        events: &[ResponseEvent],
    ) -> Result<PreAssessmentOutcome, EngineError> {
        let batch = self
            .process_batch(
                learner_id,
                course_id,
                events,
                AssessmentPhase::Pre,
                PRE_ASSESSMENT_SOURCE,
            )
            .await?;

        let threshold = self.config.thresholds.general;
        let recommend = batch
            .updated_masteries
            .iter()
            .filter(|&(_, &m)| m < threshold)
            .map(|(id, _)| id.clone())
            .collect();

        Ok(PreAssessmentOutcome { batch, recommend })
    }

    /// Summative assessment: updates mastery, then decides course completion
    /// and reports the change since the pre-assessment baseline.
    ///
    /// `raw_score` overrides the correct/total ratio computed from `events`.
    pub async fn process_post_assessment(
        &self,
        learner_id: &str,
        course_id: &str,
        events: &[ResponseEvent],
        raw_score: Option<f64>,
    ) -> Result<PostAssessmentOutcome, EngineError> {
        let batch = self
            .process_batch(
                learner_id,
                course_id,
                events,
                AssessmentPhase::Post,
                POST_ASSESSMENT_SOURCE,
            )
            .await?;

        let (correct_count, total_count) =
            evidence::raw_score(events, learner_id, Some(AssessmentPhase::Post));

        let post_threshold = self.config.thresholds.post_assessment;
        let decision = if total_count == 0 {
            EligibilityDecision::no_data()
        } else {
            let overall_score = raw_score
                .map(clamp01)
                .or_else(|| eligibility::score_ratio(correct_count, total_count))
                .unwrap_or(0.0);
            eligibility::evaluate(
                &batch.updated_masteries,
                overall_score,
                &EligibilityRule {
                    mastery_threshold: post_threshold,
                    score_threshold: self.config.completion_score_threshold,
                },
            )
        };

        let improvement_analysis = if batch.updated_masteries.is_empty() {
            ImprovementAnalysis::empty()
        } else {
            let baseline = store::load_pre_baseline(&self.proxy, learner_id, course_id).await?;
            improvement::analyze(
                &batch.updated_masteries,
                &baseline,
                self.config.improvement_min_delta,
            )
        };

        let recommended_after_post =
            if decision.completion_eligible || decision.reason == EligibilityReason::NoData {
                Vec::new()
            } else {
                self.get_recommendations(learner_id, course_id, Some(post_threshold), None)
                    .await?
                    .recommended_skills
            };

        let mastered_count = batch
            .updated_masteries
            .values()
            .filter(|&&m| m >= post_threshold)
            .count();

        info!(
            learner_id,
            course_id,
            eligible = decision.completion_eligible,
            reason = decision.reason.as_str(),
            overall_score = decision.overall_score,
            "post-assessment evaluated"
        );

        Ok(PostAssessmentOutcome {
            batch,
            completion_eligible: decision.completion_eligible,
            eligibility_reason: decision.reason,
            bkt_eligible: decision.bkt_eligible,
            score_eligible: decision.score_eligible,
            overall_score: decision.overall_score,
            correct_count,
            total_count,
            mastered_count,
            improvement_analysis,
            recommended_after_post,
        })
    }

    pub async fn get_recommendations(
        &self,
        learner_id: &str,
        course_id: &str,
        threshold: Option<f64>,
        limit: Option<usize>,
    ) -> Result<Recommendations, EngineError> {
        let threshold = threshold
            .map(clamp01)
            .unwrap_or(self.config.thresholds.general);
        let limit = limit.unwrap_or(self.config.recommendation_limit).max(1);

        let records = store::load_course_mastery(&self.proxy, learner_id, course_id).await?;
        let masteries: Vec<(SkillId, f64)> = records
            .into_iter()
            .map(|r| (r.skill_id, r.estimated_mastery))
            .collect();

        Ok(recommendation::recommend(&masteries, threshold, limit))
    }

    /// Empty when the learner was never assessed in this course.
    pub async fn get_current_mastery(
        &self,
        learner_id: &str,
        course_id: &str,
    ) -> Result<BTreeMap<SkillId, MasterySnapshot>, EngineError> {
        let records = store::load_course_mastery(&self.proxy, learner_id, course_id).await?;
        Ok(records
            .iter()
            .map(|r| (r.skill_id.clone(), MasterySnapshot::from(r)))
            .collect())
    }

    pub async fn get_history(
        &self,
        learner_id: &str,
        course_id: &str,
        limit: Option<i64>,
    ) -> Result<MasteryHistory, EngineError> {
        let records = store::load_history(&self.proxy, learner_id, course_id, limit).await?;
        let assessment_phases = records
            .iter()
            .map(|r| r.assessment_phase)
            .filter(|p| *p != AssessmentPhase::None)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Ok(MasteryHistory {
            records,
            assessment_phases,
        })
    }

    /// Improvement of the stored masteries over the pre baseline; `None` without data.
    pub async fn get_improvement_analysis(
        &self,
        learner_id: &str,
        course_id: &str,
    ) -> Result<Option<ImprovementAnalysis>, EngineError> {
        let records = store::load_course_mastery(&self.proxy, learner_id, course_id).await?;
        if records.is_empty() {
            return Ok(None);
        }
        let current: BTreeMap<SkillId, f64> = records
            .into_iter()
            .map(|r| (r.skill_id, r.estimated_mastery))
            .collect();
        let baseline = store::load_pre_baseline(&self.proxy, learner_id, course_id).await?;
        Ok(Some(improvement::analyze(
            &current,
            &baseline,
            self.config.improvement_min_delta,
        )))
    }

    pub async fn get_learner_status(&self, learner_id: &str) -> Result<LearnerStatus, EngineError> {
        let records = store::load_learner_mastery(&self.proxy, learner_id).await?;
        let mastered_count = records.iter().filter(|r| r.is_mastered).count();
        Ok(LearnerStatus {
            total_skills: records.len(),
            mastered_count,
            records,
        })
    }

    /// Snapshot, compute, compare-and-swap. A conflicting writer forces a fresh
    /// snapshot and recomputation so no update is lost.
    async fn persist(
        &self,
        learner_id: &str,
        course_id: &str,
        per_skill: &SkillEvidence,
        phase: AssessmentPhase,
        source: &str,
    ) -> Result<BTreeMap<SkillId, f64>, EngineError> {
        let provenance = Provenance {
            phase,
            source,
            threshold: self.config.thresholds.for_phase(phase),
        };
        let max_retries = self.config.max_write_retries;
        let mut attempt: u32 = 0;

        loop {
            let snapshot: HashMap<SkillId, MasteryRecord> =
                store::load_course_mastery(&self.proxy, learner_id, course_id)
                    .await?
                    .into_iter()
                    .map(|r| (r.skill_id.clone(), r))
                    .collect();

            let events = self.compute_events(per_skill, &snapshot);

            match store::record_mastery_events(&self.proxy, learner_id, course_id, &events, provenance)
                .await
            {
                Ok(records) => {
                    return Ok(records
                        .into_iter()
                        .map(|r| (r.skill_id, r.estimated_mastery))
                        .collect())
                }
                Err(StoreError::Conflict { skill_id }) if attempt < max_retries => {
                    attempt += 1;
                    warn!(learner_id, course_id, skill_id = %skill_id, attempt, "mastery write conflict, retrying");
                }
                Err(StoreError::Conflict { .. }) => {
                    return Err(EngineError::WriteContention {
                        attempts: attempt + 1,
                    })
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn compute_events(
        &self,
        per_skill: &SkillEvidence,
        snapshot: &HashMap<SkillId, MasteryRecord>,
    ) -> Vec<MasteryEvent> {
        let params = &self.config.bkt;
        per_skill
            .iter()
            .map(|(skill_id, series)| {
                let existing = snapshot.get(skill_id);
                let prior = match existing {
                    Some(record) if self.config.carry_prior => record.estimated_mastery,
                    _ => params.p_init,
                };
                MasteryEvent {
                    skill_id: skill_id.clone(),
                    mastery: bkt::run_from(prior, series, params),
                    expected_version: existing.map(|r| r.version),
                    previous_updated: existing.map(|r| r.last_updated),
                }
            })
            .collect()
    }
}

fn phase_filter(phase: AssessmentPhase) -> Option<AssessmentPhase> {
    match phase {
        AssessmentPhase::None => None,
        other => Some(other),
    }
}

fn validate_key(learner_id: &str, course_id: &str) -> Result<(), EngineError> {
    if learner_id.trim().is_empty() {
        return Err(EngineError::Validation("learnerId must not be empty".to_string()));
    }
    if course_id.trim().is_empty() {
        return Err(EngineError::Validation("courseId must not be empty".to_string()));
    }
    Ok(())
}
