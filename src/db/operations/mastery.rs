use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::db::{DatabaseProxy, StoreError};
use crate::services::bkt::clamp01;
use crate::types::{AssessmentPhase, MasteryHistoryRecord, MasteryRecord, SkillId};

const MAX_HISTORY_LIMIT: i64 = 1000;

/// One computed estimate to persist, guarded by the version seen in the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct MasteryEvent {
    pub skill_id: SkillId,
    pub mastery: f64,
    /// `None` when the snapshot had no row for this skill.
    pub expected_version: Option<i64>,
    pub previous_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
pub struct Provenance<'a> {
    pub phase: AssessmentPhase,
    pub source: &'a str,
    /// Mastery cut-off active for this write.
    pub threshold: f64,
}

/// Upserts the current row and appends one history row per event, all in one
/// transaction. Any version mismatch rolls the whole batch back.
pub async fn record_mastery_events(
    proxy: &DatabaseProxy,
    learner_id: &str,
    course_id: &str,
    events: &[MasteryEvent],
    provenance: Provenance<'_>,
) -> Result<Vec<MasteryRecord>, StoreError> {
    if events.is_empty() {
        return Ok(Vec::new());
    }

    let now = Utc::now().trunc_subsecs(6);
    let mut tx = proxy.pool().begin().await?;
    let mut written = Vec::with_capacity(events.len());

    for event in events {
        let mastery = clamp01(event.mastery);
        let is_mastered = mastery >= provenance.threshold;
        let last_updated = event.previous_updated.map_or(now, |prev| prev.max(now));
        let ts = format_ts(last_updated);

        let version = match event.expected_version {
            None => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO "skill_mastery"
                      ("id","learnerId","courseId","skillId","estimatedMastery","isMastered","lastUpdated","version")
                    VALUES (?, ?, ?, ?, ?, ?, ?, 1)
                    ON CONFLICT ("learnerId","courseId","skillId") DO NOTHING
                    "#,
                )
                .bind(Uuid::new_v4().to_string())
                .bind(learner_id)
                .bind(course_id)
                .bind(event.skill_id.as_str())
                .bind(mastery)
                .bind(is_mastered)
                .bind(&ts)
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(StoreError::Conflict {
                        skill_id: event.skill_id.to_string(),
                    });
                }
                1
            }
            Some(expected) => {
                let result = sqlx::query(
                    r#"
                    UPDATE "skill_mastery"
                    SET "estimatedMastery" = ?, "isMastered" = ?, "lastUpdated" = ?, "version" = "version" + 1
                    WHERE "learnerId" = ? AND "courseId" = ? AND "skillId" = ? AND "version" = ?
                    "#,
                )
                .bind(mastery)
                .bind(is_mastered)
                .bind(&ts)
                .bind(learner_id)
                .bind(course_id)
                .bind(event.skill_id.as_str())
                .bind(expected)
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(StoreError::Conflict {
                        skill_id: event.skill_id.to_string(),
                    });
                }
                expected + 1
            }
        };

        sqlx::query(
            r#"
            INSERT INTO "skill_mastery_history"
              ("id","learnerId","courseId","skillId","estimatedMastery","isMastered","assessmentPhase","source","createdAt")
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(learner_id)
        .bind(course_id)
        .bind(event.skill_id.as_str())
        .bind(mastery)
        .bind(is_mastered)
        .bind(provenance.phase.as_str())
        .bind(provenance.source)
        .bind(&ts)
        .execute(&mut *tx)
        .await?;

        written.push(MasteryRecord {
            learner_id: learner_id.to_string(),
            course_id: course_id.to_string(),
            skill_id: event.skill_id.clone(),
            estimated_mastery: mastery,
            is_mastered,
            last_updated,
            version,
        });
    }

    tx.commit().await?;
    Ok(written)
}

pub async fn load_course_mastery(
    proxy: &DatabaseProxy,
    learner_id: &str,
    course_id: &str,
) -> Result<Vec<MasteryRecord>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT "learnerId","courseId","skillId","estimatedMastery","isMastered","lastUpdated","version"
        FROM "skill_mastery"
        WHERE "learnerId" = ? AND "courseId" = ?
        "#,
    )
    .bind(learner_id)
    .bind(course_id)
    .fetch_all(proxy.pool())
    .await?;

    let mut records = rows
        .iter()
        .map(map_mastery_row)
        .collect::<Result<Vec<_>, _>>()?;
    // SkillId ordering, not SQL text ordering: "2" before "10".
    records.sort_by(|a, b| a.skill_id.cmp(&b.skill_id));
    Ok(records)
}

pub async fn load_learner_mastery(
    proxy: &DatabaseProxy,
    learner_id: &str,
) -> Result<Vec<MasteryRecord>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT "learnerId","courseId","skillId","estimatedMastery","isMastered","lastUpdated","version"
        FROM "skill_mastery"
        WHERE "learnerId" = ?
        "#,
    )
    .bind(learner_id)
    .fetch_all(proxy.pool())
    .await?;

    let mut records = rows
        .iter()
        .map(map_mastery_row)
        .collect::<Result<Vec<_>, _>>()?;
    records.sort_by(|a, b| {
        a.course_id
            .cmp(&b.course_id)
            .then_with(|| a.skill_id.cmp(&b.skill_id))
    });
    Ok(records)
}

/// History newest first.
pub async fn load_history(
    proxy: &DatabaseProxy,
    learner_id: &str,
    course_id: &str,
    limit: Option<i64>,
) -> Result<Vec<MasteryHistoryRecord>, StoreError> {
    let limit = limit.unwrap_or(MAX_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);

    let rows = sqlx::query(
        r#"
        SELECT "id","learnerId","courseId","skillId","estimatedMastery","isMastered",
               "assessmentPhase","source","createdAt"
        FROM "skill_mastery_history"
        WHERE "learnerId" = ? AND "courseId" = ?
        ORDER BY "createdAt" DESC, rowid DESC
        LIMIT ?
        "#,
    )
    .bind(learner_id)
    .bind(course_id)
    .bind(limit)
    .fetch_all(proxy.pool())
    .await?;

    rows.iter().map(map_history_row).collect()
}

pub async fn count_history(
    proxy: &DatabaseProxy,
    learner_id: &str,
    course_id: &str,
) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "skill_mastery_history" WHERE "learnerId" = ? AND "courseId" = ?"#,
    )
    .bind(learner_id)
    .bind(course_id)
    .fetch_one(proxy.pool())
    .await?;
    Ok(count)
}

/// Earliest `pre`-phase snapshot per skill.
pub async fn load_pre_baseline(
    proxy: &DatabaseProxy,
    learner_id: &str,
    course_id: &str,
) -> Result<BTreeMap<SkillId, f64>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT "skillId","estimatedMastery"
        FROM "skill_mastery_history"
        WHERE "learnerId" = ? AND "courseId" = ? AND "assessmentPhase" = 'pre'
        ORDER BY "createdAt" ASC, rowid ASC
        "#,
    )
    .bind(learner_id)
    .bind(course_id)
    .fetch_all(proxy.pool())
    .await?;

    let mut baseline = BTreeMap::new();
    for row in &rows {
        let skill_id: String = row.try_get("skillId")?;
        let mastery: f64 = row.try_get("estimatedMastery")?;
        baseline.entry(SkillId::from(skill_id)).or_insert(mastery);
    }
    Ok(baseline)
}

fn map_mastery_row(row: &SqliteRow) -> Result<MasteryRecord, StoreError> {
    let skill_id: String = row.try_get("skillId")?;
    let last_updated: String = row.try_get("lastUpdated")?;
    Ok(MasteryRecord {
        learner_id: row.try_get("learnerId")?,
        course_id: row.try_get("courseId")?,
        skill_id: SkillId::from(skill_id),
        estimated_mastery: clamp01(row.try_get("estimatedMastery")?),
        is_mastered: row.try_get("isMastered")?,
        last_updated: parse_ts(&last_updated)?,
        version: row.try_get("version")?,
    })
}

fn map_history_row(row: &SqliteRow) -> Result<MasteryHistoryRecord, StoreError> {
    let skill_id: String = row.try_get("skillId")?;
    let phase: String = row.try_get("assessmentPhase")?;
    let created_at: String = row.try_get("createdAt")?;
    Ok(MasteryHistoryRecord {
        id: row.try_get("id")?,
        learner_id: row.try_get("learnerId")?,
        course_id: row.try_get("courseId")?,
        skill_id: SkillId::from(skill_id),
        estimated_mastery: row.try_get("estimatedMastery")?,
        is_mastered: row.try_get("isMastered")?,
        assessment_phase: AssessmentPhase::parse(&phase),
        source: row.try_get("source")?,
        created_at: parse_ts(&created_at)?,
    })
}

// Fixed-width UTC timestamps so text ordering matches time ordering.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("timestamp {raw:?}: {e}")))
}
