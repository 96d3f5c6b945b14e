use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Opaque identifier of one learnable unit (a lesson-level skill).
///
/// Accepts JSON integers or strings and stores both as text. Integer-looking
/// ids order numerically and sort before any other id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SkillId(String);

impl SkillId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for SkillId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.parse::<i64>(), other.0.parse::<i64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for SkillId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<'de> Deserialize<'de> for SkillId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Str(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(value) => Self::from(value),
            Raw::Str(value) => Self(value),
        })
    }
}

impl fmt::Display for SkillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SkillId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SkillId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i32> for SkillId {
    fn from(value: i32) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for SkillId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentPhase {
    Pre,
    Post,
    #[default]
    None,
}

impl AssessmentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pre => "pre",
            Self::Post => "post",
            Self::None => "none",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pre" => Self::Pre,
            "post" => Self::Post,
            _ => Self::None,
        }
    }

    /// Derives the phase from a provenance tag such as `pre_assessment`.
    pub fn from_source(source: &str) -> Self {
        let source = source.to_ascii_lowercase();
        if source.contains("pre") {
            Self::Pre
        } else if source.contains("post") {
            Self::Post
        } else {
            Self::None
        }
    }
}

impl fmt::Display for AssessmentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One graded answer, owned by the assessment subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEvent {
    pub learner_id: String,
    #[serde(default)]
    pub skill_id: Option<SkillId>,
    pub is_correct: bool,
    #[serde(default)]
    pub assessment_id: Option<String>,
    #[serde(default)]
    pub phase: AssessmentPhase,
    #[serde(default)]
    pub sequence: i64,
    #[serde(default)]
    pub answered_at: Option<DateTime<Utc>>,
}

impl ResponseEvent {
    pub fn new(learner_id: &str, skill_id: impl Into<SkillId>, is_correct: bool) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            skill_id: Some(skill_id.into()),
            is_correct,
            assessment_id: None,
            phase: AssessmentPhase::None,
            sequence: 0,
            answered_at: None,
        }
    }

    pub fn with_phase(mut self, phase: AssessmentPhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_sequence(mut self, sequence: i64) -> Self {
        self.sequence = sequence;
        self
    }
}

/// Current-state row for one (learner, course, skill).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryRecord {
    pub learner_id: String,
    pub course_id: String,
    pub skill_id: SkillId,
    pub estimated_mastery: f64,
    pub is_mastered: bool,
    pub last_updated: DateTime<Utc>,
    #[serde(skip)]
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryHistoryRecord {
    pub id: String,
    pub learner_id: String,
    pub course_id: String,
    pub skill_id: SkillId,
    pub estimated_mastery: f64,
    pub is_mastered: bool,
    pub assessment_phase: AssessmentPhase,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterySnapshot {
    pub mastery: f64,
    pub is_mastered: bool,
    pub last_updated: DateTime<Utc>,
}

impl From<&MasteryRecord> for MasterySnapshot {
    fn from(record: &MasteryRecord) -> Self {
        Self {
            mastery: record.estimated_mastery,
            is_mastered: record.is_mastered,
            last_updated: record.last_updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_from_source() {
        assert_eq!(AssessmentPhase::from_source("pre_assessment"), AssessmentPhase::Pre);
        assert_eq!(AssessmentPhase::from_source("post_assessment"), AssessmentPhase::Post);
        assert_eq!(AssessmentPhase::from_source("lesson_completion"), AssessmentPhase::None);
    }

    #[test]
    fn test_response_event_defaults_from_json() {
        let event: ResponseEvent =
            serde_json::from_str(r#"{"learnerId":"u1","skillId":"3","isCorrect":true}"#).unwrap();
        assert_eq!(event.skill_id, Some(SkillId::from(3)));
        assert_eq!(event.phase, AssessmentPhase::None);
        assert_eq!(event.sequence, 0);
    }

    #[test]
    fn test_integer_skill_id_from_json() {
        let event: ResponseEvent =
            serde_json::from_str(r#"{"learnerId":"u1","skillId":3,"isCorrect":false}"#).unwrap();
        assert_eq!(event.skill_id, Some(SkillId::from("3")));

        let missing: ResponseEvent =
            serde_json::from_str(r#"{"learnerId":"u1","skillId":null,"isCorrect":true}"#).unwrap();
        assert_eq!(missing.skill_id, None);
    }

    #[test]
    fn test_numeric_ids_order_numerically() {
        let mut ids = vec![
            SkillId::from("10"),
            SkillId::from("intro"),
            SkillId::from(2),
            SkillId::from("basics"),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                SkillId::from(2),
                SkillId::from(10),
                SkillId::from("basics"),
                SkillId::from("intro"),
            ]
        );
    }

    #[test]
    fn test_skill_id_serializes_transparently() {
        let json = serde_json::to_string(&SkillId::from("fake_news")).unwrap();
        assert_eq!(json, "\"fake_news\"");
    }
}
