use std::collections::BTreeMap;

use serde::Serialize;

use crate::types::SkillId;

const ANALYSED_SKILLS: usize = 3;
const MINUTES_PER_SKILL_MIN: usize = 15;
const MINUTES_PER_SKILL_MAX: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    RecommendationsReady,
    NoAssessmentsTaken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
    Done,
}

impl Priority {
    pub fn classify(mastery: f64, threshold: f64) -> Self {
        if mastery < 0.3 {
            Self::High
        } else if mastery < 0.5 {
            Self::Medium
        } else if mastery < threshold {
            Self::Low
        } else {
            Self::Done
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::High => "Critical: fundamental concepts need reinforcement",
            Self::Medium => "Developing: practice needed to build confidence",
            Self::Low => "Almost there: review to achieve mastery",
            Self::Done => "Mastered: ready for advanced topics",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillAnalysis {
    pub current_mastery: f64,
    pub reason: &'static str,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendations {
    pub status: RecommendationStatus,
    pub recommended_skills: Vec<SkillId>,
    pub next_priority: Option<SkillId>,
    pub mastery_analysis: BTreeMap<SkillId, SkillAnalysis>,
    pub suggested_path: Vec<SkillId>,
    pub time_estimate: String,
}

impl Recommendations {
    pub fn no_assessments_taken() -> Self {
        Self {
            status: RecommendationStatus::NoAssessmentsTaken,
            recommended_skills: Vec::new(),
            next_priority: None,
            mastery_analysis: BTreeMap::new(),
            suggested_path: Vec::new(),
            time_estimate: "Unknown".to_string(),
        }
    }
}

/// Ranks skills by current mastery.
///
/// Skills under `threshold` are recommended lowest first, up to `limit`.
/// When nothing is under the threshold every skill tied at the minimum is
/// returned instead, so a tracked learner always gets a next step.
pub fn recommend(masteries: &[(SkillId, f64)], threshold: f64, limit: usize) -> Recommendations {
    if masteries.is_empty() {
        return Recommendations::no_assessments_taken();
    }

    let mut items: Vec<(SkillId, f64)> = masteries.to_vec();
    items.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

    let below: Vec<&(SkillId, f64)> = items.iter().filter(|(_, m)| *m < threshold).collect();
    let top: Vec<(SkillId, f64)> = if below.is_empty() {
        let min = items[0].1;
        items.iter().filter(|(_, m)| *m == min).cloned().collect()
    } else {
        below.into_iter().take(limit).cloned().collect()
    };

    let mastery_analysis = top
        .iter()
        .take(ANALYSED_SKILLS)
        .map(|(skill_id, mastery)| {
            let priority = Priority::classify(*mastery, threshold);
            (
                skill_id.clone(),
                SkillAnalysis {
                    current_mastery: round3(*mastery),
                    reason: priority.reason(),
                    priority,
                },
            )
        })
        .collect();

    let time_estimate = if top.is_empty() {
        format!("{MINUTES_PER_SKILL_MIN}-{MINUTES_PER_SKILL_MAX} minutes")
    } else {
        format!(
            "{}-{} minutes",
            top.len() * MINUTES_PER_SKILL_MIN,
            top.len() * MINUTES_PER_SKILL_MAX
        )
    };

    let recommended_skills: Vec<SkillId> = top.into_iter().map(|(id, _)| id).collect();

    Recommendations {
        status: RecommendationStatus::RecommendationsReady,
        next_priority: recommended_skills.first().cloned(),
        recommended_skills,
        mastery_analysis,
        suggested_path: items.into_iter().map(|(id, _)| id).collect(),
        time_estimate,
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skills(pairs: &[(i64, f64)]) -> Vec<(SkillId, f64)> {
        pairs.iter().map(|&(id, m)| (SkillId::from(id), m)).collect()
    }

    #[test]
    fn test_no_records_is_explicit_status() {
        let recs = recommend(&[], 0.7, 5);
        assert_eq!(recs.status, RecommendationStatus::NoAssessmentsTaken);
        assert!(recs.recommended_skills.is_empty());
        assert_eq!(recs.time_estimate, "Unknown");
    }

    #[test]
    fn test_all_mastered_falls_back_to_minimum() {
        let recs = recommend(&skills(&[(1, 0.9), (2, 0.95)]), 0.7, 5);
        assert_eq!(recs.recommended_skills, vec![SkillId::from(1)]);
        assert_eq!(recs.mastery_analysis[&SkillId::from(1)].priority, Priority::Done);
        assert_eq!(recs.status, RecommendationStatus::RecommendationsReady);
    }

    #[test]
    fn test_fallback_includes_ties() {
        let recs = recommend(&skills(&[(3, 0.9), (1, 0.9), (2, 0.95)]), 0.7, 5);
        assert_eq!(recs.recommended_skills, vec![SkillId::from(1), SkillId::from(3)]);
    }

    #[test]
    fn test_ties_break_on_numeric_id() {
        let recs = recommend(&skills(&[(10, 0.9), (2, 0.9)]), 0.7, 5);
        assert_eq!(recs.recommended_skills, vec![SkillId::from(2), SkillId::from(10)]);
        assert_eq!(recs.suggested_path, vec![SkillId::from(2), SkillId::from(10)]);
    }

    #[test]
    fn test_weak_skills_sorted_and_limited() {
        let recs = recommend(
            &skills(&[(1, 0.6), (2, 0.1), (3, 0.45), (4, 0.9), (5, 0.2)]),
            0.7,
            2,
        );
        assert_eq!(recs.recommended_skills, vec![SkillId::from(2), SkillId::from(5)]);
        assert_eq!(recs.next_priority, Some(SkillId::from(2)));
        assert_eq!(
            recs.suggested_path,
            vec![
                SkillId::from(2),
                SkillId::from(5),
                SkillId::from(3),
                SkillId::from(1),
                SkillId::from(4)
            ]
        );
        assert_eq!(recs.time_estimate, "30-50 minutes");
    }

    #[test]
    fn test_analysis_covers_top_three_with_priorities() {
        let recs = recommend(&skills(&[(1, 0.1), (2, 0.4), (3, 0.6), (4, 0.65)]), 0.7, 5);
        assert_eq!(recs.recommended_skills.len(), 4);
        assert_eq!(recs.mastery_analysis.len(), 3);
        assert_eq!(recs.mastery_analysis[&SkillId::from(1)].priority, Priority::High);
        assert_eq!(recs.mastery_analysis[&SkillId::from(2)].priority, Priority::Medium);
        assert_eq!(recs.mastery_analysis[&SkillId::from(3)].priority, Priority::Low);
        assert!(!recs.mastery_analysis.contains_key(&SkillId::from(4)));
    }

    #[test]
    fn test_current_mastery_rounded() {
        let recs = recommend(&skills(&[(1, 0.123456)]), 0.7, 5);
        assert_eq!(recs.mastery_analysis[&SkillId::from(1)].current_mastery, 0.123);
    }

    #[test]
    fn test_priority_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"HIGH\"");
    }
}
