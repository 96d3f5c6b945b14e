use std::collections::BTreeMap;

use serde::Serialize;

use crate::types::SkillId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityReason {
    BothBktAndScore,
    BktMasteryOnly,
    ScoreOnly,
    FailedBoth,
    NoData,
}

impl EligibilityReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BothBktAndScore => "both_bkt_and_score",
            Self::BktMasteryOnly => "bkt_mastery_only",
            Self::ScoreOnly => "score_only",
            Self::FailedBoth => "failed_both",
            Self::NoData => "no_data",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityRule {
    pub mastery_threshold: f64,
    pub score_threshold: f64,
}

impl Default for EligibilityRule {
    fn default() -> Self {
        Self {
            mastery_threshold: 0.8,
            score_threshold: 0.75,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityDecision {
    pub completion_eligible: bool,
    pub bkt_eligible: bool,
    pub score_eligible: bool,
    pub reason: EligibilityReason,
    pub overall_score: f64,
}

impl EligibilityDecision {
    pub fn no_data() -> Self {
        Self {
            completion_eligible: false,
            bkt_eligible: false,
            score_eligible: false,
            reason: EligibilityReason::NoData,
            overall_score: 0.0,
        }
    }
}

/// True iff there is at least one skill and every skill reaches `threshold`.
pub fn all_mastered(masteries: &BTreeMap<SkillId, f64>, threshold: f64) -> bool {
    !masteries.is_empty() && masteries.values().all(|&m| m >= threshold)
}

/// Hybrid completion rule: BKT mastery OR raw score is enough to pass.
pub fn evaluate(
    masteries: &BTreeMap<SkillId, f64>,
    raw_score: f64,
    rule: &EligibilityRule,
) -> EligibilityDecision {
    let bkt_eligible = all_mastered(masteries, rule.mastery_threshold);
    let score_eligible = raw_score >= rule.score_threshold;

    let reason = match (bkt_eligible, score_eligible) {
        (true, true) => EligibilityReason::BothBktAndScore,
        (true, false) => EligibilityReason::BktMasteryOnly,
        (false, true) => EligibilityReason::ScoreOnly,
        (false, false) => EligibilityReason::FailedBoth,
    };

    EligibilityDecision {
        completion_eligible: bkt_eligible || score_eligible,
        bkt_eligible,
        score_eligible,
        reason,
        overall_score: raw_score,
    }
}

/// `correct / total`, or `None` when there were no responses.
pub fn score_ratio(correct: usize, total: usize) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(correct as f64 / total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masteries(pairs: &[(i64, f64)]) -> BTreeMap<SkillId, f64> {
        pairs.iter().map(|&(id, m)| (SkillId::from(id), m)).collect()
    }

    #[test]
    fn test_bkt_mastery_only() {
        let d = evaluate(&masteries(&[(1, 0.85), (2, 0.9)]), 0.5, &EligibilityRule::default());
        assert!(d.bkt_eligible);
        assert!(!d.score_eligible);
        assert!(d.completion_eligible);
        assert_eq!(d.reason, EligibilityReason::BktMasteryOnly);
    }

    #[test]
    fn test_score_only() {
        let d = evaluate(&masteries(&[(1, 0.4)]), 0.8, &EligibilityRule::default());
        assert!(d.completion_eligible);
        assert_eq!(d.reason, EligibilityReason::ScoreOnly);
    }

    #[test]
    fn test_failed_both() {
        let d = evaluate(&masteries(&[(1, 0.4)]), 0.5, &EligibilityRule::default());
        assert!(!d.completion_eligible);
        assert_eq!(d.reason, EligibilityReason::FailedBoth);
    }

    #[test]
    fn test_both_criteria() {
        let d = evaluate(&masteries(&[(1, 0.8)]), 0.75, &EligibilityRule::default());
        assert!(d.completion_eligible);
        assert_eq!(d.reason, EligibilityReason::BothBktAndScore);
    }

    #[test]
    fn test_empty_map_is_never_bkt_eligible() {
        let d = evaluate(&BTreeMap::new(), 0.5, &EligibilityRule::default());
        assert!(!d.bkt_eligible);
        assert_eq!(d.reason, EligibilityReason::FailedBoth);
    }

    #[test]
    fn test_reason_serializes_snake_case() {
        let json = serde_json::to_string(&EligibilityReason::BktMasteryOnly).unwrap();
        assert_eq!(json, "\"bkt_mastery_only\"");
    }

    #[test]
    fn test_score_ratio() {
        assert_eq!(score_ratio(3, 4), Some(0.75));
        assert_eq!(score_ratio(0, 0), None);
    }
}
