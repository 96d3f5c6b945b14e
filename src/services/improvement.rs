use std::collections::BTreeMap;

use serde::Serialize;

use crate::types::SkillId;

const STRONG_GROWTH: f64 = 0.3;
const MODERATE_GROWTH: f64 = 0.1;
// Small baselines would blow up the relative change.
const PERCENTAGE_FLOOR: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GrowthLabel {
    Strong,
    Moderate,
    Minimal,
}

impl GrowthLabel {
    pub fn classify(avg_improvement: f64) -> Self {
        if avg_improvement > STRONG_GROWTH {
            Self::Strong
        } else if avg_improvement > MODERATE_GROWTH {
            Self::Moderate
        } else {
            Self::Minimal
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillImprovement {
    pub pre_mastery: f64,
    pub post_mastery: f64,
    pub improvement: f64,
    /// `None` when there is no positive pre baseline to compare against.
    pub improvement_percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImprovementAnalysis {
    pub avg_improvement: f64,
    pub skills_improved: usize,
    pub total_skills: usize,
    pub detailed_improvements: BTreeMap<SkillId, SkillImprovement>,
    pub overall_growth: GrowthLabel,
}

impl ImprovementAnalysis {
    pub fn empty() -> Self {
        Self {
            avg_improvement: 0.0,
            skills_improved: 0,
            total_skills: 0,
            detailed_improvements: BTreeMap::new(),
            overall_growth: GrowthLabel::Minimal,
        }
    }
}

/// Compares post masteries with the pre baseline; missing baselines count as 0.0.
pub fn analyze(
    post: &BTreeMap<SkillId, f64>,
    pre_baseline: &BTreeMap<SkillId, f64>,
    min_delta: f64,
) -> ImprovementAnalysis {
    if post.is_empty() {
        return ImprovementAnalysis::empty();
    }

    let mut detailed_improvements = BTreeMap::new();
    let mut total = 0.0;
    let mut skills_improved = 0;

    for (skill_id, &post_mastery) in post {
        let pre_mastery = pre_baseline.get(skill_id).copied().unwrap_or(0.0);
        let improvement = post_mastery - pre_mastery;
        let improvement_percentage = if pre_mastery > 0.0 {
            Some(improvement / pre_mastery.max(PERCENTAGE_FLOOR) * 100.0)
        } else {
            None
        };

        total += improvement;
        if improvement > min_delta {
            skills_improved += 1;
        }

        detailed_improvements.insert(
            skill_id.clone(),
            SkillImprovement {
                pre_mastery,
                post_mastery,
                improvement,
                improvement_percentage,
            },
        );
    }

    let avg_improvement = total / post.len() as f64;

    ImprovementAnalysis {
        avg_improvement,
        skills_improved,
        total_skills: post.len(),
        detailed_improvements,
        overall_growth: GrowthLabel::classify(avg_improvement),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(i64, f64)]) -> BTreeMap<SkillId, f64> {
        pairs.iter().map(|&(id, m)| (SkillId::from(id), m)).collect()
    }

    #[test]
    fn test_missing_baseline_defaults_to_zero() {
        let analysis = analyze(&map(&[(1, 0.6)]), &BTreeMap::new(), 0.1);
        let detail = &analysis.detailed_improvements[&SkillId::from(1)];
        assert_eq!(detail.pre_mastery, 0.0);
        assert!((detail.improvement - 0.6).abs() < 1e-12);
        assert_eq!(detail.improvement_percentage, None);
        assert_eq!(analysis.skills_improved, 1);
    }

    #[test]
    fn test_aggregate_and_label() {
        let analysis = analyze(&map(&[(1, 0.9), (2, 0.5)]), &map(&[(1, 0.2), (2, 0.45)]), 0.1);
        assert!((analysis.avg_improvement - 0.375).abs() < 1e-12);
        assert_eq!(analysis.skills_improved, 1);
        assert_eq!(analysis.total_skills, 2);
        assert_eq!(analysis.overall_growth, GrowthLabel::Strong);
    }

    #[test]
    fn test_percentage_relative_to_baseline() {
        let analysis = analyze(&map(&[(1, 0.75)]), &map(&[(1, 0.5)]), 0.1);
        let pct = analysis.detailed_improvements[&SkillId::from(1)]
            .improvement_percentage
            .unwrap();
        assert!((pct - 50.0).abs() < 1e-9);
        assert_eq!(analysis.overall_growth, GrowthLabel::Moderate);
    }

    #[test]
    fn test_regression_is_minimal() {
        let analysis = analyze(&map(&[(1, 0.3)]), &map(&[(1, 0.5)]), 0.1);
        assert!(analysis.avg_improvement < 0.0);
        assert_eq!(analysis.skills_improved, 0);
        assert_eq!(analysis.overall_growth, GrowthLabel::Minimal);
    }

    #[test]
    fn test_empty_post_is_empty_analysis() {
        assert_eq!(analyze(&BTreeMap::new(), &map(&[(1, 0.5)]), 0.1), ImprovementAnalysis::empty());
    }
}
