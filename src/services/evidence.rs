use std::collections::BTreeMap;

use crate::types::{AssessmentPhase, ResponseEvent, SkillId};

/// Correctness sequences per skill, in answer order.
pub type SkillEvidence = BTreeMap<SkillId, Vec<bool>>;

#[derive(Debug, Clone, Copy)]
pub struct AggregateOptions<'a> {
    pub learner_id: &'a str,
    pub phase: Option<AssessmentPhase>,
    pub min_responses_per_skill: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedEvidence {
    pub per_skill: SkillEvidence,
    /// Skill-tagged events that survived the learner and phase filters.
    pub usable_events: usize,
    pub skipped_skills: Vec<SkillId>,
}

/// Keeps only events belonging to the learner and, if requested, the phase.
/// Untagged events (`AssessmentPhase::None`) belong to whatever batch carries them.
pub fn select<'e>(
    events: &'e [ResponseEvent],
    learner_id: &str,
    phase: Option<AssessmentPhase>,
) -> Vec<&'e ResponseEvent> {
    let mut selected: Vec<&ResponseEvent> = events
        .iter()
        .filter(|e| e.learner_id == learner_id)
        .filter(|e| phase.map_or(true, |p| e.phase == p || e.phase == AssessmentPhase::None))
        .collect();
    // Stable: ties keep submission order.
    selected.sort_by_key(|e| (e.answered_at, e.sequence));
    selected
}

pub fn aggregate(events: &[ResponseEvent], options: AggregateOptions<'_>) -> AggregatedEvidence {
    let selected = select(events, options.learner_id, options.phase);

    let mut per_skill = SkillEvidence::new();
    let mut usable_events = 0usize;
    for event in selected {
        let Some(skill_id) = event.skill_id.as_ref() else {
            continue;
        };
        usable_events += 1;
        per_skill
            .entry(skill_id.clone())
            .or_default()
            .push(event.is_correct);
    }

    let mut skipped_skills = Vec::new();
    per_skill.retain(|skill_id, series| {
        let keep = series.len() >= options.min_responses_per_skill;
        if !keep {
            skipped_skills.push(skill_id.clone());
        }
        keep
    });

    AggregatedEvidence {
        per_skill,
        usable_events,
        skipped_skills,
    }
}

/// Raw score over the same selection the aggregator sees, skill-less events included.
pub fn raw_score(
    events: &[ResponseEvent],
    learner_id: &str,
    phase: Option<AssessmentPhase>,
) -> (usize, usize) {
    let selected = select(events, learner_id, phase);
    let correct = selected.iter().filter(|e| e.is_correct).count();
    (correct, selected.len())
}
