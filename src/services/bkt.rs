//! Bayesian Knowledge Tracing: a two-state (known/unknown) forward filter.
//!
//! Each observation is folded into the current belief with Bayes' rule and
//! then pushed through the learning transition. There is no smoothing pass,
//! so a stored estimate can be extended with new evidence without replaying
//! earlier observations.

use serde::{Deserialize, Serialize};

const DEFAULT_P_INIT: f64 = 0.2;
const DEFAULT_P_LEARN: f64 = 0.15;
const DEFAULT_P_SLIP: f64 = 0.1;
const DEFAULT_P_GUESS: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BktParams {
    /// P(L0): mastery before any evidence.
    pub p_init: f64,
    /// P(T): unknown -> known between observations.
    pub p_learn: f64,
    /// P(incorrect | known).
    pub p_slip: f64,
    /// P(correct | unknown).
    pub p_guess: f64,
}

impl Default for BktParams {
    fn default() -> Self {
        Self {
            p_init: DEFAULT_P_INIT,
            p_learn: DEFAULT_P_LEARN,
            p_slip: DEFAULT_P_SLIP,
            p_guess: DEFAULT_P_GUESS,
        }
    }
}

impl BktParams {
    pub fn clamped(self) -> Self {
        Self {
            p_init: clamp01(self.p_init),
            p_learn: clamp01(self.p_learn),
            p_slip: clamp01(self.p_slip),
            p_guess: clamp01(self.p_guess),
        }
    }
}

/// Clamps into [0, 1]; NaN maps to 0.
pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Folds a single observation into `p_known`.
pub fn step(p_known: f64, is_correct: bool, params: &BktParams) -> f64 {
    let p = clamp01(p_known);

    let (num, den) = if is_correct {
        let num = p * (1.0 - params.p_slip);
        (num, num + (1.0 - p) * params.p_guess)
    } else {
        let num = p * params.p_slip;
        (num, num + (1.0 - p) * (1.0 - params.p_guess))
    };

    // Degenerate update: hold the prior belief.
    let posterior = if den > 0.0 && den.is_finite() {
        num / den
    } else {
        tracing::trace!(p_known = p, is_correct, "degenerate bkt denominator, holding prior");
        p
    };

    let next = posterior + (1.0 - posterior) * params.p_learn;
    if next.is_nan() {
        p
    } else {
        clamp01(next)
    }
}

/// Runs the filter from `prior` over the whole sequence and returns the final estimate.
pub fn run_from(prior: f64, observations: &[bool], params: &BktParams) -> f64 {
    observations
        .iter()
        .fold(clamp01(prior), |p, &correct| step(p, correct, params))
}

pub fn run(observations: &[bool], params: &BktParams) -> f64 {
    run_from(params.p_init, observations, params)
}

/// Belief after every observation, starting with the prior.
pub fn trace(observations: &[bool], params: &BktParams) -> Vec<f64> {
    let mut out = Vec::with_capacity(observations.len() + 1);
    let mut p = clamp01(params.p_init);
    out.push(p);
    for &correct in observations {
        p = step(p, correct, params);
        out.push(p);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_sequence() {
        let params = BktParams::default();
        let mastery = run(&[true, true, false, true], &params);
        assert!((mastery - 0.88138580395944).abs() < 1e-9);
    }

    #[test]
    fn test_single_observations() {
        let params = BktParams::default();
        assert!((run(&[true], &params) - 0.6).abs() < 1e-9);
        assert!((run(&[false], &params) - 0.17575757575757575).abs() < 1e-9);
    }

    #[test]
    fn test_empty_sequence_returns_prior() {
        let params = BktParams::default();
        assert_eq!(run(&[], &params), 0.2);
    }

    #[test]
    fn test_degenerate_denominator_holds_prior() {
        // p_known = 0 and p_guess = 0 make the correct-answer denominator zero.
        let params = BktParams {
            p_init: 0.0,
            p_learn: 0.0,
            p_slip: 0.1,
            p_guess: 0.0,
        };
        let next = step(0.0, true, &params);
        assert_eq!(next, 0.0);
        assert!(!next.is_nan());
    }

    #[test]
    fn test_nan_prior_is_clamped() {
        let params = BktParams::default();
        let next = step(f64::NAN, true, &params);
        assert!((0.0..=1.0).contains(&next));
    }

    #[test]
    fn test_trace_length_and_tail() {
        let params = BktParams::default();
        let obs = [true, false, true];
        let t = trace(&obs, &params);
        assert_eq!(t.len(), 4);
        assert_eq!(t[0], 0.2);
        assert!((t[3] - run(&obs, &params)).abs() < 1e-12);
    }

    #[test]
    fn test_run_from_continues_belief() {
        let params = BktParams::default();
        let first = run(&[true, true], &params);
        let resumed = run_from(first, &[false, true], &params);
        let full = run(&[true, true, false, true], &params);
        assert!((resumed - full).abs() < 1e-12);
    }

    #[test]
    fn test_clamped_params() {
        let params = BktParams {
            p_init: -0.5,
            p_learn: 1.5,
            p_slip: f64::NAN,
            p_guess: 0.3,
        }
        .clamped();
        assert_eq!(params.p_init, 0.0);
        assert_eq!(params.p_learn, 1.0);
        assert_eq!(params.p_slip, 0.0);
        assert_eq!(params.p_guess, 0.3);
    }
}
