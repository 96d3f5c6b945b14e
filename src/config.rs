use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use serde::Serialize;

use crate::services::bkt::{clamp01, BktParams};
use crate::types::AssessmentPhase;

const DEFAULT_GENERAL_THRESHOLD: f64 = 0.7;
const DEFAULT_POST_THRESHOLD: f64 = 0.8;
const DEFAULT_COMPLETION_SCORE_THRESHOLD: f64 = 0.75;
const DEFAULT_RECOMMENDATION_LIMIT: usize = 5;
const DEFAULT_IMPROVEMENT_MIN_DELTA: f64 = 0.1;
const DEFAULT_MAX_WRITE_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub database_path: PathBuf,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let port = env_parse::<u16>("PORT").unwrap_or(3000);

        let host = env_parse::<IpAddr>("HOST").unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let database_path = std::env::var("DATABASE_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path);

        Self {
            host,
            port,
            log_level,
            database_path,
            engine: EngineConfig::from_env(),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("skill-mastery-engine")
        .join("mastery.db")
}

/// Mastery cut-offs. Pre-assessment and general updates use the lower one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryThresholds {
    pub general: f64,
    pub post_assessment: f64,
}

impl MasteryThresholds {
    pub fn for_phase(&self, phase: AssessmentPhase) -> f64 {
        match phase {
            AssessmentPhase::Post => self.post_assessment,
            AssessmentPhase::Pre | AssessmentPhase::None => self.general,
        }
    }
}

impl Default for MasteryThresholds {
    fn default() -> Self {
        Self {
            general: DEFAULT_GENERAL_THRESHOLD,
            post_assessment: DEFAULT_POST_THRESHOLD,
        }
    }
}

/// Process-wide calibration, built once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub bkt: BktParams,
    pub thresholds: MasteryThresholds,
    pub completion_score_threshold: f64,
    pub min_responses_per_skill: usize,
    pub recommendation_limit: usize,
    pub improvement_min_delta: f64,
    pub carry_prior: bool,
    pub max_write_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bkt: BktParams::default(),
            thresholds: MasteryThresholds::default(),
            completion_score_threshold: DEFAULT_COMPLETION_SCORE_THRESHOLD,
            min_responses_per_skill: 1,
            recommendation_limit: DEFAULT_RECOMMENDATION_LIMIT,
            improvement_min_delta: DEFAULT_IMPROVEMENT_MIN_DELTA,
            carry_prior: false,
            max_write_retries: DEFAULT_MAX_WRITE_RETRIES,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bkt = BktParams {
            p_init: env_parse("BKT_P_INIT").unwrap_or(defaults.bkt.p_init),
            p_learn: env_parse("BKT_P_LEARN").unwrap_or(defaults.bkt.p_learn),
            p_slip: env_parse("BKT_P_SLIP").unwrap_or(defaults.bkt.p_slip),
            p_guess: env_parse("BKT_P_GUESS").unwrap_or(defaults.bkt.p_guess),
        }
        .clamped();

        let thresholds = MasteryThresholds {
            general: env_parse("MASTERY_THRESHOLD")
                .map(clamp01)
                .unwrap_or(defaults.thresholds.general),
            post_assessment: env_parse("POST_MASTERY_THRESHOLD")
                .map(clamp01)
                .unwrap_or(defaults.thresholds.post_assessment),
        };

        Self {
            bkt,
            thresholds,
            completion_score_threshold: env_parse("COMPLETION_SCORE_THRESHOLD")
                .map(clamp01)
                .unwrap_or(defaults.completion_score_threshold),
            min_responses_per_skill: env_parse("MIN_RESPONSES_PER_SKILL")
                .unwrap_or(defaults.min_responses_per_skill),
            recommendation_limit: env_parse::<usize>("RECOMMENDATION_LIMIT")
                .map(|v| v.max(1))
                .unwrap_or(defaults.recommendation_limit),
            improvement_min_delta: env_parse("IMPROVEMENT_MIN_DELTA")
                .unwrap_or(defaults.improvement_min_delta),
            carry_prior: env_bool("BKT_CARRY_PRIOR").unwrap_or(defaults.carry_prior),
            max_write_retries: env_parse("MASTERY_WRITE_RETRIES")
                .unwrap_or(defaults.max_write_retries),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| {
        let v = v.trim().to_ascii_lowercase();
        v == "true" || v == "1"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_by_phase() {
        let thresholds = MasteryThresholds::default();
        assert_eq!(thresholds.for_phase(AssessmentPhase::Pre), 0.7);
        assert_eq!(thresholds.for_phase(AssessmentPhase::None), 0.7);
        assert_eq!(thresholds.for_phase(AssessmentPhase::Post), 0.8);
    }

    #[test]
    fn test_engine_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.bkt.p_init, 0.2);
        assert_eq!(config.bkt.p_learn, 0.15);
        assert_eq!(config.bkt.p_slip, 0.1);
        assert_eq!(config.bkt.p_guess, 0.2);
        assert_eq!(config.min_responses_per_skill, 1);
        assert_eq!(config.recommendation_limit, 5);
        assert!(!config.carry_prior);
    }
}
