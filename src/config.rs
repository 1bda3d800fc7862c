use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::mastery::BktParams;
use crate::scheduler::SchedulerConfig;

const DEFAULT_SUFFICIENT_MASTERY: f64 = 0.8;
const DEFAULT_COLLABORATOR_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub bkt: BktParams,
    pub scheduler: SchedulerConfig,
    /// Mastery probability at or above which a skill counts as already known
    /// and is filtered out of resolved plans.
    pub sufficient_mastery: f64,
    /// Upper bound for a single store or content-index call.
    pub collaborator_timeout_ms: u64,
    /// Pause before the single retry of a timed-out store call.
    pub retry_backoff_ms: u64,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bkt: BktParams::default(),
            scheduler: SchedulerConfig::default(),
            sufficient_mastery: DEFAULT_SUFFICIENT_MASTERY,
            collaborator_timeout_ms: DEFAULT_COLLABORATOR_TIMEOUT_MS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_f64("ENGINE_SUFFICIENT_MASTERY") {
            config.sufficient_mastery = v.clamp(0.0, 1.0);
        }
        if let Some(v) = env_f64("ENGINE_BKT_GUESS") {
            config.bkt.guess = v.clamp(0.0, 1.0);
        }
        if let Some(v) = env_f64("ENGINE_BKT_SLIP") {
            config.bkt.slip = v.clamp(0.0, 1.0);
        }
        if let Some(v) = env_f64("ENGINE_BKT_TRANSFER") {
            config.bkt.transfer = v.clamp(0.0, 1.0);
        }
        if let Some(v) = env_f64("ENGINE_PASSING_RATIO") {
            config.bkt.passing_ratio = v.clamp(0.0, 1.0);
        }
        if let Some(v) = env_i32("ENGINE_HOURS_PER_WEEK") {
            config.scheduler.hours_per_week = v.clamp(1, 80);
        }
        if let Some(v) = env_i32("ENGINE_ASSESSMENT_EVERY") {
            config.scheduler.assessment_every = v.max(0) as usize;
        }
        if let Some(v) = env_u64("ENGINE_COLLABORATOR_TIMEOUT_MS") {
            config.collaborator_timeout_ms = v.max(1);
        }
        if let Some(v) = env_u64("ENGINE_RETRY_BACKOFF_MS") {
            config.retry_backoff_ms = v;
        }
        config.log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        config
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.parse::<f64>().ok())
}

fn env_i32(key: &str) -> Option<i32> {
    std::env::var(key).ok().and_then(|v| v.parse::<i32>().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse::<u64>().ok())
}
