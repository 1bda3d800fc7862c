use thiserror::Error;

use crate::types::{SkillId, StepStatus};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("prerequisite cycle detected among skills: {remaining:?}")]
    CycleDetected { remaining: Vec<SkillId> },
    #[error("unknown skill: {0}")]
    UnknownSkill(SkillId),
    #[error("unknown learner/skill pair: {learner}/{skill}")]
    UnknownLearnerOrSkill { learner: String, skill: String },
    #[error("invalid citation span [{start}, {end})")]
    InvalidSpan { start: usize, end: usize },
    #[error("attempt {0} has not been completed")]
    AttemptNotCompleted(String),
    #[error("plan not found: {0}")]
    PlanNotFound(String),
    #[error("step not found: {0}")]
    StepNotFound(String),
    #[error("step {step} cannot transition from {from:?} to {to:?}")]
    InvalidStepTransition {
        step: String,
        from: StepStatus,
        to: StepStatus,
    },
    #[error("step {step} has incomplete prerequisites: {missing:?}")]
    PrerequisitesIncomplete { step: String, missing: Vec<String> },
    #[error("store operation timed out")]
    StoreTimeout,
    #[error("content index lookup timed out")]
    ContentIndexTimeout,
    #[error("store error: {0}")]
    Store(String),
    #[error("invalid plan request: {0}")]
    InvalidRequest(String),
}
