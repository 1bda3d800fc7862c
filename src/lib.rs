//! Adaptive learning plan engine.
//!
//! Resolves a learner's goal skills against a prerequisite graph, schedules
//! the resulting order into concrete steps with content and due dates, folds
//! assessment evidence into per-skill mastery estimates, and tracks the
//! provenance of generated steps through citations.

pub mod citation;
pub mod config;
pub mod content;
pub mod engine;
pub mod error;
pub mod graph;
pub mod logging;
pub mod mastery;
pub mod resolver;
pub mod scheduler;
pub mod store;
pub mod types;

pub use citation::{filter_by_confidence, CitationRegistry};
pub use config::EngineConfig;
pub use content::{select_candidate, ContentFilters, ContentIndex, StaticContentIndex};
pub use engine::{PlanEngine, PlanRequest};
pub use error::EngineError;
pub use graph::SkillGraph;
pub use logging::{init_tracing, FileLogGuard};
pub use mastery::{bkt_posterior, BktParams, MasteryEstimator};
pub use resolver::{Continuation, PlanResolver};
pub use scheduler::{PlanScheduler, ScheduleParams, SchedulerConfig};
pub use store::{MemoryStore, Store};
pub use types::{
    AnswerResult, AssessmentAttempt, AttemptStatus, Citation, CitationTarget, ContentItem,
    ContentType, LearnerId, LearningPlan, MasteryState, PlanStatus, PlanStep, RelationKind, Skill,
    SkillDifficulty, SkillEdge, SkillId, StepId, StepKind, StepStatus,
};
