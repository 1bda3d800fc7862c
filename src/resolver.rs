//! Plan resolution: goal set + mastery snapshot -> ordered skill sequence.
//!
//! Thin orchestration over the skill graph. Skills the learner already
//! masters (at or above the sufficient-mastery threshold) count as known and
//! drop out of the order. Re-planning recomputes only the pending tail of an
//! existing plan; settled steps are never reordered or removed.

use std::collections::{HashMap, HashSet};

use crate::error::EngineError;
use crate::graph::SkillGraph;
use crate::types::{LearningPlan, PlanStep, SkillId, StepStatus};

#[derive(Debug, Clone)]
pub struct PlanResolver {
    sufficient_mastery: f64,
}

/// Result of a re-plan: the immutable settled prefix plus the freshly
/// resolved skill tail to schedule after it.
#[derive(Debug)]
pub struct Continuation {
    pub retained: Vec<PlanStep>,
    pub tail: Vec<SkillId>,
}

impl PlanResolver {
    pub fn new(sufficient_mastery: f64) -> Self {
        Self {
            sufficient_mastery: sufficient_mastery.clamp(0.0, 1.0),
        }
    }

    /// Skills whose current mastery already clears the threshold.
    pub fn known_skills(&self, snapshot: &HashMap<SkillId, f64>) -> HashSet<SkillId> {
        snapshot
            .iter()
            .filter(|(_, p)| **p >= self.sufficient_mastery)
            .map(|(skill, _)| skill.clone())
            .collect()
    }

    pub fn resolve(
        &self,
        graph: &SkillGraph,
        goals: &HashSet<SkillId>,
        snapshot: &HashMap<SkillId, f64>,
    ) -> Result<Vec<SkillId>, EngineError> {
        let known = self.known_skills(snapshot);
        graph.resolve_order(goals, &known)
    }

    /// Stable continuation for an existing plan. Steps that are already
    /// in progress, completed, or skipped are retained verbatim in their
    /// original order; skills covered by retained steps count as satisfied
    /// so the recomputed tail never re-introduces them.
    pub fn continuation(
        &self,
        graph: &SkillGraph,
        plan: &LearningPlan,
        goals: &HashSet<SkillId>,
        snapshot: &HashMap<SkillId, f64>,
    ) -> Result<Continuation, EngineError> {
        let mut retained: Vec<PlanStep> = plan
            .steps
            .iter()
            .filter(|s| s.status != StepStatus::Pending)
            .cloned()
            .collect();
        retained.sort_by_key(|s| s.sequence);

        let mut satisfied = self.known_skills(snapshot);
        for step in &retained {
            satisfied.insert(step.skill_id.clone());
        }

        let tail = graph.resolve_order(goals, &satisfied)?;
        Ok(Continuation { retained, tail })
    }
}
