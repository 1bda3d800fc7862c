//! Store collaborator contract.
//!
//! The engine reads and writes plans and mastery states exclusively through
//! this trait. A plan and its steps persist as one unit: `save_plan` either
//! commits everything or fails entirely, which is what lets the engine build
//! a full candidate plan and publish it atomically.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::EngineError;
use crate::types::{LearnerId, LearningPlan, MasteryState, SkillId};

#[async_trait]
pub trait Store: Send + Sync {
    async fn load_plan(&self, plan_id: &str) -> Result<Option<LearningPlan>, EngineError>;

    /// Atomic upsert of the plan together with all of its steps.
    async fn save_plan(&self, plan: &LearningPlan) -> Result<(), EngineError>;

    async fn load_mastery(
        &self,
        learner_id: &str,
        skill_id: &str,
    ) -> Result<Option<MasteryState>, EngineError>;

    async fn save_mastery(&self, state: &MasteryState) -> Result<(), EngineError>;

    /// All mastery probabilities for one learner, keyed by skill.
    async fn mastery_snapshot(
        &self,
        learner_id: &str,
    ) -> Result<HashMap<SkillId, f64>, EngineError>;
}

/// In-memory store used in tests and by embedders without a database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    plans: RwLock<HashMap<String, LearningPlan>>,
    mastery: RwLock<HashMap<(LearnerId, SkillId), MasteryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan_count(&self) -> usize {
        self.plans.read().len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_plan(&self, plan_id: &str) -> Result<Option<LearningPlan>, EngineError> {
        Ok(self.plans.read().get(plan_id).cloned())
    }

    async fn save_plan(&self, plan: &LearningPlan) -> Result<(), EngineError> {
        self.plans.write().insert(plan.id.clone(), plan.clone());
        Ok(())
    }

    async fn load_mastery(
        &self,
        learner_id: &str,
        skill_id: &str,
    ) -> Result<Option<MasteryState>, EngineError> {
        let key = (learner_id.to_string(), skill_id.to_string());
        Ok(self.mastery.read().get(&key).cloned())
    }

    async fn save_mastery(&self, state: &MasteryState) -> Result<(), EngineError> {
        let key = (state.learner_id.clone(), state.skill_id.clone());
        self.mastery.write().insert(key, state.clone());
        Ok(())
    }

    async fn mastery_snapshot(
        &self,
        learner_id: &str,
    ) -> Result<HashMap<SkillId, f64>, EngineError> {
        Ok(self
            .mastery
            .read()
            .iter()
            .filter(|((learner, _), _)| learner == learner_id)
            .map(|((_, skill), state)| (skill.clone(), state.probability))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mastery_snapshot_scoped_to_learner() {
        let store = MemoryStore::new();
        let mut a = MasteryState::new("learner-a", "algebra");
        a.probability = 0.4;
        let mut b = MasteryState::new("learner-b", "algebra");
        b.probability = 0.9;
        store.save_mastery(&a).await.unwrap();
        store.save_mastery(&b).await.unwrap();

        let snapshot = store.mastery_snapshot("learner-a").await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!((snapshot["algebra"] - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_plan_round_trip() {
        let store = MemoryStore::new();
        assert!(store.load_plan("missing").await.unwrap().is_none());
    }
}
