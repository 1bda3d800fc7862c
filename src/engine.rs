//! Engine facade: owns the skill graph, wires the resolver, scheduler,
//! mastery estimator, and citation registry to the store and content index
//! collaborators, and serializes concurrent work per learner.
//!
//! Plans are built completely before they are published: a failing resolve,
//! schedule, or save leaves no partial plan behind.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::citation::CitationRegistry;
use crate::config::EngineConfig;
use crate::content::{ContentFilters, ContentIndex};
use crate::error::EngineError;
use crate::graph::SkillGraph;
use crate::mastery::MasteryEstimator;
use crate::resolver::PlanResolver;
use crate::scheduler::{PlanScheduler, ScheduleParams};
use crate::store::Store;
use crate::types::{
    AssessmentAttempt, Citation, CitationTarget, ContentType, LearnerId, LearningPlan,
    MasteryState, PlanStatus, Skill, SkillDifficulty, SkillEdge, SkillId, StepStatus,
};

/// Inbound plan request. Unknown fields are ignored so callers can evolve
/// their payloads independently of the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub learner_id: LearnerId,
    pub goals: Vec<SkillId>,
    /// Skills the learner asserts they already know, regardless of recorded
    /// mastery.
    #[serde(default)]
    pub known: Vec<SkillId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub hours_per_week: Option<i32>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    #[serde(default)]
    pub preferred_types: Vec<ContentType>,
    #[serde(default)]
    pub preferred_level: Option<SkillDifficulty>,
}

impl PlanRequest {
    pub fn new(learner_id: impl Into<LearnerId>, goals: Vec<SkillId>) -> Self {
        Self {
            learner_id: learner_id.into(),
            goals,
            known: vec![],
            title: None,
            objective: None,
            hours_per_week: None,
            start_date: None,
            target_date: None,
            preferred_types: vec![],
            preferred_level: None,
        }
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, EngineError> {
        serde_json::from_value(value).map_err(|e| EngineError::InvalidRequest(e.to_string()))
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.learner_id.is_empty() {
            return Err(EngineError::InvalidRequest("learnerId is required".into()));
        }
        if self.goals.is_empty() {
            return Err(EngineError::InvalidRequest("goals must not be empty".into()));
        }
        Ok(())
    }

    fn filters(&self) -> ContentFilters {
        ContentFilters {
            preferred_types: self.preferred_types.clone(),
            preferred_level: self.preferred_level,
        }
    }
}

pub struct PlanEngine {
    config: EngineConfig,
    graph: RwLock<SkillGraph>,
    store: Arc<dyn Store>,
    content: Arc<dyn ContentIndex>,
    citations: CitationRegistry,
    resolver: PlanResolver,
    scheduler: PlanScheduler,
    estimator: MasteryEstimator,
    /// One lock per learner serializes resolve + schedule + persist.
    learner_locks: parking_lot::Mutex<HashMap<LearnerId, Arc<tokio::sync::Mutex<()>>>>,
    /// One lock per (learner, skill) keeps mastery updates in arrival order.
    mastery_locks: parking_lot::Mutex<HashMap<(LearnerId, SkillId), Arc<tokio::sync::Mutex<()>>>>,
}

impl PlanEngine {
    pub fn new(config: EngineConfig, store: Arc<dyn Store>, content: Arc<dyn ContentIndex>) -> Self {
        let resolver = PlanResolver::new(config.sufficient_mastery);
        let scheduler = PlanScheduler::new(config.scheduler.clone());
        let estimator = MasteryEstimator::new(config.bkt.clone());
        Self {
            config,
            graph: RwLock::new(SkillGraph::new()),
            store,
            content,
            citations: CitationRegistry::new(),
            resolver,
            scheduler,
            estimator,
            learner_locks: parking_lot::Mutex::new(HashMap::new()),
            mastery_locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- graph management ----

    pub async fn upsert_skill(&self, skill: Skill) {
        self.graph.write().await.upsert_skill(skill);
    }

    pub async fn add_edge(&self, edge: SkillEdge) -> Result<(), EngineError> {
        self.graph.write().await.add_edge(edge)
    }

    pub async fn alternatives_for(&self, skill_id: &str) -> Vec<SkillId> {
        self.graph.read().await.alternatives_for(skill_id)
    }

    // ---- plan lifecycle ----

    /// Resolve, schedule, and publish a plan for the request's goals. The
    /// returned plan is active and fully persisted.
    pub async fn create_plan(&self, request: PlanRequest) -> Result<LearningPlan, EngineError> {
        request.validate()?;
        let lock = self.learner_lock(&request.learner_id);
        let _guard = lock.lock().await;

        let mut snapshot = self
            .with_store_retry(|| self.store.mastery_snapshot(&request.learner_id))
            .await?;
        for skill in &request.known {
            snapshot.insert(skill.clone(), 1.0);
        }

        let goals: HashSet<SkillId> = request.goals.iter().cloned().collect();
        let graph = self.graph.read().await;
        let order = self.resolver.resolve(&graph, &goals, &snapshot)?;

        let params = self.schedule_params(&request);
        let mut plan = self
            .scheduler
            .schedule(
                &graph,
                self.content.as_ref(),
                self.config.collaborator_timeout(),
                &params,
                &order,
            )
            .await?;
        drop(graph);

        plan.status = PlanStatus::Active;
        self.with_store_retry(|| self.store.save_plan(&plan)).await?;
        tracing::info!(
            plan_id = %plan.id,
            learner = %plan.learner_id,
            steps = plan.steps.len(),
            "plan created"
        );
        Ok(plan)
    }

    /// Re-plan against current mastery. Settled steps are retained verbatim;
    /// only the pending tail is recomputed and rescheduled. The plan's own
    /// skills serve as the goal set, so skills mastered since the original
    /// resolve drop out of the new tail.
    pub async fn replan(&self, plan_id: &str) -> Result<LearningPlan, EngineError> {
        let learner_id = self.load_plan(plan_id).await?.learner_id;
        let lock = self.learner_lock(&learner_id);
        let _guard = lock.lock().await;

        // Reload under the lock so step work committed in the meantime is
        // part of the retained prefix.
        let mut plan = self.load_plan(plan_id).await?;

        let snapshot = self
            .with_store_retry(|| self.store.mastery_snapshot(&plan.learner_id))
            .await?;
        let goals: HashSet<SkillId> = plan.steps.iter().map(|s| s.skill_id.clone()).collect();

        let graph = self.graph.read().await;
        let continuation = self.resolver.continuation(&graph, &plan, &goals, &snapshot)?;

        self.scheduler
            .splice(
                &graph,
                self.content.as_ref(),
                self.config.collaborator_timeout(),
                &mut plan,
                continuation.retained,
                &continuation.tail,
            )
            .await?;
        drop(graph);

        self.with_store_retry(|| self.store.save_plan(&plan)).await?;
        tracing::info!(plan_id = %plan.id, steps = plan.steps.len(), "plan recomputed");
        Ok(plan)
    }

    pub async fn get_plan(&self, plan_id: &str) -> Result<LearningPlan, EngineError> {
        self.load_plan(plan_id).await
    }

    pub async fn pause_plan(&self, plan_id: &str) -> Result<LearningPlan, EngineError> {
        self.set_plan_status(plan_id, PlanStatus::Paused).await
    }

    pub async fn resume_plan(&self, plan_id: &str) -> Result<LearningPlan, EngineError> {
        self.set_plan_status(plan_id, PlanStatus::Active).await
    }

    pub async fn archive_plan(&self, plan_id: &str) -> Result<LearningPlan, EngineError> {
        self.set_plan_status(plan_id, PlanStatus::Archived).await
    }

    // ---- step lifecycle ----

    /// Start a pending step. Every prerequisite step must already be
    /// completed or skipped.
    pub async fn start_step(&self, plan_id: &str, step_id: &str) -> Result<LearningPlan, EngineError> {
        self.mutate_plan(plan_id, |plan| {
            let missing = incomplete_prerequisites(plan, step_id)?;
            if !missing.is_empty() {
                return Err(EngineError::PrerequisitesIncomplete {
                    step: step_id.to_string(),
                    missing,
                });
            }
            let step = plan
                .step_mut(step_id)
                .ok_or_else(|| EngineError::StepNotFound(step_id.to_string()))?;
            if step.status != StepStatus::Pending {
                return Err(EngineError::InvalidStepTransition {
                    step: step_id.to_string(),
                    from: step.status,
                    to: StepStatus::InProgress,
                });
            }
            step.status = StepStatus::InProgress;
            Ok(())
        })
        .await
    }

    /// Complete a step (from pending or in-progress). Completed effort rolls
    /// up into the plan's progress; the plan itself completes once every step
    /// is terminal.
    pub async fn complete_step(&self, plan_id: &str, step_id: &str) -> Result<LearningPlan, EngineError> {
        self.mutate_plan(plan_id, |plan| {
            let missing = incomplete_prerequisites(plan, step_id)?;
            if !missing.is_empty() {
                return Err(EngineError::PrerequisitesIncomplete {
                    step: step_id.to_string(),
                    missing,
                });
            }
            let step = plan
                .step_mut(step_id)
                .ok_or_else(|| EngineError::StepNotFound(step_id.to_string()))?;
            if step.status.is_terminal() {
                return Err(EngineError::InvalidStepTransition {
                    step: step_id.to_string(),
                    from: step.status,
                    to: StepStatus::Completed,
                });
            }
            step.status = StepStatus::Completed;
            step.completed_at = Some(chrono::Utc::now());

            let completed_minutes: i64 = plan
                .steps
                .iter()
                .filter(|s| s.status == StepStatus::Completed)
                .map(|s| s.effort_min as i64)
                .sum();
            plan.completed_hours = ((completed_minutes + 59) / 60) as i32;

            if plan.steps.iter().all(|s| s.status.is_terminal()) {
                plan.status = PlanStatus::Completed;
            }
            Ok(())
        })
        .await
    }

    /// Skip a step without completing it. The prerequisite gate still
    /// applies, so steps are skipped in plan order; a skipped step then
    /// satisfies the dependency gate of its dependents.
    pub async fn skip_step(&self, plan_id: &str, step_id: &str) -> Result<LearningPlan, EngineError> {
        self.mutate_plan(plan_id, |plan| {
            let missing = incomplete_prerequisites(plan, step_id)?;
            if !missing.is_empty() {
                return Err(EngineError::PrerequisitesIncomplete {
                    step: step_id.to_string(),
                    missing,
                });
            }
            let step = plan
                .step_mut(step_id)
                .ok_or_else(|| EngineError::StepNotFound(step_id.to_string()))?;
            if step.status.is_terminal() {
                return Err(EngineError::InvalidStepTransition {
                    step: step_id.to_string(),
                    from: step.status,
                    to: StepStatus::Skipped,
                });
            }
            step.status = StepStatus::Skipped;
            if plan.steps.iter().all(|s| s.status.is_terminal()) {
                plan.status = PlanStatus::Completed;
            }
            Ok(())
        })
        .await
    }

    // ---- mastery ----

    /// Fold a completed assessment attempt into the learner's mastery for
    /// the attempt's skill. Updates for the same (learner, skill) pair are
    /// applied in arrival order.
    pub async fn record_attempt(&self, attempt: &AssessmentAttempt) -> Result<MasteryState, EngineError> {
        if !self.graph.read().await.contains(&attempt.skill_id) {
            return Err(EngineError::UnknownLearnerOrSkill {
                learner: attempt.learner_id.clone(),
                skill: attempt.skill_id.clone(),
            });
        }

        let lock = self.mastery_lock(&attempt.learner_id, &attempt.skill_id);
        let _guard = lock.lock().await;

        let prior = self
            .with_store_retry(|| self.store.load_mastery(&attempt.learner_id, &attempt.skill_id))
            .await?;
        let state = self.estimator.apply(prior, attempt)?;
        self.with_store_retry(|| self.store.save_mastery(&state)).await?;
        tracing::info!(
            learner = %state.learner_id,
            skill = %state.skill_id,
            probability = state.probability,
            attempts = state.attempt_count,
            "mastery updated"
        );
        Ok(state)
    }

    pub async fn mastery_snapshot(&self, learner_id: &str) -> Result<HashMap<SkillId, f64>, EngineError> {
        self.with_store_retry(|| self.store.mastery_snapshot(learner_id)).await
    }

    // ---- citations ----

    pub fn attach_citation(
        &self,
        target: Option<CitationTarget>,
        document_id: impl Into<String>,
        quote: impl Into<String>,
        span: (usize, usize),
        confidence: f64,
    ) -> Result<Citation, EngineError> {
        self.citations.attach(target, document_id, quote, span, confidence)
    }

    pub fn citations_for_step(&self, step_id: &str) -> Vec<Citation> {
        self.citations.for_step(step_id)
    }

    pub fn citations_for_message(&self, message_id: &str) -> Vec<Citation> {
        self.citations.for_message(message_id)
    }

    // ---- internals ----

    fn schedule_params(&self, request: &PlanRequest) -> ScheduleParams {
        let start_date = request
            .start_date
            .unwrap_or_else(|| chrono::Utc::now().date_naive());
        ScheduleParams {
            learner_id: request.learner_id.clone(),
            title: request
                .title
                .clone()
                .unwrap_or_else(|| "Learning plan".to_string()),
            objective: request.objective.clone().unwrap_or_default(),
            start_date,
            target_date: request.target_date,
            hours_per_week: request.hours_per_week,
            filters: request.filters(),
        }
    }

    async fn load_plan(&self, plan_id: &str) -> Result<LearningPlan, EngineError> {
        self.with_store_retry(|| self.store.load_plan(plan_id))
            .await?
            .ok_or_else(|| EngineError::PlanNotFound(plan_id.to_string()))
    }

    async fn set_plan_status(&self, plan_id: &str, status: PlanStatus) -> Result<LearningPlan, EngineError> {
        self.mutate_plan(plan_id, |plan| {
            plan.status = status;
            Ok(())
        })
        .await
    }

    /// Load, mutate, and persist a plan under the learner lock. The store
    /// only sees the fully mutated plan.
    async fn mutate_plan<F>(&self, plan_id: &str, mutate: F) -> Result<LearningPlan, EngineError>
    where
        F: FnOnce(&mut LearningPlan) -> Result<(), EngineError>,
    {
        let learner_id = self.load_plan(plan_id).await?.learner_id;
        let lock = self.learner_lock(&learner_id);
        let _guard = lock.lock().await;

        // Reload under the lock so the mutation sees the latest state.
        let mut plan = self.load_plan(plan_id).await?;
        mutate(&mut plan)?;
        plan.updated_at = chrono::Utc::now();
        self.with_store_retry(|| self.store.save_plan(&plan)).await?;
        Ok(plan)
    }

    /// Bounded store call with a single backed-off retry on timeout.
    async fn with_store_retry<T, F, Fut>(&self, op: F) -> Result<T, EngineError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let timeout = self.config.collaborator_timeout();
        match tokio::time::timeout(timeout, op()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("store call timed out, retrying once");
                tokio::time::sleep(self.config.retry_backoff()).await;
                match tokio::time::timeout(timeout, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(EngineError::StoreTimeout),
                }
            }
        }
    }

    fn learner_lock(&self, learner_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.learner_locks
            .lock()
            .entry(learner_id.to_string())
            .or_default()
            .clone()
    }

    fn mastery_lock(&self, learner_id: &str, skill_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.mastery_locks
            .lock()
            .entry((learner_id.to_string(), skill_id.to_string()))
            .or_default()
            .clone()
    }
}

/// Prerequisite step ids that are not yet terminal. Ids that no longer
/// resolve to a step in the plan are ignored.
fn incomplete_prerequisites(plan: &LearningPlan, step_id: &str) -> Result<Vec<String>, EngineError> {
    let step = plan
        .step(step_id)
        .ok_or_else(|| EngineError::StepNotFound(step_id.to_string()))?;
    Ok(step
        .prerequisites
        .iter()
        .filter(|prereq| {
            plan.step(prereq)
                .map(|p| !p.status.is_terminal())
                .unwrap_or(false)
        })
        .cloned()
        .collect())
}
