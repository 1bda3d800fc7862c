//! Plan scheduling: resolved skill order -> concrete plan steps with
//! content, effort, a step-level dependency DAG, and due dates.
//!
//! Due dates come from greedily packing step effort into the learner's
//! weekly capacity. With a single learner there is a single resource, so
//! this reduces to cumulative-effort partitioning into week buckets with
//! partial weeks rounded up.

use std::time::Duration;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::content::{select_candidate, ContentFilters, ContentIndex};
use crate::error::EngineError;
use crate::graph::SkillGraph;
use crate::types::{
    LearningPlan, PlanStatus, PlanStep, SkillId, StepKind, StepStatus,
};

const DEFAULT_HOURS_PER_WEEK: i32 = 5;
const DEFAULT_ASSESSMENT_EVERY: usize = 1;
const DEFAULT_ASSESSMENT_EFFORT_MIN: i32 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    pub hours_per_week: i32,
    /// Insert one assessment step after this many learning steps.
    /// 1 means one assessment per skill; 0 disables assessment steps.
    pub assessment_every: usize,
    pub assessment_effort_min: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            hours_per_week: DEFAULT_HOURS_PER_WEEK,
            assessment_every: DEFAULT_ASSESSMENT_EVERY,
            assessment_effort_min: DEFAULT_ASSESSMENT_EFFORT_MIN,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleParams {
    pub learner_id: String,
    pub title: String,
    pub objective: String,
    pub start_date: NaiveDate,
    pub target_date: Option<NaiveDate>,
    pub hours_per_week: Option<i32>,
    pub filters: ContentFilters,
}

#[derive(Debug, Clone)]
pub struct PlanScheduler {
    config: SchedulerConfig,
}

impl PlanScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Build a complete plan for a resolved skill order. The plan is
    /// returned as a draft; the caller decides when to publish it.
    pub async fn schedule(
        &self,
        graph: &SkillGraph,
        content: &dyn ContentIndex,
        lookup_timeout: Duration,
        params: &ScheduleParams,
        order: &[SkillId],
    ) -> Result<LearningPlan, EngineError> {
        let plan_id = uuid::Uuid::new_v4().to_string();
        let mut steps = self
            .build_skill_steps(&plan_id, graph, content, lookup_timeout, &params.filters, order)
            .await?;

        wire_dependencies(&mut steps, graph);
        resequence(&mut steps);
        let hours_per_week = self.capacity(params);
        assign_due_dates(&mut steps, params.start_date, hours_per_week, 0);

        let total_minutes: i64 = steps.iter().map(|s| s.effort_min as i64).sum();
        let last_due = steps.iter().filter_map(|s| s.due_at).max();
        let now = chrono::Utc::now();

        Ok(LearningPlan {
            id: plan_id,
            learner_id: params.learner_id.clone(),
            title: params.title.clone(),
            objective: params.objective.clone(),
            status: PlanStatus::Draft,
            start_date: params.start_date,
            target_date: params
                .target_date
                .or(last_due)
                .unwrap_or(params.start_date),
            total_hours: minutes_to_hours(total_minutes),
            completed_hours: 0,
            hours_per_week,
            preferred_types: params.filters.preferred_types.clone(),
            preferred_level: params.filters.preferred_level,
            steps,
            created_at: now,
            updated_at: now,
        })
    }

    /// Splice a freshly resolved tail after the settled prefix of an
    /// existing plan. Retained steps keep their ids, relative order, status,
    /// and due dates; only the new tail is scheduled, with its capacity
    /// packing continuing from the effort already planned. Weekly capacity
    /// and content preferences come from the plan itself, as captured at
    /// creation.
    pub async fn splice(
        &self,
        graph: &SkillGraph,
        content: &dyn ContentIndex,
        lookup_timeout: Duration,
        plan: &mut LearningPlan,
        retained: Vec<PlanStep>,
        tail: &[SkillId],
    ) -> Result<(), EngineError> {
        let filters = ContentFilters {
            preferred_types: plan.preferred_types.clone(),
            preferred_level: plan.preferred_level,
        };
        let consumed_minutes: i64 = retained.iter().map(|s| s.effort_min as i64).sum();
        let tail_steps = self
            .build_skill_steps(&plan.id, graph, content, lookup_timeout, &filters, tail)
            .await?;

        let mut steps = retained;
        steps.extend(tail_steps);
        wire_dependencies(&mut steps, graph);
        resequence(&mut steps);
        let hours_per_week = plan.hours_per_week.max(1);
        assign_due_dates(&mut steps, plan.start_date, hours_per_week, consumed_minutes);

        let total_minutes: i64 = steps.iter().map(|s| s.effort_min as i64).sum();
        plan.total_hours = minutes_to_hours(total_minutes);
        if let Some(last_due) = steps.iter().filter_map(|s| s.due_at).max() {
            plan.target_date = plan.target_date.max(last_due);
        }
        plan.steps = steps;
        plan.updated_at = chrono::Utc::now();
        Ok(())
    }

    fn capacity(&self, params: &ScheduleParams) -> i32 {
        params
            .hours_per_week
            .unwrap_or(self.config.hours_per_week)
            .max(1)
    }

    async fn build_skill_steps(
        &self,
        plan_id: &str,
        graph: &SkillGraph,
        content: &dyn ContentIndex,
        lookup_timeout: Duration,
        filters: &ContentFilters,
        order: &[SkillId],
    ) -> Result<Vec<PlanStep>, EngineError> {
        let mut steps = Vec::with_capacity(order.len() * 2);
        let mut since_assessment = 0usize;

        for skill_id in order {
            let skill = graph
                .skill(skill_id)
                .ok_or_else(|| EngineError::UnknownSkill(skill_id.clone()))?;

            let selected = match self
                .lookup_content(content, lookup_timeout, skill_id, filters)
                .await
            {
                Ok(candidates) => select_candidate(&candidates, filters),
                Err(err) => {
                    tracing::warn!(skill = %skill_id, error = %err, "content lookup failed, degrading to missing content");
                    None
                }
            };
            if selected.is_none() {
                tracing::warn!(skill = %skill_id, "no content candidate, flagging step for manual assignment");
            }

            let effort_min = selected
                .as_ref()
                .map(|c| c.duration_min)
                .filter(|d| *d > 0)
                .unwrap_or(skill.estimated_hours.max(1) * 60);

            steps.push(PlanStep {
                id: uuid::Uuid::new_v4().to_string(),
                plan_id: plan_id.to_string(),
                skill_id: skill_id.clone(),
                content_item_id: selected.as_ref().map(|c| c.id.clone()),
                kind: StepKind::Learning,
                title: format!("Learn {}", skill.label),
                effort_min,
                sequence: 0,
                status: StepStatus::Pending,
                due_at: None,
                completed_at: None,
                prerequisites: vec![],
                unlocks: vec![],
                needs_content: selected.is_none(),
            });

            since_assessment += 1;
            if self.config.assessment_every > 0 && since_assessment >= self.config.assessment_every {
                since_assessment = 0;
                steps.push(PlanStep {
                    id: uuid::Uuid::new_v4().to_string(),
                    plan_id: plan_id.to_string(),
                    skill_id: skill_id.clone(),
                    content_item_id: None,
                    kind: StepKind::Assessment,
                    title: format!("Assess {}", skill.label),
                    effort_min: self.config.assessment_effort_min,
                    sequence: 0,
                    status: StepStatus::Pending,
                    due_at: None,
                    completed_at: None,
                    prerequisites: vec![],
                    unlocks: vec![],
                    needs_content: false,
                });
            }
        }
        Ok(steps)
    }

    /// Bounded-latency lookup. A timed-out call surfaces as
    /// `ContentIndexTimeout`; the caller degrades it to the missing-content
    /// path instead of failing the plan.
    async fn lookup_content(
        &self,
        content: &dyn ContentIndex,
        lookup_timeout: Duration,
        skill_id: &str,
        filters: &ContentFilters,
    ) -> Result<Vec<crate::types::ContentItem>, EngineError> {
        match tokio::time::timeout(lookup_timeout, content.find_candidates(skill_id, filters)).await
        {
            Ok(result) => result,
            Err(_) => Err(EngineError::ContentIndexTimeout),
        }
    }
}

/// Derive the step-level DAG from the skill-level DAG: a learning step
/// requires the gate step of each of its skill's prerequisite skills, an
/// assessment step requires its own skill's learning step. The gate of a
/// skill is its last step in plan order (the assessment when present).
/// Prerequisite lists of settled steps are left untouched; `unlocks` is the
/// rebuilt inverse over the whole plan.
fn wire_dependencies(steps: &mut [PlanStep], graph: &SkillGraph) {
    use std::collections::HashMap;

    let mut gate_of_skill: HashMap<SkillId, String> = HashMap::new();
    let mut learning_of_skill: HashMap<SkillId, String> = HashMap::new();
    for step in steps.iter() {
        gate_of_skill.insert(step.skill_id.clone(), step.id.clone());
        if step.kind == StepKind::Learning {
            learning_of_skill.insert(step.skill_id.clone(), step.id.clone());
        }
    }

    for step in steps.iter_mut() {
        if step.status != StepStatus::Pending {
            continue;
        }
        let mut prereqs: Vec<String> = Vec::new();
        match step.kind {
            StepKind::Assessment => {
                if let Some(learning) = learning_of_skill.get(&step.skill_id) {
                    if *learning != step.id {
                        prereqs.push(learning.clone());
                    }
                }
            }
            _ => {
                for prereq_skill in graph.prerequisites_of(&step.skill_id) {
                    if let Some(gate) = gate_of_skill.get(prereq_skill) {
                        prereqs.push(gate.clone());
                    }
                }
            }
        }
        prereqs.sort();
        prereqs.dedup();
        step.prerequisites = prereqs;
    }

    let mut unlocks: HashMap<String, Vec<String>> = HashMap::new();
    for step in steps.iter() {
        for prereq in &step.prerequisites {
            unlocks.entry(prereq.clone()).or_default().push(step.id.clone());
        }
    }
    for step in steps.iter_mut() {
        step.unlocks = unlocks.remove(&step.id).unwrap_or_default();
    }
}

fn minutes_to_hours(minutes: i64) -> i32 {
    ((minutes + 59) / 60) as i32
}

/// Dense, strictly increasing sequence indices in current order.
fn resequence(steps: &mut [PlanStep]) {
    for (index, step) in steps.iter_mut().enumerate() {
        step.sequence = index as i32;
    }
}

/// Greedy weekly packing. `consumed_minutes` seeds the cumulative effort so
/// a spliced tail continues where the settled prefix left off. Only pending
/// steps are re-dated; a step is never due before any of its prerequisites.
fn assign_due_dates(
    steps: &mut [PlanStep],
    start_date: NaiveDate,
    hours_per_week: i32,
    consumed_minutes: i64,
) {
    use std::collections::HashMap;

    let capacity = (hours_per_week as i64 * 60).max(1);
    let mut cumulative = consumed_minutes;
    let mut due_by_id: HashMap<String, NaiveDate> = steps
        .iter()
        .filter(|s| s.status != StepStatus::Pending)
        .filter_map(|s| s.due_at.map(|d| (s.id.clone(), d)))
        .collect();

    for step in steps.iter_mut() {
        if step.status != StepStatus::Pending {
            continue;
        }
        cumulative += step.effort_min as i64;
        // Partial weeks round up.
        let week = (cumulative + capacity - 1) / capacity;
        let mut due = start_date
            .checked_add_days(Days::new((week.max(1) as u64) * 7 - 1))
            .unwrap_or(start_date);
        for prereq in &step.prerequisites {
            if let Some(prereq_due) = due_by_id.get(prereq) {
                due = due.max(*prereq_due);
            }
        }
        step.due_at = Some(due);
        due_by_id.insert(step.id.clone(), due);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::StaticContentIndex;
    use crate::types::{ContentItem, ContentType, Skill, SkillDifficulty};

    fn skill(id: &str, hours: i32, prereqs: &[&str]) -> Skill {
        Skill {
            id: id.to_string(),
            slug: id.to_string(),
            label: id.to_string(),
            domain: "test".to_string(),
            tags: vec![],
            difficulty: SkillDifficulty::Beginner,
            estimated_hours: hours,
            prerequisites: prereqs.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn chain() -> SkillGraph {
        let mut graph = SkillGraph::new();
        graph.upsert_skill(skill("algebra", 2, &[]));
        graph.upsert_skill(skill("statistics", 3, &["algebra"]));
        graph.upsert_skill(skill("data-analysis", 4, &["statistics"]));
        graph
    }

    fn item(id: &str, duration: i32) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            title: id.to_string(),
            content_type: ContentType::Reading,
            level: SkillDifficulty::Beginner,
            duration_min: duration,
            cost: 0.0,
            rank: 0.8,
            is_active: true,
        }
    }

    fn params(start: NaiveDate) -> ScheduleParams {
        ScheduleParams {
            learner_id: "learner-1".to_string(),
            title: "Data analysis path".to_string(),
            objective: "learn data analysis".to_string(),
            start_date: start,
            target_date: None,
            hours_per_week: Some(5),
            filters: ContentFilters::default(),
        }
    }

    fn order(ids: &[&str]) -> Vec<SkillId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_schedule_emits_learning_and_assessment_steps() {
        let graph = chain();
        let mut index = StaticContentIndex::new();
        index.insert("algebra", vec![item("c-algebra", 90)]);
        index.insert("statistics", vec![item("c-stats", 120)]);

        let start = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let scheduler = PlanScheduler::new(SchedulerConfig::default());
        let plan = scheduler
            .schedule(
                &graph,
                &index,
                Duration::from_millis(100),
                &params(start),
                &order(&["algebra", "statistics", "data-analysis"]),
            )
            .await
            .unwrap();

        assert_eq!(plan.steps.len(), 6, "3 learning + 3 assessment steps");
        let kinds: Vec<StepKind> = plan.steps.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StepKind::Learning,
                StepKind::Assessment,
                StepKind::Learning,
                StepKind::Assessment,
                StepKind::Learning,
                StepKind::Assessment,
            ]
        );

        // Dense strictly increasing sequence.
        let sequences: Vec<i32> = plan.steps.iter().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4, 5]);

        // Content durations override skill estimates.
        assert_eq!(plan.steps[0].effort_min, 90);
        assert_eq!(plan.steps[0].content_item_id.as_deref(), Some("c-algebra"));
        assert!(!plan.steps[0].needs_content);
    }

    #[tokio::test]
    async fn test_missing_content_is_soft() {
        let graph = chain();
        let index = StaticContentIndex::new(); // empty for every skill

        let start = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let scheduler = PlanScheduler::new(SchedulerConfig::default());
        let plan = scheduler
            .schedule(
                &graph,
                &index,
                Duration::from_millis(100),
                &params(start),
                &order(&["algebra"]),
            )
            .await
            .unwrap();

        let learning = &plan.steps[0];
        assert!(learning.content_item_id.is_none());
        assert!(learning.needs_content, "missing content must be flagged");
        // Falls back to the skill's estimated hours.
        assert_eq!(learning.effort_min, 2 * 60);
    }

    #[tokio::test]
    async fn test_due_dates_pack_weekly_capacity() {
        let graph = chain();
        let index = StaticContentIndex::new();
        let start = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let scheduler = PlanScheduler::new(SchedulerConfig {
            assessment_every: 0,
            ..Default::default()
        });

        // 2h + 3h + 4h at 5h/week: weeks 1, 1, 2.
        let plan = scheduler
            .schedule(
                &graph,
                &index,
                Duration::from_millis(100),
                &params(start),
                &order(&["algebra", "statistics", "data-analysis"]),
            )
            .await
            .unwrap();

        let due: Vec<NaiveDate> = plan.steps.iter().map(|s| s.due_at.unwrap()).collect();
        assert_eq!(due[0], start.checked_add_days(Days::new(6)).unwrap());
        assert_eq!(due[1], start.checked_add_days(Days::new(6)).unwrap());
        assert_eq!(due[2], start.checked_add_days(Days::new(13)).unwrap());
        assert!(due[0] <= due[1] && due[1] <= due[2]);
        assert_eq!(plan.total_hours, 9);
        assert_eq!(plan.target_date, due[2]);
    }

    #[tokio::test]
    async fn test_step_dag_follows_skill_dag() {
        let graph = chain();
        let index = StaticContentIndex::new();
        let start = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let scheduler = PlanScheduler::new(SchedulerConfig::default());
        let plan = scheduler
            .schedule(
                &graph,
                &index,
                Duration::from_millis(100),
                &params(start),
                &order(&["algebra", "statistics"]),
            )
            .await
            .unwrap();

        let learn_algebra = &plan.steps[0];
        let assess_algebra = &plan.steps[1];
        let learn_stats = &plan.steps[2];
        let assess_stats = &plan.steps[3];

        assert!(learn_algebra.prerequisites.is_empty());
        assert_eq!(assess_algebra.prerequisites, vec![learn_algebra.id.clone()]);
        // Learning statistics is gated on the algebra assessment.
        assert_eq!(learn_stats.prerequisites, vec![assess_algebra.id.clone()]);
        assert_eq!(assess_stats.prerequisites, vec![learn_stats.id.clone()]);

        assert!(learn_algebra.unlocks.contains(&assess_algebra.id));
        assert!(assess_algebra.unlocks.contains(&learn_stats.id));
    }

    #[tokio::test]
    async fn test_splice_preserves_retained_and_continues_packing() {
        let graph = chain();
        let index = StaticContentIndex::new();
        let start = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let scheduler = PlanScheduler::new(SchedulerConfig {
            assessment_every: 0,
            ..Default::default()
        });
        let p = params(start);

        let mut plan = scheduler
            .schedule(
                &graph,
                &index,
                Duration::from_millis(100),
                &p,
                &order(&["algebra", "statistics", "data-analysis"]),
            )
            .await
            .unwrap();

        plan.steps[0].status = StepStatus::Completed;
        let retained = vec![plan.steps[0].clone()];
        let retained_id = retained[0].id.clone();
        let retained_due = retained[0].due_at;

        scheduler
            .splice(
                &graph,
                &index,
                Duration::from_millis(100),
                &mut plan,
                retained,
                &order(&["statistics", "data-analysis"]),
            )
            .await
            .unwrap();

        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.steps[0].id, retained_id, "settled step keeps its id");
        assert_eq!(plan.steps[0].due_at, retained_due, "settled step keeps its due date");
        assert_eq!(
            plan.steps.iter().map(|s| s.sequence).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        // Tail packing continues after the retained 2h: 2+3=5h -> week 1,
        // 5+4=9h -> week 2.
        assert_eq!(
            plan.steps[1].due_at.unwrap(),
            start.checked_add_days(Days::new(6)).unwrap()
        );
        assert_eq!(
            plan.steps[2].due_at.unwrap(),
            start.checked_add_days(Days::new(13)).unwrap()
        );
    }

    #[tokio::test]
    async fn test_splice_packs_at_the_plans_own_capacity() {
        let graph = chain();
        let index = StaticContentIndex::new();
        let start = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let scheduler = PlanScheduler::new(SchedulerConfig {
            assessment_every: 0,
            ..Default::default()
        });
        let mut p = params(start);
        p.hours_per_week = Some(20);

        let mut plan = scheduler
            .schedule(
                &graph,
                &index,
                Duration::from_millis(100),
                &p,
                &order(&["algebra", "statistics", "data-analysis"]),
            )
            .await
            .unwrap();
        assert_eq!(plan.hours_per_week, 20);
        let original_last_due = plan.steps.last().unwrap().due_at.unwrap();

        plan.steps[0].status = StepStatus::Completed;
        let retained = vec![plan.steps[0].clone()];
        scheduler
            .splice(
                &graph,
                &index,
                Duration::from_millis(100),
                &mut plan,
                retained,
                &order(&["statistics", "data-analysis"]),
            )
            .await
            .unwrap();

        // 2+3+4 hours fit one 20-hour week before and after the splice.
        assert_eq!(plan.hours_per_week, 20);
        for step in &plan.steps {
            assert_eq!(step.due_at.unwrap(), original_last_due);
        }
    }
}
