use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type SkillId = String;
pub type StepId = String;
pub type LearnerId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillDifficulty {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: SkillId,
    pub slug: String,
    pub label: String,
    pub domain: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub difficulty: SkillDifficulty,
    pub estimated_hours: i32,
    /// Prerequisite skill ids declared on the skill itself. Merged with
    /// explicit prerequisite edges when the graph resolves order.
    #[serde(default)]
    pub prerequisites: Vec<SkillId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Prerequisite,
    Related,
    Alternative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillEdge {
    pub src: SkillId,
    pub dst: SkillId,
    pub relation: RelationKind,
    pub weight: f64,
}

impl SkillEdge {
    pub fn new(src: impl Into<SkillId>, dst: impl Into<SkillId>, relation: RelationKind, weight: f64) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            relation,
            weight: weight.max(0.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryState {
    pub learner_id: LearnerId,
    pub skill_id: SkillId,
    pub probability: f64,
    pub attempt_count: i32,
    pub updated_at: DateTime<Utc>,
}

impl MasteryState {
    pub fn new(learner_id: impl Into<LearnerId>, skill_id: impl Into<SkillId>) -> Self {
        Self {
            learner_id: learner_id.into(),
            skill_id: skill_id.into(),
            probability: 0.0,
            attempt_count: 0,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Learning,
    Assessment,
    Project,
    Review,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    pub id: StepId,
    pub plan_id: String,
    pub skill_id: SkillId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_item_id: Option<String>,
    pub kind: StepKind,
    pub title: String,
    pub effort_min: i32,
    pub sequence: i32,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_at: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub prerequisites: Vec<StepId>,
    #[serde(default)]
    pub unlocks: Vec<StepId>,
    /// Set when no content candidate was available at scheduling time. The
    /// step still exists and can be assigned content manually later.
    #[serde(default)]
    pub needs_content: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPlan {
    pub id: String,
    pub learner_id: LearnerId,
    pub title: String,
    pub objective: String,
    pub status: PlanStatus,
    pub start_date: NaiveDate,
    pub target_date: NaiveDate,
    pub total_hours: i32,
    pub completed_hours: i32,
    /// Weekly effort capacity the plan was scheduled against. Reused when
    /// the pending tail is rescheduled.
    #[serde(default = "default_hours_per_week")]
    pub hours_per_week: i32,
    /// Content preferences captured at creation, reused on re-planning.
    #[serde(default)]
    pub preferred_types: Vec<ContentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_level: Option<SkillDifficulty>,
    pub steps: Vec<PlanStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_hours_per_week() -> i32 {
    5
}

impl LearningPlan {
    pub fn progress_percentage(&self) -> f64 {
        if self.total_hours == 0 {
            return 0.0;
        }
        (self.completed_hours as f64 / self.total_hours as f64) * 100.0
    }

    pub fn step(&self, step_id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut PlanStep> {
        self.steps.iter_mut().find(|s| s.id == step_id)
    }

    /// Last step that is no longer pending, by sequence. Everything after it
    /// is the recomputable tail during re-planning.
    pub fn last_settled_sequence(&self) -> Option<i32> {
        self.steps
            .iter()
            .filter(|s| s.status != StepStatus::Pending)
            .map(|s| s.sequence)
            .max()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    pub question_id: String,
    pub is_correct: bool,
    pub points: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentAttempt {
    pub id: String,
    pub assessment_id: String,
    pub learner_id: LearnerId,
    pub skill_id: SkillId,
    pub status: AttemptStatus,
    /// Percentage score in [0, 100], derived from answers on completion.
    pub score: f64,
    #[serde(default)]
    pub answers: Vec<AnswerResult>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AssessmentAttempt {
    pub fn new(
        assessment_id: impl Into<String>,
        learner_id: impl Into<LearnerId>,
        skill_id: impl Into<SkillId>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            assessment_id: assessment_id.into(),
            learner_id: learner_id.into(),
            skill_id: skill_id.into(),
            status: AttemptStatus::InProgress,
            score: 0.0,
            answers: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Transition to completed and derive the score from per-question
    /// results. A no-op once the attempt is terminal.
    pub fn complete(&mut self, answers: Vec<AnswerResult>) {
        if self.status != AttemptStatus::InProgress {
            return;
        }
        self.score = score_from_answers(&answers);
        self.answers = answers;
        self.status = AttemptStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn abandon(&mut self) {
        if self.status == AttemptStatus::InProgress {
            self.status = AttemptStatus::Abandoned;
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn correctness_ratio(&self) -> f64 {
        (self.score / 100.0).clamp(0.0, 1.0)
    }
}

fn score_from_answers(answers: &[AnswerResult]) -> f64 {
    let total: f64 = answers.iter().map(|a| a.points).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let earned: f64 = answers.iter().filter(|a| a.is_correct).map(|a| a.points).sum();
    (earned / total) * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Video,
    Reading,
    Interactive,
    Assessment,
    Project,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub content_type: ContentType,
    pub level: SkillDifficulty,
    pub duration_min: i32,
    pub cost: f64,
    /// Ranking score supplied by the content index; higher is better.
    pub rank: f64,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "id")]
pub enum CitationTarget {
    Step(StepId),
    Message(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<CitationTarget>,
    pub document_id: String,
    pub quote: String,
    pub span_start: usize,
    pub span_end: usize,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}
