//! Content Index collaborator contract.
//!
//! The engine never ranks content itself; it consumes candidates already
//! ranked by the index and only applies the learner's preference filters
//! and the deterministic tie-break.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::{ContentItem, ContentType, SkillDifficulty};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentFilters {
    /// Empty means any type is acceptable.
    #[serde(default)]
    pub preferred_types: Vec<ContentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_level: Option<SkillDifficulty>,
}

#[async_trait]
pub trait ContentIndex: Send + Sync {
    /// Ranked candidates for a skill; possibly empty.
    async fn find_candidates(
        &self,
        skill_id: &str,
        filters: &ContentFilters,
    ) -> Result<Vec<ContentItem>, EngineError>;
}

/// Select the best candidate: highest rank, then lowest cost, then shortest
/// duration. Inactive items and items outside the learner's preferences are
/// skipped.
pub fn select_candidate(candidates: &[ContentItem], filters: &ContentFilters) -> Option<ContentItem> {
    candidates
        .iter()
        .filter(|c| c.is_active)
        .filter(|c| filters.preferred_types.is_empty() || filters.preferred_types.contains(&c.content_type))
        .filter(|c| filters.preferred_level.map_or(true, |level| c.level == level))
        .min_by(|a, b| {
            b.rank
                .partial_cmp(&a.rank)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cost.partial_cmp(&b.cost).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.duration_min.cmp(&b.duration_min))
        })
        .cloned()
}

/// Fixed in-memory index for tests and embedding scenarios.
#[derive(Debug, Default)]
pub struct StaticContentIndex {
    by_skill: HashMap<String, Vec<ContentItem>>,
}

impl StaticContentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, skill_id: impl Into<String>, items: Vec<ContentItem>) {
        self.by_skill.insert(skill_id.into(), items);
    }
}

#[async_trait]
impl ContentIndex for StaticContentIndex {
    async fn find_candidates(
        &self,
        skill_id: &str,
        _filters: &ContentFilters,
    ) -> Result<Vec<ContentItem>, EngineError> {
        Ok(self.by_skill.get(skill_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, rank: f64, cost: f64, duration: i32, active: bool) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            title: id.to_string(),
            content_type: ContentType::Reading,
            level: SkillDifficulty::Beginner,
            duration_min: duration,
            cost,
            rank,
            is_active: active,
        }
    }

    #[test]
    fn test_select_highest_rank() {
        let candidates = vec![item("a", 0.5, 0.0, 30, true), item("b", 0.9, 10.0, 60, true)];
        let selected = select_candidate(&candidates, &ContentFilters::default()).unwrap();
        assert_eq!(selected.id, "b");
    }

    #[test]
    fn test_rank_tie_breaks_on_cost_then_duration() {
        let candidates = vec![
            item("pricey", 0.9, 20.0, 30, true),
            item("cheap-long", 0.9, 0.0, 90, true),
            item("cheap-short", 0.9, 0.0, 45, true),
        ];
        let selected = select_candidate(&candidates, &ContentFilters::default()).unwrap();
        assert_eq!(selected.id, "cheap-short");
    }

    #[test]
    fn test_inactive_items_skipped() {
        let candidates = vec![item("best", 1.0, 0.0, 10, false), item("ok", 0.4, 0.0, 10, true)];
        let selected = select_candidate(&candidates, &ContentFilters::default()).unwrap();
        assert_eq!(selected.id, "ok");
    }

    #[test]
    fn test_type_preference_filters() {
        let mut video = item("video", 1.0, 0.0, 10, true);
        video.content_type = ContentType::Video;
        let reading = item("reading", 0.5, 0.0, 10, true);

        let filters = ContentFilters {
            preferred_types: vec![ContentType::Reading],
            preferred_level: None,
        };
        let selected = select_candidate(&[video, reading], &filters).unwrap();
        assert_eq!(selected.id, "reading");
    }

    #[test]
    fn test_empty_candidates_yield_none() {
        assert!(select_candidate(&[], &ContentFilters::default()).is_none());
    }
}
