//! Provenance records for generated steps and coach messages.

use chrono::Utc;
use parking_lot::RwLock;

use crate::error::EngineError;
use crate::types::{Citation, CitationTarget};

/// Pure confidence filter: citations at or above `min_confidence`, strongest
/// first, ties broken by most recent creation.
pub fn filter_by_confidence(citations: &[Citation], min_confidence: f64) -> Vec<Citation> {
    let mut kept: Vec<Citation> = citations
        .iter()
        .filter(|c| c.confidence >= min_confidence)
        .cloned()
        .collect();
    kept.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    kept
}

#[derive(Debug, Default)]
pub struct CitationRegistry {
    citations: RwLock<Vec<Citation>>,
}

impl CitationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a citation to a step or coach message (or to neither, for
    /// free-standing provenance). The span is half-open; an empty or
    /// inverted span is rejected.
    pub fn attach(
        &self,
        target: Option<CitationTarget>,
        document_id: impl Into<String>,
        quote: impl Into<String>,
        span: (usize, usize),
        confidence: f64,
    ) -> Result<Citation, EngineError> {
        let (start, end) = span;
        if end <= start {
            return Err(EngineError::InvalidSpan { start, end });
        }

        let citation = Citation {
            id: uuid::Uuid::new_v4().to_string(),
            target,
            document_id: document_id.into(),
            quote: quote.into(),
            span_start: start,
            span_end: end,
            confidence: confidence.clamp(0.0, 1.0),
            created_at: Utc::now(),
        };
        self.citations.write().push(citation.clone());
        Ok(citation)
    }

    pub fn for_step(&self, step_id: &str) -> Vec<Citation> {
        self.for_target(&CitationTarget::Step(step_id.to_string()))
    }

    pub fn for_message(&self, message_id: &str) -> Vec<Citation> {
        self.for_target(&CitationTarget::Message(message_id.to_string()))
    }

    fn for_target(&self, target: &CitationTarget) -> Vec<Citation> {
        let matched: Vec<Citation> = self
            .citations
            .read()
            .iter()
            .filter(|c| c.target.as_ref() == Some(target))
            .cloned()
            .collect();
        filter_by_confidence(&matched, 0.0)
    }

    pub fn all(&self) -> Vec<Citation> {
        self.citations.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_span_rejected() {
        let registry = CitationRegistry::new();
        let err = registry.attach(None, "doc", "q", (10, 10), 0.9).unwrap_err();
        assert!(matches!(err, EngineError::InvalidSpan { start: 10, end: 10 }));
    }

    #[test]
    fn test_inverted_span_rejected() {
        let registry = CitationRegistry::new();
        let err = registry.attach(None, "doc", "q", (10, 5), 0.9).unwrap_err();
        assert!(matches!(err, EngineError::InvalidSpan { start: 10, end: 5 }));
    }

    #[test]
    fn test_minimal_span_accepted() {
        let registry = CitationRegistry::new();
        let citation = registry.attach(None, "doc", "q", (10, 11), 0.9).unwrap();
        assert_eq!(citation.span_start, 10);
        assert_eq!(citation.span_end, 11);
    }

    #[test]
    fn test_confidence_clamped() {
        let registry = CitationRegistry::new();
        let citation = registry.attach(None, "doc", "q", (0, 4), 1.7).unwrap();
        assert_eq!(citation.confidence, 1.0);
    }

    fn citation_at(id: &str, confidence: f64, ts_secs: i64) -> Citation {
        Citation {
            id: id.to_string(),
            target: None,
            document_id: "doc".to_string(),
            quote: "q".to_string(),
            span_start: 0,
            span_end: 3,
            confidence,
            created_at: chrono::DateTime::from_timestamp(ts_secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_filter_orders_by_confidence_then_recency() {
        let citations = vec![
            citation_at("low", 0.3, 100),
            citation_at("older", 0.8, 100),
            citation_at("newer", 0.8, 200),
        ];

        let filtered = filter_by_confidence(&citations, 0.5);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].id, "newer", "tie broken by recency");
        assert_eq!(filtered[1].id, "older");
    }

    #[test]
    fn test_step_lookup_matches_target_only() {
        let registry = CitationRegistry::new();
        registry
            .attach(Some(CitationTarget::Step("s1".into())), "doc", "a", (0, 2), 0.9)
            .unwrap();
        registry
            .attach(Some(CitationTarget::Message("m1".into())), "doc", "b", (0, 2), 0.9)
            .unwrap();
        registry.attach(None, "doc", "c", (0, 2), 0.9).unwrap();

        assert_eq!(registry.for_step("s1").len(), 1);
        assert_eq!(registry.for_message("m1").len(), 1);
        assert!(registry.for_step("s2").is_empty());
    }
}
