//! Skill dependency graph.
//!
//! Skills are keyed by stable string ids and never held by reference from
//! plans or steps. Prerequisite edges are indexed in both directions so the
//! resolver can extract the induced subgraph of a goal set without scanning
//! the whole graph. Related/alternative edges are advisory only and never
//! participate in ordering.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::error::EngineError;
use crate::types::{RelationKind, Skill, SkillDifficulty, SkillEdge, SkillId};

#[derive(Debug, Default)]
pub struct SkillGraph {
    skills: HashMap<SkillId, Skill>,
    /// skill -> prerequisite skills (declared on the skill, plus explicit
    /// prerequisite edges).
    requires: HashMap<SkillId, BTreeSet<SkillId>>,
    /// prerequisite -> skills that require it.
    required_by: HashMap<SkillId, BTreeSet<SkillId>>,
    /// Advisory related/alternative edges, keyed by source skill.
    advisory: HashMap<SkillId, Vec<SkillEdge>>,
}

impl SkillGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn skill(&self, id: &str) -> Option<&Skill> {
        self.skills.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.skills.contains_key(id)
    }

    /// Insert or replace a skill. Prerequisites declared on the skill are
    /// indexed immediately; they may reference skills inserted later and are
    /// only validated when an order is resolved.
    pub fn upsert_skill(&mut self, skill: Skill) {
        if let Some(old) = self.skills.get(&skill.id) {
            for prereq in old.prerequisites.clone() {
                self.unlink(&skill.id, &prereq);
            }
        }
        for prereq in &skill.prerequisites {
            self.link(&skill.id, prereq);
        }
        self.skills.insert(skill.id.clone(), skill);
    }

    /// Add an explicit edge. Both endpoints must already exist.
    pub fn add_edge(&mut self, edge: SkillEdge) -> Result<(), EngineError> {
        for id in [&edge.src, &edge.dst] {
            if !self.skills.contains_key(id) {
                return Err(EngineError::UnknownSkill(id.clone()));
            }
        }
        match edge.relation {
            RelationKind::Prerequisite => {
                // src requires dst first.
                self.link(&edge.src, &edge.dst);
            }
            RelationKind::Related | RelationKind::Alternative => {
                self.advisory.entry(edge.src.clone()).or_default().push(edge);
            }
        }
        Ok(())
    }

    fn link(&mut self, skill: &str, prereq: &str) {
        self.requires
            .entry(skill.to_string())
            .or_default()
            .insert(prereq.to_string());
        self.required_by
            .entry(prereq.to_string())
            .or_default()
            .insert(skill.to_string());
    }

    fn unlink(&mut self, skill: &str, prereq: &str) {
        if let Some(set) = self.requires.get_mut(skill) {
            set.remove(prereq);
        }
        if let Some(set) = self.required_by.get_mut(prereq) {
            set.remove(skill);
        }
    }

    pub fn prerequisites_of(&self, id: &str) -> impl Iterator<Item = &SkillId> {
        self.requires.get(id).into_iter().flatten()
    }

    /// Substitution suggestions via related/alternative edges, strongest
    /// first, slug as the deterministic tie-break.
    pub fn alternatives_for(&self, id: &str) -> Vec<SkillId> {
        let mut edges: Vec<&SkillEdge> = self.advisory.get(id).into_iter().flatten().collect();
        edges.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let sa = self.skills.get(&a.dst).map(|s| s.slug.as_str()).unwrap_or(&a.dst);
                    let sb = self.skills.get(&b.dst).map(|s| s.slug.as_str()).unwrap_or(&b.dst);
                    sa.cmp(sb)
                })
        });
        edges.iter().map(|e| e.dst.clone()).collect()
    }

    /// Transitive prerequisite closure of the goal set, goals included.
    /// Fails with `UnknownSkill` if any reachable id is absent.
    fn closure(&self, goals: &HashSet<SkillId>) -> Result<HashSet<SkillId>, EngineError> {
        let mut seen: HashSet<SkillId> = HashSet::new();
        let mut queue: VecDeque<SkillId> = VecDeque::new();

        for goal in goals {
            if !self.skills.contains_key(goal) {
                return Err(EngineError::UnknownSkill(goal.clone()));
            }
            if seen.insert(goal.clone()) {
                queue.push_back(goal.clone());
            }
        }
        while let Some(id) = queue.pop_front() {
            for prereq in self.prerequisites_of(&id) {
                if !self.skills.contains_key(prereq) {
                    return Err(EngineError::UnknownSkill(prereq.clone()));
                }
                if seen.insert(prereq.clone()) {
                    queue.push_back(prereq.clone());
                }
            }
        }
        Ok(seen)
    }

    /// Topological order over the skills the goal set transitively requires,
    /// minus the already-known set. Kahn's algorithm; ties among
    /// simultaneously available skills break ascending by
    /// (difficulty, estimated hours, slug), which makes the output
    /// deterministic for identical inputs.
    pub fn resolve_order(
        &self,
        goals: &HashSet<SkillId>,
        known: &HashSet<SkillId>,
    ) -> Result<Vec<SkillId>, EngineError> {
        let needed: HashSet<SkillId> = self
            .closure(goals)?
            .into_iter()
            .filter(|id| !known.contains(id))
            .collect();

        // In-degree restricted to the induced subgraph. Known skills count
        // as satisfied prerequisites.
        let mut in_degree: HashMap<&SkillId, usize> = HashMap::new();
        for id in &needed {
            let degree = self
                .prerequisites_of(id)
                .filter(|p| needed.contains(*p))
                .count();
            in_degree.insert(id, degree);
        }

        let mut ready: BTreeSet<OrderKey> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| self.order_key(id))
            .collect();

        let mut order: Vec<SkillId> = Vec::with_capacity(needed.len());
        while let Some(key) = ready.pop_first() {
            for dependent in self.required_by.get(&key.id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(self.order_key(dependent));
                    }
                }
            }
            in_degree.remove(&key.id);
            order.push(key.id);
        }

        if !in_degree.is_empty() {
            let mut remaining: Vec<SkillId> = in_degree.keys().map(|id| (*id).clone()).collect();
            remaining.sort();
            return Err(EngineError::CycleDetected { remaining });
        }
        Ok(order)
    }

    fn order_key(&self, id: &SkillId) -> OrderKey {
        // Closure already guaranteed the id resolves.
        let (difficulty, hours, slug) = match self.skills.get(id) {
            Some(s) => (s.difficulty, s.estimated_hours, s.slug.clone()),
            None => (SkillDifficulty::Advanced, i32::MAX, id.clone()),
        };
        OrderKey {
            difficulty,
            hours,
            slug,
            id: id.clone(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    difficulty: SkillDifficulty,
    hours: i32,
    slug: String,
    id: SkillId,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill(id: &str, difficulty: SkillDifficulty, hours: i32, prereqs: &[&str]) -> Skill {
        Skill {
            id: id.to_string(),
            slug: id.to_string(),
            label: id.to_string(),
            domain: "test".to_string(),
            tags: vec![],
            difficulty,
            estimated_hours: hours,
            prerequisites: prereqs.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn chain_graph() -> SkillGraph {
        // data-analysis -> statistics -> algebra
        let mut graph = SkillGraph::new();
        graph.upsert_skill(skill("algebra", SkillDifficulty::Beginner, 10, &[]));
        graph.upsert_skill(skill("statistics", SkillDifficulty::Intermediate, 12, &["algebra"]));
        graph.upsert_skill(skill(
            "data-analysis",
            SkillDifficulty::Advanced,
            15,
            &["statistics"],
        ));
        graph
    }

    fn goals(ids: &[&str]) -> HashSet<SkillId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_chain_order() {
        let graph = chain_graph();
        let order = graph.resolve_order(&goals(&["data-analysis"]), &HashSet::new()).unwrap();
        assert_eq!(order, vec!["algebra", "statistics", "data-analysis"]);
    }

    #[test]
    fn test_known_skills_are_filtered() {
        let graph = chain_graph();
        let order = graph
            .resolve_order(&goals(&["data-analysis"]), &goals(&["algebra"]))
            .unwrap();
        assert_eq!(order, vec!["statistics", "data-analysis"]);
    }

    #[test]
    fn test_prerequisites_precede_dependents() {
        let mut graph = chain_graph();
        graph.upsert_skill(skill("calculus", SkillDifficulty::Intermediate, 20, &["algebra"]));
        graph.upsert_skill(skill(
            "ml",
            SkillDifficulty::Advanced,
            30,
            &["statistics", "calculus"],
        ));

        let order = graph.resolve_order(&goals(&["ml", "data-analysis"]), &HashSet::new()).unwrap();
        let pos = |id: &str| order.iter().position(|s| s == id).unwrap();
        assert!(pos("algebra") < pos("statistics"));
        assert!(pos("algebra") < pos("calculus"));
        assert!(pos("statistics") < pos("ml"));
        assert!(pos("calculus") < pos("ml"));
        assert!(pos("statistics") < pos("data-analysis"));
        assert_eq!(order.len(), 5, "every required skill exactly once");
    }

    #[test]
    fn test_tie_break_is_deterministic() {
        let mut graph = SkillGraph::new();
        graph.upsert_skill(skill("b-skill", SkillDifficulty::Beginner, 5, &[]));
        graph.upsert_skill(skill("a-skill", SkillDifficulty::Beginner, 5, &[]));
        graph.upsert_skill(skill("cheap", SkillDifficulty::Beginner, 2, &[]));
        graph.upsert_skill(skill("hard", SkillDifficulty::Advanced, 1, &[]));

        let g = goals(&["a-skill", "b-skill", "cheap", "hard"]);
        let order = graph.resolve_order(&g, &HashSet::new()).unwrap();
        // Ascending (difficulty, hours, slug).
        assert_eq!(order, vec!["cheap", "a-skill", "b-skill", "hard"]);

        let again = graph.resolve_order(&g, &HashSet::new()).unwrap();
        assert_eq!(order, again, "same input must yield the same order");
    }

    #[test]
    fn test_cycle_is_rejected_with_witness() {
        let mut graph = SkillGraph::new();
        graph.upsert_skill(skill("a", SkillDifficulty::Beginner, 1, &["b"]));
        graph.upsert_skill(skill("b", SkillDifficulty::Beginner, 1, &["a"]));

        let err = graph.resolve_order(&goals(&["a"]), &HashSet::new()).unwrap_err();
        match err {
            EngineError::CycleDetected { remaining } => {
                assert_eq!(remaining, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_goal_and_unknown_prereq() {
        let graph = chain_graph();
        assert!(matches!(
            graph.resolve_order(&goals(&["nope"]), &HashSet::new()),
            Err(EngineError::UnknownSkill(id)) if id == "nope"
        ));

        let mut broken = SkillGraph::new();
        broken.upsert_skill(skill("top", SkillDifficulty::Beginner, 1, &["missing"]));
        assert!(matches!(
            broken.resolve_order(&goals(&["top"]), &HashSet::new()),
            Err(EngineError::UnknownSkill(id)) if id == "missing"
        ));
    }

    #[test]
    fn test_edge_endpoints_must_exist() {
        let mut graph = chain_graph();
        let err = graph
            .add_edge(SkillEdge::new("algebra", "ghost", RelationKind::Prerequisite, 1.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownSkill(id) if id == "ghost"));
    }

    #[test]
    fn test_advisory_edges_do_not_order() {
        let mut graph = chain_graph();
        graph
            .add_edge(SkillEdge::new("algebra", "data-analysis", RelationKind::Related, 0.9))
            .unwrap();

        // Still resolvable: the related edge adds no dependency.
        let order = graph.resolve_order(&goals(&["data-analysis"]), &HashSet::new()).unwrap();
        assert_eq!(order, vec!["algebra", "statistics", "data-analysis"]);
        assert_eq!(graph.alternatives_for("algebra"), vec!["data-analysis".to_string()]);
    }

    #[test]
    fn test_alternatives_sorted_by_weight() {
        let mut graph = chain_graph();
        graph
            .add_edge(SkillEdge::new("statistics", "algebra", RelationKind::Alternative, 0.2))
            .unwrap();
        graph
            .add_edge(SkillEdge::new("statistics", "data-analysis", RelationKind::Related, 0.8))
            .unwrap();
        assert_eq!(
            graph.alternatives_for("statistics"),
            vec!["data-analysis".to_string(), "algebra".to_string()]
        );
    }

    #[test]
    fn test_upsert_replaces_prerequisites() {
        let mut graph = chain_graph();
        // Re-declare statistics without prerequisites.
        graph.upsert_skill(skill("statistics", SkillDifficulty::Intermediate, 12, &[]));
        let order = graph.resolve_order(&goals(&["statistics"]), &HashSet::new()).unwrap();
        assert_eq!(order, vec!["statistics"]);
    }
}
