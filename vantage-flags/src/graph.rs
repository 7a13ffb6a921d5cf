//! Flag dependency graph
//!
//! Nodes are a team's non-deleted flags. An edge `A -> B` exists when one of
//! A's flag-type property filters references B, by numeric ID first and by
//! key otherwise. References that match no node are kept as missing edges.
//!
//! Every node is resolved once, up front, with an iterative three-colour
//! DFS. A node is unresolvable when it sits on a cycle, has a missing
//! reference, or depends on an unresolvable node. Resolvable nodes memoize
//! their full dependency chain so shared dependencies are walked once.

use std::collections::{HashMap, HashSet, VecDeque};
use vantage_core::{FeatureFlag, FlagId, TeamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    To(usize),
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

/// Outcome of resolving one flag.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Resolution {
    /// Transitive dependencies, dependencies before dependents.
    Chain(Vec<usize>),
    Unresolvable,
}

/// Resolved dependency graph of one team's flags.
#[derive(Debug)]
pub struct DependencyGraph<'a> {
    team_id: TeamId,
    nodes: Vec<&'a FeatureFlag>,
    by_id: HashMap<FlagId, usize>,
    by_key: HashMap<&'a str, usize>,
    edges: Vec<Vec<Edge>>,
    resolutions: Vec<Resolution>,
}

impl<'a> DependencyGraph<'a> {
    /// Build and resolve the graph for `team_id`.
    ///
    /// Flags of other teams and deleted flags are ignored.
    pub fn new(team_id: TeamId, flags: &'a [FeatureFlag]) -> Self {
        let nodes: Vec<&FeatureFlag> = flags
            .iter()
            .filter(|flag| flag.team_id == team_id && !flag.deleted)
            .collect();

        let mut by_id = HashMap::with_capacity(nodes.len());
        let mut by_key = HashMap::with_capacity(nodes.len());
        for (index, flag) in nodes.iter().enumerate() {
            by_id.entry(flag.id).or_insert(index);
            by_key.entry(flag.key.as_str()).or_insert(index);
        }

        let mut graph = Self {
            team_id,
            nodes,
            by_id,
            by_key,
            edges: Vec::new(),
            resolutions: Vec::new(),
        };
        graph.edges = graph
            .nodes
            .iter()
            .map(|flag| {
                flag.dependency_references()
                    .into_iter()
                    .map(|reference| graph.lookup(reference).map_or(Edge::Missing, Edge::To))
                    .collect()
            })
            .collect();
        graph.resolutions = graph.resolve_all();
        graph
    }

    pub fn team_id(&self) -> TeamId {
        self.team_id
    }

    /// Number of flags in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn lookup(&self, reference: &str) -> Option<usize> {
        reference
            .trim()
            .parse::<FlagId>()
            .ok()
            .and_then(|id| self.by_id.get(&id).copied())
            .or_else(|| self.by_key.get(reference).copied())
    }

    /// The flag a dependency reference points at, if it exists in the team.
    pub fn flag(&self, reference: &str) -> Option<&'a FeatureFlag> {
        self.lookup(reference).map(|index| self.nodes[index])
    }

    pub fn flag_by_id(&self, flag_id: FlagId) -> Option<&'a FeatureFlag> {
        self.by_id.get(&flag_id).map(|&index| self.nodes[index])
    }

    /// Whether the flag's full dependency chain can be computed.
    ///
    /// `false` for flags on or behind a cycle or a missing reference, and for
    /// flags that are not in the graph.
    pub fn is_resolvable(&self, flag_id: FlagId) -> bool {
        self.by_id
            .get(&flag_id)
            .is_some_and(|&index| matches!(self.resolutions[index], Resolution::Chain(_)))
    }

    /// Keys of every transitive dependency of the flag, dependencies first.
    ///
    /// Empty when the flag has no dependencies and when it is unresolvable.
    pub fn dependency_chain_for_flag(&self, flag_id: FlagId) -> Vec<String> {
        match self.by_id.get(&flag_id) {
            Some(&index) => self.chain_keys(index, false),
            None => Vec::new(),
        }
    }

    /// Chain for a flag-type filter referencing `reference`: the referenced
    /// flag's own chain followed by its key.
    ///
    /// Empty when the reference is missing or the referenced flag is
    /// unresolvable.
    pub fn chain_for_reference(&self, reference: &str) -> Vec<String> {
        match self.lookup(reference) {
            Some(index) => self.chain_keys(index, true),
            None => Vec::new(),
        }
    }

    fn chain_keys(&self, index: usize, include_self: bool) -> Vec<String> {
        match &self.resolutions[index] {
            Resolution::Unresolvable => Vec::new(),
            Resolution::Chain(chain) => {
                let mut keys: Vec<String> = chain
                    .iter()
                    .map(|&dep| self.nodes[dep].key.clone())
                    .collect();
                if include_self {
                    keys.push(self.nodes[index].key.clone());
                }
                keys
            }
        }
    }

    /// Flags whose filters reference `flag_id` directly.
    pub fn direct_dependents(&self, flag_id: FlagId) -> Vec<&'a FeatureFlag> {
        let Some(&target) = self.by_id.get(&flag_id) else {
            return Vec::new();
        };
        self.edges
            .iter()
            .enumerate()
            .filter(|(index, edges)| *index != target && edges.contains(&Edge::To(target)))
            .map(|(index, _)| self.nodes[index])
            .collect()
    }

    /// Flags `flag_id` references directly that exist in the graph.
    pub fn direct_dependencies(&self, flag_id: FlagId) -> Vec<&'a FeatureFlag> {
        let Some(&source) = self.by_id.get(&flag_id) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        self.edges[source]
            .iter()
            .filter_map(|edge| match edge {
                Edge::To(index) if seen.insert(*index) => Some(self.nodes[*index]),
                _ => None,
            })
            .collect()
    }

    /// Every flag `flag_id` reaches through its references, excluding itself.
    ///
    /// Unlike [`Self::dependency_chain_for_flag`] this also walks flags on or
    /// behind cycles and missing references. Order follows a depth-first walk.
    pub fn transitive_dependencies(&self, flag_id: FlagId) -> Vec<&'a FeatureFlag> {
        let Some(&start) = self.by_id.get(&flag_id) else {
            return Vec::new();
        };
        let mut seen = HashSet::from([start]);
        let mut stack = vec![start];
        let mut reached = Vec::new();
        while let Some(node) = stack.pop() {
            for edge in &self.edges[node] {
                if let Edge::To(next) = *edge {
                    if seen.insert(next) {
                        reached.push(self.nodes[next]);
                        stack.push(next);
                    }
                }
            }
        }
        reached
    }

    /// Shortest cycle through `flag_id`, as keys from the flag back to
    /// itself (`["a", "b", "a"]`), or `None` if the flag is on no cycle.
    pub fn cycle_through(&self, flag_id: FlagId) -> Option<Vec<String>> {
        let &start = self.by_id.get(&flag_id)?;
        let mut parent: HashMap<usize, usize> = HashMap::new();
        let mut queue = VecDeque::from([start]);

        while let Some(node) = queue.pop_front() {
            for edge in &self.edges[node] {
                let Edge::To(next) = *edge else { continue };
                if next == start {
                    let mut path = vec![start];
                    let mut cursor = node;
                    while cursor != start {
                        path.push(cursor);
                        cursor = parent[&cursor];
                    }
                    path.push(start);
                    path.reverse();
                    return Some(
                        path.into_iter()
                            .map(|index| self.nodes[index].key.clone())
                            .collect(),
                    );
                }
                if next != start && !parent.contains_key(&next) {
                    parent.insert(next, node);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Iterative three-colour DFS over every node.
    fn resolve_all(&self) -> Vec<Resolution> {
        let count = self.nodes.len();
        let mut colour = vec![Colour::White; count];
        let mut on_cycle = vec![false; count];
        let mut memo: Vec<Option<Resolution>> = vec![None; count];
        // (node, next edge to visit)
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for root in 0..count {
            if colour[root] != Colour::White {
                continue;
            }
            colour[root] = Colour::Grey;
            stack.push((root, 0));

            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                let edge = self.edges[node].get(frame.1).copied();
                frame.1 += 1;

                match edge {
                    Some(Edge::To(next)) => match colour[next] {
                        Colour::White => {
                            colour[next] = Colour::Grey;
                            stack.push((next, 0));
                        }
                        Colour::Grey => {
                            // Back edge: everything on the stack from `next`
                            // upwards is on the cycle.
                            for &(member, _) in stack.iter().rev() {
                                on_cycle[member] = true;
                                if member == next {
                                    break;
                                }
                            }
                        }
                        Colour::Black => {}
                    },
                    Some(Edge::Missing) => {}
                    None => {
                        stack.pop();
                        colour[node] = Colour::Black;
                        memo[node] = Some(self.finish(node, on_cycle[node], &memo));
                    }
                }
            }
        }

        memo.into_iter()
            .map(|resolution| resolution.unwrap_or(Resolution::Unresolvable))
            .collect()
    }

    /// Resolve a node whose dependencies have all finished.
    fn finish(&self, node: usize, on_cycle: bool, memo: &[Option<Resolution>]) -> Resolution {
        if on_cycle {
            return Resolution::Unresolvable;
        }

        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        for edge in &self.edges[node] {
            let Edge::To(dep) = *edge else {
                return Resolution::Unresolvable;
            };
            let Some(Resolution::Chain(dep_chain)) = &memo[dep] else {
                return Resolution::Unresolvable;
            };
            for &member in dep_chain.iter().chain(std::iter::once(&dep)) {
                if seen.insert(member) {
                    chain.push(member);
                }
            }
        }
        Resolution::Chain(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEAM: TeamId = TeamId::from_raw(1);

    fn flag(id: i64, key: &str, deps: &[&str]) -> FeatureFlag {
        deps.iter().fold(
            FeatureFlag::new(FlagId::from_raw(id), TEAM, key),
            |flag, dep| flag.with_dependency(*dep),
        )
    }

    #[test]
    fn test_no_dependencies() {
        let flags = vec![flag(1, "a", &[])];
        let graph = DependencyGraph::new(TEAM, &flags);
        assert!(graph.dependency_chain_for_flag(FlagId::from_raw(1)).is_empty());
        assert!(graph.is_resolvable(FlagId::from_raw(1)));
        assert_eq!(graph.chain_for_reference("1"), vec!["a"]);
    }

    #[test]
    fn test_linear_chain() {
        let flags = vec![
            flag(1, "flag-a", &[]),
            flag(2, "flag-b", &["1"]),
            flag(3, "flag-c", &["2"]),
        ];
        let graph = DependencyGraph::new(TEAM, &flags);
        assert_eq!(graph.dependency_chain_for_flag(FlagId::from_raw(3)), vec!["flag-a", "flag-b"]);
        assert_eq!(graph.dependency_chain_for_flag(FlagId::from_raw(2)), vec!["flag-a"]);
        assert_eq!(graph.chain_for_reference("2"), vec!["flag-a", "flag-b"]);
    }

    #[test]
    fn test_reference_by_key() {
        let flags = vec![flag(1, "base", &[]), flag(2, "child", &["base"])];
        let graph = DependencyGraph::new(TEAM, &flags);
        assert_eq!(graph.dependency_chain_for_flag(FlagId::from_raw(2)), vec!["base"]);
    }

    #[test]
    fn test_numeric_reference_prefers_id() {
        // Flag 2 is keyed "1"; the reference "1" still means flag ID 1.
        let flags = vec![flag(1, "one", &[]), flag(2, "1", &[]), flag(3, "c", &["1"])];
        let graph = DependencyGraph::new(TEAM, &flags);
        assert_eq!(graph.dependency_chain_for_flag(FlagId::from_raw(3)), vec!["one"]);
    }

    #[test]
    fn test_diamond_dedupes_shared_dependency() {
        let flags = vec![
            flag(1, "root", &[]),
            flag(2, "left", &["1"]),
            flag(3, "right", &["1"]),
            flag(4, "top", &["2", "3"]),
        ];
        let graph = DependencyGraph::new(TEAM, &flags);
        assert_eq!(
            graph.dependency_chain_for_flag(FlagId::from_raw(4)),
            vec!["root", "left", "right"]
        );
    }

    #[test]
    fn test_self_reference_is_unresolvable() {
        let flags = vec![flag(1, "loop", &["1"])];
        let graph = DependencyGraph::new(TEAM, &flags);
        assert!(!graph.is_resolvable(FlagId::from_raw(1)));
        assert!(graph.dependency_chain_for_flag(FlagId::from_raw(1)).is_empty());
        assert_eq!(
            graph.cycle_through(FlagId::from_raw(1)),
            Some(vec!["loop".to_string(), "loop".to_string()])
        );
    }

    #[test]
    fn test_cycle_taints_dependents_but_not_dependencies() {
        let flags = vec![
            flag(1, "leaf", &[]),
            flag(2, "x", &["3", "1"]),
            flag(3, "y", &["2"]),
            flag(4, "above", &["2"]),
        ];
        let graph = DependencyGraph::new(TEAM, &flags);
        assert!(graph.is_resolvable(FlagId::from_raw(1)));
        assert!(!graph.is_resolvable(FlagId::from_raw(2)));
        assert!(!graph.is_resolvable(FlagId::from_raw(3)));
        assert!(!graph.is_resolvable(FlagId::from_raw(4)));
        assert!(graph.chain_for_reference("3").is_empty());
        assert_eq!(graph.chain_for_reference("1"), vec!["leaf"]);
        assert_eq!(
            graph.cycle_through(FlagId::from_raw(3)),
            Some(vec!["y".to_string(), "x".to_string(), "y".to_string()])
        );
        assert_eq!(graph.cycle_through(FlagId::from_raw(4)), None);
    }

    #[test]
    fn test_missing_reference_is_unresolvable() {
        let flags = vec![flag(1, "a", &["99"]), flag(2, "b", &["1"])];
        let graph = DependencyGraph::new(TEAM, &flags);
        assert!(!graph.is_resolvable(FlagId::from_raw(1)));
        assert!(!graph.is_resolvable(FlagId::from_raw(2)));
        assert!(graph.chain_for_reference("99").is_empty());
        assert!(graph.flag("99").is_none());
    }

    #[test]
    fn test_other_teams_and_deleted_flags_are_ignored() {
        let flags = vec![
            FeatureFlag::new(FlagId::from_raw(1), TeamId::from_raw(2), "foreign"),
            flag(2, "gone", &[]).with_deleted(true),
            flag(3, "child", &["1"]),
            flag(4, "orphan", &["2"]),
        ];
        let graph = DependencyGraph::new(TEAM, &flags);
        assert_eq!(graph.len(), 2);
        assert!(!graph.is_resolvable(FlagId::from_raw(3)));
        assert!(!graph.is_resolvable(FlagId::from_raw(4)));
    }

    #[test]
    fn test_direct_dependents_and_dependencies() {
        let flags = vec![
            flag(1, "base", &[]),
            flag(2, "by-id", &["1"]),
            flag(3, "by-key", &["base", "1"]),
            flag(4, "unrelated", &[]),
        ];
        let graph = DependencyGraph::new(TEAM, &flags);
        let dependents: Vec<&str> = graph
            .direct_dependents(FlagId::from_raw(1))
            .into_iter()
            .map(|f| f.key.as_str())
            .collect();
        assert_eq!(dependents, vec!["by-id", "by-key"]);

        let deps: Vec<&str> = graph
            .direct_dependencies(FlagId::from_raw(3))
            .into_iter()
            .map(|f| f.key.as_str())
            .collect();
        assert_eq!(deps, vec!["base"]);
    }

    #[test]
    fn test_transitive_dependencies() {
        let flags = vec![
            flag(1, "root", &[]),
            flag(2, "mid", &["1"]),
            flag(3, "top", &["2", "mid"]),
            flag(4, "loop-a", &["5", "404"]),
            flag(5, "loop-b", &["4", "1"]),
        ];
        let graph = DependencyGraph::new(TEAM, &flags);
        let keys = |id: i64| -> Vec<&str> {
            let mut keys: Vec<&str> = graph
                .transitive_dependencies(FlagId::from_raw(id))
                .into_iter()
                .map(|f| f.key.as_str())
                .collect();
            keys.sort();
            keys
        };
        assert_eq!(keys(3), vec!["mid", "root"]);
        assert!(keys(1).is_empty());
        assert_eq!(keys(4), vec!["loop-b", "root"]);
        assert!(graph.transitive_dependencies(FlagId::from_raw(99)).is_empty());
    }

    #[test]
    fn test_long_chain_does_not_overflow() {
        // Deepest flag first, so the walk descends the whole chain at once.
        let flags: Vec<FeatureFlag> = (1..=5_000)
            .rev()
            .map(|i| {
                let deps: Vec<String> = if i > 1 { vec![(i - 1).to_string()] } else { vec![] };
                let refs: Vec<&str> = deps.iter().map(String::as_str).collect();
                flag(i, &format!("f{}", i), &refs)
            })
            .collect();
        let graph = DependencyGraph::new(TEAM, &flags);
        assert!(graph.is_resolvable(FlagId::from_raw(5_000)));
        assert_eq!(graph.dependency_chain_for_flag(FlagId::from_raw(5_000)).len(), 4_999);
    }
}
