use crate::error::{Error, Result};
use crate::model::DEFAULT_STAGE;
use crate::scan::{DeclarationKind, DependencyRef, DiscoveredDeclaration};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// A job as seen by the orderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    /// The job name.
    pub name: String,
    /// The declared stage, if any.
    pub stage: Option<String>,

    /// Jobs this job needs or extends, in declared order.
    pub dependencies: Vec<String>,
}

impl GraphNode {
    /// A node named `name` depending on `dependencies`.
    #[must_use]
    pub fn new(name: impl Into<String>, stage: Option<&str>, dependencies: &[&str]) -> Self {
        Self {
            name: name.into(),
            stage: stage.map(ToString::to_string),
            dependencies: dependencies.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    OnStack,
    Done,
}

/// The dependency graph of one build: edge `a -> b` means job `a` depends on job `b`.
///
/// Nodes keep their discovery order, which breaks ties between jobs of the same stage.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
    edges: Vec<Vec<usize>>,
    rank: Vec<usize>,
}

impl DependencyGraph {
    /// Builds the graph.
    ///
    /// Names in `external` are accepted as dependency targets but are not ordered.
    ///
    /// # Errors
    ///
    /// Returns every [`Error::UnknownReference`] found, and [`Error::Internal`] if two
    /// nodes share a name.
    pub fn new(nodes: Vec<GraphNode>, stages: &[&str], external: &HashSet<String>) -> Result<Self> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.name.clone(), i).is_some() {
                return Err(Error::internal(format!("job '{}' reached the orderer twice", node.name)));
            }
        }

        let mut errors = Vec::new();
        let mut edges = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let mut targets = Vec::new();
            for dependency in &node.dependencies {
                match index.get(dependency) {
                    Some(&target) => {
                        if !targets.contains(&target) {
                            targets.push(target);
                        }
                    }
                    None if external.contains(dependency) => {}
                    None => errors.push(Error::UnknownReference {
                        job: node.name.clone(),
                        missing: dependency.clone(),
                    }),
                }
            }
            edges.push(targets);
        }
        Error::collect(errors)?;

        let rank = nodes
            .iter()
            .map(|node| {
                let stage = node.stage.as_deref().unwrap_or(DEFAULT_STAGE);
                stages.iter().position(|s| *s == stage).unwrap_or(stages.len())
            })
            .collect();

        Ok(Self { nodes, index, edges, rank })
    }

    /// Builds the graph the scanner can see, before anything is evaluated.
    ///
    /// Only job declarations with a literal name take part. Binding references are
    /// mapped to the literal name of the binding they point at; references that are
    /// ambiguous or unknown are left out, so the graph never reports a missing job.
    #[must_use]
    pub fn from_declarations(declarations: &[DiscoveredDeclaration]) -> Self {
        let jobs: Vec<(&DiscoveredDeclaration, &str)> = declarations
            .iter()
            .filter(|d| d.kind == DeclarationKind::Job)
            .filter_map(|d| d.name.as_deref().map(|name| (d, name)))
            .collect();

        let mut bindings: HashMap<&str, Option<&str>> = HashMap::new();
        for (declaration, name) in &jobs {
            _ = bindings
                .entry(declaration.binding.as_str())
                .and_modify(|target| *target = None)
                .or_insert(Some(*name));
        }

        let mut nodes: Vec<GraphNode> = Vec::with_capacity(jobs.len());
        let mut index = HashMap::with_capacity(jobs.len());
        for (declaration, name) in &jobs {
            if index.contains_key(*name) {
                continue;
            }
            _ = index.insert((*name).to_string(), nodes.len());

            let dependencies = declaration
                .dependencies
                .iter()
                .filter_map(|dependency| match dependency {
                    DependencyRef::Name(name) => Some(name.as_str()),
                    DependencyRef::Binding(binding) => bindings.get(binding.as_str()).copied().flatten(),
                })
                .collect::<Vec<_>>();
            nodes.push(GraphNode::new(*name, declaration.stage.as_deref(), &dependencies));
        }

        let edges = nodes
            .iter()
            .map(|node| {
                let mut targets = Vec::new();
                for target in node.dependencies.iter().filter_map(|d| index.get(d).copied()) {
                    if !targets.contains(&target) {
                        targets.push(target);
                    }
                }
                targets
            })
            .collect();
        let rank = vec![0; nodes.len()];

        Self { nodes, index, edges, rank }
    }

    /// The number of jobs in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no jobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The in-graph dependencies of `name`, in declared order.
    #[must_use]
    pub fn dependencies(&self, name: &str) -> Option<Vec<&str>> {
        let &i = self.index.get(name)?;
        Some(self.edges[i].iter().map(|&t| self.nodes[t].name.as_str()).collect())
    }

    /// Every `(job, dependency)` edge, in discovery order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.edges
            .iter()
            .enumerate()
            .flat_map(move |(from, targets)| targets.iter().map(move |&to| (self.nodes[from].name.as_str(), self.nodes[to].name.as_str())))
    }

    /// Everything `name` depends on, directly or indirectly, nearest first.
    #[must_use]
    pub fn transitive_dependencies(&self, name: &str) -> Vec<&str> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        if let Some(&start) = self.index.get(name) {
            queue.extend(self.edges[start].iter().copied());
        }

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            result.push(self.nodes[current].name.as_str());
            queue.extend(self.edges[current].iter().copied().filter(|n| !visited.contains(n)));
        }

        result
    }

    /// Finds a cycle by depth-first search in discovery order.
    ///
    /// The cycle is returned as the names along it, starting and ending with the same
    /// job, so a job that needs itself yields `[a, a]`.
    #[must_use]
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        let mut visited = vec![None; self.nodes.len()];
        let mut path = Vec::new();

        for start in 0..self.nodes.len() {
            if visited[start].is_none()
                && let Some(cycle) = self.visit(start, &mut visited, &mut path)
            {
                return Some(cycle);
            }
        }

        None
    }

    fn visit(&self, node: usize, visited: &mut [Option<Visit>], path: &mut Vec<usize>) -> Option<Vec<String>> {
        path.push(node);
        visited[node] = Some(Visit::OnStack);

        for &next in &self.edges[node] {
            match visited[next] {
                Some(Visit::OnStack) => {
                    let start = path.iter().position(|&n| n == next).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..].iter().map(|&n| self.nodes[n].name.clone()).collect();
                    cycle.push(self.nodes[next].name.clone());
                    return Some(cycle);
                }
                Some(Visit::Done) => {}
                None => {
                    if let Some(cycle) = self.visit(next, visited, path) {
                        return Some(cycle);
                    }
                }
            }
        }

        _ = path.pop();
        visited[node] = Some(Visit::Done);
        None
    }

    /// Orders the jobs so that every job comes after everything it depends on.
    ///
    /// Among jobs that are ready at the same time, the one whose stage comes first in
    /// the stage list wins, then the one discovered first.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Cycle`] rather than returning a partial order.
    pub fn order(&self) -> Result<Vec<&str>> {
        if let Some(cycle) = self.detect_cycle() {
            return Err(Error::Cycle { cycle });
        }

        let mut in_degree: Vec<usize> = self.edges.iter().map(Vec::len).collect();
        let mut dependents = vec![Vec::new(); self.nodes.len()];
        for (from, targets) in self.edges.iter().enumerate() {
            for &to in targets {
                dependents[to].push(from);
            }
        }

        let mut ready: BTreeSet<(usize, usize)> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(i, _)| (self.rank[i], i))
            .collect();

        let mut sorted = Vec::with_capacity(self.nodes.len());
        while let Some((_, i)) = ready.pop_first() {
            sorted.push(self.nodes[i].name.as_str());
            for &dependent in &dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    _ = ready.insert((self.rank[dependent], dependent));
                }
            }
        }

        if sorted.len() != self.nodes.len() {
            return Err(Error::internal("ordering stalled on a graph with no detected cycle"));
        }

        Ok(sorted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const STAGES: &[&str] = &["build", "test", "deploy"];

    fn graph(nodes: Vec<GraphNode>) -> Result<DependencyGraph> {
        DependencyGraph::new(nodes, STAGES, &HashSet::new())
    }

    #[test]
    fn build_test_deploy() {
        let g = graph(vec![
            GraphNode::new("deploy", Some("deploy"), &["test"]),
            GraphNode::new("test", None, &["build"]),
            GraphNode::new("build", None, &[]),
        ])
        .unwrap();

        assert_eq!(g.order().unwrap(), vec!["build", "test", "deploy"]);
    }

    #[test]
    fn ties_break_by_stage_then_discovery() {
        let g = graph(vec![
            GraphNode::new("ship", Some("deploy"), &[]),
            GraphNode::new("unit", Some("test"), &[]),
            GraphNode::new("compile", Some("build"), &[]),
            GraphNode::new("lint", Some("test"), &[]),
        ])
        .unwrap();

        assert_eq!(g.order().unwrap(), vec!["compile", "unit", "lint", "ship"]);
    }

    #[test]
    fn two_node_cycle() {
        let g = graph(vec![GraphNode::new("a", None, &["b"]), GraphNode::new("b", None, &["a"])]).unwrap();

        assert_eq!(g.detect_cycle(), Some(vec!["a".to_string(), "b".to_string(), "a".to_string()]));
        assert!(matches!(g.order(), Err(Error::Cycle { cycle }) if cycle == ["a", "b", "a"]));
    }

    #[test]
    fn self_cycle() {
        let g = graph(vec![GraphNode::new("a", None, &["a"])]).unwrap();
        assert_eq!(g.detect_cycle(), Some(vec!["a".to_string(), "a".to_string()]));
    }

    #[test]
    fn minimal_cycle_excludes_the_entry_path() {
        let g = graph(vec![
            GraphNode::new("entry", None, &["x"]),
            GraphNode::new("x", None, &["y"]),
            GraphNode::new("y", None, &["x"]),
        ])
        .unwrap();
        assert_eq!(g.detect_cycle(), Some(vec!["x".to_string(), "y".to_string(), "x".to_string()]));
    }

    #[test]
    fn unknown_references_are_reported_with_both_names() {
        let err = graph(vec![GraphNode::new("test", None, &["biuld", "lint"])]).unwrap_err();
        let errors = err.into_list();
        assert_eq!(errors.len(), 2);
        assert!(matches!(&errors[0], Error::UnknownReference { job, missing } if job == "test" && missing == "biuld"));
    }

    #[test]
    fn external_names_are_accepted_but_not_ordered() {
        let external = HashSet::from([".shared".to_string()]);
        let g = DependencyGraph::new(vec![GraphNode::new("test", None, &[".shared"])], STAGES, &external).unwrap();
        assert_eq!(g.order().unwrap(), vec!["test"]);
        assert_eq!(g.dependencies("test"), Some(Vec::new()));
    }

    #[test]
    fn every_dependency_precedes_its_dependent() {
        let g = graph(vec![
            GraphNode::new("d", Some("deploy"), &["b", "c"]),
            GraphNode::new("c", Some("build"), &["a"]),
            GraphNode::new("b", Some("test"), &["a"]),
            GraphNode::new("a", Some("deploy"), &[]),
        ])
        .unwrap();

        let order = g.order().unwrap();
        let position = |name: &str| order.iter().position(|n| *n == name).unwrap();
        for (job, dependency) in g.edges() {
            assert!(position(dependency) < position(job), "{dependency} must precede {job}");
        }
        assert_eq!(g.transitive_dependencies("d"), vec!["b", "c", "a"]);
    }

    #[test]
    fn duplicate_nodes_are_internal_errors() {
        let err = graph(vec![GraphNode::new("a", None, &[]), GraphNode::new("a", None, &[])]).unwrap_err();
        assert!(!err.is_input_problem());
    }

    fn declaration(binding: &str, name: Option<&str>, dependencies: Vec<DependencyRef>) -> DiscoveredDeclaration {
        DiscoveredDeclaration {
            binding: binding.into(),
            kind: DeclarationKind::Job,
            file: "jobs.rs".into(),
            line: 1,
            name: name.map(Into::into),
            stage: None,
            dependencies,
            index: None,
        }
    }

    #[test]
    fn declarations_referring_to_each_other_form_a_cycle() {
        let g = DependencyGraph::from_declarations(&[
            declaration("A", Some("a"), vec![DependencyRef::Binding("B".into())]),
            declaration("B", Some("b"), vec![DependencyRef::Binding("A".into())]),
        ]);

        assert_eq!(g.detect_cycle(), Some(vec!["a".to_string(), "b".to_string(), "a".to_string()]));
    }

    #[test]
    fn static_graph_skips_what_it_cannot_see() {
        let g = DependencyGraph::from_declarations(&[
            declaration("A", Some("a"), vec![DependencyRef::Binding("COMPUTED".into()), DependencyRef::Name("ghost".into())]),
            declaration("COMPUTED", None, vec![DependencyRef::Binding("A".into())]),
            declaration("B", Some("b"), vec![DependencyRef::Name("a".into())]),
        ]);

        assert_eq!(g.len(), 2);
        assert_eq!(g.detect_cycle(), None);
        assert_eq!(g.dependencies("a"), Some(Vec::new()));
        assert_eq!(g.dependencies("b"), Some(vec!["a"]));
    }
}
