//! Dependency graph construction, cycle detection and deterministic ordering.

mod dependency_graph;

pub use dependency_graph::{DependencyGraph, GraphNode};
