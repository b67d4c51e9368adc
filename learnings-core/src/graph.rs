//! Graph - Dependency analysis between declared resources

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::resource::Resource;

/// Edge to a resource that must exist first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Target logical id
    pub target: String,
    /// Whether the edge comes from an explicit `DependsOn` rather than a reference
    pub explicit: bool,
}

/// Dependency graph keyed by logical id
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Every node, including ones without edges
    nodes: BTreeSet<String>,
    /// Logical id -> list of dependencies
    pub edges: BTreeMap<String, Vec<Dependency>>,
    /// target -> resources depending on it
    pub reverse_edges: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph of a set of resources
    pub fn from_resources<'a>(resources: impl IntoIterator<Item = &'a Resource>) -> Self {
        let mut graph = Self::new();
        for resource in resources {
            let from = resource.logical_id().to_string();
            graph.add_node(from.clone());
            for target in resource.dependencies() {
                let explicit = resource.depends_on.contains(&target);
                graph.add_edge(from.clone(), Dependency { target, explicit });
            }
        }
        graph
    }

    pub fn add_node(&mut self, node: String) {
        self.nodes.insert(node);
    }

    /// Add a dependency edge
    pub fn add_edge(&mut self, from: String, dependency: Dependency) {
        let target = dependency.target.clone();
        self.nodes.insert(from.clone());
        self.nodes.insert(target.clone());
        self.edges.entry(from.clone()).or_default().push(dependency);
        self.reverse_edges.entry(target).or_default().push(from);
    }

    pub fn nodes(&self) -> impl Iterator<Item = &String> {
        self.nodes.iter()
    }

    /// Resources without dependencies
    pub fn root_resources(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| self.dependencies_of(n).is_empty())
            .cloned()
            .collect()
    }

    /// Resources nothing depends on
    pub fn leaf_resources(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| self.dependents_of(n).is_empty())
            .cloned()
            .collect()
    }

    /// Direct dependencies of a resource
    pub fn dependencies_of(&self, resource: &str) -> &[Dependency] {
        self.edges.get(resource).map_or(&[], |v| v.as_slice())
    }

    /// Resources depending directly on this one
    pub fn dependents_of(&self, resource: &str) -> &[String] {
        self.reverse_edges
            .get(resource)
            .map_or(&[], |v| v.as_slice())
    }

        pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// Return one cycle as a path of logical ids, if any
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for node in &self.nodes {
            if let Some(cycle) = self.find_cycle_util(node, &mut visited, &mut stack) {
                return Some(cycle);
            }
        }
        None
    }

    fn find_cycle_util(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = stack.iter().position(|n| n == node) {
            let mut cycle = stack[pos..].to_vec();
            cycle.push(node.to_string());
            return Some(cycle);
        }
        if visited.contains(node) {
            return None;
        }

        visited.insert(node.to_string());
        stack.push(node.to_string());

        for dep in self.dependencies_of(node) {
            if let Some(cycle) = self.find_cycle_util(&dep.target, visited, stack) {
                return Some(cycle);
            }
        }

        stack.pop();
        None
    }

    /// Order nodes so that every resource comes after its dependencies
    ///
    /// Returns `None` when the graph has a cycle. Ties are broken by logical id.
    pub fn topological_order(&self) -> Option<Vec<String>> {
        let mut remaining: BTreeMap<&str, usize> = self
            .nodes
            .iter()
            .map(|n| (n.as_str(), self.dependencies_of(n).len()))
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        loop {
            let ready: Vec<&str> = remaining
                .iter()
                .filter(|(_, count)| **count == 0)
                .map(|(n, _)| *n)
                .collect();
            if ready.is_empty() {
                break;
            }
            for node in ready {
                remaining.remove(node);
                order.push(node.to_string());
                for dependent in self.dependents_of(node) {
                    if let Some(count) = remaining.get_mut(dependent.as_str()) {
                        *count -= 1;
                    }
                }
            }
        }

        if remaining.is_empty() {
            Some(order)
        } else {
            None
        }
    }
}
