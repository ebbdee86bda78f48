// src/dag/graph.rs

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{Result, WorkgateError};
use crate::plan::Plan;
use crate::types::UnitId;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Units that must complete before this one can become ready.
    deps: Vec<UnitId>,
    /// Units that list this one in their `blocked_by`.
    dependents: Vec<UnitId>,
}

/// In-memory dependency graph keyed by unit id.
///
/// Node order follows the order units were added, so every traversal is
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct DagGraph {
    order: Vec<UnitId>,
    nodes: HashMap<UnitId, DagNode>,
}

impl DagGraph {
    /// Build from `(id, blocked_by)` pairs in declaration order.
    ///
    /// References to ids that are not part of the input are kept as deps but
    /// get no node; [`DagGraph::missing_dependencies`] reports them.
    pub fn from_edges<'a, I, D>(units: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, D)>,
        D: IntoIterator<Item = &'a str>,
    {
        let mut graph = DagGraph::default();

        for (id, deps) in units {
            graph.order.push(id.to_string());
            graph.nodes.insert(
                id.to_string(),
                DagNode {
                    deps: deps.into_iter().map(str::to_string).collect(),
                    dependents: Vec::new(),
                },
            );
        }

        for id in graph.order.clone() {
            let deps = graph
                .nodes
                .get(&id)
                .map(|n| n.deps.clone())
                .unwrap_or_default();

            for dep in deps {
                if let Some(dep_node) = graph.nodes.get_mut(&dep) {
                    dep_node.dependents.push(id.clone());
                }
            }
        }

        graph
    }

    pub fn from_plan(plan: &Plan) -> Self {
        Self::from_edges(plan.units().iter().map(|u| {
            (
                u.id.as_str(),
                u.blocked_by.iter().map(String::as_str).collect::<Vec<_>>(),
            )
        }))
    }

    /// All unit ids in insertion order.
    pub fn units(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn dependencies_of(&self, id: &str) -> &[UnitId] {
        self.nodes
            .get(id)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependents_of(&self, id: &str) -> &[UnitId] {
        self.nodes
            .get(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// `(unit, dep)` pairs whose `dep` is not a node of this graph.
    pub fn missing_dependencies(&self) -> Vec<(UnitId, UnitId)> {
        let mut missing = Vec::new();
        for id in &self.order {
            for dep in self.dependencies_of(id) {
                if !self.nodes.contains_key(dep) {
                    missing.push((id.clone(), dep.clone()));
                }
            }
        }
        missing
    }

    /// Whether either unit (transitively) depends on the other.
    pub fn related(&self, a: &str, b: &str) -> bool {
        self.reaches(a, b) || self.reaches(b, a)
    }

    /// Whether `to` is reachable from `from` by following dependency edges.
    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut stack: Vec<&str> = vec![from];
        let mut visited: HashSet<&str> = HashSet::new();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            for dep in self.dependencies_of(id) {
                if dep == to {
                    return true;
                }
                stack.push(dep.as_str());
            }
        }

        false
    }

    /// Reject the graph if dependency edges form a cycle.
    ///
    /// Depth-first traversal with a `visiting` set: meeting a node that is
    /// still on the current path means a back edge. The error names the
    /// cycle, e.g. `A -> B -> A`.
    pub fn check_acyclic(&self) -> Result<()> {
        let mut visiting: HashSet<&str> = HashSet::new();
        let mut done: HashSet<&str> = HashSet::new();
        let mut path: Vec<&str> = Vec::new();

        for id in &self.order {
            self.visit(id, &mut visiting, &mut done, &mut path)?;
        }

        Ok(())
    }

    fn visit<'a>(
        &'a self,
        id: &'a str,
        visiting: &mut HashSet<&'a str>,
        done: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Result<()> {
        if done.contains(id) {
            return Ok(());
        }

        if visiting.contains(id) {
            let start = path.iter().position(|p| *p == id).unwrap_or(0);
            let mut cycle: Vec<&str> = path[start..].to_vec();
            cycle.push(id);
            return Err(WorkgateError::CyclicDependency(format!(
                "cycle detected in unit graph: {}",
                cycle.join(" -> ")
            )));
        }

        visiting.insert(id);
        path.push(id);

        for dep in self.dependencies_of(id) {
            if self.nodes.contains_key(dep) {
                self.visit(dep, visiting, done, path)?;
            }
        }

        path.pop();
        visiting.remove(id);
        done.insert(id);
        Ok(())
    }

    /// A valid execution order (dependencies first), for dry-run output.
    pub fn topological_order(&self) -> Result<Vec<UnitId>> {
        // Edge direction: dep -> unit
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for id in &self.order {
            graph.add_node(id.as_str());
        }
        for id in &self.order {
            for dep in self.dependencies_of(id) {
                if self.nodes.contains_key(dep) {
                    graph.add_edge(dep.as_str(), id.as_str(), ());
                }
            }
        }

        match toposort(&graph, None) {
            Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
            Err(cycle) => Err(WorkgateError::CyclicDependency(format!(
                "cycle detected in unit graph involving unit '{}'",
                cycle.node_id()
            ))),
        }
    }
}
