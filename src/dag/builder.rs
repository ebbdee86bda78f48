// src/dag/builder.rs

//! Graph builder: turns a decomposition into an executable plan.
//!
//! Two input shapes are accepted:
//! - a flat list of [`UnitSpec`]s
//! - a hierarchical issue tree ([`IssueNode`]), where only leaves are
//!   executable and every node with children is a grouping label
//!
//! Both are reduced to the same candidate list and then validated: closed
//! leaves are dropped, dependencies are resolved, cycles and oversized
//! units are rejected, and a strategy is chosen from the unit count and
//! scope overlap.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dag::DagGraph;
use crate::errors::{Result, WorkgateError};
use crate::plan::{Plan, WorkUnit};
use crate::tracker::{IssueNode, IssueTracker};
use crate::types::{GroupNumber, SizeMetrics, SourceState, Strategy, UnitId, UnitStatus};

/// Unit count at which plans switch to isolated worktrees.
const ISOLATION_THRESHOLD: usize = 5;

/// Largest set of files that, when every unit works inside it, makes
/// exclusive per-unit ownership impossible.
const HOT_FILE_LIMIT: usize = 2;

/// One entry of a flat decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitSpec {
    pub id: UnitId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scope_files: Vec<String>,
    /// Parallel-dispatch group; defaults to 1.
    #[serde(default)]
    pub group: Option<u32>,
    #[serde(default)]
    pub blocked_by: Vec<UnitId>,
    #[serde(default)]
    pub size_metrics: SizeMetrics,
    #[serde(default)]
    pub state: SourceState,
}

/// A leaf on its way to becoming a [`WorkUnit`].
#[derive(Debug, Clone)]
struct Candidate {
    id: UnitId,
    title: String,
    description: String,
    scope_files: Vec<String>,
    group_number: GroupNumber,
    blocked_by: Vec<UnitId>,
    size_metrics: SizeMetrics,
    state: SourceState,
}

/// Builds validated [`Plan`]s.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    name: String,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Build from a flat list, in declaration order.
    pub fn from_units(&self, specs: Vec<UnitSpec>) -> Result<Plan> {
        let mut next_index: HashMap<u32, u32> = HashMap::new();
        let mut candidates = Vec::with_capacity(specs.len());

        for spec in specs {
            let group = spec.group.unwrap_or(1);
            let index = if spec.state == SourceState::Closed {
                0
            } else {
                let slot = next_index.entry(group).or_insert(0);
                *slot += 1;
                *slot
            };

            candidates.push(Candidate {
                id: spec.id,
                title: spec.title,
                description: spec.description,
                scope_files: spec.scope_files,
                group_number: GroupNumber::new(group, index),
                blocked_by: spec.blocked_by,
                size_metrics: spec.size_metrics,
                state: spec.state,
            });
        }

        self.finish(candidates, HashMap::new())
    }

    /// Build from a forest of issue trees.
    pub fn from_tree(&self, roots: &[IssueNode]) -> Result<Plan> {
        let mut walk = TreeWalk::default();
        for root in roots {
            if root.is_leaf() {
                walk.counter += 1;
                let group = walk.counter;
                walk.push_leaf(root, group, 1);
            } else {
                walk.visit_label(root);
            }
        }

        self.finish(walk.candidates, walk.labels)
    }

    /// Build from the dependency tree the tracker reports under `root`.
    pub async fn from_tracker(&self, tracker: &dyn IssueTracker, root: &str) -> Result<Plan> {
        let tree = tracker.query_dependency_tree(root).await?;
        self.from_tree(std::slice::from_ref(&tree))
    }

    fn finish(
        &self,
        candidates: Vec<Candidate>,
        labels: HashMap<UnitId, Vec<UnitId>>,
    ) -> Result<Plan> {
        let mut seen: HashSet<&str> = HashSet::new();
        for c in &candidates {
            if !seen.insert(c.id.as_str()) || labels.contains_key(&c.id) {
                return Err(WorkgateError::DuplicateUnit(c.id.clone()));
            }
        }

        let closed: HashSet<UnitId> = candidates
            .iter()
            .filter(|c| c.state == SourceState::Closed)
            .map(|c| c.id.clone())
            .collect();
        let open: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| c.state != SourceState::Closed)
            .collect();
        let open_ids: HashSet<UnitId> = open.iter().map(|c| c.id.clone()).collect();

        if !closed.is_empty() {
            debug!(count = closed.len(), "excluding closed leaves from plan");
        }

        let mut units = Vec::with_capacity(open.len());
        for c in open {
            let blocked_by = resolve_dependencies(&c, &open_ids, &closed, &labels)?;
            let mut unit = WorkUnit::new(c.id, c.title);
            unit.description = c.description;
            unit.scope_files = c.scope_files;
            unit.group_number = c.group_number;
            unit.blocked_by = blocked_by;
            unit.size_metrics = c.size_metrics;
            unit.status = UnitStatus::Pending;
            units.push(unit);
        }

        let graph = DagGraph::from_edges(units.iter().map(|u| {
            (
                u.id.as_str(),
                u.blocked_by.iter().map(String::as_str).collect::<Vec<_>>(),
            )
        }));
        graph.check_acyclic()?;

        for unit in &units {
            if let Some(reason) = unit.size_metrics.ceiling_violation(unit.scope_files.len()) {
                return Err(WorkgateError::OversizedUnit {
                    unit: unit.id.clone(),
                    reason,
                });
            }
        }

        if units.is_empty() {
            return Err(WorkgateError::EmptyPlan);
        }

        let strategy = select_strategy(&units);
        info!(
            plan = %self.name,
            units = units.len(),
            %strategy,
            "built executable plan"
        );

        Plan::new(self.name.clone(), strategy, units)
    }
}

/// Map declared dependencies onto executable units.
///
/// - an open leaf is kept
/// - a closed leaf is already satisfied and dropped
/// - a grouping label expands to every open leaf beneath it
/// - anything else is an unknown reference
fn resolve_dependencies(
    c: &Candidate,
    open: &HashSet<UnitId>,
    closed: &HashSet<UnitId>,
    labels: &HashMap<UnitId, Vec<UnitId>>,
) -> Result<BTreeSet<UnitId>> {
    let mut resolved = BTreeSet::new();

    for dep in &c.blocked_by {
        if open.contains(dep) {
            resolved.insert(dep.clone());
        } else if closed.contains(dep) {
            continue;
        } else if let Some(leaves) = labels.get(dep) {
            resolved.extend(leaves.iter().filter(|l| open.contains(*l)).cloned());
        } else {
            return Err(WorkgateError::UnknownDependency {
                unit: c.id.clone(),
                dep: dep.clone(),
            });
        }
    }

    Ok(resolved)
}

/// Pick the dispatch strategy for a freshly built plan.
///
/// 1 unit -> single-unit, 2-4 -> shared-branch, 5+ -> isolated-worktrees,
/// except that when every unit works inside the same one or two files,
/// isolation buys nothing and shared-branch is used instead.
pub fn select_strategy(units: &[WorkUnit]) -> Strategy {
    match units.len() {
        0 | 1 => Strategy::SingleUnit,
        n if n < ISOLATION_THRESHOLD => Strategy::SharedBranch,
        _ if all_on_hot_files(units) => {
            debug!("all units share the same few files; forcing shared-branch");
            Strategy::SharedBranch
        }
        _ => Strategy::IsolatedWorktrees,
    }
}

fn all_on_hot_files(units: &[WorkUnit]) -> bool {
    if units.iter().any(|u| u.scope_files.is_empty()) {
        return false;
    }
    let files: HashSet<&str> = units
        .iter()
        .flat_map(|u| u.scope_files.iter().map(String::as_str))
        .collect();
    files.len() <= HOT_FILE_LIMIT
}

/// Accumulator for the depth-first tree walk.
#[derive(Default)]
struct TreeWalk {
    counter: u32,
    candidates: Vec<Candidate>,
    /// Grouping label id -> every leaf beneath it.
    labels: HashMap<UnitId, Vec<UnitId>>,
}

impl TreeWalk {
    /// Walk a grouping label; returns the ids of all leaves beneath it.
    fn visit_label(&mut self, node: &IssueNode) -> Vec<UnitId> {
        let mut leaves = Vec::new();

        let group = if node.children.iter().any(IssueNode::is_leaf) {
            self.counter += 1;
            Some(self.counter)
        } else {
            None
        };

        let mut index = 0;
        for child in &node.children {
            if child.is_leaf() {
                let group = group.unwrap_or(self.counter);
                if child.state == SourceState::Closed {
                    self.push_leaf(child, group, 0);
                } else {
                    index += 1;
                    self.push_leaf(child, group, index);
                }
                leaves.push(child.id.clone());
            } else {
                leaves.extend(self.visit_label(child));
            }
        }

        self.labels.insert(node.id.clone(), leaves.clone());
        leaves
    }

    fn push_leaf(&mut self, node: &IssueNode, group: u32, index: u32) {
        self.candidates.push(Candidate {
            id: node.id.clone(),
            title: node.title.clone(),
            description: node.description.clone(),
            scope_files: node.scope_files.clone(),
            group_number: GroupNumber::new(group, index),
            blocked_by: node.blocked_by.clone(),
            size_metrics: node.size_metrics,
            state: node.state,
        });
    }
}
