// src/tracker/mod.rs

//! Task-tracker bindings.
//!
//! The engine never implements an issue store; it talks to one through
//! [`IssueTracker`]. The graph builder consumes `query_dependency_tree`, and
//! the orchestrator calls `close_issue` when a unit completes.
//!
//! [`MemoryTracker`] is an in-process implementation used for file-based
//! decompositions and tests.

pub mod memory;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::exec::BoxFuture;
use crate::types::{SizeMetrics, SourceState};

pub use memory::{MemoryTracker, TrackerSnapshot};

/// An issue as the tracker reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub state: SourceState,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub scope_files: Vec<String>,
    #[serde(default)]
    pub size_metrics: SizeMetrics,
}

/// Partial update for [`IssueTracker::update_issue`]; `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub state: Option<SourceState>,
    pub scope_files: Option<Vec<String>>,
    pub size_metrics: Option<SizeMetrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// The dependent issue cannot start until the other one is done.
    Blocks,
    /// Informational link; never affects scheduling.
    Related,
}

/// `issue` depends on `depends_on`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub issue: String,
    pub depends_on: String,
    pub kind: DependencyKind,
}

/// Hierarchical view of an issue and everything beneath it.
///
/// A node with children is a grouping label; a node without children is an
/// executable leaf.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueNode {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub state: SourceState,
    #[serde(default)]
    pub scope_files: Vec<String>,
    #[serde(default)]
    pub size_metrics: SizeMetrics,
    /// Ids this node is blocked by (`blocks` dependencies only).
    #[serde(default)]
    pub blocked_by: Vec<String>,
    #[serde(default)]
    pub children: Vec<IssueNode>,
}

impl IssueNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Operations the engine invokes on an external issue store.
pub trait IssueTracker: Send + Sync {
    fn fetch_issue(&self, id: &str) -> BoxFuture<'_, Result<Issue>>;

    /// Direct children of `id`, in tracker order.
    fn list_children(&self, id: &str) -> BoxFuture<'_, Result<Vec<Issue>>>;

    /// Create an issue and return its id.
    fn create_issue(
        &self,
        title: &str,
        description: &str,
        parent: Option<&str>,
    ) -> BoxFuture<'_, Result<String>>;

    fn update_issue(&self, id: &str, fields: IssueFields) -> BoxFuture<'_, Result<()>>;

    fn add_dependency(
        &self,
        issue: &str,
        depends_on: &str,
        kind: DependencyKind,
    ) -> BoxFuture<'_, Result<()>>;

    fn query_dependency_tree(&self, root: &str) -> BoxFuture<'_, Result<IssueNode>>;

    fn close_issue(&self, id: &str) -> BoxFuture<'_, Result<()>>;
}
