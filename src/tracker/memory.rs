// src/tracker/memory.rs

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{Result, WorkgateError};
use crate::exec::BoxFuture;
use crate::types::SourceState;

use super::{Dependency, DependencyKind, Issue, IssueFields, IssueNode, IssueTracker};

/// Serializable content of a tracker: issues in tracker order plus their
/// dependency links. This is also the `tree` decomposition input format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSnapshot {
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

#[derive(Debug, Default)]
struct Inner {
    issues: Vec<Issue>,
    index: HashMap<String, usize>,
    dependencies: Vec<Dependency>,
    next_id: u32,
}

impl Inner {
    fn get(&self, id: &str) -> Result<&Issue> {
        self.index
            .get(id)
            .map(|&pos| &self.issues[pos])
            .ok_or_else(|| WorkgateError::IssueNotFound(id.to_string()))
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Issue> {
        match self.index.get(id) {
            Some(&pos) => Ok(&mut self.issues[pos]),
            None => Err(WorkgateError::IssueNotFound(id.to_string())),
        }
    }

    fn insert(&mut self, issue: Issue) -> Result<()> {
        if self.index.contains_key(&issue.id) {
            return Err(WorkgateError::ValidationError(format!(
                "issue '{}' already exists",
                issue.id
            )));
        }
        self.index.insert(issue.id.clone(), self.issues.len());
        self.issues.push(issue);
        Ok(())
    }

    fn children(&self, id: &str) -> Vec<Issue> {
        self.issues
            .iter()
            .filter(|i| i.parent.as_deref() == Some(id))
            .cloned()
            .collect()
    }

    fn blocked_by(&self, id: &str) -> Vec<String> {
        self.dependencies
            .iter()
            .filter(|d| d.issue == id && d.kind == DependencyKind::Blocks)
            .map(|d| d.depends_on.clone())
            .collect()
    }

    fn list_children(&self, id: &str) -> Result<Vec<Issue>> {
        self.get(id)?;
        Ok(self.children(id))
    }

    fn create(&mut self, title: &str, description: &str, parent: Option<&str>) -> Result<String> {
        if let Some(parent) = parent {
            self.get(parent)?;
        }

        self.next_id += 1;
        let id = format!("ISSUE-{}", self.next_id);
        self.insert(Issue {
            id: id.clone(),
            title: title.to_string(),
            description: description.to_string(),
            state: SourceState::Open,
            parent: parent.map(str::to_string),
            scope_files: Vec::new(),
            size_metrics: Default::default(),
        })?;

        debug!(issue = %id, "created issue");
        Ok(id)
    }

    fn update(&mut self, id: &str, fields: IssueFields) -> Result<()> {
        let issue = self.get_mut(id)?;
        if let Some(title) = fields.title {
            issue.title = title;
        }
        if let Some(description) = fields.description {
            issue.description = description;
        }
        if let Some(state) = fields.state {
            issue.state = state;
        }
        if let Some(scope) = fields.scope_files {
            issue.scope_files = scope;
        }
        if let Some(size) = fields.size_metrics {
            issue.size_metrics = size;
        }
        Ok(())
    }

    fn add_dependency(&mut self, issue: &str, depends_on: &str, kind: DependencyKind) -> Result<()> {
        self.get(issue)?;
        self.get(depends_on)?;

        let dep = Dependency {
            issue: issue.to_string(),
            depends_on: depends_on.to_string(),
            kind,
        };
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
        Ok(())
    }

    fn tree(&self, id: &str, depth: usize) -> Result<IssueNode> {
        if depth > self.issues.len() {
            return Err(WorkgateError::ValidationError(format!(
                "parent links under '{id}' form a loop"
            )));
        }

        let issue = self.get(id)?;
        let children = self
            .children(id)
            .iter()
            .map(|child| self.tree(&child.id, depth + 1))
            .collect::<Result<Vec<_>>>()?;

        Ok(IssueNode {
            id: issue.id.clone(),
            title: issue.title.clone(),
            description: issue.description.clone(),
            state: issue.state,
            scope_files: issue.scope_files.clone(),
            size_metrics: issue.size_metrics,
            blocked_by: self.blocked_by(id),
            children,
        })
    }
}

/// In-process issue tracker.
#[derive(Debug, Default)]
pub struct MemoryTracker {
    inner: Mutex<Inner>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot, rejecting duplicate ids and dangling references.
    pub fn from_snapshot(snapshot: TrackerSnapshot) -> Result<Self> {
        let mut inner = Inner::default();
        for issue in snapshot.issues {
            inner.insert(issue)?;
        }

        for issue in &inner.issues {
            if let Some(parent) = &issue.parent {
                inner.get(parent)?;
            }
        }
        for dep in &snapshot.dependencies {
            inner.get(&dep.issue)?;
            inner.get(&dep.depends_on)?;
        }
        inner.dependencies = snapshot.dependencies;

        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        let inner = self.lock();
        TrackerSnapshot {
            issues: inner.issues.clone(),
            dependencies: inner.dependencies.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means another caller panicked mid-update of
        // plain data; keep serving it.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl IssueTracker for MemoryTracker {
    fn fetch_issue(&self, id: &str) -> BoxFuture<'_, Result<Issue>> {
        let result = self.lock().get(id).cloned();
        Box::pin(async move { result })
    }

    fn list_children(&self, id: &str) -> BoxFuture<'_, Result<Vec<Issue>>> {
        let result = self.lock().list_children(id);
        Box::pin(async move { result })
    }

    fn create_issue(
        &self,
        title: &str,
        description: &str,
        parent: Option<&str>,
    ) -> BoxFuture<'_, Result<String>> {
        let result = self.lock().create(title, description, parent);
        Box::pin(async move { result })
    }

    fn update_issue(&self, id: &str, fields: IssueFields) -> BoxFuture<'_, Result<()>> {
        let result = self.lock().update(id, fields);
        Box::pin(async move { result })
    }

    fn add_dependency(
        &self,
        issue: &str,
        depends_on: &str,
        kind: DependencyKind,
    ) -> BoxFuture<'_, Result<()>> {
        let result = self.lock().add_dependency(issue, depends_on, kind);
        Box::pin(async move { result })
    }

    fn query_dependency_tree(&self, root: &str) -> BoxFuture<'_, Result<IssueNode>> {
        let result = self.lock().tree(root, 0);
        Box::pin(async move { result })
    }

    fn close_issue(&self, id: &str) -> BoxFuture<'_, Result<()>> {
        let result = self
            .lock()
            .update(id, IssueFields {
                state: Some(SourceState::Closed),
                ..IssueFields::default()
            });
        if result.is_ok() {
            info!(issue = %id, "closed issue");
        }
        Box::pin(async move { result })
    }
}
