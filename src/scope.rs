// src/scope.rs

//! File-scope matching.
//!
//! Scope entries may be literal file paths (`src/api.rs`), directories
//! (`src/api`, matching everything beneath) or globs (`src/**/*.rs`).
//! Every comparison here errs towards "overlapping": an ambiguous answer
//! must never let two units share a file or let a stale gate result stand.

use std::path::Path;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Normalise a repository-relative path for comparison.
pub fn normalize(path: &str) -> String {
    let trimmed = path.trim().replace('\\', "/");
    let trimmed = trimmed.trim_start_matches("./").trim_end_matches('/');
    trimmed.to_string()
}

fn is_glob(entry: &str) -> bool {
    entry.contains(['*', '?', '[', '{'])
}

/// Component-wise prefix test, so `src/api` covers `src/api/x.rs` but not
/// `src/apix.rs`.
fn is_path_prefix(prefix: &str, path: &str) -> bool {
    Path::new(path).starts_with(Path::new(prefix))
}

/// Whether two scope entries may refer to a common file.
pub fn entries_overlap(a: &str, b: &str) -> bool {
    let (a, b) = (normalize(a), normalize(b));

    if a.is_empty() || b.is_empty() {
        return true;
    }
    if a == b || is_path_prefix(&a, &b) || is_path_prefix(&b, &a) {
        return true;
    }

    match (is_glob(&a), is_glob(&b)) {
        (false, false) => false,
        (true, false) => glob_matches(&a, &b),
        (false, true) => glob_matches(&b, &a),
        // Two patterns: no cheap exact answer.
        (true, true) => true,
    }
}

fn glob_matches(pattern: &str, path: &str) -> bool {
    match Glob::new(pattern) {
        Ok(glob) => {
            let matcher = glob.compile_matcher();
            matcher.is_match(path) || Path::new(path).ancestors().any(|p| matcher.is_match(p))
        }
        Err(_) => true,
    }
}

/// Whether two scopes may touch a common file. An empty scope is undeclared
/// and therefore overlaps everything.
pub fn scopes_overlap<A, B>(a: &[A], b: &[B]) -> bool
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    if a.is_empty() || b.is_empty() {
        return true;
    }
    a.iter()
        .any(|x| b.iter().any(|y| entries_overlap(x.as_ref(), y.as_ref())))
}

/// Compiled form of a unit's declared scope, for checking worker output.
#[derive(Debug, Clone)]
pub struct ScopeMatcher {
    entries: Vec<String>,
    set: GlobSet,
}

impl ScopeMatcher {
    pub fn new<S: AsRef<str>>(entries: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut normalized = Vec::with_capacity(entries.len());

        for entry in entries {
            let entry = normalize(entry.as_ref());
            if entry.is_empty() {
                continue;
            }
            builder.add(
                Glob::new(&entry).with_context(|| format!("invalid scope pattern '{entry}'"))?,
            );
            if !is_glob(&entry) {
                // A plain entry may name a directory.
                builder.add(
                    Glob::new(&format!("{entry}/**"))
                        .with_context(|| format!("invalid scope pattern '{entry}'"))?,
                );
            }
            normalized.push(entry);
        }

        let set = builder.build().context("building scope matcher")?;
        Ok(Self {
            entries: normalized,
            set,
        })
    }

    /// Whether the unit declared any scope at all.
    pub fn is_declared(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        !self.is_declared() || self.set.is_match(normalize(path))
    }

    /// Files from `modified` that fall outside the declared scope.
    pub fn violations<S: AsRef<str>>(&self, modified: &[S]) -> Vec<String> {
        modified
            .iter()
            .map(|p| p.as_ref())
            .filter(|p| !self.contains(p))
            .map(str::to_string)
            .collect()
    }
}
