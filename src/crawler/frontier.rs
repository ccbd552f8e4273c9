// src/crawler/frontier.rs - Breadth-first URL frontier with scope and revisit limits
use std::collections::HashSet;
use tracing::debug;
use url::Url;

use crate::scope_filter::{PathVisitCounter, ScopeFilter};
use super::model::FrontierEntry;

/// FIFO frontier. Entries are never removed, only marked visited.
#[derive(Debug, Clone)]
pub struct Frontier {
    entries: Vec<FrontierEntry>,
    cursor: usize,
    known: HashSet<String>,
    paths: PathVisitCounter,
    scope: ScopeFilter,
    max_depth: Option<usize>,
}

impl Frontier {
    pub fn new(scope: ScopeFilter, max_path_visits: usize, max_depth: Option<usize>) -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            known: HashSet::new(),
            paths: PathVisitCounter::new(max_path_visits),
            scope,
            max_depth,
        }
    }

    /// Enqueue a URL if it is admissible. Returns the canonical form when it was added.
    pub fn enqueue(&mut self, raw: &str, depth: usize, parent: Option<&str>) -> Option<String> {
        let mut url = Url::parse(raw).ok()?;
        url.set_fragment(None);

        if !self.scope.is_url_in_scope(&url) {
            debug!("Out of scope: {}", url);
            return None;
        }

        if let Some(max_depth) = self.max_depth {
            if depth > max_depth {
                return None;
            }
        }

        let canonical = url.to_string();
        if self.known.contains(&canonical) {
            return None;
        }

        if !self.paths.record(&url) {
            debug!("Path visit cap reached for {}", canonical);
            return None;
        }

        self.known.insert(canonical.clone());
        self.entries.push(FrontierEntry {
            url: canonical.clone(),
            depth,
            parent: parent.map(str::to_string),
            visited: false,
        });

        Some(canonical)
    }

    /// Pop up to `limit` pending entries, marking each visited immediately
    pub fn pop_batch(&mut self, limit: usize) -> Vec<FrontierEntry> {
        let mut batch = Vec::with_capacity(limit);

        while batch.len() < limit && self.cursor < self.entries.len() {
            let entry = &mut self.entries[self.cursor];
            self.cursor += 1;

            if entry.visited {
                continue;
            }
            entry.visited = true;
            batch.push(entry.clone());
        }

        batch
    }

    pub fn has_pending(&self) -> bool {
        self.entries[self.cursor..].iter().any(|e| !e.visited)
    }

    /// URLs still waiting to be visited, in queue order
    pub fn pending_urls(&self) -> Vec<String> {
        self.entries[self.cursor..].iter()
            .filter(|e| !e.visited)
            .map(|e| e.url.clone())
            .collect()
    }

    pub fn visited_count(&self) -> usize {
        self.entries.iter().filter(|e| e.visited).count()
    }

    pub fn entries(&self) -> &[FrontierEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<FrontierEntry> {
        self.entries
    }
}
