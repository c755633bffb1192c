//! Static dependency graph over phase ids.
//!
//! Edges point from a phase to the phases it depends on. The graph is
//! validated once at load time (unknown edges, cycles); execution-time
//! checks only ever ask about membership and reachability.

use crate::error::{Result, SyncError};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mark {
    New,
    Active,
    Done,
}

#[derive(Debug, Clone, Default)]
pub struct PhaseGraph {
    deps: BTreeMap<String, Vec<String>>,
}

impl PhaseGraph {
    pub fn new() -> Self {
        PhaseGraph::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, dependencies: Vec<String>) {
        self.deps.insert(id.into(), dependencies);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.deps.contains_key(id)
    }

    pub fn dependencies(&self, id: &str) -> &[String] {
        self.deps.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.deps.keys()
    }

    pub fn len(&self) -> usize {
        self.deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    /// Every dependency must name a phase that exists.
    pub fn validate_edges(&self) -> Result<()> {
        for (id, deps) in &self.deps {
            for dep in deps {
                if !self.deps.contains_key(dep) {
                    return Err(SyncError::Config(format!(
                        "phase '{id}' depends on unknown phase '{dep}'"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Depth-first cycle check. The error names one phase on the cycle.
    pub fn detect_cycle(&self) -> Result<()> {
        let mut marks: BTreeMap<&str, Mark> =
            self.deps.keys().map(|k| (k.as_str(), Mark::New)).collect();
        for id in self.deps.keys() {
            self.visit(id, &mut marks)?;
        }
        Ok(())
    }

    fn visit<'a>(&'a self, id: &'a str, marks: &mut BTreeMap<&'a str, Mark>) -> Result<()> {
        match marks.get(id).copied() {
            // Unknown ids are validate_edges' problem, not a cycle.
            Some(Mark::Done) | None => return Ok(()),
            Some(Mark::Active) => {
                return Err(SyncError::Config(format!(
                    "phase dependency cycle through '{id}'"
                )))
            }
            Some(Mark::New) => {}
        }
        marks.insert(id, Mark::Active);
        for dep in self.dependencies(id) {
            self.visit(dep, marks)?;
        }
        marks.insert(id, Mark::Done);
        Ok(())
    }

    /// Every phase reachable from `id` along dependency edges, `id` excluded.
    pub fn transitive_dependencies(&self, id: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: Vec<&str> = self.dependencies(id).iter().map(String::as_str).collect();
        while let Some(next) = queue.pop() {
            if seen.insert(next.to_string()) {
                queue.extend(self.dependencies(next).iter().map(String::as_str));
            }
        }
        seen
    }

    /// Dependencies-first ordering of all phases. Errors on cycles.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        self.detect_cycle()?;
        let mut order = Vec::with_capacity(self.deps.len());
        let mut placed = BTreeSet::new();
        // Quadratic pass is fine at migration-plan scale.
        while order.len() < self.deps.len() {
            let mut advanced = false;
            for (id, deps) in &self.deps {
                if placed.contains(id) {
                    continue;
                }
                if deps.iter().all(|d| placed.contains(d) || !self.contains(d)) {
                    order.push(id.clone());
                    placed.insert(id.clone());
                    advanced = true;
                }
            }
            if !advanced {
                return Err(SyncError::Config(
                    "phase graph has unsatisfiable dependencies".to_string(),
                ));
            }
        }
        Ok(order)
    }
}
