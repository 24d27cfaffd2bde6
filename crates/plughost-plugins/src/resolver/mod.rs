//! Dependency Resolver
//!
//! Pure computation over registered plugin metadata: dependency-first load
//! order, cycle detection and version range checks. Traversals use an
//! explicit stack so deep chains cannot overflow.

pub mod version;

use plughost_core::Error;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::manifest::PluginMetadata;

/// Outcome of [`DependencyResolver::resolve`].
///
/// `resolved` is not rolled back on failure: ids appended before the fault
/// remain, next to the fault message in `errors`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolveResult {
    /// Dependencies strictly before dependents, each id at most once
    pub resolved: Vec<String>,
    pub errors: Vec<String>,
}

impl ResolveResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

struct Frame<'a> {
    id: &'a str,
    deps: Vec<(&'a str, &'a str)>,
    next: usize,
}

/// Dependency Resolver
#[derive(Debug, Default)]
pub struct DependencyResolver {
    plugins: HashMap<String, PluginMetadata>,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register plugin metadata, replacing any previous entry for the id
    pub fn register_plugin(&mut self, metadata: PluginMetadata) {
        self.plugins.insert(metadata.id.clone(), metadata);
    }

    pub fn unregister_plugin(&mut self, id: &str) -> bool {
        self.plugins.remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&PluginMetadata> {
        self.plugins.get(id)
    }

    /// Registered ids, sorted
    pub fn plugin_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.plugins.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Compute a dependency-first order for `plugin_id`.
    ///
    /// A dependency is visited only after its version range is checked. An
    /// unknown plugin or incompatible version stops the traversal; whatever
    /// was resolved up to that point is kept. Cycles are not reported here.
    pub fn resolve(&self, plugin_id: &str) -> ResolveResult {
        let mut result = ResolveResult::default();
        if let Err(e) = self.resolve_into(plugin_id, &mut result.resolved) {
            result.errors.push(e.to_string());
        }
        result
    }

    fn resolve_into(&self, plugin_id: &str, resolved: &mut Vec<String>) -> Result<(), Error> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<Frame<'_>> = Vec::new();

        let root = self
            .plugins
            .get(plugin_id)
            .ok_or_else(|| Error::DependencyNotFound(plugin_id.to_string()))?;
        visited.insert(root.id.as_str());
        stack.push(self.frame(root));

        while let Some(frame) = stack.last_mut() {
            let Some(&(dep_id, range)) = frame.deps.get(frame.next) else {
                resolved.push(frame.id.to_string());
                stack.pop();
                continue;
            };
            frame.next += 1;

            let dep = self
                .plugins
                .get(dep_id)
                .ok_or_else(|| Error::DependencyNotFound(dep_id.to_string()))?;
            if !version::satisfies(&dep.version, range) {
                return Err(Error::VersionMismatch {
                    plugin: dep_id.to_string(),
                    required: range.to_string(),
                });
            }
            if visited.insert(dep.id.as_str()) {
                stack.push(self.frame(dep));
            }
        }

        Ok(())
    }

    fn frame<'a>(&self, metadata: &'a PluginMetadata) -> Frame<'a> {
        Frame {
            id: metadata.id.as_str(),
            deps: metadata.dependency_ranges().collect(),
            next: 0,
        }
    }

    /// Find dependency cycles reachable from `start_id`.
    ///
    /// Each cycle is the path from `start_id` to the repeated id, joined with
    /// " -> ". Exploration continues after a cycle is found. Cycles not
    /// reachable from `start_id` are not reported.
    pub fn detect_cycles(&self, start_id: &str) -> Vec<String> {
        let mut cycles = Vec::new();
        let mut in_progress: HashSet<&str> = HashSet::new();
        let mut done: HashSet<&str> = HashSet::new();
        let mut stack: Vec<Frame<'_>> = Vec::new();

        self.enter(start_id, &mut stack, &mut in_progress, &done, &mut cycles);

        while let Some(frame) = stack.last_mut() {
            match frame.deps.get(frame.next) {
                Some(&(dep_id, _)) => {
                    frame.next += 1;
                    self.enter(dep_id, &mut stack, &mut in_progress, &done, &mut cycles);
                }
                None => {
                    let id = frame.id;
                    stack.pop();
                    in_progress.remove(id);
                    done.insert(id);
                }
            }
        }

        cycles
    }

    fn enter<'a>(
        &'a self,
        id: &'a str,
        stack: &mut Vec<Frame<'a>>,
        in_progress: &mut HashSet<&'a str>,
        done: &HashSet<&'a str>,
        cycles: &mut Vec<String>,
    ) {
        if in_progress.contains(id) {
            let mut path: Vec<&str> = stack.iter().map(|f| f.id).collect();
            path.push(id);
            cycles.push(path.join(" -> "));
            return;
        }
        if done.contains(id) {
            return;
        }
        in_progress.insert(id);
        match self.plugins.get(id) {
            Some(metadata) => stack.push(self.frame(metadata)),
            None => stack.push(Frame {
                id,
                deps: Vec::new(),
                next: 0,
            }),
        }
    }

    /// Run [`DependencyResolver::detect_cycles`] from every registered id,
    /// without duplicates
    pub fn detect_all_cycles(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut cycles = Vec::new();
        for id in self.plugin_ids() {
            for cycle in self.detect_cycles(&id) {
                if seen.insert(cycle.clone()) {
                    cycles.push(cycle);
                }
            }
        }
        cycles
    }

    /// Check a registered plugin's version against a range; false if unknown
    pub fn check_compatibility(&self, plugin_id: &str, required_range: &str) -> bool {
        self.plugins
            .get(plugin_id)
            .map_or(false, |p| version::satisfies(&p.version, required_range))
    }
}
