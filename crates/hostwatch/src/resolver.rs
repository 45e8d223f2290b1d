//! Parent-health resolution over the check dependency graph.

use crate::status::{CheckKey, HostStatus};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Resolves whether the parent chain of a check is healthy.
///
/// `parents` is the adjacency map built from `depends_on` references that
/// point at an existing check. Unresolvable references have no entry.
pub struct DependencyResolver<'a> {
    hosts: &'a [HostStatus],
    parents: &'a HashMap<CheckKey, CheckKey>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(hosts: &'a [HostStatus], parents: &'a HashMap<CheckKey, CheckKey>) -> Self {
        Self { hosts, parents }
    }

    /// True unless some ancestor is enabled, evaluated and failing.
    ///
    /// A missing, disabled or never-evaluated parent counts as healthy and
    /// ends the walk. A cycle also counts as healthy.
    pub fn is_healthy(&self, key: CheckKey) -> bool {
        let mut visited = HashSet::from([key]);
        let mut current = key;

        while let Some(&parent) = self.parents.get(&current) {
            if !visited.insert(parent) {
                warn!(host = key.host, check = key.check, "Dependency cycle detected, treating parent as healthy");
                return true;
            }
            let Some(status) = self
                .hosts
                .get(parent.host)
                .and_then(|h| h.checks.get(parent.check))
            else {
                return true;
            };
            if !status.enabled() || status.checked_at.is_none() {
                return true;
            }
            if !status.ok {
                return false;
            }
            current = parent;
        }
        true
    }
}

/// Find a cycle in an `id -> depends_on` edge map, returned as the chain of
/// IDs that closes on itself.
pub fn find_cycle<S: AsRef<str>>(edges: &HashMap<S, S>) -> Option<Vec<String>>
where
    S: std::hash::Hash + Eq,
{
    let lookup: HashMap<&str, &str> = edges
        .iter()
        .map(|(k, v)| (k.as_ref(), v.as_ref()))
        .collect();
    let mut cleared: HashSet<&str> = HashSet::new();

    let mut starts: Vec<&str> = lookup.keys().copied().collect();
    starts.sort_unstable();

    for start in starts {
        let mut path: Vec<&str> = Vec::new();
        let mut on_path: HashSet<&str> = HashSet::new();
        let mut current = start;

        loop {
            if cleared.contains(current) {
                break;
            }
            if !on_path.insert(current) {
                let from = path.iter().position(|id| *id == current).unwrap_or(0);
                let mut cycle: Vec<String> = path[from..].iter().map(|id| id.to_string()).collect();
                cycle.push(current.to_string());
                return Some(cycle);
            }
            path.push(current);
            match lookup.get(current) {
                Some(next) => current = *next,
                None => break,
            }
        }
        cleared.extend(path);
    }
    None
}
