//! Dependency-ordered module sorting
//!
//! Install walks modules dependencies-first; uninstall walks the same order
//! reversed. The sort is stable: ties break by the order modules were first
//! reached, so repeated runs produce identical migration output. A cycle in
//! the declared graph is a fatal configuration error, detected before any
//! schema change happens.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{ModuleError, ModuleResult};
use crate::module::ModuleDescriptor;
use crate::registry::ModuleRegistry;

/// Compute the dependency-first order for a set of target modules.
///
/// The transitive closure of the targets' dependencies is included, except
/// modules listed in `already_installed` (versioned names), which count as
/// satisfied.
pub fn sort_modules(
    registry: &ModuleRegistry,
    targets: &[Arc<ModuleDescriptor>],
    already_installed: &[String],
) -> ModuleResult<Vec<Arc<ModuleDescriptor>>> {
    let installed: HashSet<&str> = already_installed.iter().map(String::as_str).collect();

    // Transitive closure in first-seen order.
    let mut order: Vec<Arc<ModuleDescriptor>> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut worklist: Vec<Arc<ModuleDescriptor>> = targets.to_vec();
    while let Some(module) = worklist.pop() {
        let name = module.versioned_name();
        if seen.contains(&name) || installed.contains(name.as_str()) {
            continue;
        }
        seen.insert(name.clone());
        order.push(module.clone());
        for dep in module.dependencies() {
            if installed.contains(dep.as_str()) || seen.contains(dep) {
                continue;
            }
            let resolved =
                registry
                    .get(dep)
                    .cloned()
                    .ok_or_else(|| ModuleError::MissingDependency {
                        module: name.clone(),
                        dependency: dep.clone(),
                    })?;
            worklist.push(resolved);
        }
    }
    // The worklist is LIFO; restore declaration order (targets as given,
    // discovered dependencies by registration order).
    order.sort_by_key(|m| declaration_rank(registry, targets, m));

    // Stable Kahn: repeatedly emit the earliest module whose dependencies
    // are all satisfied.
    let mut sorted: Vec<Arc<ModuleDescriptor>> = Vec::new();
    let mut emitted: HashSet<String> = HashSet::new();
    let mut remaining: Vec<Arc<ModuleDescriptor>> = order;
    while !remaining.is_empty() {
        let position = remaining.iter().position(|module| {
            module.dependencies().iter().all(|dep| {
                emitted.contains(dep)
                    || installed.contains(dep.as_str())
                    || !remaining.iter().any(|m| m.versioned_name() == *dep)
            })
        });
        match position {
            Some(idx) => {
                let module = remaining.remove(idx);
                emitted.insert(module.versioned_name());
                sorted.push(module);
            }
            None => {
                return Err(ModuleError::DependencyCycle {
                    cycle: find_cycle(&remaining),
                });
            }
        }
    }
    Ok(sorted)
}

fn declaration_rank(
    registry: &ModuleRegistry,
    targets: &[Arc<ModuleDescriptor>],
    module: &Arc<ModuleDescriptor>,
) -> (usize, usize) {
    let name = module.versioned_name();
    match targets.iter().position(|t| t.versioned_name() == name) {
        Some(rank) => (rank, 0),
        None => {
            let registered = registry
                .all()
                .iter()
                .position(|m| m.versioned_name() == name)
                .unwrap_or(usize::MAX);
            (targets.len(), registered)
        }
    }
}

/// Walk the stuck subgraph to name an actual cycle for the error message.
fn find_cycle(remaining: &[Arc<ModuleDescriptor>]) -> Vec<String> {
    let by_name: HashMap<String, &Arc<ModuleDescriptor>> = remaining
        .iter()
        .map(|m| (m.versioned_name(), m))
        .collect();
    let start = remaining[0].versioned_name();
    let mut path = vec![start.clone()];
    let mut visited: HashSet<String> = HashSet::new();
    let mut current = start;
    loop {
        visited.insert(current.clone());
        let module = by_name[&current];
        let next = module
            .dependencies()
            .iter()
            .find(|dep| by_name.contains_key(*dep));
        match next {
            Some(dep) if visited.contains(dep) => {
                let cycle_start = path.iter().position(|n| n == dep).unwrap_or(0);
                let mut cycle: Vec<String> = path[cycle_start..].to_vec();
                cycle.push(dep.clone());
                return cycle;
            }
            Some(dep) => {
                path.push(dep.clone());
                current = dep.clone();
            }
            None => return path,
        }
    }
}
