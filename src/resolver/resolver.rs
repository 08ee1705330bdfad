//! # Startup order for named units.
//!
//! Two resolutions over the same graph (edge `dependency → dependent`):
//!
//! - [`DependencyResolver::resolve`] is lenient. Every node is seeded into the work queue in
//!   dependencies-first discovery order and emitted when popped. An edge pointing at an already
//!   emitted node is dropped with a `circular dependency` warning and a node whose in-degree never
//!   reached zero is reported as `unresolved`. The result always contains every unit exactly once.
//! - [`DependencyResolver::resolve_strict`] is plain Kahn over zero in-degree nodes and fails on
//!   unknown dependencies or cycles.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use crate::error::ResolverError;
use crate::resolver::manifest::{UnitManifest, load_manifests};

/// Orders units so that every unit comes after its dependencies.
///
/// # Example
/// ```
/// use taskcore::resolver::DependencyResolver;
///
/// let order = DependencyResolver::new()
///     .with_unit("guider", ["camera", "mount"])
///     .with_unit("camera", Vec::<String>::new())
///     .with_unit("mount", Vec::<String>::new())
///     .resolve();
/// assert_eq!(order, vec!["camera", "mount", "guider"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver {
    units: Vec<UnitManifest>,
}

struct Graph {
    nodes: Vec<String>,
    dependents: HashMap<String, Vec<String>>,
    indegree: HashMap<String, usize>,
}

impl Graph {
    fn build(units: &[UnitManifest]) -> Self {
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        let mut indegree: HashMap<String, usize> = HashMap::new();
        for unit in units {
            indegree.entry(unit.name.clone()).or_default();
            let mut seen = HashSet::new();
            for dep in unit.dependencies.iter().filter(|d| seen.insert(d.as_str())) {
                indegree.entry(dep.clone()).or_default();
                dependents.entry(dep.clone()).or_default().push(unit.name.clone());
                *indegree.entry(unit.name.clone()).or_default() += 1;
            }
        }
        Self {
            nodes: discovery_order(units),
            dependents,
            indegree,
        }
    }

    fn dependents_of(&self, node: &str) -> &[String] {
        self.dependents.get(node).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Depth-first, dependencies before dependents, units in input order.
fn discovery_order(units: &[UnitManifest]) -> Vec<String> {
    let by_name: HashMap<&str, &UnitManifest> =
        units.iter().map(|u| (u.name.as_str(), u)).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut order = Vec::new();
    // (node, index of the next dependency to walk)
    let mut stack: Vec<(&str, usize)> = Vec::new();

    for unit in units {
        if !seen.insert(unit.name.as_str()) {
            continue;
        }
        stack.push((unit.name.as_str(), 0));
        while let Some((node, next)) = stack.last_mut() {
            let deps = by_name
                .get(*node)
                .map(|&u| u.dependencies.as_slice())
                .unwrap_or_default();
            match deps.get(*next) {
                Some(dep) => {
                    *next += 1;
                    if seen.insert(dep.as_str()) {
                        stack.push((dep.as_str(), 0));
                    }
                }
                None => {
                    order.push((*node).to_owned());
                    stack.pop();
                }
            }
        }
    }
    order
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver over the manifests found in `<dir>/*/package.json`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, ResolverError> {
        Ok(Self {
            units: load_manifests(dir)?,
        })
    }

    pub fn add_unit<I, S>(&mut self, name: impl Into<String>, dependencies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.units.push(UnitManifest::new(name, dependencies));
    }

    pub fn with_unit<I, S>(mut self, name: impl Into<String>, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_unit(name, dependencies);
        self
    }

    pub fn add_manifest(&mut self, manifest: UnitManifest) {
        self.units.push(manifest);
    }

    pub fn units(&self) -> &[UnitManifest] {
        &self.units
    }

    /// Best-effort order; never fails. Cycles and missing units are logged.
    ///
    /// Names that are only ever referenced as a dependency are part of the order too.
    pub fn resolve(&self) -> Vec<String> {
        let mut graph = Graph::build(&self.units);
        let mut queue: VecDeque<String> = graph.nodes.iter().cloned().collect();
        let mut visited: HashSet<String> = HashSet::with_capacity(graph.nodes.len());
        let mut order = Vec::with_capacity(graph.nodes.len());

        while let Some(node) = queue.pop_front() {
            if !visited.insert(node.clone()) {
                continue;
            }
            for dependent in graph.dependents_of(&node).to_vec() {
                if visited.contains(&dependent) {
                    tracing::warn!(
                        unit = %dependent,
                        dependency = %node,
                        "circular dependency, edge dropped"
                    );
                    continue;
                }
                if let Some(deg) = graph.indegree.get_mut(&dependent) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
            order.push(node);
        }

        for node in &graph.nodes {
            if graph.indegree.get(node).is_some_and(|d| *d > 0) {
                tracing::warn!(unit = %node, "unresolved dependency");
            }
        }
        let provided: HashSet<&str> = self.units.iter().map(|u| u.name.as_str()).collect();
        for node in graph.nodes.iter().filter(|n| !provided.contains(n.as_str())) {
            tracing::warn!(unit = %node, "dependency not provided by any unit");
        }

        remove_duplicates(order)
    }

    /// Kahn's algorithm; every dependency must be a known unit and the graph must be acyclic.
    ///
    /// Units that become ready at the same time keep their input order.
    pub fn resolve_strict(&self) -> Result<Vec<String>, ResolverError> {
        let names: HashSet<&str> = self.units.iter().map(|u| u.name.as_str()).collect();
        for unit in &self.units {
            if let Some(missing) = unit.dependencies.iter().find(|d| !names.contains(d.as_str())) {
                return Err(ResolverError::UnresolvedDependency {
                    unit: unit.name.clone(),
                    missing: missing.clone(),
                });
            }
        }

        let mut graph = Graph::build(&self.units);
        let inputs = remove_duplicates(self.units.iter().map(|u| u.name.clone()));
        let mut queue: VecDeque<String> = inputs
            .iter()
            .filter(|n| graph.indegree.get(*n).is_some_and(|d| *d == 0))
            .cloned()
            .collect();

        let mut order = Vec::with_capacity(inputs.len());
        while let Some(node) = queue.pop_front() {
            for dependent in graph.dependents_of(&node).to_vec() {
                if let Some(deg) = graph.indegree.get_mut(&dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
            order.push(node);
        }

        if order.len() < inputs.len() {
            return Err(ResolverError::CircularDependency {
                cycle: self.find_cycle().unwrap_or_else(|| "unknown".to_owned()),
            });
        }
        Ok(order)
    }

    fn find_cycle(&self) -> Option<String> {
        let deps: HashMap<&str, &[String]> = self
            .units
            .iter()
            .map(|u| (u.name.as_str(), u.dependencies.as_slice()))
            .collect();
        let mut done: HashSet<&str> = HashSet::new();
        let mut path: Vec<(&str, usize)> = Vec::new();

        for unit in &self.units {
            if !done.insert(unit.name.as_str()) {
                continue;
            }
            path.push((unit.name.as_str(), 0));
            while let Some((node, next)) = path.last_mut() {
                let Some(dep) = deps.get(*node).and_then(|d| d.get(*next)) else {
                    path.pop();
                    continue;
                };
                *next += 1;
                if let Some(pos) = path.iter().position(|(n, _)| *n == dep.as_str()) {
                    let mut cycle: Vec<&str> = path[pos..].iter().map(|(n, _)| *n).collect();
                    cycle.push(dep);
                    return Some(cycle.join(" -> "));
                }
                if done.insert(dep.as_str()) {
                    path.push((dep.as_str(), 0));
                }
            }
        }
        None
    }
}

/// Lenient order of the units found under `dir`.
pub fn resolve_directory(dir: impl AsRef<Path>) -> Result<Vec<String>, ResolverError> {
    Ok(DependencyResolver::from_dir(dir)?.resolve())
}

/// Drops repeated names, keeping the first occurrence.
pub fn remove_duplicates<I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|n| seen.insert(n.clone()))
        .collect()
}
