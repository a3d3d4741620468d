//! Module dependency resolution.
//!
//! Nodes are keyed by `name-version`. Besides the modules being loaded, the
//! graph holds read-only nodes for modules already loaded by an ancestor
//! context, and placeholder nodes standing in for missing dependencies so the
//! sort always terminates. Only local nodes make it into the load order.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::modules::definition::ModuleError;
use crate::modules::descriptors::ModuleInfo;

/// Role of a node in the dependency graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Module being loaded by this context
    Local,
    /// Module already loaded by an ancestor context
    External,
    /// Stand-in for a dependency nobody provides
    Placeholder,
}

/// Resolution-time copy of a module descriptor
#[derive(Debug, Clone)]
pub struct ModuleDependencyNode {
    pub key: String,
    pub kind: NodeKind,
    pub info: Option<ModuleInfo>,
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
}

impl ModuleDependencyNode {
    fn new(key: String, kind: NodeKind, info: Option<ModuleInfo>) -> Self {
        let dependencies = match (&info, kind) {
            (Some(info), NodeKind::Local) => info.dependencies.iter().map(|d| d.key()).collect(),
            _ => Vec::new(),
        };
        Self {
            key,
            kind,
            info,
            dependencies,
            dependents: Vec::new(),
        }
    }
}

/// Dependency graph over one context's modules and its ancestors' loaded ones
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<String, ModuleDependencyNode>,
    /// Insertion order, which keeps the resulting order deterministic
    order: Vec<String>,
    failures: Vec<ModuleError>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, node: ModuleDependencyNode) {
        self.order.push(node.key.clone());
        self.nodes.insert(node.key.clone(), node);
    }

    /// Seed a module an ancestor context already loaded
    pub fn add_external(&mut self, info: &ModuleInfo) {
        let key = info.key();
        if !self.nodes.contains_key(&key) {
            self.insert(ModuleDependencyNode::new(key, NodeKind::External, Some(info.clone())));
        }
    }

    /// Add a module to load. Duplicates are recorded as failures.
    pub fn add_module(&mut self, info: ModuleInfo) {
        let key = info.key();
        if let Some(existing) = self.nodes.get(&key) {
            let first = match &existing.info {
                Some(info) if existing.kind == NodeKind::External => {
                    format!("{} loaded by an ancestor context", info.source)
                }
                Some(info) => info.source.to_string(),
                None => "<unknown>".to_string(),
            };
            self.failures.push(ModuleError::DuplicateModule {
                module: key,
                first,
                second: info.source.to_string(),
            });
            return;
        }
        self.insert(ModuleDependencyNode::new(key, NodeKind::Local, Some(info)));
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, key: &str) -> Option<&ModuleDependencyNode> {
        self.nodes.get(key)
    }

    /// Order the local modules so every module follows its dependencies.
    ///
    /// Every problem found (duplicates, missing dependencies, cycles) is
    /// reported together; nothing is ordered if any was found.
    pub fn resolve(mut self) -> Result<Vec<ModuleInfo>, ModuleError> {
        self.link();

        let sorted = self.topological_sort();
        if sorted.len() != self.nodes.len() {
            let placed: HashSet<&String> = sorted.iter().collect();
            let stuck: Vec<String> = self
                .order
                .iter()
                .filter(|key| !placed.contains(key))
                .cloned()
                .collect();
            let cycle = self.find_cycle(&stuck);
            self.failures.push(ModuleError::DependencyCycle { stuck, cycle });
        }

        if let Some(error) = ModuleError::aggregate(std::mem::take(&mut self.failures)) {
            return Err(error);
        }

        Ok(sorted
            .into_iter()
            .filter_map(|key| self.nodes.remove(&key))
            .filter(|node| node.kind == NodeKind::Local)
            .filter_map(|node| node.info)
            .collect())
    }

    /// Fill in dependents, adding placeholders for missing targets
    fn link(&mut self) {
        let keys = self.order.clone();
        for key in keys {
            let dependencies = match self.nodes.get(&key) {
                Some(node) => node.dependencies.clone(),
                None => continue,
            };

            for dependency in dependencies {
                let target = self.nodes.get(&dependency).map(|node| node.kind);
                if matches!(target, None | Some(NodeKind::Placeholder)) {
                    self.failures.push(ModuleError::MissingDependency {
                        module: key.clone(),
                        dependency: dependency.clone(),
                    });
                }
                if target.is_none() {
                    self.insert(ModuleDependencyNode::new(
                        dependency.clone(),
                        NodeKind::Placeholder,
                        None,
                    ));
                }
                if let Some(target) = self.nodes.get_mut(&dependency) {
                    target.dependents.push(key.clone());
                }
            }
        }
    }

    /// Kahn's algorithm over the linked graph
    fn topological_sort(&self) -> Vec<String> {
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .values()
            .map(|node| (node.key.as_str(), node.dependencies.len()))
            .collect();

        let mut queue: VecDeque<&str> = self
            .order
            .iter()
            .map(String::as_str)
            .filter(|key| in_degree.get(key) == Some(&0))
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());

        while let Some(current) = queue.pop_front() {
            result.push(current.to_string());

            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            for dependent in &node.dependents {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent.as_str());
                    }
                }
            }
        }

        result
    }

    /// One concrete cycle among the stuck nodes, closed on its first key
    fn find_cycle(&self, stuck: &[String]) -> Vec<String> {
        let candidates: HashSet<&str> = stuck.iter().map(String::as_str).collect();
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for key in stuck {
            if !visited.contains(key.as_str()) {
                if let Some(cycle) =
                    self.dfs_cycle(key, &candidates, &mut visited, &mut rec_stack, &mut path)
                {
                    return cycle;
                }
            }
        }

        Vec::new()
    }

    fn dfs_cycle<'a>(
        &'a self,
        current: &'a str,
        candidates: &HashSet<&str>,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        visited.insert(current);
        rec_stack.insert(current);
        path.push(current);

        if let Some(node) = self.nodes.get(current) {
            for dependency in &node.dependencies {
                let dependency = dependency.as_str();
                if !candidates.contains(dependency) {
                    continue;
                }
                if !visited.contains(dependency) {
                    if let Some(cycle) = self.dfs_cycle(dependency, candidates, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(dependency) {
                    if let Some(start) = path.iter().position(|key| *key == dependency) {
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|key| key.to_string()).collect();
                        cycle.push(dependency.to_string());
                        return Some(cycle);
                    }
                }
            }
        }

        rec_stack.remove(current);
        path.pop();
        None
    }
}
