//! Tree discovery: a flat path → type index of a container.

use crate::container::{join_path, parent_path, Container, NodeKind};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};

/// Deepest group nesting the indexer will enter.
pub const MAX_DEPTH: usize = 64;

/// Flat index of every node in a container, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct TreeIndex {
    entries: Vec<(String, NodeKind)>,
    positions: HashMap<String, usize>,
    warnings: Vec<String>,
}

impl TreeIndex {
    /// Walks the container once, depth first from the root.
    ///
    /// A group that cannot be listed contributes nothing below itself; the
    /// failure is kept as a warning and the walk continues. A group carrying
    /// a NeXus `target` attribute is indexed as a node but only its target
    /// is entered, under the target's own path. Targets the walk never
    /// reaches are entered once it is done.
    pub fn build<C: Container + ?Sized>(container: &C) -> Self {
        let mut index = Self::default();
        let mut visited = HashSet::new();
        let mut targets = Vec::new();
        visited.insert("/".to_string());
        index.walk(container, "/", 0, &mut visited, &mut targets);

        while let Some(target) = targets.pop() {
            if !visited.insert(target.clone()) {
                continue;
            }
            debug!("entering link target {target} outside the walk");
            let depth = target.matches('/').count();
            index.walk(container, &target, depth, &mut visited, &mut targets);
        }
        debug!(
            "indexed {} nodes of {} ({} warnings)",
            index.len(),
            container.name(),
            index.warnings.len()
        );
        index
    }

    fn walk<C: Container + ?Sized>(
        &mut self,
        container: &C,
        path: &str,
        depth: usize,
        visited: &mut HashSet<String>,
        targets: &mut Vec<String>,
    ) {
        let children = match container.list_children(path) {
            Ok(children) => children,
            Err(e) => {
                self.warn(format!("skipping subtree {path}: {e}"));
                return;
            }
        };

        for child in children {
            let child_path = join_path(path, &child.name);
            if self.positions.contains_key(&child_path) {
                continue;
            }
            let enter = child.kind.is_nexus_group();
            self.insert(child_path.clone(), child.kind);
            if !enter {
                continue;
            }

            if let Ok(Some(target)) = container.read_attribute(&child_path, "target") {
                let canonical = target.to_text();
                if canonical != child_path {
                    if is_within(&child_path, &canonical) {
                        debug!("not entering {child_path}: links to ancestor {canonical}");
                    } else if !visited.contains(&canonical) {
                        targets.push(canonical);
                    }
                    continue;
                }
            }
            if !visited.insert(child_path.clone()) {
                debug!("not entering {child_path}: already indexed");
                continue;
            }
            if depth + 1 >= MAX_DEPTH {
                self.warn(format!(
                    "not entering {child_path}: nesting deeper than {MAX_DEPTH}"
                ));
                continue;
            }
            self.walk(container, &child_path, depth + 1, visited, targets);
        }
    }

    fn insert(&mut self, path: String, kind: NodeKind) {
        self.positions.insert(path.clone(), self.entries.len());
        self.entries.push((path, kind));
    }

    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }

    /// Paths whose type tag equals `tag`, in discovery order.
    #[must_use]
    pub fn list_type(&self, tag: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, kind)| kind.tag() == tag)
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Kind of the node at `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&NodeKind> {
        self.positions.get(path).map(|&i| &self.entries[i].1)
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.positions.contains_key(path)
    }

    /// Direct children of `path`, in discovery order.
    pub fn children<'a>(&'a self, path: &'a str) -> impl Iterator<Item = (&'a str, &'a NodeKind)> {
        self.entries
            .iter()
            .filter(move |(child, _)| parent_path(child) == path)
            .map(|(child, kind)| (child.as_str(), kind))
    }

    /// Every indexed node, in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeKind)> {
        self.entries.iter().map(|(path, kind)| (path.as_str(), kind))
    }

    /// Problems met while walking the container.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// True when `path` equals `ancestor` or lies below it.
fn is_within(path: &str, ancestor: &str) -> bool {
    path == ancestor
        || path
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}
