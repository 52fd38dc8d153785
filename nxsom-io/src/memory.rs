//! In-memory container.
//!
//! Builds a NeXus-shaped tree without touching the file system. Used for
//! synthetic data, for tests, and to observe how often the loader reads a
//! field.

use crate::container::{join_path, parent_path, AttrValue, ChildEntry, Container, NodeKind};
use crate::{Error, Result};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
enum FieldData {
    Numbers(Vec<f64>),
    Text(String),
}

#[derive(Debug, Clone)]
enum Node {
    Group {
        class: String,
        children: Vec<String>,
        link: Option<String>,
    },
    Field {
        shape: Vec<usize>,
        data: FieldData,
    },
}

#[derive(Debug, Clone)]
struct Record {
    node: Node,
    attrs: Vec<(String, AttrValue)>,
}

/// A container held entirely in memory.
#[derive(Debug)]
pub struct MemoryContainer {
    name: String,
    nodes: HashMap<String, Record>,
    failing: HashSet<String>,
    value_reads: RefCell<HashMap<String, usize>>,
    slab_reads: Cell<usize>,
}

impl MemoryContainer {
    /// Creates an empty container with a root group.
    pub fn new(name: impl Into<String>) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            "/".to_string(),
            Record {
                node: Node::Group {
                    class: String::new(),
                    children: Vec::new(),
                    link: None,
                },
                attrs: Vec::new(),
            },
        );
        Self {
            name: name.into(),
            nodes,
            failing: HashSet::new(),
            value_reads: RefCell::new(HashMap::new()),
            slab_reads: Cell::new(0),
        }
    }

    /// Adds a group. Missing parents are created as class-less groups.
    pub fn add_group(&mut self, path: &str, class: &str) -> &mut Self {
        if let Some(Record {
            node: Node::Group { class: existing, .. },
            ..
        }) = self.nodes.get_mut(path)
        {
            existing.clear();
            existing.push_str(class);
        } else {
            self.insert(
                path,
                Node::Group {
                    class: class.to_string(),
                    children: Vec::new(),
                    link: None,
                },
            );
        }
        if class.is_empty() {
            self
        } else {
            self.set_attr(path, "NX_class", AttrValue::from(class))
        }
    }

    /// Adds a numeric field with the given shape.
    pub fn add_field(&mut self, path: &str, shape: &[usize], values: Vec<f64>) -> &mut Self {
        self.insert(
            path,
            Node::Field {
                shape: shape.to_vec(),
                data: FieldData::Numbers(values),
            },
        );
        self
    }

    /// Adds a one-dimensional numeric field.
    pub fn add_vector(&mut self, path: &str, values: Vec<f64>) -> &mut Self {
        let len = values.len();
        self.add_field(path, &[len], values)
    }

    /// Adds a scalar numeric field.
    pub fn add_scalar(&mut self, path: &str, value: f64) -> &mut Self {
        self.add_field(path, &[1], vec![value])
    }

    /// Adds a text field.
    pub fn add_text(&mut self, path: &str, text: &str) -> &mut Self {
        self.insert(
            path,
            Node::Field {
                shape: vec![1],
                data: FieldData::Text(text.to_string()),
            },
        );
        self
    }

    /// Adds a group that exposes the children of `target`, tagged with a
    /// NeXus `target` attribute.
    pub fn add_link(&mut self, path: &str, target: &str) -> &mut Self {
        let class = match self.nodes.get(target).map(|record| &record.node) {
            Some(Node::Group { class, .. }) => class.clone(),
            _ => String::new(),
        };
        self.insert(
            path,
            Node::Group {
                class: class.clone(),
                children: Vec::new(),
                link: Some(target.to_string()),
            },
        );
        self.set_attr(path, "NX_class", AttrValue::from(class.as_str()));
        self.set_attr(path, "target", AttrValue::from(target))
    }

    /// Sets an attribute on an existing node. Unknown paths are ignored.
    pub fn set_attr(&mut self, path: &str, name: &str, value: AttrValue) -> &mut Self {
        if let Some(record) = self.nodes.get_mut(path) {
            if let Some(slot) = record.attrs.iter_mut().find(|(key, _)| key == name) {
                slot.1 = value;
            } else {
                record.attrs.push((name.to_string(), value));
            }
        }
        self
    }

    /// Makes every listing of `path` fail.
    pub fn fail_listing(&mut self, path: &str) -> &mut Self {
        self.failing.insert(path.to_string());
        self
    }

    /// Number of whole-field reads of `path`.
    #[must_use]
    pub fn value_reads(&self, path: &str) -> usize {
        self.value_reads.borrow().get(path).copied().unwrap_or(0)
    }

    /// Number of hyperslab reads of any field.
    #[must_use]
    pub fn slab_reads(&self) -> usize {
        self.slab_reads.get()
    }

    fn insert(&mut self, path: &str, node: Node) {
        let parent = parent_path(path).to_string();
        if !self.nodes.contains_key(&parent) {
            self.add_group(&parent, "");
        }
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        if let Some(Record {
            node: Node::Group { children, .. },
            ..
        }) = self.nodes.get_mut(&parent)
        {
            if !children.contains(&name) {
                children.push(name);
            }
        }
        self.nodes.insert(
            path.to_string(),
            Record {
                node,
                attrs: Vec::new(),
            },
        );
    }

    /// Resolves a path through linked groups to a stored node path.
    fn resolve(&self, path: &str) -> Option<String> {
        if self.nodes.contains_key(path) {
            return Some(path.to_string());
        }
        let mut split = path.len();
        while let Some(index) = path[..split].rfind('/') {
            if index == 0 {
                break;
            }
            let prefix = &path[..index];
            if let Some(Record {
                node: Node::Group {
                    link: Some(target), ..
                },
                ..
            }) = self.nodes.get(prefix)
            {
                return self.resolve(&format!("{target}{}", &path[index..]));
            }
            split = index;
        }
        None
    }

    fn record(&self, path: &str) -> Result<&Record> {
        self.resolve(path)
            .and_then(|resolved| self.nodes.get(&resolved))
            .ok_or_else(|| Error::missing(path))
    }

    fn field(&self, path: &str) -> Result<(&[usize], &FieldData)> {
        match &self.record(path)?.node {
            Node::Field { shape, data } => Ok((shape, data)),
            Node::Group { .. } => Err(Error::Container(format!("{path} is a group"))),
        }
    }

    fn numbers(&self, path: &str) -> Result<(&[usize], &[f64])> {
        match self.field(path)? {
            (shape, FieldData::Numbers(values)) => Ok((shape, values)),
            (_, FieldData::Text(_)) => Err(Error::Container(format!("{path} is not numeric"))),
        }
    }
}

impl Container for MemoryContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_children(&self, path: &str) -> Result<Vec<ChildEntry>> {
        if self.failing.contains(path) {
            return Err(Error::Container(format!("cannot list {path}")));
        }
        let record = self.record(path)?;
        let children = match &record.node {
            Node::Group {
                link: Some(target), ..
            } => return self.list_children(target),
            Node::Group { children, .. } => children,
            Node::Field { .. } => return Err(Error::Container(format!("{path} is a field"))),
        };

        let mut entries = Vec::with_capacity(children.len());
        for name in children {
            let child = self.record(&join_path(path, name))?;
            let kind = match &child.node {
                Node::Group { class, .. } => NodeKind::group(class.as_str()),
                Node::Field { .. } => NodeKind::Field,
            };
            entries.push(ChildEntry::new(name.as_str(), kind));
        }
        Ok(entries)
    }

    fn dimensions(&self, path: &str) -> Result<Vec<usize>> {
        Ok(self.field(path)?.0.to_vec())
    }

    fn read_values(&self, path: &str) -> Result<Vec<f64>> {
        let (_, values) = self.numbers(path)?;
        *self
            .value_reads
            .borrow_mut()
            .entry(path.to_string())
            .or_insert(0) += 1;
        Ok(values.to_vec())
    }

    fn read_hyperslab(&self, path: &str, start: &[usize], extents: &[usize]) -> Result<Vec<f64>> {
        let (shape, values) = self.numbers(path)?;
        self.slab_reads.set(self.slab_reads.get() + 1);
        gather_hyperslab(values, shape, start, extents)
    }

    fn read_text(&self, path: &str) -> Result<String> {
        match self.field(path)? {
            (_, FieldData::Text(text)) => Ok(text.clone()),
            (_, FieldData::Numbers(values)) => Ok(values
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ")),
        }
    }

    fn read_attribute(&self, path: &str, name: &str) -> Result<Option<AttrValue>> {
        Ok(self
            .record(path)?
            .attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone()))
    }

    fn attributes(&self, path: &str) -> Result<Vec<(String, AttrValue)>> {
        Ok(self.record(path)?.attrs.clone())
    }
}

/// Copies a rectangular region out of a row-major array.
pub(crate) fn gather_hyperslab(
    values: &[f64],
    shape: &[usize],
    start: &[usize],
    extents: &[usize],
) -> Result<Vec<f64>> {
    if start.len() != shape.len() || extents.len() != shape.len() {
        return Err(Error::Configuration(format!(
            "hyperslab rank {} does not match field rank {}",
            start.len(),
            shape.len()
        )));
    }
    for ((&s, &e), &dim) in start.iter().zip(extents).zip(shape) {
        if s + e > dim {
            return Err(nxsom_core::Error::IndexOutOfRange {
                index: s + e - 1,
                len: dim,
            }
            .into());
        }
    }

    let mut strides = vec![1usize; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }

    let count: usize = extents.iter().product();
    let mut out = Vec::with_capacity(count);
    let mut cursor = vec![0usize; shape.len()];
    for _ in 0..count {
        let offset: usize = cursor
            .iter()
            .zip(start)
            .zip(&strides)
            .map(|((&c, &s), &stride)| (c + s) * stride)
            .sum();
        let value = values.get(offset).ok_or(nxsom_core::Error::IndexOutOfRange {
            index: offset,
            len: values.len(),
        })?;
        out.push(*value);

        for axis in (0..cursor.len()).rev() {
            cursor[axis] += 1;
            if cursor[axis] < extents[axis] {
                break;
            }
            cursor[axis] = 0;
        }
    }
    Ok(out)
}
