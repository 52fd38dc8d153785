//! The hierarchical container seam.
//!
//! Everything above this module talks to a NeXus file through the
//! [`Container`] trait. Paths are absolute and `/`-delimited.

use crate::Result;
use std::fmt;

/// Type tag reported for fields (scientific data sets).
pub const FIELD_TAG: &str = "SDS";

/// Kind of a node in the container tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Group with its `NX_class` (empty if the group has none).
    Group { class: String },
    /// Terminal field.
    Field,
}

impl NodeKind {
    /// Creates a group kind.
    pub fn group(class: impl Into<String>) -> Self {
        Self::Group {
            class: class.into(),
        }
    }

    /// Type tag: the group class, or `SDS` for fields.
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::Group { class } => class,
            Self::Field => FIELD_TAG,
        }
    }

    /// True for groups whose class marks them as NeXus groups worth entering.
    #[must_use]
    pub fn is_nexus_group(&self) -> bool {
        matches!(self, Self::Group { class } if class.starts_with("NX"))
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One entry of a group listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    pub name: String,
    pub kind: NodeKind,
}

impl ChildEntry {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Number(f64),
    Numbers(Vec<f64>),
    Text(String),
}

impl AttrValue {
    /// Integer view of a number or numeric text.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(value) if value.fract() == 0.0 => Some(*value as i64),
            Self::Numbers(values) if values.len() == 1 && values[0].fract() == 0.0 => {
                Some(values[0] as i64)
            }
            Self::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text view of the value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Text rendering of any value.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Number(value) => value.to_string(),
            Self::Numbers(values) => values
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(","),
            Self::Text(text) => text.clone(),
        }
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for AttrValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Read access to a hierarchical scientific data container.
///
/// Implementations are used from a single thread; every call runs to
/// completion or fails with an I/O error.
pub trait Container {
    /// File name or other human-readable identity of the container.
    fn name(&self) -> &str;

    /// Lists the direct children of a group, in storage order.
    fn list_children(&self, path: &str) -> Result<Vec<ChildEntry>>;

    /// Extents of a field.
    fn dimensions(&self, path: &str) -> Result<Vec<usize>>;

    /// Reads a whole scalar or array field as `f64`, flattened row-major.
    fn read_values(&self, path: &str) -> Result<Vec<f64>>;

    /// Reads a rectangular hyperslab of a field, flattened row-major.
    fn read_hyperslab(&self, path: &str, start: &[usize], extents: &[usize]) -> Result<Vec<f64>>;

    /// Reads a text field.
    fn read_text(&self, path: &str) -> Result<String>;

    /// Reads one attribute of a node. A missing attribute is `Ok(None)`.
    fn read_attribute(&self, path: &str, name: &str) -> Result<Option<AttrValue>>;

    /// Reads every attribute of a node.
    fn attributes(&self, path: &str) -> Result<Vec<(String, AttrValue)>>;
}

/// Joins a parent path and a child name.
#[must_use]
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() || parent == "/" {
        format!("/{name}")
    } else {
        format!("{}/{name}", parent.trim_end_matches('/'))
    }
}

/// Last path component.
#[must_use]
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// First path component (the NXentry name).
#[must_use]
pub fn entry_name(path: &str) -> &str {
    path.trim_start_matches('/').split('/').next().unwrap_or("")
}

/// Parent path of a node.
#[must_use]
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(index) => &path[..index],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(join_path("/", "entry"), "/entry");
        assert_eq!(join_path("/entry/", "bank1"), "/entry/bank1");
        assert_eq!(basename("/entry/instrument/bank1"), "bank1");
        assert_eq!(entry_name("/entry-diff/bank3"), "entry-diff");
        assert_eq!(parent_path("/entry/bank1/data"), "/entry/bank1");
        assert_eq!(parent_path("/entry"), "/");
    }

    #[test]
    fn test_attr_value_views() {
        assert_eq!(AttrValue::Number(1.0).as_i64(), Some(1));
        assert_eq!(AttrValue::Text(" 2 ".to_string()).as_i64(), Some(2));
        assert_eq!(AttrValue::Number(1.5).as_i64(), None);
        assert_eq!(AttrValue::Numbers(vec![3.0]).as_i64(), Some(3));
        assert_eq!(AttrValue::from("tof,x").as_text(), Some("tof,x"));
        assert!(NodeKind::group("NXdata").is_nexus_group());
        assert!(!NodeKind::group("").is_nexus_group());
        assert_eq!(NodeKind::Field.tag(), "SDS");
    }
}
