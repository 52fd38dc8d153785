//! HDF5/NeXus container backend.

use crate::container::{AttrValue, ChildEntry, Container, NodeKind};
use crate::{Error, Result};
use hdf5::types::{FixedAscii, VarLenAscii, VarLenUnicode};
use hdf5::{Dataset, File, Group, Location};
use log::debug;
use ndarray::{s, Ix1, Ix2, Ix3};
use std::path::Path;

/// A NeXus file opened read-only through libhdf5.
#[derive(Debug)]
pub struct Hdf5Container {
    name: String,
    file: File,
}

enum Node {
    Group(Group),
    Dataset(Dataset),
}

impl Node {
    fn location(&self) -> &Location {
        match self {
            Self::Group(group) => group,
            Self::Dataset(dataset) => dataset,
        }
    }
}

impl Hdf5Container {
    /// Open a NeXus file for reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened as HDF5.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        debug!("opened {}", path.display());
        Ok(Self {
            name: path.display().to_string(),
            file,
        })
    }

    fn node(&self, path: &str) -> Result<Node> {
        if let Ok(group) = self.file.group(path) {
            return Ok(Node::Group(group));
        }
        match self.file.dataset(path) {
            Ok(dataset) => Ok(Node::Dataset(dataset)),
            Err(_) => Err(Error::missing(path)),
        }
    }

    fn dataset(&self, path: &str) -> Result<Dataset> {
        self.file.dataset(path).map_err(|_| Error::missing(path))
    }
}

impl Container for Hdf5Container {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_children(&self, path: &str) -> Result<Vec<ChildEntry>> {
        let group = self.file.group(path)?;
        let mut children = Vec::new();
        for name in group.member_names()? {
            if let Ok(child) = group.group(&name) {
                let class = read_attr(&child, "NX_class")
                    .map(|value| value.to_text())
                    .unwrap_or_default();
                children.push(ChildEntry::new(name, NodeKind::group(class)));
            } else if group.dataset(&name).is_ok() {
                children.push(ChildEntry::new(name, NodeKind::Field));
            }
        }
        Ok(children)
    }

    /// Scalar datasets report a shape of `[1]`.
    fn dimensions(&self, path: &str) -> Result<Vec<usize>> {
        let shape = self.dataset(path)?.shape();
        Ok(if shape.is_empty() { vec![1] } else { shape })
    }

    fn read_values(&self, path: &str) -> Result<Vec<f64>> {
        Ok(self.dataset(path)?.read_raw::<f64>()?)
    }

    fn read_hyperslab(&self, path: &str, start: &[usize], extents: &[usize]) -> Result<Vec<f64>> {
        let dataset = self.dataset(path)?;
        let end: Vec<usize> = start.iter().zip(extents).map(|(s, e)| s + e).collect();
        let values: Vec<f64> = match (start, end.as_slice()) {
            ([a], [a_end]) => dataset
                .read_slice::<f64, _, Ix1>(s![*a..*a_end])?
                .iter()
                .copied()
                .collect(),
            ([a, b], [a_end, b_end]) => dataset
                .read_slice::<f64, _, Ix2>(s![*a..*a_end, *b..*b_end])?
                .iter()
                .copied()
                .collect(),
            ([a, b, c], [a_end, b_end, c_end]) => dataset
                .read_slice::<f64, _, Ix3>(s![*a..*a_end, *b..*b_end, *c..*c_end])?
                .iter()
                .copied()
                .collect(),
            _ => {
                return Err(Error::Container(format!(
                    "unsupported hyperslab of rank {} on {path}",
                    start.len()
                )))
            }
        };
        Ok(values)
    }

    fn read_text(&self, path: &str) -> Result<String> {
        let dataset = self.dataset(path)?;
        read_string(&dataset).ok_or_else(|| Error::Container(format!("{path} is not text")))
    }

    fn read_attribute(&self, path: &str, name: &str) -> Result<Option<AttrValue>> {
        let node = self.node(path)?;
        let location = node.location();
        if !location.attr_names()?.iter().any(|existing| existing == name) {
            return Ok(None);
        }
        Ok(read_attr(location, name))
    }

    fn attributes(&self, path: &str) -> Result<Vec<(String, AttrValue)>> {
        let node = self.node(path)?;
        let location = node.location();
        Ok(location
            .attr_names()?
            .into_iter()
            .filter_map(|name| {
                let value = read_attr(location, &name)?;
                Some((name, value))
            })
            .collect())
    }
}

fn read_attr(location: &Location, name: &str) -> Option<AttrValue> {
    let attr = location.attr(name).ok()?;
    if let Ok(values) = attr.read_raw::<f64>() {
        return Some(match values.as_slice() {
            [value] => AttrValue::Number(*value),
            _ => AttrValue::Numbers(values),
        });
    }
    read_string(&attr).map(AttrValue::Text)
}

/// First string of a dataset or attribute, whatever its string type.
///
/// Fixed-length types are tried largest first: a narrower type reads a
/// longer string without error but truncates it.
fn read_string(data: &hdf5::Container) -> Option<String> {
    if let Some(value) = data
        .read_raw::<VarLenUnicode>()
        .ok()
        .and_then(|v| v.into_iter().next())
    {
        return Some(value.as_str().to_string());
    }
    if let Some(value) = data
        .read_raw::<VarLenAscii>()
        .ok()
        .and_then(|v| v.into_iter().next())
    {
        return Some(value.as_str().to_string());
    }

    macro_rules! try_fixed_largest_first {
        ($($n:expr),*) => {
            $(
                if let Some(value) = data
                    .read_raw::<FixedAscii<$n>>()
                    .ok()
                    .and_then(|v| v.into_iter().next())
                {
                    return Some(value.as_str().trim_end_matches('\0').to_string());
                }
            )*
        };
    }
    try_fixed_largest_first!(4096, 1024, 256, 64, 16);
    None
}
