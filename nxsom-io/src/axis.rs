//! Coordinate axes of a data block.

use crate::container::{basename, AttrValue, Container};
use crate::Result;

/// One coordinate field, loaded whole.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    /// Absolute path of the field.
    pub location: String,
    /// Last path component.
    pub label: String,
    pub units: Option<String>,
    pub values: Vec<f64>,
    /// Value of the `axis` attribute.
    pub number: Option<i64>,
    /// Value of the `primary` attribute, as a flag.
    pub primary: Option<bool>,
}

impl Axis {
    /// Reads the values and attributes of the field at `path`.
    ///
    /// # Errors
    /// Returns an error if the field cannot be read.
    pub fn load<C: Container + ?Sized>(container: &C, path: &str) -> Result<Self> {
        let values = container.read_values(path)?;
        let mut axis = Self {
            location: path.to_string(),
            label: basename(path).to_string(),
            units: None,
            values,
            number: None,
            primary: None,
        };

        for (name, value) in container.attributes(path)? {
            match name.as_str() {
                "units" => axis.units = Some(value.to_text()),
                "axis" => axis.number = value.as_i64(),
                "primary" => axis.primary = value.as_i64().map(|flag| flag == 1),
                _ => {}
            }
        }
        Ok(axis)
    }

    /// True if `name` is this axis's label or location.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.label == name || self.location == name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Reads the `units` attribute of a node as text.
pub(crate) fn read_units<C: Container + ?Sized>(container: &C, path: &str) -> Option<String> {
    container
        .read_attribute(path, "units")
        .ok()
        .flatten()
        .as_ref()
        .map(AttrValue::to_text)
}
