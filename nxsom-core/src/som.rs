//! The scientific object model: an ordered collection of spectra with
//! attributes.

use crate::error::{Error, Result};
use crate::geometry::InstrumentGeometry;
use crate::selector::Selected;
use crate::spectrum::{DatasetType, Spectrum};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Value of a run parameter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum ParameterValue {
    Number(f64),
    Text(String),
}

/// A scalar run parameter with its unit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NxParameter {
    pub value: ParameterValue,
    pub units: Option<String>,
}

/// Sample description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sample {
    pub name: Option<String>,
    pub nature: Option<String>,
    pub identifier: Option<String>,
    pub holder: Option<String>,
    pub changer_position: Option<String>,
}

/// Auxiliary per-entry information: one quantity, or one per bank.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Information {
    Single(Option<Selected>),
    Composite(Vec<(String, Option<Selected>)>),
}

/// Attribute value stored on a collection.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AttrEntry {
    Empty,
    Text(String),
    Parameter(NxParameter),
    Sample(Sample),
    Geometry(InstrumentGeometry),
    Information(Information),
}

impl AttrEntry {
    /// Text view of the entry, if it is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<Option<String>> for AttrEntry {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Empty, Self::Text)
    }
}

/// Insertion-ordered string-keyed attribute map.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AttributeList {
    entries: Vec<(String, AttrEntry)>,
}

impl AttributeList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an entry. A replaced entry keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: AttrEntry) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&AttrEntry> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
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

/// A collection of spectra sharing axis labels, dataset type and attributes.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpectrumCollection {
    pub title: String,
    pub axis_label: String,
    pub axis_units: Option<String>,
    pub y_label: String,
    pub y_units: Option<String>,
    pub dataset_type: Option<DatasetType>,
    pub attributes: AttributeList,
    pub spectra: Vec<Spectrum>,
}

impl SpectrumCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the dataset type of a contributing block.
    ///
    /// # Errors
    /// Returns [`Error::MixedDatasetTypes`] if a different type was recorded
    /// earlier.
    pub fn set_dataset_type(&mut self, dataset_type: DatasetType) -> Result<()> {
        match self.dataset_type {
            Some(existing) if existing != dataset_type => Err(Error::MixedDatasetTypes {
                first: existing,
                second: dataset_type,
            }),
            _ => {
                self.dataset_type = Some(dataset_type);
                Ok(())
            }
        }
    }

    pub fn push(&mut self, spectrum: Spectrum) {
        self.spectra.push(spectrum);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Spectrum> {
        self.spectra.iter()
    }
}

impl<'a> IntoIterator for &'a SpectrumCollection {
    type Item = &'a Spectrum;
    type IntoIter = std::slice::Iter<'a, Spectrum>;

    fn into_iter(self) -> Self::IntoIter {
        self.spectra.iter()
    }
}
