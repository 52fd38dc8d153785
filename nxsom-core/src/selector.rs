//! Measured geometry quantities and pixel selectors.

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A value (scalar or array) read from the file with its optional variances.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Measurement {
    /// Flattened values.
    pub values: Vec<f64>,
    /// Per-element variances, when the file carries them.
    pub variances: Option<Vec<f64>>,
    /// Physical unit.
    pub units: Option<String>,
    /// Dimensions of the stored field.
    pub shape: Vec<usize>,
}

impl Measurement {
    /// Creates a scalar measurement.
    #[must_use]
    pub fn scalar(value: f64, variance: f64) -> Self {
        Self {
            values: vec![value],
            variances: Some(vec![variance]),
            units: None,
            shape: vec![1],
        }
    }

    /// Sets the unit.
    #[must_use]
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    /// True when the field holds a single element.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.values.len() == 1
    }

    /// First value, NaN if empty.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.values.first().copied().unwrap_or(f64::NAN)
    }

    /// First variance, 0 if unset.
    #[must_use]
    pub fn variance(&self) -> f64 {
        self.variances
            .as_ref()
            .and_then(|v| v.first().copied())
            .unwrap_or(0.0)
    }

    /// Value and variance at a flat index.
    ///
    /// # Errors
    /// Returns [`Error::IndexOutOfRange`] if `index` is past the end.
    pub fn at(&self, index: usize) -> Result<(f64, f64)> {
        let value = *self.values.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.values.len(),
        })?;
        let variance = match &self.variances {
            Some(variances) if variances.len() == 1 => variances[0],
            Some(variances) => *variances.get(index).ok_or(Error::IndexOutOfRange {
                index,
                len: variances.len(),
            })?,
            None => 0.0,
        };
        Ok((value, variance))
    }
}

/// Maps a `(row, col)` pixel coordinate onto an element of a geometry array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Selector {
    /// One value for every pixel.
    Constant,
    /// One value per row (tube).
    Row,
    /// One value per column (pixel along the tube).
    Column,
    /// One value per pixel, rows of `row_stride` elements.
    Grid { row_stride: usize },
}

impl Selector {
    /// Flat index of `(row, col)` in an array of `len` elements.
    ///
    /// # Errors
    /// Returns [`Error::IndexOutOfRange`] if the index is past the end.
    pub fn index(&self, row: usize, col: usize, len: usize) -> Result<usize> {
        let index = match self {
            Self::Constant => 0,
            Self::Row => row,
            Self::Column => col,
            Self::Grid { row_stride } => {
                if col >= *row_stride {
                    return Err(Error::IndexOutOfRange {
                        index: col,
                        len: *row_stride,
                    });
                }
                row * row_stride + col
            }
        };
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        Ok(index)
    }

    /// Chooses a selector from the stored shape of a field.
    ///
    /// Scalars are constant, arrays of rank two or more are indexed per
    /// pixel with the second extent as row stride, and plain vectors vary
    /// along `vector`.
    #[must_use]
    pub fn for_shape(shape: &[usize], len: usize, vector: Self) -> Self {
        if len <= 1 {
            Self::Constant
        } else if shape.len() >= 2 {
            Self::Grid {
                row_stride: shape[1],
            }
        } else {
            vector
        }
    }
}

/// A measurement paired with the selector that indexes it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Selected {
    pub measurement: Measurement,
    pub selector: Selector,
}

impl Selected {
    #[must_use]
    pub fn new(measurement: Measurement, selector: Selector) -> Self {
        Self {
            measurement,
            selector,
        }
    }

    /// Value and variance for the pixel at `(row, col)`.
    ///
    /// # Errors
    /// Returns [`Error::IndexOutOfRange`] if the pixel is outside the array.
    pub fn value(&self, row: usize, col: usize) -> Result<(f64, f64)> {
        let index = self
            .selector
            .index(row, col, self.measurement.values.len())?;
        self.measurement.at(index)
    }
}
