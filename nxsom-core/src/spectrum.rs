//! Spectra and dataset classification.

use crate::error::{Error, Result};
use crate::pixel::PixelId;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How the independent axis relates to the dependent values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DatasetType {
    /// Axis values are bin edges: one more edge than channels.
    Histogram,
    /// Axis values are point coordinates: one per channel.
    Density,
}

impl DatasetType {
    /// Classifies a block from the data extent along the variable axis and
    /// the variable axis length.
    ///
    /// Returns the dataset type and the number of channels per spectrum.
    ///
    /// # Errors
    /// Returns [`Error::InconsistentDimensions`] for any other relationship.
    pub fn classify(extent: usize, axis_len: usize) -> Result<(Self, usize)> {
        if extent + 1 == axis_len {
            Ok((Self::Histogram, extent))
        } else if extent == axis_len {
            Ok((Self::Density, extent))
        } else {
            Err(Error::InconsistentDimensions { extent, axis_len })
        }
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Histogram => f.write_str("histogram"),
            Self::Density => f.write_str("density"),
        }
    }
}

/// One spectrum: independent axis, dependent values and their variances.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Spectrum {
    /// Pixel or monitor the spectrum belongs to.
    pub id: PixelId,
    /// Independent-axis values.
    pub axis: Vec<f64>,
    /// Independent-axis variances, when known.
    pub axis_variance: Option<Vec<f64>>,
    /// Dependent values (counts).
    pub y: Vec<f64>,
    /// Dependent variances.
    pub var_y: Vec<f64>,
}

impl Spectrum {
    /// Number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.y.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

/// Shifts axis values by an exact calibration offset.
///
/// Elements whose sum leaves the representable range are replaced by `+inf`;
/// the second value of the tuple counts them.
#[must_use]
pub fn offset_axis(values: &[f64], offset: f64) -> (Vec<f64>, usize) {
    let mut overflowed = 0;
    let shifted = values
        .iter()
        .map(|&value| {
            let sum = value + offset;
            if !sum.is_finite() && value.is_finite() && offset.is_finite() {
                overflowed += 1;
                f64::INFINITY
            } else {
                sum
            }
        })
        .collect();
    (shifted, overflowed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_classify() {
        assert_eq!(
            DatasetType::classify(4, 5).unwrap(),
            (DatasetType::Histogram, 4)
        );
        assert_eq!(
            DatasetType::classify(4, 4).unwrap(),
            (DatasetType::Density, 4)
        );
        assert_eq!(
            DatasetType::classify(4, 7),
            Err(Error::InconsistentDimensions {
                extent: 4,
                axis_len: 7
            })
        );
    }

    #[test]
    fn test_offset_axis() {
        let (shifted, overflowed) = offset_axis(&[0.0, 10.0, 20.0], 5.0);
        assert_eq!(overflowed, 0);
        assert_relative_eq!(shifted[0], 5.0);
        assert_relative_eq!(shifted[1], 15.0);
        assert_relative_eq!(shifted[2], 25.0);
    }

    #[test]
    fn test_offset_axis_overflow() {
        let (shifted, overflowed) = offset_axis(&[1.0, f64::MAX, -f64::MAX], f64::MAX);
        assert_eq!(overflowed, 1);
        assert!(shifted[1].is_infinite() && shifted[1] > 0.0);
        assert_relative_eq!(shifted[2], 0.0);
    }
}
