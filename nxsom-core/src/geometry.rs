//! Instrument geometry records.

use crate::selector::Selected;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A value with its variance.
pub type ValueVariance = (f64, f64);

/// Geometry of a beam monitor.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MonitorGeometry {
    /// Moderator-to-monitor distance.
    pub primary: ValueVariance,
}

/// Per-pixel derivatives used by angle-dispersive (indirect geometry) banks.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DifferentialGeometry {
    /// Row stride shared by every quantity.
    pub row_stride: usize,
    /// Quantities keyed by field name, in profile order.
    pub quantities: Vec<(String, Option<Selected>)>,
}

impl DifferentialGeometry {
    /// Looks up a quantity by field name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Selected> {
        self.quantities
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, value)| value.as_ref())
    }
}

/// Geometry of one detector bank.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectorGeometry {
    /// Instrument label the record was resolved for.
    pub instrument: Option<String>,
    /// Moderator-to-sample distance.
    pub primary: ValueVariance,
    /// Sample-to-bank distance derived from the bank translation vector.
    pub det_secondary: Option<ValueVariance>,
    /// Sample-to-pixel distance.
    pub secondary: Option<Selected>,
    pub polar: Option<Selected>,
    pub azimuthal: Option<Selected>,
    pub x_pixel_offset: Option<Vec<f64>>,
    pub y_pixel_offset: Option<Vec<f64>>,
    /// Fastest-varying extent of the per-pixel geometry arrays.
    pub row_stride: Option<usize>,
    pub differential: Option<DifferentialGeometry>,
}

/// Geometry record of one bank or monitor.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GeometryRecord {
    Monitor(MonitorGeometry),
    Detector(Box<DetectorGeometry>),
}

impl GeometryRecord {
    /// Primary flight path of the record.
    #[must_use]
    pub fn primary(&self) -> ValueVariance {
        match self {
            Self::Monitor(monitor) => monitor.primary,
            Self::Detector(detector) => detector.primary,
        }
    }
}

/// Geometry attached to a collection: one record, or one per contributing bank.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InstrumentGeometry {
    Single(Option<GeometryRecord>),
    Composite(Vec<(String, Option<GeometryRecord>)>),
}

impl InstrumentGeometry {
    /// Record for a bank label.
    #[must_use]
    pub fn get(&self, bank: &str) -> Option<&GeometryRecord> {
        match self {
            Self::Single(record) => record.as_ref(),
            Self::Composite(pairs) => pairs
                .iter()
                .find(|(label, _)| label == bank)
                .and_then(|(_, record)| record.as_ref()),
        }
    }
}

/// Length of a 3-vector with its variance.
///
/// `errors` holds per-component uncertainties. When exactly one component is
/// uncertain its squared uncertainty is the variance. Otherwise the variance
/// is zero.
#[must_use]
pub fn vector_magnitude(vector: [f64; 3], errors: Option<&[f64]>) -> ValueVariance {
    let [x, y, z] = vector;
    let r = (x * x + y * y + z * z).sqrt();

    let variance = match errors {
        None => 0.0,
        Some([sigma]) => sigma * sigma,
        Some(sigmas) => {
            let uncertain: Vec<f64> = sigmas
                .iter()
                .copied()
                .take(3)
                .filter(|sigma| *sigma != 0.0)
                .collect();
            match uncertain.as_slice() {
                [sigma] => sigma * sigma,
                _ => 0.0,
            }
        }
    };

    (r, variance)
}
