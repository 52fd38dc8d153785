//! nxsom-core: Core types for the NeXus scientific object model.
//!
//! This crate provides the value types produced when a NeXus file is
//! reconstructed into spectra: pixel identifiers, spectra, dataset
//! classification, geometry selectors and records, and the attributed
//! spectrum collection.
//!

pub mod error;
pub mod geometry;
pub mod pixel;
pub mod selector;
pub mod som;
pub mod spectrum;

pub use error::{Error, Result};
pub use geometry::{
    vector_magnitude, DetectorGeometry, DifferentialGeometry, GeometryRecord, InstrumentGeometry,
    MonitorGeometry, ValueVariance,
};
pub use pixel::{apply_mask, apply_roi, enumerate_ids, PixelId};
pub use selector::{Measurement, Selected, Selector};
pub use som::{
    AttrEntry, AttributeList, Information, NxParameter, ParameterValue, Sample, SpectrumCollection,
};
pub use spectrum::{offset_axis, DatasetType, Spectrum};
