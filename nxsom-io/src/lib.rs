//! nxsom-io: NeXus file access for the scientific object model.
//!
//! This crate discovers the layout of a NeXus container, resolves data
//! views and instrument geometry, and assembles spectrum collections.
//! Containers are reached through the [`Container`] trait; HDF5 files are
//! supported with the `hdf5` feature, and [`MemoryContainer`] builds trees
//! in memory.
//!

pub mod assembler;
pub mod axis;
pub mod container;
mod error;
pub mod filter;
pub mod geometry;
#[cfg(feature = "hdf5")]
pub mod hdf5;
pub mod info;
pub mod instrument;
pub mod memory;
pub mod tree;
pub mod view;

pub use assembler::{AssembleRequest, Assembler, BlockId, IdRange, DEFAULT_AXIS};
pub use axis::Axis;
pub use container::{AttrValue, ChildEntry, Container, NodeKind, FIELD_TAG};
pub use error::{Error, Result};
pub use filter::PixelList;
pub use geometry::GeometryResolver;
#[cfg(feature = "hdf5")]
pub use crate::hdf5::Hdf5Container;
pub use info::AuxiliaryInformation;
pub use instrument::{InstrumentProfile, InstrumentTable};
pub use memory::MemoryContainer;
pub use tree::TreeIndex;
pub use view::{DataView, ExtractRequest};
