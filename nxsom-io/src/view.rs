//! Data views: one signal field of an `NXdata`/`NXmonitor` group and its axes.

use crate::axis::{read_units, Axis};
use crate::container::{basename, join_path, Container, NodeKind};
use crate::tree::TreeIndex;
use crate::{Error, Result};
use log::{debug, warn};
use nxsom_core::{offset_axis, DatasetType, PixelId, Spectrum};
use std::collections::BTreeMap;

/// Most axes a block may carry.
pub const MAX_AXES: usize = 3;

/// Parameters of one spectrum extraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractRequest {
    /// Position of the independent axis inside the view.
    pub variable: usize,
    /// Number of values per spectrum.
    pub channel_count: usize,
    /// Extent of the second index axis.
    pub row_extent: usize,
    /// Calibration offset added to the independent axis.
    pub offset: Option<f64>,
}

#[derive(Debug, Clone)]
struct BlockCache {
    values: Vec<f64>,
    variances: Option<Vec<f64>>,
}

/// One signal of a data group with its resolved axes.
#[derive(Debug, Clone)]
pub struct DataView {
    location: String,
    signal: i64,
    data: String,
    errors: Option<String>,
    dims: Vec<usize>,
    data_label: String,
    data_units: Option<String>,
    axes: Vec<Axis>,
    variable: usize,
    cache: Option<BlockCache>,
}

impl DataView {
    /// Signal numbers carried by the direct fields of `location`.
    pub fn signals<C: Container + ?Sized>(
        container: &C,
        tree: &TreeIndex,
        location: &str,
    ) -> Vec<i64> {
        fields(tree, location)
            .filter_map(|path| container.read_attribute(path, "signal").ok().flatten())
            .filter_map(|value| value.as_i64())
            .collect()
    }

    /// Resolves the signal field and axes of one data group.
    ///
    /// # Errors
    /// Returns [`Error::MissingSignal`] when no field carries `signal`,
    /// [`Error::Configuration`] when the axes cannot be resolved, and an I/O
    /// error when a field cannot be read.
    pub fn open<C: Container + ?Sized>(
        container: &C,
        tree: &TreeIndex,
        location: &str,
        signal: i64,
    ) -> Result<Self> {
        let mut data = None;
        let mut numbered = BTreeMap::new();

        for path in fields(tree, location) {
            for (name, value) in container.attributes(path)? {
                match name.as_str() {
                    "signal" if value.as_i64() == Some(signal) => data = Some(path.to_string()),
                    "axis" => {
                        let axis = Axis::load(container, path)?;
                        if axis.primary == Some(true) {
                            if let Some(number) = axis.number {
                                numbered.insert(number, axis);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        let Some(data) = data else {
            return Err(Error::MissingSignal {
                location: location.to_string(),
                signal,
            });
        };

        if let Some(axes) = container.read_attribute(&data, "axes")? {
            let axes = axes.to_text();
            let names = axes
                .split([',', ':'])
                .map(str::trim)
                .filter(|name| !name.is_empty());
            for (position, name) in (1_i64..).zip(names) {
                let path = if name.starts_with('/') {
                    name.to_string()
                } else {
                    join_path(location, name)
                };
                numbered.insert(position, Axis::load(container, &path)?);
            }
        }

        let axes: Vec<Axis> = numbered.into_values().collect();
        if axes.is_empty() || axes.len() > MAX_AXES {
            return Err(Error::Configuration(format!(
                "{location}: {} axes resolved for signal {signal}, expected 1 to {MAX_AXES}",
                axes.len()
            )));
        }

        let dims = container.dimensions(&data)?;
        if dims.len() != axes.len() {
            return Err(Error::Configuration(format!(
                "{data} has rank {} but {} axes",
                dims.len(),
                axes.len()
            )));
        }

        let data_label = basename(&data).to_string();
        let errors = ["errors".to_string(), format!("{data_label}_errors")]
            .into_iter()
            .map(|name| join_path(location, &name))
            .find(|path| tree.get(path) == Some(&NodeKind::Field));
        let data_units = read_units(container, &data);

        debug!(
            "{location}:{signal} -> {data} {dims:?}, axes [{}]",
            axes.iter()
                .map(|axis| axis.label.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self {
            location: location.to_string(),
            signal,
            data,
            errors,
            dims,
            data_label,
            data_units,
            axes,
            variable: 0,
            cache: None,
        })
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    #[must_use]
    pub fn signal(&self) -> i64 {
        self.signal
    }

    /// Label of the bank this block belongs to.
    #[must_use]
    pub fn bank(&self) -> &str {
        basename(&self.location)
    }

    /// Path of the dependent field.
    #[must_use]
    pub fn data_path(&self) -> &str {
        &self.data
    }

    #[must_use]
    pub fn errors_path(&self) -> Option<&str> {
        self.errors.as_deref()
    }

    #[must_use]
    pub fn dimensions(&self) -> &[usize] {
        &self.dims
    }

    #[must_use]
    pub fn data_label(&self) -> &str {
        &self.data_label
    }

    #[must_use]
    pub fn data_units(&self) -> Option<&str> {
        self.data_units.as_deref()
    }

    #[must_use]
    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    /// Position of the default variable axis.
    #[must_use]
    pub fn variable(&self) -> usize {
        self.variable
    }

    #[must_use]
    pub fn variable_axis(&self) -> &Axis {
        &self.axes[self.variable]
    }

    /// Position of the axis whose label or location is `name`.
    #[must_use]
    pub fn axis_index(&self, name: &str) -> Option<usize> {
        self.axes.iter().position(|axis| axis.matches(name))
    }

    #[must_use]
    pub fn has_axis(&self, name: &str) -> bool {
        self.axis_index(name).is_some()
    }

    /// Retargets the default variable axis.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if no axis matches `name`.
    pub fn set_variable(&mut self, name: &str) -> Result<()> {
        self.variable = self.axis_index(name).ok_or_else(|| {
            Error::Configuration(format!("{} has no axis {name}", self.location))
        })?;
        Ok(())
    }

    /// Histogram or density, with the number of channels per spectrum.
    ///
    /// # Errors
    /// Returns an error if the data extent along `variable` does not fit the
    /// axis length.
    pub fn classify(&self, variable: usize) -> Result<(DatasetType, usize)> {
        let axis = self.axis(variable)?;
        Ok(DatasetType::classify(self.dims[variable], axis.len())?)
    }

    /// Identifiers of every spectrum of the block.
    ///
    /// # Errors
    /// Returns an error if `variable` is not an axis of the view.
    pub fn ids(&self, variable: usize) -> Result<Vec<PixelId>> {
        let lengths = self.index_lengths(variable)?;
        Ok(match lengths.as_slice() {
            [] => vec![PixelId::Flat(0)],
            [len] => (0..*len).map(PixelId::Flat).collect(),
            [rows, cols, ..] => {
                let mut ids = Vec::with_capacity(rows * cols);
                for row in 0..*rows {
                    for col in 0..*cols {
                        ids.push(PixelId::grid(self.bank(), row, col));
                    }
                }
                ids
            }
        })
    }

    /// Lowest identifier of the block.
    #[must_use]
    pub fn id_min(&self) -> PixelId {
        if self.axes.len() == MAX_AXES {
            PixelId::grid(self.bank(), 0, 0)
        } else {
            PixelId::Flat(0)
        }
    }

    /// Exclusive upper identifier of the block.
    ///
    /// # Errors
    /// Returns an error if `variable` is not an axis of the view.
    pub fn id_max(&self, variable: usize) -> Result<PixelId> {
        let lengths = self.index_lengths(variable)?;
        Ok(match lengths.as_slice() {
            [] => PixelId::Flat(0),
            [len] => PixelId::Flat(*len),
            [rows, cols, ..] => PixelId::grid(self.bank(), *rows, *cols),
        })
    }

    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Reads the dependent block, and its errors block, once.
    ///
    /// # Errors
    /// Returns an error if either block cannot be read.
    pub fn load<C: Container + ?Sized>(&mut self, container: &C) -> Result<()> {
        if self.cache.is_some() {
            return Ok(());
        }
        let values = container.read_values(&self.data)?;
        let variances = match &self.errors {
            Some(path) => Some(
                container
                    .read_values(path)?
                    .into_iter()
                    .map(|sigma| sigma * sigma)
                    .collect(),
            ),
            None => None,
        };
        debug!("cached {} values of {}", values.len(), self.data);
        self.cache = Some(BlockCache { values, variances });
        Ok(())
    }

    /// Extracts one spectrum from the cached block.
    ///
    /// # Errors
    /// Returns an error if the block cannot be loaded or the identifier lies
    /// outside it.
    pub fn extract<C: Container + ?Sized>(
        &mut self,
        container: &C,
        id: &PixelId,
        request: &ExtractRequest,
    ) -> Result<Spectrum> {
        self.axis(request.variable)?;
        self.load(container)?;

        let rank = self.dims.len();
        let count = request.channel_count;
        let origin = self.origin(id, request.variable)?;
        let indices: Vec<usize> = if request.variable + 1 == rank {
            let start = if rank == 1 {
                0
            } else {
                let (row, col) = self.index_coordinates(id);
                count * (col + row * request.row_extent)
            };
            (start..start + count).collect()
        } else {
            let strides = strides(&self.dims);
            let base: usize = origin.iter().zip(&strides).map(|(c, s)| c * s).sum();
            let step = strides[request.variable];
            (0..count).map(|k| base + k * step).collect()
        };

        let Some(cache) = self.cache.as_ref() else {
            return Err(Error::Consistency(format!("{} is not loaded", self.data)));
        };
        let y = gather(&cache.values, &indices)?;
        let var_y = match &cache.variances {
            Some(variances) => gather(variances, &indices)?,
            None => y.clone(),
        };

        Ok(Spectrum {
            id: id.clone(),
            axis: self.independent(request.variable, request.offset),
            axis_variance: None,
            y,
            var_y,
        })
    }

    /// Reads one spectrum straight from the container, bypassing the cache.
    ///
    /// # Errors
    /// Returns an error if the identifier lies outside the block or the read
    /// fails.
    pub fn read_spectrum<C: Container + ?Sized>(
        &self,
        container: &C,
        id: &PixelId,
        variable: usize,
    ) -> Result<Spectrum> {
        self.axis(variable)?;
        let start = self.origin(id, variable)?;
        let mut extents = vec![1; self.dims.len()];
        extents[variable] = self.dims[variable];

        let y = container.read_hyperslab(&self.data, &start, &extents)?;
        let var_y = match &self.errors {
            Some(path) => container
                .read_hyperslab(path, &start, &extents)?
                .into_iter()
                .map(|sigma| sigma * sigma)
                .collect(),
            None => y.clone(),
        };

        Ok(Spectrum {
            id: id.clone(),
            axis: self.axes[variable].values.clone(),
            axis_variance: None,
            y,
            var_y,
        })
    }

    fn axis(&self, variable: usize) -> Result<&Axis> {
        self.axes.get(variable).ok_or_else(|| {
            Error::from(nxsom_core::Error::IndexOutOfRange {
                index: variable,
                len: self.axes.len(),
            })
        })
    }

    fn index_lengths(&self, variable: usize) -> Result<Vec<usize>> {
        self.axis(variable)?;
        Ok(self
            .dims
            .iter()
            .enumerate()
            .filter(|(position, _)| *position != variable)
            .map(|(_, extent)| *extent)
            .collect())
    }

    /// (row, col) of an identifier in index space.
    fn index_coordinates(&self, id: &PixelId) -> (usize, usize) {
        let (row, col) = id.coordinates();
        if self.axes.len() == MAX_AXES {
            (row, col)
        } else {
            (0, col)
        }
    }

    /// Full start coordinate of a spectrum, zero along `variable`.
    fn origin(&self, id: &PixelId, variable: usize) -> Result<Vec<usize>> {
        let (row, col) = self.index_coordinates(id);
        let mut coordinates = match self.dims.len() {
            1 => Vec::new(),
            2 => vec![col],
            _ => vec![row, col],
        }
        .into_iter();

        let mut origin = Vec::with_capacity(self.dims.len());
        for (dim, &extent) in self.dims.iter().enumerate() {
            if dim == variable {
                origin.push(0);
                continue;
            }
            let coordinate = coordinates.next().unwrap_or(0);
            if coordinate >= extent {
                return Err(nxsom_core::Error::IndexOutOfRange {
                    index: coordinate,
                    len: extent,
                }
                .into());
            }
            origin.push(coordinate);
        }
        Ok(origin)
    }

    fn independent(&self, variable: usize, offset: Option<f64>) -> Vec<f64> {
        let values = &self.axes[variable].values;
        match offset {
            None => values.clone(),
            Some(offset) => {
                let (shifted, overflowed) = offset_axis(values, offset);
                if overflowed > 0 {
                    warn!(
                        "{}: {overflowed} axis values overflowed with offset {offset}, set to +inf",
                        self.location
                    );
                }
                shifted
            }
        }
    }
}

/// Direct field children of a group.
fn fields<'a>(tree: &'a TreeIndex, location: &'a str) -> impl Iterator<Item = &'a str> {
    tree.children(location)
        .filter(|(_, kind)| **kind == NodeKind::Field)
        .map(|(path, _)| path)
}

fn strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; dims.len()];
    for dim in (0..dims.len().saturating_sub(1)).rev() {
        strides[dim] = strides[dim + 1] * dims[dim + 1];
    }
    strides
}

fn gather(values: &[f64], indices: &[usize]) -> Result<Vec<f64>> {
    indices
        .iter()
        .map(|&index| {
            values.get(index).copied().ok_or_else(|| {
                Error::from(nxsom_core::Error::IndexOutOfRange {
                    index,
                    len: values.len(),
                })
            })
        })
        .collect()
}
