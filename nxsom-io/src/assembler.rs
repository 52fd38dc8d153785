//! Assembles spectrum collections from a container.
//!
//! The [`Assembler`] owns the container. It indexes the tree once, opens a
//! [`DataView`] for every signal of every `NXdata` and `NXmonitor` group,
//! and resolves geometry, auxiliary information and sample metadata. Each
//! [`Assembler::assemble`] call then filters pixel ids and extracts spectra
//! for the requested blocks.

use crate::container::{entry_name, join_path, Container};
use crate::filter::PixelList;
use crate::geometry::GeometryResolver;
use crate::info::{read_sample, run_parameters, AuxiliaryInformation};
use crate::instrument::InstrumentTable;
use crate::tree::TreeIndex;
use crate::view::{DataView, ExtractRequest};
use crate::{Error, Result};
use log::{debug, warn};
use nxsom_core::{
    apply_mask, apply_roi, enumerate_ids, AttrEntry, GeometryRecord, InstrumentGeometry, PixelId,
    Sample, Spectrum, SpectrumCollection,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Independent axis used when none is requested.
pub const DEFAULT_AXIS: &str = "time_of_flight";

/// A data block: group location and signal number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockId {
    pub location: String,
    pub signal: i64,
}

impl BlockId {
    pub fn new(location: impl Into<String>, signal: i64) -> Self {
        Self {
            location: location.into(),
            signal,
        }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.location, self.signal)
    }
}

/// Parses `location[:signal]`; the signal defaults to 1.
impl FromStr for BlockId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.rsplit_once(':') {
            Some((location, signal)) => {
                let signal = signal
                    .parse()
                    .map_err(|_| Error::Configuration(format!("invalid block id: {s}")))?;
                Ok(Self::new(location, signal))
            }
            None => Ok(Self::new(s, 1)),
        }
    }
}

/// Optional start and end ids of one block.
pub type IdRange = (Option<PixelId>, Option<PixelId>);

/// What to assemble.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembleRequest {
    /// Blocks to read; the assembler's selection when empty.
    pub blocks: Vec<BlockId>,
    /// Independent axis; the assembler's axis when unset.
    pub axis: Option<String>,
    /// One range for all blocks, or one per block.
    pub ranges: Vec<IdRange>,
    pub mask_file: Option<PathBuf>,
    pub roi_file: Option<PathBuf>,
    /// Calibration offset added to the independent axis.
    pub tof_offset: Option<f64>,
}

impl AssembleRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_blocks(mut self, blocks: Vec<BlockId>) -> Self {
        self.blocks = blocks;
        self
    }

    #[must_use]
    pub fn with_axis(mut self, axis: impl Into<String>) -> Self {
        self.axis = Some(axis.into());
        self
    }

    /// Set one id range for every block.
    #[must_use]
    pub fn with_range(mut self, start: Option<PixelId>, end: Option<PixelId>) -> Self {
        self.ranges = vec![(start, end)];
        self
    }

    /// Set one id range per block, in block order.
    #[must_use]
    pub fn with_ranges(mut self, ranges: Vec<IdRange>) -> Self {
        self.ranges = ranges;
        self
    }

    #[must_use]
    pub fn with_mask_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.mask_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_roi_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.roi_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_tof_offset(mut self, offset: f64) -> Self {
        self.tof_offset = Some(offset);
        self
    }

    fn range_for(&self, index: usize) -> (Option<&PixelId>, Option<&PixelId>) {
        let range = if self.ranges.len() == 1 {
            self.ranges.first()
        } else {
            self.ranges.get(index)
        };
        range.map_or((None, None), |(start, end)| (start.as_ref(), end.as_ref()))
    }
}

/// Builds spectrum collections from one container.
#[derive(Debug)]
pub struct Assembler<C: Container> {
    container: Option<C>,
    tree: TreeIndex,
    views: Vec<DataView>,
    selected: Vec<BlockId>,
    axis: String,
    geometry: GeometryResolver,
    information: AuxiliaryInformation,
    sample: Sample,
}

impl<C: Container> Assembler<C> {
    /// Indexes `container` using the built-in instrument table.
    pub fn new(container: C) -> Self {
        Self::with_table(container, &InstrumentTable::builtin())
    }

    /// Indexes `container` using `table` for instrument rules.
    ///
    /// Blocks whose view cannot be resolved are logged and left out.
    pub fn with_table(container: C, table: &InstrumentTable) -> Self {
        let tree = TreeIndex::build(&container);

        let mut views = Vec::new();
        let mut selected = Vec::new();
        for class in ["NXdata", "NXmonitor"] {
            for location in tree.list_type(class) {
                for signal in DataView::signals(&container, &tree, &location) {
                    match DataView::open(&container, &tree, &location, signal) {
                        Ok(view) => {
                            if class == "NXdata" {
                                selected.push(BlockId::new(location.as_str(), signal));
                            }
                            views.push(view);
                        }
                        Err(e) => warn!("skipping block {location}:{signal}: {e}"),
                    }
                }
            }
        }

        let geometry = GeometryResolver::new(&container, &tree, table);
        let information = AuxiliaryInformation::collect(&container, &tree, geometry.profile());
        let sample = read_sample(&container, &tree);
        debug!(
            "{}: {} nodes, {} blocks ({} selected)",
            container.name(),
            tree.len(),
            views.len(),
            selected.len()
        );

        Self {
            container: Some(container),
            tree,
            views,
            selected,
            axis: DEFAULT_AXIS.to_string(),
            geometry,
            information,
            sample,
        }
    }

    fn container(&self) -> Result<&C> {
        self.container.as_ref().ok_or(Error::Closed)
    }

    /// Name of the underlying container.
    ///
    /// # Errors
    /// Returns [`Error::Closed`] after [`Assembler::release`].
    pub fn name(&self) -> Result<&str> {
        Ok(self.container()?.name())
    }

    /// # Errors
    /// Returns [`Error::Closed`] after [`Assembler::release`].
    pub fn tree(&self) -> Result<&TreeIndex> {
        self.container()?;
        Ok(&self.tree)
    }

    /// # Errors
    /// Returns [`Error::Closed`] after [`Assembler::release`].
    pub fn instrument_name(&self) -> Result<Option<&str>> {
        self.container()?;
        Ok(self.geometry.instrument_name())
    }

    /// # Errors
    /// Returns [`Error::Closed`] after [`Assembler::release`].
    pub fn beamline(&self) -> Result<Option<&str>> {
        self.container()?;
        Ok(self.geometry.beamline())
    }

    /// # Errors
    /// Returns [`Error::Closed`] after [`Assembler::release`].
    pub fn sample(&self) -> Result<&Sample> {
        self.container()?;
        Ok(&self.sample)
    }

    /// # Errors
    /// Returns [`Error::Closed`] after [`Assembler::release`].
    pub fn information(&self) -> Result<&AuxiliaryInformation> {
        self.container()?;
        Ok(&self.information)
    }

    /// Every block with a resolvable view, `NXdata` before `NXmonitor`.
    ///
    /// # Errors
    /// Returns [`Error::Closed`] after [`Assembler::release`].
    pub fn block_ids(&self) -> Result<Vec<BlockId>> {
        self.container()?;
        Ok(self
            .views
            .iter()
            .map(|view| BlockId::new(view.location(), view.signal()))
            .collect())
    }

    /// Blocks assembled when a request names none.
    ///
    /// # Errors
    /// Returns [`Error::Closed`] after [`Assembler::release`].
    pub fn selected_blocks(&self) -> Result<&[BlockId]> {
        self.container()?;
        Ok(&self.selected)
    }

    /// Adds a block to the selection.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for an unknown block.
    pub fn select_block(&mut self, location: &str, signal: i64) -> Result<()> {
        let block = BlockId::new(location, signal);
        self.view(&block)?;
        if !self.selected.contains(&block) {
            self.selected.push(block);
        }
        Ok(())
    }

    /// The view of one block.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for an unknown block.
    pub fn view(&self, block: &BlockId) -> Result<&DataView> {
        self.container()?;
        self.views
            .iter()
            .find(|view| view.location() == block.location && view.signal() == block.signal)
            .ok_or_else(|| Error::Configuration(format!("unknown block {block}")))
    }

    /// Independent axis used when a request names none.
    #[must_use]
    pub fn variable_axis(&self) -> &str {
        &self.axis
    }

    /// Changes the default independent axis.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if a selected block lacks the axis.
    pub fn set_variable_axis(&mut self, name: &str) -> Result<()> {
        for block in &self.selected {
            if !self.view(block)?.has_axis(name) {
                return Err(Error::Configuration(format!("{block} has no axis {name}")));
            }
        }
        self.axis = name.to_string();
        Ok(())
    }

    /// Spectrum ids of one block along the default axis.
    ///
    /// # Errors
    /// Returns an error for an unknown block or after release.
    pub fn spectrum_ids(&self, block: &BlockId) -> Result<Vec<PixelId>> {
        let view = self.view(block)?;
        view.ids(view.axis_index(&self.axis).unwrap_or(view.variable()))
    }

    /// Reads one spectrum directly from the container, along `axis` or the
    /// default variable axis.
    ///
    /// # Errors
    /// Returns an error for an unknown block or axis, an id outside the
    /// block, or a failed read.
    pub fn spectrum(&self, block: &BlockId, id: &PixelId, axis: Option<&str>) -> Result<Spectrum> {
        let container = self.container()?;
        let view = self.view(block)?;
        let variable = match axis {
            Some(name) => view.axis_index(name).ok_or_else(|| {
                Error::Configuration(format!("{block} has no axis {name}"))
            })?,
            None => view.axis_index(&self.axis).unwrap_or(view.variable()),
        };
        view.read_spectrum(container, id, variable)
    }

    /// Geometry of the bank or monitor at `location`.
    ///
    /// # Errors
    /// Returns an error after release or if the geometry cannot be built.
    pub fn geometry(&self, location: &str) -> Result<Option<GeometryRecord>> {
        let container = self.container()?;
        self.geometry.resolve(container, &self.tree, location)
    }

    /// Builds a spectrum collection.
    ///
    /// # Errors
    /// Returns [`Error::Closed`] after release, [`Error::Consistency`] when
    /// blocks disagree on their dataset type or ids do not fit a block, and
    /// any error raised while reading files or extracting spectra.
    pub fn assemble(&mut self, request: &AssembleRequest) -> Result<SpectrumCollection> {
        let container = self.container.as_ref().ok_or(Error::Closed)?;
        let blocks = if request.blocks.is_empty() {
            self.selected.clone()
        } else {
            request.blocks.clone()
        };
        let Some(first) = blocks.first() else {
            return Err(Error::Consistency("no data blocks selected".to_string()));
        };
        let entry = entry_name(&first.location).to_string();
        let axis = request.axis.as_deref().unwrap_or(&self.axis).to_string();

        let mask = request.mask_file.as_ref().map(PixelList::from_file).transpose()?;
        let roi = request.roi_file.as_ref().map(PixelList::from_file).transpose()?;

        let mut collection = SpectrumCollection::new();
        collection.title = self
            .tree
            .list_type("NXentry")
            .first()
            .map(|path| join_path(path, "title"))
            .filter(|path| self.tree.contains(path))
            .and_then(|path| container.read_text(&path).ok())
            .unwrap_or_default();

        let attributes = &mut collection.attributes;
        attributes.insert("filename", AttrEntry::Text(container.name().to_string()));
        attributes.insert(
            "instrument_name",
            self.geometry.instrument_name().map(ToString::to_string).into(),
        );
        attributes.insert(
            "beamline",
            self.geometry.beamline().map(ToString::to_string).into(),
        );
        if let Some(path) = &request.mask_file {
            attributes.insert("mask_file", AttrEntry::Text(display(path)));
        }
        if let Some(path) = &request.roi_file {
            attributes.insert("roi_file", AttrEntry::Text(display(path)));
        }
        attributes.insert("sample", AttrEntry::Sample(self.sample.clone()));

        let mut geometry = Vec::with_capacity(blocks.len());
        for (index, block) in blocks.iter().enumerate() {
            let view = self
                .views
                .iter_mut()
                .find(|view| view.location() == block.location && view.signal() == block.signal)
                .ok_or_else(|| Error::Configuration(format!("unknown block {block}")))?;
            let bank = view.bank().to_string();

            let record = match self.geometry.resolve(container, &self.tree, &block.location) {
                Ok(record) => record,
                Err(e) => {
                    warn!("no geometry for {bank}: {e}");
                    None
                }
            };
            geometry.push((bank.clone(), record));

            let variable = view.axis_index(&axis).unwrap_or(view.variable());
            let independent = &view.axes()[variable];
            collection.axis_label.clone_from(&independent.label);
            collection.axis_units.clone_from(&independent.units);
            collection.y_label = view.data_label().to_string();
            collection.y_units = view.data_units().map(ToString::to_string);

            for (key, parameter) in run_parameters(container, &self.tree, entry_name(&block.location))
            {
                collection
                    .attributes
                    .insert(key, AttrEntry::Parameter(parameter));
            }

            let (dataset_type, channel_count) = view.classify(variable)?;
            collection
                .set_dataset_type(dataset_type)
                .map_err(|e| Error::Consistency(format!("{block}: {e}")))?;

            let (start, end) = request.range_for(index);
            let max = view.id_max(variable)?;
            let (start, end) = clamp_range(start, end, &view.id_min(), &max, &bank)?;
            let mut ids = enumerate_ids(&start, &end, &bank)?;
            if let Some(mask) = &mask {
                ids = apply_mask(ids, mask.as_slice());
            }
            if let Some(roi) = &roi {
                ids = apply_roi(&ids, &bank, roi.as_slice());
            }

            let extract = ExtractRequest {
                variable,
                channel_count,
                row_extent: match max {
                    PixelId::Grid { col, .. } => col,
                    PixelId::Flat(_) => 1,
                },
                offset: request.tof_offset,
            };
            debug!(
                "{block}: {} {dataset_type} spectra of {channel_count} channels",
                ids.len()
            );
            for id in &ids {
                collection.push(view.extract(container, id, &extract)?);
            }
        }

        let instrument = if geometry.len() > 1 {
            InstrumentGeometry::Composite(geometry)
        } else {
            InstrumentGeometry::Single(geometry.pop().and_then(|(_, record)| record))
        };
        collection
            .attributes
            .insert("instrument", AttrEntry::Geometry(instrument));

        for (key, information) in self.information.for_entry(&entry) {
            collection
                .attributes
                .insert(key, AttrEntry::Information(information));
        }

        Ok(collection)
    }

    /// Drops the container and every view. Later calls fail with
    /// [`Error::Closed`]; releasing twice is harmless.
    pub fn release(&mut self) {
        if let Some(container) = self.container.take() {
            debug!("released {}", container.name());
            self.views.clear();
            self.selected.clear();
        }
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.container.is_none()
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Clamps optional start and end ids into `[min, max]`, component-wise.
fn clamp_range(
    start: Option<&PixelId>,
    end: Option<&PixelId>,
    min: &PixelId,
    max: &PixelId,
    bank: &str,
) -> Result<(PixelId, PixelId)> {
    let start = match start {
        Some(id) => clamp(id, min, bank, usize::max)?,
        None => min.clone(),
    };
    let end = match end {
        Some(id) => clamp(id, max, bank, usize::min)?,
        None => max.clone(),
    };
    Ok((start, end))
}

fn clamp(id: &PixelId, bound: &PixelId, bank: &str, pick: fn(usize, usize) -> usize) -> Result<PixelId> {
    match (id, bound) {
        (PixelId::Flat(index), PixelId::Flat(limit)) => Ok(PixelId::Flat(pick(*index, *limit))),
        (
            PixelId::Grid { row, col, .. },
            PixelId::Grid {
                row: row_limit,
                col: col_limit,
                ..
            },
        ) => Ok(PixelId::grid(
            bank,
            pick(*row, *row_limit),
            pick(*col, *col_limit),
        )),
        _ => Err(Error::Consistency(format!(
            "pixel id {id} does not fit block ids like {bound}"
        ))),
    }
}
