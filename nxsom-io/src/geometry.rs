//! Instrument geometry resolution.

use crate::axis::read_units;
use crate::container::{basename, entry_name, join_path, Container, NodeKind};
use crate::instrument::{expand, GeometryField, InstrumentProfile, InstrumentTable, SecondarySource};
use crate::tree::TreeIndex;
use crate::{Error, Result};
use log::{debug, warn};
use nxsom_core::{
    vector_magnitude, DetectorGeometry, DifferentialGeometry, GeometryRecord, Measurement,
    MonitorGeometry, Selected, Selector, ValueVariance,
};

const TRANSLATION: &str = "origin/translation/distance";

/// Builds geometry records for detector banks and monitors.
#[derive(Debug, Clone)]
pub struct GeometryResolver {
    profile: InstrumentProfile,
    instrument: Option<String>,
    beamline: Option<String>,
    primary: ValueVariance,
    detectors: Vec<String>,
    monitors: Vec<String>,
}

impl GeometryResolver {
    /// Reads the instrument name, beamline and moderator distance, and picks
    /// the instrument's profile from `table`.
    pub fn new<C: Container + ?Sized>(
        container: &C,
        tree: &TreeIndex,
        table: &InstrumentTable,
    ) -> Self {
        let instruments = tree.list_type("NXinstrument");
        let last = instruments.last();
        let instrument = last
            .and_then(|path| {
                container
                    .read_attribute(&join_path(path, "name"), "short_name")
                    .ok()
                    .flatten()
            })
            .map(|value| value.to_text());
        let beamline = last.and_then(|path| {
            let path = join_path(path, "beamline");
            tree.contains(&path)
                .then(|| container.read_text(&path).ok())
                .flatten()
        });

        let primary = tree
            .list_type("NXmoderator")
            .last()
            .and_then(|path| read_measurement(container, tree, &join_path(path, "distance")))
            .map_or((f64::NAN, f64::NAN), |distance| {
                (distance.value().abs(), distance.variance())
            });

        debug!(
            "instrument {:?}, beamline {:?}, primary flight path {:?}",
            instrument, beamline, primary
        );

        Self {
            profile: table.profile(instrument.as_deref()).clone(),
            instrument,
            beamline,
            primary,
            detectors: tree.list_type("NXdetector"),
            monitors: tree.list_type("NXmonitor"),
        }
    }

    /// Short name of the instrument.
    #[must_use]
    pub fn instrument_name(&self) -> Option<&str> {
        self.instrument.as_deref()
    }

    #[must_use]
    pub fn beamline(&self) -> Option<&str> {
        self.beamline.as_deref()
    }

    /// Moderator-to-sample distance.
    #[must_use]
    pub fn primary(&self) -> ValueVariance {
        self.primary
    }

    #[must_use]
    pub fn profile(&self) -> &InstrumentProfile {
        &self.profile
    }

    /// Geometry of the bank or monitor a data block at `location` belongs to.
    ///
    /// Returns `Ok(None)` when neither a monitor nor a detector group carries
    /// the block's label.
    ///
    /// # Errors
    /// Returns an error if differential geometry is configured but its row
    /// stride cannot be determined.
    pub fn resolve<C: Container + ?Sized>(
        &self,
        container: &C,
        tree: &TreeIndex,
        location: &str,
    ) -> Result<Option<GeometryRecord>> {
        let bank = basename(location);
        let entry = entry_name(location);

        if let Some(monitor) = find_group(&self.monitors, bank, entry) {
            return Ok(Some(GeometryRecord::Monitor(
                self.monitor(container, tree, monitor),
            )));
        }

        let configured = self
            .profile
            .bank(bank)
            .and_then(|rule| rule.detector_group.as_deref())
            .map(|template| expand(template, location, entry, bank))
            .filter(|path| tree.contains(path));
        let group = match configured {
            Some(path) => path,
            None => match find_group(&self.detectors, bank, entry) {
                Some(path) => path.to_string(),
                None => return Ok(None),
            },
        };

        let detector = self.detector(container, tree, &group, bank)?;
        Ok(Some(GeometryRecord::Detector(Box::new(detector))))
    }

    fn monitor<C: Container + ?Sized>(
        &self,
        container: &C,
        tree: &TreeIndex,
        group: &str,
    ) -> MonitorGeometry {
        let primary = read_measurement(container, tree, &join_path(group, "distance"))
            .map_or((f64::NAN, f64::NAN), |distance| {
                (self.primary.0 + distance.value(), distance.variance())
            });
        MonitorGeometry { primary }
    }

    fn detector<C: Container + ?Sized>(
        &self,
        container: &C,
        tree: &TreeIndex,
        group: &str,
        bank: &str,
    ) -> Result<DetectorGeometry> {
        let read = |name: &str| read_measurement(container, tree, &join_path(group, name));
        let read_field = |field: GeometryField, name: &str| {
            if self.profile.reads(bank, field) {
                read(name)
            } else {
                debug!("{group}: {name} not read for {bank}");
                None
            }
        };

        let secondary = read_field(GeometryField::Secondary, "secondary_flight_path")
            .or_else(|| read_field(GeometryField::Secondary, "distance"));
        let polar = read_field(GeometryField::Polar, "polar_angle");
        let azimuthal = read_field(GeometryField::Azimuthal, "azimuthal_angle");

        let row_stride = [&secondary, &polar, &azimuthal]
            .into_iter()
            .flatten()
            .find(|m| m.shape.len() >= 2)
            .map(|m| m.shape[1]);

        let det_secondary = match (&self.instrument, self.profile.det_secondary) {
            (None, _) => None,
            (Some(_), SecondarySource::Unavailable) => Some((f64::NAN, f64::NAN)),
            (Some(_), SecondarySource::TranslationMagnitude) => Some(match read(TRANSLATION) {
                Some(m) if m.values.len() >= 3 => vector_magnitude(
                    [m.values[0], m.values[1], m.values[2]],
                    m.variances.as_deref(),
                ),
                _ => (f64::NAN, f64::NAN),
            }),
        };

        let differential = if self.profile.differential.is_empty() {
            None
        } else {
            let row_stride = match row_stride {
                Some(stride) => stride,
                None => {
                    let dh = join_path(group, "dh");
                    let dims = container.dimensions(&dh)?;
                    *dims.get(1).ok_or_else(|| {
                        Error::Configuration(format!("{dh} is not two-dimensional"))
                    })?
                }
            };
            let quantities = self
                .profile
                .differential
                .iter()
                .map(|name| {
                    let selected = read(name.as_str())
                        .map(|m| Selected::new(m, Selector::Grid { row_stride }));
                    (name.clone(), selected)
                })
                .collect();
            Some(DifferentialGeometry {
                row_stride,
                quantities,
            })
        };

        let instrument = self
            .profile
            .bank(bank)
            .and_then(|rule| rule.instrument.clone())
            .or_else(|| self.instrument.clone());

        Ok(DetectorGeometry {
            instrument,
            primary: self.primary,
            det_secondary,
            secondary: self.select(secondary, bank, GeometryField::Secondary),
            polar: self.select(polar, bank, GeometryField::Polar),
            azimuthal: self.select(azimuthal, bank, GeometryField::Azimuthal),
            x_pixel_offset: read("x_pixel_offset").map(|m| m.values),
            y_pixel_offset: read("y_pixel_offset").map(|m| m.values),
            row_stride,
            differential,
        })
    }

    fn select(
        &self,
        measurement: Option<Measurement>,
        bank: &str,
        field: GeometryField,
    ) -> Option<Selected> {
        measurement.map(|m| {
            let vector = self.profile.vector_for(bank, field).selector();
            let selector = Selector::for_shape(&m.shape, m.values.len(), vector);
            Selected::new(m, selector)
        })
    }
}

/// Group labelled `bank`, preferring one under `entry`.
fn find_group<'a>(paths: &'a [String], bank: &str, entry: &str) -> Option<&'a str> {
    let mut candidates = paths.iter().filter(|path| basename(path) == bank);
    let first = candidates.clone().next();
    candidates
        .find(|path| entry_name(path) == entry)
        .or(first)
        .map(String::as_str)
}

/// Reads a field with its sibling `<field>_errors`.
///
/// Absent fields are `None`; an unreadable field is logged and treated as
/// absent. Scalars without errors get variance 0.
pub(crate) fn read_measurement<C: Container + ?Sized>(
    container: &C,
    tree: &TreeIndex,
    path: &str,
) -> Option<Measurement> {
    if tree.get(path) != Some(&NodeKind::Field) {
        return None;
    }
    match try_read_measurement(container, tree, path) {
        Ok(measurement) => Some(measurement),
        Err(e) => {
            warn!("ignoring unreadable {path}: {e}");
            None
        }
    }
}

fn try_read_measurement<C: Container + ?Sized>(
    container: &C,
    tree: &TreeIndex,
    path: &str,
) -> Result<Measurement> {
    let values = container.read_values(path)?;
    let shape = container.dimensions(path)?;
    let errors = format!("{path}_errors");
    let variances = if tree.contains(&errors) {
        Some(container.read_values(&errors)?)
    } else if values.len() == 1 {
        Some(vec![0.0])
    } else {
        None
    };
    Ok(Measurement {
        values,
        variances,
        units: read_units(container, path),
        shape,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryContainer;
    use approx::assert_relative_eq;

    fn instrument(name: Option<&str>) -> MemoryContainer {
        let mut container = MemoryContainer::new("geometry.nxs");
        container
            .add_group("/entry", "NXentry")
            .add_group("/entry/instrument", "NXinstrument")
            .add_text("/entry/instrument/beamline", "BL2")
            .add_group("/entry/instrument/moderator", "NXmoderator")
            .add_scalar("/entry/instrument/moderator/distance", -20.0)
            .add_scalar("/entry/instrument/moderator/distance_errors", 0.01)
            .add_group("/entry/monitor1", "NXmonitor")
            .add_scalar("/entry/monitor1/distance", -2.5);
        if let Some(name) = name {
            container
                .add_text("/entry/instrument/name", name)
                .set_attr("/entry/instrument/name", "short_name", name.into());
        }
        container
    }

    fn resolve(container: &MemoryContainer, location: &str) -> Option<GeometryRecord> {
        let tree = TreeIndex::build(container);
        GeometryResolver::new(container, &tree, &InstrumentTable::builtin())
            .resolve(container, &tree, location)
            .unwrap()
    }

    fn detector(record: Option<GeometryRecord>) -> DetectorGeometry {
        match record {
            Some(GeometryRecord::Detector(detector)) => *detector,
            other => panic!("expected detector geometry, got {other:?}"),
        }
    }

    #[test]
    fn test_primary_and_monitor() {
        let container = instrument(Some("REF_L"));
        let tree = TreeIndex::build(&container);
        let resolver = GeometryResolver::new(&container, &tree, &InstrumentTable::builtin());

        assert_eq!(resolver.instrument_name(), Some("REF_L"));
        assert_eq!(resolver.beamline(), Some("BL2"));
        assert_relative_eq!(resolver.primary().0, 20.0);
        assert_relative_eq!(resolver.primary().1, 0.01);

        let record = resolver.resolve(&container, &tree, "/entry/monitor1").unwrap();
        let Some(GeometryRecord::Monitor(monitor)) = record else {
            panic!("expected monitor geometry");
        };
        assert_relative_eq!(monitor.primary.0, 17.5);
        assert_relative_eq!(monitor.primary.1, 0.0);
    }

    #[test]
    fn test_missing_moderator_is_nan() {
        let mut container = MemoryContainer::new("geometry.nxs");
        container
            .add_group("/entry", "NXentry")
            .add_group("/entry/instrument", "NXinstrument")
            .add_group("/entry/instrument/bank1", "NXdetector")
            .add_scalar("/entry/instrument/bank1/distance", 2.0);
        let geometry = detector(resolve(&container, "/entry/bank1"));
        assert!(geometry.primary.0.is_nan());
        assert_eq!(geometry.instrument, None);
        assert_eq!(geometry.det_secondary, None);
    }

    #[test]
    fn test_scalar_vector_and_grid_fields() {
        let mut container = instrument(Some("REF_M"));
        container
            .add_group("/entry/instrument/bank1", "NXdetector")
            .add_field("/entry/instrument/bank1/distance", &[2, 3], vec![1.0; 6])
            .add_scalar("/entry/instrument/bank1/polar_angle", 0.5)
            .add_vector("/entry/instrument/bank1/azimuthal_angle", vec![0.1, 0.2, 0.3])
            .add_vector("/entry/instrument/bank1/x_pixel_offset", vec![-0.1, 0.1])
            .add_group("/entry/instrument/bank1/origin", "NXgeometry")
            .add_group("/entry/instrument/bank1/origin/translation", "NXtranslation")
            .add_vector(
                "/entry/instrument/bank1/origin/translation/distance",
                vec![3.0, 0.0, 4.0],
            );

        let geometry = detector(resolve(&container, "/entry/bank1"));
        assert_eq!(geometry.instrument.as_deref(), Some("REF_M"));
        assert_eq!(geometry.row_stride, Some(3));

        let secondary = geometry.secondary.unwrap();
        assert_eq!(secondary.selector, Selector::Grid { row_stride: 3 });
        assert_eq!(secondary.measurement.variances, None);

        let polar = geometry.polar.unwrap();
        assert_eq!(polar.selector, Selector::Constant);
        assert_eq!(polar.value(1, 2).unwrap(), (0.5, 0.0));

        let azimuthal = geometry.azimuthal.unwrap();
        assert_eq!(azimuthal.selector, Selector::Column);
        assert_relative_eq!(azimuthal.value(0, 2).unwrap().0, 0.3);

        assert_eq!(geometry.x_pixel_offset, Some(vec![-0.1, 0.1]));
        assert_eq!(geometry.y_pixel_offset, None);

        let (r, variance) = geometry.det_secondary.unwrap();
        assert_relative_eq!(r, 5.0);
        assert_relative_eq!(variance, 0.0);
        assert!(geometry.differential.is_none());
    }

    #[test]
    fn test_secondary_flight_path_preferred() {
        let mut container = instrument(Some("REF_L"));
        container
            .add_group("/entry/instrument/bank1", "NXdetector")
            .add_scalar("/entry/instrument/bank1/distance", 1.0)
            .add_scalar("/entry/instrument/bank1/secondary_flight_path", 1.5)
            .add_scalar("/entry/instrument/bank1/secondary_flight_path_errors", 0.2);

        let geometry = detector(resolve(&container, "/entry/bank1"));
        let secondary = geometry.secondary.unwrap();
        assert_eq!(secondary.value(0, 0).unwrap(), (1.5, 0.2));
        assert!(geometry.det_secondary.unwrap().0.is_nan());
    }

    #[test]
    fn test_bss_differential_geometry() {
        let mut container = instrument(Some("BSS"));
        container
            .add_group("/entry/instrument/bank1", "NXdetector")
            .add_vector("/entry/instrument/bank1/distance", vec![2.0, 2.1])
            .add_vector("/entry/instrument/bank1/polar_angle", vec![0.1, 0.2])
            .add_field("/entry/instrument/bank1/azimuthal_angle", &[2, 8], vec![0.0; 16])
            .add_field("/entry/instrument/bank1/dh", &[2, 4], vec![0.5; 8])
            .add_field("/entry/instrument/bank1/dtd", &[2, 4], vec![0.25; 8])
            .add_group("/entry-diff", "NXentry")
            .add_group("/entry-diff/instrument", "NXinstrument")
            .add_text("/entry-diff/instrument/name", "BSS")
            .set_attr("/entry-diff/instrument/name", "short_name", "BSS".into())
            .add_group("/entry-diff/instrument/bank3", "NXdetector")
            .add_field("/entry-diff/instrument/bank3/distance", &[2, 2], vec![3.0; 4])
            .add_vector("/entry-diff/instrument/bank3/azimuthal_angle", vec![0.3, 0.4])
            .add_field("/entry-diff/instrument/bank3/dh", &[2, 2], vec![0.1; 4]);

        let geometry = detector(resolve(&container, "/entry/bank1"));
        assert_eq!(geometry.instrument.as_deref(), Some("BSS"));
        assert!(geometry.det_secondary.unwrap().0.is_nan());
        assert_eq!(geometry.secondary.unwrap().selector, Selector::Column);
        assert_eq!(geometry.polar.unwrap().selector, Selector::Row);
        assert!(geometry.azimuthal.is_none());
        assert_eq!(geometry.row_stride, None);

        let differential = geometry.differential.unwrap();
        assert_eq!(differential.row_stride, 4);
        assert_eq!(differential.quantities.len(), 7);
        let dtd = differential.get("dtd").unwrap();
        assert_relative_eq!(dtd.value(1, 3).unwrap().0, 0.25);
        assert!(differential.get("dlf_dh").is_none());

        let diff = detector(resolve(&container, "/entry-diff/bank3"));
        assert_eq!(diff.instrument.as_deref(), Some("BSS_diff"));
        assert_eq!(diff.row_stride, Some(2));
        let azimuthal = diff.azimuthal.unwrap();
        assert_eq!(azimuthal.selector, Selector::Column);
        assert_relative_eq!(azimuthal.value(0, 1).unwrap().0, 0.4);
    }

    #[test]
    fn test_unknown_bank() {
        let container = instrument(Some("REF_L"));
        assert!(resolve(&container, "/entry/bank9").is_none());
    }
}
