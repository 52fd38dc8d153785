//! Auxiliary per-entry information, sample description and run parameters.

use crate::axis::read_units;
use crate::container::{basename, entry_name, join_path, Container, NodeKind};
use crate::geometry::read_measurement;
use crate::instrument::{expand, InfoRule, InfoSelector, InstrumentProfile};
use crate::tree::TreeIndex;
use log::debug;
use nxsom_core::{Information, NxParameter, ParameterValue, Sample, Selected, Selector};

/// Quantities collected per `"<key>-<entry>"`, each a list of
/// (data label, value) pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuxiliaryInformation {
    entries: Vec<(String, Vec<(String, Option<Selected>)>)>,
}

impl AuxiliaryInformation {
    /// Evaluates the profile's rules over every detector group and every
    /// group of the profile's extra classes.
    pub fn collect<C: Container + ?Sized>(
        container: &C,
        tree: &TreeIndex,
        profile: &InstrumentProfile,
    ) -> Self {
        let mut info = Self::default();
        if profile.info.is_empty() {
            return info;
        }

        let mut locations = tree.list_type("NXdetector");
        for class in &profile.info_classes {
            locations.extend(tree.list_type(class));
        }

        for location in &locations {
            let mut label = basename(location);
            let entry = entry_name(location);
            if profile.info_skip.iter().any(|skip| skip == label) {
                continue;
            }
            if let Some(alias) = profile.alias(location) {
                label = alias;
            }

            let (group, data_label) = if profile.numbered_info {
                let base = label.trim_end_matches(|c: char| c.is_ascii_digit());
                (base, format!("bank{}", &label[base.len()..]))
            } else {
                (label, label.to_string())
            };

            for rule in profile.info_rules(group) {
                let value = evaluate(container, tree, rule, location, entry);
                info.push(format!("{}-{entry}", rule.key), data_label.clone(), value);
            }
        }

        debug!("collected {} auxiliary quantities", info.entries.len());
        info
    }

    fn push(&mut self, key: String, label: String, value: Option<Selected>) {
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, pairs)) => pairs.push((label, value)),
            None => self.entries.push((key, vec![(label, value)])),
        }
    }

    /// Keys in collection order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// One pair is exposed directly; several become a composite.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Information> {
        let (_, pairs) = self.entries.iter().find(|(existing, _)| existing == key)?;
        Some(match pairs.as_slice() {
            [(_, value)] => Information::Single(value.clone()),
            _ => Information::Composite(pairs.clone()),
        })
    }

    /// Information recorded for `entry`, keyed without the `-<entry>` suffix.
    #[must_use]
    pub fn for_entry(&self, entry: &str) -> Vec<(String, Information)> {
        let suffix = format!("-{entry}");
        self.keys()
            .filter_map(|key| {
                let stripped = key.strip_suffix(&suffix)?;
                Some((stripped.to_string(), self.get(key)?))
            })
            .collect()
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

fn evaluate<C: Container + ?Sized>(
    container: &C,
    tree: &TreeIndex,
    rule: &InfoRule,
    location: &str,
    entry: &str,
) -> Option<Selected> {
    let measurement = std::iter::once(join_path(location, &rule.path))
        .chain(
            rule.fallbacks
                .iter()
                .map(|template| expand(template, location, entry, "")),
        )
        .find_map(|path| read_measurement(container, tree, &path))?;

    let selector = match rule.selector {
        InfoSelector::Constant => Selector::Constant,
        InfoSelector::Grid { vector } => match measurement.shape.as_slice() {
            [_, row_stride, ..] => Selector::Grid {
                row_stride: *row_stride,
            },
            _ => vector?.selector(),
        },
    };
    Some(Selected::new(measurement, selector))
}

/// Sample description from the last `NXsample` group.
pub fn read_sample<C: Container + ?Sized>(container: &C, tree: &TreeIndex) -> Sample {
    let Some(location) = tree.list_type("NXsample").pop() else {
        return Sample::default();
    };
    let text = |name: &str| {
        let path = join_path(&location, name);
        tree.contains(&path)
            .then(|| container.read_text(&path).ok())
            .flatten()
    };
    Sample {
        name: text("name"),
        nature: text("nature"),
        identifier: text("identifier"),
        holder: text("holder"),
        changer_position: text("changer_position"),
    }
}

/// Every field directly under `/<entry>`, as a run parameter.
///
/// Values are numeric when they parse as a number, text otherwise;
/// `run_number` is always text. A proton charge in `microAmp*hour` is
/// converted to `picoCoulomb`.
pub fn run_parameters<C: Container + ?Sized>(
    container: &C,
    tree: &TreeIndex,
    entry: &str,
) -> Vec<(String, NxParameter)> {
    let entry_path = join_path("/", entry);
    tree.children(&entry_path)
        .filter(|(_, kind)| **kind == NodeKind::Field)
        .filter_map(|(path, _)| {
            let key = basename(path);
            let mut units = read_units(container, path);
            let mut value = read_parameter(container, path, key == "run_number")?;

            if key == "proton_charge" && units.as_deref() == Some("microAmp*hour") {
                if let ParameterValue::Number(charge) = &mut value {
                    *charge *= 3.6e9;
                    units = Some("picoCoulomb".to_string());
                }
            }
            Some((key.to_string(), NxParameter { value, units }))
        })
        .collect()
}

fn read_parameter<C: Container + ?Sized>(
    container: &C,
    path: &str,
    as_text: bool,
) -> Option<ParameterValue> {
    if !as_text {
        if let Ok([value]) = container.read_values(path).as_deref() {
            return Some(ParameterValue::Number(*value));
        }
    }
    let text = container.read_text(path).ok()?;
    let text = text.trim().trim_start_matches('[').trim_end_matches(']').trim();
    if !as_text {
        if let Ok(value) = text.parse::<f64>() {
            return Some(ParameterValue::Number(value));
        }
    }
    Some(ParameterValue::Text(text.to_string()))
}
