//! Per-instrument geometry and auxiliary-information rules.
//!
//! Instruments differ in which selector a one-dimensional geometry field
//! uses, whether the detector translation vector is meaningful, which
//! differential-geometry fields exist and which extra quantities are
//! attached to a run. All of that is data in an [`InstrumentTable`],
//! interpreted by [`crate::geometry::GeometryResolver`] and
//! [`crate::info::AuxiliaryInformation`].

use crate::Result;
use nxsom_core::Selector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Geometry quantity that can carry a selector rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryField {
    Secondary,
    Polar,
    Azimuthal,
}

/// Which pixel coordinate indexes a one-dimensional field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorAxis {
    Row,
    #[default]
    Column,
}

impl VectorAxis {
    #[must_use]
    pub fn selector(self) -> Selector {
        match self {
            Self::Row => Selector::Row,
            Self::Column => Selector::Column,
        }
    }
}

/// How the detector's own secondary distance is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondarySource {
    /// Magnitude of `origin/translation/distance`.
    #[default]
    TranslationMagnitude,
    /// Recorded as NaN.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field: GeometryField,
    pub vector: VectorAxis,
}

/// Settings that apply to one bank only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankOverride {
    pub bank: String,
    /// Instrument label reported for the bank.
    pub instrument: Option<String>,
    /// Detector group path; `{entry}` and `{bank}` are substituted.
    pub detector_group: Option<String>,
    pub fields: Vec<FieldRule>,
}

/// Selector given to an auxiliary quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfoSelector {
    Constant,
    /// Row-and-column grid; a one-dimensional field falls back to `vector`,
    /// or is dropped when there is none.
    Grid { vector: Option<VectorAxis> },
}

/// One auxiliary quantity read below a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoRule {
    /// Group base name the rule applies to (`analyzer`, `aperture1`, ...).
    pub group: String,
    /// Attribute key, suffixed with `-<entry>` when stored.
    pub key: String,
    /// Field path relative to the group.
    pub path: String,
    pub selector: InfoSelector,
    /// Alternative paths tried in order when `path` is absent;
    /// `{location}` and `{entry}` are substituted.
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

impl InfoRule {
    fn new(group: &str, key: &str, path: &str, selector: InfoSelector) -> Self {
        Self {
            group: group.to_string(),
            key: key.to_string(),
            path: path.to_string(),
            selector,
            fallbacks: Vec::new(),
        }
    }

    fn with_fallbacks(mut self, fallbacks: &[&str]) -> Self {
        self.fallbacks = fallbacks.iter().map(ToString::to_string).collect();
        self
    }
}

/// Renames a group when collecting auxiliary information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationAlias {
    pub location: String,
    pub label: String,
}

/// Rules for one instrument.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentProfile {
    pub det_secondary: SecondarySource,
    pub fields: Vec<FieldRule>,
    /// Fields read only for banks whose override has a rule for them.
    pub bank_fields: Vec<GeometryField>,
    /// Differential geometry fields read from every detector bank.
    pub differential: Vec<String>,
    pub banks: Vec<BankOverride>,
    /// Group classes searched for auxiliary information besides `NXdetector`.
    pub info_classes: Vec<String>,
    /// Split trailing digits off group names (`analyzer3` -> `analyzer`,
    /// labelled `bank3`).
    pub numbered_info: bool,
    pub info_aliases: Vec<LocationAlias>,
    /// Banks excluded from auxiliary information.
    pub info_skip: Vec<String>,
    pub info: Vec<InfoRule>,
}

impl InstrumentProfile {
    /// Override for `bank`, if any.
    #[must_use]
    pub fn bank(&self, bank: &str) -> Option<&BankOverride> {
        self.banks.iter().find(|rule| rule.bank == bank)
    }

    /// Selector axis for a one-dimensional `field` of `bank`.
    #[must_use]
    pub fn vector_for(&self, bank: &str, field: GeometryField) -> VectorAxis {
        let bank_rules = self.bank(bank).map(|rule| rule.fields.as_slice()).unwrap_or(&[]);
        bank_rules
            .iter()
            .chain(&self.fields)
            .find(|rule| rule.field == field)
            .map(|rule| rule.vector)
            .unwrap_or_default()
    }

    /// Whether `field` is read for `bank` at all.
    #[must_use]
    pub fn reads(&self, bank: &str, field: GeometryField) -> bool {
        !self.bank_fields.contains(&field)
            || self
                .bank(bank)
                .is_some_and(|rule| rule.fields.iter().any(|rule| rule.field == field))
    }

    /// Auxiliary rules for groups with base name `group`.
    pub fn info_rules<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a InfoRule> {
        self.info.iter().filter(move |rule| rule.group == group)
    }

    /// Label a group is collected under.
    #[must_use]
    pub fn alias(&self, location: &str) -> Option<&str> {
        self.info_aliases
            .iter()
            .find(|alias| alias.location == location)
            .map(|alias| alias.label.as_str())
    }
}

/// Instrument profiles keyed by instrument short name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentTable {
    /// Profile for instruments without an entry, or without a name.
    pub default: InstrumentProfile,
    pub instruments: BTreeMap<String, InstrumentProfile>,
}

impl InstrumentTable {
    /// Profiles for the SNS instruments BSS, REF_L, REF_M and GLAD.
    #[must_use]
    pub fn builtin() -> Self {
        let mut instruments = BTreeMap::new();
        instruments.insert("BSS".to_string(), bss());
        instruments.insert("REF_L".to_string(), ref_l());
        instruments.insert("REF_M".to_string(), ref_m());
        instruments.insert(
            "GLAD".to_string(),
            InstrumentProfile {
                fields: vec![FieldRule {
                    field: GeometryField::Azimuthal,
                    vector: VectorAxis::Column,
                }],
                ..InstrumentProfile::default()
            },
        );
        Self {
            default: InstrumentProfile::default(),
            instruments,
        }
    }

    /// Load a table from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a valid table.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Load a table from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the text is not a valid table.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the table as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Profile for `instrument`, falling back to the default profile.
    #[must_use]
    pub fn profile(&self, instrument: Option<&str>) -> &InstrumentProfile {
        instrument
            .and_then(|name| self.instruments.get(name))
            .unwrap_or(&self.default)
    }
}

/// Substitutes `{location}`, `{entry}` and `{bank}` in a path template.
pub(crate) fn expand(template: &str, location: &str, entry: &str, bank: &str) -> String {
    template
        .replace("{location}", location)
        .replace("{entry}", entry)
        .replace("{bank}", bank)
}

fn bss() -> InstrumentProfile {
    InstrumentProfile {
        det_secondary: SecondarySource::Unavailable,
        fields: vec![
            FieldRule {
                field: GeometryField::Secondary,
                vector: VectorAxis::Column,
            },
            FieldRule {
                field: GeometryField::Polar,
                vector: VectorAxis::Row,
            },
        ],
        bank_fields: vec![GeometryField::Azimuthal],
        differential: ["dlf_dh", "dpol_dtd", "dpol_dh", "dazi_dh", "dazi_dtd", "dh", "dtd"]
            .iter()
            .map(ToString::to_string)
            .collect(),
        banks: vec![BankOverride {
            bank: "bank3".to_string(),
            instrument: Some("BSS_diff".to_string()),
            detector_group: Some("/entry-diff/instrument/{bank}".to_string()),
            fields: vec![FieldRule {
                field: GeometryField::Azimuthal,
                vector: VectorAxis::Column,
            }],
        }],
        info_classes: vec!["NXcrystal".to_string()],
        numbered_info: true,
        info_aliases: Vec::new(),
        info_skip: vec!["bank3".to_string()],
        info: vec![InfoRule::new(
            "analyzer",
            "Wavelength_final",
            "wavelength",
            InfoSelector::Grid {
                vector: Some(VectorAxis::Column),
            },
        )],
    }
}

fn ref_l() -> InstrumentProfile {
    let slit = |n: u8, key: &str, path: &str| {
        InfoRule::new(
            &format!("aperture{n}"),
            &format!("Slit{n}_{key}"),
            path,
            InfoSelector::Constant,
        )
    };
    InstrumentProfile {
        info_classes: vec!["NXaperture".to_string()],
        info: vec![
            slit(1, "distance", "distance"),
            slit(1, "top", "s1t/value"),
            slit(1, "bottom", "s1b/value"),
            slit(2, "distance", "distance"),
            slit(2, "top", "s2t/value"),
            slit(2, "bottom", "s2b/value"),
            InfoRule::new("bank1", "Theta", "Theta/readback", InfoSelector::Constant),
            InfoRule::new("bank1", "TwoTheta", "TwoTheta/readback", InfoSelector::Constant),
        ],
        ..InstrumentProfile::default()
    }
}

fn ref_m() -> InstrumentProfile {
    let slit = |n: u8, key: &str, path: String| {
        let fallback = format!("/{{entry}}/{path}");
        InfoRule::new(
            &format!("aperture{n}"),
            &format!("Slit{n}_{key}"),
            &path,
            InfoSelector::Constant,
        )
        .with_fallbacks(&[fallback.as_str()])
    };
    InstrumentProfile {
        fields: vec![FieldRule {
            field: GeometryField::Azimuthal,
            vector: VectorAxis::Column,
        }],
        info_classes: ["NXaperture", "NXpositioner", "NXsample"]
            .iter()
            .map(ToString::to_string)
            .collect(),
        info_aliases: vec![
            LocationAlias {
                location: "/entry/TSlit1".to_string(),
                label: "aperture1".to_string(),
            },
            LocationAlias {
                location: "/entry/TSlit3".to_string(),
                label: "aperture3".to_string(),
            },
        ],
        info: vec![
            slit(1, "distance", "distance".to_string()),
            slit(1, "left", "LSlit1/value".to_string()),
            slit(1, "right", "RSlit1/value".to_string()),
            slit(3, "distance", "distance".to_string()),
            slit(3, "left", "LSlit3/value".to_string()),
            slit(3, "right", "RSlit3/value".to_string()),
            InfoRule::new("bank1", "TwoTheta", "DANGLE/readback", InfoSelector::Constant)
                .with_fallbacks(&["{location}/TwoTheta/readback"]),
            InfoRule::new("sample", "Theta", "SANGLE/readback", InfoSelector::Constant)
                .with_fallbacks(&[
                    "{location}/Omega/readback",
                    "/{entry}/instrument/bank1/Omega/readback",
                ]),
        ],
        ..InstrumentProfile::default()
    }
}
