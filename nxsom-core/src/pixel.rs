//! Pixel identifiers and pixel-set filtering.

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of one spectrum inside a data block.
///
/// One-dimensional index spaces (a monitor, or a block with a single index
/// axis) use [`PixelId::Flat`]; detector banks addressed by tube and pixel use
/// [`PixelId::Grid`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PixelId {
    /// Position along the single index axis.
    Flat(usize),
    /// Row/column position inside a named bank.
    Grid { bank: String, row: usize, col: usize },
}

impl PixelId {
    /// Creates a grid id.
    pub fn grid(bank: impl Into<String>, row: usize, col: usize) -> Self {
        Self::Grid {
            bank: bank.into(),
            row,
            col,
        }
    }

    /// Bank label of a grid id.
    #[must_use]
    pub fn bank(&self) -> Option<&str> {
        match self {
            Self::Flat(_) => None,
            Self::Grid { bank, .. } => Some(bank),
        }
    }

    /// `(row, col)` coordinate. Flat ids sit in row 0.
    #[must_use]
    pub fn coordinates(&self) -> (usize, usize) {
        match self {
            Self::Flat(index) => (0, *index),
            Self::Grid { row, col, .. } => (*row, *col),
        }
    }
}

impl fmt::Display for PixelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flat(index) => write!(f, "{index}"),
            Self::Grid { bank, row, col } => write!(f, "{bank}_{row}_{col}"),
        }
    }
}

impl FromStr for PixelId {
    type Err = Error;

    /// Parses `<bank>_<row>_<col>`. The bank may itself contain underscores.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let mut parts = s.rsplitn(3, '_');
        let (Some(col), Some(row), Some(bank)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Error::InvalidPixelId(s.to_string()));
        };
        if bank.is_empty() {
            return Err(Error::InvalidPixelId(s.to_string()));
        }
        let row = row
            .parse()
            .map_err(|_| Error::InvalidPixelId(s.to_string()))?;
        let col = col
            .parse()
            .map_err(|_| Error::InvalidPixelId(s.to_string()))?;
        Ok(Self::grid(bank, row, col))
    }
}

/// Enumerates every id between `start` (inclusive) and `end` (exclusive).
///
/// Grid ids expand row-major over `[start.row, end.row) x [start.col, end.col)`
/// and are tagged with `bank`. Equal bounds yield the single id `start`.
///
/// # Errors
/// Returns [`Error::ConfigError`] when the bounds mix flat and grid ids.
pub fn enumerate_ids(start: &PixelId, end: &PixelId, bank: &str) -> Result<Vec<PixelId>> {
    if start == end {
        return Ok(vec![start.clone()]);
    }

    match (start, end) {
        (PixelId::Flat(first), PixelId::Flat(last)) => Ok((*first..*last).map(PixelId::Flat).collect()),
        (
            PixelId::Grid {
                row: row0, col: col0, ..
            },
            PixelId::Grid {
                row: row1, col: col1, ..
            },
        ) => {
            let rows = row1.saturating_sub(*row0);
            let cols = col1.saturating_sub(*col0);
            let mut ids = Vec::with_capacity(rows * cols);
            for row in *row0..*row1 {
                for col in *col0..*col1 {
                    ids.push(PixelId::grid(bank, row, col));
                }
            }
            Ok(ids)
        }
        _ => Err(Error::ConfigError(format!(
            "cannot enumerate ids between {start} and {end}"
        ))),
    }
}

/// Removes every masked id, keeping the order of the survivors.
#[must_use]
pub fn apply_mask(ids: Vec<PixelId>, mask: &[PixelId]) -> Vec<PixelId> {
    if mask.is_empty() {
        return ids;
    }
    let masked: HashSet<&PixelId> = mask.iter().collect();
    ids.into_iter().filter(|id| !masked.contains(id)).collect()
}

/// Selects the region-of-interest entries belonging to `bank`.
///
/// The region of interest is exhaustive for the bank: the candidate `ids`
/// are replaced, not intersected.
#[must_use]
pub fn apply_roi(_ids: &[PixelId], bank: &str, roi: &[PixelId]) -> Vec<PixelId> {
    roi.iter()
        .filter(|id| id.bank() == Some(bank))
        .cloned()
        .collect()
}
