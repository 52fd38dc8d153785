//! Mask and region-of-interest pixel lists.
//!
//! One `<bank>_<row>_<col>` identifier per line; blank lines and lines
//! starting with `#` are skipped.

use crate::Result;
use nxsom_core::PixelId;
use std::path::Path;

/// Pixel identifiers read from a mask or ROI file, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PixelList {
    ids: Vec<PixelId>,
}

impl PixelList {
    /// Parses the text of a pixel list.
    ///
    /// # Errors
    /// Returns [`nxsom_core::Error::InvalidPixelId`] for a malformed line.
    pub fn parse(text: &str) -> Result<Self> {
        let ids = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::parse::<PixelId>)
            .collect::<nxsom_core::Result<Vec<_>>>()?;
        Ok(Self { ids })
    }

    /// Reads a pixel list from disk.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be read, or a parse error for
    /// a malformed line.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[PixelId] {
        &self.ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let list = PixelList::parse("# bank1 edge\nbank1_0_0\n\n  bank2_3_4  \n#bank1_9_9\n")
            .unwrap();
        assert_eq!(
            list.as_slice(),
            &[PixelId::grid("bank1", 0, 0), PixelId::grid("bank2", 3, 4)]
        );
    }

    #[test]
    fn test_malformed_line() {
        let err = PixelList::parse("bank1_0_0\nbank1_zero_0\n").unwrap_err();
        assert!(matches!(
            err,
            Error::CoreError(nxsom_core::Error::InvalidPixelId(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# mask").unwrap();
        writeln!(file, "bank1_1_2").unwrap();
        let list = PixelList::from_file(file.path()).unwrap();
        assert_eq!(list.len(), 1);

        let err = PixelList::from_file("/nonexistent/mask.dat").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
