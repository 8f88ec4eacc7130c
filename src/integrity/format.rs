//! Format registry: which integrity test applies to which file.

use std::fs;
use std::io;
use std::path::Path;

use super::fits::{FitsError, validate_fits};

/// File formats with a content-level integrity test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// FITS image or table (`.fits`, `.fits.fz`).
    Fits,
    /// Plain-text catalog (`.txt`).
    Text,
    /// Anything else; never flagged corrupt by content.
    Unrecognized,
}

/// Result of running a format's test on a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Parsed successfully.
    Valid,
    /// Failed to parse.
    Invalid(String),
    /// The file does not exist.
    Missing,
    /// No test exists for this format.
    Untested,
}

impl FileFormat {
    /// Picks the format from the file name.
    #[must_use]
    pub fn detect(path: &Path) -> Self {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return Self::Unrecognized;
        };
        let name = name.to_ascii_lowercase();
        if name.ends_with(".fits") || name.ends_with(".fits.fz") {
            Self::Fits
        } else if name.ends_with(".txt") {
            Self::Text
        } else {
            Self::Unrecognized
        }
    }

    /// Whether content inspection applies.
    #[must_use]
    pub fn is_recognized(self) -> bool {
        !matches!(self, Self::Unrecognized)
    }

    /// Runs the format's test on `path`.
    #[must_use]
    pub fn validate(self, path: &Path) -> Validation {
        match self {
            Self::Fits => match validate_fits(path) {
                Ok(_) => Validation::Valid,
                Err(FitsError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                    Validation::Missing
                }
                Err(e) => Validation::Invalid(e.to_string()),
            },
            Self::Text => validate_text(path),
            Self::Unrecognized => Validation::Untested,
        }
    }
}

fn validate_text(path: &Path) -> Validation {
    match fs::read(path) {
        Ok(bytes) => match std::str::from_utf8(&bytes) {
            Ok(_) => Validation::Valid,
            Err(e) => Validation::Invalid(format!("not valid UTF-8: {e}")),
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => Validation::Missing,
        Err(e) => Validation::Invalid(e.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_detect() {
        assert_eq!(FileFormat::detect(Path::new("a_sciimg.fits")), FileFormat::Fits);
        assert_eq!(FileFormat::detect(Path::new("a_sciimg.FITS.fz")), FileFormat::Fits);
        assert_eq!(FileFormat::detect(Path::new("a_psfcat.txt")), FileFormat::Text);
        assert_eq!(FileFormat::detect(Path::new("a.jpg")), FileFormat::Unrecognized);
        assert_eq!(FileFormat::detect(Path::new("a.fits.gz")), FileFormat::Unrecognized);
    }

    #[test]
    fn test_text_validation() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        let bad = dir.path().join("bad.txt");
        fs::write(&good, "ra dec\n1.0 2.0\n").unwrap();
        fs::write(&bad, [0x66, 0x6f, 0xff, 0xfe]).unwrap();

        assert_eq!(FileFormat::Text.validate(&good), Validation::Valid);
        assert!(matches!(FileFormat::Text.validate(&bad), Validation::Invalid(_)));
        assert_eq!(
            FileFormat::Text.validate(&dir.path().join("absent.txt")),
            Validation::Missing
        );
    }

    #[test]
    fn test_unrecognized_is_untested() {
        assert_eq!(
            FileFormat::Unrecognized.validate(Path::new("/nope.bin")),
            Validation::Untested
        );
    }

    #[test]
    fn test_missing_fits_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            FileFormat::Fits.validate(&dir.path().join("x.fits")),
            Validation::Missing
        );
    }
}
