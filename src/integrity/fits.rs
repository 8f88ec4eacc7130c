//! Structural validation of FITS files.
//!
//! A file is considered well formed when every header unit is a sequence of
//! 2880-byte blocks of printable 80-character cards terminated by `END`, the
//! primary header starts with `SIMPLE = T`, and each data unit declared by
//! `BITPIX`, `NAXISn`, `PCOUNT` and `GCOUNT` is fully present in the file.
//! Trailing bytes that do not begin an `XTENSION` header are ignored.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use thiserror::Error;

/// Size of a FITS logical record.
pub const BLOCK_SIZE: usize = 2880;

/// Size of a header card.
pub const CARD_SIZE: usize = 80;

const CARDS_PER_BLOCK: usize = BLOCK_SIZE / CARD_SIZE;
const MAX_HEADER_BLOCKS: usize = 4096;
const MAX_NAXIS: i64 = 999;
const VALID_BITPIX: [i64; 6] = [8, 16, 32, 64, -32, -64];

/// Reasons a file fails structural validation.
#[derive(Debug, Error)]
pub enum FitsError {
    /// The file could not be read.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Zero-length file.
    #[error("file is empty")]
    Empty,

    /// The first card is not `SIMPLE = T`.
    #[error("primary header does not start with SIMPLE = T")]
    NotFits,

    /// A header block ends before 2880 bytes.
    #[error("header at offset {offset} is truncated")]
    TruncatedHeader {
        /// Byte offset of the header unit.
        offset: u64,
    },

    /// No `END` card within the header block limit.
    #[error("header at offset {offset} has no END card")]
    MissingEnd {
        /// Byte offset of the header unit.
        offset: u64,
    },

    /// A card contains bytes outside printable ASCII.
    #[error("header at offset {offset} contains non-ASCII bytes")]
    NonAscii {
        /// Byte offset of the offending block.
        offset: u64,
    },

    /// A mandatory keyword is absent.
    #[error("missing required keyword {keyword}")]
    MissingKeyword {
        /// Keyword name.
        keyword: String,
    },

    /// A keyword has an unusable value.
    #[error("invalid {keyword} value '{value}'")]
    InvalidValue {
        /// Keyword name.
        keyword: String,
        /// Raw value text.
        value: String,
    },

    /// The declared data unit extends past the end of the file.
    #[error("data unit at offset {offset} needs {expected} bytes but only {available} remain")]
    TruncatedData {
        /// Byte offset of the data unit.
        offset: u64,
        /// Declared data length.
        expected: u64,
        /// Bytes left in the file.
        available: u64,
    },
}

/// What a successful validation saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitsSummary {
    /// Number of header/data units.
    pub hdus: usize,
}

/// Validates the FITS file at `path`.
///
/// # Errors
///
/// Returns [`FitsError`] describing the first structural problem found.
pub fn validate_fits(path: &Path) -> Result<FitsSummary, FitsError> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    validate_reader(&mut reader, len)
}

/// Validates a FITS stream of known length.
///
/// # Errors
///
/// See [`validate_fits`].
pub fn validate_reader<R: Read + Seek>(reader: &mut R, len: u64) -> Result<FitsSummary, FitsError> {
    if len == 0 {
        return Err(FitsError::Empty);
    }

    let block = BLOCK_SIZE as u64;
    let mut offset = 0u64;
    let mut hdus = 0usize;

    loop {
        let primary = hdus == 0;
        if !primary && len - offset < block {
            break;
        }
        reader.seek(SeekFrom::Start(offset))?;
        let Some(header) = read_header(reader, offset, primary)? else {
            break;
        };

        let data_offset = offset + header.byte_len;
        let expected = header.data_len(primary)?;
        let available = len.saturating_sub(data_offset);
        if expected > available {
            return Err(FitsError::TruncatedData {
                offset: data_offset,
                expected,
                available,
            });
        }

        hdus += 1;
        offset = data_offset + expected.div_ceil(block) * block;
        if offset >= len {
            break;
        }
    }

    Ok(FitsSummary { hdus })
}

struct Header {
    values: Vec<(String, String)>,
    byte_len: u64,
}

impl Header {
    fn get(&self, keyword: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == keyword)
            .map(|(_, v)| v.as_str())
    }

    fn int(&self, keyword: &str) -> Result<Option<i64>, FitsError> {
        self.get(keyword)
            .map(|raw| {
                raw.parse::<i64>().map_err(|_| FitsError::InvalidValue {
                    keyword: keyword.to_string(),
                    value: raw.to_string(),
                })
            })
            .transpose()
    }

    fn required_int(&self, keyword: &str) -> Result<i64, FitsError> {
        self.int(keyword)?.ok_or_else(|| FitsError::MissingKeyword {
            keyword: keyword.to_string(),
        })
    }

    fn data_len(&self, primary: bool) -> Result<u64, FitsError> {
        let bitpix = self.required_int("BITPIX")?;
        if !VALID_BITPIX.contains(&bitpix) {
            return Err(invalid("BITPIX", bitpix));
        }
        let naxis = self.required_int("NAXIS")?;
        if !(0..=MAX_NAXIS).contains(&naxis) {
            return Err(invalid("NAXIS", naxis));
        }
        if naxis == 0 {
            return Ok(0);
        }

        let mut axes = Vec::with_capacity(usize::try_from(naxis).unwrap_or(0));
        for i in 1..=naxis {
            let keyword = format!("NAXIS{i}");
            let value = self.required_int(&keyword)?;
            let value = u64::try_from(value).map_err(|_| invalid(&keyword, value))?;
            axes.push(value);
        }

        // Random groups: NAXIS1 = 0 and the product starts at NAXIS2.
        let random_groups = primary && self.get("GROUPS") == Some("T") && axes[0] == 0;
        let dims = if random_groups { &axes[1..] } else { &axes[..] };

        let pcount = u64::try_from(self.int("PCOUNT")?.unwrap_or(0))
            .map_err(|_| invalid("PCOUNT", self.get("PCOUNT").unwrap_or_default()))?;
        let gcount = u64::try_from(self.int("GCOUNT")?.unwrap_or(1))
            .map_err(|_| invalid("GCOUNT", self.get("GCOUNT").unwrap_or_default()))?;

        let overflow = || invalid("NAXIS", "product overflows");
        let elements = dims
            .iter()
            .try_fold(1u64, |acc, &n| acc.checked_mul(n))
            .ok_or_else(overflow)?;
        let bytes_per_element = bitpix.unsigned_abs() / 8;
        elements
            .checked_add(pcount)
            .and_then(|n| n.checked_mul(gcount))
            .and_then(|n| n.checked_mul(bytes_per_element))
            .ok_or_else(overflow)
    }
}

fn invalid(keyword: &str, value: impl ToString) -> FitsError {
    FitsError::InvalidValue {
        keyword: keyword.to_string(),
        value: value.to_string(),
    }
}

/// Reads one header unit starting at `offset`.
///
/// Returns `Ok(None)` for a non-primary block that does not start with
/// `XTENSION`.
fn read_header<R: Read>(
    reader: &mut R,
    offset: u64,
    primary: bool,
) -> Result<Option<Header>, FitsError> {
    let mut values = Vec::new();
    let mut block = vec![0u8; BLOCK_SIZE];

    for index in 0..MAX_HEADER_BLOCKS {
        let block_offset = offset + (index * BLOCK_SIZE) as u64;
        reader.read_exact(&mut block).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => FitsError::TruncatedHeader { offset },
            _ => FitsError::Io(e),
        })?;

        if index == 0 {
            let first = &block[..CARD_SIZE];
            if primary {
                let (keyword, value) = parse_card(first);
                if keyword != "SIMPLE" || value.as_deref() != Some("T") {
                    return Err(FitsError::NotFits);
                }
            } else if !first.starts_with(b"XTENSION") {
                return Ok(None);
            }
        }

        if block.iter().any(|b| !(0x20..=0x7e).contains(b)) {
            return Err(FitsError::NonAscii {
                offset: block_offset,
            });
        }

        for card in block.chunks_exact(CARD_SIZE).take(CARDS_PER_BLOCK) {
            let (keyword, value) = parse_card(card);
            if keyword == "END" {
                return Ok(Some(Header {
                    values,
                    byte_len: ((index + 1) * BLOCK_SIZE) as u64,
                }));
            }
            if let Some(value) = value {
                values.push((keyword, value));
            }
        }
    }

    Err(FitsError::MissingEnd { offset })
}

/// Splits a card into its keyword and, for value cards, the value text
/// without its trailing comment.
fn parse_card(card: &[u8]) -> (String, Option<String>) {
    let text = String::from_utf8_lossy(card);
    let keyword = text.get(..8).unwrap_or(&text).trim_end().to_string();
    if text.get(8..10) != Some("= ") {
        return (keyword, None);
    }
    let raw = text.get(10..).unwrap_or_default().trim_start();
    let value = if let Some(rest) = raw.strip_prefix('\'') {
        rest.split('\'').next().unwrap_or_default().trim_end().to_string()
    } else {
        raw.split('/').next().unwrap_or_default().trim().to_string()
    };
    (keyword, Some(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::test_support::{FitsBuilder, minimal_fits};

    fn check(bytes: &[u8]) -> Result<FitsSummary, FitsError> {
        validate_reader(&mut Cursor::new(bytes), bytes.len() as u64)
    }

    #[test]
    fn test_minimal_image_is_valid() {
        let summary = check(&minimal_fits(100)).unwrap();
        assert_eq!(summary.hdus, 1);
    }

    #[test]
    fn test_header_only_file_is_valid() {
        let bytes = FitsBuilder::primary(8, &[]).build();
        assert_eq!(bytes.len(), BLOCK_SIZE);
        assert_eq!(check(&bytes).unwrap().hdus, 1);
    }

    #[test]
    fn test_extension_is_counted() {
        let bytes = FitsBuilder::primary(8, &[])
            .extension("BINTABLE", 8, &[16, 4], 0)
            .build();
        assert_eq!(check(&bytes).unwrap().hdus, 2);
    }

    #[test]
    fn test_truncated_data_is_rejected() {
        let mut bytes = minimal_fits(5000);
        bytes.truncate(BLOCK_SIZE + 1000);
        assert!(matches!(
            check(&bytes),
            Err(FitsError::TruncatedData {
                expected: 5000,
                available: 1000,
                ..
            })
        ));
    }

    #[test]
    fn test_missing_padding_on_last_unit_is_tolerated() {
        let mut bytes = minimal_fits(100);
        bytes.truncate(BLOCK_SIZE + 100);
        assert!(check(&bytes).is_ok());
    }

    #[test]
    fn test_garbage_is_not_fits() {
        let bytes = vec![b'x'; BLOCK_SIZE];
        assert!(matches!(check(&bytes), Err(FitsError::NotFits)));
    }

    #[test]
    fn test_empty_and_short_files() {
        assert!(matches!(check(&[]), Err(FitsError::Empty)));
        let bytes = minimal_fits(0);
        assert!(matches!(
            check(&bytes[..100]),
            Err(FitsError::TruncatedHeader { .. })
        ));
    }

    #[test]
    fn test_missing_end_card() {
        let mut bytes = minimal_fits(0);
        let text = String::from_utf8(bytes.clone()).unwrap();
        let end = text.find("END     ").unwrap();
        bytes[end..end + 3].copy_from_slice(b"XND");
        assert!(matches!(
            check(&bytes),
            Err(FitsError::TruncatedHeader { .. } | FitsError::MissingEnd { .. })
        ));
    }

    #[test]
    fn test_invalid_bitpix() {
        let bytes = FitsBuilder::primary(12, &[4]).build();
        assert!(matches!(
            check(&bytes),
            Err(FitsError::InvalidValue { keyword, .. }) if keyword == "BITPIX"
        ));
    }

    #[test]
    fn test_non_ascii_header_rejected() {
        let mut bytes = minimal_fits(0);
        bytes[200] = 0xff;
        assert!(matches!(check(&bytes), Err(FitsError::NonAscii { .. })));
    }

    #[test]
    fn test_trailing_junk_block_is_ignored() {
        let mut bytes = minimal_fits(10);
        bytes.extend(std::iter::repeat_n(0u8, BLOCK_SIZE));
        assert_eq!(check(&bytes).unwrap().hdus, 1);
    }

    #[test]
    fn test_parse_card_strips_comment_and_quotes() {
        let card = format!("{:<80}", "XTENSION= 'BINTABLE'           / binary table");
        let (k, v) = parse_card(card.as_bytes());
        assert_eq!(k, "XTENSION");
        assert_eq!(v.as_deref(), Some("BINTABLE"));

        let card = format!("{:<80}", "NAXIS1  =                  512 / width");
        let (_, v) = parse_card(card.as_bytes());
        assert_eq!(v.as_deref(), Some("512"));
    }
}
