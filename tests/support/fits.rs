//! Builders for small, structurally valid FITS files.

const BLOCK_SIZE: usize = 2880;
const CARD_SIZE: usize = 80;

/// Builds FITS files HDU by HDU, zero-filled.
pub struct FitsBuilder {
    bytes: Vec<u8>,
}

impl FitsBuilder {
    /// Starts a file with a primary HDU of the given shape.
    pub fn primary(bitpix: i64, axes: &[u64]) -> Self {
        let mut cards = vec![
            card("SIMPLE", "T"),
            card("BITPIX", &bitpix.to_string()),
            card("NAXIS", &axes.len().to_string()),
        ];
        for (i, n) in axes.iter().enumerate() {
            cards.push(card(&format!("NAXIS{}", i + 1), &n.to_string()));
        }
        let mut builder = Self { bytes: Vec::new() };
        builder.push_unit(&cards, data_len(bitpix, axes, 0));
        builder
    }

    /// Appends an extension HDU.
    pub fn extension(mut self, kind: &str, bitpix: i64, axes: &[u64], pcount: u64) -> Self {
        let mut cards = vec![
            card("XTENSION", &format!("'{kind}'")),
            card("BITPIX", &bitpix.to_string()),
            card("NAXIS", &axes.len().to_string()),
        ];
        for (i, n) in axes.iter().enumerate() {
            cards.push(card(&format!("NAXIS{}", i + 1), &n.to_string()));
        }
        cards.push(card("PCOUNT", &pcount.to_string()));
        cards.push(card("GCOUNT", "1"));
        self.push_unit(&cards, data_len(bitpix, axes, pcount));
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }

    fn push_unit(&mut self, cards: &[String], data: usize) {
        let mut header: Vec<u8> = cards.iter().flat_map(|c| c.bytes()).collect();
        header.extend(format!("{:<CARD_SIZE$}", "END").bytes());
        pad(&mut header, b' ');
        self.bytes.extend(header);

        let mut payload = vec![0u8; data];
        pad(&mut payload, 0);
        self.bytes.extend(payload);
    }
}

/// One-axis 8-bit primary image with `data_len` bytes of data.
pub fn minimal_fits(data_len: u64) -> Vec<u8> {
    if data_len == 0 {
        FitsBuilder::primary(8, &[]).build()
    } else {
        FitsBuilder::primary(8, &[data_len]).build()
    }
}

/// FITS block and card sizes the builder pads to.
pub const fn layout() -> (usize, usize) {
    (BLOCK_SIZE, CARD_SIZE)
}

fn card(keyword: &str, value: &str) -> String {
    format!("{keyword:<8}= {value:>20}")
        .chars()
        .chain(std::iter::repeat(' '))
        .take(CARD_SIZE)
        .collect()
}

fn data_len(bitpix: i64, axes: &[u64], pcount: u64) -> usize {
    if axes.is_empty() {
        return 0;
    }
    let elements: u64 = axes.iter().product::<u64>() + pcount;
    usize::try_from(elements * bitpix.unsigned_abs() / 8).unwrap_or(0)
}

fn pad(bytes: &mut Vec<u8>, fill: u8) {
    let rem = bytes.len() % BLOCK_SIZE;
    if rem != 0 {
        bytes.extend(std::iter::repeat_n(fill, BLOCK_SIZE - rem));
    }
}
