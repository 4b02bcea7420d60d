use encoding_rs::Encoding;

use crate::{TranscodeError, TranscodeResult};

/// Splits one line into its delimiter-separated fields.
///
/// Quoting is not interpreted: a delimiter inside quotes still splits.
#[derive(Debug, Clone, Copy)]
pub struct RowDecoder {
    delimiter: u8,
    charset: &'static Encoding,
}

impl Default for RowDecoder {
    fn default() -> Self {
        Self {
            delimiter: b',',
            charset: encoding_rs::UTF_8,
        }
    }
}

impl RowDecoder {
    /// `delimiter` must be ASCII; the charset must be ASCII-compatible
    /// (UTF-8, windows-1252, ...) since lines are split on raw `\n` bytes.
    pub fn new(delimiter: u8, charset: &'static Encoding) -> Self {
        debug_assert!(delimiter.is_ascii(), "delimiter must be ASCII");
        Self { delimiter, charset }
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// Decode `line` (terminator included) that starts at source byte `offset`.
    pub fn decode(&self, line: &[u8], offset: u64) -> TranscodeResult<Vec<String>> {
        let body = strip_terminator(line);
        if body.is_empty() {
            return Err(TranscodeError::MalformedRow {
                offset,
                reason: "empty line has no fields",
            });
        }

        let text = self
            .charset
            .decode_without_bom_handling_and_without_replacement(body)
            .ok_or(TranscodeError::InvalidEncoding { offset })?;

        Ok(text
            .split(char::from(self.delimiter))
            .map(str::to_owned)
            .collect())
    }
}

fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
