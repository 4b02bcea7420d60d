use std::str::FromStr;

use crate::{TranscodeError, TranscodeResult};

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Headers a transport sets before the first streamed byte.
pub const RESPONSE_HEADERS: [(&str, &str); 2] = [
    ("Accept-Ranges", "bytes"),
    ("Content-Type", NDJSON_CONTENT_TYPE),
];

/// Source bytes one invocation reads. `end` is inclusive, as in HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn from_offset(start: u64) -> Self {
        Self { start, end: None }
    }

    /// Map an optional `Range` request header to a range; no header means
    /// the whole file.
    pub fn from_header(value: Option<&str>) -> TranscodeResult<Self> {
        match value {
            Some(v) => v.parse(),
            None => Ok(Self::default()),
        }
    }

    /// Number of bytes covered, when bounded.
    pub fn len(&self) -> Option<u64> {
        self.end
            .map(|end| end.saturating_add(1).saturating_sub(self.start))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

impl FromStr for ByteRange {
    type Err = TranscodeError;

    /// Accepts `bytes=START-` and `bytes=START-END`. Suffix ranges and
    /// multiple ranges are rejected.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || TranscodeError::InvalidRange(value.to_string());

        let (unit, spec) = value.trim().split_once('=').ok_or_else(invalid)?;
        if !unit.trim().eq_ignore_ascii_case("bytes") || spec.contains(',') {
            return Err(invalid());
        }
        let (start, end) = spec.trim().split_once('-').ok_or_else(invalid)?;
        let start: u64 = start.trim().parse().map_err(|_| invalid())?;
        let end = match end.trim() {
            "" => None,
            e => {
                let end: u64 = e.parse().map_err(|_| invalid())?;
                if end < start {
                    return Err(invalid());
                }
                Some(end)
            }
        };
        Ok(Self { start, end })
    }
}
