use bytes::{BufMut, Bytes, BytesMut};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::{TranscodeError, TranscodeResult};

/// Serializes decoded rows as `{"data":{..},"totalBytes":N}\n`.
#[derive(Debug, Default)]
pub struct RecordEncoder {
    buf: BytesMut,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Record<'a> {
    data: Fields<'a>,
    total_bytes: u64,
}

/// Header/value pairs in header order. Missing trailing values become `null`.
struct Fields<'a> {
    headers: &'a [String],
    values: &'a [String],
}

impl Serialize for Fields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.headers.len()))?;
        for (idx, name) in self.headers.iter().enumerate() {
            map.serialize_entry(name, &self.values.get(idx))?;
        }
        map.end()
    }
}

impl RecordEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode one row. `offset` is where the row started, for error reporting;
    /// `total_bytes` is the accountant total after the row was consumed.
    pub fn encode(
        &mut self,
        headers: &[String],
        values: &[String],
        offset: u64,
        total_bytes: u64,
    ) -> TranscodeResult<Bytes> {
        if values.len() > headers.len() {
            return Err(TranscodeError::MalformedRow {
                offset,
                reason: "row has more fields than headers",
            });
        }

        let record = Record {
            data: Fields { headers, values },
            total_bytes,
        };
        let mut writer = (&mut self.buf).writer();
        serde_json::to_writer(&mut writer, &record)?;
        self.buf.put_u8(b'\n');
        Ok(self.buf.split().freeze())
    }
}
