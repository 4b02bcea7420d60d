use std::collections::BTreeMap;

use bytes::BytesMut;
use serde::Deserialize;
use tokio_util::codec::Decoder;

use crate::codec::LineCodec;
use crate::TranscodeError;

/// One record as received by a consumer. Missing values arrive as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedRecord {
    pub data: BTreeMap<String, Option<String>>,
    pub total_bytes: u64,
}

/// Consumer-side NDJSON decoder.
///
/// Network chunks rarely end on a record boundary, so partial lines are
/// buffered exactly like the server-side splitter does. The last
/// `totalBytes` seen is kept as the offset to reconnect with.
#[derive(Debug, Default)]
pub struct RecordDecoder {
    lines: LineCodec,
    resume_offset: u64,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue a session that already received records up to `offset`.
    pub fn starting_at(offset: u64) -> Self {
        Self {
            lines: LineCodec::new(),
            resume_offset: offset,
        }
    }

    /// Value for the next request's `Range: bytes=<offset>-`.
    pub fn resume_offset(&self) -> u64 {
        self.resume_offset
    }

    fn parse(&mut self, line: &[u8]) -> Result<ReceivedRecord, TranscodeError> {
        let record: ReceivedRecord = serde_json::from_slice(line)?;
        self.resume_offset = record.total_bytes;
        Ok(record)
    }
}

impl Decoder for RecordDecoder {
    type Item = ReceivedRecord;
    type Error = TranscodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while let Some(line) = self.lines.decode(src)? {
            if !line.trim_ascii().is_empty() {
                return self.parse(&line).map(Some);
            }
        }
        Ok(None)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while let Some(line) = self.lines.decode_eof(buf)? {
            if !line.trim_ascii().is_empty() {
                return self.parse(&line).map(Some);
            }
        }
        Ok(None)
    }
}
