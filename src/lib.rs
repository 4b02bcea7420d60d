//! Resumable CSV to NDJSON streaming.
//!
//! A CSV file is read from an arbitrary byte offset, split into lines, and every
//! data row is emitted as one JSON object per line:
//!
//! ```text
//! {"data":{"id":"1","name":"Bulbasaur","hp":"45"},"totalBytes":26}
//! ```
//!
//! `totalBytes` is the number of source bytes consumed once that row was read.
//! A consumer that loses its connection reconnects with that value as the new
//! start offset and receives exactly the rows it has not seen yet.
//!
//! - Line splitting: [`LineCodec`] (a `tokio_util` decoder, chunk-boundary safe).
//! - Orchestration: [`transcode`] for any `AsyncRead`/`AsyncWrite` pair,
//!   [`stream_file`] for a path plus a [`ByteRange`].
//! - Transport glue: [`record_channel`] for a bounded body stream,
//!   [`ByteRange::from_header`] for `Range` headers.
//! - Consumer side: [`RecordDecoder`] tracks the resume offset.
#![cfg_attr(docsrs, feature(doc_cfg))]
//
mod client;
mod codec;
mod io;
mod pipeline;
mod range;
mod record;
mod row;
mod sink;
mod state;

pub use crate::client::{ReceivedRecord, RecordDecoder};
pub use crate::codec::LineCodec;
pub use crate::io::{build_source_reader, open_source, SourceMeta};
pub use crate::pipeline::{
    stream_file, transcode, HeaderMode, PipelineState, StreamRequest, StreamSummary,
    TranscodeOptions,
};
pub use crate::range::{ByteRange, NDJSON_CONTENT_TYPE, RESPONSE_HEADERS};
pub use crate::record::RecordEncoder;
pub use crate::row::RowDecoder;
pub use crate::sink::{record_channel, RecordSink, RecordStream};
pub use crate::state::{ByteAccountant, Counters, HeaderState};

use std::path::PathBuf;
use thiserror::Error;

/// Error type returned by this crate.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Malformed row at byte {offset}: {reason}")]
    MalformedRow { offset: u64, reason: &'static str },
    #[error("Headers unavailable for a stream starting at byte {offset}")]
    HeadersUnavailable { offset: u64 },
    #[error("Duplicate header: {0}")]
    DuplicateHeader(String),
    #[error("Row at byte {offset} is not valid in the configured charset")]
    InvalidEncoding { offset: u64 },
    #[error("Line at byte {offset} exceeds {limit} bytes")]
    LineTooLong { offset: u64, limit: usize },
    #[error("Invalid range: {0}")]
    InvalidRange(String),
    #[error("Source unavailable: {}", path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Sink rejected write")]
    Sink(#[source] std::io::Error),
    #[error("Stream cancelled")]
    Cancelled,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TranscodeError {
    /// True when the pipeline stopped because its cancellation token fired.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TranscodeError::Cancelled)
    }
}

pub type TranscodeResult<T> = std::result::Result<T, TranscodeError>;
