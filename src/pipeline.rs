use std::path::Path;

use encoding_rs::Encoding;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::codec::LineCodec;
use crate::io::{open_source, SourceMeta};
use crate::record::RecordEncoder;
use crate::row::RowDecoder;
use crate::sink::RecordSink;
use crate::state::{ByteAccountant, Counters, HeaderState};
use crate::{ByteRange, TranscodeError, TranscodeResult};

/// Lifecycle of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

/// Where headers come from when a stream resumes past the header row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeaderMode {
    /// Re-read the first line of the source.
    #[default]
    Probe,
    /// Fail with `HeadersUnavailable` unless the request carries headers.
    Strict,
}

#[derive(Debug, Clone)]
pub struct TranscodeOptions {
    delimiter: u8,
    charset: &'static Encoding,
    read_capacity: usize,
    max_line_length: Option<usize>,
    header_mode: HeaderMode,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            charset: encoding_rs::UTF_8,
            read_capacity: 64 * 1024,
            max_line_length: Some(1 << 20), // 1 MiB
            header_mode: HeaderMode::default(),
        }
    }
}

impl TranscodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Character set of the source; must be ASCII-compatible.
    pub fn charset(mut self, charset: &'static Encoding) -> Self {
        self.charset = charset;
        self
    }

    /// Size of each read from the source.
    pub fn read_capacity(mut self, capacity: usize) -> Self {
        self.read_capacity = capacity.max(1);
        self
    }

    pub fn max_line_length(mut self, limit: Option<usize>) -> Self {
        self.max_line_length = limit;
        self
    }

    pub fn header_mode(mut self, mode: HeaderMode) -> Self {
        self.header_mode = mode;
        self
    }

    fn line_codec(&self, offset: u64) -> LineCodec {
        let codec = LineCodec::new().starting_at(offset);
        match self.max_line_length {
            Some(limit) => codec.with_max_length(limit),
            None => codec,
        }
    }

    fn row_decoder(&self) -> RowDecoder {
        RowDecoder::new(self.delimiter, self.charset)
    }
}

/// One client's request: the byte range to stream and, optionally, the
/// headers it already holds from an earlier invocation.
#[derive(Debug, Clone, Default)]
pub struct StreamRequest {
    pub range: ByteRange,
    pub headers: Option<Vec<String>>,
}

impl StreamRequest {
    pub fn from_offset(offset: u64) -> Self {
        Self {
            range: ByteRange::from_offset(offset),
            headers: None,
        }
    }

    pub fn with_headers(mut self, headers: Vec<String>) -> Self {
        self.headers = Some(headers);
        self
    }
}

/// What a finished (completed or cancelled) invocation did.
#[derive(Debug, Clone)]
pub struct StreamSummary {
    pub state: PipelineState,
    pub counters: Counters,
    /// Resume offset for the next invocation.
    pub total_bytes: u64,
    pub headers: Vec<String>,
}

/// Everything one invocation owns. Nothing here is shared between streams.
struct Invocation {
    headers: HeaderState,
    accountant: ByteAccountant,
    counters: Counters,
    expect_header: bool,
    /// A line without terminator was cut by the range end, not by end of file.
    bounded: bool,
    cancel: CancellationToken,
}

impl Invocation {
    fn new(request: &StreamRequest, cancel: CancellationToken) -> TranscodeResult<Self> {
        let offset = request.range.start;
        // At byte 0 the file's own header row is authoritative.
        let headers = match (&request.headers, offset) {
            (Some(names), o) if o > 0 => HeaderState::supplied(names.clone())?,
            _ => HeaderState::default(),
        };
        Ok(Self {
            headers,
            accountant: ByteAccountant::new(offset),
            counters: Counters::default(),
            expect_header: offset == 0,
            bounded: request.range.end.is_some(),
            cancel,
        })
    }

    fn summary(self, state: PipelineState) -> StreamSummary {
        StreamSummary {
            state,
            counters: self.counters,
            total_bytes: self.accountant.total(),
            headers: self.headers.into_names(),
        }
    }
}

/// Stream `source` (already positioned at `request.range.start`) into `sink`.
///
/// When `request.range.end` is set, a final line without terminator is taken
/// to be cut by the range and is neither emitted nor counted.
///
/// Returns a summary on completion or cancellation; every other stop is an
/// error. The source and sink are dropped before this returns, on every path,
/// and the sink is shut down only when the source was fully consumed.
pub async fn transcode<R, W>(
    source: R,
    sink: W,
    request: &StreamRequest,
    options: &TranscodeOptions,
    cancel: CancellationToken,
) -> TranscodeResult<StreamSummary>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let offset = request.range.start;
    let mut inv = Invocation::new(request, cancel)?;
    let mut lines =
        FramedRead::with_capacity(source, options.line_codec(offset), options.read_capacity);
    let mut sink = RecordSink::new(sink);
    let decoder = options.row_decoder();

    debug!(offset, from = ?PipelineState::Idle, to = ?PipelineState::Streaming, "pipeline started");
    let streamed = pump(&mut lines, &mut sink, &mut inv, &decoder)
        .instrument(info_span!("transcode", offset))
        .await;
    drop(lines);

    let result = match streamed {
        Ok(()) => sink.close().await,
        Err(err) => Err(err),
    };
    drop(sink);

    let state = match &result {
        Ok(()) => PipelineState::Completed,
        Err(TranscodeError::Cancelled) => PipelineState::Cancelled,
        // A consumer hanging up races the transport's cancel call.
        Err(TranscodeError::Sink(_)) if inv.cancel.is_cancelled() => PipelineState::Cancelled,
        Err(_) => PipelineState::Failed,
    };
    info!(
        ?state,
        records = inv.counters.records,
        bytes = inv.counters.bytes,
        total_bytes = inv.accountant.total(),
        "stream closed"
    );

    match result {
        Err(err) if state == PipelineState::Failed => {
            warn!(error = %err, offset, "stream failed");
            Err(err)
        }
        _ => Ok(inv.summary(state)),
    }
}

async fn pump<R, W>(
    lines: &mut FramedRead<R, LineCodec>,
    sink: &mut RecordSink<W>,
    inv: &mut Invocation,
    decoder: &RowDecoder,
) -> TranscodeResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut encoder = RecordEncoder::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = inv.cancel.cancelled() => return Err(TranscodeError::Cancelled),
            next = lines.next() => next,
        };
        let Some(line) = next else {
            return Ok(());
        };
        let line = line?;
        if inv.bounded && !line.ends_with(b"\n") {
            debug!(
                offset = inv.accountant.total(),
                len = line.len(),
                "dropped line cut by range end"
            );
            return Ok(());
        }

        let start = inv.accountant.total();
        let fields = decoder.decode(&line, start)?;
        let total = inv.accountant.advance(line.len());
        inv.counters.bytes += line.len() as u64;

        if inv.expect_header {
            inv.expect_header = false;
            debug!(fields = fields.len(), total_bytes = total, "captured header row");
            inv.headers.capture(fields)?;
            continue;
        }

        let headers = inv.headers.current(start)?;
        let encoded = encoder.encode(headers, &fields, start, total)?;
        tokio::select! {
            biased;
            _ = inv.cancel.cancelled() => return Err(TranscodeError::Cancelled),
            pushed = sink.push(&encoded) => pushed?,
        }
        inv.counters.records += 1;
    }
}

/// Stream the CSV file at `path` into `sink`.
///
/// When the request starts past byte 0 without headers and the options use
/// [`HeaderMode::Probe`], the header row is read from the start of the file
/// first.
///
/// A bounded range yields complete lines only. A line cut by the range end
/// is dropped and `total_bytes` stops in front of it, so the next request
/// starts at that line. A range reaching the end of an uncompressed file is
/// treated as open-ended, which keeps a final unterminated line.
pub async fn stream_file<W>(
    path: &Path,
    sink: W,
    request: &StreamRequest,
    options: &TranscodeOptions,
    cancel: CancellationToken,
) -> TranscodeResult<StreamSummary>
where
    W: AsyncWrite + Unpin,
{
    let offset = request.range.start;
    let mut request = request.clone();
    request.range = clamp_to_source(path, request.range).await;
    if offset > 0 && request.headers.is_none() {
        match options.header_mode {
            HeaderMode::Probe => request.headers = Some(probe_headers(path, options).await?),
            HeaderMode::Strict => return Err(TranscodeError::HeadersUnavailable { offset }),
        }
    }

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        opened = open_source(path, request.range, options.read_capacity) => Some(opened?),
    };
    let Some((source, meta)) = opened else {
        info!(offset, "stream cancelled before source opened");
        return Ok(StreamSummary {
            state: PipelineState::Cancelled,
            counters: Counters::default(),
            total_bytes: offset,
            headers: request.headers.unwrap_or_default(),
        });
    };
    debug!(
        path = %path.display(),
        content_type = %meta.content_type,
        range = ?request.range,
        "source opened"
    );

    transcode(source, sink, &request, options, cancel).await
}

/// Drop the end bound when it covers the rest of a plain file.
async fn clamp_to_source(path: &Path, range: ByteRange) -> ByteRange {
    let Some(end) = range.end else {
        return range;
    };
    if SourceMeta::from_path(path).is_compressed() {
        return range;
    }
    match tokio::fs::metadata(path).await {
        Ok(md) if end.saturating_add(1) >= md.len() => ByteRange { end: None, ..range },
        _ => range,
    }
}

async fn probe_headers(path: &Path, options: &TranscodeOptions) -> TranscodeResult<Vec<String>> {
    let (source, _meta) = open_source(path, ByteRange::default(), options.read_capacity).await?;
    let mut lines = FramedRead::with_capacity(source, options.line_codec(0), options.read_capacity);
    match lines.next().await {
        Some(line) => {
            let names = options.row_decoder().decode(&line?, 0)?;
            debug!(path = %path.display(), fields = names.len(), "probed header row");
            Ok(names)
        }
        None => Err(TranscodeError::HeadersUnavailable { offset: 0 }),
    }
}
