use tokio::io::{AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio_util::io::ReaderStream;

use crate::{TranscodeError, TranscodeResult};

/// Body side of [`record_channel`]; yields encoded record bytes.
pub type RecordStream = ReaderStream<DuplexStream>;

/// Pushes encoded records into a flow-controlled writer.
///
/// `push` resolves only once the writer accepted the whole line, which is
/// what makes the pipeline wait for a slow consumer.
#[derive(Debug)]
pub struct RecordSink<W> {
    inner: W,
    bytes_written: u64,
    closed: bool,
}

impl<W: AsyncWrite + Unpin> RecordSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes_written: 0,
            closed: false,
        }
    }

    pub async fn push(&mut self, line: &[u8]) -> TranscodeResult<()> {
        self.inner
            .write_all(line)
            .await
            .map_err(TranscodeError::Sink)?;
        self.bytes_written += line.len() as u64;
        Ok(())
    }

    /// Flush and signal end-of-stream. Later calls are no-ops.
    pub async fn close(&mut self) -> TranscodeResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.flush().await.map_err(TranscodeError::Sink)?;
        self.inner.shutdown().await.map_err(TranscodeError::Sink)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

/// A bounded in-memory pipe between the pipeline and a transport.
///
/// At most `capacity` bytes are buffered; once full, the pipeline waits until
/// the stream half is polled. Dropping the stream half makes further pushes
/// fail, so the transport should cancel the pipeline when it disconnects.
pub fn record_channel(capacity: usize) -> (DuplexStream, RecordStream) {
    let (writer, reader) = tokio::io::duplex(capacity);
    (writer, ReaderStream::new(reader))
}
