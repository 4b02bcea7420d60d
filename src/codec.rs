use bytes::{Buf, BytesMut};
use memchr::memchr;
use tokio_util::codec::Decoder;

use crate::TranscodeError;

/// Splits a byte stream into `\n`-terminated lines.
///
/// Each item is one complete source line with its terminator kept, so
/// `line.len()` is the exact number of source bytes it occupied. A final line
/// without a terminator is yielded verbatim at end of input.
#[derive(Debug, Clone, Default)]
pub struct LineCodec {
    /// Bytes of the buffer already scanned for a newline.
    next_index: usize,
    /// Absolute source offset of the first buffered byte.
    position: u64,
    max_length: Option<usize>,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset reported in errors for the first byte this codec sees.
    pub fn starting_at(mut self, offset: u64) -> Self {
        self.position = offset;
        self
    }

    /// Fail on any line longer than `limit` bytes, terminator included.
    pub fn with_max_length(mut self, limit: usize) -> Self {
        self.max_length = Some(limit);
        self
    }

    /// `len` is the length of the line at the front of `src` so far.
    fn check_length(&mut self, src: &mut BytesMut, len: usize) -> Result<(), TranscodeError> {
        match self.max_length {
            Some(limit) if len > limit => {
                let offset = self.position;
                // Drop what we have so a caller that keeps polling does not loop.
                src.advance(len);
                self.position += len as u64;
                self.next_index = 0;
                Err(TranscodeError::LineTooLong { offset, limit })
            }
            _ => Ok(()),
        }
    }

    fn take_line(&mut self, src: &mut BytesMut, end: usize) -> BytesMut {
        self.next_index = 0;
        self.position += end as u64;
        src.split_to(end)
    }
}

impl Decoder for LineCodec {
    type Item = BytesMut;
    type Error = TranscodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let scanned = self.next_index.min(src.len());
        match memchr(b'\n', &src[scanned..]) {
            Some(idx) => {
                let end = scanned + idx + 1;
                self.check_length(src, end)?;
                Ok(Some(self.take_line(src, end)))
            }
            None => {
                let buffered = src.len();
                self.next_index = buffered;
                self.check_length(src, buffered)?;
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            self.next_index = 0;
            return Ok(None);
        }
        let end = buf.len();
        Ok(Some(self.take_line(buf, end)))
    }
}
