use crate::{ByteRange, TranscodeError, TranscodeResult};
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, BufReader};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct SourceMeta {
    /// e.g. "application/gzip" or "text/csv"
    pub content_type: String,
    /// e.g. "gzip", "zstd", or empty
    pub content_encoding: String,
    /// just the key/filename (used for extension fallback)
    pub name_hint: String,
}

impl SourceMeta {
    /// Best-effort content-type/encoding from the file extension.
    pub fn from_path(path: &Path) -> Self {
        let name_hint = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let mut meta = SourceMeta {
            name_hint,
            ..Default::default()
        };

        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        match ext {
            "gz" => {
                meta.content_type = "application/gzip".into();
                meta.content_encoding = "gzip".into();
            }
            "zst" => {
                meta.content_type = "application/zstd".into();
                meta.content_encoding = "zstd".into();
            }
            _ => {
                meta.content_type = "text/csv".into();
            }
        }
        meta
    }

    fn is_gzip(&self) -> bool {
        let ce = self.content_encoding.to_ascii_lowercase();
        let ct = self.content_type.to_ascii_lowercase();
        ce.split(',').any(|s| s.trim() == "gzip")
            || matches!(ct.as_str(), "application/gzip" | "application/x-gzip")
            || self.name_hint.ends_with(".gz")
    }

    fn is_zstd(&self) -> bool {
        let ce = self.content_encoding.to_ascii_lowercase();
        ce.split(',').any(|s| s.trim() == "zstd")
            || self.content_type.eq_ignore_ascii_case("application/zstd")
            || self.name_hint.ends_with(".zst")
    }

    pub fn is_compressed(&self) -> bool {
        self.is_gzip() || self.is_zstd()
    }
}

/// Position `raw` at `range.start` and bound it to `range.end`.
///
/// Plain sources seek. Compressed sources are decompressed from the beginning
/// and the first `range.start` decompressed bytes are discarded, so offsets
/// always count the bytes the line splitter sees.
pub async fn build_source_reader<R>(
    mut raw: R,
    meta: &SourceMeta,
    range: ByteRange,
    buffer_capacity: usize,
) -> TranscodeResult<Box<dyn AsyncRead + Unpin + Send>>
where
    R: AsyncRead + AsyncSeek + Unpin + Send + 'static,
{
    let positioned: Box<dyn AsyncRead + Unpin + Send> = if meta.is_compressed() {
        let buf = BufReader::with_capacity(buffer_capacity, raw);
        let mut decompressed: Box<dyn AsyncRead + Unpin + Send> = if meta.is_gzip() {
            Box::new(GzipDecoder::new(buf))
        } else {
            Box::new(ZstdDecoder::new(buf))
        };
        if range.start > 0 {
            let skipped = tokio::io::copy(
                &mut (&mut decompressed).take(range.start),
                &mut tokio::io::sink(),
            )
            .await?;
            debug!(requested = range.start, skipped, "skipped decompressed prefix");
        }
        decompressed
    } else {
        raw.seek(SeekFrom::Start(range.start)).await?;
        Box::new(BufReader::with_capacity(buffer_capacity, raw))
    };

    Ok(match range.len() {
        Some(len) => Box::new(positioned.take(len)),
        None => positioned,
    })
}

/// Open a local file for reading at `range`.
pub async fn open_source(
    path: &Path,
    range: ByteRange,
    buffer_capacity: usize,
) -> TranscodeResult<(Box<dyn AsyncRead + Unpin + Send>, SourceMeta)> {
    let file = File::open(path)
        .await
        .map_err(|source| TranscodeError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
    let meta = SourceMeta::from_path(path);
    let reader = build_source_reader(file, &meta, range, buffer_capacity)
        .await
        .map_err(|err| match err {
            TranscodeError::Io(source) => TranscodeError::SourceUnavailable {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
    Ok((reader, meta))
}
