use clap::{Arg, ArgAction, Command};
use crc32fast::Hasher as Crc32;
use csv_resume::{stream_file, StreamRequest, StreamSummary, TranscodeOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("bench")
        .arg(
            Arg::new("path")
                .long("path")
                .value_parser(clap::value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("verify")
                .long("verify")
                .help(
                    "Interrupt after --split records, resume from the reported offset, \
                     and compare CRC32 with a single pass",
                )
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("split")
                .long("split")
                .help("Records to emit before interrupting (for --verify)")
                .value_parser(clap::value_parser!(u64))
                .default_value("1000"),
        )
        .get_matches();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let path = matches.get_one::<PathBuf>("path").unwrap();
    let options = TranscodeOptions::new().read_capacity(1 << 20);

    let start = Instant::now();
    let mut single = CrcWriter::new(None);
    let summary = run(path, &mut single, 0, &options).await?;
    let elapsed = start.elapsed().as_secs_f64();
    let rps = (summary.counters.records as f64) / elapsed;
    let digest = single.hasher.finalize();
    println!(
        "source={} records={} bytes={} headers={:?} crc=0x{digest:08x}",
        path.display(),
        summary.counters.records,
        summary.total_bytes,
        summary.headers,
    );
    println!("elapsed={elapsed:.1}s records/sec={rps:.0}");

    if matches.get_flag("verify") {
        let split = *matches.get_one::<u64>("split").unwrap();
        let mut resumed = CrcWriter::new(Some(split));
        let first = run(path, &mut resumed, 0, &options).await?;
        resumed.stop_after = None;
        let second = run(path, &mut resumed, first.total_bytes, &options).await?;
        let resumed_digest = resumed.hasher.finalize();
        println!(
            "interrupted after {} records at byte {}, resumed {} records, \
             crc=0x{resumed_digest:08x}",
            first.counters.records,
            first.total_bytes,
            second.counters.records,
        );
        if resumed_digest != digest {
            anyhow::bail!("resumed output differs from single-pass output");
        }
        println!("resume verified");
    }
    Ok(())
}

async fn run(
    path: &Path,
    writer: &mut CrcWriter,
    offset: u64,
    options: &TranscodeOptions,
) -> anyhow::Result<StreamSummary> {
    let cancel = CancellationToken::new();
    writer.cancel = cancel.clone();
    writer.lines = 0;
    let request = StreamRequest::from_offset(offset);
    Ok(stream_file(path, writer, &request, options, cancel).await?)
}

/// Hashes everything written; cancels its token after `stop_after` lines.
struct CrcWriter {
    hasher: Crc32,
    lines: u64,
    stop_after: Option<u64>,
    cancel: CancellationToken,
}

impl CrcWriter {
    fn new(stop_after: Option<u64>) -> Self {
        Self {
            hasher: Crc32::new(),
            lines: 0,
            stop_after,
            cancel: CancellationToken::new(),
        }
    }
}

impl AsyncWrite for CrcWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.hasher.update(buf);
        this.lines += buf.iter().filter(|b| **b == b'\n').count() as u64;
        if this.stop_after.is_some_and(|limit| this.lines >= limit) {
            this.cancel.cancel();
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
