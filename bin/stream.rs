use clap::{Arg, ArgAction, Command};
use csv_resume::{
    stream_file, ByteRange, HeaderMode, PipelineState, StreamRequest, TranscodeOptions,
};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("stream")
        .about("Stream a CSV file as NDJSON records to stdout; Ctrl-C stops cleanly")
        .arg(
            Arg::new("path")
                .long("path")
                .value_parser(clap::value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("range")
                .long("range")
                .help("Range header value, e.g. 'bytes=1024-'"),
        )
        .arg(
            Arg::new("offset")
                .long("offset")
                .help("Resume offset (ignored when --range is set)")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(Arg::new("delim").long("delim").default_value(","))
        .arg(
            Arg::new("strict-headers")
                .long("strict-headers")
                .help("Fail instead of re-reading the header row when resuming")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = matches.get_one::<PathBuf>("path").unwrap();
    let range = match matches.get_one::<String>("range") {
        Some(header) => ByteRange::from_header(Some(header.as_str()))?,
        None => ByteRange::from_offset(matches.get_one::<u64>("offset").copied().unwrap_or(0)),
    };
    let delimiter = match matches.get_one::<String>("delim").unwrap().as_bytes() {
        [b] if b.is_ascii() => *b,
        _ => anyhow::bail!("--delim must be a single ASCII character"),
    };
    let mode = if matches.get_flag("strict-headers") {
        HeaderMode::Strict
    } else {
        HeaderMode::Probe
    };
    let options = TranscodeOptions::new().delimiter(delimiter).header_mode(mode);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let request = StreamRequest {
        range,
        headers: None,
    };
    let summary = stream_file(path, tokio::io::stdout(), &request, &options, cancel).await?;
    if summary.state == PipelineState::Cancelled {
        info!(resume_from = summary.total_bytes, "interrupted");
    }
    eprintln!(
        "state={:?} records={} resume_offset={}",
        summary.state, summary.counters.records, summary.total_bytes
    );
    Ok(())
}
