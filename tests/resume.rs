use csv_async::{AsyncReaderBuilder, ByteRecord};
use csv_resume::{
    stream_file, ByteRange, HeaderMode, PipelineState, StreamRequest, StreamSummary,
    TranscodeError, TranscodeOptions, RESPONSE_HEADERS,
};
use std::path::{Path, PathBuf};
use std::{fs::File, io::Write, process::Command};
use tokio_util::sync::CancellationToken;

fn write_dataset(dir: &Path, rows: usize) -> anyhow::Result<PathBuf> {
    let path = dir.join("pokemons.csv");
    let mut f = File::create(&path)?;
    writeln!(f, "id,name,type_1,hp")?;
    for i in 1..=rows {
        // Every seventh row omits hp to exercise null padding across resumes.
        if i % 7 == 0 {
            writeln!(f, "{i},mon{i:04},grass")?;
        } else {
            writeln!(f, "{i},mon{i:04},fire,{}", 20 + i % 90)?;
        }
    }
    Ok(path)
}

async fn stream(
    path: &Path,
    request: StreamRequest,
    options: &TranscodeOptions,
) -> anyhow::Result<(StreamSummary, String)> {
    let mut out = Vec::new();
    let summary = stream_file(path, &mut out, &request, options, CancellationToken::new()).await?;
    Ok((summary, String::from_utf8(out)?))
}

fn total_bytes(line: &str) -> u64 {
    let value: serde_json::Value = serde_json::from_str(line).expect("record json");
    value["totalBytes"].as_u64().expect("totalBytes")
}

#[tokio::test]
async fn resuming_at_any_record_reproduces_single_pass() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_dataset(dir.path(), 200)?;
    let options = TranscodeOptions::new().read_capacity(37);

    let (full_summary, full) = stream(&path, StreamRequest::default(), &options).await?;
    let lines: Vec<&str> = full.lines().collect();
    assert_eq!(lines.len(), 200);
    assert_eq!(full_summary.total_bytes, std::fs::metadata(&path)?.len());

    // Offsets equal the summed length of the lines consumed so far.
    let source = std::fs::read_to_string(&path)?;
    let mut consumed = 0u64;
    for (src_line, record) in source.split_inclusive('\n').skip(1).zip(&lines) {
        consumed += src_line.len() as u64;
        let header_len = source.find('\n').unwrap() as u64 + 1;
        assert_eq!(total_bytes(record), header_len + consumed);
    }

    for k in [1usize, 2, 7, 99, 199, 200] {
        let offset = total_bytes(lines[k - 1]);
        let (summary, resumed) = stream(&path, StreamRequest::from_offset(offset), &options).await?;
        assert_eq!(summary.state, PipelineState::Completed);
        assert_eq!(summary.counters.records as usize, 200 - k);

        let mut stitched: String = lines[..k].iter().map(|l| format!("{l}\n")).collect();
        stitched.push_str(&resumed);
        assert_eq!(stitched, full, "resume after {k} records");
    }
    Ok(())
}

#[tokio::test]
async fn same_offset_gives_identical_output() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_dataset(dir.path(), 50)?;
    let options = TranscodeOptions::default();

    let (_, full) = stream(&path, StreamRequest::default(), &options).await?;
    let offset = total_bytes(full.lines().nth(9).unwrap());

    let (_, a) = stream(&path, StreamRequest::from_offset(offset), &options).await?;
    let (_, b) = stream(&path, StreamRequest::from_offset(offset), &options).await?;
    assert!(!a.is_empty());
    assert_eq!(a, b);
    Ok(())
}

#[tokio::test]
async fn header_modes_on_resume() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_dataset(dir.path(), 10)?;
    let (_, full) = stream(&path, StreamRequest::default(), &TranscodeOptions::default()).await?;
    let offset = total_bytes(full.lines().next().unwrap());

    let strict = TranscodeOptions::new().header_mode(HeaderMode::Strict);
    let err = stream_file(
        &path,
        Vec::new(),
        &StreamRequest::from_offset(offset),
        &strict,
        CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(
        matches!(err, TranscodeError::HeadersUnavailable { .. }),
        "{err:?}"
    );

    // Supplied headers win over probing, even in strict mode.
    let names: Vec<String> = ["a", "b", "c", "d"].map(String::from).into();
    let request = StreamRequest::from_offset(offset).with_headers(names.clone());
    let (summary, out) = stream(&path, request, &strict).await?;
    assert_eq!(summary.headers, names);
    assert!(out.starts_with(r#"{"data":{"a":"2","b":"mon0002","c":"fire","d":"22"}"#));

    let defaults = TranscodeOptions::default();
    let (summary, _) = stream(&path, StreamRequest::from_offset(offset), &defaults).await?;
    assert_eq!(summary.headers, vec!["id", "name", "type_1", "hp"]);
    Ok(())
}

#[tokio::test]
async fn bounded_range_stops_at_end_byte() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_dataset(dir.path(), 20)?;
    let (_, full) = stream(&path, StreamRequest::default(), &TranscodeOptions::default()).await?;
    let lines: Vec<&str> = full.lines().collect();

    let start = total_bytes(lines[2]);
    let end = total_bytes(lines[5]) - 1;
    let request = StreamRequest {
        range: ByteRange::from_header(Some(format!("bytes={start}-{end}").as_str()))?,
        headers: None,
    };
    let (summary, out) = stream(&path, request, &TranscodeOptions::default()).await?;
    let expected: String = lines[3..6].iter().map(|l| format!("{l}\n")).collect();
    assert_eq!(out, expected);
    assert_eq!(summary.total_bytes, end + 1);
    Ok(())
}

#[tokio::test]
async fn range_ending_mid_line_stops_before_that_line() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_dataset(dir.path(), 20)?;
    let options = TranscodeOptions::default();
    let (_, full) = stream(&path, StreamRequest::default(), &options).await?;
    let lines: Vec<&str> = full.lines().collect();

    let start = total_bytes(lines[2]);
    // Three bytes into the seventh data row.
    let end = total_bytes(lines[5]) + 2;
    let request = StreamRequest {
        range: ByteRange { start, end: Some(end) },
        headers: None,
    };
    let (summary, out) = stream(&path, request, &options).await?;
    let expected: String = lines[3..6].iter().map(|l| format!("{l}\n")).collect();
    assert_eq!(out, expected);
    assert_eq!(summary.counters.records, 3);
    assert_eq!(summary.total_bytes, total_bytes(lines[5]));

    // The cut row comes back whole from where the bounded read stopped.
    let (_, rest) = stream(&path, StreamRequest::from_offset(summary.total_bytes), &options).await?;
    assert_eq!(rest.lines().next(), Some(lines[6]));
    Ok(())
}

#[tokio::test]
async fn range_to_end_of_file_keeps_unterminated_last_row() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("short.csv");
    std::fs::write(&path, "id,name\n1,a\n2,b")?;

    let request = StreamRequest {
        range: "bytes=0-14".parse()?,
        headers: None,
    };
    let (summary, out) = stream(&path, request, &TranscodeOptions::default()).await?;
    assert_eq!(out.lines().count(), 2);
    assert_eq!(total_bytes(out.lines().last().unwrap()), 15);
    assert_eq!(summary.total_bytes, 15);
    Ok(())
}

#[tokio::test]
async fn offset_past_end_is_an_empty_stream() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_dataset(dir.path(), 3)?;
    let len = std::fs::metadata(&path)?.len();
    let request = StreamRequest::from_offset(len + 100);
    let (summary, out) = stream(&path, request, &TranscodeOptions::default()).await?;
    assert!(out.is_empty());
    assert_eq!(summary.state, PipelineState::Completed);
    assert_eq!(summary.total_bytes, len + 100);
    Ok(())
}

#[tokio::test]
async fn missing_file_is_source_unavailable() {
    let err = stream_file(
        Path::new("/definitely/not/here.csv"),
        Vec::new(),
        &StreamRequest::default(),
        &TranscodeOptions::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, TranscodeError::SourceUnavailable { .. }), "{err:?}");
}

#[tokio::test]
async fn gzip_source_resumes_on_decompressed_offsets() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_dataset(dir.path(), 300)?;

    // gzip it (use system gzip for speed)
    let gz_path: PathBuf = dir.path().join("pokemons.csv.gz");
    let status = Command::new("bash")
        .arg("-lc")
        .arg(format!("gzip -c {} > {}", path.display(), gz_path.display()))
        .status()?;
    assert!(status.success());

    let options = TranscodeOptions::default();
    let (_, plain) = stream(&path, StreamRequest::default(), &options).await?;
    let (_, gz) = stream(&gz_path, StreamRequest::default(), &options).await?;
    assert_eq!(gz, plain);

    let offset = total_bytes(plain.lines().nth(120).unwrap());
    let (_, plain_tail) = stream(&path, StreamRequest::from_offset(offset), &options).await?;
    let (_, gz_tail) = stream(&gz_path, StreamRequest::from_offset(offset), &options).await?;
    assert_eq!(gz_tail, plain_tail);
    assert_eq!(gz_tail.lines().count(), 300 - 121);
    Ok(())
}

#[tokio::test]
async fn headers_match_csv_async() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_dataset(dir.path(), 25)?;
    let (summary, _) =
        stream(&path, StreamRequest::default(), &TranscodeOptions::default()).await?;

    let mut rdr = AsyncReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .create_reader(tokio::fs::File::open(&path).await?);
    let headers: Vec<String> = rdr.headers().await?.iter().map(String::from).collect();
    let mut rows = 0u64;
    let mut record = ByteRecord::new();
    while rdr.read_byte_record(&mut record).await? {
        rows += 1;
    }

    assert_eq!(summary.headers, headers);
    assert_eq!(summary.counters.records, rows);
    Ok(())
}

#[test]
fn range_headers() -> anyhow::Result<()> {
    assert_eq!(ByteRange::from_header(None)?, ByteRange::default());
    assert_eq!(ByteRange::from_header(Some("bytes=0-"))?, ByteRange::from_offset(0));
    assert_eq!(ByteRange::from_header(Some("bytes=1234-"))?.start, 1234);

    let bounded: ByteRange = "bytes=5-9".parse()?;
    assert_eq!(bounded, ByteRange { start: 5, end: Some(9) });
    assert_eq!(bounded.len(), Some(5));

    // The widest bounded range saturates instead of overflowing.
    let widest: ByteRange = "bytes=0-18446744073709551615".parse()?;
    assert_eq!(widest.end, Some(u64::MAX));
    assert_eq!(widest.len(), Some(u64::MAX));
    assert!(!widest.is_empty());

    for bad in ["bytes=-5", "items=1-", "bytes=9-5", "bytes=1-2,4-5", "bytes=abc-", "1234"] {
        assert!(
            matches!(bad.parse::<ByteRange>(), Err(TranscodeError::InvalidRange(_))),
            "{bad}"
        );
    }

    assert!(RESPONSE_HEADERS.contains(&("Accept-Ranges", "bytes")));
    Ok(())
}
