use csv_resume::{record_channel, stream_file, RecordDecoder, StreamRequest, TranscodeOptions};
use futures::StreamExt;
use std::path::Path;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

/// Read a few records, hang up, then reconnect from the last offset seen.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = Path::new("./data/pokemons.csv");
    let mut decoder = RecordDecoder::new();

    for attempt in 0..2 {
        let (writer, body) = record_channel(16 * 1024);
        let cancel = CancellationToken::new();
        let request = StreamRequest::from_offset(decoder.resume_offset());
        let server = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                stream_file(path, writer, &request, &TranscodeOptions::default(), cancel).await
            }
        });

        let mut records = FramedRead::new(StreamReader::new(body), decoder);
        let mut seen = 0;
        while let Some(record) = records.next().await {
            let record = record?;
            if seen == 0 {
                println!("attempt {attempt}: first name={:?}", record.data.get("name"));
            }
            seen += 1;
            if attempt == 0 && seen == 10 {
                break;
            }
        }
        decoder = RecordDecoder::starting_at(records.decoder().resume_offset());
        // Client went away: tell the pipeline.
        cancel.cancel();
        let summary = server.await??;
        println!(
            "attempt {attempt}: received={seen} state={:?} resume_offset={}",
            summary.state,
            decoder.resume_offset()
        );
    }
    Ok(())
}
