use clap::{Arg, Command};
use csv_async::AsyncWriterBuilder;

const TYPES: [&str; 8] = [
    "grass", "fire", "water", "bug", "normal", "poison", "electric", "ground",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen")
        .about("Write a synthetic creature dataset as CSV to stdout")
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_parser(clap::value_parser!(u64))
                .required(true),
        )
        .arg(Arg::new("delim").long("delim").default_value(","))
        .arg(
            Arg::new("img_base")
                .long("img-base")
                .default_value("https://img.example.invalid/sprites"),
        )
        .get_matches();

    let rows: u64 = *matches.get_one("rows").unwrap();
    let delim = matches.get_one::<String>("delim").unwrap();
    let img_base = matches.get_one::<String>("img_base").unwrap();
    let delimiter = match delim.as_bytes() {
        [b] if b.is_ascii() => *b,
        _ => anyhow::bail!("--delim must be a single ASCII character"),
    };

    let mut out = AsyncWriterBuilder::new()
        .delimiter(delimiter)
        .create_writer(tokio::io::stdout());

    out.write_record(&[
        "id", "name", "type_1", "type_2", "img_url", "hp", "attack", "defense", "speed",
    ])
    .await?;

    // Deterministic rows so two runs produce identical files.
    for i in 1..=rows {
        let type_1 = TYPES[(i % TYPES.len() as u64) as usize];
        let type_2 = if i % 3 == 0 {
            TYPES[((i / 3) % TYPES.len() as u64) as usize]
        } else {
            ""
        };
        out.write_record(&[
            i.to_string(),
            format!("mon{i:06}"),
            type_1.to_string(),
            type_2.to_string(),
            format!("{img_base}/{i}.png"),
            (20 + i % 131).to_string(),
            (10 + (i * 7) % 151).to_string(),
            (10 + (i * 11) % 141).to_string(),
            (5 + (i * 13) % 156).to_string(),
        ])
        .await?;
        if i % 10_000 == 0 {
            out.flush().await?;
        } // keep buffers moving on huge runs
    }

    out.flush().await?;
    Ok(())
}
