use anyhow::{Context, Result};
use channel_scout::monitor::{format_table, MapView};
use channel_scout::record::{CaptureReader, RecordFrame};
use channel_scout::{Session, TranslationTable};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(about = "Replay a capture log through the frame reassembler and record extractor")]
struct Args {
    /// Input capture log (.bin) written by `channel_scout --record`
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Character to locate; prints the players on its map for every snapshot
    #[arg(long, env = "CHARACTER_NAME")]
    name: Option<String>,

    /// Translation table (JSON)
    #[arg(long, env = "TRANSLATIONS_FILE", default_value = "korean_chinese.json")]
    translations: PathBuf,

    /// Print every extracted record
    #[arg(long, default_value_t = false)]
    dump: bool,

    /// Ignore the frame size cap and trust every length field
    #[arg(long, default_value_t = false)]
    unbounded: bool,
}

fn main() -> Result<()> {
    // .env may set RUST_LOG
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let table = TranslationTable::load_or_default(&args.translations);
    let max = if args.unbounded { None } else { Some(channel_scout::reassembly::DEFAULT_MAX_FRAME_LEN) };
    let mut session = Session::with_max_frame_len(table, max);
    let reader = CaptureReader::open(&args.input)?;

    let (mut chunks, mut records) = (0usize, 0usize);
    for frame in reader {
        match frame.with_context(|| format!("reading {:?}", args.input))? {
            RecordFrame::Header(h) => {
                log::info!("capture log v{} port={} created={}ns", h.version, h.port, h.created_unix_ns);
            }
            RecordFrame::Chunk(c) => {
                chunks += 1;
                let snapshot = session.ingest(c.flow, &c.bytes);
                if snapshot.is_empty() { continue; }
                records += snapshot.len();
                if args.dump {
                    for p in &snapshot {
                        println!("seq={} {} map={} lv={} job={}", c.seq, p.tag(), p.map_localized, p.level, p.job_localized);
                    }
                }
                if let Some(name) = &args.name {
                    match MapView::locate(&snapshot, name) {
                        Some(view) => {
                            println!("seq={} {}", c.seq, view.summary());
                            println!("{}", format_table(&view.render_rows()));
                            println!("---");
                        }
                        None => log::debug!("seq={} '{}' not in this snapshot", c.seq, name),
                    }
                }
            }
        }
    }
    eprintln!("Read {} chunks. {} frames, {} player records.", chunks, session.frames(), records);
    Ok(())
}
