use anyhow::{Context, Result};
use channel_scout::capture::{open_live, OwnedSegment, DEFAULT_PORT};
use channel_scout::monitor::{format_table, MapView};
use channel_scout::reassembly::DEFAULT_MAX_FRAME_LEN;
use channel_scout::record::{CaptureHeader, CaptureWriter, ChunkRecord, RecordFrame, LOG_VERSION};
use channel_scout::{PlayerRecord, Session, TranslationTable};
use clap::Parser;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use dotenvy::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug, Parser)]
#[command(version, about = "Shows which players share your map by sniffing the game's TCP traffic")]
struct Args {
    /// Your character's nickname
    #[arg(long, env = "CHARACTER_NAME")]
    name: String,

    /// Game server TCP port
    #[arg(long, env = "GAME_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Translation table (JSON) for map and job names
    #[arg(long, env = "TRANSLATIONS_FILE", default_value = "korean_chinese.json")]
    translations: PathBuf,

    /// Save captured payloads to a capture log for `replay`
    #[arg(long, default_value_t = false)]
    record: bool,

    /// Capture log path; defaults to captures/channel_YYYY_MM_DD_HHMMSS.bin
    #[arg(long, env = "OUT_FILE")]
    out: Option<PathBuf>,

    /// Largest frame payload accepted before resynchronising
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
    max_frame_len: usize,
}

fn now_unix_ns() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

fn default_out_path() -> Result<PathBuf> {
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    let stamp = now.format(time::macros::format_description!("[year]_[month]_[day]_[hour][minute][second]"))?;
    let mut p = PathBuf::from("captures");
    p.push(format!("channel_{}.bin", stamp));
    Ok(p)
}

fn writer_thread(out: PathBuf, header: CaptureHeader, rx: Receiver<RecordFrame>) -> Result<()> {
    let mut w = CaptureWriter::create(&out, header)?;
    for frame in rx {
        w.append(&frame)?;
    }
    w.finish()?;
    Ok(())
}

fn capture_thread(port: u16, tx: Sender<OwnedSegment>, ready: Sender<Result<()>>) {
    let mut source = match open_live(port) {
        Ok(s) => s,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));
    loop {
        match source.next_segment() {
            Ok(Some(seg)) => {
                if tx.send(seg).is_err() { break; }
            }
            Ok(None) => break,
            Err(e) => {
                log::error!("capture stopped: {e:#}");
                break;
            }
        }
    }
}

fn show(snapshot: &[PlayerRecord], my_name: &str) {
    let Some(view) = MapView::locate(snapshot, my_name) else {
        log::info!("'{}' not found in this channel snapshot ({} players)", my_name, snapshot.len());
        return;
    };
    println!("{}", view.summary());
    println!("{}", format_table(&view.render_rows()));
    for line in view.report() {
        log::info!("{}", line);
    }
}

fn main() -> Result<()> {
    // Load environment variables from .env if present
    let _ = dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let table = TranslationTable::load_or_default(&args.translations);
    let mut session = Session::with_max_frame_len(table, Some(args.max_frame_len));

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = stop.clone();
    ctrlc::set_handler(move || stop_handler.store(true, Ordering::SeqCst)).context("install Ctrl+C handler")?;

    let (tx, rx) = bounded::<OwnedSegment>(8192);
    let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
    let port = args.port;
    std::thread::spawn(move || capture_thread(port, tx, ready_tx));
    ready_rx.recv().context("capture thread exited during startup")??;
    log::info!("monitoring '{}' on TCP port {}", args.name, args.port);

    // spawn writer thread
    let mut writer = None;
    if args.record {
        let out = match args.out.clone() {
            Some(p) => p,
            None => default_out_path()?,
        };
        log::info!("recording capture log to {:?}", out);
        let header = CaptureHeader { version: LOG_VERSION, created_unix_ns: now_unix_ns(), port: args.port };
        let (wtx, wrx) = bounded::<RecordFrame>(8192);
        let handle = std::thread::spawn(move || writer_thread(out, header, wrx));
        writer = Some((wtx, handle));
    }

    let start = Instant::now();
    let mut seq = 0u64;
    while !stop.load(Ordering::SeqCst) {
        let seg = match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(seg) => seg,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        let mut writer_gone = false;
        if let Some((wtx, _)) = &writer {
            let chunk = ChunkRecord {
                seq,
                recv_unix_ns: now_unix_ns(),
                recv_mono_ns_from_start: start.elapsed().as_nanos(),
                flow: seg.flow,
                bytes: seg.payload.clone(),
            };
            writer_gone = wtx.send(RecordFrame::Chunk(chunk)).is_err();
        }
        if writer_gone {
            if let Some((_, handle)) = writer.take() { join_writer(handle)?; }
        }
        seq += 1;
        let snapshot = session.ingest(seg.flow, &seg.payload);
        if !snapshot.is_empty() {
            show(&snapshot, &args.name);
        }
    }

    log::info!("stopping after {} segments, {} frames", seq, session.frames());
    if let Some((wtx, handle)) = writer {
        drop(wtx);
        join_writer(handle)?;
    }
    Ok(())
}

fn join_writer(handle: JoinHandle<Result<()>>) -> Result<()> {
    match handle.join() {
        Ok(res) => res.context("capture log writer"),
        Err(_) => anyhow::bail!("capture log writer panicked"),
    }
}
