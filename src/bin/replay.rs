//! replay - run the entry detector over a directory of recorded frames
//!
//! Time is simulated: the clock advances by 1/fps per frame, so a replay of a
//! 40-minute crossing finishes in seconds and produces the same events every run.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossing_recorder::ingest::DirectorySource;
use crossing_recorder::ui::{Ui, UiMode};
use crossing_recorder::{
    Clock, DetectorConfig, DirectoryDiagnostics, EntryDetector, FrameBatcher,
    InMemorySessionJournal, ManualClock, Preprocess, Recorder, Roi, TriggerHeuristic,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory of PNG/JPEG frames, replayed in file-name order.
    #[arg(long)]
    dir: PathBuf,
    /// Frames per detector tick.
    #[arg(long, default_value_t = 4)]
    batch: usize,
    /// Capture rate the frames were recorded at.
    #[arg(long, default_value_t = 10)]
    fps: u32,
    /// Region of interest as x,y,width,height.
    #[arg(long)]
    roi: Option<Roi>,
    /// Integer downscale applied after cropping.
    #[arg(long, default_value_t = 1)]
    downscale: u32,
    /// Write difference/mask/background dumps here.
    #[arg(long)]
    diagnostics: Option<PathBuf>,
    /// Trigger heuristic: edge_trend or coverage.
    #[arg(long, default_value = "edge_trend")]
    heuristic: TriggerHeuristic,
    /// Output mode: auto, plain or pretty.
    #[arg(long, default_value = "auto")]
    ui: UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }
    if args.downscale == 0 {
        return Err(anyhow!("downscale must be >= 1"));
    }

    let ui = Ui::new(args.ui, std::io::stderr().is_terminal());
    let preprocess = Preprocess {
        roi: args.roi,
        downscale: args.downscale,
    };

    let mut source = {
        let _stage = ui.stage("Indexing frames");
        DirectorySource::open(&args.dir)?
    };
    if source.is_empty() {
        return Err(anyhow!("no frames in {}", args.dir.display()));
    }

    let clock = ManualClock::y2k();
    let start = clock.now();
    let config = DetectorConfig {
        heuristic: args.heuristic,
        ..DetectorConfig::default()
    };
    config.validate()?;
    let detector = EntryDetector::new(config).with_clock(Arc::new(clock.clone()));
    let mut detector = match &args.diagnostics {
        Some(dir) => detector.with_diagnostics(DirectoryDiagnostics::new(dir)?),
        None => detector,
    };
    let events = detector.channel();
    let mut recorder = Recorder::new(
        Box::new(InMemorySessionJournal::new()),
        Arc::new(clock.clone()),
    );
    let mut batcher = FrameBatcher::new(args.batch)?;
    let frame_interval = Duration::from_secs_f64(1.0 / f64::from(args.fps));
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut frames = 0u64;

    {
        let _stage = ui.stage("Replaying");
        let progress = ui.frames(source.len() as u64);
        while let Some(frame) = source.next_frame()? {
            let frame = preprocess.apply(&frame)?;
            clock.advance(frame_interval);
            frames += 1;
            recorder.write_frame(&frame);
            progress.inc(1);

            let Some(batch) = batcher.push(frame) else {
                continue;
            };
            detector.tick(&batch);
            progress.set_state(detector.state().as_str());
            for event in events.try_iter() {
                let offset = clock.now() - start;
                progress.println(&format!(
                    "[{:>8.1}s] {:<6} state={}",
                    offset.num_milliseconds() as f64 / 1000.0,
                    event.as_str(),
                    detector.state()
                ));
                *counts.entry(event.as_str()).or_default() += 1;
                recorder.handle(event)?;
            }
        }
    }
    recorder.shutdown()?;

    let stats = detector.stats();
    println!();
    println!(
        "frames={} ticks={} boxes={} background_resets={} final_state={}",
        frames,
        stats.ticks,
        stats.boxes,
        stats.background_resets,
        detector.state()
    );
    for (event, count) in &counts {
        println!("  {:<6} {}", event, count);
    }
    for session in recorder.sessions(usize::MAX)?.iter().rev() {
        println!(
            "  session {} {} frames={}",
            session.name,
            session.status.as_str(),
            session.frames_written
        );
    }
    Ok(())
}
