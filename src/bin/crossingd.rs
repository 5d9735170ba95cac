//! crossingd - rail crossing recorder daemon
//!
//! This daemon:
//! 1. Captures frames from the configured source and preprocesses them (ROI, downscale)
//! 2. Assembles fixed-size batches and ticks the entry detector once per batch
//! 3. Opens, pauses, resumes and closes recording sessions on detector events
//! 4. Prunes the session journal past the retention window
//!
//! An open session is always closed on shutdown.

use anyhow::{anyhow, Result};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossing_recorder::{
    config::CrossingConfig, DetectorEvent, DirectoryDiagnostics, EntryDetector, FrameBatcher,
    FrameSource, Recorder, SqliteSessionJournal, SystemClock,
};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = CrossingConfig::load()?;
    let journal = SqliteSessionJournal::open(&cfg.journal_path)?;
    let mut recorder = Recorder::new(Box::new(journal), Arc::new(SystemClock));

    let mut source = FrameSource::new(&cfg.source)?;
    source.connect()?;

    let exposure = source.exposure_control();
    let detector = EntryDetector::new(cfg.detector).with_exposure_correction(move || {
        exposure.request();
        Ok(())
    });
    let mut detector = match &cfg.diagnostics_dir {
        Some(dir) => {
            log::info!("writing diagnostics to {}", dir.display());
            detector.with_diagnostics(DirectoryDiagnostics::new(dir)?)
        }
        None => detector,
    };
    let events = detector.channel();

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("crossingd running. journal {}", cfg.journal_path);
    log::info!(
        "source={} fps={} batch={} heuristic={}",
        cfg.source.url,
        cfg.source.target_fps,
        cfg.batch_size,
        cfg.detector.heuristic.as_str()
    );

    let result = run(&cfg, &mut source, &mut detector, &events, &mut recorder, &running);
    if let Err(e) = recorder.shutdown() {
        log::error!("failed to close open session: {:#}", e);
    }
    log::info!("crossingd stopped");
    result
}

fn run(
    cfg: &CrossingConfig,
    source: &mut FrameSource,
    detector: &mut EntryDetector,
    events: &Receiver<DetectorEvent>,
    recorder: &mut Recorder,
    running: &AtomicBool,
) -> Result<()> {
    let mut batcher = FrameBatcher::new(cfg.batch_size)?;
    let frame_interval = Duration::from_secs_f64(1.0 / f64::from(cfg.source.target_fps));
    let mut last_health_log = Instant::now();
    let mut last_prune: Option<Instant> = None;

    while running.load(Ordering::SeqCst) {
        let started = Instant::now();

        let Some(frame) = source.next_frame()? else {
            log::info!("source exhausted");
            break;
        };
        let frame = cfg.preprocess.apply(&frame)?;
        recorder.write_frame(&frame);

        if let Some(batch) = batcher.push(frame) {
            detector.tick(&batch);
            for event in events.try_iter() {
                recorder.handle(event)?;
            }
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let stats = source.stats();
            let det = detector.stats();
            log::info!(
                "source health={} frames={} url={} state={} paused={} boxes={} resets={} session={}",
                source.is_healthy(),
                stats.frames_captured,
                stats.url,
                detector.state(),
                detector.is_paused(),
                det.boxes,
                det.background_resets,
                recorder.active().map_or("-", |s| s.name.as_str())
            );
            last_health_log = Instant::now();
        }

        if last_prune.map_or(true, |at| at.elapsed() >= PRUNE_INTERVAL) {
            let retention = chrono::Duration::from_std(cfg.retention)?;
            let cutoff = Utc::now()
                .checked_sub_signed(retention)
                .ok_or_else(|| anyhow!("retention window out of range"))?;
            recorder.prune_before(cutoff)?;
            last_prune = Some(Instant::now());
        }

        if let Some(rest) = frame_interval.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }
    Ok(())
}
