//! Multi-camera grab demo
//!
//! Starts one grabber per configured camera, all feeding one queue, and
//! runs N consumer threads against it. Reports per-camera frame counts
//! and average capture→consume latency when done.
//!
//! Usage:
//!   cargo run -p demos --bin multicam -- --source 0 --source stub://b --seconds 3
//!   cargo run -p demos --bin multicam -- --config demos/cameras.toml
//!   RUST_LOG=debug cargo run -p demos --features gstreamer --bin multicam -- --config ...

use anyhow::{Context, Result};
use clap::Parser;
use mct_camera::{BlockingQueue, CameraId, CaptureConfig, FrameQueue, Grabber};
use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

#[derive(Parser)]
#[command(about = "Grab frames from several cameras into one shared queue")]
struct CliArgs {
    /// TOML file describing backend, consumers and cameras
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera source (device index or URI); repeat for more cameras
    #[arg(long = "source")]
    sources: Vec<String>,

    /// Consumer threads (overrides the config file)
    #[arg(long)]
    consumers: Option<usize>,

    /// How long to run before shutting down
    #[arg(long, default_value = "5")]
    seconds: u64,
}

#[derive(Default, Clone, Copy)]
struct Tally {
    frames: u64,
    latency: Duration,
}

type Report = BTreeMap<CameraId, Tally>;

fn load_config(args: &CliArgs) -> Result<CaptureConfig> {
    let mut config = match &args.config {
        Some(path) => CaptureConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None if !args.sources.is_empty() => CaptureConfig::from_sources(args.sources.clone()),
        None => CaptureConfig::from_sources(["0", "stub://side"]),
    };
    if let Some(n) = args.consumers {
        config.consumers = n;
    }
    config.validate()?;
    Ok(config)
}

fn consumer(queue: Arc<FrameQueue>) -> Report {
    let mut report = Report::new();
    for packet in queue.iter() {
        let tally = report.entry(packet.camera_id()).or_default();
        tally.frames += 1;
        tally.latency += packet.age();
    }
    report
}

fn main() -> Result<()> {
    env_logger::init();
    let args = CliArgs::parse();
    let config = load_config(&args)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = interrupted.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .context("installing Ctrl-C handler")?;
    }

    let queue = BlockingQueue::shared();
    let mut grabbers: Vec<Grabber> = config.grabbers(&queue)?;
    for g in &mut grabbers {
        g.start()
            .with_context(|| format!("starting camera {}", g.camera_id()))?;
    }
    log::info!(
        "{} camera(s), {} consumer(s), running for {}s",
        grabbers.len(),
        config.consumers,
        args.seconds
    );

    let consumers: Vec<_> = (0..config.consumers)
        .map(|i| {
            let q = queue.clone();
            thread::Builder::new()
                .name(format!("consumer-{i}"))
                .spawn(move || consumer(q))
        })
        .collect::<std::io::Result<_>>()
        .context("spawning consumers")?;

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    while Instant::now() < deadline && !interrupted.load(Ordering::SeqCst) {
        if grabbers.iter().all(Grabber::is_finished) {
            log::warn!("every camera has stopped on its own");
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }

    // halt every worker before the first stop() latches the queue
    for g in &grabbers {
        g.signal_stop();
    }
    for g in &mut grabbers {
        g.stop();
        log::info!(
            "camera {} ({}) ended with {:?}, {:?}",
            g.camera_id(),
            g.source(),
            g.outcome(),
            g.stats()
        );
    }

    let mut reports = Vec::with_capacity(consumers.len());
    for handle in consumers {
        let report = handle
            .join()
            .map_err(|_| anyhow::anyhow!("consumer thread panicked"))?;
        reports.push(report);
    }
    // a slower grabber may push after the consumers saw "stopped and empty"
    let leftover = consumer(queue.clone());
    let late: u64 = leftover.values().map(|t| t.frames).sum();
    if late > 0 {
        log::info!("{late} frame(s) still queued after the consumers exited");
    }
    reports.push(leftover);

    let mut total = Report::new();
    for (id, tally) in reports.into_iter().flatten() {
        let t = total.entry(id).or_default();
        t.frames += tally.frames;
        t.latency += tally.latency;
    }

    println!("camera  frames  avg latency");
    for (id, tally) in &total {
        let avg = tally.latency / tally.frames.max(1) as u32;
        println!("{id:>6}  {:>6}  {avg:?}", tally.frames);
    }
    Ok(())
}
