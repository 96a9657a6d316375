//! Async consumer over a shared frame queue.
//!
//! Usage: cargo run -p mct-camera --example preview [SOURCE]... [--frames N]
//! Sources default to two synthetic cameras ("0" and "stub://side").

use anyhow::{Context, Result};
use mct_camera::{frame_stream, BlockingQueue, CaptureConfig, Grabber};
use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};
use tokio_stream::StreamExt;

const FPS_WINDOW_SIZE: usize = 30;
const IDLE_CHECK: Duration = Duration::from_millis(100);

/// Calculate FPS from timing window
fn calculate_fps(window: &VecDeque<Instant>) -> f64 {
    match (window.front(), window.back()) {
        (Some(first), Some(last)) if window.len() >= 2 => {
            (window.len() - 1) as f64 / last.duration_since(*first).as_secs_f64()
        }
        _ => 0.0,
    }
}

/// Stopping joins worker threads, so keep it off the async executor.
fn stop_all(grabbers: &mut [Grabber]) {
    tokio::task::block_in_place(|| {
        for g in grabbers.iter_mut() {
            g.stop();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let mut frames = 150u64;
    if let Some(pos) = args.iter().position(|a| a == "--frames") {
        frames = args
            .get(pos + 1)
            .context("--frames needs a value")?
            .parse()
            .context("--frames must be an integer")?;
        args.drain(pos..=pos + 1);
    }
    if args.is_empty() {
        args = vec!["0".into(), "stub://side".into()];
    }

    let config = CaptureConfig::from_sources(args);
    config.validate()?;

    let queue = BlockingQueue::shared();
    let mut grabbers: Vec<Grabber> = config.grabbers(&queue)?;
    for g in &mut grabbers {
        g.start()?;
    }

    let mut stream = Box::pin(frame_stream(queue.clone()));
    let mut fps_times: VecDeque<Instant> = VecDeque::with_capacity(FPS_WINDOW_SIZE);
    let mut per_camera: HashMap<u32, u64> = HashMap::new();
    let mut count = 0u64;
    let mut stopping = false;
    if frames == 0 {
        stop_all(&mut grabbers);
        stopping = true;
    }

    loop {
        let packet = match tokio::time::timeout(IDLE_CHECK, stream.next()).await {
            Ok(Some(packet)) => packet,
            Ok(None) => break,
            Err(_) => {
                if !stopping && grabbers.iter().all(Grabber::is_finished) {
                    log::warn!("every camera has stopped on its own");
                    stop_all(&mut grabbers);
                    stopping = true;
                }
                continue;
            }
        };
        *per_camera.entry(packet.camera_id()).or_default() += 1;

        fps_times.push_back(Instant::now());
        if fps_times.len() > FPS_WINDOW_SIZE {
            fps_times.pop_front();
        }

        count += 1;
        if count % 30 == 0 {
            println!(
                "{count} frames | {:.1} FPS | latency {:?}",
                calculate_fps(&fps_times),
                packet.age()
            );
        }
        if count == frames {
            // stops the queue too; the stream ends once it drains
            stop_all(&mut grabbers);
            stopping = true;
        }
    }

    let mut ids: Vec<_> = per_camera.into_iter().collect();
    ids.sort();
    for (id, n) in ids {
        println!("camera {id}: {n} frames");
    }
    Ok(())
}
