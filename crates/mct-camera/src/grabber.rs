//! Per-camera worker thread: source → [`FramePacket`] → shared queue.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::{
    CameraId, CaptureError, CaptureSource, FramePacket, GrabberError, SharedQueue, SourceAddress,
};

/// Lifecycle of a [`Grabber`]. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabberState {
    Idle,
    Running,
    Stopped,
}

/// Why a grabber's worker loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The running flag was cleared by [`Grabber::stop`].
    Stopped,
    /// The source could not be opened; nothing was pushed.
    OpenFailed,
    /// The source reported end of stream or a read fault.
    ReadFailed,
    /// The capture backend panicked on the worker thread.
    Panicked,
}

/// Counters published by the worker while it runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrabberStats {
    pub frames_pushed: u64,
    pub frames_skipped: u64,
}

#[derive(Default)]
struct Counters {
    pushed: AtomicU64,
    skipped: AtomicU64,
}

/// Owns one capture source and the thread that drains it into a queue.
///
/// ```no_run
/// use mct_camera::{BlockingQueue, Grabber, SyntheticConfig, SyntheticSource};
///
/// let queue = BlockingQueue::shared();
/// let mut cam = Grabber::new(0, "0", queue.clone(), SyntheticSource::new(SyntheticConfig::default()));
/// cam.start().unwrap();
/// let packet = queue.pop().unwrap();
/// println!("camera {} → {}x{}", packet.camera_id(), packet.frame().width, packet.frame().height);
/// cam.stop();
/// ```
///
/// Not `Clone`: the worker handle has exactly one owner. Dropping a
/// grabber stops it.
pub struct Grabber {
    camera_id: CameraId,
    source: String,
    queue: SharedQueue<FramePacket>,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    capture: Option<Box<dyn CaptureSource>>,
    worker: Option<JoinHandle<RunOutcome>>,
    state: GrabberState,
    outcome: Option<RunOutcome>,
}

impl Grabber {
    /// A grabber in the `Idle` state. `source` is the descriptor the
    /// capture backend is opened with (see [`SourceAddress::parse`]).
    pub fn new(
        camera_id: CameraId,
        source: impl Into<String>,
        queue: SharedQueue<FramePacket>,
        capture: impl CaptureSource + 'static,
    ) -> Self {
        Self {
            camera_id,
            source: source.into(),
            queue,
            running: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
            capture: Some(Box::new(capture)),
            worker: None,
            state: GrabberState::Idle,
            outcome: None,
        }
    }

    /// Spawn the worker thread.
    ///
    /// No-op while already running. A stopped grabber is spent and
    /// returns [`GrabberError::AlreadyStopped`].
    pub fn start(&mut self) -> Result<(), GrabberError> {
        match self.state {
            GrabberState::Running => return Ok(()),
            GrabberState::Stopped => return Err(GrabberError::AlreadyStopped(self.camera_id)),
            GrabberState::Idle => {}
        }
        let capture = self
            .capture
            .take()
            .ok_or(GrabberError::AlreadyStopped(self.camera_id))?;

        let worker = Worker {
            camera_id: self.camera_id,
            address: SourceAddress::parse(&self.source),
            queue: Arc::clone(&self.queue),
            running: Arc::clone(&self.running),
            counters: Arc::clone(&self.counters),
            capture,
        };

        self.running.store(true, Ordering::Release);
        let spawned = thread::Builder::new()
            .name(format!("grabber-{}", self.camera_id))
            .spawn(move || worker.run());

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                self.state = GrabberState::Running;
                Ok(())
            }
            Err(source) => {
                // the source went down with the closure; nothing left to restart
                self.running.store(false, Ordering::Release);
                self.state = GrabberState::Stopped;
                Err(GrabberError::Spawn {
                    camera_id: self.camera_id,
                    source,
                })
            }
        }
    }

    /// Ask the worker to finish its current read and exit, without
    /// waiting and without touching the queue.
    ///
    /// Lets a host halt several grabbers that share a queue before the
    /// first [`stop`](Self::stop) latches it.
    pub fn signal_stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Stop the worker, wait for it to exit, then stop the shared queue.
    ///
    /// No-op unless running. Once this returns no further packets from
    /// this camera reach the queue. Blocks for as long as the source's
    /// current read takes.
    pub fn stop(&mut self) {
        if self.state != GrabberState::Running {
            return;
        }
        self.running.store(false, Ordering::Release);

        if let Some(handle) = self.worker.take() {
            let outcome = handle.join().unwrap_or_else(|_| {
                log::error!("camera {} worker panicked", self.camera_id);
                RunOutcome::Panicked
            });
            self.outcome = Some(outcome);
        }

        self.queue.stop();
        self.state = GrabberState::Stopped;
    }

    pub fn camera_id(&self) -> CameraId {
        self.camera_id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn state(&self) -> GrabberState {
        self.state
    }

    /// True once the worker has exited on its own (open/read failure)
    /// while the grabber is still nominally running.
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| h.is_finished())
    }

    /// How the worker loop ended; known after [`stop`](Self::stop).
    pub fn outcome(&self) -> Option<RunOutcome> {
        self.outcome
    }

    pub fn stats(&self) -> GrabberStats {
        GrabberStats {
            frames_pushed: self.counters.pushed.load(Ordering::Relaxed),
            frames_skipped: self.counters.skipped.load(Ordering::Relaxed),
        }
    }
}

impl Drop for Grabber {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Grabber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grabber")
            .field("camera_id", &self.camera_id)
            .field("source", &self.source)
            .field("state", &self.state)
            .field("outcome", &self.outcome)
            .finish()
    }
}

/// Everything the worker thread owns.
struct Worker {
    camera_id: CameraId,
    address: SourceAddress,
    queue: SharedQueue<FramePacket>,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    capture: Box<dyn CaptureSource>,
}

impl Worker {
    fn run(mut self) -> RunOutcome {
        if let Err(e) = self.capture.open(&self.address) {
            log::error!("camera {} failed to open source {}: {e}", self.camera_id, self.address);
            return RunOutcome::OpenFailed;
        }
        log::info!("camera {} started ({})", self.camera_id, self.address);

        let outcome = self.pump();

        let pushed = self.counters.pushed.load(Ordering::Relaxed);
        log::info!("camera {} stopped after {pushed} frame(s)", self.camera_id);
        outcome
    }

    fn pump(&mut self) -> RunOutcome {
        while self.running.load(Ordering::Acquire) {
            let frame = match self.capture.read() {
                Ok(frame) => frame,
                Err(CaptureError::EndOfStream) => {
                    log::info!("camera {} reached end of stream", self.camera_id);
                    return RunOutcome::ReadFailed;
                }
                Err(e) => {
                    log::warn!("camera {} failed to read frame: {e}", self.camera_id);
                    return RunOutcome::ReadFailed;
                }
            };

            if frame.is_empty() {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                log::trace!("camera {} skipped an empty frame", self.camera_id);
                continue;
            }

            self.queue.push(FramePacket::new(self.camera_id, frame));
            self.counters.pushed.fetch_add(1, Ordering::Relaxed);
        }
        RunOutcome::Stopped
    }
}
