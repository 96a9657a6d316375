// mct-camera/src/lib.rs
// ============================================================
// Multi-camera frame grabbing for mct
// One worker thread per camera pulls frames from a capture
// source and pushes timestamped packets into a shared
// BlockingQueue that any number of consumers pop from.
// ------------------------------------------------------------
// Public API:
//   * Grabber::new() / start() / stop() – per-camera worker
//   * CaptureSource                      – backend trait
//   * frame_stream()                     – async view of a queue
// ------------------------------------------------------------
// Build notes
//   * `--features gstreamer` enables GstSource (v4l2 / URIs).
//   * Without it only SyntheticSource is available.
// ============================================================

//! mct – camera capture layer
//!
//! A [`Grabber`] owns one [`CaptureSource`] and one worker thread. The
//! worker opens the source once, then loops reading [`Frame`]s and
//! pushing [`FramePacket`]s (camera id + frame + monotonic timestamp)
//! into a [`SharedQueue`]. Several grabbers usually share one queue.
//!
//! Capture faults never take the process down: an open or read failure
//! ends that one grabber's loop and is logged. Stopping a grabber joins
//! its worker and then stops the queue so blocked consumers are released.

use thiserror::Error;

pub mod config;
mod frame;
mod grabber;
#[cfg(feature = "gstreamer")]
mod gst_source;
mod source;
mod stream;

pub use config::{Backend, CameraConfig, CaptureConfig, ConfigError};
pub use frame::{CameraId, Frame, FramePacket, PixelFormat};
pub use grabber::{Grabber, GrabberState, GrabberStats, RunOutcome};
#[cfg(feature = "gstreamer")]
pub use gst_source::{GstConfig, GstSource};
pub use source::{CaptureSource, SourceAddress, SyntheticConfig, SyntheticSource};
pub use stream::frame_stream;

pub use mct_queue::{BlockingQueue, SharedQueue};

/// Queue type every grabber feeds.
pub type FrameQueue = BlockingQueue<FramePacket>;

/// Errors reported by capture sources.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to open source {address}: {reason}")]
    OpenFailed { address: String, reason: String },
    #[error("source read before open")]
    NotOpened,
    #[error("end of stream")]
    EndOfStream,
    #[error("failed to read frame: {0}")]
    ReadFailed(String),
    #[cfg(feature = "gstreamer")]
    #[error("GStreamer init failed: {0}")]
    GstInit(#[source] gst::glib::Error),
    #[cfg(feature = "gstreamer")]
    #[error("Failed to parse pipeline: {0}")]
    ParsePipeline(#[source] gst::glib::Error),
    #[cfg(feature = "gstreamer")]
    #[error("Pipeline is not a gst::Pipeline")]
    NotPipeline,
    #[cfg(feature = "gstreamer")]
    #[error("AppSink element not found")]
    AppSinkNotFound,
    #[cfg(feature = "gstreamer")]
    #[error("Failed to set pipeline to Playing: {0}")]
    StateChange(#[source] gst::StateChangeError),
    #[cfg(feature = "gstreamer")]
    #[error("Sample has no buffer")]
    MissingBuffer,
    #[cfg(feature = "gstreamer")]
    #[error("Sample has no caps")]
    MissingCaps,
    #[cfg(feature = "gstreamer")]
    #[error("Caps missing struct")]
    MissingStructure,
    #[cfg(feature = "gstreamer")]
    #[error("Failed to get field value: {0}")]
    FieldError(String),
    #[cfg(feature = "gstreamer")]
    #[error("Buffer map failed: {0}")]
    BufferMap(String),
}

/// Errors from the grabber lifecycle.
#[derive(Error, Debug)]
pub enum GrabberError {
    #[error("camera {0} was already stopped and cannot be restarted")]
    AlreadyStopped(CameraId),
    #[error("failed to spawn worker for camera {camera_id}: {source}")]
    Spawn {
        camera_id: CameraId,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, CaptureError>;
