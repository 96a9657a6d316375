use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::{CaptureError, Frame, PixelFormat, Result};

/// Where a capture source should attach.
///
/// Descriptors that parse as an integer address a local device by
/// index; anything else is passed to the backend verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceAddress {
    Device(i32),
    Uri(String),
}

impl SourceAddress {
    /// The whole trimmed descriptor must be an integer. Unlike a
    /// leading-number parse, `"2.mp4"` is a path here, not device 2.
    pub fn parse(descriptor: &str) -> Self {
        match descriptor.trim().parse::<i32>() {
            Ok(index) => SourceAddress::Device(index),
            Err(_) => SourceAddress::Uri(descriptor.to_string()),
        }
    }
}

impl FromStr for SourceAddress {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Infallible> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for SourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceAddress::Device(index) => write!(f, "device #{index}"),
            SourceAddress::Uri(uri) => f.write_str(uri),
        }
    }
}

/// Backend a [`Grabber`](crate::Grabber) pulls frames from.
///
/// A source is opened once and then read repeatedly from the grabber's
/// worker thread. `read` may block, but should return within a bounded
/// time so the worker can notice a stop request; returning
/// [`Frame::empty`] is the way to yield without data.
pub trait CaptureSource: Send {
    fn open(&mut self, address: &SourceAddress) -> Result<()>;

    /// Next frame. `Err` ends the grabber's loop (end of stream or a
    /// device fault); an empty frame is skipped.
    fn read(&mut self) -> Result<Frame>;
}

impl<S: CaptureSource + ?Sized> CaptureSource for Box<S> {
    fn open(&mut self, address: &SourceAddress) -> Result<()> {
        (**self).open(address)
    }

    fn read(&mut self) -> Result<Frame> {
        (**self).read()
    }
}

/// Settings for [`SyntheticSource`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    /// Pacing in frames per second; 0 delivers as fast as possible.
    pub fps: u32,
    /// Reads allowed before the source reports end of stream.
    pub frame_limit: Option<u64>,
    /// Every n-th read yields an empty frame.
    pub empty_every: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            frame_limit: None,
            empty_every: None,
        }
    }
}

/// Test-pattern source for development without hardware.
///
/// Accepts device indices (any index ≥ 0) and `stub://` URIs; any other
/// address fails to open, which is handy for exercising open faults.
pub struct SyntheticSource {
    config: SyntheticConfig,
    opened: bool,
    reads: u64,
    next_due: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            opened: false,
            reads: 0,
            next_due: None,
        }
    }

    fn period(&self) -> Option<Duration> {
        (self.config.fps > 0).then(|| Duration::from_secs(1) / self.config.fps)
    }

    fn pace(&mut self) {
        let Some(period) = self.period() else { return };
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            std::thread::sleep(due - now);
        }
        // don't try to catch up after a stall
        self.next_due = Some(due.max(now) + period);
    }

    fn pattern(&self) -> Vec<u8> {
        let len = PixelFormat::Rgb8.buffer_len(self.config.width, self.config.height);
        (0..len).map(|i| ((i as u64 + self.reads) % 256) as u8).collect()
    }
}

impl CaptureSource for SyntheticSource {
    fn open(&mut self, address: &SourceAddress) -> Result<()> {
        let accepted = match address {
            SourceAddress::Device(index) => *index >= 0,
            SourceAddress::Uri(uri) => uri.starts_with("stub://"),
        };
        if !accepted {
            return Err(CaptureError::OpenFailed {
                address: address.to_string(),
                reason: "synthetic source only serves device indices and stub:// URIs".into(),
            });
        }
        log::debug!(
            "synthetic source attached to {address} ({}x{} @ {} fps)",
            self.config.width,
            self.config.height,
            self.config.fps
        );
        self.opened = true;
        self.reads = 0;
        self.next_due = None;
        Ok(())
    }

    fn read(&mut self) -> Result<Frame> {
        if !self.opened {
            return Err(CaptureError::NotOpened);
        }
        if self.config.frame_limit.is_some_and(|limit| self.reads >= limit) {
            return Err(CaptureError::EndOfStream);
        }
        self.pace();
        self.reads += 1;

        if self
            .config
            .empty_every
            .is_some_and(|n| n > 0 && self.reads % n == 0)
        {
            return Ok(Frame::empty());
        }

        let pts = self.period().unwrap_or_default() * (self.reads - 1) as u32;
        Ok(Frame::new(
            self.pattern(),
            self.config.width,
            self.config.height,
            PixelFormat::Rgb8,
        )
        .with_pts(pts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny(frame_limit: Option<u64>, empty_every: Option<u64>) -> SyntheticSource {
        SyntheticSource::new(SyntheticConfig {
            width: 4,
            height: 2,
            fps: 0,
            frame_limit,
            empty_every,
        })
    }

    #[test]
    fn integer_descriptors_address_devices() {
        assert_eq!(SourceAddress::parse("0"), SourceAddress::Device(0));
        assert_eq!(SourceAddress::parse(" 2 "), SourceAddress::Device(2));
        assert_eq!(SourceAddress::parse("-1"), SourceAddress::Device(-1));
    }

    #[test]
    fn other_descriptors_fall_back_to_uri() {
        assert_eq!(
            SourceAddress::parse("rtsp://10.0.0.7:554/stream"),
            SourceAddress::Uri("rtsp://10.0.0.7:554/stream".into())
        );
        assert_eq!(
            SourceAddress::parse("2.mp4"),
            SourceAddress::Uri("2.mp4".into())
        );
        assert_eq!(SourceAddress::parse(""), SourceAddress::Uri(String::new()));
        let parsed: SourceAddress = "/dev/video0".parse().unwrap();
        assert_eq!(parsed.to_string(), "/dev/video0");
    }

    #[test]
    fn synthetic_rejects_unknown_schemes() {
        let mut src = tiny(None, None);
        let err = src
            .open(&SourceAddress::parse("rtsp://cam"))
            .unwrap_err();
        assert!(matches!(err, CaptureError::OpenFailed { .. }));
        assert!(matches!(src.read(), Err(CaptureError::NotOpened)));
    }

    #[test]
    fn synthetic_honours_frame_limit() {
        let mut src = tiny(Some(3), None);
        src.open(&SourceAddress::Device(0)).unwrap();
        for _ in 0..3 {
            let f = src.read().unwrap();
            assert_eq!(f.data.len(), 4 * 2 * 3);
            assert!(!f.is_empty());
        }
        assert!(matches!(src.read(), Err(CaptureError::EndOfStream)));
    }

    #[test]
    fn synthetic_emits_empty_frames_on_schedule() {
        let mut src = tiny(Some(6), Some(3));
        src.open(&SourceAddress::parse("stub://front")).unwrap();
        let empties: Vec<bool> = (0..6).map(|_| src.read().unwrap().is_empty()).collect();
        assert_eq!(empties, vec![false, false, true, false, false, true]);
    }

    #[test]
    fn synthetic_frames_differ_between_reads() {
        let mut src = tiny(None, None);
        src.open(&SourceAddress::Device(1)).unwrap();
        let a = src.read().unwrap();
        let b = src.read().unwrap();
        assert_ne!(a.data, b.data);
    }
}
