use std::time::{Duration, Instant};

/// Identifier of the grabber that produced a packet.
pub type CameraId = u32;

/// Pixel layout of a [`Frame`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Bgr8,
    Gray8,
    /// Y plane followed by interleaved UV at half resolution.
    Nv12,
}

impl PixelFormat {
    /// Bytes per row with no padding.
    pub fn packed_stride(self, width: u32) -> u32 {
        match self {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => width * 3,
            PixelFormat::Gray8 | PixelFormat::Nv12 => width,
        }
    }

    /// Minimum buffer size for a `width`×`height` image.
    pub fn buffer_len(self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => w * h * 3,
            PixelFormat::Gray8 => w * h,
            PixelFormat::Nv12 => w * h * 3 / 2,
        }
    }
}

/// A decoded image as handed over by a capture source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
    /// Presentation time reported by the source, if it has one.
    pub pts: Option<Duration>,
}

impl Frame {
    /// Tightly packed frame (stride derived from `format`).
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            stride: format.packed_stride(width),
            format,
            pts: None,
        }
    }

    /// A frame carrying nothing; grabbers skip these.
    pub fn empty() -> Self {
        Self::new(Vec::new(), 0, 0, PixelFormat::Rgb8)
    }

    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() || self.width == 0 || self.height == 0
    }
}

/// One captured frame in flight between a grabber and a consumer.
///
/// Immutable once built; consumers read it through accessors or take
/// the frame out with [`into_frame`](Self::into_frame).
#[derive(Debug, Clone, PartialEq)]
pub struct FramePacket {
    camera_id: CameraId,
    frame: Frame,
    timestamp: Instant,
}

impl FramePacket {
    /// Stamp `frame` with the current monotonic time.
    pub fn new(camera_id: CameraId, frame: Frame) -> Self {
        Self::captured_at(camera_id, frame, Instant::now())
    }

    pub fn captured_at(camera_id: CameraId, frame: Frame, timestamp: Instant) -> Self {
        Self {
            camera_id,
            frame,
            timestamp,
        }
    }

    pub fn camera_id(&self) -> CameraId {
        self.camera_id
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Time since capture; consumers use this for latency.
    pub fn age(&self) -> Duration {
        self.timestamp.elapsed()
    }

    pub fn into_frame(self) -> Frame {
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_frame_detection() {
        assert!(Frame::empty().is_empty());
        assert!(Frame::new(vec![1, 2, 3], 0, 1, PixelFormat::Rgb8).is_empty());
        assert!(!Frame::new(vec![1, 2, 3], 1, 1, PixelFormat::Rgb8).is_empty());
    }

    #[test]
    fn stride_follows_format() {
        let f = Frame::new(vec![0; 640 * 480 * 3], 640, 480, PixelFormat::Bgr8);
        assert_eq!(f.stride, 1920);
        assert_eq!(PixelFormat::Nv12.buffer_len(640, 480), 460_800);
        assert_eq!(PixelFormat::Gray8.packed_stride(33), 33);
    }

    #[test]
    fn packet_keeps_capture_time() {
        let t0 = Instant::now();
        let p = FramePacket::captured_at(3, Frame::empty(), t0);
        assert_eq!(p.camera_id(), 3);
        assert_eq!(p.timestamp(), t0);
        assert!(p.age() >= Duration::ZERO);
        assert!(p.into_frame().is_empty());
    }
}
