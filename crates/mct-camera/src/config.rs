//! TOML description of which cameras to grab and how.
//!
//! ```toml
//! backend   = "synthetic"   # or "gstreamer"
//! consumers = 2
//!
//! [synthetic]
//! width = 320
//! height = 240
//! fps = 15
//!
//! [[camera]]
//! id = 0
//! source = "0"
//!
//! [[camera]]
//! id = 1
//! source = "rtsp://10.0.0.7:554/stream"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::{CameraId, CaptureSource, FramePacket, Grabber, SharedQueue, SyntheticConfig, SyntheticSource};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which [`CaptureSource`] implementation grabbers are built with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Synthetic,
    Gstreamer,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CameraConfig {
    pub id: CameraId,
    /// Device index or URI, see [`SourceAddress::parse`](crate::SourceAddress::parse).
    pub source: String,
}

/// Settings for the `gstreamer` backend. Parsed even when the feature
/// is off so one config file serves both builds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GstSettings {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub pull_timeout_ms: u64,
}

impl Default for GstSettings {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            pull_timeout_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub backend: Backend,
    /// Consumer threads the host should run against the shared queue.
    pub consumers: usize,
    #[serde(rename = "camera")]
    pub cameras: Vec<CameraConfig>,
    pub synthetic: SyntheticConfig,
    pub gstreamer: GstSettings,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            consumers: 1,
            cameras: Vec::new(),
            synthetic: SyntheticConfig::default(),
            gstreamer: GstSettings::default(),
        }
    }
}

impl CaptureConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// One camera per descriptor, numbered from 0 in order.
    pub fn from_sources<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cameras = sources
            .into_iter()
            .zip(0..)
            .map(|(source, id)| CameraConfig {
                id,
                source: source.into(),
            })
            .collect();
        Self {
            cameras,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cameras.is_empty() {
            return Err(ConfigError::Invalid("no cameras configured".into()));
        }
        if self.consumers == 0 {
            return Err(ConfigError::Invalid("consumers must be at least 1".into()));
        }
        let mut ids = HashSet::new();
        for cam in &self.cameras {
            if cam.source.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("camera {} has an empty source", cam.id)));
            }
            if !ids.insert(cam.id) {
                return Err(ConfigError::Invalid(format!("camera id {} is used twice", cam.id)));
            }
        }
        Ok(())
    }

    /// A fresh capture source for the configured backend.
    pub fn capture_source(&self) -> Result<Box<dyn CaptureSource>, ConfigError> {
        match self.backend {
            Backend::Synthetic => Ok(Box::new(SyntheticSource::new(self.synthetic.clone()))),
            #[cfg(feature = "gstreamer")]
            Backend::Gstreamer => {
                let size = self.gstreamer.width.zip(self.gstreamer.height);
                Ok(Box::new(crate::GstSource::new(crate::GstConfig {
                    size,
                    pull_timeout: std::time::Duration::from_millis(self.gstreamer.pull_timeout_ms),
                })))
            }
            #[cfg(not(feature = "gstreamer"))]
            Backend::Gstreamer => Err(ConfigError::Invalid(
                "gstreamer backend requires the gstreamer feature".into(),
            )),
        }
    }

    /// Idle grabbers for every configured camera, all feeding `queue`.
    pub fn grabbers(&self, queue: &SharedQueue<FramePacket>) -> Result<Vec<Grabber>, ConfigError> {
        self.cameras
            .iter()
            .map(|cam| -> Result<Grabber, ConfigError> {
                let capture = self.capture_source()?;
                Ok(Grabber::new(cam.id, cam.source.clone(), queue.clone(), capture))
            })
            .collect()
    }
}
