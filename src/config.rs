// SPDX-License-Identifier: GPL-3.0-only

//! Streamer configuration
//!
//! A [`StreamerConfig`] is fixed for the lifetime of a streamer. It can be
//! built in code, read from a JSON settings file, and is validated before
//! any part of the graph is allocated.

use crate::constants::{caps, defaults, limits, timing};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What the ingestion stage does once its queue bound is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Discard the oldest queued frame to make room (default, keeps latency low)
    #[default]
    DropOldest,
    /// Discard the frame being pushed
    DropNewest,
    /// Wait a bounded time for room, then drop the frame being pushed
    Block,
}

impl std::fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverflowPolicy::DropOldest => write!(f, "drop-oldest"),
            OverflowPolicy::DropNewest => write!(f, "drop-newest"),
            OverflowPolicy::Block => write!(f, "block"),
        }
    }
}

impl std::str::FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop-oldest" => Ok(OverflowPolicy::DropOldest),
            "drop-newest" => Ok(OverflowPolicy::DropNewest),
            "block" => Ok(OverflowPolicy::Block),
            other => Err(format!(
                "unknown overflow policy '{}' (expected drop-oldest, drop-newest or block)",
                other
            )),
        }
    }
}

/// Bounds applied to the ingestion stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    /// Frames held before the overflow policy kicks in
    pub max_queued_frames: u32,
    /// Overflow behaviour
    pub overflow: OverflowPolicy,
    /// Longest a blocking push waits for room, in milliseconds
    pub block_timeout_ms: u64,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_queued_frames: defaults::MAX_QUEUED_FRAMES,
            overflow: OverflowPolicy::default(),
            block_timeout_ms: timing::INGEST_BLOCK_TIMEOUT.as_millis() as u64,
        }
    }
}

impl IngestOptions {
    /// How long a push may wait for queue room; `None` for the dropping policies
    pub fn wait_limit(&self) -> Option<Duration> {
        match self.overflow {
            OverflowPolicy::Block => Some(Duration::from_millis(self.block_timeout_ms)),
            OverflowPolicy::DropOldest | OverflowPolicy::DropNewest => None,
        }
    }
}

/// Optional credentials for the RTSP server
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Stream configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerConfig {
    /// RTSP(S) server location
    pub url: String,
    /// Optional username/password
    pub credentials: Credentials,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Route the signal through a grayscale round trip before encoding
    pub grayscale: bool,
    /// Force a specific H.264 encoder factory instead of the preference list
    pub encoder: Option<String>,
    /// Ingestion queue bounds
    pub ingest: IngestOptions,
    /// How long to wait for the graph to reach PLAYING, in milliseconds
    pub ready_timeout_ms: u64,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            credentials: Credentials::default(),
            width: defaults::WIDTH,
            height: defaults::HEIGHT,
            grayscale: false,
            encoder: None,
            ingest: IngestOptions::default(),
            ready_timeout_ms: timing::READY_TIMEOUT.as_millis() as u64,
        }
    }
}

impl StreamerConfig {
    /// Create a colour stream configuration with default settings
    pub fn new(url: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            url: url.into(),
            width,
            height,
            ..Self::default()
        }
    }

    /// Set the credentials; either may be absent
    pub fn with_credentials(mut self, username: Option<&str>, password: Option<&str>) -> Self {
        self.credentials = Credentials {
            username: username.map(str::to_string),
            password: password.map(str::to_string),
        };
        self
    }

    pub fn with_grayscale(mut self, grayscale: bool) -> Self {
        self.grayscale = grayscale;
        self
    }

    /// Check every precondition of graph construction
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::EmptyUrl);
        }
        if self.url.len() > limits::MAX_PARAM_LEN {
            return Err(ConfigError::UrlTooLong {
                len: self.url.len(),
                max: limits::MAX_PARAM_LEN,
            });
        }

        let credentials = [
            ("username", &self.credentials.username),
            ("password", &self.credentials.password),
        ];
        for (field, value) in credentials {
            if let Some(value) = value
                && value.len() > limits::MAX_PARAM_LEN
            {
                return Err(ConfigError::CredentialTooLong {
                    field,
                    len: value.len(),
                    max: limits::MAX_PARAM_LEN,
                });
            }
        }

        if !(limits::MIN_WIDTH..=limits::MAX_WIDTH).contains(&self.width) {
            return Err(ConfigError::WidthOutOfRange(self.width));
        }
        if !(limits::MIN_HEIGHT..=limits::MAX_HEIGHT).contains(&self.height) {
            return Err(ConfigError::HeightOutOfRange(self.height));
        }
        if self.ingest.max_queued_frames == 0 {
            return Err(ConfigError::InvalidIngestLimit(0));
        }

        Ok(())
    }

    /// Size in bytes of one raw frame at the ingestion boundary
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * caps::RAW_BYTES_PER_PIXEL
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Read a configuration from a JSON settings file
    ///
    /// Missing keys fall back to their defaults. The result is not validated;
    /// command-line overrides are usually applied first.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::File(format!("{}: {}", path.display(), e)))?;
        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Default settings file location (`$XDG_CONFIG_HOME/firestreamer/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("firestreamer").join("config.json"))
    }
}
