// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the streamer

use crate::pipeline::topology::StageRole;
use std::fmt;

/// Result type alias using StreamerError
pub type StreamerResult<T> = Result<T, StreamerError>;

/// Main streamer error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamerError {
    /// Configuration rejected before anything was allocated
    Config(ConfigError),
    /// Another streamer instance is still active in this process
    AlreadyActive,
    /// The media framework could not be initialized
    Init(String),
    /// The top-level graph object could not be created
    GraphCreation(String),
    /// One or more stages could not be allocated
    StageCreation(Vec<StageRole>),
    /// A property or capability could not be applied to a stage
    Negotiation { role: StageRole, reason: String },
    /// Two adjacent stages could not be linked
    Link {
        upstream: StageRole,
        downstream: StageRole,
    },
    /// The graph rejected a requested state change
    StateChange(String),
    /// The background event loop could not be started
    EventLoop(String),
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The stream URL is empty
    EmptyUrl,
    /// The stream URL exceeds the length bound
    UrlTooLong { len: usize, max: usize },
    /// A username or password exceeds the length bound
    CredentialTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    /// Frame width outside the supported range
    WidthOutOfRange(u32),
    /// Frame height outside the supported range
    HeightOutOfRange(u32),
    /// Frame rate outside the supported range
    /// Ingestion queue bound must hold at least one frame
    InvalidIngestLimit(u32),
    /// Settings file could not be read or parsed
    File(String),
}

impl fmt::Display for StreamerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamerError::Config(e) => write!(f, "Configuration error: {}", e),
            StreamerError::AlreadyActive => write!(f, "A streamer instance is already active"),
            StreamerError::Init(msg) => write!(f, "Initialization failed: {}", msg),
            StreamerError::GraphCreation(msg) => write!(f, "Pipeline could not be created: {}", msg),
            StreamerError::StageCreation(roles) => {
                let names: Vec<&str> = roles.iter().map(|r| r.element_name()).collect();
                write!(f, "Stages could not be created: {}", names.join(", "))
            }
            StreamerError::Negotiation { role, reason } => {
                write!(f, "Failed to configure '{}': {}", role.element_name(), reason)
            }
            StreamerError::Link {
                upstream,
                downstream,
            } => write!(
                f,
                "Failed to link '{}' to '{}'",
                upstream.element_name(),
                downstream.element_name()
            ),
            StreamerError::StateChange(msg) => write!(f, "State change failed: {}", msg),
            StreamerError::EventLoop(msg) => write!(f, "Event loop error: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyUrl => write!(f, "Stream URL must not be empty"),
            ConfigError::UrlTooLong { len, max } => {
                write!(f, "Stream URL is {} bytes, maximum is {}", len, max)
            }
            ConfigError::CredentialTooLong { field, len, max } => {
                write!(f, "{} is {} bytes, maximum is {}", field, len, max)
            }
            ConfigError::WidthOutOfRange(w) => write!(f, "Width {} is out of range", w),
            ConfigError::HeightOutOfRange(h) => write!(f, "Height {} is out of range", h),
            ConfigError::InvalidIngestLimit(n) => {
                write!(f, "Ingestion queue must hold at least one frame (got {})", n)
            }
            ConfigError::File(msg) => write!(f, "Settings file error: {}", msg),
        }
    }
}

impl std::error::Error for StreamerError {}
impl std::error::Error for ConfigError {}

impl From<ConfigError> for StreamerError {
    fn from(err: ConfigError) -> Self {
        StreamerError::Config(err)
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::File(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::File(err.to_string())
    }
}
