// SPDX-License-Identifier: GPL-3.0-only

//! FireStreamer - publish raw camera frames as an H.264 RTSP(S) stream
//!
//! The library builds a GStreamer graph that takes raw YUY2 frames from the
//! application, optionally routes them through a grayscale round trip,
//! encodes them to H.264 and pushes the result to an RTSP server over TLS.
//!
//! # Architecture
//!
//! - [`config`]: stream configuration and settings file handling
//! - [`pipeline`]: graph construction, bus handling, frame ingestion
//! - [`encoders`]: H.264 encoder selection
//! - [`errors`]: error types
//!
//! # Example
//!
//! ```ignore
//! use firestreamer::{LogReporter, Streamer, StreamerConfig};
//! use std::sync::Arc;
//!
//! let config = StreamerConfig::new("rtsps://host:8322/path", 384, 288)
//!     .with_credentials(Some("user"), Some("pass"));
//! let streamer = Streamer::initialize(config, Arc::new(LogReporter))?;
//! streamer.push_frame(&frame);
//! ```

pub mod config;
pub mod constants;
pub mod encoders;
pub mod errors;
pub mod pipeline;

// Re-export commonly used types
pub use config::{Credentials, IngestOptions, OverflowPolicy, StreamerConfig};
pub use errors::{ConfigError, StreamerError, StreamerResult};
pub use pipeline::{
    LogReporter, PipelineState, StatusOutcome, StatusReport, StatusReporter, Streamer,
};
