// SPDX-License-Identifier: GPL-3.0-only

//! Streaming pipeline
//!
//! Raw frames enter through an application source, are constrained to the
//! configured raw format, optionally pass through a grayscale round trip,
//! are encoded to H.264 and published to an RTSP(S) server.
//!
//! # Components
//!
//! - [`topology`]: stage roles and the colour/grayscale stage lists
//! - [`caps`]: capability constraints per filter stage
//! - [`streamer`]: construction, frame ingestion and teardown
//! - [`event_loop`] and [`dispatch`]: bus draining on a background thread
//! - [`classify`]: mapping of stage errors to a reported status
//! - [`backend`]: the engine seam, implemented by [`gst_backend`]

pub mod backend;
pub mod caps;
pub mod classify;
pub mod dispatch;
pub mod event_loop;
pub mod gst_backend;
pub mod ingest;
pub mod message;
pub mod state;
pub mod streamer;
pub mod topology;

#[cfg(test)]
pub(crate) mod mock;

pub use caps::CapsSpec;
pub use classify::{
    ClassificationRule, ClassificationRules, LogReporter, StatusOutcome, StatusReport,
    StatusReporter,
};
pub use ingest::IngestStats;
pub use message::{BusMessage, ErrorKind, StageError};
pub use state::PipelineState;
pub use streamer::Streamer;
pub use topology::{StageRole, Topology};
