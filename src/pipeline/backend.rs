// SPDX-License-Identifier: GPL-3.0-only

//! Graph engine abstraction
//!
//! The streamer only needs a handful of operations from the media engine:
//! create a graph, allocate and configure named stages, link them, change
//! state, push buffers and read bus messages. Keeping them behind these
//! traits lets the construction and teardown logic run against a mock in
//! tests.
//!
//! ```text
//! ┌─────────────────────┐
//! │      Streamer       │  ← initialize / push_frame / teardown
//! └──────────┬──────────┘
//!            ▼
//! ┌─────────────────────┐
//! │  MediaGraph trait   │  ← stages, caps, links, state, buffers
//! └──────────┬──────────┘
//!            ▼
//!      ┌───────────┐
//!      │ GStreamer │  ← concrete implementation
//!      └───────────┘
//! ```

use super::caps::CapsSpec;
use super::message::BusMessage;
use super::state::PipelineState;
use super::topology::{StageProperty, StageRole, StageSpec};
use crate::errors::StreamerResult;
use std::time::Duration;

/// Result of handing one frame to the ingestion stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Bytes copied into the transport buffer
    pub copied: usize,
    /// Whether the stage accepted the buffer
    pub flow: Result<(), String>,
}

/// Reader side of the graph's message bus
pub trait MessageSource: Send {
    /// Wait up to `timeout` for the next message
    fn next_message(&mut self, timeout: Duration) -> Option<BusMessage>;
}

/// Creates empty graphs
pub trait GraphFactory {
    fn create_graph(&self, name: &str) -> StreamerResult<Box<dyn MediaGraph>>;
}

/// A graph under construction or running
///
/// Release methods return whether there was anything to release, so a
/// repeated teardown is a no-op for resources already gone.
pub trait MediaGraph: Send {
    /// Subscribe to the bus; the returned source is read by the event loop
    fn watch_bus(&mut self) -> StreamerResult<Box<dyn MessageSource>>;

    /// Allocate a stage from the first available factory in `spec`
    ///
    /// Returns the factory that was used.
    fn create_stage(&mut self, spec: &StageSpec) -> Result<String, String>;

    /// Set a property on a created stage
    fn set_property(&mut self, role: StageRole, property: &StageProperty) -> Result<(), String>;

    /// Attach a capability constraint to a created filter stage
    fn set_caps(&mut self, role: StageRole, caps: &CapsSpec) -> Result<(), String>;

    /// Link two created stages, upstream first
    fn link(&mut self, upstream: StageRole, downstream: StageRole) -> Result<(), String>;

    /// Request a state change of the whole graph
    fn set_state(&mut self, state: PipelineState) -> Result<(), String>;

    /// Copy `data` into a new buffer and submit it to the ingestion stage
    ///
    /// With `max_wait`, the frame is only submitted once the ingestion queue
    /// has room; if it stays full that long the frame is dropped uncopied.
    fn submit(&self, data: &[u8], max_wait: Option<Duration>) -> Submission;

    fn release_stage(&mut self, role: StageRole) -> bool;

    /// Drop the bus subscription
    fn release_watch(&mut self) -> bool;

    /// Stop the graph and drop the bus and graph objects
    fn release_graph(&mut self) -> bool;
}
