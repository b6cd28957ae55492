// SPDX-License-Identifier: GPL-3.0-only

//! Messages delivered on the graph's bus

use super::state::PipelineState;

/// Structured error category, taken from the engine's error domain/code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Resource could not be opened for reading
    OpenRead,
    /// Resource could not be opened for reading and writing
    OpenReadWrite,
    /// Access to the resource was refused
    NotAuthorized,
    /// Resource does not exist
    ResourceNotFound,
    /// Any other error code
    Other,
}

/// An error posted by a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageError {
    /// Name of the originating element
    pub source: String,
    /// Structured category, when the engine provides one
    pub kind: Option<ErrorKind>,
    /// Human readable error text
    pub message: String,
    /// Extra debugging details
    pub debug: Option<String>,
}

impl StageError {
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            kind: None,
            message: message.into(),
            debug: None,
        }
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// A message read from the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusMessage {
    /// An element changed state
    StateChanged {
        source: String,
        /// True when the top-level graph posted it rather than a stage
        from_graph: bool,
        old: PipelineState,
        current: PipelineState,
        pending: Option<PipelineState>,
    },
    Error(StageError),
    Warning(StageError),
    EndOfStream,
    /// Any other message type, by name
    Other(String),
}

impl BusMessage {
    /// State change posted by the graph itself
    pub fn graph_state_changed(old: PipelineState, current: PipelineState) -> Self {
        BusMessage::StateChanged {
            source: crate::constants::PIPELINE_NAME.to_string(),
            from_graph: true,
            old,
            current,
            pending: None,
        }
    }
}
