// SPDX-License-Identifier: GPL-3.0-only

//! Bus message dispatch
//!
//! Runs on the event loop thread. Graph state changes are recorded,
//! errors are classified and reported, end-of-stream is recorded.
//! Dispatch never asks the loop to stop; only teardown does that.

use super::classify::{ClassificationRules, ReportOnce, StatusOutcome, StatusReport};
use super::message::{BusMessage, StageError};
use super::state::{PipelineState, SharedState};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// What happened to an error message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Graph is in NULL; the error is teardown noise
    Suppressed,
    /// Stage is not one whose errors are classified
    Unclassified,
    /// Classified and delivered to the status reporter
    Reported(StatusOutcome),
    /// Classified, but a status was already delivered earlier
    AlreadyReported(StatusOutcome),
}

/// Handles every message read from the bus
#[derive(Debug)]
pub struct BusDispatcher {
    shared: Arc<SharedState>,
    rules: ClassificationRules,
    status: ReportOnce,
}

impl BusDispatcher {
    pub fn new(shared: Arc<SharedState>, rules: ClassificationRules, status: ReportOnce) -> Self {
        Self {
            shared,
            rules,
            status,
        }
    }

    /// Handle one message
    ///
    /// No message ends the watch, end of stream included; only teardown
    /// stops the event loop.
    pub fn dispatch(&self, message: BusMessage) {
        match message {
            BusMessage::EndOfStream => {
                info!("End of stream reached");
                self.shared.mark_end_of_stream();
            }
            BusMessage::StateChanged {
                from_graph: true,
                old,
                current,
                ..
            } => {
                self.shared.set(current);
                info!(from = old.name(), to = current.name(), "Pipeline state changed");
            }
            BusMessage::StateChanged {
                source,
                old,
                current,
                ..
            } => {
                trace!(%source, from = old.name(), to = current.name(), "Stage state changed");
            }
            BusMessage::Error(err) => {
                self.handle_error(err);
            }
            BusMessage::Warning(warning) => {
                warn!(
                    source = %warning.source,
                    message = %warning.message,
                    debug = ?warning.debug,
                    "Warning from stage"
                );
            }
            BusMessage::Other(_) => {}
        }
    }

    /// Suppress, classify and report a stage error
    pub fn handle_error(&self, err: StageError) -> ErrorDisposition {
        if self.shared.current() == PipelineState::Null {
            debug!(source = %err.source, message = %err.message, "Ignoring error in NULL state");
            return ErrorDisposition::Suppressed;
        }

        error!(
            source = %err.source,
            message = %err.message,
            debug = err.debug.as_deref().unwrap_or("none"),
            "Error received from stage"
        );

        let Some(outcome) = self.rules.classify(&err) else {
            return ErrorDisposition::Unclassified;
        };

        let delivered = self.status.report(StatusReport {
            outcome,
            stage: err.source,
            message: err.message,
        });

        if delivered {
            ErrorDisposition::Reported(outcome)
        } else {
            ErrorDisposition::AlreadyReported(outcome)
        }
    }

    pub fn has_reported(&self) -> bool {
        self.status.has_reported()
    }
}
