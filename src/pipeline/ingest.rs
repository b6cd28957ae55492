// SPDX-License-Identifier: GPL-3.0-only

//! Frame ingestion: queue bounds for the application source and push accounting

use super::backend::Submission;
use super::topology::StageProperty;
use crate::config::{OverflowPolicy, StreamerConfig};
use crate::constants::timing;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error};

/// Properties of the application source stage
///
/// Buffers are timestamped on arrival and the source is live. Its internal
/// queue is bounded to `max_queued_frames` frames; what happens beyond that
/// is the configured overflow policy. The source itself never blocks the
/// caller: a blocking push waits for room in [`has_room`] polls instead, up
/// to the configured timeout.
pub fn appsrc_properties(config: &StreamerConfig) -> Vec<StageProperty> {
    let max_bytes = config.frame_bytes() as u64 * u64::from(config.ingest.max_queued_frames);

    let (block, leaky_type) = match config.ingest.overflow {
        OverflowPolicy::DropOldest => ("false", "downstream"),
        OverflowPolicy::DropNewest => ("false", "upstream"),
        OverflowPolicy::Block => ("false", "none"),
    };

    vec![
        StageProperty::new("do-timestamp", "true"),
        StageProperty::new("is-live", "true"),
        StageProperty::new("format", "time"),
        StageProperty::new("max-bytes", max_bytes.to_string()),
        StageProperty::new("block", block),
        StageProperty::new("leaky-type", leaky_type),
    ]
}

/// Whether a frame of `len` bytes fits next to `level` queued bytes
///
/// An empty queue always takes the frame, as does an unbounded one.
pub fn has_room(level: u64, max: u64, len: usize) -> bool {
    max == 0 || level == 0 || level.saturating_add(len as u64) <= max
}

/// Snapshot of the push counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Frames handed to the ingestion stage
    pub frames: u64,
    /// Bytes copied into transport buffers
    pub bytes: u64,
    /// Frames the stage refused after the copy
    pub rejected: u64,
}

/// Push counters shared by every call to the ingestion port
#[derive(Debug, Default)]
pub struct IngestCounters {
    frames: AtomicU64,
    bytes: AtomicU64,
    rejected: AtomicU64,
}

impl IngestCounters {
    /// Account for one submission and log it
    ///
    /// A rejection is logged but does not change what the caller is told:
    /// the copied byte count is still returned by the port.
    pub fn record(&self, submission: &Submission) {
        let frame = self.frames.fetch_add(1, Ordering::Relaxed);
        self.bytes
            .fetch_add(submission.copied as u64, Ordering::Relaxed);

        if let Err(reason) = &submission.flow {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            error!(frame, %reason, "Ingestion stage rejected frame");
        } else if frame % timing::FRAME_LOG_INTERVAL == 0 {
            debug!(frame, size = submission.copied, "Frames pushed");
        }
    }

    pub fn snapshot(&self) -> IngestStats {
        IngestStats {
            frames: self.frames.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
