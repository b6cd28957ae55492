// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline lifecycle state
//!
//! The current state is written by the event loop when the graph itself
//! reports a transition, and read by the dispatcher and by `initialize`
//! while it waits for the graph to start playing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Lifecycle states of the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord, Hash)]
pub enum PipelineState {
    /// Initial state, nothing is processing
    #[default]
    Null,
    Ready,
    Paused,
    /// Target running state
    Playing,
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Null => "NULL",
            PipelineState::Ready => "READY",
            PipelineState::Paused => "PAUSED",
            PipelineState::Playing => "PLAYING",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// State shared between the event loop and the streamer
#[derive(Debug, Default)]
pub struct SharedState {
    current: Mutex<PipelineState>,
    changed: Condvar,
    end_of_stream: AtomicBool,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state of the graph
    pub fn current(&self) -> PipelineState {
        *self.lock()
    }

    /// Record a new state and wake waiters; returns the previous state
    pub fn set(&self, state: PipelineState) -> PipelineState {
        let previous = std::mem::replace(&mut *self.lock(), state);
        self.changed.notify_all();
        previous
    }

    /// Block until the graph reaches `target` or `timeout` elapses
    ///
    /// Returns `true` if the state was reached.
    pub fn wait_for(&self, target: PipelineState, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _timeout) = self
            .changed
            .wait_timeout_while(guard, timeout, |state| *state != target)
            .unwrap_or_else(PoisonError::into_inner);
        *guard == target
    }

    pub fn mark_end_of_stream(&self) {
        self.end_of_stream.store(true, Ordering::SeqCst);
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.end_of_stream.load(Ordering::SeqCst)
    }
}
