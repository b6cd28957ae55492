// SPDX-License-Identifier: GPL-3.0-only

//! Background thread that drains the graph's bus
//!
//! The thread is the only reader of the bus. It is started before any stage
//! exists so messages posted during construction are not lost, and is
//! stopped and joined by teardown before the bus itself is released.
//! Cancellation happens between messages: a message already taken from the
//! bus is always handled to completion.

use super::backend::MessageSource;
use super::message::BusMessage;
use crate::errors::{StreamerError, StreamerResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Controller for the bus-draining thread
pub struct EventLoopThread {
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<()>>,
    /// Signal to stop the loop
    stop_signal: Arc<AtomicBool>,
    /// Name for logging
    name: String,
}

impl EventLoopThread {
    /// Spawn the loop thread
    ///
    /// `handler` is called for every message read from `source` until
    /// [`stop`](Self::stop). Between messages the thread blocks on the bus
    /// for at most `poll_interval` before checking the stop signal again.
    pub fn start<F>(
        name: &str,
        mut source: Box<dyn MessageSource>,
        poll_interval: Duration,
        mut handler: F,
    ) -> StreamerResult<Self>
    where
        F: FnMut(BusMessage) + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, "Starting event loop");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %name_clone, "Event loop thread started");

                while !stop_signal_clone.load(Ordering::SeqCst) {
                    if let Some(message) = source.next_message(poll_interval) {
                        handler(message);
                    }
                }

                info!(name = %name_clone, "Event loop thread exiting");
            })
            .map_err(|e| StreamerError::EventLoop(format!("Failed to spawn {}: {}", name, e)))?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop the loop and wait for the thread to finish
    ///
    /// Calling this again after the thread has been joined does nothing.
    pub fn stop(&mut self) {
        debug!(name = %self.name, "Requesting event loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for event loop thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Event loop thread panicked: {:?}", e);
            }
        }
    }
}

impl Drop for EventLoopThread {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "EventLoopThread dropped, stopping loop");
            self.stop();
        }
    }
}

impl std::fmt::Debug for EventLoopThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoopThread")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}
