// SPDX-License-Identifier: GPL-3.0-only

//! In-memory graph engine for tests
//!
//! Records every call in a ledger, can be told to fail specific steps, and
//! drives a channel-backed bus. Requesting PLAYING posts the usual
//! NULL → READY → PAUSED → PLAYING transitions for the graph.

use super::backend::{GraphFactory, MediaGraph, MessageSource, Submission};
use super::caps::CapsSpec;
use super::message::BusMessage;
use super::state::PipelineState;
use super::topology::{StageProperty, StageRole, StageSpec};
use crate::errors::{StreamerError, StreamerResult};
use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

static TEST_LOCK: Mutex<()> = Mutex::new(());

/// Serialize tests that create a streamer; only one may be active per process
pub fn serial() -> MutexGuard<'static, ()> {
    TEST_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bus reader over an mpsc channel
pub struct ChannelSource {
    rx: Receiver<BusMessage>,
}

impl ChannelSource {
    pub fn new(rx: Receiver<BusMessage>) -> Self {
        Self { rx }
    }
}

impl MessageSource for ChannelSource {
    fn next_message(&mut self, timeout: Duration) -> Option<BusMessage> {
        self.rx.recv_timeout(timeout).ok()
    }
}

/// One recorded engine call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    GraphCreated(String),
    BusWatched,
    StageCreated(StageRole, String),
    PropertySet(StageRole, &'static str),
    CapsSet(StageRole, String),
    Linked(StageRole, StageRole),
    StateRequested(PipelineState),
    Submitted(usize),
    StageReleased(StageRole),
    WatchReleased,
    GraphReleased,
}

/// Steps the mock should fail
#[derive(Debug, Default, Clone)]
pub struct Failures {
    pub graph: bool,
    /// Factories that are not installed
    pub missing_factories: Vec<String>,
    pub property: Option<(StageRole, &'static str)>,
    pub link: Option<(StageRole, StageRole)>,
    pub state_change: bool,
    /// Accept PLAYING but never report reaching it
    pub stall_startup: bool,
    pub reject_buffers: bool,
    /// The ingestion queue never drains
    pub queue_full: bool,
}

#[derive(Default)]
struct Shared {
    events: Mutex<Vec<Event>>,
    live_stages: Mutex<HashSet<StageRole>>,
    graph_alive: Mutex<bool>,
    bus: Mutex<Option<Sender<BusMessage>>>,
    failures: Mutex<Failures>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Graph factory handle; clones share the same ledger
#[derive(Clone, Default)]
pub struct MockEngine {
    shared: Arc<Shared>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failures(failures: Failures) -> Self {
        let engine = Self::default();
        *lock(&engine.shared.failures) = failures;
        engine
    }

    pub fn set_failures(&self, failures: Failures) {
        *lock(&self.shared.failures) = failures;
    }

    pub fn events(&self) -> Vec<Event> {
        lock(&self.shared.events).clone()
    }

    /// Number of stages created and not yet released
    pub fn live_stages(&self) -> usize {
        lock(&self.shared.live_stages).len()
    }

    pub fn graph_alive(&self) -> bool {
        *lock(&self.shared.graph_alive)
    }

    /// Post a message on the current graph's bus
    pub fn post(&self, message: BusMessage) -> bool {
        lock(&self.shared.bus)
            .as_ref()
            .is_some_and(|tx| tx.send(message).is_ok())
    }

    pub fn links(&self) -> Vec<(StageRole, StageRole)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Linked(a, b) => Some((a, b)),
                _ => None,
            })
            .collect()
    }

    pub fn caps_for(&self, role: StageRole) -> Option<String> {
        self.events().into_iter().find_map(|e| match e {
            Event::CapsSet(r, caps) if r == role => Some(caps),
            _ => None,
        })
    }

    fn record(&self, event: Event) {
        lock(&self.shared.events).push(event);
    }
}

impl GraphFactory for MockEngine {
    fn create_graph(&self, name: &str) -> StreamerResult<Box<dyn MediaGraph>> {
        if lock(&self.shared.failures).graph {
            return Err(StreamerError::GraphCreation("mock refused".into()));
        }

        let (tx, rx) = mpsc::channel();
        *lock(&self.shared.bus) = Some(tx);
        *lock(&self.shared.graph_alive) = true;
        self.record(Event::GraphCreated(name.to_string()));

        Ok(Box::new(MockGraph {
            engine: self.clone(),
            rx: Some(rx),
            watching: false,
            alive: true,
            stages: HashSet::new(),
        }))
    }
}

struct MockGraph {
    engine: MockEngine,
    rx: Option<Receiver<BusMessage>>,
    watching: bool,
    alive: bool,
    stages: HashSet<StageRole>,
}

impl MockGraph {
    fn failures(&self) -> Failures {
        lock(&self.engine.shared.failures).clone()
    }

    fn require(&self, role: StageRole) -> Result<(), String> {
        if self.stages.contains(&role) {
            Ok(())
        } else {
            Err(format!("stage '{}' does not exist", role))
        }
    }
}

impl MediaGraph for MockGraph {
    fn watch_bus(&mut self) -> StreamerResult<Box<dyn MessageSource>> {
        let rx = self
            .rx
            .take()
            .ok_or_else(|| StreamerError::EventLoop("bus already watched".into()))?;
        self.watching = true;
        self.engine.record(Event::BusWatched);
        Ok(Box::new(ChannelSource::new(rx)))
    }

    fn create_stage(&mut self, spec: &StageSpec) -> Result<String, String> {
        if self.stages.contains(&spec.role) {
            return Err(format!("stage '{}' already exists", spec.role));
        }
        let missing = self.failures().missing_factories;
        let factory = spec
            .factories
            .iter()
            .find(|f| !missing.contains(f))
            .ok_or_else(|| format!("none of [{}] available", spec.factories.join(", ")))?;

        self.stages.insert(spec.role);
        lock(&self.engine.shared.live_stages).insert(spec.role);
        self.engine
            .record(Event::StageCreated(spec.role, factory.clone()));
        Ok(factory.clone())
    }

    fn set_property(&mut self, role: StageRole, property: &StageProperty) -> Result<(), String> {
        self.require(role)?;
        if self.failures().property == Some((role, property.name)) {
            return Err(format!("no property '{}'", property.name));
        }
        self.engine.record(Event::PropertySet(role, property.name));
        Ok(())
    }

    fn set_caps(&mut self, role: StageRole, caps: &CapsSpec) -> Result<(), String> {
        self.require(role)?;
        self.engine.record(Event::CapsSet(role, caps.to_string()));
        Ok(())
    }

    fn link(&mut self, upstream: StageRole, downstream: StageRole) -> Result<(), String> {
        self.require(upstream)?;
        self.require(downstream)?;
        if self.failures().link == Some((upstream, downstream)) {
            return Err("not-negotiated".into());
        }
        self.engine.record(Event::Linked(upstream, downstream));
        Ok(())
    }

    fn set_state(&mut self, state: PipelineState) -> Result<(), String> {
        let failures = self.failures();
        if failures.state_change && state == PipelineState::Playing {
            return Err("state change failed".into());
        }
        self.engine.record(Event::StateRequested(state));

        if state == PipelineState::Playing && !failures.stall_startup {
            let steps = [
                (PipelineState::Null, PipelineState::Ready),
                (PipelineState::Ready, PipelineState::Paused),
                (PipelineState::Paused, PipelineState::Playing),
            ];
            for (old, current) in steps {
                self.engine
                    .post(BusMessage::graph_state_changed(old, current));
            }
        }
        Ok(())
    }

    fn submit(&self, data: &[u8], max_wait: Option<Duration>) -> Submission {
        if !self.stages.contains(&StageRole::Ingestion) {
            return Submission {
                copied: 0,
                flow: Err("ingestion stage released".into()),
            };
        }
        let failures = self.failures();
        if let Some(wait) = max_wait
            && failures.queue_full
        {
            std::thread::sleep(wait);
            return Submission {
                copied: 0,
                flow: Err(format!("ingestion queue full after {:?}", wait)),
            };
        }
        self.engine.record(Event::Submitted(data.len()));
        let flow = if failures.reject_buffers {
            Err("Flushing".into())
        } else {
            Ok(())
        };
        Submission {
            copied: data.len(),
            flow,
        }
    }

    fn release_stage(&mut self, role: StageRole) -> bool {
        if !self.stages.remove(&role) {
            return false;
        }
        lock(&self.engine.shared.live_stages).remove(&role);
        self.engine.record(Event::StageReleased(role));
        true
    }

    fn release_watch(&mut self) -> bool {
        if !self.watching {
            return false;
        }
        self.watching = false;
        self.engine.record(Event::WatchReleased);
        true
    }

    fn release_graph(&mut self) -> bool {
        if !self.alive {
            return false;
        }
        self.alive = false;
        *lock(&self.engine.shared.bus) = None;
        *lock(&self.engine.shared.graph_alive) = false;
        self.engine.record(Event::GraphReleased);
        true
    }
}
