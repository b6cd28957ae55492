// SPDX-License-Identifier: GPL-3.0-only

//! The streaming pipeline manager
//!
//! [`Streamer::initialize`] builds the graph for a configuration, starts it
//! and returns once it is playing. Frames are then handed in through
//! [`Streamer::push_frame`]. Asynchronous errors are classified on the
//! event loop thread and delivered to the status reporter at most once.
//! [`Streamer::teardown`] (also run on drop) releases everything.
//!
//! Only one streamer may be active per process.

use super::backend::{GraphFactory, MediaGraph};
use super::classify::{ClassificationRules, ReportOnce, StatusReporter};
use super::dispatch::BusDispatcher;
use super::event_loop::EventLoopThread;
use super::gst_backend::GstGraphFactory;
use super::ingest::{IngestCounters, IngestStats};
use super::state::{PipelineState, SharedState};
use super::topology::{StageRole, Topology};
use crate::config::StreamerConfig;
use crate::constants::{PIPELINE_NAME, timing};
use crate::errors::{StreamerError, StreamerResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// Name of the event loop thread
const EVENT_LOOP_NAME: &str = "gstMsgBus";

static INSTANCE_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Held by the active streamer; released on drop
#[derive(Debug)]
struct InstanceGuard;

impl InstanceGuard {
    fn acquire() -> StreamerResult<Self> {
        INSTANCE_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| InstanceGuard)
            .map_err(|_| StreamerError::AlreadyActive)
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        INSTANCE_ACTIVE.store(false, Ordering::SeqCst);
    }
}

/// Whether a streamer is currently active in this process
pub fn is_instance_active() -> bool {
    INSTANCE_ACTIVE.load(Ordering::SeqCst)
}

/// Owner of the graph, its event loop and the ingestion port
pub struct Streamer {
    config: StreamerConfig,
    topology: Topology,
    graph: Option<Box<dyn MediaGraph>>,
    event_loop: Option<EventLoopThread>,
    shared: Arc<SharedState>,
    dispatcher: Arc<BusDispatcher>,
    counters: IngestCounters,
    guard: Option<InstanceGuard>,
}

impl Streamer {
    /// Build and start a GStreamer graph for `config`
    pub fn initialize(
        config: StreamerConfig,
        reporter: Arc<dyn StatusReporter>,
    ) -> StreamerResult<Self> {
        Self::initialize_with(
            &GstGraphFactory,
            config,
            ClassificationRules::default(),
            reporter,
        )
    }

    /// Build and start a graph using a specific engine and rule table
    ///
    /// On failure every stage created so far is released and the instance
    /// slot is freed again.
    pub fn initialize_with(
        factory: &dyn GraphFactory,
        config: StreamerConfig,
        rules: ClassificationRules,
        reporter: Arc<dyn StatusReporter>,
    ) -> StreamerResult<Self> {
        config.validate()?;
        let guard = InstanceGuard::acquire()?;

        info!(
            url = %config.url,
            width = config.width,
            height = config.height,
            grayscale = config.grayscale,
            overflow = %config.ingest.overflow,
            "Initializing streamer"
        );

        let topology = Topology::for_config(&config);
        let shared = Arc::new(SharedState::new());
        let dispatcher = Arc::new(BusDispatcher::new(
            Arc::clone(&shared),
            rules,
            ReportOnce::new(reporter),
        ));
        let graph = factory.create_graph(PIPELINE_NAME)?;

        let mut streamer = Self {
            config,
            topology,
            graph: Some(graph),
            event_loop: None,
            shared,
            dispatcher,
            counters: IngestCounters::default(),
            guard: Some(guard),
        };

        if let Err(e) = streamer.build() {
            error!(error = %e, "Pipeline construction failed");
            streamer.teardown();
            return Err(e);
        }

        streamer.wait_until_playing();
        Ok(streamer)
    }

    /// Start the event loop, then create, configure, link and start stages
    fn build(&mut self) -> StreamerResult<()> {
        let graph = self
            .graph
            .as_mut()
            .ok_or_else(|| StreamerError::GraphCreation("Pipeline already released".into()))?;

        let source = graph.watch_bus()?;
        let dispatcher = Arc::clone(&self.dispatcher);
        self.event_loop = Some(EventLoopThread::start(
            EVENT_LOOP_NAME,
            source,
            timing::BUS_POLL_INTERVAL,
            move |message| dispatcher.dispatch(message),
        )?);

        let mut failed = Vec::new();
        for spec in self.topology.stages() {
            match graph.create_stage(spec) {
                Ok(factory) => debug!(stage = %spec.role, %factory, "Created stage"),
                Err(reason) => {
                    error!(stage = %spec.role, %reason, "Failed to create stage");
                    failed.push(spec.role);
                }
            }
        }
        if !failed.is_empty() {
            return Err(StreamerError::StageCreation(failed));
        }

        // Capabilities must be in place before linking so the encoder
        // negotiates against them
        for spec in self.topology.stages() {
            for property in &spec.properties {
                graph
                    .set_property(spec.role, property)
                    .map_err(|reason| StreamerError::Negotiation {
                        role: spec.role,
                        reason,
                    })?;
                if property.secret {
                    debug!(stage = %spec.role, property = property.name, "Set property");
                } else {
                    debug!(stage = %spec.role, property = property.name, value = %property.value, "Set property");
                }
            }
            if let Some(caps) = &spec.caps {
                graph
                    .set_caps(spec.role, caps)
                    .map_err(|reason| StreamerError::Negotiation {
                        role: spec.role,
                        reason,
                    })?;
                info!(stage = %spec.role, %caps, "Applied capability");
            }
        }

        let roles = self.topology.roles();
        for pair in roles.windows(2) {
            let (upstream, downstream) = (pair[0], pair[1]);
            graph.link(upstream, downstream).map_err(|reason| {
                error!(%upstream, %downstream, %reason, "Failed to link stages");
                StreamerError::Link {
                    upstream,
                    downstream,
                }
            })?;
        }
        info!(stages = roles.len(), "Linked pipeline");

        graph
            .set_state(PipelineState::Playing)
            .map_err(StreamerError::StateChange)?;
        Ok(())
    }

    /// Block until the event loop reports PLAYING or the timeout elapses
    fn wait_until_playing(&self) {
        let timeout = self.config.ready_timeout();
        if self.shared.wait_for(PipelineState::Playing, timeout) {
            info!("Pipeline is playing");
        } else {
            warn!(
                state = %self.shared.current(),
                timeout_ms = timeout.as_millis() as u64,
                "Pipeline did not reach PLAYING in time, continuing"
            );
        }
    }

    /// Copy one raw frame into the ingestion stage
    ///
    /// Returns the number of bytes copied. A frame the stage refuses after
    /// the copy is logged and counted in [`Streamer::stats`] but still
    /// reports the copied size; terminal problems arrive through the status
    /// reporter. After teardown nothing is copied and 0 is returned.
    pub fn push_frame(&self, data: &[u8]) -> usize {
        let Some(graph) = &self.graph else {
            error!("Frame pushed after teardown");
            return 0;
        };

        let submission = graph.submit(data, self.config.ingest.wait_limit());
        self.counters.record(&submission);
        submission.copied
    }

    /// Release the event loop, stages, bus watch and graph
    ///
    /// Safe to call more than once and on a partially built streamer.
    pub fn teardown(&mut self) {
        if let Some(mut event_loop) = self.event_loop.take() {
            event_loop.stop();
        }

        if let Some(mut graph) = self.graph.take() {
            if let Err(e) = graph.set_state(PipelineState::Null) {
                warn!(error = %e, "Failed to stop pipeline");
            }

            let released = StageRole::TEARDOWN_ORDER
                .into_iter()
                .filter(|role| graph.release_stage(*role))
                .count();
            graph.release_watch();
            graph.release_graph();
            info!(stages = released, "Pipeline torn down");
        }

        self.shared.set(PipelineState::Null);

        if self.guard.take().is_some() {
            debug!("Streamer instance released");
        }
    }

    /// Last graph state observed on the bus
    pub fn state(&self) -> PipelineState {
        self.shared.current()
    }

    pub fn stats(&self) -> IngestStats {
        self.counters.snapshot()
    }

    /// Whether the graph posted end-of-stream
    pub fn is_end_of_stream(&self) -> bool {
        self.shared.is_end_of_stream()
    }

    /// Whether a status outcome has been delivered to the reporter
    pub fn has_reported_status(&self) -> bool {
        self.dispatcher.has_reported()
    }

    /// Whether the graph still exists
    pub fn is_active(&self) -> bool {
        self.graph.is_some()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }
}

impl Drop for Streamer {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for Streamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Streamer")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("active", &self.is_active())
            .field("event_loop", &self.event_loop)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverflowPolicy;
    use crate::constants::stage_names;
    use crate::pipeline::classify::{StatusOutcome, StatusReport};
    use crate::pipeline::message::{BusMessage, StageError};
    use crate::pipeline::mock::{self, Event, Failures, MockEngine};
    use std::sync::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<StatusReport>>);

    impl StatusReporter for Recorder {
        fn report_status(&self, report: &StatusReport) {
            self.0.lock().unwrap().push(report.clone());
        }
    }

    impl Recorder {
        fn outcomes(&self) -> Vec<StatusOutcome> {
            self.0.lock().unwrap().iter().map(|r| r.outcome).collect()
        }
    }

    fn config(grayscale: bool) -> StreamerConfig {
        StreamerConfig::new("rtsps://host:8322/path", 384, 288)
            .with_credentials(Some("user"), Some("pass"))
            .with_grayscale(grayscale)
    }

    fn start(
        engine: &MockEngine,
        config: StreamerConfig,
    ) -> (StreamerResult<Streamer>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let result = Streamer::initialize_with(
            engine,
            config,
            ClassificationRules::default(),
            recorder.clone(),
        );
        (result, recorder)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_end_to_end_color_stream() {
        let _serial = mock::serial();
        let engine = MockEngine::new();
        let (result, recorder) = start(&engine, config(false));
        let mut streamer = result.unwrap();

        assert_eq!(streamer.state(), PipelineState::Playing);
        assert_eq!(engine.live_stages(), 6);

        let frame = vec![0x80u8; 384 * 288 * 2];
        assert_eq!(streamer.push_frame(&frame), 165_888);

        let error = StageError::new(stage_names::ENCODER, "Unauthorized");
        assert!(engine.post(BusMessage::Error(error.clone())));
        assert!(wait_until(|| !recorder.outcomes().is_empty()));
        assert_eq!(recorder.outcomes(), vec![StatusOutcome::Unauthorized]);

        assert!(engine.post(BusMessage::Error(error)));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(recorder.outcomes().len(), 1);
        assert!(streamer.has_reported_status());

        streamer.teardown();
        assert_eq!(engine.live_stages(), 0);
        assert!(!engine.graph_alive());
    }

    #[test]
    fn test_push_sizes_are_returned_exactly() {
        let _serial = mock::serial();
        let engine = MockEngine::new();
        let (result, _) = start(&engine, config(false));
        let streamer = result.unwrap();

        for size in [0, 1, 165_888, 1920 * 1080 * 2] {
            let frame = vec![0u8; size];
            assert_eq!(streamer.push_frame(&frame), size);
        }

        let stats = streamer.stats();
        assert_eq!(stats.frames, 4);
        assert_eq!(stats.rejected, 0);
    }

    #[test]
    fn test_rejected_frames_still_report_copied_size() {
        let _serial = mock::serial();
        let engine = MockEngine::new();
        let (result, _) = start(&engine, config(false));
        let streamer = result.unwrap();

        engine.set_failures(Failures {
            reject_buffers: true,
            ..Failures::default()
        });
        assert_eq!(streamer.push_frame(&[1, 2, 3]), 3);
        assert_eq!(streamer.stats().rejected, 1);
    }

    #[test]
    fn test_blocking_push_gives_up_when_queue_stays_full() {
        let _serial = mock::serial();
        let engine = MockEngine::new();
        let mut config = config(false);
        config.ingest.overflow = OverflowPolicy::Block;
        config.ingest.block_timeout_ms = 20;
        let (result, _) = start(&engine, config);
        let streamer = result.unwrap();

        engine.set_failures(Failures {
            queue_full: true,
            ..Failures::default()
        });
        let started = Instant::now();
        assert_eq!(streamer.push_frame(&[0u8; 64]), 0);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(streamer.stats().rejected, 1);
        assert!(!engine.events().contains(&Event::Submitted(64)));

        engine.set_failures(Failures::default());
        assert_eq!(streamer.push_frame(&[0u8; 64]), 64);
        assert_eq!(streamer.stats().rejected, 1);
    }

    #[test]
    fn test_dropping_policy_never_waits_for_room() {
        let _serial = mock::serial();
        let engine = MockEngine::new();
        let (result, _) = start(&engine, config(false));
        let streamer = result.unwrap();

        engine.set_failures(Failures {
            queue_full: true,
            ..Failures::default()
        });
        assert_eq!(streamer.push_frame(&[0u8; 64]), 64);
        assert_eq!(streamer.stats().rejected, 0);
    }

    #[test]
    fn test_second_instance_is_rejected() {
        let _serial = mock::serial();
        let engine = MockEngine::new();
        let (first, _) = start(&engine, config(false));
        let mut first = first.unwrap();
        assert!(is_instance_active());

        let other = MockEngine::new();
        let (second, _) = start(&other, config(false));
        assert_eq!(second.unwrap_err(), StreamerError::AlreadyActive);
        assert!(other.events().is_empty());

        first.teardown();
        assert!(!is_instance_active());

        let (third, _) = start(&other, config(false));
        assert!(third.is_ok());
    }

    #[test]
    fn test_invalid_config_allocates_nothing() {
        let _serial = mock::serial();
        let engine = MockEngine::new();
        let (result, _) = start(&engine, StreamerConfig::new("rtsps://h/p", 2000, 288));
        assert!(matches!(result, Err(StreamerError::Config(_))));
        assert!(engine.events().is_empty());
        assert!(!is_instance_active());
    }

    #[test]
    fn test_missing_encoder_unwinds_every_stage() {
        let _serial = mock::serial();
        let engine = MockEngine::with_failures(Failures {
            missing_factories: vec![
                "v4l2h264enc".into(),
                "x264enc".into(),
                "openh264enc".into(),
            ],
            ..Failures::default()
        });
        let (result, _) = start(&engine, config(false));

        assert_eq!(
            result.unwrap_err(),
            StreamerError::StageCreation(vec![StageRole::Encoder])
        );
        assert_eq!(engine.live_stages(), 0);
        assert!(!engine.graph_alive());
        assert!(!is_instance_active());
    }

    #[test]
    fn test_encoder_falls_back_to_software() {
        let _serial = mock::serial();
        let engine = MockEngine::with_failures(Failures {
            missing_factories: vec!["v4l2h264enc".into()],
            ..Failures::default()
        });
        let (result, _) = start(&engine, config(false));
        assert!(result.is_ok());
        assert!(
            engine
                .events()
                .contains(&Event::StageCreated(StageRole::Encoder, "x264enc".into()))
        );
    }

    #[test]
    fn test_link_failure_unwinds() {
        let _serial = mock::serial();
        let engine = MockEngine::with_failures(Failures {
            link: Some((StageRole::Encoder, StageRole::EncoderFilter)),
            ..Failures::default()
        });
        let (result, _) = start(&engine, config(false));

        assert_eq!(
            result.unwrap_err(),
            StreamerError::Link {
                upstream: StageRole::Encoder,
                downstream: StageRole::EncoderFilter,
            }
        );
        assert_eq!(engine.live_stages(), 0);
        assert!(!is_instance_active());
    }

    #[test]
    fn test_property_failure_unwinds() {
        let _serial = mock::serial();
        let engine = MockEngine::with_failures(Failures {
            property: Some((StageRole::Sink, "user-pw")),
            ..Failures::default()
        });
        let (result, _) = start(&engine, config(false));

        assert!(matches!(
            result,
            Err(StreamerError::Negotiation {
                role: StageRole::Sink,
                ..
            })
        ));
        assert_eq!(engine.live_stages(), 0);
    }

    #[test]
    fn test_state_change_failure_unwinds() {
        let _serial = mock::serial();
        let engine = MockEngine::with_failures(Failures {
            state_change: true,
            ..Failures::default()
        });
        let (result, _) = start(&engine, config(true));

        assert!(matches!(result, Err(StreamerError::StateChange(_))));
        assert_eq!(engine.live_stages(), 0);
        assert!(!engine.graph_alive());
    }

    #[test]
    fn test_readiness_timeout_still_succeeds() {
        let _serial = mock::serial();
        let engine = MockEngine::with_failures(Failures {
            stall_startup: true,
            ..Failures::default()
        });
        let mut config = config(false);
        config.ready_timeout_ms = 20;
        let (result, _) = start(&engine, config);

        let streamer = result.unwrap();
        assert_eq!(streamer.state(), PipelineState::Null);
    }

    #[test]
    fn test_caps_applied_before_any_link() {
        let _serial = mock::serial();
        let engine = MockEngine::new();
        let (result, _) = start(&engine, config(true));
        let _streamer = result.unwrap();

        let events = engine.events();
        let last_caps = events
            .iter()
            .rposition(|e| matches!(e, Event::CapsSet(..)))
            .unwrap();
        let first_link = events
            .iter()
            .position(|e| matches!(e, Event::Linked(..)))
            .unwrap();
        assert!(last_caps < first_link);

        let watch = events.iter().position(|e| *e == Event::BusWatched).unwrap();
        let first_stage = events
            .iter()
            .position(|e| matches!(e, Event::StageCreated(..)))
            .unwrap();
        assert!(watch < first_stage);
    }

    #[test]
    fn test_grayscale_link_order_and_symmetry() {
        let _serial = mock::serial();
        let engine = MockEngine::new();
        let (result, _) = start(&engine, config(true));
        let streamer = result.unwrap();

        let expected: Vec<_> = StageRole::GRAYSCALE
            .windows(2)
            .map(|pair| (pair[0], pair[1]))
            .collect();
        assert_eq!(engine.links(), expected);
        assert_eq!(engine.live_stages(), 10);
        assert!(streamer.topology().is_grayscale());

        let source = engine.caps_for(StageRole::SourceFilter).unwrap();
        let round_trip = engine.caps_for(StageRole::ColorFilter).unwrap();
        assert!(source.contains("format=(string)YUY2"));
        assert!(round_trip.contains("format=(string)YUY2"));
        assert!(
            engine
                .caps_for(StageRole::GrayscaleFilter)
                .unwrap()
                .contains("GRAY8")
        );
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let _serial = mock::serial();
        let engine = MockEngine::new();
        let (result, _) = start(&engine, config(true));
        let mut streamer = result.unwrap();

        streamer.teardown();
        let after_first = engine.events();
        streamer.teardown();
        assert_eq!(engine.events(), after_first);

        let released: Vec<_> = after_first
            .iter()
            .filter_map(|e| match e {
                Event::StageReleased(role) => Some(*role),
                _ => None,
            })
            .collect();
        assert_eq!(released, StageRole::TEARDOWN_ORDER.to_vec());
        assert_eq!(
            after_first[after_first.len() - 2..],
            [Event::WatchReleased, Event::GraphReleased]
        );

        assert_eq!(streamer.push_frame(&[0u8; 16]), 0);
        assert_eq!(streamer.state(), PipelineState::Null);
        assert!(!streamer.is_active());
    }

    #[test]
    fn test_errors_after_teardown_are_not_reported() {
        let _serial = mock::serial();
        let engine = MockEngine::new();
        let (result, recorder) = start(&engine, config(false));
        let mut streamer = result.unwrap();

        streamer.teardown();
        assert!(!engine.post(BusMessage::Error(StageError::new(
            stage_names::SINK,
            "Could not open resource for reading."
        ))));
        assert!(recorder.outcomes().is_empty());
    }

    #[test]
    fn test_end_of_stream_is_recorded() {
        let _serial = mock::serial();
        let engine = MockEngine::new();
        let (result, _) = start(&engine, config(false));
        let streamer = result.unwrap();

        assert!(!streamer.is_end_of_stream());
        engine.post(BusMessage::EndOfStream);
        assert!(wait_until(|| streamer.is_end_of_stream()));
        assert_eq!(streamer.state(), PipelineState::Playing);
    }

    #[test]
    fn test_overflow_policy_reaches_ingestion_stage() {
        let _serial = mock::serial();
        let engine = MockEngine::new();
        let mut config = config(false);
        config.ingest.overflow = OverflowPolicy::Block;
        let (result, _) = start(&engine, config);
        let _streamer = result.unwrap();

        let events = engine.events();
        for name in ["max-bytes", "block", "leaky-type"] {
            assert!(events.contains(&Event::PropertySet(StageRole::Ingestion, name)));
        }
    }
}
