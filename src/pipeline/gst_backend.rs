// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer implementation of the graph engine

use super::backend::{GraphFactory, MediaGraph, MessageSource, Submission};
use super::caps::{CapsSpec, CapsValue};
use super::ingest::has_room;
use super::message::{BusMessage, ErrorKind, StageError};
use super::state::PipelineState;
use super::topology::{StageProperty, StageRole, StageSpec};
use crate::constants::timing;
use crate::errors::{StreamerError, StreamerResult};
use gstreamer as gst;
use gstreamer::glib;
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Creates GStreamer pipelines, initializing GStreamer on first use
#[derive(Debug, Default, Clone, Copy)]
pub struct GstGraphFactory;

impl GraphFactory for GstGraphFactory {
    fn create_graph(&self, name: &str) -> StreamerResult<Box<dyn MediaGraph>> {
        gst::init().map_err(|e| StreamerError::Init(format!("GStreamer init failed: {}", e)))?;

        let pipeline = gst::Pipeline::builder().name(name).build();
        info!(name, "Created pipeline");

        Ok(Box::new(GstGraph {
            pipeline: Some(pipeline),
            bus: None,
            watching: false,
            stages: HashMap::new(),
            appsrc: None,
        }))
    }
}

/// A GStreamer pipeline plus handles to its named stages
pub struct GstGraph {
    pipeline: Option<gst::Pipeline>,
    bus: Option<gst::Bus>,
    watching: bool,
    stages: HashMap<StageRole, gst::Element>,
    appsrc: Option<AppSrc>,
}

impl GstGraph {
    fn pipeline(&self) -> Result<&gst::Pipeline, String> {
        self.pipeline
            .as_ref()
            .ok_or_else(|| "pipeline already released".to_string())
    }

    fn stage(&self, role: StageRole) -> Result<&gst::Element, String> {
        self.stages
            .get(&role)
            .ok_or_else(|| format!("stage '{}' does not exist", role))
    }
}

impl MediaGraph for GstGraph {
    fn watch_bus(&mut self) -> StreamerResult<Box<dyn MessageSource>> {
        let pipeline = self.pipeline().map_err(StreamerError::EventLoop)?;
        let bus = pipeline
            .bus()
            .ok_or_else(|| StreamerError::EventLoop("Pipeline has no bus".into()))?;
        let graph = pipeline.clone().upcast::<gst::Object>();

        self.bus = Some(bus.clone());
        self.watching = true;

        Ok(Box::new(GstBusWatch { bus, graph }))
    }

    fn create_stage(&mut self, spec: &StageSpec) -> Result<String, String> {
        let pipeline = self.pipeline()?.clone();
        let name = spec.role.element_name();

        for factory in &spec.factories {
            let element = match gst::ElementFactory::make(factory).name(name).build() {
                Ok(element) => element,
                Err(e) => {
                    debug!(factory = %factory, stage = name, error = %e, "Factory unavailable");
                    continue;
                }
            };

            pipeline
                .add(&element)
                .map_err(|e| format!("failed to add '{}' to pipeline: {}", name, e))?;

            if spec.role == StageRole::Ingestion {
                let appsrc = element
                    .clone()
                    .downcast::<AppSrc>()
                    .map_err(|_| format!("'{}' is not an application source", factory))?;
                self.appsrc = Some(appsrc);
            }

            self.stages.insert(spec.role, element);
            return Ok(factory.clone());
        }

        Err(format!("none of [{}] available", spec.factories.join(", ")))
    }

    fn set_property(&mut self, role: StageRole, property: &StageProperty) -> Result<(), String> {
        let element = self.stage(role)?;
        let pspec = element
            .find_property(property.name)
            .ok_or_else(|| format!("no property '{}'", property.name))?;

        let value = property_value(property, pspec.value_type())?;
        element.set_property_from_value(property.name, &value);
        Ok(())
    }

    fn set_caps(&mut self, role: StageRole, caps: &CapsSpec) -> Result<(), String> {
        let element = self.stage(role)?;
        if element.find_property("caps").is_none() {
            return Err(format!("'{}' does not accept caps", role));
        }
        element.set_property("caps", &to_gst_caps(caps));
        Ok(())
    }

    fn link(&mut self, upstream: StageRole, downstream: StageRole) -> Result<(), String> {
        let up = self.stage(upstream)?;
        let down = self.stage(downstream)?;
        up.link(down).map_err(|e| e.to_string())
    }

    fn set_state(&mut self, state: PipelineState) -> Result<(), String> {
        self.pipeline()?
            .set_state(to_gst_state(state))
            .map(|success| debug!(?success, target = state.name(), "State change requested"))
            .map_err(|e| e.to_string())
    }

    fn submit(&self, data: &[u8], max_wait: Option<Duration>) -> Submission {
        let Some(appsrc) = &self.appsrc else {
            return Submission {
                copied: 0,
                flow: Err("ingestion stage released".into()),
            };
        };

        if let Some(wait) = max_wait
            && !wait_for_room(appsrc, data.len(), wait)
        {
            return Submission {
                copied: 0,
                flow: Err(format!("ingestion queue full after {:?}", wait)),
            };
        }

        let mut buffer = if data.is_empty() {
            gst::Buffer::new()
        } else {
            match gst::Buffer::with_size(data.len()) {
                Ok(buffer) => buffer,
                Err(e) => {
                    return Submission {
                        copied: 0,
                        flow: Err(format!("failed to allocate buffer: {}", e)),
                    };
                }
            }
        };

        let copied = match buffer.get_mut() {
            Some(buffer_ref) => match buffer_ref.copy_from_slice(0, data) {
                Ok(()) => data.len(),
                Err(partial) => partial,
            },
            None => 0,
        };

        let flow = appsrc
            .push_buffer(buffer)
            .map(|_| ())
            .map_err(|e| format!("{:?}", e));

        Submission { copied, flow }
    }

    fn release_stage(&mut self, role: StageRole) -> bool {
        let Some(element) = self.stages.remove(&role) else {
            return false;
        };

        if role == StageRole::Ingestion {
            self.appsrc = None;
        }
        let _ = element.set_state(gst::State::Null);
        if let Some(pipeline) = &self.pipeline
            && let Err(e) = pipeline.remove(&element)
        {
            warn!(stage = %role, error = %e, "Failed to remove stage from pipeline");
        }
        debug!(stage = %role, "Released stage");
        true
    }

    fn release_watch(&mut self) -> bool {
        if !self.watching {
            return false;
        }
        self.watching = false;
        if let Some(bus) = &self.bus {
            bus.set_flushing(true);
        }
        true
    }

    fn release_graph(&mut self) -> bool {
        self.bus = None;
        let Some(pipeline) = self.pipeline.take() else {
            return false;
        };
        let _ = pipeline.set_state(gst::State::Null);
        info!("Pipeline released");
        true
    }
}

impl Drop for GstGraph {
    fn drop(&mut self) {
        if let Some(pipeline) = &self.pipeline {
            let _ = pipeline.set_state(gst::State::Null);
        }
    }
}

/// Convert a property value to the type the element declares
///
/// Strings are passed through verbatim. Everything else (booleans, numbers,
/// enums, flags) goes through GStreamer's value parser.
fn property_value(property: &StageProperty, value_type: glib::Type) -> Result<glib::Value, String> {
    if value_type == glib::Type::STRING {
        return Ok(glib::Value::from(property.value.as_str()));
    }

    glib::Value::deserialize(&property.value, value_type).map_err(|e| {
        if property.secret {
            format!("invalid value for '{}': {}", property.name, e)
        } else {
            format!(
                "invalid value '{}' for '{}': {}",
                property.value, property.name, e
            )
        }
    })
}

/// Poll the source's queue level until `len` more bytes fit or `wait` passes
fn wait_for_room(appsrc: &AppSrc, len: usize, wait: Duration) -> bool {
    let deadline = Instant::now() + wait;
    loop {
        if has_room(appsrc.current_level_bytes(), appsrc.max_bytes(), len) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        std::thread::sleep(timing::INGEST_BLOCK_POLL.min(deadline - now));
    }
}

/// Reads the pipeline bus on behalf of the event loop
struct GstBusWatch {
    bus: gst::Bus,
    graph: gst::Object,
}

impl MessageSource for GstBusWatch {
    fn next_message(&mut self, timeout: Duration) -> Option<BusMessage> {
        let msg = self
            .bus
            .timed_pop(gst::ClockTime::from_mseconds(timeout.as_millis() as u64))?;
        Some(convert_message(&msg, &self.graph))
    }
}

fn convert_message(msg: &gst::Message, graph: &gst::Object) -> BusMessage {
    use gst::MessageView;

    let source = msg
        .src()
        .map(|s| s.name().to_string())
        .unwrap_or_default();

    match msg.view() {
        MessageView::Eos(_) => BusMessage::EndOfStream,
        MessageView::StateChanged(sc) => BusMessage::StateChanged {
            from_graph: msg.src() == Some(graph),
            source,
            old: from_gst_state(sc.old()).unwrap_or_default(),
            current: from_gst_state(sc.current()).unwrap_or_default(),
            pending: from_gst_state(sc.pending()),
        },
        MessageView::Error(err) => BusMessage::Error(StageError {
            source,
            kind: error_kind(&err.error()),
            message: err.error().message().to_string(),
            debug: err.debug().map(|d| d.to_string()),
        }),
        MessageView::Warning(w) => BusMessage::Warning(StageError {
            source,
            kind: error_kind(&w.error()),
            message: w.error().message().to_string(),
            debug: w.debug().map(|d| d.to_string()),
        }),
        _ => BusMessage::Other(format!("{:?}", msg.type_())),
    }
}

/// Structured category of a resource error
fn error_kind(error: &glib::Error) -> Option<ErrorKind> {
    let kind = error.kind::<gst::ResourceError>()?;
    Some(match kind {
        gst::ResourceError::OpenRead => ErrorKind::OpenRead,
        gst::ResourceError::OpenReadWrite => ErrorKind::OpenReadWrite,
        gst::ResourceError::NotAuthorized => ErrorKind::NotAuthorized,
        gst::ResourceError::NotFound => ErrorKind::ResourceNotFound,
        _ => ErrorKind::Other,
    })
}

fn to_gst_caps(spec: &CapsSpec) -> gst::Caps {
    let mut builder = gst::Caps::builder(spec.media_type());
    for (name, value) in spec.fields() {
        builder = match value {
            CapsValue::Str(s) => builder.field(name, s.as_str()),
            CapsValue::Int(i) => builder.field(name, *i),
            CapsValue::Fraction(n, d) => builder.field(name, gst::Fraction::new(*n, *d)),
        };
    }
    builder.build()
}

fn to_gst_state(state: PipelineState) -> gst::State {
    match state {
        PipelineState::Null => gst::State::Null,
        PipelineState::Ready => gst::State::Ready,
        PipelineState::Paused => gst::State::Paused,
        PipelineState::Playing => gst::State::Playing,
    }
}

fn from_gst_state(state: gst::State) -> Option<PipelineState> {
    match state {
        gst::State::Null => Some(PipelineState::Null),
        gst::State::Ready => Some(PipelineState::Ready),
        gst::State::Paused => Some(PipelineState::Paused),
        gst::State::Playing => Some(PipelineState::Playing),
        _ => None,
    }
}
