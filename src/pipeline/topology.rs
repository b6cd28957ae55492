// SPDX-License-Identifier: GPL-3.0-only

//! Stage roles and the two graph topologies
//!
//! ```text
//! colour:    videoSource → sourceFilter → h264Encoder → encoderFilter → videoqueue → videosink
//!
//! grayscale: videoSource → sourceFilter → vcYuvToGs → vcYuvToGsCaps → vcGsToYuv
//!            → vcGsToYuvCaps → h264Encoder → encoderFilter → videoqueue → videosink
//! ```
//!
//! A [`Topology`] is a pure description: which stages exist, in which
//! order, which factories may provide them and which properties and
//! capabilities they carry. The streamer turns it into a live graph.

use super::caps::{self, CapsSpec};
use super::ingest;
use crate::config::StreamerConfig;
use crate::constants::{factories, sink, stage_names};
use crate::encoders;

/// Broad kind of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Ingestion,
    Filter,
    Converter,
    Encoder,
    Queue,
    Sink,
}

/// A slot in the graph; each role is created at most once per graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageRole {
    /// Application source fed by the frame ingestion port
    Ingestion,
    /// Raw format/resolution/frame-rate constraint
    SourceFilter,
    /// Colour to grayscale converter
    ToGrayscale,
    /// Grayscale constraint
    GrayscaleFilter,
    /// Grayscale back to the raw layout
    ToColor,
    /// Raw layout constraint after the round trip
    ColorFilter,
    /// H.264 encoder
    Encoder,
    /// Encoder profile/level constraint
    EncoderFilter,
    Queue,
    /// RTSP client sink
    Sink,
}

impl StageRole {
    /// Colour topology in link order
    pub const COLOR: [StageRole; 6] = [
        StageRole::Ingestion,
        StageRole::SourceFilter,
        StageRole::Encoder,
        StageRole::EncoderFilter,
        StageRole::Queue,
        StageRole::Sink,
    ];

    /// Grayscale topology in link order
    pub const GRAYSCALE: [StageRole; 10] = [
        StageRole::Ingestion,
        StageRole::SourceFilter,
        StageRole::ToGrayscale,
        StageRole::GrayscaleFilter,
        StageRole::ToColor,
        StageRole::ColorFilter,
        StageRole::Encoder,
        StageRole::EncoderFilter,
        StageRole::Queue,
        StageRole::Sink,
    ];

    /// Release order used by teardown: network side first, ingestion last
    pub const TEARDOWN_ORDER: [StageRole; 10] = [
        StageRole::Sink,
        StageRole::Queue,
        StageRole::Encoder,
        StageRole::EncoderFilter,
        StageRole::ColorFilter,
        StageRole::ToColor,
        StageRole::GrayscaleFilter,
        StageRole::ToGrayscale,
        StageRole::SourceFilter,
        StageRole::Ingestion,
    ];

    /// Element name the stage is created with
    pub fn element_name(&self) -> &'static str {
        match self {
            StageRole::Ingestion => stage_names::INGESTION,
            StageRole::SourceFilter => stage_names::SOURCE_FILTER,
            StageRole::ToGrayscale => stage_names::TO_GRAYSCALE,
            StageRole::GrayscaleFilter => stage_names::GRAYSCALE_FILTER,
            StageRole::ToColor => stage_names::TO_COLOR,
            StageRole::ColorFilter => stage_names::COLOR_FILTER,
            StageRole::Encoder => stage_names::ENCODER,
            StageRole::EncoderFilter => stage_names::ENCODER_FILTER,
            StageRole::Queue => stage_names::QUEUE,
            StageRole::Sink => stage_names::SINK,
        }
    }

    /// Look a role up by the element name found on a bus message
    pub fn from_element_name(name: &str) -> Option<Self> {
        Self::TEARDOWN_ORDER
            .into_iter()
            .find(|role| role.element_name() == name)
    }

    pub fn kind(&self) -> StageKind {
        match self {
            StageRole::Ingestion => StageKind::Ingestion,
            StageRole::SourceFilter
            | StageRole::GrayscaleFilter
            | StageRole::ColorFilter
            | StageRole::EncoderFilter => StageKind::Filter,
            StageRole::ToGrayscale | StageRole::ToColor => StageKind::Converter,
            StageRole::Encoder => StageKind::Encoder,
            StageRole::Queue => StageKind::Queue,
            StageRole::Sink => StageKind::Sink,
        }
    }
}

impl std::fmt::Display for StageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.element_name())
    }
}

/// A property set on a stage before linking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageProperty {
    pub name: &'static str,
    /// Value in GStreamer's string serialization
    pub value: String,
    /// Never logged when set
    pub secret: bool,
}

impl StageProperty {
    pub fn new(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
            secret: false,
        }
    }

    pub fn secret(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
            secret: true,
        }
    }
}

/// Everything needed to allocate and configure one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub role: StageRole,
    /// Factory names tried in order; the first that exists wins
    pub factories: Vec<String>,
    pub properties: Vec<StageProperty>,
    /// Capability constraint for filter stages
    pub caps: Option<CapsSpec>,
}

impl StageSpec {
    fn new(role: StageRole, factories: Vec<String>) -> Self {
        Self {
            role,
            factories,
            properties: Vec::new(),
            caps: None,
        }
    }

    fn single(role: StageRole, factory: &str) -> Self {
        Self::new(role, vec![factory.to_string()])
    }
}

/// Ordered stage list chosen by the grayscale flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    stages: Vec<StageSpec>,
    grayscale: bool,
}

impl Topology {
    /// Build the stage list for a configuration, with capabilities attached
    pub fn for_config(config: &StreamerConfig) -> Self {
        let roles: &[StageRole] = if config.grayscale {
            &StageRole::GRAYSCALE
        } else {
            &StageRole::COLOR
        };

        let stages = roles
            .iter()
            .map(|&role| {
                let mut spec = match role.kind() {
                    StageKind::Ingestion => StageSpec::single(role, factories::APPSRC),
                    StageKind::Filter => StageSpec::single(role, factories::CAPSFILTER),
                    StageKind::Converter => StageSpec::single(role, factories::VIDEOCONVERT),
                    StageKind::Encoder => StageSpec::new(
                        role,
                        encoders::encoder_candidates(config.encoder.as_deref()),
                    ),
                    StageKind::Queue => StageSpec::single(role, factories::QUEUE),
                    StageKind::Sink => StageSpec::single(role, factories::RTSP_CLIENT_SINK),
                };
                spec.properties = match role.kind() {
                    StageKind::Ingestion => ingest::appsrc_properties(config),
                    StageKind::Sink => sink_properties(config),
                    _ => Vec::new(),
                };
                spec.caps = caps::capability_for(role, config);
                spec
            })
            .collect();

        Self {
            stages,
            grayscale: config.grayscale,
        }
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Roles in link order
    pub fn roles(&self) -> Vec<StageRole> {
        self.stages.iter().map(|s| s.role).collect()
    }

    pub fn get(&self, role: StageRole) -> Option<&StageSpec> {
        self.stages.iter().find(|s| s.role == role)
    }

    pub fn is_grayscale(&self) -> bool {
        self.grayscale
    }
}

/// Location, credentials and transport settings for the RTSP client sink
fn sink_properties(config: &StreamerConfig) -> Vec<StageProperty> {
    let mut properties = vec![StageProperty::new("location", config.url.clone())];
    if let Some(username) = &config.credentials.username {
        properties.push(StageProperty::new("user-id", username.clone()));
    }
    if let Some(password) = &config.credentials.password {
        properties.push(StageProperty::secret("user-pw", password.clone()));
    }
    properties.push(StageProperty::new("protocols", sink::PROTOCOLS));
    properties.push(StageProperty::new(
        "tls-validation-flags",
        sink::TLS_VALIDATION_FLAGS,
    ));
    properties
}
