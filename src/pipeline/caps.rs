// SPDX-License-Identifier: GPL-3.0-only

//! Capability negotiation
//!
//! Derives the format constraint attached to each filter stage. The
//! constraints are plain data here; the backend turns them into engine
//! caps and applies them before any stage is linked, since the encoder
//! negotiates its input format from the adjacent filter.

use super::topology::StageRole;
use crate::config::StreamerConfig;
use crate::constants::caps;
use std::fmt;

/// A typed capability field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapsValue {
    Str(String),
    Int(i32),
    Fraction(i32, i32),
}

impl fmt::Display for CapsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapsValue::Str(s) => write!(f, "(string){}", s),
            CapsValue::Int(i) => write!(f, "(int){}", i),
            CapsValue::Fraction(n, d) => write!(f, "(fraction){}/{}", n, d),
        }
    }
}

/// Media type plus ordered fields, e.g. `video/x-raw, format=(string)YUY2`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapsSpec {
    media_type: &'static str,
    fields: Vec<(&'static str, CapsValue)>,
}

impl CapsSpec {
    pub fn new(media_type: &'static str) -> Self {
        Self {
            media_type,
            fields: Vec::new(),
        }
    }

    pub fn with_str(mut self, name: &'static str, value: &str) -> Self {
        self.fields.push((name, CapsValue::Str(value.to_string())));
        self
    }

    pub fn with_int(mut self, name: &'static str, value: i32) -> Self {
        self.fields.push((name, CapsValue::Int(value)));
        self
    }

    pub fn with_fraction(mut self, name: &'static str, numer: i32, denom: i32) -> Self {
        self.fields.push((name, CapsValue::Fraction(numer, denom)));
        self
    }

    pub fn media_type(&self) -> &'static str {
        self.media_type
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &CapsValue)> {
        self.fields.iter().map(|(name, value)| (*name, value))
    }

    pub fn field(&self, name: &str) -> Option<&CapsValue> {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, value)| value)
    }

    /// Pixel format, when the constraint names one
    pub fn format(&self) -> Option<&str> {
        match self.field("format") {
            Some(CapsValue::Str(format)) => Some(format),
            _ => None,
        }
    }
}

impl fmt::Display for CapsSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.media_type)?;
        for (name, value) in &self.fields {
            write!(f, ", {}={}", name, value)?;
        }
        Ok(())
    }
}

/// Raw layout accepted at the ingestion boundary
pub fn raw_ingestion_caps(config: &StreamerConfig) -> CapsSpec {
    CapsSpec::new(caps::RAW_MEDIA_TYPE)
        .with_int("width", config.width as i32)
        .with_int("height", config.height as i32)
        .with_fraction("framerate", caps::FRAMERATE.0, caps::FRAMERATE.1)
        .with_str("format", caps::RAW_FORMAT)
        .with_str("interlace-mode", caps::INTERLACE_MODE)
        .with_str("colorimetry", caps::COLORIMETRY)
}

/// Encoded output: H.264 high profile, level 4
pub fn encoder_output_caps() -> CapsSpec {
    CapsSpec::new(caps::H264_MEDIA_TYPE)
        .with_str("profile", caps::H264_PROFILE)
        .with_str("level", caps::H264_LEVEL)
}

/// Output of the colour to grayscale converter
pub fn grayscale_caps() -> CapsSpec {
    CapsSpec::new(caps::RAW_MEDIA_TYPE).with_str("format", caps::GRAY_FORMAT)
}

/// Output of the grayscale to colour converter; same layout as ingestion
pub fn round_trip_caps() -> CapsSpec {
    CapsSpec::new(caps::RAW_MEDIA_TYPE).with_str("format", caps::RAW_FORMAT)
}

/// Capability attached to a stage, if it carries one
pub fn capability_for(role: StageRole, config: &StreamerConfig) -> Option<CapsSpec> {
    match role {
        StageRole::SourceFilter => Some(raw_ingestion_caps(config)),
        StageRole::GrayscaleFilter => Some(grayscale_caps()),
        StageRole::ColorFilter => Some(round_trip_caps()),
        StageRole::EncoderFilter => Some(encoder_output_caps()),
        _ => None,
    }
}
