// SPDX-License-Identifier: GPL-3.0-only

//! H.264 encoder selection
//!
//! The encoder stage is created from the first factory in a preference
//! list that is installed. Hardware (`v4l2h264enc`) comes first; the
//! software encoders are fallbacks for hosts without a V4L2 M2M device.

use crate::constants::factories;
use gstreamer as gst;
use tracing::{debug, info};

/// Check if a GStreamer element factory is registered
pub fn is_element_available(factory: &str) -> bool {
    gst::init().ok();
    gst::ElementFactory::find(factory).is_some()
}

/// Factories the encoder stage may be created from, in order
///
/// A configured override replaces the preference list entirely, so a
/// missing override encoder fails construction instead of silently
/// falling back.
pub fn encoder_candidates(override_factory: Option<&str>) -> Vec<String> {
    match override_factory {
        Some(factory) if !factory.trim().is_empty() => vec![factory.trim().to_string()],
        _ => factories::H264_ENCODERS
            .iter()
            .map(|f| f.to_string())
            .collect(),
    }
}

/// Installed H.264 encoders, in preference order
pub fn available_h264_encoders() -> Vec<String> {
    let available: Vec<String> = factories::H264_ENCODERS
        .iter()
        .filter(|encoder| {
            let found = is_element_available(encoder);
            debug!(encoder, found, "Checked H.264 encoder");
            found
        })
        .map(|encoder| encoder.to_string())
        .collect();

    info!("Detected {} H.264 encoders", available.len());
    available
}
