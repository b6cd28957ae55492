// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// Name of the top-level GStreamer pipeline
pub const PIPELINE_NAME: &str = "firestreamer";

/// Element names given to each stage of the graph
///
/// These names show up as the source of bus messages, so error
/// classification keys off them.
pub mod stage_names {
    pub const INGESTION: &str = "videoSource";
    pub const SOURCE_FILTER: &str = "sourceFilter";
    pub const TO_GRAYSCALE: &str = "vcYuvToGs";
    pub const GRAYSCALE_FILTER: &str = "vcYuvToGsCaps";
    pub const TO_COLOR: &str = "vcGsToYuv";
    pub const COLOR_FILTER: &str = "vcGsToYuvCaps";
    pub const ENCODER: &str = "h264Encoder";
    pub const ENCODER_FILTER: &str = "encoderFilter";
    pub const QUEUE: &str = "videoqueue";
    pub const SINK: &str = "videosink";
}

/// GStreamer element factories used for the fixed stages
pub mod factories {
    pub const APPSRC: &str = "appsrc";
    pub const CAPSFILTER: &str = "capsfilter";
    pub const VIDEOCONVERT: &str = "videoconvert";
    pub const QUEUE: &str = "queue";
    pub const RTSP_CLIENT_SINK: &str = "rtspclientsink";

    /// H.264 encoders in order of preference (hardware first)
    pub const H264_ENCODERS: &[&str] = &["v4l2h264enc", "x264enc", "openh264enc"];
}

/// Capability constants exchanged between stages
pub mod caps {
    /// Raw video media type
    pub const RAW_MEDIA_TYPE: &str = "video/x-raw";

    /// Raw pixel layout handed in by the capture side
    pub const RAW_FORMAT: &str = "YUY2";

    pub const INTERLACE_MODE: &str = "progressive";

    pub const COLORIMETRY: &str = "bt601";

    /// Frame rate announced at the ingestion boundary
    pub const FRAMERATE: (i32, i32) = (30, 1);

    /// Single-channel 8-bit layout used by the grayscale round trip
    pub const GRAY_FORMAT: &str = "GRAY8";

    /// Encoded output media type
    pub const H264_MEDIA_TYPE: &str = "video/x-h264";

    pub const H264_PROFILE: &str = "high";

    pub const H264_LEVEL: &str = "4";

    /// Bytes per pixel of the raw format (YUY2 packs 2 pixels in 4 bytes)
    pub const RAW_BYTES_PER_PIXEL: usize = 2;
}

/// Network sink settings
pub mod sink {
    /// Allowed lower transports: TCP (0x04) and TLS (0x20)
    pub const PROTOCOLS: &str = "tcp+tls";

    /// Server certificate validation is disabled
    pub const TLS_VALIDATION_FLAGS: &str = "0";
}

/// Configuration limits
pub mod limits {
    /// Maximum length in bytes of the URL, username and password
    pub const MAX_PARAM_LEN: usize = 127;

    pub const MIN_WIDTH: u32 = 32;
    pub const MAX_WIDTH: u32 = 1920;
    pub const MIN_HEIGHT: u32 = 32;
    pub const MAX_HEIGHT: u32 = 1080;
}

/// Stream defaults
pub mod defaults {
    pub const WIDTH: u32 = 384;
    pub const HEIGHT: u32 = 288;

    /// Frames the ingestion stage may hold before the overflow policy applies
    pub const MAX_QUEUED_FRAMES: u32 = 8;
}

/// Timing constants
pub mod timing {
    use std::time::Duration;

    /// How long `initialize` waits for the graph to report PLAYING
    pub const READY_TIMEOUT: Duration = Duration::from_secs(5);

    /// How long the event loop blocks on the bus before rechecking its stop signal
    pub const BUS_POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// How long a blocking push waits for the ingestion queue to drain
    pub const INGEST_BLOCK_TIMEOUT: Duration = Duration::from_secs(1);

    /// Queue level poll period while a blocking push waits
    pub const INGEST_BLOCK_POLL: Duration = Duration::from_millis(5);

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 100;

    /// Capture loop logs every Nth dequeued frame
    pub const CAPTURE_LOG_INTERVAL: u64 = 25;
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names_are_unique() {
        let names = [
            stage_names::INGESTION,
            stage_names::SOURCE_FILTER,
            stage_names::TO_GRAYSCALE,
            stage_names::GRAYSCALE_FILTER,
            stage_names::TO_COLOR,
            stage_names::COLOR_FILTER,
            stage_names::ENCODER,
            stage_names::ENCODER_FILTER,
            stage_names::QUEUE,
            stage_names::SINK,
        ];
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(!names.contains(&PIPELINE_NAME));
    }

    #[test]
    fn test_hardware_encoder_preferred() {
        assert_eq!(factories::H264_ENCODERS[0], "v4l2h264enc");
    }
}
