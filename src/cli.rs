// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Streaming a V4L2 capture device
//! - Streaming a generated test pattern
//! - Listing H.264 encoders

use firestreamer::constants::{app_info, caps, timing};
use firestreamer::{
    LogReporter, OverflowPolicy, StatusReport, StatusReporter, Streamer, StreamerConfig,
};
use gstreamer as gst;
use gstreamer_video as gst_video;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

/// Stream target settings; each flag overrides the settings file
#[derive(clap::Args, Debug, Default)]
pub struct TargetArgs {
    /// RTSP(S) server location, e.g. rtsps://host:8322/path
    #[arg(short, long)]
    pub url: Option<String>,

    #[arg(long)]
    pub username: Option<String>,

    #[arg(long)]
    pub password: Option<String>,

    #[arg(long)]
    pub width: Option<u32>,

    #[arg(long)]
    pub height: Option<u32>,

    /// Route frames through a grayscale conversion before encoding
    #[arg(short, long)]
    pub grayscale: bool,

    /// H.264 encoder element to use instead of the preference list
    #[arg(long)]
    pub encoder: Option<String>,

    /// Ingestion overflow policy: drop-oldest, drop-newest or block
    #[arg(long)]
    pub overflow: Option<OverflowPolicy>,
}

/// Merge the settings file and command-line flags into a configuration
pub fn resolve_config(
    path: Option<&Path>,
    target: TargetArgs,
) -> Result<StreamerConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(path) => StreamerConfig::load(path)?,
        None => match StreamerConfig::default_path().filter(|p| p.exists()) {
            Some(default) => {
                debug!(path = %default.display(), "Using default settings file");
                StreamerConfig::load(&default)?
            }
            None => StreamerConfig::default(),
        },
    };

    if let Some(url) = target.url {
        config.url = url;
    }
    if target.username.is_some() {
        config.credentials.username = target.username;
    }
    if target.password.is_some() {
        config.credentials.password = target.password;
    }
    if let Some(width) = target.width {
        config.width = width;
    }
    if let Some(height) = target.height {
        config.height = height;
    }
    if target.grayscale {
        config.grayscale = true;
    }
    if target.encoder.is_some() {
        config.encoder = target.encoder;
    }
    if let Some(overflow) = target.overflow {
        config.ingest.overflow = overflow;
    }

    config.validate()?;
    Ok(config)
}

/// Stop conditions shared by the streaming commands
struct RunControl {
    interrupted: Arc<AtomicBool>,
    status: Arc<Mutex<Option<StatusReport>>>,
}

impl RunControl {
    fn install() -> Result<Self, Box<dyn std::error::Error>> {
        let interrupted = Arc::new(AtomicBool::new(false));
        let interrupted_clone = interrupted.clone();
        ctrlc::set_handler(move || {
            interrupted_clone.store(true, Ordering::SeqCst);
        })?;

        Ok(Self {
            interrupted,
            status: Arc::new(Mutex::new(None)),
        })
    }

    /// Reporter that logs the outcome and stops the run
    fn reporter(&self) -> Arc<dyn StatusReporter> {
        let status = self.status.clone();
        Arc::new(move |report: &StatusReport| {
            LogReporter.report_status(report);
            *status.lock().unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
        })
    }

    fn should_stop(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst) || self.failure().is_some()
    }

    fn failure(&self) -> Option<StatusReport> {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Tear the streamer down and turn a reported status into an error
    fn finish(&self, mut streamer: Streamer, pushed: u64) -> Result<(), Box<dyn std::error::Error>> {
        let stats = streamer.stats();
        streamer.teardown();

        println!(
            "Pushed {} frames ({} bytes, {} rejected)",
            pushed, stats.bytes, stats.rejected
        );

        match self.failure() {
            Some(report) => Err(format!(
                "Stream failed: {} (from {}: {})",
                report.outcome, report.stage, report.message
            )
            .into()),
            None => Ok(()),
        }
    }
}

/// Capture YUYV frames from a V4L2 device and stream them
pub fn stream_device(
    config: StreamerConfig,
    device_path: &str,
    max_frames: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(version = app_info::version(), device_path, "Starting capture stream");

    let mut dev = Device::with_path(device_path)
        .map_err(|e| format!("Failed to open V4L2 device {}: {}", device_path, e))?;

    let yuyv = v4l::FourCC::new(b"YUYV");
    let mut format = dev
        .format()
        .map_err(|e| format!("Failed to query format: {}", e))?;
    format.width = config.width;
    format.height = config.height;
    format.fourcc = yuyv;

    let actual = dev
        .set_format(&format)
        .map_err(|e| format!("Failed to set format: {}", e))?;
    if actual.fourcc != yuyv || actual.width != config.width || actual.height != config.height {
        return Err(format!(
            "Device offers {}x{} {}, expected {}x{} YUYV",
            actual.width, actual.height, actual.fourcc, config.width, config.height
        )
        .into());
    }
    info!(width = actual.width, height = actual.height, "Set V4L2 format");

    let control = RunControl::install()?;
    let streamer = Streamer::initialize(config, control.reporter())?;

    let mut stream = MmapStream::with_buffers(&mut dev, Type::VideoCapture, 2)
        .map_err(|e| format!("Failed to create buffer stream: {}", e))?;

    let mut pushed = 0u64;
    while !control.should_stop() && max_frames.is_none_or(|max| pushed < max) {
        match stream.next() {
            Ok((buf, meta)) => {
                let used = (meta.bytesused as usize).min(buf.len());
                let accepted = streamer.push_frame(&buf[..used]);
                pushed += 1;

                if pushed % timing::CAPTURE_LOG_INTERVAL == 0 {
                    info!(
                        frame = pushed,
                        sequence = meta.sequence,
                        size = used,
                        accepted,
                        "Captured frame"
                    );
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to dequeue frame");
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }

    drop(stream);
    control.finish(streamer, pushed)
}

/// Stream moving colour bars at the ingestion frame rate
pub fn stream_test_pattern(
    config: StreamerConfig,
    max_frames: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(version = app_info::version(), "Starting test pattern stream");

    gst::init()?;
    let video_info = gst_video::VideoInfo::builder(
        gst_video::VideoFormat::Yuy2,
        config.width,
        config.height,
    )
    .fps(gst::Fraction::new(caps::FRAMERATE.0, caps::FRAMERATE.1))
    .build()
    .map_err(|e| format!("Invalid frame layout: {}", e))?;

    let width = config.width as usize;
    let height = config.height as usize;
    let stride = video_info.stride()[0] as usize;
    let mut frame = vec![0u8; video_info.size()];
    let (numer, denom) = caps::FRAMERATE;
    let frame_duration = Duration::from_secs(denom as u64) / numer as u32;

    let control = RunControl::install()?;
    let streamer = Streamer::initialize(config, control.reporter())?;

    let start = Instant::now();
    let mut pushed = 0u64;
    while !control.should_stop() && max_frames.is_none_or(|max| pushed < max) {
        fill_color_bars(&mut frame, width, height, stride, pushed);
        streamer.push_frame(&frame);
        pushed += 1;

        if pushed % timing::FRAME_LOG_INTERVAL == 0 {
            info!(frame = pushed, "Pushed test frames");
        }

        let deadline = start + frame_duration * pushed as u32;
        if let Some(wait) = deadline.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }
    }

    control.finish(streamer, pushed)
}

/// List installed H.264 encoders in preference order
pub fn list_encoders() -> Result<(), Box<dyn std::error::Error>> {
    gst::init()?;

    let encoders = firestreamer::encoders::available_h264_encoders();
    if encoders.is_empty() {
        println!("No H.264 encoders found.");
        return Ok(());
    }

    println!("Available H.264 encoders (preferred first):");
    for encoder in encoders {
        println!("  {}", encoder);
    }
    Ok(())
}

/// 75% colour bars as (Y, U, V)
const BARS: [(u8, u8, u8); 8] = [
    (180, 128, 128),
    (162, 44, 142),
    (131, 156, 44),
    (112, 72, 58),
    (84, 184, 198),
    (65, 100, 212),
    (35, 212, 114),
    (16, 128, 128),
];

/// Fill a YUY2 frame with bars shifted by `frame_index`
fn fill_color_bars(frame: &mut [u8], width: usize, height: usize, stride: usize, frame_index: u64) {
    let shift = (frame_index as usize * 4) % width;
    for row in 0..height {
        let line = &mut frame[row * stride..row * stride + width * 2];
        for (pair, macro_pixel) in line.chunks_exact_mut(4).enumerate() {
            let x = (pair * 2 + shift) % width;
            let (y, u, v) = BARS[x * BARS.len() / width];
            macro_pixel.copy_from_slice(&[y, u, y, v]);
        }
    }
}
