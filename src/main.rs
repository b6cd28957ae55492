// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "firestreamer")]
#[command(about = "Stream raw camera frames as H.264 to an RTSP(S) server")]
#[command(version)]
struct Cli {
    /// JSON settings file (default: ~/.config/firestreamer/config.json if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture from a V4L2 device and stream it
    Stream {
        /// V4L2 capture device
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,

        /// Stop after this many frames
        #[arg(short, long)]
        frames: Option<u64>,

        #[command(flatten)]
        target: cli::TargetArgs,
    },

    /// Stream a generated colour bar pattern
    TestPattern {
        /// Stop after this many frames
        #[arg(short, long)]
        frames: Option<u64>,

        #[command(flatten)]
        target: cli::TargetArgs,
    },

    /// List installed H.264 encoders
    Encoders,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level, e.g. RUST_LOG=firestreamer=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("firestreamer=info")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Stream {
            device,
            frames,
            target,
        } => {
            let config = cli::resolve_config(cli.config.as_deref(), target)?;
            cli::stream_device(config, &device, frames)
        }
        Commands::TestPattern { frames, target } => {
            let config = cli::resolve_config(cli.config.as_deref(), target)?;
            cli::stream_test_pattern(config, frames)
        }
        Commands::Encoders => cli::list_encoders(),
    }
}
