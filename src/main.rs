// SPDX-License-Identifier: GPL-3.0-only

use clap::Parser;
use palindeck::config::{EngineConfig, SourceSpec};
use palindeck::Engine;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "palindeck")]
#[command(about = "Low-latency palindrome video looping engine")]
#[command(version)]
struct Cli {
    /// Video device to capture from (default: test source).
    #[arg(long, value_name = "PATH")]
    device: Option<String>,

    /// Capture width in pixels.
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Capture height in pixels.
    #[arg(long, default_value = "720")]
    height: u32,

    /// Capture framerate.
    #[arg(long, default_value = "30")]
    framerate: u32,

    /// Per-layer ring buffer capacity, in frames.
    #[arg(long, default_value = "60")]
    ring_capacity_frames: usize,

    /// Run against a synthetic test source instead of a real camera.
    #[arg(long)]
    demo: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control verbosity, e.g. RUST_LOG=palindeck=debug.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::default();
    config.source = SourceSpec {
        device: if cli.demo { None } else { cli.device },
        width: cli.width,
        height: cli.height,
        framerate: cli.framerate,
    };
    config.ring_capacity_frames = cli.ring_capacity_frames;
    config.validate().map_err(|e| format!("invalid configuration: {e}"))?;

    info!("starting engine");
    let engine = Arc::new(Engine::start(config)?);

    let quit_on_signal = engine.clone();
    ctrlc::set_handler(move || {
        info!("interrupt received, requesting shutdown");
        quit_on_signal.request_quit();
    })?;

    if cli.demo {
        let demo_engine = engine.clone();
        std::thread::spawn(move || run_demo_script(&demo_engine));
    }

    while !engine.quit_requested() {
        std::thread::sleep(Duration::from_millis(100));
    }

    info!("shutting down");
    engine.shutdown();
    let snapshot = engine.metrics();
    info!(
        frames_captured = snapshot.frames_captured,
        frames_dropped_overflow = snapshot.frames_dropped_overflow,
        "final metrics"
    );
    Ok(())
}

/// Drives a scripted sequence of key events against the engine, for local
/// exercising when no real window/keyboard layer is embedding it.
///
/// Exercises: a tap on layer 0, a longer hold on layer 3 (replaced by a
/// second, shorter hold on the same layer), and a five-way modifier
/// fan-out across physical key "1" (layers 0, 10, 20, 30, 40) held and
/// released together, matching the seed scenarios in the engine's design.
fn run_demo_script(engine: &Engine) {
    std::thread::sleep(Duration::from_millis(500));
    info!("demo: tap on layer 0");
    let _ = engine.on_key_down(0);
    std::thread::sleep(Duration::from_millis(50));
    let _ = engine.on_key_up(0);

    std::thread::sleep(Duration::from_millis(500));
    info!("demo: long hold on layer 3");
    let _ = engine.on_key_down(3);
    std::thread::sleep(Duration::from_secs(2));
    let _ = engine.on_key_up(3);

    std::thread::sleep(Duration::from_millis(500));
    info!("demo: replacement hold on layer 3");
    let _ = engine.on_key_down(3);
    std::thread::sleep(Duration::from_millis(500));
    let _ = engine.on_key_up(3);

    std::thread::sleep(Duration::from_millis(500));
    info!("demo: five-way modifier fan-out on key \"1\"");
    for offset in [0u8, 10, 20, 30, 40] {
        let _ = engine.on_key_down(offset);
    }
    std::thread::sleep(Duration::from_secs(1));
    for offset in [0u8, 10, 20, 30, 40] {
        let _ = engine.on_key_up(offset);
    }

    info!("demo script complete");
}
