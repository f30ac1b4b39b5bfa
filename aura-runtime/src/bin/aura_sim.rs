//! `aura-sim` — run the full pipeline against a synthetic game session.
//!
//! ```text
//! aura-sim [CONFIG.toml] [SECONDS] [--level-music]
//! ```
//!
//! A scripted player walks toward a single enemy and back while synthetic
//! face and speech classifiers report. Every published update and playback
//! command is printed to stdout as one JSON object per line; logs go to
//! stderr.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use aura_core::config::AuraConfig;
use aura_core::modulation::TrackInfo;
use aura_core::types::{GameTelemetry, LabeledEmotion, SourceId};
use aura_runtime::chord_loop::{self, PlaybackMode};
use aura_runtime::game_state::{self, GameSnapshot};
use aura_runtime::scheduler;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time;
use tracing::info;
use tracing_subscriber::EnvFilter;

const FACE_SCRIPT: [&str; 4] = ["neutral", "surprise", "fear", "happy"];

struct Args {
    config: Option<PathBuf>,
    seconds: u64,
    mode: PlaybackMode,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        seconds: 20,
        mode: PlaybackMode::Chords,
    };
    for arg in std::env::args().skip(1) {
        if arg == "--level-music" {
            args.mode = PlaybackMode::LevelMusic;
        } else if let Ok(seconds) = arg.parse::<u64>() {
            args.seconds = seconds;
        } else {
            args.config = Some(PathBuf::from(arg));
        }
    }
    if args.seconds == 0 {
        anyhow::bail!("duration must be at least one second");
    }
    Ok(args)
}

fn init_tracing(config: &AuraConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Enemy distance at `t` seconds: approach from 600 to 100 and retreat,
/// over a 20 second cycle.
fn enemy_distance(t: f64) -> f64 {
    let phase = (t / 20.0).fract();
    let tri = if phase < 0.5 { phase * 2.0 } else { (1.0 - phase) * 2.0 };
    600.0 - 500.0 * tri
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => AuraConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AuraConfig::default(),
    };
    init_tracing(&config);
    info!(seconds = args.seconds, mode = ?args.mode, "Starting AURA simulation");

    let (handle, service) = scheduler::spawn(&config);
    handle
        .load_track(TrackInfo::new("demo_theme.wav", config.modulation.default_base_tempo))
        .await?;

    let (game_tx, game_rx) = game_state::channel(GameSnapshot::default());
    let (playback_tx, mut playback_rx) = mpsc::channel(64);
    let chords = chord_loop::spawn(&config, args.mode, game_rx, playback_tx, handle.shared_counters());

    let mut updates = handle.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Ok(update) => println!("{}", json!({"update": update, "game": update.game_instruction()})),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Printer lagged behind updates");
                    }
                    Err(_) => break,
                },
                command = playback_rx.recv() => match command {
                    Some(command) => println!("{}", json!({"playback": command})),
                    None => break,
                },
            }
        }
    });

    let frame = Duration::from_millis(100);
    let frames = args.seconds * 10;
    let mut health = 1000.0_f64;
    for i in 0..frames {
        let t = i as f64 / 10.0;
        let distance = enemy_distance(t);
        let threat = (1.0 - (distance - 100.0) / 500.0).clamp(0.0, 1.0);
        if distance <= config.proximity.combat_distance {
            health = (health - 8.0).max(50.0);
        }

        let snapshot = GameSnapshot::from_positions((0.0, 0.0), &[(distance, 0.0)], health, &config.proximity);
        game_tx.send_replace(snapshot);

        let telemetry = GameTelemetry {
            health,
            enemy_count: 1,
            score: t * 40.0,
            speed: 0.3 + 0.5 * threat,
            threat_proximity: threat,
            elapsed_time: t,
            shots_fired: (threat * 12.0) as u32,
        };
        handle.register_reading(SourceId::GameState, telemetry.into()).await?;

        if i % 10 == 0 {
            let label = FACE_SCRIPT[(i / 10) as usize % FACE_SCRIPT.len()];
            handle
                .register_reading(SourceId::Face, LabeledEmotion::new(label, 0.8).into())
                .await?;
        }
        if i % 15 == 0 {
            let label = if threat > 0.6 { "angry" } else { "neutral" };
            handle
                .register_json("speech", json!({"label": label, "confidence": 0.6}))
                .await?;
        }
        if i % 25 == 0 {
            let tally = handle.register_audience_vote("excitement").await?;
            info!(tally, "Audience vote");
        }

        time::sleep(frame).await;
    }

    chords.stop().await;
    handle.shutdown().await?;
    service.await.context("scheduler task panicked")?;
    drop(game_tx);
    printer.abort();

    let counters = handle.counters();
    info!(
        ticks = counters.ticks,
        chords = counters.chords_played,
        readings = counters.readings_recorded,
        "Simulation finished"
    );
    eprintln!("{}", counters.to_prometheus());
    Ok(())
}
