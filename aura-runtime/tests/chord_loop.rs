//! Chord loop behaviour on a paused tokio clock.

use std::sync::Arc;
use std::time::Duration;

use aura_core::chord::{Channel, ChordEvent, GameStateLabel, MoodFamily};
use aura_core::config::AuraConfig;
use aura_core::metrics::AuraCounters;
use aura_runtime::chord_loop::{self, ChordLoopHandle, PlaybackCommand, PlaybackMode};
use aura_runtime::game_state::{self, GameSnapshot};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};

struct Rig {
    game: watch::Sender<GameSnapshot>,
    playback: mpsc::Receiver<PlaybackCommand>,
    counters: Arc<AuraCounters>,
    handle: ChordLoopHandle,
}

fn rig(mode: PlaybackMode) -> Rig {
    let mut config = AuraConfig::default();
    config.chords.seed = Some(11);
    let counters = Arc::new(AuraCounters::new());
    let (game, game_rx) = game_state::channel(GameSnapshot::default());
    let (tx, playback) = mpsc::channel(32);
    let handle = chord_loop::spawn(&config, mode, game_rx, tx, Arc::clone(&counters));
    Rig {
        game,
        playback,
        counters,
        handle,
    }
}

async fn next_chord(rx: &mut mpsc::Receiver<PlaybackCommand>) -> ChordEvent {
    match rx.recv().await.expect("command") {
        PlaybackCommand::Chord(event) => event,
        other => panic!("expected a chord, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn first_chord_waits_for_initial_delay() {
    let mut rig = rig(PlaybackMode::Chords);
    let t0 = Instant::now();

    let event = next_chord(&mut rig.playback).await;
    assert!(t0.elapsed() >= Duration::from_millis(650));
    assert!(t0.elapsed() < Duration::from_millis(700));
    assert_eq!(event.channel, Channel::A);
    assert_eq!(event.family, MoodFamily::Calm);
    assert!(event.next_at > event.at);
    assert_eq!(rig.counters.snapshot().chords_played, 1);
}

#[tokio::test(start_paused = true)]
async fn chords_alternate_channels_within_jitter_window() {
    let mut rig = rig(PlaybackMode::Chords);
    let mut events = Vec::new();
    for _ in 0..6 {
        events.push(next_chord(&mut rig.playback).await);
    }

    let channels: Vec<Channel> = events.iter().map(|e| e.channel).collect();
    assert_eq!(
        channels,
        vec![Channel::A, Channel::B, Channel::A, Channel::B, Channel::A, Channel::B]
    );
    for pair in events.windows(2) {
        assert!(pair[1].at >= pair[0].next_at);
        // Exploration: base 500 ms, jitter within ±120 ms.
        let gap = pair[0].next_at - pair[0].at;
        assert!(gap >= Duration::from_millis(500 - 120), "{gap:?}");
        assert!(gap <= Duration::from_millis(500 + 120), "{gap:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn combat_switches_family() {
    let mut rig = rig(PlaybackMode::Chords);
    next_chord(&mut rig.playback).await;

    rig.game.send_replace(GameSnapshot {
        label: GameStateLabel::Combat,
        health: 200.0,
    });
    let event = next_chord(&mut rig.playback).await;
    assert_eq!(event.family, MoodFamily::Combat);
    assert!(event.family_switched);
    // Low-health combat: 300 ± 120 ms.
    let gap = event.next_at - event.at;
    assert!(gap >= Duration::from_millis(180), "{gap:?}");
    assert!(gap <= Duration::from_millis(420), "{gap:?}");

    let event = next_chord(&mut rig.playback).await;
    assert!(!event.family_switched);
    assert_eq!(rig.counters.snapshot().family_switches, 1);
}

#[tokio::test(start_paused = true)]
async fn stop_ends_the_loop() {
    let mut rig = rig(PlaybackMode::Chords);
    next_chord(&mut rig.playback).await;
    rig.handle.stop().await;
    // Any chord already queued is drained, then the channel closes.
    while rig.playback.recv().await.is_some() {}
    assert!(rig.counters.snapshot().chords_played >= 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_game_sender_ends_the_loop() {
    let mut rig = rig(PlaybackMode::Chords);
    drop(rig.game);
    time::timeout(Duration::from_secs(1), async {
        while rig.playback.recv().await.is_some() {}
    })
    .await
    .expect("loop exits");
    assert!(rig.handle.is_finished());
}

#[tokio::test(start_paused = true)]
async fn dropping_playback_receiver_ends_the_loop() {
    let rig = rig(PlaybackMode::Chords);
    drop(rig.playback);
    // The loop notices on its first send, after the initial delay.
    time::sleep(Duration::from_secs(1)).await;
    assert!(rig.handle.is_finished());
}

#[tokio::test(start_paused = true)]
async fn level_music_fades_between_loops() {
    let mut rig = rig(PlaybackMode::LevelMusic);

    let PlaybackCommand::LoopLevels(first) = rig.playback.recv().await.expect("levels") else {
        panic!("expected loop levels");
    };
    assert!(first.fading);
    let incoming = first.incoming.expect("incoming loop");
    assert_eq!(incoming.label, GameStateLabel::Exploration);
    assert!(first.outgoing.is_none());

    // Drain until the fade-in settles.
    loop {
        let PlaybackCommand::LoopLevels(levels) = rig.playback.recv().await.expect("levels") else {
            panic!("expected loop levels");
        };
        if !levels.fading {
            let incoming = levels.incoming.expect("incoming loop");
            assert!((incoming.volume - 0.8).abs() < 1e-9);
            break;
        }
    }

    // Settled: nothing more until the state changes.
    time::sleep(Duration::from_secs(2)).await;
    assert!(rig.playback.try_recv().is_err());

    rig.game.send_replace(GameSnapshot {
        label: GameStateLabel::Combat,
        health: 900.0,
    });
    let PlaybackCommand::LoopLevels(levels) = rig.playback.recv().await.expect("levels") else {
        panic!("expected loop levels");
    };
    assert_eq!(levels.incoming.expect("incoming").label, GameStateLabel::Combat);
    assert_eq!(
        levels.outgoing.expect("outgoing").label,
        GameStateLabel::Exploration
    );
    assert_eq!(rig.counters.snapshot().chords_played, 0);
}
