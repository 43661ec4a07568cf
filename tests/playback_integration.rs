//! Integration tests for time-travel playback
//!
//! These tests validate sessions driven through the runtime:
//! - Seeking and stepping with state reconstruction
//! - Timed playback, speed changes and pausing
//! - Session lifecycle errors
//! - Saving and reloading session records

mod common;

use chronotrace_rs::session::state::RETURN_BINDING;
use chronotrace_rs::{
    EventSource, PlaybackState, PlaybackUpdate, ReconstructedState, SessionRecord, TraceError,
};
use common::builders::{call_trace, counter_events};
use common::runtime_helpers::{collect_until_finished, create_test_runtime};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_seek_step_round_trip() {
    let runtime = create_test_runtime();
    let session = runtime
        .start_session("c", EventSource::Events(counter_events(5)))
        .unwrap();

    let at_two = session.seek_to(2).unwrap();
    assert_eq!(at_two.current_index, 2);

    assert_eq!(session.step_forward().unwrap().current_index, 3);

    let back = session.step_backward().unwrap();
    assert_eq!(back.current_index, 2);
    assert_eq!(back.reconstructed_state, at_two.reconstructed_state);
}

#[test]
fn test_reconstructed_call_trace() {
    let runtime = create_test_runtime();
    let session = runtime
        .start_session("trace", EventSource::Events(call_trace()))
        .unwrap();

    let inside = session.seek_to(4).unwrap();
    assert_eq!(inside.reconstructed_state.call_stack, vec!["main", "work"]);
    assert_eq!(inside.reconstructed_state.binding("n"), Some(&json!(2)));
    assert_eq!(inside.reconstructed_state.binding("total"), Some(&json!(2)));

    let after_return = session.seek_to(5).unwrap();
    assert_eq!(after_return.reconstructed_state.call_stack, vec!["main"]);
    assert_eq!(
        after_return.reconstructed_state.binding(RETURN_BINDING),
        Some(&json!(2))
    );

    let end = session.seek_to(1_000).unwrap();
    assert_eq!(end.current_index, 6);
    assert!(end.reconstructed_state.call_stack.is_empty());
    assert!(end.current_event.is_none());
}

#[test]
fn test_sessions_read_from_store() {
    let runtime = create_test_runtime();
    let producer = runtime.register_producer("p");
    for event in call_trace() {
        producer.submit(event.with_correlation("req"));
    }
    runtime.flush_now().unwrap();

    let session = runtime
        .start_session("stored", EventSource::correlation("req"))
        .unwrap();
    let snapshot = session.get_state().unwrap();
    assert_eq!(snapshot.total_events, 6);
    assert_eq!(snapshot.state, PlaybackState::Paused);
    assert_eq!(snapshot.current_index, 0);

    // Later captures do not change an existing session
    producer.submit(chronotrace_rs::Event::function_exit(700).with_correlation("req"));
    runtime.flush_now().unwrap();
    assert_eq!(session.get_state().unwrap().total_events, 6);
}

#[test]
fn test_step_forward_stops_on_last_event() {
    let runtime = create_test_runtime();
    let session = runtime
        .start_session("edge", EventSource::Events(counter_events(3)))
        .unwrap();

    for _ in 0..10 {
        session.step_forward().unwrap();
    }
    let snapshot = session.get_state().unwrap();
    assert_eq!(snapshot.current_index, 2);
    assert!(snapshot.at_end());

    session.seek_to(0).unwrap();
    assert_eq!(session.step_backward().unwrap().current_index, 0);
}

#[test]
#[serial]
fn test_play_to_end_pauses() {
    let runtime = create_test_runtime();
    let session = runtime
        .start_session("play", EventSource::Events(counter_events(10)))
        .unwrap();
    let updates = session.updates();

    session.play().unwrap();
    let seen = collect_until_finished(&updates);
    assert_eq!(seen.first(), Some(&PlaybackUpdate::StateChanged(PlaybackState::Playing)));
    assert_eq!(seen.last(), Some(&PlaybackUpdate::Finished));

    let indexes: Vec<usize> = seen
        .iter()
        .filter_map(|u| match u {
            PlaybackUpdate::Advanced { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(indexes, (1..10).collect::<Vec<_>>());

    let snapshot = session.get_state().unwrap();
    assert_eq!(snapshot.state, PlaybackState::Paused);
    assert_eq!(snapshot.current_index, 9);
}

#[test]
#[serial]
fn test_speed_change_while_playing() {
    let mut config = common::runtime_helpers::fast_config();
    config.playback.base_interval_ms = 100;
    let runtime = chronotrace_rs::TraceRuntime::new(config).unwrap();
    let session = runtime
        .start_session("speed", EventSource::Events(counter_events(50)))
        .unwrap();

    let playing = session.play().unwrap();
    assert_eq!(playing.tick_interval, Duration::from_millis(100));

    let faster = session.set_speed(2.0).unwrap();
    assert!(faster.is_playing);
    assert_eq!(faster.tick_interval, Duration::from_millis(50));
    common::assert_float_eq(faster.playback_speed, 2.0, f64::EPSILON);

    session.pause().unwrap();
}

/// Wait for the next `Advanced` update and note when it arrived
fn next_advance(updates: &crossbeam_channel::Receiver<PlaybackUpdate>) -> Instant {
    loop {
        match updates.recv_timeout(common::test_timeout()) {
            Ok(PlaybackUpdate::Advanced { .. }) => return Instant::now(),
            Ok(_) => continue,
            Err(e) => panic!("no playback advance: {e}"),
        }
    }
}

#[test]
#[serial]
fn test_speed_change_reschedules_from_next_tick() {
    let mut config = common::runtime_helpers::fast_config();
    config.playback.base_interval_ms = 200;
    let runtime = chronotrace_rs::TraceRuntime::new(config).unwrap();
    let session = runtime
        .start_session("cadence", EventSource::Events(counter_events(50)))
        .unwrap();
    let updates = session.updates();

    session.play().unwrap();
    let first = next_advance(&updates);
    let second = next_advance(&updates);
    assert!(second - first >= Duration::from_millis(170));

    session.set_speed(2.0).unwrap();

    // The tick already scheduled keeps its original deadline
    let third = next_advance(&updates);
    assert!(third - second >= Duration::from_millis(170));

    let mut previous = third;
    let mut gaps = Vec::new();
    for _ in 0..3 {
        let now = next_advance(&updates);
        gaps.push(now - previous);
        previous = now;
    }
    session.pause().unwrap();

    assert!(gaps.iter().all(|gap| *gap >= Duration::from_millis(80)));
    let average = gaps.iter().sum::<Duration>() / gaps.len() as u32;
    assert!(average < Duration::from_millis(160), "average gap {average:?}");
}

#[test]
#[serial]
fn test_pause_and_resume() {
    let runtime = create_test_runtime();
    let session = runtime
        .start_session("resume", EventSource::Events(counter_events(200)))
        .unwrap();

    session.play().unwrap();
    thread::sleep(Duration::from_millis(20));
    let paused = session.pause().unwrap();
    assert_eq!(paused.state, PlaybackState::Paused);

    thread::sleep(Duration::from_millis(20));
    assert_eq!(session.get_state().unwrap().current_index, paused.current_index);

    session.play().unwrap();
    let deadline = Instant::now() + common::test_timeout();
    while session.get_state().unwrap().current_index == paused.current_index
        && Instant::now() < deadline
    {
        thread::sleep(Duration::from_millis(2));
    }
    assert!(session.get_state().unwrap().current_index > paused.current_index);
    session.stop().unwrap();
}

#[test]
fn test_stop_rewinds() {
    let runtime = create_test_runtime();
    let session = runtime
        .start_session("stop", EventSource::Events(counter_events(5)))
        .unwrap();
    session.seek_to(4).unwrap();

    let stopped = session.stop().unwrap();
    assert_eq!(stopped.state, PlaybackState::Stopped);
    assert_eq!(stopped.current_index, 0);
    assert_eq!(stopped.reconstructed_state, ReconstructedState::new());
}

#[test]
fn test_invalid_commands() {
    let runtime = create_test_runtime();
    let session = runtime
        .start_session("bad", EventSource::Events(counter_events(5)))
        .unwrap();
    session.seek_to(3).unwrap();

    assert!(matches!(session.seek_to(-5), Err(TraceError::InvalidCommand(_))));
    assert!(matches!(session.set_speed(-1.0), Err(TraceError::InvalidCommand(_))));
    assert_eq!(session.get_state().unwrap().current_index, 3);

    let duplicate = runtime.start_session("bad", EventSource::All);
    assert!(matches!(duplicate, Err(TraceError::InvalidCommand(_))));
}

#[test]
fn test_ended_session_not_found() {
    let runtime = create_test_runtime();
    let session = runtime
        .start_session("gone", EventSource::Events(counter_events(2)))
        .unwrap();

    runtime.end_session("gone").unwrap();
    assert!(matches!(session.play(), Err(TraceError::SessionNotFound(_))));
    assert!(matches!(runtime.session("gone"), Err(TraceError::SessionNotFound(_))));
    assert!(matches!(runtime.end_session("gone"), Err(TraceError::SessionNotFound(_))));
}

#[test]
fn test_empty_session() {
    let runtime = create_test_runtime();
    let session = runtime
        .start_session("empty", EventSource::range(10, 5))
        .unwrap();

    let snapshot = session.step_forward().unwrap();
    assert_eq!(snapshot.total_events, 0);
    assert_eq!(snapshot.current_index, 0);
    assert!(snapshot.current_event.is_none());
}

#[test]
fn test_session_record_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.json");

    let runtime = create_test_runtime();
    let session = runtime
        .start_session("original", EventSource::Events(call_trace()))
        .unwrap();
    session.record().unwrap().save_to_file(&path).unwrap();

    let record = SessionRecord::load_from_file(&path).unwrap();
    assert_eq!(record.id, "original");
    assert_eq!(record.events, call_trace());

    let replayed = runtime
        .start_session("replayed", EventSource::Record(record))
        .unwrap();
    let original_end = session.seek_to(6).unwrap();
    let replayed_end = replayed.seek_to(6).unwrap();
    assert_eq!(original_end.reconstructed_state, replayed_end.reconstructed_state);
}

#[test]
fn test_handles_are_shareable_across_threads() {
    let runtime = create_test_runtime();
    let session = runtime
        .start_session("shared", EventSource::Events(counter_events(100)))
        .unwrap();

    thread::scope(|scope| {
        for _ in 0..4 {
            let handle = session.clone();
            scope.spawn(move || {
                for _ in 0..10 {
                    handle.step_forward().unwrap();
                }
            });
        }
    });

    let snapshot = session.get_state().unwrap();
    assert_eq!(snapshot.current_index, 40);
    let expected = ReconstructedState::replay(
        &counter_events(40).into_iter().map(Arc::new).collect::<Vec<_>>(),
    );
    assert_eq!(snapshot.reconstructed_state, expected);
}
