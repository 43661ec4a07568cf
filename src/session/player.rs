//! Session player: the synchronous playback state machine
//!
//! The player owns an immutable event sequence and a cursor. The cursor
//! `current_index` is the number of events folded into the reconstructed
//! state, so the event at `current_index` is the one about to execute.
//! Stepping and ticking stop with the cursor on the last event; only a
//! seek moves it past the end. Timing is driven from outside by the
//! playback engine, which calls [`SessionPlayer::tick`] once per interval.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, TraceError};
use crate::types::Event;

use super::state::ReconstructedState;
use super::types::{PlaybackState, StateSnapshot};

/// Result of a single playback tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// One event applied; the cursor now equals `index`
    Advanced { index: usize, event: Arc<Event> },
    /// The cursor sits on the last event; playback paused
    Finished,
    /// Not playing, nothing happened
    Idle,
}

/// Session player for stepping through a captured event sequence
#[derive(Debug)]
pub struct SessionPlayer {
    /// Session identifier reported in snapshots
    session_id: String,
    /// Events in playback order
    events: Vec<Arc<Event>>,
    /// Current playback state
    state: PlaybackState,
    /// Number of events applied
    current_index: usize,
    /// Fold of `events[..current_index]`
    reconstructed: ReconstructedState,
    /// Playback speed multiplier (1.0 = base interval, 2.0 = twice as fast)
    playback_speed: f64,
    /// Tick interval at speed 1.0
    base_interval: Duration,
}

impl SessionPlayer {
    /// Create a paused player at the start of `events`
    pub fn new(
        session_id: impl Into<String>,
        events: Vec<Arc<Event>>,
        base_interval: Duration,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            events,
            state: PlaybackState::Paused,
            current_index: 0,
            reconstructed: ReconstructedState::new(),
            playback_speed: 1.0,
            base_interval,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Get current state
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Check if playing
    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    /// Get current cursor position
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Arc<Event>] {
        &self.events
    }

    pub fn reconstructed_state(&self) -> &ReconstructedState {
        &self.reconstructed
    }

    /// Get playback speed
    pub fn playback_speed(&self) -> f64 {
        self.playback_speed
    }

    /// Interval between ticks at the current speed
    pub fn tick_interval(&self) -> Duration {
        self.base_interval.div_f64(self.playback_speed)
    }

    /// Set playback speed; must be positive and finite
    pub fn set_speed(&mut self, speed: f64) -> Result<()> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(TraceError::InvalidCommand(format!(
                "playback speed must be positive, got {speed}"
            )));
        }
        self.playback_speed = speed;
        Ok(())
    }

    /// Whether another step forward is possible
    fn can_advance(&self) -> bool {
        self.current_index + 1 < self.events.len()
    }

    /// Start or resume playback
    pub fn play(&mut self) {
        match self.state {
            PlaybackState::Stopped | PlaybackState::Paused => {
                self.state = PlaybackState::Playing;
            }
            PlaybackState::Playing => {}
        }
    }

    /// Pause playback
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    /// Stop playback and rewind to the beginning
    pub fn stop(&mut self) {
        self.current_index = 0;
        self.reconstructed = ReconstructedState::new();
        self.state = PlaybackState::Stopped;
    }

    /// Advance one event if playing
    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_playing() {
            return TickOutcome::Idle;
        }

        if !self.can_advance() {
            self.state = PlaybackState::Paused;
            return TickOutcome::Finished;
        }

        let event = self.advance();
        TickOutcome::Advanced {
            index: self.current_index,
            event,
        }
    }

    /// Step forward by one event; a manual step pauses playback
    pub fn step_forward(&mut self) -> Option<Arc<Event>> {
        self.pause();
        if self.can_advance() {
            Some(self.advance())
        } else {
            None
        }
    }

    /// Step backward by one event, rebuilding state from the start
    pub fn step_backward(&mut self) {
        self.pause();
        if self.current_index > 0 {
            self.rebuild(self.current_index - 1);
        }
    }

    /// Move the cursor to `target`, clamped to `[0, len]`
    pub fn seek_to(&mut self, target: usize) {
        self.rebuild(target.min(self.events.len()));
    }

    /// Take a snapshot of the current position
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            session_id: self.session_id.clone(),
            state: self.state,
            current_index: self.current_index,
            total_events: self.events.len(),
            is_playing: self.is_playing(),
            playback_speed: self.playback_speed,
            tick_interval: self.tick_interval(),
            reconstructed_state: self.reconstructed.clone(),
            current_event: self.events.get(self.current_index).cloned(),
        }
    }

    fn advance(&mut self) -> Arc<Event> {
        let event = self.events[self.current_index].clone();
        self.reconstructed.apply(&event);
        self.current_index += 1;
        event
    }

    fn rebuild(&mut self, index: usize) {
        self.reconstructed = ReconstructedState::replay(&self.events[..index]);
        self.current_index = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn create_test_events(count: usize) -> Vec<Arc<Event>> {
        (0..count)
            .map(|i| Arc::new(Event::state_change(i as i64 * 10, "x", json!(i))))
            .collect()
    }

    fn create_test_player(count: usize) -> SessionPlayer {
        SessionPlayer::new("test", create_test_events(count), Duration::from_millis(100))
    }

    #[test]
    fn test_player_lifecycle() {
        let mut player = create_test_player(5);
        assert_eq!(player.state(), PlaybackState::Paused);
        assert_eq!(player.current_index(), 0);

        player.play();
        assert_eq!(player.state(), PlaybackState::Playing);

        player.pause();
        assert_eq!(player.state(), PlaybackState::Paused);

        player.seek_to(3);
        player.stop();
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert_eq!(player.current_index(), 0);
        assert!(player.reconstructed_state().is_empty());

        player.play();
        assert_eq!(player.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_seek_and_step() {
        let events = create_test_events(5);
        let mut player = SessionPlayer::new("c", events.clone(), Duration::from_millis(100));

        player.seek_to(2);
        assert_eq!(player.current_index(), 2);
        assert_eq!(
            player.reconstructed_state(),
            &ReconstructedState::replay(&events[..2])
        );

        player.step_forward();
        assert_eq!(player.current_index(), 3);
        assert_eq!(
            player.reconstructed_state(),
            &ReconstructedState::replay(&events[..3])
        );

        player.step_backward();
        assert_eq!(player.current_index(), 2);
        assert_eq!(
            player.reconstructed_state(),
            &ReconstructedState::replay(&events[..2])
        );
    }

    #[test]
    fn test_step_boundaries() {
        let mut player = create_test_player(3);

        player.step_backward();
        assert_eq!(player.current_index(), 0);

        assert!(player.step_forward().is_some());
        assert!(player.step_forward().is_some());
        assert_eq!(player.current_index(), 2);

        // Cursor on the last event
        assert!(player.step_forward().is_none());
        assert_eq!(player.current_index(), 2);
    }

    #[test]
    fn test_seek_clamps() {
        let mut player = create_test_player(4);
        player.seek_to(100);
        assert_eq!(player.current_index(), 4);
        assert_eq!(player.reconstructed_state().binding("x"), Some(&json!(3)));
        assert!(player.snapshot().current_event.is_none());

        player.seek_to(0);
        assert!(player.reconstructed_state().is_empty());
    }

    #[test]
    fn test_seek_is_idempotent() {
        let mut player = create_test_player(6);
        player.seek_to(4);
        let first = player.snapshot();
        player.seek_to(4);
        assert_eq!(player.snapshot(), first);
    }

    #[test]
    fn test_step_forward_while_playing_pauses() {
        let mut player = create_test_player(4);
        player.play();
        player.step_forward();
        assert_eq!(player.state(), PlaybackState::Paused);
        assert_eq!(player.current_index(), 1);
    }

    #[test]
    fn test_tick_runs_to_last_event_then_pauses() {
        let mut player = create_test_player(3);
        assert_eq!(player.tick(), TickOutcome::Idle);

        player.play();
        assert!(matches!(player.tick(), TickOutcome::Advanced { index: 1, .. }));
        assert!(matches!(player.tick(), TickOutcome::Advanced { index: 2, .. }));
        assert_eq!(player.tick(), TickOutcome::Finished);
        assert_eq!(player.state(), PlaybackState::Paused);
        assert_eq!(player.current_index(), 2);
    }

    #[test]
    fn test_empty_session() {
        let mut player = create_test_player(0);
        assert!(player.step_forward().is_none());
        player.step_backward();
        player.seek_to(5);
        assert_eq!(player.current_index(), 0);

        player.play();
        assert_eq!(player.tick(), TickOutcome::Finished);
        assert_eq!(player.state(), PlaybackState::Paused);
    }

    #[test]
    fn test_playback_speed() {
        let mut player = create_test_player(5);
        assert_eq!(player.tick_interval(), Duration::from_millis(100));

        player.set_speed(2.0).unwrap();
        assert_eq!(player.playback_speed(), 2.0);
        assert_eq!(player.tick_interval(), Duration::from_millis(50));

        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = player.set_speed(bad).unwrap_err();
            assert!(matches!(err, TraceError::InvalidCommand(_)));
        }
        assert_eq!(player.playback_speed(), 2.0);
    }

    #[test]
    fn test_snapshot_reports_cursor_event() {
        let mut player = create_test_player(3);
        player.seek_to(1);
        let snapshot = player.snapshot();
        assert_eq!(snapshot.session_id, "test");
        assert_eq!(snapshot.total_events, 3);
        assert!(!snapshot.is_playing);
        let current = snapshot.current_event.unwrap();
        assert_eq!(current.timestamp().as_nanos(), 10);
    }

    proptest! {
        #[test]
        fn test_state_always_matches_prefix_fold(
            count in 0usize..20,
            moves in prop::collection::vec(0u8..3, 0..40),
            target in 0usize..25,
        ) {
            let events = create_test_events(count);
            let mut player = SessionPlayer::new("p", events.clone(), Duration::from_millis(10));
            player.seek_to(target);

            for m in moves {
                match m {
                    0 => { player.step_forward(); }
                    1 => player.step_backward(),
                    _ => player.seek_to(target / 2),
                }
                let index = player.current_index();
                prop_assert!(index <= count);
                prop_assert_eq!(
                    player.reconstructed_state(),
                    &ReconstructedState::replay(&events[..index])
                );
            }
        }
    }
}
