//! Playback engine
//!
//! Each session runs as an actor on its own thread. The thread owns a
//! [`SessionPlayer`] and is the only code that touches it; callers talk to
//! it through a cloneable [`SessionHandle`] that sends commands and waits
//! for the reply. Commands are processed one at a time in arrival order.
//!
//! While playing, the actor keeps exactly one pending tick timer. Pause,
//! stop and manual steps cancel it, and a speed change only affects the
//! next timer that gets scheduled.

use crossbeam_channel::{after, bounded, never, select, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use super::player::{SessionPlayer, TickOutcome};
use super::types::{PlaybackState, PlaybackUpdate, SessionRecord, StateSnapshot};
use crate::config::PlaybackConfig;
use crate::error::{Result, TraceError};
use crate::types::Event;

type Reply = Sender<Result<StateSnapshot>>;

/// Commands sent to a session actor
#[derive(Debug)]
enum PlaybackCommand {
    Play(Reply),
    Pause(Reply),
    Stop(Reply),
    StepForward(Reply),
    StepBackward(Reply),
    SeekTo(usize, Reply),
    SetSpeed(f64, Reply),
    GetState(Reply),
    Record(Sender<SessionRecord>),
    Shutdown,
}

/// Navigation maps attached to a session and exported with its record
#[derive(Debug, Clone, Default)]
pub struct SessionMaps {
    pub source_map: serde_json::Value,
    pub node_map: serde_json::Value,
}

/// Cloneable handle for driving one playback session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: Arc<str>,
    command_tx: Sender<PlaybackCommand>,
    updates_rx: Receiver<PlaybackUpdate>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Start or resume playback
    pub fn play(&self) -> Result<StateSnapshot> {
        self.request(PlaybackCommand::Play)
    }

    /// Pause playback, keeping the position
    pub fn pause(&self) -> Result<StateSnapshot> {
        self.request(PlaybackCommand::Pause)
    }

    /// Stop playback and rewind to the start
    pub fn stop(&self) -> Result<StateSnapshot> {
        self.request(PlaybackCommand::Stop)
    }

    pub fn step_forward(&self) -> Result<StateSnapshot> {
        self.request(PlaybackCommand::StepForward)
    }

    pub fn step_backward(&self) -> Result<StateSnapshot> {
        self.request(PlaybackCommand::StepBackward)
    }

    /// Move the cursor; negative targets are rejected, large ones clamp
    pub fn seek_to(&self, target: i64) -> Result<StateSnapshot> {
        let target = usize::try_from(target).map_err(|_| {
            TraceError::InvalidCommand(format!("seek target must not be negative, got {target}"))
        })?;
        self.request(|reply| PlaybackCommand::SeekTo(target, reply))
    }

    /// Change the playback speed multiplier
    pub fn set_speed(&self, speed: f64) -> Result<StateSnapshot> {
        self.request(|reply| PlaybackCommand::SetSpeed(speed, reply))
    }

    pub fn get_state(&self) -> Result<StateSnapshot> {
        self.request(PlaybackCommand::GetState)
    }

    /// Export the session's events and maps
    pub fn record(&self) -> Result<SessionRecord> {
        let (reply_tx, reply_rx) = bounded(1);
        self.command_tx
            .send(PlaybackCommand::Record(reply_tx))
            .map_err(|_| self.not_found())?;
        reply_rx.recv().map_err(|_| self.not_found())
    }

    /// Stream of playback notifications
    ///
    /// The stream is shared by every clone of the handle; each update is
    /// delivered to one receiver. Updates are dropped when the stream is full.
    pub fn updates(&self) -> Receiver<PlaybackUpdate> {
        self.updates_rx.clone()
    }

    fn request(&self, command: impl FnOnce(Reply) -> PlaybackCommand) -> Result<StateSnapshot> {
        let (reply_tx, reply_rx) = bounded(1);
        self.command_tx
            .send(command(reply_tx))
            .map_err(|_| self.not_found())?;
        reply_rx.recv().map_err(|_| self.not_found())?
    }

    fn not_found(&self) -> TraceError {
        TraceError::SessionNotFound(self.session_id.to_string())
    }
}

/// Owner of a session actor thread
#[derive(Debug)]
pub struct PlaybackEngine {
    handle: SessionHandle,
    join: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    /// Spawn a paused session over `events`
    pub fn spawn(
        session_id: impl Into<String>,
        events: Vec<Arc<Event>>,
        maps: SessionMaps,
        config: &PlaybackConfig,
    ) -> Result<Self> {
        let session_id: String = session_id.into();
        let mut player = SessionPlayer::new(session_id.clone(), events, config.base_interval());
        player.set_speed(config.default_speed)?;

        let (command_tx, command_rx) = bounded(64);
        let (updates_tx, updates_rx) = bounded(config.update_channel_capacity.max(1));

        tracing::info!(
            session = %session_id,
            events = player.len(),
            "Playback session started"
        );

        let actor = PlaybackActor {
            player,
            maps,
            created_at: chrono::Utc::now(),
            updates_tx,
            pending_timer: None,
        };

        let join = std::thread::Builder::new()
            .name(format!("chronotrace-playback-{session_id}"))
            .spawn(move || actor.run(command_rx))?;

        Ok(Self {
            handle: SessionHandle {
                session_id: session_id.into(),
                command_tx,
                updates_rx,
            },
            join: Some(join),
        })
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn session_id(&self) -> &str {
        self.handle.session_id()
    }

    /// Stop the actor; outstanding handles get `SessionNotFound` afterwards
    pub fn shutdown(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };
        let _ = self.handle.command_tx.send(PlaybackCommand::Shutdown);
        if join.join().is_err() {
            tracing::error!(session = %self.handle.session_id, "Playback thread panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.join.is_some()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State owned by a session thread
struct PlaybackActor {
    player: SessionPlayer,
    maps: SessionMaps,
    created_at: chrono::DateTime<chrono::Utc>,
    updates_tx: Sender<PlaybackUpdate>,
    /// Fires when the next tick is due; `None` while not playing
    pending_timer: Option<Receiver<Instant>>,
}

impl PlaybackActor {
    fn run(mut self, command_rx: Receiver<PlaybackCommand>) {
        loop {
            let timer = self.pending_timer.clone().unwrap_or_else(never);
            select! {
                recv(command_rx) -> cmd => match cmd {
                    Ok(PlaybackCommand::Shutdown) | Err(_) => break,
                    Ok(cmd) => self.handle_command(cmd),
                },
                recv(timer) -> _ => self.on_tick(),
            }
        }

        tracing::info!(session = %self.player.session_id(), "Playback session ended");
    }

    fn handle_command(&mut self, cmd: PlaybackCommand) {
        let previous = self.player.state();

        let (reply, result) = match cmd {
            PlaybackCommand::Play(reply) => {
                self.player.play();
                if self.pending_timer.is_none() {
                    self.schedule_tick();
                }
                (reply, Ok(()))
            }
            PlaybackCommand::Pause(reply) => {
                self.player.pause();
                (reply, Ok(()))
            }
            PlaybackCommand::Stop(reply) => {
                self.player.stop();
                (reply, Ok(()))
            }
            PlaybackCommand::StepForward(reply) => {
                self.player.step_forward();
                (reply, Ok(()))
            }
            PlaybackCommand::StepBackward(reply) => {
                self.player.step_backward();
                (reply, Ok(()))
            }
            PlaybackCommand::SeekTo(target, reply) => {
                self.player.seek_to(target);
                (reply, Ok(()))
            }
            PlaybackCommand::SetSpeed(speed, reply) => (reply, self.player.set_speed(speed)),
            PlaybackCommand::GetState(reply) => (reply, Ok(())),
            PlaybackCommand::Record(reply) => {
                let _ = reply.send(self.record());
                return;
            }
            PlaybackCommand::Shutdown => return,
        };

        if !self.player.is_playing() {
            self.pending_timer = None;
        }
        let current = self.player.state();
        if previous != current {
            tracing::debug!(
                session = %self.player.session_id(),
                from = previous.display_name(),
                to = current.display_name(),
                "Playback state changed"
            );
            self.notify(PlaybackUpdate::StateChanged(current));
        }

        let _ = reply.send(result.map(|()| self.player.snapshot()));
    }

    fn on_tick(&mut self) {
        self.pending_timer = None;
        match self.player.tick() {
            TickOutcome::Advanced { index, event } => {
                self.notify(PlaybackUpdate::Advanced { index, event });
                self.schedule_tick();
            }
            TickOutcome::Finished => {
                tracing::debug!(session = %self.player.session_id(), "Playback finished");
                self.notify(PlaybackUpdate::Finished);
                self.notify(PlaybackUpdate::StateChanged(PlaybackState::Paused));
            }
            TickOutcome::Idle => {}
        }
    }

    fn schedule_tick(&mut self) {
        if self.player.is_playing() {
            self.pending_timer = Some(after(self.player.tick_interval()));
        }
    }

    fn notify(&self, update: PlaybackUpdate) {
        let _ = self.updates_tx.try_send(update);
    }

    fn record(&self) -> SessionRecord {
        SessionRecord {
            id: self.player.session_id().to_string(),
            created_at: self.created_at,
            events: self
                .player
                .events()
                .iter()
                .map(|event| event.as_ref().clone())
                .collect(),
            source_map: self.maps.source_map.clone(),
            node_map: self.maps.node_map.clone(),
        }
    }
}
