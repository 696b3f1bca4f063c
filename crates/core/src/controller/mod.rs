//! Single-flight playback session manager.
//!
//! At most one session is current at any instant. Switching tracks tears
//! the previous session down fully before the next one is built, and any
//! completion that belongs to a superseded session is discarded by
//! identity, so an out-of-order start can never mutate public state.

use std::fmt;

use crossbeam_channel::Receiver;

use crate::config::PlayerConfig;
use crate::graph::{AnalyserHandle, AudioGraph, ContextState, PlaybackSession, SessionState};
use crate::media::{MediaBackend, MediaEvent, MediaEventKind};
use crate::{PlayerError, Result};

/// Read-only view of the controller state for UI collaborators.
#[derive(Debug, Clone)]
pub struct PlaybackSnapshot {
    pub currently_playing: Option<String>,
    pub is_playing: bool,
    pub analyser: Option<AnalyserHandle>,
}

/// Session manager exposed to the consumer surface.
///
/// All failures are absorbed: playback that cannot start simply produces no
/// sound, and the controller settles back to idle.
pub struct PlaybackController {
    graph: AudioGraph,
    events: Receiver<MediaEvent>,
    current: Option<PlaybackSession>,
    currently_playing: Option<String>,
    is_playing: bool,
    /// Most recent absorbed failure, kept for diagnostics only; nothing is
    /// surfaced to callers.
    last_error: Option<PlayerError>,
    logged_unsupported: bool,
}

impl PlaybackController {
    /// Builds a controller over `backend`. `events` must be the receiving
    /// end of the channel the backend emits on.
    pub fn new(
        config: PlayerConfig,
        backend: Box<dyn MediaBackend>,
        events: Receiver<MediaEvent>,
    ) -> Self {
        Self {
            graph: AudioGraph::new(config, backend),
            events,
            current: None,
            currently_playing: None,
            is_playing: false,
            last_error: None,
            logged_unsupported: false,
        }
    }

    /// Starts `address`, or stops if it is already the current track.
    ///
    /// The toggle compares against the current session's address whatever
    /// state its start is in, so a second `play` of the same address stops
    /// even while the first is still loading.
    pub fn play(&mut self, address: &str) {
        if self.graph.is_unsupported() {
            self.log_unsupported_once();
            return;
        }

        let is_current = self
            .current
            .as_ref()
            .map(|session| session.address() == address)
            .unwrap_or(false);
        if is_current {
            self.stop();
            return;
        }

        self.teardown_current();
        self.last_error = None;

        let mut session = match self.graph.build_session(address) {
            Ok(session) => session,
            Err(PlayerError::UnsupportedPlatform) => {
                self.log_unsupported_once();
                return;
            }
            Err(err) => {
                tracing::warn!(address, error = %err, "failed to build playback session");
                self.last_error = Some(err);
                return;
            }
        };

        if let Err(err) = self.graph.start_session(&mut session) {
            tracing::warn!(address, error = %err, "playback start could not be issued");
            session.set_state(SessionState::Error);
            self.graph.teardown_session(&mut session);
            self.last_error = Some(err);
            return;
        }

        self.current = Some(session);
    }

    /// Halts the current session and clears public state. Idempotent when
    /// already idle.
    pub fn stop(&mut self) {
        self.teardown_current();
    }

    /// Drains pending media events and applies them to the state machine.
    ///
    /// Events whose media identity no longer matches the current session
    /// are discarded: the stale-result guard that closes the switch race.
    pub fn pump_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.apply_event(event);
        }
    }

    /// Feeds a block of decoded PCM from the host into the current
    /// session's source node. Blocks arriving while idle are dropped.
    pub fn push_samples(&mut self, samples: &[f32]) -> Result<()> {
        match &self.current {
            Some(session) => session.push_samples(samples),
            None => Ok(()),
        }
    }

    pub fn currently_playing(&self) -> Option<&str> {
        self.currently_playing.as_deref()
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// Analyser of the current session, present once its start has
    /// succeeded (and through a passive pause) until it is torn down.
    pub fn analyser(&self) -> Option<AnalyserHandle> {
        if self.currently_playing.is_none() {
            return None;
        }
        self.current.as_ref().map(|session| session.analyser())
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            currently_playing: self.currently_playing.clone(),
            is_playing: self.is_playing,
            analyser: self.analyser(),
        }
    }

    /// State of the current session, `Idle` when none is current.
    pub fn session_state(&self) -> SessionState {
        self.current
            .as_ref()
            .map(|session| session.state())
            .unwrap_or_default()
    }

    pub fn context_state(&self) -> Option<ContextState> {
        self.graph.context().map(|context| context.state())
    }

    /// Most recent absorbed failure, cleared by the next `play` attempt.
    pub fn last_error(&self) -> Option<&PlayerError> {
        self.last_error.as_ref()
    }

    /// Tears down any current session and closes the shared context.
    /// Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        self.teardown_current();
        self.graph.close_context();
    }

    fn teardown_current(&mut self) {
        if let Some(mut session) = self.current.take() {
            self.graph.teardown_session(&mut session);
        }
        self.currently_playing = None;
        self.is_playing = false;
    }

    fn apply_event(&mut self, event: MediaEvent) {
        let is_current = self
            .current
            .as_ref()
            .map(|session| session.media() == event.media)
            .unwrap_or(false);
        if !is_current {
            tracing::debug!(media = ?event.media, "discarding event for a superseded session");
            return;
        }

        match event.kind {
            MediaEventKind::Started => {
                if let Some(session) = self.current.as_mut() {
                    // Only a loading session is waiting on a completion.
                    if session.state() == SessionState::Loading {
                        session.set_state(SessionState::Playing);
                        self.currently_playing = Some(session.address().to_string());
                        self.is_playing = true;
                    }
                }
            }
            MediaEventKind::StartRejected(reason) => {
                let err = PlayerError::StartRejected(reason);
                tracing::warn!(error = %err, "playback start rejected");
                if let Some(session) = self.current.as_mut() {
                    session.set_state(SessionState::Error);
                }
                self.teardown_current();
                self.last_error = Some(err);
            }
            MediaEventKind::Paused => {
                if let Some(session) = self.current.as_mut() {
                    if session.state() == SessionState::Playing {
                        session.set_state(SessionState::Paused);
                        self.is_playing = false;
                    }
                }
            }
            MediaEventKind::Resumed => {
                if let Some(session) = self.current.as_mut() {
                    if session.state() == SessionState::Paused {
                        session.set_state(SessionState::Playing);
                        self.is_playing = true;
                    }
                }
            }
            MediaEventKind::Ended => {
                self.stop();
            }
        }
    }

    fn log_unsupported_once(&mut self) {
        if !self.logged_unsupported {
            self.logged_unsupported = true;
            tracing::warn!("audio processing unavailable; preview playback disabled");
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackController")
            .field("currently_playing", &self.currently_playing)
            .field("is_playing", &self.is_playing)
            .field("session", &self.session_state())
            .finish()
    }
}
