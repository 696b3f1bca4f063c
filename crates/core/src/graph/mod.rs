//! Audio processing graph.
//!
//! Owns the process-wide audio context and builds the per-session
//! source → analyser → output chain. Node lifecycles are explicit: a session
//! is torn down deterministically when it is replaced, and the context is
//! closed exactly once at shutdown.

pub mod analyser;

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::config::PlayerConfig;
use crate::media::{MediaBackend, MediaId};
use crate::task::CancellationToken;
use crate::{PlayerError, Result};

pub use analyser::{AnalyserHandle, AnalyserNode};

/// Lifecycle state of the process-wide audio context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Created but not yet producing output; a play intent resumes it.
    Suspended,
    Running,
    Closed,
}

/// The one globally shared, mutable audio resource.
///
/// Owned exclusively by [`AudioGraph`]; sessions and renderers never touch
/// it directly, so all mutation happens on the controller's scheduling
/// domain.
#[derive(Debug)]
pub struct ProcessAudioContext {
    state: ContextState,
    sample_rate: u32,
    output_links: usize,
}

impl ProcessAudioContext {
    fn new(sample_rate: u32) -> Self {
        Self {
            state: ContextState::Suspended,
            sample_rate,
            output_links: 0,
        }
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of node chains currently linked to the output. Never exceeds
    /// one.
    pub fn output_links(&self) -> usize {
        self.output_links
    }

    pub fn resume(&mut self) {
        if self.state == ContextState::Suspended {
            self.state = ContextState::Running;
        }
    }

    /// Idempotent. Severs any remaining output link.
    pub fn close(&mut self) {
        self.state = ContextState::Closed;
        self.output_links = 0;
    }

    fn link_output(&mut self) -> Result<()> {
        if self.state == ContextState::Closed {
            return Err(PlayerError::msg("cannot link output on a closed context"));
        }
        if self.output_links != 0 {
            return Err(PlayerError::msg(
                "another session is already linked to the output",
            ));
        }
        self.output_links = 1;
        Ok(())
    }

    fn unlink_output(&mut self) {
        self.output_links = self.output_links.saturating_sub(1);
    }
}

/// Lifecycle state of one playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    /// Waiting on the asynchronous start to settle.
    Loading,
    Playing,
    Paused,
    /// Transient; a failed session moves here before settling back to Idle.
    Error,
}

/// Source node bound 1:1 to a media handle at construction.
///
/// Forwards pushed PCM blocks into the connected analyser. A media handle
/// that has been bound once can never be bound again; replaying the same
/// address allocates a fresh handle and a fresh source.
#[derive(Debug)]
pub struct SourceNode {
    media: MediaId,
    analyser: Option<AnalyserHandle>,
}

impl SourceNode {
    fn bind(media: MediaId) -> Self {
        Self {
            media,
            analyser: None,
        }
    }

    pub fn media(&self) -> MediaId {
        self.media
    }

    fn connect(&mut self, analyser: AnalyserHandle) {
        self.analyser = Some(analyser);
    }

    fn disconnect(&mut self) {
        self.analyser = None;
    }

    /// Forwards a block of decoded PCM into the connected analyser. Blocks
    /// arriving on a disconnected source are dropped.
    pub fn push_samples(&self, samples: &[f32]) -> Result<()> {
        match &self.analyser {
            Some(analyser) => analyser.ingest(samples),
            None => Ok(()),
        }
    }
}

/// One track's media handle plus its bound nodes and lifecycle state.
///
/// Replaced wholesale on every track switch; a session is never mutated into
/// playing a different address.
#[derive(Debug)]
pub struct PlaybackSession {
    address: String,
    media: MediaId,
    source: SourceNode,
    analyser: AnalyserHandle,
    state: SessionState,
    live: CancellationToken,
}

impl PlaybackSession {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn media(&self) -> MediaId {
        self.media
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// Handle onto this session's analyser, valid until teardown.
    pub fn analyser(&self) -> AnalyserHandle {
        self.analyser.clone()
    }

    pub fn push_samples(&self, samples: &[f32]) -> Result<()> {
        self.source.push_samples(samples)
    }

    fn is_torn_down(&self) -> bool {
        self.live.is_cancelled()
    }
}

/// Builds and tears down per-session node chains over the shared context.
pub struct AudioGraph {
    config: PlayerConfig,
    backend: Box<dyn MediaBackend>,
    context: Option<ProcessAudioContext>,
    analyser: Option<Arc<Mutex<AnalyserNode>>>,
    /// Every media handle ever bound to a source node. Ids are never
    /// reused, so membership means the handle must not be bound again.
    bound: HashSet<MediaId>,
    unsupported: bool,
}

impl AudioGraph {
    pub fn new(config: PlayerConfig, backend: Box<dyn MediaBackend>) -> Self {
        Self {
            config,
            backend,
            context: None,
            analyser: None,
            bound: HashSet::new(),
            unsupported: false,
        }
    }

    /// Whether the host has been observed to lack audio capability. Once
    /// set this never clears.
    pub fn is_unsupported(&self) -> bool {
        self.unsupported
    }

    pub fn context(&self) -> Option<&ProcessAudioContext> {
        self.context.as_ref()
    }

    /// Returns the shared context, creating it on first use (or re-creating
    /// it after a close, as a fresh suspended context).
    pub fn ensure_context(&mut self) -> Result<&mut ProcessAudioContext> {
        if self.unsupported {
            return Err(PlayerError::UnsupportedPlatform);
        }
        if !self.backend.is_supported() {
            self.unsupported = true;
            return Err(PlayerError::UnsupportedPlatform);
        }

        let missing = self
            .context
            .as_ref()
            .map(|context| context.state() == ContextState::Closed)
            .unwrap_or(true);
        if missing {
            self.context = Some(ProcessAudioContext::new(self.config.sample_rate));
        }

        Ok(self.context.as_mut().expect("context was just ensured"))
    }

    /// Allocates a fresh media handle + source node pair for `address`,
    /// wires source → analyser → output, and returns the session in the
    /// `Idle` state.
    ///
    /// The previous session must have been torn down first; only one chain
    /// may be linked to the output at a time.
    pub fn build_session(&mut self, address: &str) -> Result<PlaybackSession> {
        self.ensure_context()?;

        let media = self.backend.open(address)?;
        if !self.bound.insert(media) {
            self.backend.release(media);
            return Err(PlayerError::AlreadyBound);
        }

        let node = self.shared_analyser()?;
        let live = CancellationToken::new();
        let analyser = AnalyserHandle::new(node, live.clone());

        let mut source = SourceNode::bind(media);
        source.connect(analyser.clone());
        let linked = self
            .context
            .as_mut()
            .expect("context was just ensured")
            .link_output();
        if let Err(err) = linked {
            self.backend.release(media);
            return Err(err);
        }

        Ok(PlaybackSession {
            address: address.to_string(),
            media,
            source,
            analyser,
            state: SessionState::Idle,
            live,
        })
    }

    /// Requests the context be resumed if suspended and issues the
    /// asynchronous start. Completion arrives later as a media event.
    pub fn start_session(&mut self, session: &mut PlaybackSession) -> Result<()> {
        if let Some(context) = self.context.as_mut() {
            context.resume();
        }
        session.set_state(SessionState::Loading);
        self.backend.start(session.media)
    }

    /// Disconnects the session's nodes and halts/releases its media handle.
    ///
    /// Idempotent; must run before a new session is built so two chains are
    /// never connected to the output simultaneously.
    pub fn teardown_session(&mut self, session: &mut PlaybackSession) {
        if session.is_torn_down() {
            return;
        }
        session.live.cancel();
        session.source.disconnect();
        if let Some(context) = self.context.as_mut() {
            context.unlink_output();
        }
        self.backend.halt(session.media);
        self.backend.release(session.media);
        session.set_state(SessionState::Idle);
    }

    /// Idempotent; no-op if the context was never created.
    pub fn close_context(&mut self) {
        if let Some(context) = self.context.as_mut() {
            context.close();
        }
    }

    /// Creates the analyser on first use, or resets and reuses the existing
    /// node for the next session.
    fn shared_analyser(&mut self) -> Result<Arc<Mutex<AnalyserNode>>> {
        if let Some(node) = &self.analyser {
            let mut guard = node
                .lock()
                .map_err(|_| PlayerError::msg("analyser node lock poisoned"))?;
            guard.reset();
            drop(guard);
            return Ok(node.clone());
        }

        let node = Arc::new(Mutex::new(AnalyserNode::new(
            self.config.fft_size,
            self.config.smoothing,
        )?));
        self.analyser = Some(node.clone());
        Ok(node)
    }
}

impl fmt::Debug for AudioGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioGraph")
            .field("context", &self.context)
            .field("bound", &self.bound.len())
            .field("unsupported", &self.unsupported)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{event_channel, SyntheticBackend};

    fn graph() -> (AudioGraph, SyntheticBackend) {
        let (tx, _rx) = event_channel();
        let backend = SyntheticBackend::new(tx);
        let graph = AudioGraph::new(PlayerConfig::default(), Box::new(backend.clone()));
        (graph, backend)
    }

    #[test]
    fn builds_and_tears_down_a_session() {
        let (mut graph, backend) = graph();

        let mut session = graph.build_session("preview://a").unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(graph.context().unwrap().output_links(), 1);

        graph.teardown_session(&mut session);
        assert_eq!(graph.context().unwrap().output_links(), 0);
        assert_eq!(backend.halted(), vec![session.media()]);
        assert_eq!(backend.released(), vec![session.media()]);
        assert!(!session.analyser().is_live());
    }

    #[test]
    fn teardown_is_idempotent() {
        let (mut graph, backend) = graph();

        let mut first = graph.build_session("preview://a").unwrap();
        graph.teardown_session(&mut first);

        let _second = graph.build_session("preview://b").unwrap();
        graph.teardown_session(&mut first);
        assert_eq!(graph.context().unwrap().output_links(), 1);
        assert_eq!(backend.released(), vec![first.media()]);
    }

    #[test]
    fn refuses_two_simultaneous_output_paths() {
        let (mut graph, _backend) = graph();

        let _first = graph.build_session("preview://a").unwrap();
        assert!(graph.build_session("preview://b").is_err());
    }

    #[test]
    fn refuses_to_rebind_a_media_handle() {
        // Misbehaving host that hands its first id out on every open.
        struct RecyclingBackend {
            inner: SyntheticBackend,
            first: Option<MediaId>,
        }

        impl MediaBackend for RecyclingBackend {
            fn is_supported(&self) -> bool {
                true
            }
            fn open(&mut self, address: &str) -> Result<MediaId> {
                let id = self.inner.open(address)?;
                Ok(*self.first.get_or_insert(id))
            }
            fn start(&mut self, _media: MediaId) -> Result<()> {
                Ok(())
            }
            fn halt(&mut self, _media: MediaId) {}
            fn release(&mut self, _media: MediaId) {}
        }

        let (tx, _rx) = event_channel();
        let backend = RecyclingBackend {
            inner: SyntheticBackend::new(tx),
            first: None,
        };
        let mut graph = AudioGraph::new(PlayerConfig::default(), Box::new(backend));

        let mut session = graph.build_session("preview://a").unwrap();
        graph.teardown_session(&mut session);

        // The recycled id is still in the binding ledger.
        assert!(matches!(
            graph.build_session("preview://a"),
            Err(PlayerError::AlreadyBound)
        ));
    }

    #[test]
    fn unsupported_host_is_permanent() {
        let (tx, _rx) = event_channel();
        let backend = SyntheticBackend::unsupported(tx);
        let mut graph = AudioGraph::new(PlayerConfig::default(), Box::new(backend));

        assert!(matches!(
            graph.ensure_context(),
            Err(PlayerError::UnsupportedPlatform)
        ));
        assert!(graph.is_unsupported());
        assert!(matches!(
            graph.build_session("preview://a"),
            Err(PlayerError::UnsupportedPlatform)
        ));
    }

    #[test]
    fn close_is_idempotent_and_ensure_recreates() {
        let (mut graph, _backend) = graph();

        graph.close_context();
        assert!(graph.context().is_none());

        graph.ensure_context().unwrap();
        graph.close_context();
        graph.close_context();
        assert_eq!(graph.context().unwrap().state(), ContextState::Closed);

        let context = graph.ensure_context().unwrap();
        assert_eq!(context.state(), ContextState::Suspended);
    }

    #[test]
    fn session_forwards_samples_to_its_analyser() {
        let (mut graph, _backend) = graph();
        let session = graph.build_session("preview://a").unwrap();

        let tone: Vec<f32> = (0..128)
            .map(|i| (2.0 * std::f32::consts::PI * 8.0 * i as f32 / 128.0).sin())
            .collect();
        session.push_samples(&tone).unwrap();

        let analyser = session.analyser();
        let mut bytes = vec![0u8; analyser.bin_count().unwrap()];
        analyser.byte_frequency_data(&mut bytes).unwrap();
        assert!(bytes.iter().any(|&b| b > 0));
    }
}
