//! Playable-media seam.
//!
//! The playback subsystem never decodes or outputs audio itself; it drives
//! opaque media handles supplied by a host backend. Start completion and
//! transport notifications come back asynchronously as [`MediaEvent`]s, each
//! tagged with the originating handle so the controller can discard
//! deliveries for a session that is no longer current.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::{Receiver, Sender};

use crate::{PlayerError, Result};

/// Process-unique identity of one playable media handle.
///
/// Identities are never reused, so an event carrying the id of a superseded
/// handle can always be detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaId(u64);

/// Transport notification emitted by a media backend.
#[derive(Debug, Clone)]
pub struct MediaEvent {
    pub media: MediaId,
    pub kind: MediaEventKind,
}

#[derive(Debug, Clone)]
pub enum MediaEventKind {
    /// The asynchronous start settled successfully.
    Started,
    /// The asynchronous start settled with a failure.
    StartRejected(String),
    /// External controls paused the media.
    Paused,
    /// External controls resumed the media.
    Resumed,
    /// The media reached its end position.
    Ended,
}

/// Creates the channel pair a backend emits [`MediaEvent`]s on. The receiver
/// goes to the controller, the sender to the backend.
pub fn event_channel() -> (Sender<MediaEvent>, Receiver<MediaEvent>) {
    crossbeam_channel::unbounded()
}

/// Host-supplied factory and transport for playable media handles.
pub trait MediaBackend {
    /// Whether the host exposes any audio processing capability.
    fn is_supported(&self) -> bool;

    /// Allocates a fresh handle for `address`. Handles are never recycled,
    /// even for a repeated address.
    fn open(&mut self, address: &str) -> Result<MediaId>;

    /// Begins an asynchronous start. Completion arrives later as a
    /// [`MediaEventKind::Started`] or [`MediaEventKind::StartRejected`]
    /// event; a synchronous error here means the start could not even be
    /// issued.
    fn start(&mut self, media: MediaId) -> Result<()>;

    /// Halts playback and rewinds the media to its start position.
    fn halt(&mut self, media: MediaId);

    /// Releases the handle. Calls with an already released id are ignored.
    fn release(&mut self, media: MediaId);
}

/// How a [`SyntheticBackend`] settles start requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartBehavior {
    /// Queue a successful completion as soon as `start` is called.
    Complete,
    /// Queue a rejection as soon as `start` is called.
    Reject,
    /// Do nothing until [`SyntheticBackend::complete_start`] is called.
    Deferred,
}

/// In-process media backend used by the demo binary and by tests.
///
/// Cloning yields another handle onto the same backend, which lets a caller
/// keep driving it (settling deferred starts, emitting transport events)
/// after the controller has taken ownership of its own clone.
#[derive(Clone)]
pub struct SyntheticBackend {
    inner: Arc<Mutex<SyntheticInner>>,
}

struct SyntheticInner {
    events: Sender<MediaEvent>,
    behavior: StartBehavior,
    supported: bool,
    next_id: u64,
    open: HashMap<MediaId, String>,
    halted: Vec<MediaId>,
    released: Vec<MediaId>,
}

impl SyntheticBackend {
    pub fn new(events: Sender<MediaEvent>) -> Self {
        Self::with_behavior(events, StartBehavior::Complete)
    }

    pub fn with_behavior(events: Sender<MediaEvent>, behavior: StartBehavior) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SyntheticInner {
                events,
                behavior,
                supported: true,
                next_id: 1,
                open: HashMap::new(),
                halted: Vec::new(),
                released: Vec::new(),
            })),
        }
    }

    /// A backend that reports no audio capability at all.
    pub fn unsupported(events: Sender<MediaEvent>) -> Self {
        let backend = Self::with_behavior(events, StartBehavior::Deferred);
        backend.lock().supported = false;
        backend
    }

    /// Settles a deferred start. Delivery still goes through the event
    /// channel, so the controller only observes it on its next pump.
    pub fn complete_start(&self, media: MediaId, result: std::result::Result<(), String>) {
        let kind = match result {
            Ok(()) => MediaEventKind::Started,
            Err(reason) => MediaEventKind::StartRejected(reason),
        };
        self.emit(media, kind);
    }

    /// Queues an arbitrary transport event for `media`.
    pub fn emit(&self, media: MediaId, kind: MediaEventKind) {
        let inner = self.lock();
        let _ = inner.events.send(MediaEvent { media, kind });
    }

    /// The most recently opened handle, if any.
    pub fn last_opened(&self) -> Option<MediaId> {
        let inner = self.lock();
        inner.next_id.checked_sub(1).filter(|id| *id > 0).map(MediaId)
    }

    /// Ids halted so far, in call order.
    pub fn halted(&self) -> Vec<MediaId> {
        self.lock().halted.clone()
    }

    /// Ids released so far, in call order.
    pub fn released(&self) -> Vec<MediaId> {
        self.lock().released.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SyntheticInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MediaBackend for SyntheticBackend {
    fn is_supported(&self) -> bool {
        self.lock().supported
    }

    fn open(&mut self, address: &str) -> Result<MediaId> {
        let mut inner = self.lock();
        if !inner.supported {
            return Err(PlayerError::UnsupportedPlatform);
        }
        let id = MediaId(inner.next_id);
        inner.next_id += 1;
        inner.open.insert(id, address.to_string());
        Ok(id)
    }

    fn start(&mut self, media: MediaId) -> Result<()> {
        let inner = self.lock();
        if !inner.open.contains_key(&media) {
            return Err(PlayerError::msg("start issued on a released media handle"));
        }
        match inner.behavior {
            StartBehavior::Complete => {
                let _ = inner.events.send(MediaEvent {
                    media,
                    kind: MediaEventKind::Started,
                });
            }
            StartBehavior::Reject => {
                let _ = inner.events.send(MediaEvent {
                    media,
                    kind: MediaEventKind::StartRejected("synthetic start rejected".to_string()),
                });
            }
            StartBehavior::Deferred => {}
        }
        Ok(())
    }

    fn halt(&mut self, media: MediaId) {
        let mut inner = self.lock();
        if inner.open.contains_key(&media) {
            inner.halted.push(media);
        }
    }

    fn release(&mut self, media: MediaId) {
        let mut inner = self.lock();
        if inner.open.remove(&media).is_some() {
            inner.released.push(media);
        }
    }
}

impl fmt::Debug for SyntheticBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntheticBackend").finish()
    }
}
