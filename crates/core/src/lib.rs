//! Core library for the Preview Player application.
//!
//! Implements the track-preview playback subsystem: a single-flight
//! [`PlaybackController`] over an explicit audio processing graph
//! (source → analyser → output), and a cancellable bar-graph visualizer fed
//! from the live analyser. The surrounding application (track catalog,
//! emotion polling, webcam feed) is a consumer of the controller surface
//! exposed here: it supplies preview addresses and play/stop intents and
//! renders the playback state it reads back.

pub mod config;
pub mod controller;
pub mod error;
pub mod graph;
pub mod media;
pub mod spectrum;
pub mod task;
pub mod visualizer;

pub use config::{AppConfig, PlayerConfig, VisualizerConfig};
pub use controller::{PlaybackController, PlaybackSnapshot};
pub use error::{PlayerError, Result};
pub use graph::{
    AnalyserHandle, AnalyserNode, AudioGraph, ContextState, PlaybackSession, ProcessAudioContext,
    SessionState, SourceNode,
};
pub use media::{
    event_channel, MediaBackend, MediaEvent, MediaEventKind, MediaId, StartBehavior,
    SyntheticBackend,
};
pub use spectrum::SpectrumSampler;
pub use task::{CancellationToken, FrameTask};
pub use visualizer::{FrameOutcome, Mood, Rgb, Surface, Theme, VisualizerRenderer};
