use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub player: PlayerConfig,
    pub visualizer: VisualizerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            player: PlayerConfig::default(),
            visualizer: VisualizerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads a configuration file serialized as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

/// Configuration for the playback and analysis subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    pub sample_rate: u32,
    /// FFT window of the analyser node. Must be a power of two; the
    /// spectrum has `fft_size / 2` frequency bins.
    pub fft_size: usize,
    /// Smoothing time constant applied to linear magnitudes between
    /// analysis frames, in `0.0..1.0`.
    pub smoothing: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            fft_size: 128,
            smoothing: 0.8,
        }
    }
}

impl PlayerConfig {
    /// Number of frequency bins every spectrum snapshot carries.
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }
}

/// Configuration specific to the visualizer surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizerConfig {
    /// Display refresh rate the frame task is driven at.
    pub target_fps: u32,
    /// Horizontal gap between bars, in device pixels.
    pub bar_gap: u32,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            bar_gap: 1,
        }
    }
}
