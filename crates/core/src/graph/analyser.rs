use std::f32::consts::PI;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::task::CancellationToken;
use crate::{PlayerError, Result};

/// Decibel range mapped onto the `0..=255` byte magnitudes.
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Frequency analysis node of the session chain.
///
/// Keeps the most recent `fft_size` samples, runs a Hann-windowed forward
/// FFT over them, smooths the linear magnitudes with a time constant, and
/// holds the result as one byte per bin. No history is retained beyond the
/// smoothing state; every refresh overwrites the previous snapshot.
pub struct AnalyserNode {
    fft_size: usize,
    smoothing: f32,
    recent: Vec<f32>,
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    bytes: Vec<u8>,
}

impl AnalyserNode {
    /// Creates a node with the given FFT window, which must be a power of
    /// two of at least 32 samples.
    pub fn new(fft_size: usize, smoothing: f32) -> Result<Self> {
        if !fft_size.is_power_of_two() || fft_size < 32 {
            return Err(PlayerError::msg(
                "analyser fft size must be a power of two of at least 32",
            ));
        }

        let mut planner = RealFftPlanner::new();
        let plan = planner.plan_fft_forward(fft_size);
        let input = plan.make_input_vec();
        let spectrum = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        let window = (0..fft_size).map(|i| hann_value(i, fft_size)).collect();
        let bins = fft_size / 2;

        Ok(Self {
            fft_size,
            smoothing: smoothing.clamp(0.0, 1.0),
            recent: Vec::with_capacity(fft_size),
            plan,
            input,
            spectrum,
            scratch,
            window,
            smoothed: vec![0.0; bins],
            bytes: vec![0; bins],
        })
    }

    /// Number of frequency bins, fixed at `fft_size / 2`.
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Consumes a block of samples and refreshes the magnitudes once a full
    /// window has accumulated. Only the latest `fft_size` samples count.
    pub fn ingest(&mut self, samples: &[f32]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        self.recent.extend_from_slice(samples);
        if self.recent.len() > self.fft_size {
            let excess = self.recent.len() - self.fft_size;
            self.recent.drain(..excess);
        }

        if self.recent.len() == self.fft_size {
            self.recompute()?;
        }
        Ok(())
    }

    /// Copies the current magnitudes into `out`, one byte per bin.
    pub fn byte_frequency_data(&self, out: &mut [u8]) {
        let len = out.len().min(self.bytes.len());
        out[..len].copy_from_slice(&self.bytes[..len]);
    }

    /// Clears accumulated signal and smoothing state. Called when the node
    /// is rewired into a fresh session so nothing leaks across tracks.
    pub fn reset(&mut self) {
        self.recent.clear();
        self.smoothed.fill(0.0);
        self.bytes.fill(0);
    }

    fn recompute(&mut self) -> Result<()> {
        for (slot, (value, window)) in self
            .input
            .iter_mut()
            .zip(self.recent.iter().zip(self.window.iter()))
        {
            *slot = value * window;
        }

        self.plan
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
            .map_err(|_| PlayerError::msg("analyser fft failed"))?;

        let norm = 2.0 / self.fft_size as f32;
        let range = MAX_DECIBELS - MIN_DECIBELS;
        for bin in 0..self.bin_count() {
            let magnitude = self.spectrum[bin].norm() * norm;
            let smoothed = self.smoothing * self.smoothed[bin] + (1.0 - self.smoothing) * magnitude;
            self.smoothed[bin] = smoothed;

            let db = 20.0 * smoothed.max(1e-10).log10();
            let scaled = ((db - MIN_DECIBELS) / range * 255.0).clamp(0.0, 255.0);
            self.bytes[bin] = scaled as u8;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn force_bytes(&mut self, values: &[u8]) {
        let len = values.len().min(self.bytes.len());
        self.bytes[..len].copy_from_slice(&values[..len]);
    }
}

impl fmt::Debug for AnalyserNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyserNode")
            .field("fft_size", &self.fft_size)
            .field("smoothing", &self.smoothing)
            .field("buffered", &self.recent.len())
            .finish()
    }
}

/// Cloneable view over the analyser of one playback session.
///
/// The handle carries the session's liveness token, so a renderer mounted
/// against it stops drawing as soon as the session is torn down.
#[derive(Clone)]
pub struct AnalyserHandle {
    node: Arc<Mutex<AnalyserNode>>,
    live: CancellationToken,
}

impl AnalyserHandle {
    pub(crate) fn new(node: Arc<Mutex<AnalyserNode>>, live: CancellationToken) -> Self {
        Self { node, live }
    }

    /// Whether the owning session is still current.
    pub fn is_live(&self) -> bool {
        !self.live.is_cancelled()
    }

    pub fn bin_count(&self) -> Result<usize> {
        Ok(self.lock()?.bin_count())
    }

    /// Copies the current magnitudes into `out`, one byte per bin.
    pub fn byte_frequency_data(&self, out: &mut [u8]) -> Result<()> {
        self.lock()?.byte_frequency_data(out);
        Ok(())
    }

    pub(crate) fn ingest(&self, samples: &[f32]) -> Result<()> {
        self.lock()?.ingest(samples)
    }

    fn lock(&self) -> Result<MutexGuard<'_, AnalyserNode>> {
        self.node
            .lock()
            .map_err(|_| PlayerError::msg("analyser node lock poisoned"))
    }
}

impl fmt::Debug for AnalyserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyserHandle")
            .field("live", &self.is_live())
            .finish()
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(fft_size: usize, bin: usize) -> Vec<f32> {
        (0..fft_size)
            .map(|i| (2.0 * PI * bin as f32 * i as f32 / fft_size as f32).sin())
            .collect()
    }

    #[test]
    fn rejects_a_non_power_of_two_window() {
        assert!(AnalyserNode::new(100, 0.8).is_err());
        assert!(AnalyserNode::new(16, 0.8).is_err());
        assert!(AnalyserNode::new(128, 0.8).is_ok());
    }

    #[test]
    fn a_tone_peaks_in_its_own_bin() {
        let mut node = AnalyserNode::new(128, 0.8).unwrap();
        node.ingest(&tone(128, 8)).unwrap();

        let mut bytes = vec![0u8; node.bin_count()];
        node.byte_frequency_data(&mut bytes);
        assert_eq!(bytes.len(), 64);
        assert!(bytes[8] > 0);
        assert!(bytes[8] > bytes[40]);
    }

    #[test]
    fn silence_reads_as_zero_magnitudes() {
        let mut node = AnalyserNode::new(128, 0.8).unwrap();
        node.ingest(&vec![0.0; 256]).unwrap();

        let mut bytes = vec![0u8; node.bin_count()];
        node.byte_frequency_data(&mut bytes);
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn reset_clears_signal_and_smoothing_state() {
        let mut node = AnalyserNode::new(128, 0.8).unwrap();
        node.ingest(&tone(128, 8)).unwrap();
        node.reset();

        let mut bytes = vec![0u8; node.bin_count()];
        node.byte_frequency_data(&mut bytes);
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn handle_reports_session_liveness() {
        let node = AnalyserNode::new(128, 0.8).unwrap();
        let live = CancellationToken::new();
        let handle = AnalyserHandle::new(Arc::new(Mutex::new(node)), live.clone());

        assert!(handle.is_live());
        live.cancel();
        assert!(!handle.is_live());
    }
}
