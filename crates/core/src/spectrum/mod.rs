use crate::graph::AnalyserHandle;
use crate::{PlayerError, Result};

/// Pulls live frequency-magnitude snapshots from a session's analyser.
///
/// Every call to [`snapshot`](SpectrumSampler::snapshot) overwrites the same
/// reusable buffer; no history is retained.
#[derive(Debug)]
pub struct SpectrumSampler {
    analyser: AnalyserHandle,
    buffer: Vec<u8>,
}

impl SpectrumSampler {
    pub fn new(analyser: AnalyserHandle) -> Result<Self> {
        let bins = analyser.bin_count()?;
        Ok(Self {
            analyser,
            buffer: vec![0; bins],
        })
    }

    /// Number of frequency bins in every snapshot.
    pub fn bin_count(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the owning session is still current.
    pub fn is_live(&self) -> bool {
        self.analyser.is_live()
    }

    /// Refreshes the buffer and returns the current magnitudes, one
    /// `0..=255` value per bin. Fails once the owning session is gone.
    pub fn snapshot(&mut self) -> Result<&[u8]> {
        if !self.analyser.is_live() {
            return Err(PlayerError::msg("playback session has been torn down"));
        }
        self.analyser.byte_frequency_data(&mut self.buffer)?;
        Ok(&self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::graph::AnalyserNode;
    use crate::task::CancellationToken;

    fn sampler() -> (SpectrumSampler, Arc<Mutex<AnalyserNode>>, CancellationToken) {
        let node = Arc::new(Mutex::new(AnalyserNode::new(128, 0.8).unwrap()));
        let live = CancellationToken::new();
        let handle = AnalyserHandle::new(node.clone(), live.clone());
        (SpectrumSampler::new(handle).unwrap(), node, live)
    }

    #[test]
    fn snapshot_tracks_the_analyser_bin_count() {
        let (sampler, _node, _live) = sampler();
        assert_eq!(sampler.bin_count(), 64);
    }

    #[test]
    fn each_snapshot_overwrites_the_previous_one() {
        let (mut sampler, node, _live) = sampler();

        node.lock().unwrap().force_bytes(&[200u8; 64]);
        assert!(sampler.snapshot().unwrap().iter().all(|&b| b == 200));

        node.lock().unwrap().force_bytes(&[3u8; 64]);
        assert!(sampler.snapshot().unwrap().iter().all(|&b| b == 3));
    }

    #[test]
    fn snapshot_fails_after_the_session_is_gone() {
        let (mut sampler, _node, live) = sampler();

        assert!(sampler.is_live());
        live.cancel();
        assert!(!sampler.is_live());
        assert!(sampler.snapshot().is_err());
    }
}
