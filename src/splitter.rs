//! Audio Splitter
//!
//! Divides one PCM buffer into fixed-duration chunks (§4.6). No state
//! carries across input frames — each `split` call is independent, unlike
//! the ring-buffer/overlap machinery in `continuous::SlidingAudioBuffer`
//! this crate inherited the chunking-arithmetic idiom from.

/// `(sampleRate, sampleSizeBits, channels, durationMs)` — the parameters a
/// chunk size is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub sample_size_bits: u32,
    pub channels: u32,
    pub duration_ms: u32,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, sample_size_bits: u32, channels: u32, duration_ms: u32) -> Self {
        Self {
            sample_rate,
            sample_size_bits,
            channels,
            duration_ms,
        }
    }

    /// `chunkSize = sampleRate * (bits/8) * channels * durationMs / 1000`.
    pub fn chunk_size(&self) -> usize {
        (self.sample_rate as u64 * (self.sample_size_bits as u64 / 8) * self.channels as u64
            * self.duration_ms as u64
            / 1000) as usize
    }
}

/// Split `bytes` into equal-sized chunks of `format.chunk_size()`, the last
/// possibly short (property 7, §8). Order preserved; no input buffering.
pub fn split(bytes: &[u8], format: AudioFormat) -> Vec<Vec<u8>> {
    let chunk_size = format.chunk_size().max(1);
    bytes.chunks(chunk_size).map(|c| c.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_matches_spec_formula() {
        let format = AudioFormat::new(16000, 16, 1, 20);
        assert_eq!(format.chunk_size(), 640);
    }

    #[test]
    fn splits_into_equal_chunks_with_short_last_s6() {
        let format = AudioFormat::new(16000, 16, 1, 20);
        let input: Vec<u8> = (0..6400u32).map(|i| (i % 256) as u8).collect();
        let chunks = split(&input, format);
        assert_eq!(chunks.len(), 10);
        for chunk in &chunks {
            assert_eq!(chunk.len(), 640);
        }
        let reassembled: Vec<u8> = chunks.into_iter().flatten().collect();
        assert_eq!(reassembled, input);
    }

    #[test]
    fn last_chunk_short_when_not_evenly_divisible() {
        let format = AudioFormat::new(16000, 16, 1, 20);
        let input = vec![7u8; 640 * 3 + 100];
        let chunks = split(&input, format);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].len(), 640);
        assert_eq!(chunks[3].len(), 100);
        let reassembled: Vec<u8> = chunks.into_iter().flatten().collect();
        assert_eq!(reassembled, input);
    }
}
