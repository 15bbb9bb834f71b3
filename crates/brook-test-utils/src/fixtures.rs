//! Deterministic audio payloads.

/// Interleaved 16-bit little-endian PCM sine, `frames` frames long.
pub fn pcm_tone(frames: usize, channels: u16) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(frames * usize::from(channels) * 2);
    for i in 0..frames {
        let sample = ((i as f32 * 0.1).sin() * 32767.0) as i16;
        for _ in 0..channels {
            pcm.extend_from_slice(&sample.to_le_bytes());
        }
    }
    pcm
}

/// `len` bytes cycling through a prime period, so misplaced slices show up.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_has_one_sample_per_channel_per_frame() {
        let pcm = pcm_tone(100, 2);
        assert_eq!(pcm.len(), 400);
        // Both channels carry the same sample.
        assert_eq!(pcm[4..6], pcm[6..8]);
    }

    #[test]
    fn pattern_wraps_at_251() {
        let p = pattern(300);
        assert_eq!(p[250], 250);
        assert_eq!(p[251], 0);
    }
}
