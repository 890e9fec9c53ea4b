//! Sample format conversion: int16 <-> float, channel downmixing and the
//! fixed 8 kHz -> 16 kHz linear resampler used for narrowband PCM input.
//!
//! The resample ratio is always exactly 2x, so a hand-rolled linear
//! interpolation is used instead of a general-purpose resampling crate:
//! there is no arbitrary ratio to support here.

/// Convert little-endian int16 PCM to normalized float samples.
pub fn int16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32_768.0).collect()
}

/// Convert normalized float samples back to int16 PCM, clamping overshoot.
pub fn f32_to_int16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

/// Decode a little-endian int16 PCM byte buffer straight to normalized
/// floats, dropping a trailing odd byte if present.
pub fn decode_pcm16_le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .map(|s| s as f32 / 32_768.0)
        .collect()
}

/// Downmix interleaved multichannel samples to mono by arithmetic mean,
/// clamped to `[-1.0, 1.0]`. A mono input is returned unchanged.
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 || samples.is_empty() {
        return samples.to_vec();
    }
    let channels = channels as usize;
    let frame_count = samples.len() / channels;
    let mut mono = Vec::with_capacity(frame_count);
    for frame in samples[..frame_count * channels].chunks_exact(channels) {
        let avg = frame.iter().sum::<f32>() / channels as f32;
        mono.push(avg.clamp(-1.0, 1.0));
    }
    mono
}

/// Linearly resample mono 8 kHz samples to mono 16 kHz (exact 2x upsample).
pub fn resample_8k_to_16k(samples: &[f32]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(samples.len() * 2);
    for i in 0..samples.len() {
        let current = samples[i];
        let next = samples.get(i + 1).copied().unwrap_or(current);
        out.push(current);
        out.push((current + next) * 0.5);
    }
    out
}

/// Resample mono input at `from_rate` to 16 kHz. Only 8 kHz and 16 kHz
/// inputs are accepted; anything else is a caller error surfaced upstream
/// as an unsupported sample rate.
pub fn resample_to_16k(samples: &[f32], from_rate: u32) -> Option<Vec<f32>> {
    match from_rate {
        16_000 => Some(samples.to_vec()),
        8_000 => Some(resample_8k_to_16k(samples)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int16_round_trip_stays_close() {
        let original = vec![0i16, 16_000, -16_000, i16::MAX, i16::MIN + 1];
        let floats = int16_to_f32(&original);
        let back = f32_to_int16(&floats);
        for (a, b) in original.iter().zip(back.iter()) {
            assert!((a - b).abs() <= 1, "{a} vs {b}");
        }
    }

    #[test]
    fn downmix_stereo_averages_channels() {
        let stereo = vec![1.0, -1.0, 0.5, 0.5];
        let mono = downmix_to_mono(&stereo, 2);
        assert_eq!(mono, vec![0.0, 0.5]);
    }

    #[test]
    fn downmix_mono_is_passthrough() {
        let mono_in = vec![0.1, 0.2, 0.3];
        assert_eq!(downmix_to_mono(&mono_in, 1), mono_in);
    }

    #[test]
    fn resample_doubles_sample_count() {
        let input = vec![0.0, 1.0, 0.0, -1.0];
        let output = resample_8k_to_16k(&input);
        assert_eq!(output.len(), input.len() * 2);
        assert_eq!(output[0], 0.0);
        assert_eq!(output[1], 0.5);
        assert_eq!(output[2], 1.0);
    }

    #[test]
    fn resample_to_16k_rejects_unsupported_rate() {
        assert!(resample_to_16k(&[0.0], 44_100).is_none());
    }
}
