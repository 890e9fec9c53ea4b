//! Voice activity detection over normalized float samples.
//!
//! Adapted from a prior `earshot`-backed detector that operated on raw
//! int16 frames; this version accepts the float samples the rest of the
//! pipeline already works in and exposes lookups in seconds rather than
//! centiseconds.

use earshot::Detector;

const EARSHOT_FRAME: usize = 256; // 16ms at 16kHz
const EARSHOT_MS: f64 = 16.0;

/// A capability for tracking speech probability over a continuous audio
/// stream. `consume` may be called repeatedly with arbitrarily sized
/// chunks; `probability_at` looks up (with linear interpolation) the
/// speech probability at an arbitrary point already fed in.
pub trait VoiceActivityDetector: Send {
    fn reset(&mut self);
    fn consume(&mut self, samples: &[f32]);
    fn probability_at(&self, seconds: f64) -> f32;
    fn end_probability(&self) -> f32;
    fn end_seconds(&self) -> f64;
}

pub struct EarshotVad {
    detector: Detector,
    probabilities: Vec<f32>,
    leftovers: Vec<i16>,
}

impl Default for EarshotVad {
    fn default() -> Self {
        Self::new()
    }
}

impl EarshotVad {
    pub fn new() -> Self {
        Self {
            detector: Detector::default(),
            probabilities: Vec::new(),
            leftovers: Vec::new(),
        }
    }
}

impl VoiceActivityDetector for EarshotVad {
    fn reset(&mut self) {
        self.detector = Detector::default();
        self.probabilities.clear();
        self.leftovers.clear();
    }

    fn consume(&mut self, samples: &[f32]) {
        let samples: Vec<i16> = samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .collect();
        let mut pos = 0;

        if !self.leftovers.is_empty() {
            let need = EARSHOT_FRAME - self.leftovers.len();
            if samples.len() < need {
                self.leftovers.extend_from_slice(&samples);
                return;
            }
            self.leftovers.extend_from_slice(&samples[..need]);
            self.probabilities.push(self.detector.predict_i16(&self.leftovers));
            self.leftovers.clear();
            pos = need;
        }

        while pos + EARSHOT_FRAME <= samples.len() {
            let chunk = &samples[pos..pos + EARSHOT_FRAME];
            self.probabilities.push(self.detector.predict_i16(chunk));
            pos += EARSHOT_FRAME;
        }

        if pos < samples.len() {
            self.leftovers.extend_from_slice(&samples[pos..]);
        }
    }

    fn probability_at(&self, seconds: f64) -> f32 {
        if self.probabilities.is_empty() {
            return 0.0;
        }
        let t_ms = seconds * 1000.0;
        let position = t_ms / EARSHOT_MS;
        if position <= 0.0 {
            return self.probabilities[0];
        }
        let lo = position.floor() as usize;
        if lo >= self.probabilities.len() - 1 {
            return self.end_probability();
        }
        let lo_val = self.probabilities[lo];
        let hi_val = self.probabilities[lo + 1];
        let hi_weight = (position - lo as f64) as f32;
        hi_val * hi_weight + lo_val * (1.0 - hi_weight)
    }

    fn end_probability(&self) -> f32 {
        self.probabilities.last().copied().unwrap_or(0.0)
    }

    fn end_seconds(&self) -> f64 {
        (self.probabilities.len() as f64 * EARSHOT_MS) / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_reports_low_probability() {
        let mut vad = EarshotVad::new();
        vad.consume(&vec![0.0; 256 * 20]);
        assert!(vad.end_probability() < 0.5);
    }

    #[test]
    fn reset_clears_accumulated_state() {
        let mut vad = EarshotVad::new();
        vad.consume(&vec![0.0; 256 * 5]);
        assert!(vad.end_seconds() > 0.0);
        vad.reset();
        assert_eq!(vad.end_seconds(), 0.0);
        assert_eq!(vad.probability_at(1.0), 0.0);
    }

    #[test]
    fn leftovers_carry_across_small_chunks() {
        let mut vad = EarshotVad::new();
        // Feed fewer than one earshot frame at a time.
        for _ in 0..10 {
            vad.consume(&vec![0.0; 64]);
        }
        // 640 samples = 2 full frames plus leftover.
        assert!(vad.end_seconds() >= 0.03);
    }
}
