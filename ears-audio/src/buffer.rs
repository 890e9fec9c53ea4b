//! Bounded sliding-window audio buffer with offset tracking.
//!
//! Mirrors the chunk-based, concatenation-deferred design used throughout the
//! capture pipeline: append is amortized O(1), and a concatenated view is
//! only materialized (and memoized) when [`AudioBuffer::get_audio`] is
//! called.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Arc;

use tracing::debug;

/// A normalized mono 16 kHz float sample in `[-1.0, 1.0]`.
pub type AudioSample = f32;

pub struct AudioBuffer {
    sample_rate: u32,
    max_samples: usize,
    chunks: VecDeque<Arc<[AudioSample]>>,
    samples_in_buffer: usize,
    offset_samples: u64,
    total_samples: u64,
    cached_audio: Option<Vec<AudioSample>>,
}

impl AudioBuffer {
    pub fn new(max_seconds: f64, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            max_samples: (max_seconds * sample_rate as f64) as usize,
            chunks: VecDeque::new(),
            samples_in_buffer: 0,
            offset_samples: 0,
            total_samples: 0,
            cached_audio: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    pub fn samples_in_buffer(&self) -> usize {
        self.samples_in_buffer
    }

    pub fn offset_samples(&self) -> u64 {
        self.offset_samples
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn offset_seconds(&self) -> f64 {
        self.offset_samples as f64 / self.sample_rate as f64
    }

    pub fn duration_seconds(&self) -> f64 {
        self.samples_in_buffer as f64 / self.sample_rate as f64
    }

    pub fn total_duration_seconds(&self) -> f64 {
        self.total_samples as f64 / self.sample_rate as f64
    }

    /// Append a chunk of samples. Returns the number of samples trimmed from
    /// the front to stay within `max_samples`.
    pub fn append(&mut self, chunk: impl Into<Arc<[AudioSample]>>) -> usize {
        let chunk: Arc<[AudioSample]> = chunk.into();
        let len = chunk.len();
        if len > 0 {
            self.chunks.push_back(chunk);
            self.samples_in_buffer += len;
            self.total_samples += len as u64;
            self.cached_audio = None;
        }
        self.trim_to_max()
    }

    fn trim_to_max(&mut self) -> usize {
        if self.samples_in_buffer <= self.max_samples {
            return 0;
        }
        let target = self.samples_in_buffer - self.max_samples;
        let trimmed = self.drop_front(target);
        if trimmed > 0 {
            debug!(trimmed, offset_seconds = self.offset_seconds(), "buffer trimmed to max size");
        }
        trimmed
    }

    /// Drop exactly `count` samples from the front, across as many chunks as
    /// necessary, partially slicing the last one touched.
    fn drop_front(&mut self, count: usize) -> usize {
        let mut remaining = count.min(self.samples_in_buffer);
        let mut dropped = 0;
        while remaining > 0 {
            let Some(front) = self.chunks.front() else { break };
            if front.len() <= remaining {
                let len = front.len();
                self.chunks.pop_front();
                self.samples_in_buffer -= len;
                self.offset_samples += len as u64;
                remaining -= len;
                dropped += len;
            } else {
                let keep_from = remaining;
                let new_front: Arc<[AudioSample]> = Arc::from(&front[keep_from..]);
                self.chunks[0] = new_front;
                self.samples_in_buffer -= remaining;
                self.offset_samples += remaining as u64;
                dropped += remaining;
                remaining = 0;
            }
        }
        if dropped > 0 {
            self.cached_audio = None;
        }
        dropped
    }

    /// Trim the buffer to at most `keep_seconds` of tail audio.
    pub fn trim_to_seconds(&mut self, keep_seconds: f64) -> usize {
        let keep_samples = (keep_seconds * self.sample_rate as f64) as usize;
        if self.samples_in_buffer <= keep_samples {
            return 0;
        }
        self.drop_front(self.samples_in_buffer - keep_samples)
    }

    /// Trim so that no sample timestamped strictly before `absolute_time`
    /// remains, but never leave less than 1 second of tail.
    pub fn trim_to_time(&mut self, absolute_time: f64) -> usize {
        let buffer_start = self.offset_seconds();
        if absolute_time <= buffer_start {
            return 0;
        }
        let relative = absolute_time - buffer_start;
        let mut trim_samples = (relative * self.sample_rate as f64) as usize;
        if trim_samples == 0 {
            return 0;
        }
        if trim_samples >= self.samples_in_buffer {
            trim_samples = self.samples_in_buffer.saturating_sub(self.sample_rate as usize);
        }
        if trim_samples == 0 {
            return 0;
        }
        self.drop_front(trim_samples)
    }

    fn materialize(&self) -> Vec<AudioSample> {
        match self.chunks.len() {
            0 => Vec::new(),
            1 => self.chunks[0].to_vec(),
            _ => {
                let mut out = Vec::with_capacity(self.samples_in_buffer);
                for chunk in &self.chunks {
                    out.extend_from_slice(chunk);
                }
                out
            }
        }
    }

    /// Current window and its absolute start time. The concatenated view is
    /// memoized and invalidated by any mutating call.
    pub fn get_audio(&mut self) -> (&[AudioSample], f64) {
        if self.cached_audio.is_none() {
            self.cached_audio = Some(self.materialize());
        }
        let offset = self.offset_seconds();
        (self.cached_audio.as_deref().unwrap(), offset)
    }

    /// Encode the current window as 16-bit PCM mono WAV bytes.
    pub fn to_wav_bytes(&mut self) -> Vec<u8> {
        let sample_rate = self.sample_rate;
        let (audio, _offset) = self.get_audio();

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("valid wav spec");
            for &sample in audio {
                let clamped = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                writer.write_sample(clamped).expect("wav sample write");
            }
            writer.finalize().expect("wav finalize");
        }
        cursor.into_inner()
    }

    /// Drop all buffered samples but keep the offset (absolute timestamps of
    /// words already produced remain meaningful).
    pub fn clear(&mut self) {
        self.offset_samples += self.samples_in_buffer as u64;
        self.chunks.clear();
        self.samples_in_buffer = 0;
        self.cached_audio = None;
    }

    /// Fully reset, including offset tracking.
    pub fn reset(&mut self) {
        self.chunks.clear();
        self.samples_in_buffer = 0;
        self.offset_samples = 0;
        self.total_samples = 0;
        self.cached_audio = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(value: f32, count: usize) -> Vec<f32> {
        vec![value; count]
    }

    #[test]
    fn reset_then_append_yields_exact_chunk_with_zero_offset() {
        let mut buf = AudioBuffer::new(30.0, 16_000);
        buf.reset();
        let chunk = samples(0.5, 100);
        buf.append(chunk.clone());
        let (audio, offset) = buf.get_audio();
        assert_eq!(audio, chunk.as_slice());
        assert_eq!(offset, 0.0);
    }

    #[test]
    fn append_exact_capacity_leaves_zero_offset() {
        let mut buf = AudioBuffer::new(1.0, 16_000);
        let trimmed = buf.append(samples(0.1, 16_000));
        assert_eq!(trimmed, 0);
        assert_eq!(buf.offset_samples(), 0);
        assert_eq!(buf.samples_in_buffer(), 16_000);
    }

    #[test]
    fn oversized_chunk_is_trimmed_to_its_tail() {
        let mut buf = AudioBuffer::new(1.0, 16_000);
        // 1.5s chunk into a 1s buffer.
        let chunk: Vec<f32> = (0..24_000).map(|i| i as f32).collect();
        buf.append(chunk.clone());
        assert_eq!(buf.samples_in_buffer(), 16_000);
        assert_eq!(buf.offset_samples(), 24_000 - 16_000);
        let (audio, _) = buf.get_audio();
        assert_eq!(audio, &chunk[8_000..]);
    }

    #[test]
    fn sliding_window_keeps_only_newest_chunks() {
        let mut buf = AudioBuffer::new(2.0, 16_000);
        let a = samples(1.0, 16_000);
        let b = samples(2.0, 16_000);
        let c = samples(3.0, 16_000);
        buf.append(a);
        buf.append(b.clone());
        buf.append(c.clone());
        assert_eq!(buf.samples_in_buffer(), 32_000);
        assert_eq!(buf.offset_seconds(), 1.0);
        let (audio, offset) = buf.get_audio();
        assert_eq!(offset, 1.0);
        let mut expected = b;
        expected.extend(c);
        assert_eq!(audio, expected.as_slice());
    }

    #[test]
    fn invariants_hold_after_append() {
        let mut buf = AudioBuffer::new(0.5, 16_000);
        for _ in 0..10 {
            buf.append(samples(0.0, 3_000));
            assert!(buf.samples_in_buffer() <= buf.max_samples());
            assert_eq!(buf.offset_samples() + buf.samples_in_buffer() as u64, buf.total_samples());
        }
    }

    #[test]
    fn trim_to_time_advances_offset_within_buffer() {
        let mut buf = AudioBuffer::new(5.0, 16_000);
        buf.append(samples(0.0, 16_000 * 2));
        let trimmed = buf.trim_to_time(1.0);
        assert_eq!(trimmed, 16_000);
        assert_eq!(buf.offset_seconds(), 1.0);
    }

    #[test]
    fn trim_to_time_keeps_at_least_one_second() {
        let mut buf = AudioBuffer::new(10.0, 16_000);
        buf.append(samples(0.0, 16_000 * 3)); // 3 seconds
        buf.trim_to_time(100.0); // far past the end
        assert!(buf.samples_in_buffer() >= 16_000);
        assert!(buf.offset_seconds() < 100.0);
    }

    #[test]
    fn trim_to_time_before_offset_is_noop() {
        let mut buf = AudioBuffer::new(10.0, 16_000);
        buf.append(samples(0.0, 16_000 * 3));
        buf.trim_to_time(1.0);
        let offset_after_first = buf.offset_seconds();
        let trimmed = buf.trim_to_time(0.5);
        assert_eq!(trimmed, 0);
        assert_eq!(buf.offset_seconds(), offset_after_first);
    }

    #[test]
    fn to_wav_bytes_is_valid_riff_wave() {
        let mut buf = AudioBuffer::new(1.0, 16_000);
        buf.append(samples(0.25, 1_000));
        let bytes = buf.to_wav_bytes();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
    }

    #[test]
    fn clear_preserves_offset_reset_does_not() {
        let mut buf = AudioBuffer::new(1.0, 16_000);
        buf.append(samples(0.0, 16_000));
        buf.clear();
        assert_eq!(buf.offset_samples(), 16_000);
        assert_eq!(buf.samples_in_buffer(), 0);
        buf.reset();
        assert_eq!(buf.offset_samples(), 0);
        assert_eq!(buf.total_samples(), 0);
    }
}
