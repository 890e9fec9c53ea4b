//! Opus frame decoding, adapted from the TCP transcriber's inline decoder.

use thiserror::Error;

use crate::conversion::int16_to_f32;

/// 60ms frames at 16 kHz, matching the encoder the client side uses.
pub const DEFAULT_FRAME_SAMPLES: usize = 960;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("opus decoder init failed: {0}")]
    Init(opus::Error),
    #[error("opus decode failed: {0}")]
    Decode(opus::Error),
    #[error("wav decode failed: {0}")]
    Wav(#[from] hound::Error),
}

/// Decode a 16-bit PCM mono WAV buffer, as produced by
/// [`crate::AudioBuffer::to_wav_bytes`], back to normalized float samples.
/// The transcriber backend uses this to turn the wire format a `Transcriber`
/// receives back into the raw samples an ASR backend wants.
pub fn decode_wav_to_f32(bytes: &[u8]) -> Result<Vec<f32>, DecodeError> {
    let mut reader = hound::WavReader::new(std::io::Cursor::new(bytes))?;
    let samples: Result<Vec<i16>, hound::Error> = reader.samples::<i16>().collect();
    Ok(int16_to_f32(&samples?))
}

/// A stateful decoder turning compressed bytes into normalized mono float
/// samples at the decoder's native rate. Implementations keep per-stream
/// state (an Opus decoder tracks history across frames), so one instance is
/// owned per session.
pub trait AudioDecoder: Send {
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;
    fn decode(&mut self, data: &[u8]) -> Result<Vec<f32>, DecodeError>;
}

pub struct OpusFrameDecoder {
    decoder: opus::Decoder,
    sample_rate: u32,
    channels: u16,
    frame_samples: usize,
}

impl OpusFrameDecoder {
    pub fn new(sample_rate: u32, channels: u16, frame_samples: usize) -> Result<Self, DecodeError> {
        let opus_channels = if channels > 1 { opus::Channels::Stereo } else { opus::Channels::Mono };
        let decoder = opus::Decoder::new(sample_rate, opus_channels).map_err(DecodeError::Init)?;
        Ok(Self {
            decoder,
            sample_rate,
            channels,
            frame_samples,
        })
    }
}

impl AudioDecoder for OpusFrameDecoder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn decode(&mut self, data: &[u8]) -> Result<Vec<f32>, DecodeError> {
        let mut pcm = vec![0i16; self.frame_samples * self.channels as usize];
        let decoded_per_channel = self
            .decoder
            .decode(data, &mut pcm, false)
            .map_err(DecodeError::Decode)?;
        pcm.truncate(decoded_per_channel * self.channels as usize);
        Ok(int16_to_f32(&pcm))
    }
}
