//! Audio buffering, format conversion and Opus decoding shared by the
//! streaming strategies.

mod buffer;
mod conversion;
mod decoder;

pub use buffer::{AudioBuffer, AudioSample};
pub use conversion::{decode_pcm16_le, downmix_to_mono, f32_to_int16, int16_to_f32, resample_to_16k};
pub use decoder::{decode_wav_to_f32, AudioDecoder, DecodeError, OpusFrameDecoder, DEFAULT_FRAME_SAMPLES};
