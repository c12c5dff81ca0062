//! Audio capture, playback, and clip encoding.

pub mod capture;
pub mod playback;

use base64::Engine;
use std::io::Cursor;

/// Sample rate for recorded utterances sent to the server's recognizer.
pub const CLIP_SAMPLE_RATE: u32 = 16_000;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("audio device error: {0}")]
    Device(String),
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("no samples captured; check microphone permissions and availability")]
    EmptyCapture,
    #[error("bad audio payload: {0}")]
    BadPayload(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Converts one normalized sample to PCM16.
fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Converts one PCM16 sample to a normalized f32.
fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Encodes a finished clip as base64-wrapped WAV (16 kHz mono PCM16),
/// the transfer form of a `user_audio` command.
pub fn encode_clip_base64(samples: &[f32]) -> Result<String> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: CLIP_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| AudioError::BadPayload(e.to_string()))?;
        for &sample in samples {
            writer
                .write_sample(f32_to_i16(sample))
                .map_err(|e| AudioError::BadPayload(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| AudioError::BadPayload(e.to_string()))?;
    }
    Ok(base64::engine::general_purpose::STANDARD.encode(cursor.into_inner()))
}

/// Decodes a base64 WAV payload from an `audio_chunk` event into
/// normalized mono samples and their sample rate.
pub fn decode_clip_base64(data: &str) -> Result<(Vec<f32>, u32)> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| AudioError::BadPayload(format!("invalid base64: {e}")))?;
    decode_wav(&bytes)
}

/// Parses WAV bytes into normalized mono samples.
pub fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| AudioError::BadPayload(format!("invalid wav: {e}")))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(i16_to_f32))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| AudioError::BadPayload(e.to_string()))?,
            bits => {
                return Err(AudioError::BadPayload(format!(
                    "unsupported bit depth: {bits}"
                )));
            }
        },
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| AudioError::BadPayload(e.to_string()))?,
    };

    let samples = if spec.channels > 1 {
        downmix_to_mono(&interleaved, spec.channels)
    } else {
        interleaved
    };
    Ok((samples, spec.sample_rate))
}

/// Converts interleaved multi-channel audio to mono by averaging channels.
pub fn downmix_to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = usize::from(channels.max(1));
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear-interpolation resampler. Good enough for speech in both
/// directions; speech energy sits well below the folding frequency.
pub fn resample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            samples[idx] as f64 * (1.0 - frac) + samples[idx + 1] as f64 * frac
        } else {
            samples[idx.min(samples.len() - 1)] as f64
        };

        output.push(sample as f32);
    }

    output
}
