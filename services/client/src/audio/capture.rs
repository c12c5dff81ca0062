//! Microphone capture via cpal.
//!
//! A capture session owns one OS thread because `cpal::Stream` is not
//! `Send`. Callback buffers are downmixed to mono f32 fragments and
//! accumulated until the session is stopped, at which point the fragments
//! are concatenated in arrival order and resampled to the clip rate.

use super::{AudioError, CLIP_SAMPLE_RATE, Result, downmix_to_mono, resample};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info};

/// One active microphone recording, from start to stop.
pub struct CaptureSession {
    stop: Arc<AtomicBool>,
    fragments: Arc<Mutex<Vec<Vec<f32>>>>,
    worker: JoinHandle<()>,
    device_rate: u32,
}

impl CaptureSession {
    /// Opens the input device and starts recording.
    ///
    /// Device selection and stream startup failures are reported here,
    /// synchronously, so the caller can turn them into a user notice.
    pub fn start(preferred_device: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => host
                .input_devices()
                .map_err(|e| AudioError::Device(format!("cannot enumerate devices: {e}")))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| AudioError::Device(format!("input device '{name}' not found")))?,
            None => host
                .default_input_device()
                .ok_or_else(|| AudioError::Device("no default input device".into()))?,
        };

        let default_config = device
            .default_input_config()
            .map_err(|e| AudioError::Device(format!("no default input config: {e}")))?;
        let format = default_config.sample_format();
        let stream_config: StreamConfig = default_config.into();
        let device_rate = stream_config.sample_rate.0;
        let channels = stream_config.channels.max(1);

        let device_name = device.name().unwrap_or_else(|_| "<unknown>".into());
        info!(device = %device_name, rate = device_rate, channels, "starting capture");

        let stop = Arc::new(AtomicBool::new(false));
        // Residual fragments from an earlier session never leak in: each
        // session starts with a fresh buffer.
        let fragments = Arc::new(Mutex::new(Vec::<Vec<f32>>::new()));

        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);
        let thread_stop = stop.clone();
        let thread_fragments = fragments.clone();

        let worker = std::thread::spawn(move || {
            let stream = match build_stream(&device, &stream_config, format, channels, thread_fragments) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::Stream(format!(
                    "failed to start input stream: {e}"
                ))));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Hold the stream alive until stopped.
            while !thread_stop.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(20));
            }
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop,
                fragments,
                worker,
                device_rate,
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(AudioError::Stream("capture thread exited early".into()))
            }
        }
    }

    /// Stops recording and returns the whole clip at the clip sample rate.
    ///
    /// Consumes the session; the fragment buffer is discarded with it.
    pub fn finish(self) -> Result<Vec<f32>> {
        self.stop.store(true, Ordering::Relaxed);
        self.worker
            .join()
            .map_err(|_| AudioError::Stream("capture thread panicked".into()))?;

        let fragments = self
            .fragments
            .lock()
            .map_err(|_| AudioError::Stream("fragment buffer lock poisoned".into()))?;
        let clip = assemble_clip(&fragments, self.device_rate);
        if clip.is_empty() {
            return Err(AudioError::EmptyCapture);
        }
        info!(samples = clip.len(), "capture finished");
        Ok(clip)
    }
}

/// Concatenates fragments in arrival order and resamples to the clip rate.
fn assemble_clip(fragments: &[Vec<f32>], src_rate: u32) -> Vec<f32> {
    let total: usize = fragments.iter().map(Vec::len).sum();
    let mut clip = Vec::with_capacity(total);
    for fragment in fragments {
        clip.extend_from_slice(fragment);
    }
    resample(&clip, src_rate, CLIP_SAMPLE_RATE)
}

/// Builds the input stream, normalizing every supported sample format to
/// mono f32 so the rest of the pipeline stays format-agnostic.
fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    format: SampleFormat,
    channels: u16,
    fragments: Arc<Mutex<Vec<Vec<f32>>>>,
) -> Result<cpal::Stream> {
    let err_fn = |err| error!("audio input stream error: {err}");

    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _| push_fragment(&fragments, data, channels),
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _| {
                let as_f32: Vec<f32> = data.iter().map(|&s| s as f32 / 32_768.0).collect();
                push_fragment(&fragments, &as_f32, channels);
            },
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            config,
            move |data: &[u16], _| {
                let as_f32: Vec<f32> = data
                    .iter()
                    .map(|&s| (s as f32 - 32_768.0) / 32_768.0)
                    .collect();
                push_fragment(&fragments, &as_f32, channels);
            },
            err_fn,
            None,
        ),
        other => {
            return Err(AudioError::Stream(format!(
                "unsupported sample format: {other:?}"
            )));
        }
    };
    stream.map_err(|e| AudioError::Stream(format!("failed to build input stream: {e}")))
}

fn push_fragment(fragments: &Arc<Mutex<Vec<Vec<f32>>>>, data: &[f32], channels: u16) {
    let mono = if channels > 1 {
        downmix_to_mono(data, channels)
    } else {
        data.to_vec()
    };
    if mono.is_empty() {
        return;
    }
    if let Ok(mut buf) = fragments.lock() {
        buf.push(mono);
    }
}

/// Microphone names, for the `/devices` listing.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| AudioError::Device(format!("cannot enumerate devices: {e}")))?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    #[test]
    fn fragments_concatenate_in_arrival_order() {
        let b1 = vec![0.1, 0.2];
        let b2 = vec![0.3];
        let clip = assemble_clip(&[b1, b2], CLIP_SAMPLE_RATE);
        assert_eq!(clip, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn empty_fragment_buffer_yields_empty_clip() {
        assert!(assemble_clip(&[], CLIP_SAMPLE_RATE).is_empty());
    }

    #[test]
    fn stopping_encodes_the_byte_concatenation_of_fragments() {
        // The full finalize path: fragments -> clip -> base64 WAV whose
        // payload decodes to b1 ++ b2 in order.
        let b1 = vec![0.5, -0.5];
        let b2 = vec![16384.0 / 32768.0];
        let clip = assemble_clip(&[b1.clone(), b2.clone()], CLIP_SAMPLE_RATE);
        let encoded = super::super::encode_clip_base64(&clip).unwrap();

        let wav_bytes = base64::engine::general_purpose::STANDARD
            .decode(&encoded)
            .unwrap();
        let (decoded, rate) = super::super::decode_wav(&wav_bytes).unwrap();
        assert_eq!(rate, CLIP_SAMPLE_RATE);

        let expected: Vec<f32> = b1.into_iter().chain(b2).collect();
        assert_eq!(decoded.len(), expected.len());
        for (a, b) in expected.iter().zip(decoded.iter()) {
            assert!((a - b).abs() <= 1.0 / 32768.0);
        }
    }

    #[test]
    fn mixed_rate_clip_is_resampled_to_clip_rate() {
        let fragments = vec![vec![0.0; 48_000]];
        let clip = assemble_clip(&fragments, 48_000);
        assert_eq!(clip.len(), CLIP_SAMPLE_RATE as usize);
    }
}
