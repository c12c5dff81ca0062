//! Speaker playback via cpal.
//!
//! One long-lived output stream reads from a shared clip buffer. Playing a
//! new clip replaces the buffer and rewinds it, so a fresh reply preempts
//! whatever is still sounding. An exhausted buffer yields silence.

use super::{AudioError, Result, resample};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info};

/// Clip samples plus the playback cursor.
struct PlaybackShared {
    samples: Vec<f32>,
    position: usize,
}

impl PlaybackShared {
    fn empty() -> Self {
        Self {
            samples: Vec::new(),
            position: 0,
        }
    }

    /// Replaces the current clip and rewinds. Whatever was still queued
    /// from the previous clip is dropped.
    fn preempt(&mut self, samples: Vec<f32>) {
        self.samples = samples;
        self.position = 0;
    }

    /// Fills an interleaved output buffer, duplicating the mono sample
    /// across channels; silence once the clip runs out.
    fn write_into(&mut self, out: &mut [f32], channels: usize) {
        for frame in out.chunks_mut(channels.max(1)) {
            let sample = if self.position < self.samples.len() {
                let s = self.samples[self.position];
                self.position += 1;
                s
            } else {
                0.0
            };
            for slot in frame.iter_mut() {
                *slot = sample;
            }
        }
    }
}

/// Speaker handle. The output stream is created lazily on first play and
/// lives until the player is dropped.
pub struct Player {
    device_name: Option<String>,
    shared: Option<Arc<Mutex<PlaybackShared>>>,
    out_rate: u32,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Player {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            shared: None,
            out_rate: 0,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Starts playing a clip immediately, preempting any current playback.
    pub fn play(&mut self, samples: &[f32], src_rate: u32) -> Result<()> {
        let shared = match &self.shared {
            Some(shared) => shared.clone(),
            None => self.start_worker()?,
        };
        let resampled = resample(samples, src_rate, self.out_rate);
        shared
            .lock()
            .map_err(|_| AudioError::Stream("playback buffer lock poisoned".into()))?
            .preempt(resampled);
        Ok(())
    }

    fn start_worker(&mut self) -> Result<Arc<Mutex<PlaybackShared>>> {
        let host = cpal::default_host();
        let device = match &self.device_name {
            Some(name) => host
                .output_devices()
                .map_err(|e| AudioError::Device(format!("cannot enumerate devices: {e}")))?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| AudioError::Device(format!("output device '{name}' not found")))?,
            None => host
                .default_output_device()
                .ok_or_else(|| AudioError::Device("no default output device".into()))?,
        };

        let default_config = device
            .default_output_config()
            .map_err(|e| AudioError::Device(format!("no default output config: {e}")))?;
        let stream_config: StreamConfig = default_config.into();
        let out_rate = stream_config.sample_rate.0;
        let channels = usize::from(stream_config.channels.max(1));

        let device_name = device.name().unwrap_or_else(|_| "<unknown>".into());
        info!(device = %device_name, rate = out_rate, channels, "starting playback stream");

        let shared = Arc::new(Mutex::new(PlaybackShared::empty()));
        let callback_shared = shared.clone();
        let thread_stop = self.stop.clone();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);

        let worker = std::thread::spawn(move || {
            let stream = device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _| {
                    if let Ok(mut buf) = callback_shared.lock() {
                        buf.write_into(data, channels);
                    }
                },
                |err| error!("audio output stream error: {err}"),
                None,
            );
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(AudioError::Stream(format!(
                        "failed to build output stream: {e}"
                    ))));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::Stream(format!(
                    "failed to start output stream: {e}"
                ))));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            while !thread_stop.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(20));
            }
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.shared = Some(shared.clone());
                self.out_rate = out_rate;
                self.worker = Some(worker);
                Ok(shared)
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(AudioError::Stream("playback thread exited early".into()))
            }
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Speaker names, for the `/devices` listing.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| AudioError::Device(format!("cannot enumerate devices: {e}")))?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_buffer_yields_silence() {
        let mut shared = PlaybackShared::empty();
        shared.preempt(vec![0.5, 0.25]);

        let mut out = [1.0f32; 4];
        shared.write_into(&mut out, 1);
        assert_eq!(out, [0.5, 0.25, 0.0, 0.0]);
    }

    #[test]
    fn new_clip_preempts_the_one_still_playing() {
        let mut shared = PlaybackShared::empty();
        shared.preempt(vec![0.1; 100]);

        let mut out = [0.0f32; 10];
        shared.write_into(&mut out, 1);

        // A fresh chunk arrives mid-clip and takes over from sample zero.
        shared.preempt(vec![0.9, 0.8]);
        let mut out = [0.0f32; 4];
        shared.write_into(&mut out, 1);
        assert_eq!(out, [0.9, 0.8, 0.0, 0.0]);
    }

    #[test]
    fn mono_samples_are_duplicated_across_channels() {
        let mut shared = PlaybackShared::empty();
        shared.preempt(vec![0.5, -0.5]);

        let mut out = [0.0f32; 4];
        shared.write_into(&mut out, 2);
        assert_eq!(out, [0.5, 0.5, -0.5, -0.5]);
    }
}
