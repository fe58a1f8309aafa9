//! Microphone input using CPAL.

use crate::error::{VoiceError, VoiceResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Requested input format.
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Hz (default 16000)
    pub sample_rate: u32,
    /// Device channels; interleaved frames are averaged down to mono.
    pub channels: u16,
    /// Mono samples per chunk (default 480, 30ms at 16kHz)
    pub buffer_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            buffer_size: 480,
        }
    }
}

/// Fixed-size block of mono samples in [-1.0, 1.0].
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub timestamp: Instant,
}

/// Folds interleaved device frames into mono chunks of `size` samples.
struct Chunker {
    channels: usize,
    size: usize,
    pending: Vec<f32>,
}

impl Chunker {
    fn new(channels: u16, size: usize) -> Self {
        Self {
            channels: channels.max(1) as usize,
            size: size.max(1),
            pending: Vec::with_capacity(size),
        }
    }

    fn push(&mut self, data: &[f32], mut out: impl FnMut(Vec<f32>)) {
        for frame in data.chunks(self.channels) {
            let mono = frame.iter().sum::<f32>() / frame.len() as f32;
            self.pending.push(mono);
            if self.pending.len() == self.size {
                out(std::mem::replace(&mut self.pending, Vec::with_capacity(self.size)));
            }
        }
    }
}

/// Default input device opened with an [`AudioConfig`].
pub struct AudioCapture {
    config: AudioConfig,
    device: Device,
    stream_config: StreamConfig,
}

impl AudioCapture {
    pub fn new(config: AudioConfig) -> VoiceResult<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| VoiceError::AudioDevice("No input device available".to_string()))?;
        // errors out when the device cannot be opened at all
        device.default_input_config()?;

        info!(
            "🎤 Microphone: {} ({}Hz, {} ch, {} samples/chunk)",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            config.sample_rate,
            config.channels,
            config.buffer_size
        );

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        Ok(Self {
            config,
            device,
            stream_config,
        })
    }

    /// True when a default input device exists and reports a usable config.
    pub fn probe() -> bool {
        match cpal::default_host().default_input_device() {
            Some(device) => match device.default_input_config() {
                Ok(_) => true,
                Err(e) => {
                    warn!("microphone present but unusable: {}", e);
                    false
                }
            },
            None => false,
        }
    }

    /// Stream mono chunks to `chunk_tx` until the returned stream is dropped.
    pub fn start_capture(self, chunk_tx: mpsc::UnboundedSender<AudioChunk>) -> VoiceResult<Stream> {
        let mut chunker = Chunker::new(self.config.channels, self.config.buffer_size);

        let stream = self.device.build_input_stream(
            &self.stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                chunker.push(data, |samples| {
                    // receiver gone means the window closed
                    let _ = chunk_tx.send(AudioChunk {
                        samples,
                        timestamp: Instant::now(),
                    });
                });
            },
            move |err| {
                warn!("Audio stream error: {}", err);
            },
            None,
        )?;
        stream.play()?;
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_frames_are_averaged() {
        let mut chunker = Chunker::new(2, 2);
        let mut out = Vec::new();
        chunker.push(&[1.0, 0.0, 0.5, 0.5, -1.0, -1.0], |c| out.push(c));
        assert_eq!(out, vec![vec![0.5, 0.5]]);
        assert_eq!(chunker.pending, vec![-1.0]);
    }

    #[test]
    fn chunks_span_callbacks() {
        let mut chunker = Chunker::new(1, 3);
        let mut out = Vec::new();
        chunker.push(&[0.1, 0.2], |c| out.push(c));
        assert!(out.is_empty());
        chunker.push(&[0.3, 0.4], |c| out.push(c));
        assert_eq!(out, vec![vec![0.1, 0.2, 0.3]]);
    }
}
