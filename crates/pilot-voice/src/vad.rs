//! Voice Activity Detection using WebRTC VAD.

use crate::error::{VoiceError, VoiceResult};
use tracing::info;
use webrtc_vad::{SampleRate, Vad, VadMode};

/// Configuration for VAD detection
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Sample rate (must be 8000, 16000, 32000, or 48000 Hz for WebRTC VAD)
    pub sample_rate: u32,

    /// Detection mode (0-3, where 3 is most aggressive)
    pub mode: u8,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            mode: 2,
        }
    }
}

fn vad_mode(mode: u8) -> VoiceResult<VadMode> {
    match mode {
        0 => Ok(VadMode::Quality),
        1 => Ok(VadMode::LowBitrate),
        2 => Ok(VadMode::Aggressive),
        3 => Ok(VadMode::VeryAggressive),
        _ => Err(VoiceError::Config(format!("VAD mode must be 0-3, got {}", mode))),
    }
}

fn vad_sample_rate(rate: u32) -> VoiceResult<SampleRate> {
    match rate {
        8000 => Ok(SampleRate::Rate8kHz),
        16000 => Ok(SampleRate::Rate16kHz),
        32000 => Ok(SampleRate::Rate32kHz),
        48000 => Ok(SampleRate::Rate48kHz),
        _ => Err(VoiceError::Config(format!(
            "WebRTC VAD only supports 8000, 16000, 32000, or 48000 Hz, got {}",
            rate
        ))),
    }
}

/// Voice Activity Detector using WebRTC VAD. Not `Send`: build it on the thread that uses it.
pub struct VadDetector {
    vad: Vad,
    chunk_size: usize,
}

impl VadDetector {
    pub fn new(config: VadConfig) -> VoiceResult<Self> {
        let mode = vad_mode(config.mode)?;
        let rate = vad_sample_rate(config.sample_rate)?;

        // WebRTC VAD takes 10, 20 or 30ms frames; we use 30ms
        let chunk_size = (config.sample_rate as usize * 30) / 1000;

        let mut vad = Vad::new();
        vad.set_mode(mode);
        vad.set_sample_rate(rate);

        info!(
            "🎙️ VAD ready ({}Hz, mode {}, {} samples per chunk)",
            config.sample_rate, config.mode, chunk_size
        );

        Ok(Self { vad, chunk_size })
    }

    /// Whether `audio` (exactly `chunk_size` samples) contains speech.
    pub fn is_speech(&mut self, audio: &[f32]) -> VoiceResult<bool> {
        if audio.len() != self.chunk_size {
            return Err(VoiceError::VadProcessing(format!(
                "Expected {} samples, got {}",
                self.chunk_size,
                audio.len()
            )));
        }

        let audio_i16: Vec<i16> = audio
            .iter()
            .map(|&sample| (sample.clamp(-1.0, 1.0) * 32767.0) as i16)
            .collect();

        self.vad
            .is_voice_segment(&audio_i16)
            .map_err(|e| VoiceError::VadProcessing(format!("VAD processing failed: {:?}", e)))
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}
