//! Error types for the interview voice loop

use pilot_core::GatewayError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors raised by the capture / synthesis plumbing
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("VAD processing error: {0}")]
    VadProcessing(String),

    #[error("Audio stream error: {0}")]
    AudioStream(String),

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "audio")]
impl From<cpal::DevicesError> for VoiceError {
    fn from(err: cpal::DevicesError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

#[cfg(feature = "audio")]
impl From<cpal::DefaultStreamConfigError> for VoiceError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

#[cfg(feature = "audio")]
impl From<cpal::BuildStreamError> for VoiceError {
    fn from(err: cpal::BuildStreamError) -> Self {
        VoiceError::AudioStream(err.to_string())
    }
}

#[cfg(feature = "audio")]
impl From<cpal::PlayStreamError> for VoiceError {
    fn from(err: cpal::PlayStreamError) -> Self {
        VoiceError::AudioStream(err.to_string())
    }
}

/// Recognition failure discriminator. Only `NoSpeech` is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecognitionErrorKind {
    NoSpeech,
    Other,
}

impl RecognitionErrorKind {
    /// Map a recognizer error code (`"no-speech"`, `"network"`, ...) to a kind.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "no-speech" | "no_speech" | "nospeech" => RecognitionErrorKind::NoSpeech,
            _ => RecognitionErrorKind::Other,
        }
    }
}

impl fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognitionErrorKind::NoSpeech => f.write_str("no-speech"),
            RecognitionErrorKind::Other => f.write_str("other"),
        }
    }
}

/// Typed error emitted by a speech capture adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct RecognitionError {
    pub kind: RecognitionErrorKind,
    pub message: String,
}

impl RecognitionError {
    pub fn no_speech() -> Self {
        Self {
            kind: RecognitionErrorKind::NoSpeech,
            message: "no speech detected".to_string(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: RecognitionErrorKind::Other,
            message: message.into(),
        }
    }

    /// Build from a recognizer `{error, message}` pair.
    pub fn from_sdk(code: &str, message: impl Into<String>) -> Self {
        Self {
            kind: RecognitionErrorKind::from_code(code),
            message: message.into(),
        }
    }
}

/// Everything that can end (or fail to start) an interview session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterviewError {
    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("Speech recognition failed ({})", .0)]
    Recognition(RecognitionError),

    #[error("Answer request failed: {0}")]
    Gateway(GatewayError),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("Could not open interview session: {0}")]
    SessionOpen(String),
}
