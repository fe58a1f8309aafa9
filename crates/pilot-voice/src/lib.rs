//! # Pilot Voice - the live interview turn-taking loop
//!
//! Listens for the interviewer's question, asks the backend for an answer, reads
//! the answer aloud, and listens again, until the user ends the session.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     InterviewRuntime (task)                   │
//! │                                                               │
//! │  commands ─┐                                    ┌─▶ snapshots │
//! │  capture  ─┼─▶ TurnController::handle ─▶ effects┼─▶ alerts    │
//! │  synthesis─┘      (pure reducer)                └─▶ adapters  │
//! │                                                               │
//! │  SpeechCapture      AnswerGateway       SpeechSynthesis       │
//! │  (console | mic)    (pilot-core)        (console | speaker)   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Microphone and speaker adapters need the `audio` feature.

pub mod alert;
pub mod capture;
pub mod console;
pub mod controller;
pub mod error;
pub mod runtime;
pub mod session;
pub mod stt;
pub mod synthesis;
pub mod tts;
pub mod turn;

#[cfg(feature = "audio")]
pub mod audio;
#[cfg(feature = "audio")]
pub mod ear;
#[cfg(feature = "audio")]
pub mod vad;
#[cfg(feature = "audio")]
pub mod voice_output;

pub use alert::Alert;
pub use capture::{CaptureEvent, SpeechCapture};
pub use console::{ConsoleCapture, ConsoleSynthesis};
pub use controller::{ControllerEvent, Effect, Phase, SessionSnapshot, TurnController};
pub use error::{
    InterviewError, RecognitionError, RecognitionErrorKind, VoiceError, VoiceResult,
};
pub use runtime::{InterviewRuntime, RuntimeDeps};
pub use session::{
    InterviewRequest, InterviewSession, SpeechUtteranceHandle, Turn, UtteranceEvent, UtteranceId,
};
pub use stt::{create_best_stt, pcm_f32_to_wav, OpenAiStt, PlaceholderStt, SttBackend};
pub use synthesis::{SpeechSynthesis, SynthesisEvent, UtteranceIds};
pub use tts::{OpenAiTts, PlaceholderTts, TtsBackend};
pub use turn::{AudioTurn, TurnConfig, TurnEvent, TurnManager};

#[cfg(feature = "audio")]
pub use audio::{AudioCapture, AudioChunk, AudioConfig};
#[cfg(feature = "audio")]
pub use ear::{EarConfig, MicrophoneCapture};
#[cfg(feature = "audio")]
pub use vad::{VadConfig, VadDetector};
#[cfg(feature = "audio")]
pub use voice_output::SpeakerSynthesis;
