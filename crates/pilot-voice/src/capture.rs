//! Speech capture adapter contract.
//!
//! Adapters are state-agnostic: they emit whatever the recognizer produces and
//! leave filtering to the turn controller.

use crate::error::{RecognitionError, VoiceResult};
use crate::session::UtteranceEvent;
use tokio::sync::mpsc;

/// Recognizer event stream (`start`, `end`, `result`, `error`).
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Started,
    Ended,
    Result(UtteranceEvent),
    Error(RecognitionError),
}

/// Microphone + recognizer. One recognition is single-utterance: after a final
/// result (or an error) the adapter stops on its own and must be started again.
#[async_trait::async_trait]
pub trait SpeechCapture: Send + Sync {
    /// Ask for microphone access. Any failure counts as not granted.
    async fn request_permission(&self) -> bool;

    /// Begin one single-utterance recognition in `language_tag` (e.g. `en-US`).
    async fn start(&self, language_tag: &str) -> VoiceResult<()>;

    /// Stop recognizing. Safe to call when not started.
    async fn stop(&self);

    /// Register the one consumer of recognizer events.
    fn subscribe(&self, events: mpsc::UnboundedSender<CaptureEvent>);
}
