//! Speech synthesis adapter contract.

use crate::error::VoiceResult;
use crate::session::UtteranceId;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// TTS event stream (`tts-start`, `tts-finish`, `tts-cancel`, failures).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    Started(UtteranceId),
    Finished(UtteranceId),
    Cancelled(UtteranceId),
    Failed {
        id: Option<UtteranceId>,
        message: String,
    },
}

/// Text-to-speech output. At most one utterance plays at a time.
#[async_trait::async_trait]
pub trait SpeechSynthesis: Send + Sync {
    /// Cancel whatever is playing, start `text`, and return its id without waiting
    /// for playback to finish. Completion arrives later as [`SynthesisEvent::Finished`].
    async fn speak(&self, text: &str) -> VoiceResult<UtteranceId>;

    /// Stop the current utterance. No `Finished` event is sent for it.
    async fn cancel(&self);

    /// Register the one consumer of synthesis events.
    fn subscribe(&self, events: mpsc::UnboundedSender<SynthesisEvent>);
}

/// Monotonic utterance id source shared by the synthesis adapters.
#[derive(Debug, Default)]
pub struct UtteranceIds(AtomicU64);

impl UtteranceIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// `u1`, `u2`, ...
    pub fn next(&self) -> UtteranceId {
        UtteranceId(self.0.fetch_add(1, Ordering::SeqCst) + 1)
    }
}
