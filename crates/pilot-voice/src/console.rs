//! Console adapters: typed lines stand in for the microphone and a paced timer
//! stands in for the speaker. Used by the CLI without `--voice` and in tests.

use crate::capture::{CaptureEvent, SpeechCapture};
use crate::error::{RecognitionError, VoiceResult};
use crate::session::{UtteranceEvent, UtteranceId};
use crate::synthesis::{SpeechSynthesis, SynthesisEvent, UtteranceIds};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

type Subscriber<E> = Mutex<Option<mpsc::UnboundedSender<E>>>;

fn emit<E>(subscriber: &Subscriber<E>, event: E) {
    if let Ok(guard) = subscriber.lock() {
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// Each line fed while listening becomes one final utterance. A blank line is
/// reported as `no-speech`.
#[derive(Default)]
pub struct ConsoleCapture {
    listening: AtomicBool,
    language_tag: Mutex<String>,
    events: Subscriber<CaptureEvent>,
}

impl ConsoleCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Hand one typed line to the recognizer. Returns false if nothing was listening.
    pub fn feed(&self, line: &str) -> bool {
        if !self.listening.swap(false, Ordering::SeqCst) {
            debug!("console capture not listening, line dropped");
            return false;
        }
        let text = line.trim();
        if text.is_empty() {
            emit(&self.events, CaptureEvent::Error(RecognitionError::no_speech()));
        } else {
            emit(
                &self.events,
                CaptureEvent::Result(UtteranceEvent::final_result(text)),
            );
        }
        emit(&self.events, CaptureEvent::Ended);
        true
    }

    /// Language tag of the most recent `start`.
    pub fn language_tag(&self) -> String {
        self.language_tag
            .lock()
            .map(|tag| tag.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl SpeechCapture for ConsoleCapture {
    async fn request_permission(&self) -> bool {
        true
    }

    async fn start(&self, language_tag: &str) -> VoiceResult<()> {
        if let Ok(mut tag) = self.language_tag.lock() {
            *tag = language_tag.to_string();
        }
        self.listening.store(true, Ordering::SeqCst);
        emit(&self.events, CaptureEvent::Started);
        Ok(())
    }

    async fn stop(&self) {
        if self.listening.swap(false, Ordering::SeqCst) {
            emit(&self.events, CaptureEvent::Ended);
        }
    }

    fn subscribe(&self, events: mpsc::UnboundedSender<CaptureEvent>) {
        if let Ok(mut slot) = self.events.lock() {
            *slot = Some(events);
        }
    }
}

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

/// "Speaks" by waiting as long as reading the text aloud would take.
pub struct ConsoleSynthesis {
    words_per_minute: u32,
    ids: UtteranceIds,
    current: Mutex<Option<(UtteranceId, JoinHandle<()>)>>,
    events: Subscriber<SynthesisEvent>,
}

impl ConsoleSynthesis {
    pub fn new(words_per_minute: u32) -> Self {
        Self {
            words_per_minute: words_per_minute.max(1),
            ids: UtteranceIds::new(),
            current: Mutex::new(None),
            events: Mutex::new(None),
        }
    }

    /// Reading time for `text` at the configured pace.
    pub fn reading_time(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count() as u64;
        Duration::from_millis(words * 60_000 / u64::from(self.words_per_minute))
    }

    /// Abort the pending completion, if any. Returns the aborted id.
    fn abort_current(&self) -> Option<UtteranceId> {
        let previous = self.current.lock().ok().and_then(|mut slot| slot.take());
        previous.map(|(id, task)| {
            task.abort();
            id
        })
    }
}

#[async_trait::async_trait]
impl SpeechSynthesis for ConsoleSynthesis {
    async fn speak(&self, text: &str) -> VoiceResult<UtteranceId> {
        if let Some(previous) = self.abort_current() {
            emit(&self.events, SynthesisEvent::Cancelled(previous));
        }
        let id = self.ids.next();
        let delay = self.reading_time(text);
        info!(%id, ?delay, "🔊 speaking");
        emit(&self.events, SynthesisEvent::Started(id));

        let events = self
            .events
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().cloned());
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = events {
                let _ = tx.send(SynthesisEvent::Finished(id));
            }
        });
        if let Ok(mut slot) = self.current.lock() {
            *slot = Some((id, task));
        }
        Ok(id)
    }

    async fn cancel(&self) {
        if let Some(id) = self.abort_current() {
            debug!(%id, "speech cancelled");
            emit(&self.events, SynthesisEvent::Cancelled(id));
        }
    }

    fn subscribe(&self, events: mpsc::UnboundedSender<SynthesisEvent>) {
        if let Ok(mut slot) = self.events.lock() {
            *slot = Some(events);
        }
    }
}
