//! **VoiceOutput**: speaker-backed [`SpeechSynthesis`].
//!
//! Text goes through the TTS backend, the audio is decoded into a fresh
//! `rodio::Sink` per utterance, and a watcher reports `Finished` once the sink
//! drains. `cancel` stops the sink and the watcher stays silent for it.

use crate::error::{VoiceError, VoiceResult};
use crate::session::UtteranceId;
use crate::synthesis::{SpeechSynthesis, SynthesisEvent, UtteranceIds};
use crate::tts::TtsBackend;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

type Subscriber = Arc<Mutex<Option<mpsc::UnboundedSender<SynthesisEvent>>>>;

fn emit(subscriber: &Subscriber, event: SynthesisEvent) {
    if let Ok(guard) = subscriber.lock() {
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(event);
        }
    }
}

/// Current utterance: its id and, once audio is queued, its sink.
type Current = Arc<Mutex<Option<(UtteranceId, Option<Arc<Sink>>)>>>;

fn is_current(current: &Current, id: UtteranceId) -> bool {
    current
        .lock()
        .map(|slot| matches!(slot.as_ref(), Some((cur, _)) if *cur == id))
        .unwrap_or(false)
}

/// Speaker output driven by a TTS backend.
pub struct SpeakerSynthesis {
    tts: Arc<dyn TtsBackend>,
    handle: OutputStreamHandle,
    ids: UtteranceIds,
    current: Current,
    events: Subscriber,
    /// Dropping this ends the thread that owns the output stream.
    _keepalive: std_mpsc::Sender<()>,
}

impl SpeakerSynthesis {
    /// Open the default output device.
    pub fn new(tts: Arc<dyn TtsBackend>) -> VoiceResult<Self> {
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (keepalive, shutdown) = std_mpsc::channel::<()>();
        // OutputStream is not Send; it lives on its own thread.
        thread::Builder::new()
            .name("pilot-speaker".to_string())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    let _ = ready_tx.send(Ok(handle));
                    // blocks until the sender is dropped
                    let _ = shutdown.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(VoiceError::Playback(e.to_string())));
                }
            })?;
        let handle = ready_rx
            .recv()
            .map_err(|_| VoiceError::Playback("output thread exited during startup".to_string()))??;
        info!("🔊 VoiceOutput: output device ready");
        Ok(Self {
            tts,
            handle,
            ids: UtteranceIds::new(),
            current: Arc::new(Mutex::new(None)),
            events: Arc::new(Mutex::new(None)),
            _keepalive: keepalive,
        })
    }

    /// Forget the current utterance and silence its sink. Returns its id.
    fn stop_current(&self) -> Option<UtteranceId> {
        let previous = self.current.lock().ok().and_then(|mut slot| slot.take());
        previous.map(|(id, sink)| {
            if let Some(sink) = sink {
                sink.stop();
            }
            id
        })
    }
}

fn decode_into(handle: &OutputStreamHandle, bytes: Vec<u8>) -> VoiceResult<Sink> {
    let sink = Sink::try_new(handle).map_err(|e| VoiceError::Playback(e.to_string()))?;
    if !bytes.is_empty() {
        let source = rodio::Decoder::new(Cursor::new(bytes))
            .map_err(|e| VoiceError::Playback(format!("Decode failed: {}", e)))?;
        sink.append(source.convert_samples::<f32>());
    }
    Ok(sink)
}

#[async_trait::async_trait]
impl SpeechSynthesis for SpeakerSynthesis {
    async fn speak(&self, text: &str) -> VoiceResult<UtteranceId> {
        if let Some(previous) = self.stop_current() {
            emit(&self.events, SynthesisEvent::Cancelled(previous));
        }
        let id = self.ids.next();
        if let Ok(mut slot) = self.current.lock() {
            *slot = Some((id, None));
        }

        let text = text.to_string();
        let tts = Arc::clone(&self.tts);
        let handle = self.handle.clone();
        let current = Arc::clone(&self.current);
        let events = Arc::clone(&self.events);
        tokio::spawn(async move {
            let bytes = match tts.synthesize(&text).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    if is_current(&current, id) {
                        warn!(%id, "TTS failed: {}", e);
                        emit(&events, SynthesisEvent::Failed { id: Some(id), message: e.to_string() });
                    }
                    return;
                }
            };
            let sink = match decode_into(&handle, bytes) {
                Ok(sink) => Arc::new(sink),
                Err(e) => {
                    if is_current(&current, id) {
                        emit(&events, SynthesisEvent::Failed { id: Some(id), message: e.to_string() });
                    }
                    return;
                }
            };
            {
                let Ok(mut slot) = current.lock() else { return };
                match slot.as_mut() {
                    Some((cur, queued)) if *cur == id => *queued = Some(Arc::clone(&sink)),
                    _ => {
                        // cancelled while synthesizing
                        sink.stop();
                        return;
                    }
                }
            }
            emit(&events, SynthesisEvent::Started(id));

            let playing = Arc::clone(&sink);
            if tokio::task::spawn_blocking(move || playing.sleep_until_end())
                .await
                .is_err()
            {
                return;
            }
            let finished = {
                let Ok(mut slot) = current.lock() else { return };
                match slot.as_ref() {
                    Some((cur, _)) if *cur == id => {
                        *slot = None;
                        true
                    }
                    _ => false,
                }
            };
            if finished {
                emit(&events, SynthesisEvent::Finished(id));
            } else {
                debug!(%id, "playback ended after cancel, no completion sent");
            }
        });
        Ok(id)
    }

    async fn cancel(&self) {
        if let Some(id) = self.stop_current() {
            info!(%id, "⏹️ VoiceOutput: stopped");
            emit(&self.events, SynthesisEvent::Cancelled(id));
        }
    }

    fn subscribe(&self, events: mpsc::UnboundedSender<SynthesisEvent>) {
        if let Ok(mut slot) = self.events.lock() {
            *slot = Some(events);
        }
    }
}
