//! **The Ear**: microphone-backed [`SpeechCapture`].
//!
//! Captures the microphone via CPAL in 30ms chunks, runs local WebRTC VAD, and
//! feeds the gap detector. A committed utterance is transcribed by the STT
//! backend and reported as one final result; a silent window is reported as
//! `no-speech`. Each `start` runs one listening window on its own thread (the
//! CPAL stream and the VAD are not `Send`).

use crate::audio::{AudioCapture, AudioChunk, AudioConfig};
use crate::capture::{CaptureEvent, SpeechCapture};
use crate::error::{RecognitionError, VoiceError, VoiceResult};
use crate::session::UtteranceEvent;
use crate::stt::SttBackend;
use crate::turn::{AudioTurn, TurnConfig, TurnEvent, TurnManager};
use crate::vad::{VadConfig, VadDetector};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Configuration for the microphone adapter.
#[derive(Debug, Clone)]
pub struct EarConfig {
    /// Sample rate (default 16000). Must be one WebRTC VAD supports.
    pub sample_rate: u32,
    /// VAD aggressiveness 0-3 (default 2).
    pub vad_mode: u8,
    /// Silence after speech that ends the utterance.
    pub gap: Duration,
    /// Listen window before reporting no speech.
    pub no_speech_timeout: Duration,
    /// Shorter speech bursts are dropped.
    pub min_speech: Duration,
}

impl Default for EarConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            vad_mode: 2,
            gap: Duration::from_millis(2000),
            no_speech_timeout: Duration::from_millis(8000),
            min_speech: Duration::from_millis(200),
        }
    }
}

impl EarConfig {
    pub fn from_pilot(config: &pilot_core::PilotConfig) -> Self {
        Self {
            gap: config.silence_gap(),
            no_speech_timeout: config.no_speech_timeout(),
            ..Default::default()
        }
    }

    fn turn_config(&self) -> TurnConfig {
        TurnConfig {
            silence_threshold: self.gap,
            min_speech_duration: self.min_speech,
            max_turn_duration: Duration::from_secs(30),
            no_speech_timeout: self.no_speech_timeout,
            sample_rate: self.sample_rate,
        }
    }
}

/// How often an idle listening window checks its stop flag.
const STOP_POLL: Duration = Duration::from_millis(10);

type Subscriber = Arc<Mutex<Option<mpsc::UnboundedSender<CaptureEvent>>>>;

/// Next captured chunk, or `None` once `stop` is raised or the stream is gone.
/// The flag is checked even while no audio arrives.
fn next_chunk(rx: &mut mpsc::UnboundedReceiver<AudioChunk>, stop: &AtomicBool) -> Option<AudioChunk> {
    loop {
        if stop.load(Ordering::SeqCst) {
            return None;
        }
        match rx.try_recv() {
            Ok(chunk) => return Some(chunk),
            Err(mpsc::error::TryRecvError::Empty) => thread::sleep(STOP_POLL),
            Err(mpsc::error::TryRecvError::Disconnected) => return None,
        }
    }
}

fn emit(subscriber: &Subscriber, event: CaptureEvent) {
    if let Ok(guard) = subscriber.lock() {
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(event);
        }
    }
}

/// Microphone + VAD + STT speech capture.
pub struct MicrophoneCapture {
    config: EarConfig,
    stt: Arc<dyn SttBackend>,
    runtime: Handle,
    /// Stop flag of the running listening window.
    active: Mutex<Option<Arc<AtomicBool>>>,
    events: Subscriber,
}

impl MicrophoneCapture {
    /// Must be called from within a tokio runtime; transcription runs on it.
    pub fn new(config: EarConfig, stt: Arc<dyn SttBackend>) -> VoiceResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| VoiceError::Config(format!("MicrophoneCapture needs a tokio runtime: {}", e)))?;
        Ok(Self {
            config,
            stt,
            runtime,
            active: Mutex::new(None),
            events: Arc::new(Mutex::new(None)),
        })
    }

    fn halt_current(&self) -> bool {
        let previous = self.active.lock().ok().and_then(|mut slot| slot.take());
        match previous {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl SpeechCapture for MicrophoneCapture {
    async fn request_permission(&self) -> bool {
        match tokio::task::spawn_blocking(AudioCapture::probe).await {
            Ok(granted) => granted,
            Err(e) => {
                warn!("microphone probe failed: {}", e);
                false
            }
        }
    }

    async fn start(&self, language_tag: &str) -> VoiceResult<()> {
        self.halt_current();

        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();
        let window = ListeningWindow {
            config: self.config.clone(),
            language_tag: language_tag.to_string(),
            stt: Arc::clone(&self.stt),
            runtime: self.runtime.clone(),
            stop: Arc::clone(&stop),
            events: Arc::clone(&self.events),
        };
        thread::Builder::new()
            .name("pilot-ear".to_string())
            .spawn(move || window.run(ready_tx))?;

        ready_rx
            .await
            .map_err(|_| VoiceError::AudioStream("capture thread exited during startup".to_string()))??;

        if let Ok(mut slot) = self.active.lock() {
            *slot = Some(stop);
        }
        Ok(())
    }

    async fn stop(&self) {
        if self.halt_current() {
            debug!("Ear: listening stopped");
        }
    }

    fn subscribe(&self, events: mpsc::UnboundedSender<CaptureEvent>) {
        if let Ok(mut slot) = self.events.lock() {
            *slot = Some(events);
        }
    }
}

/// One single-utterance recognition, run on a dedicated thread.
struct ListeningWindow {
    config: EarConfig,
    language_tag: String,
    stt: Arc<dyn SttBackend>,
    runtime: Handle,
    stop: Arc<AtomicBool>,
    events: Subscriber,
}

enum WindowOutcome {
    Utterance(AudioTurn),
    NoSpeech,
    Stopped,
}

impl ListeningWindow {
    fn run(self, ready: oneshot::Sender<VoiceResult<()>>) {
        let (audio_tx, mut audio_rx) = mpsc::unbounded_channel::<AudioChunk>();
        let setup = VadDetector::new(VadConfig {
            sample_rate: self.config.sample_rate,
            mode: self.config.vad_mode,
        })
        .and_then(|vad| {
            let capture = AudioCapture::new(AudioConfig {
                sample_rate: self.config.sample_rate,
                channels: 1,
                buffer_size: vad.chunk_size(),
            })?;
            Ok((vad, capture.start_capture(audio_tx)?))
        });
        let (mut vad, stream) = match setup {
            Ok(parts) => parts,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };
        let _ = ready.send(Ok(()));
        emit(&self.events, CaptureEvent::Started);
        info!(
            "👂 Ear: listening ({}, {:?} gap, {:?} no-speech window)",
            self.language_tag, self.config.gap, self.config.no_speech_timeout
        );

        let (mut turns, mut turn_rx) = TurnManager::new(self.config.turn_config());
        turns.reset(Instant::now());

        let mut outcome = WindowOutcome::Stopped;
        while let Some(chunk) = next_chunk(&mut audio_rx, &self.stop) {
            let is_speech = match vad.is_speech(&chunk.samples) {
                Ok(s) => s,
                Err(e) => {
                    debug!("Ear: VAD skipped chunk: {}", e);
                    continue;
                }
            };
            if let Err(e) = turns.process_vad_result_at(is_speech, &chunk.samples, chunk.timestamp) {
                debug!("Ear: turn manager error: {}", e);
            }
            match turn_rx.try_recv() {
                Ok(TurnEvent::TurnCommitted(turn)) => {
                    outcome = WindowOutcome::Utterance(turn);
                    break;
                }
                Ok(TurnEvent::NoSpeech) => {
                    outcome = WindowOutcome::NoSpeech;
                    break;
                }
                Ok(TurnEvent::SpeechStarted { .. }) | Err(_) => {}
            }
        }
        drop(stream);

        if self.stop.load(Ordering::SeqCst) {
            return;
        }
        match outcome {
            WindowOutcome::Utterance(turn) => {
                let result = self
                    .runtime
                    .block_on(self.stt.transcribe(&turn, &self.language_tag));
                if self.stop.load(Ordering::SeqCst) {
                    return;
                }
                match result {
                    Ok(text) if text.trim().is_empty() => {
                        emit(&self.events, CaptureEvent::Error(RecognitionError::no_speech()))
                    }
                    Ok(text) => emit(
                        &self.events,
                        CaptureEvent::Result(UtteranceEvent::final_result(text)),
                    ),
                    Err(e) => {
                        error!("Ear: transcription failed: {}", e);
                        emit(&self.events, CaptureEvent::Error(RecognitionError::other(e.to_string())));
                    }
                }
            }
            WindowOutcome::NoSpeech => {
                emit(&self.events, CaptureEvent::Error(RecognitionError::no_speech()))
            }
            WindowOutcome::Stopped => {
                emit(
                    &self.events,
                    CaptureEvent::Error(RecognitionError::from_sdk("audio-capture", "microphone stream ended")),
                );
            }
        }
        emit(&self.events, CaptureEvent::Ended);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ear_config_follows_pilot_config() {
        let mut pilot = pilot_core::PilotConfig::default();
        pilot.silence_gap_ms = 1500;
        pilot.no_speech_timeout_ms = 5000;
        let c = EarConfig::from_pilot(&pilot);
        assert_eq!(c.gap, Duration::from_millis(1500));
        assert_eq!(c.no_speech_timeout, Duration::from_millis(5000));
        assert_eq!(c.sample_rate, 16000);

        let t = c.turn_config();
        assert_eq!(t.silence_threshold, Duration::from_millis(1500));
        assert_eq!(t.no_speech_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn halted_window_returns_without_audio() {
        let (tx, mut rx) = mpsc::unbounded_channel::<AudioChunk>();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let halter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            flag.store(true, Ordering::SeqCst);
        });

        let started = Instant::now();
        assert!(next_chunk(&mut rx, &stop).is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
        halter.join().unwrap();
        drop(tx);
    }

    #[test]
    fn chunks_flow_until_stream_ends() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let stop = AtomicBool::new(false);
        tx.send(AudioChunk {
            samples: vec![0.0; 480],
            timestamp: Instant::now(),
        })
        .unwrap();
        drop(tx);
        assert_eq!(next_chunk(&mut rx, &stop).map(|c| c.samples.len()), Some(480));
        assert!(next_chunk(&mut rx, &stop).is_none());
    }
}
