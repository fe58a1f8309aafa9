//! End-of-utterance detection for the microphone adapter.
//!
//! Implements the gap logic: an utterance is over once speech has been followed
//! by `silence_threshold` of silence. If nobody speaks within `no_speech_timeout`
//! the window closes with [`TurnEvent::NoSpeech`].

use crate::error::{VoiceError, VoiceResult};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A completed utterance: buffered PCM from speech start until the gap.
#[derive(Debug, Clone)]
pub struct AudioTurn {
    /// PCM samples (f32, -1.0..1.0) for the full utterance.
    pub samples: Vec<f32>,
    /// When the utterance was committed.
    pub timestamp: DateTime<Utc>,
    /// Approximate speech duration.
    pub duration: Duration,
    pub sample_rate: u32,
}

/// Events emitted by the turn manager
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// User started speaking
    SpeechStarted { timestamp: DateTime<Utc> },

    /// Utterance is committed (ready for transcription)
    TurnCommitted(AudioTurn),

    /// The listening window closed without any speech
    NoSpeech,
}

/// Configuration for turn detection
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Silence after speech that ends the utterance (default: 2s)
    pub silence_threshold: Duration,

    /// Minimum speech duration to count as an utterance (default: 200ms)
    pub min_speech_duration: Duration,

    /// Maximum utterance length before auto-commit (default: 30s)
    pub max_turn_duration: Duration,

    /// Listen window before reporting no speech (default: 8s)
    pub no_speech_timeout: Duration,

    /// Sample rate for audio (default: 16000 Hz)
    pub sample_rate: u32,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            silence_threshold: Duration::from_millis(2000),
            min_speech_duration: Duration::from_millis(200),
            max_turn_duration: Duration::from_secs(30),
            no_speech_timeout: Duration::from_millis(8000),
            sample_rate: 16000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TurnState {
    Idle,
    Speaking,
    SilenceDetected,
    /// Window closed (committed or no speech); chunks are ignored until `reset`.
    Closed,
}

/// Turns per-chunk VAD decisions into at most one utterance per listening window.
pub struct TurnManager {
    config: TurnConfig,
    state: TurnState,

    window_start: Instant,
    speech_start: Option<Instant>,
    last_speech_time: Option<Instant>,

    audio_buffer: Vec<f32>,

    event_tx: mpsc::UnboundedSender<TurnEvent>,
}

impl TurnManager {
    /// Create a new turn manager; the first listening window opens now.
    pub fn new(config: TurnConfig) -> (Self, mpsc::UnboundedReceiver<TurnEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let manager = Self {
            config,
            state: TurnState::Idle,
            window_start: Instant::now(),
            speech_start: None,
            last_speech_time: None,
            audio_buffer: Vec::new(),
            event_tx,
        };

        (manager, event_rx)
    }

    /// Open a fresh listening window at `now`.
    pub fn reset(&mut self, now: Instant) {
        self.state = TurnState::Idle;
        self.window_start = now;
        self.speech_start = None;
        self.last_speech_time = None;
        self.audio_buffer.clear();
    }

    /// Feed the VAD decision for one chunk captured at `now`.
    pub fn process_vad_result_at(
        &mut self,
        is_speech: bool,
        audio_chunk: &[f32],
        now: Instant,
    ) -> VoiceResult<()> {
        match (self.state, is_speech) {
            (TurnState::Closed, _) => {}

            // Idle -> Speaking: user started talking
            (TurnState::Idle, true) => {
                info!("🎤 Speech started");
                self.state = TurnState::Speaking;
                self.speech_start = Some(now);
                self.last_speech_time = Some(now);
                self.audio_buffer.clear();
                self.audio_buffer.extend_from_slice(audio_chunk);

                self.emit_event(TurnEvent::SpeechStarted {
                    timestamp: Utc::now(),
                })?;
            }

            // Idle -> Idle: nobody talking yet
            (TurnState::Idle, false) => {
                if now.duration_since(self.window_start) >= self.config.no_speech_timeout {
                    debug!("🤫 No speech within {:?}", self.config.no_speech_timeout);
                    self.state = TurnState::Closed;
                    self.emit_event(TurnEvent::NoSpeech)?;
                }
            }

            (TurnState::Speaking, true) => {
                self.last_speech_time = Some(now);
                self.audio_buffer.extend_from_slice(audio_chunk);

                if let Some(start) = self.speech_start {
                    if now.duration_since(start) >= self.config.max_turn_duration {
                        warn!("⏱️ Max utterance duration reached, auto-committing");
                        return self.commit_turn(now);
                    }
                }
            }

            // Speaking -> SilenceDetected: user paused
            (TurnState::Speaking, false) => {
                debug!("🤫 Silence detected");
                self.state = TurnState::SilenceDetected;
                self.audio_buffer.extend_from_slice(audio_chunk);
            }

            // SilenceDetected -> Speaking: false alarm
            (TurnState::SilenceDetected, true) => {
                debug!("🎤 Speech resumed");
                self.state = TurnState::Speaking;
                self.last_speech_time = Some(now);
                self.audio_buffer.extend_from_slice(audio_chunk);
            }

            (TurnState::SilenceDetected, false) => {
                self.audio_buffer.extend_from_slice(audio_chunk);
                if let Some(last_speech) = self.last_speech_time {
                    if now.duration_since(last_speech) >= self.config.silence_threshold {
                        info!("✅ Silence threshold reached, committing utterance");
                        return self.commit_turn(now);
                    }
                }
            }
        }

        Ok(())
    }

    fn commit_turn(&mut self, now: Instant) -> VoiceResult<()> {
        let speech = match (self.speech_start, self.last_speech_time) {
            (Some(start), Some(last)) => last.duration_since(start),
            _ => Duration::ZERO,
        };

        if speech < self.config.min_speech_duration {
            debug!("⏭️ Speech too short ({:?}), ignoring", speech);
            let window_start = self.window_start;
            self.reset(now);
            // a blip does not restart the no-speech window
            self.window_start = window_start;
            return Ok(());
        }

        info!(
            "🎯 Utterance committed: {:?} speech, {} samples",
            speech,
            self.audio_buffer.len()
        );

        let turn = AudioTurn {
            samples: std::mem::take(&mut self.audio_buffer),
            timestamp: Utc::now(),
            duration: speech,
            sample_rate: self.config.sample_rate,
        };
        self.state = TurnState::Closed;
        self.emit_event(TurnEvent::TurnCommitted(turn))
    }

    fn emit_event(&self, event: TurnEvent) -> VoiceResult<()> {
        self.event_tx
            .send(event)
            .map_err(|e| VoiceError::ChannelSend(e.to_string()))
    }

    /// Get the current state (for testing/debugging)
    pub fn state(&self) -> &str {
        match self.state {
            TurnState::Idle => "idle",
            TurnState::Speaking => "speaking",
            TurnState::SilenceDetected => "silence_detected",
            TurnState::Closed => "closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TurnConfig {
        TurnConfig {
            silence_threshold: Duration::from_millis(100),
            min_speech_duration: Duration::from_millis(50),
            max_turn_duration: Duration::from_secs(5),
            no_speech_timeout: Duration::from_millis(300),
            sample_rate: 16000,
        }
    }

    fn ms(base: Instant, n: u64) -> Instant {
        base + Duration::from_millis(n)
    }

    #[test]
    fn speech_then_gap_commits_once() {
        let (mut manager, mut rx) = TurnManager::new(config());
        let t = Instant::now();
        manager.reset(t);
        let chunk = vec![0.5f32; 480]; // 30ms at 16kHz

        manager.process_vad_result_at(true, &chunk, ms(t, 0)).unwrap();
        assert!(matches!(rx.try_recv().unwrap(), TurnEvent::SpeechStarted { .. }));
        assert_eq!(manager.state(), "speaking");

        manager.process_vad_result_at(true, &chunk, ms(t, 30)).unwrap();
        manager.process_vad_result_at(true, &chunk, ms(t, 60)).unwrap();
        manager.process_vad_result_at(false, &chunk, ms(t, 90)).unwrap();
        assert_eq!(manager.state(), "silence_detected");
        manager.process_vad_result_at(false, &chunk, ms(t, 120)).unwrap();
        assert!(rx.try_recv().is_err());

        manager.process_vad_result_at(false, &chunk, ms(t, 170)).unwrap();
        match rx.try_recv().unwrap() {
            TurnEvent::TurnCommitted(turn) => {
                assert_eq!(turn.duration, Duration::from_millis(60));
                assert_eq!(turn.samples.len(), 480 * 6);
                assert_eq!(turn.sample_rate, 16000);
            }
            other => panic!("expected commit, got {:?}", other),
        }
        assert_eq!(manager.state(), "closed");

        // nothing more until the window is reopened
        manager.process_vad_result_at(true, &chunk, ms(t, 200)).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn resumed_speech_is_not_a_gap() {
        let (mut manager, mut rx) = TurnManager::new(config());
        let t = Instant::now();
        manager.reset(t);
        let chunk = vec![0.1f32; 480];

        manager.process_vad_result_at(true, &chunk, ms(t, 0)).unwrap();
        manager.process_vad_result_at(false, &chunk, ms(t, 30)).unwrap();
        manager.process_vad_result_at(true, &chunk, ms(t, 80)).unwrap();
        manager.process_vad_result_at(false, &chunk, ms(t, 110)).unwrap();
        manager.process_vad_result_at(false, &chunk, ms(t, 150)).unwrap();
        assert_eq!(manager.state(), "silence_detected");
        let _started = rx.try_recv().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn silent_window_reports_no_speech() {
        let (mut manager, mut rx) = TurnManager::new(config());
        let t = Instant::now();
        manager.reset(t);
        let chunk = vec![0.0f32; 480];

        manager.process_vad_result_at(false, &chunk, ms(t, 100)).unwrap();
        assert!(rx.try_recv().is_err());
        manager.process_vad_result_at(false, &chunk, ms(t, 300)).unwrap();
        assert!(matches!(rx.try_recv().unwrap(), TurnEvent::NoSpeech));
        manager.process_vad_result_at(false, &chunk, ms(t, 700)).unwrap();
        assert!(rx.try_recv().is_err());

        manager.reset(ms(t, 800));
        assert_eq!(manager.state(), "idle");
    }

    #[test]
    fn blip_is_dropped_and_window_keeps_running() {
        let (mut manager, mut rx) = TurnManager::new(config());
        let t = Instant::now();
        manager.reset(t);
        let chunk = vec![0.3f32; 480];

        manager.process_vad_result_at(true, &chunk, ms(t, 0)).unwrap();
        manager.process_vad_result_at(false, &chunk, ms(t, 30)).unwrap();
        manager.process_vad_result_at(false, &chunk, ms(t, 140)).unwrap();
        let _started = rx.try_recv().unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(manager.state(), "idle");

        manager.process_vad_result_at(false, &chunk, ms(t, 310)).unwrap();
        assert!(matches!(rx.try_recv().unwrap(), TurnEvent::NoSpeech));
    }
}
