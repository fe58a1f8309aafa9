//! Turn controller: the interview state machine.
//!
//! The controller is a pure reducer. Every external happening (button press,
//! recognizer result, backend reply, synthesis callback) arrives as a
//! [`ControllerEvent`]; [`TurnController::handle`] updates the state and returns
//! the [`Effect`]s the runtime must carry out. Nothing in here touches a device,
//! the network or a clock, so the whole loop is testable without hardware.
//!
//! ```text
//!  Idle ──Start──▶ Starting ──permission + session──▶ Listening
//!                                                       │  ▲
//!                                     final utterance   │  │ synthesis finished (current id)
//!                                                       ▼  │ transient gateway error
//!                                                  Answering ──answer──▶ Speaking
//! ```
//!
//! Stop from any non-idle phase tears down and returns to `Idle`. Fatal errors do
//! the same and additionally raise an alert.

use crate::error::{InterviewError, RecognitionError, RecognitionErrorKind};
use crate::session::{
    InterviewRequest, InterviewSession, SpeechUtteranceHandle, Turn, UtteranceEvent, UtteranceId,
};
use chrono::{DateTime, Utc};
use pilot_core::{AnswerQuery, GatewayError};
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Logical phase of the interview loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No session. Start is the only meaningful action.
    #[default]
    Idle,
    /// Start pressed; waiting on microphone permission and the backend session.
    Starting,
    /// Capture active, waiting for a final utterance.
    Listening,
    /// Gateway call in flight for the last final utterance.
    Answering,
    /// Answer handed to synthesis; waiting for its completion.
    Speaking,
}

impl Phase {
    /// True for every phase except `Idle`.
    pub fn is_engaged(&self) -> bool {
        !matches!(self, Phase::Idle)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Starting => "starting",
            Phase::Listening => "listening",
            Phase::Answering => "answering",
            Phase::Speaking => "speaking",
        };
        f.write_str(s)
    }
}

/// Inputs to the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    StartPressed(InterviewRequest),
    StopPressed,
    /// The single Start/End control: starts when idle, stops otherwise.
    TogglePressed(InterviewRequest),
    PermissionResolved {
        attempt: u64,
        granted: bool,
    },
    SessionOpened {
        attempt: u64,
        user_id: String,
        result: Result<String, String>,
    },
    Utterance(UtteranceEvent),
    RecognitionFailed(RecognitionError),
    AnswerReceived {
        turn: u64,
        result: Result<String, GatewayError>,
    },
    /// `speak()` returned this id for the most recent `Speak` effect.
    SpeechIssued(UtteranceId),
    SpeechFinished(UtteranceId),
    SpeechFailed {
        id: Option<UtteranceId>,
        message: String,
    },
}

/// Work the runtime performs on the controller's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    RequestPermission { attempt: u64 },
    OpenSession { attempt: u64, request: InterviewRequest },
    StartCapture { language_tag: String },
    StopCapture,
    RequestAnswer { turn: u64, query: AnswerQuery },
    Speak { text: String },
    CancelSpeech,
    CloseSession { user_id: String },
    Alert(InterviewError),
}

/// Read-only view published to observers after every event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub is_active: bool,
    pub session_id: Option<String>,
    pub turns: Vec<Turn>,
    pub partial_transcript: String,
    #[serde(skip)]
    pub last_error: Option<InterviewError>,
}

/// The interview state machine. Owns the session exclusively.
#[derive(Debug, Default)]
pub struct TurnController {
    phase: Phase,
    /// Bumped on every Start and every Stop during `Starting`; stale
    /// permission/session replies carry an older number.
    attempt: u64,
    pending_request: Option<InterviewRequest>,
    session: Option<InterviewSession>,
    /// Bumped per submitted question for the controller's whole life, never per
    /// session; stale answers carry an older number.
    turn_seq: u64,
    pending_question: Option<String>,
    current_utterance: Option<SpeechUtteranceHandle>,
    /// Start of the current listening window. Utterances recognized earlier belong
    /// to a previous window and are dropped.
    listening_since: Option<DateTime<Utc>>,
    partial_transcript: String,
    last_error: Option<InterviewError>,
}

impl TurnController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.session.as_ref().map(|s| s.is_active).unwrap_or(false)
    }

    pub fn session(&self) -> Option<&InterviewSession> {
        self.session.as_ref()
    }

    pub fn turn_history(&self) -> &[Turn] {
        self.session
            .as_ref()
            .map(|s| s.turn_history())
            .unwrap_or(&[])
    }

    pub fn current_utterance(&self) -> Option<UtteranceId> {
        self.current_utterance.map(|h| h.utterance_id)
    }

    pub fn last_error(&self) -> Option<&InterviewError> {
        self.last_error.as_ref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            is_active: self.is_active(),
            session_id: self.session.as_ref().map(|s| s.session_id.clone()),
            turns: self.turn_history().to_vec(),
            partial_transcript: self.partial_transcript.clone(),
            last_error: self.last_error.clone(),
        }
    }

    /// Apply one event. The state is fully updated before this returns.
    pub fn handle(&mut self, event: ControllerEvent, now: DateTime<Utc>) -> Vec<Effect> {
        match event {
            ControllerEvent::StartPressed(request) => self.on_start(request),
            ControllerEvent::StopPressed => self.on_stop(),
            ControllerEvent::TogglePressed(request) => {
                if self.phase.is_engaged() {
                    self.on_stop()
                } else {
                    self.on_start(request)
                }
            }
            ControllerEvent::PermissionResolved { attempt, granted } => {
                self.on_permission(attempt, granted)
            }
            ControllerEvent::SessionOpened {
                attempt,
                user_id,
                result,
            } => self.on_session_opened(attempt, user_id, result, now),
            ControllerEvent::Utterance(utterance) => self.on_utterance(utterance, now),
            ControllerEvent::RecognitionFailed(err) => self.on_recognition_error(err, now),
            ControllerEvent::AnswerReceived { turn, result } => self.on_answer(turn, result, now),
            ControllerEvent::SpeechIssued(id) => self.on_speech_issued(id),
            ControllerEvent::SpeechFinished(id) => self.on_speech_finished(id, now),
            ControllerEvent::SpeechFailed { id, message } => self.on_speech_failed(id, message),
        }
    }

    // ------------------------------------------------------------------
    // Start / stop
    // ------------------------------------------------------------------

    fn on_start(&mut self, request: InterviewRequest) -> Vec<Effect> {
        if self.phase.is_engaged() {
            debug!(phase = %self.phase, "start ignored, interview already running");
            return Vec::new();
        }
        self.attempt += 1;
        self.phase = Phase::Starting;
        self.last_error = None;
        self.partial_transcript.clear();
        info!(attempt = self.attempt, position = %request.position_title, "interview starting");
        self.pending_request = Some(request);
        vec![Effect::RequestPermission {
            attempt: self.attempt,
        }]
    }

    fn on_stop(&mut self) -> Vec<Effect> {
        match self.phase {
            Phase::Idle => {
                debug!("stop ignored, already idle");
                Vec::new()
            }
            Phase::Starting => {
                // Invalidate the in-flight attempt; a late successful open is closed then.
                self.attempt += 1;
                self.pending_request = None;
                self.phase = Phase::Idle;
                info!("interview start cancelled");
                Vec::new()
            }
            _ => {
                info!(turns = self.turn_history().len(), "interview ended by user");
                self.teardown()
            }
        }
    }

    fn on_permission(&mut self, attempt: u64, granted: bool) -> Vec<Effect> {
        if self.phase != Phase::Starting || attempt != self.attempt {
            debug!(attempt, current = self.attempt, "stale permission result ignored");
            return Vec::new();
        }
        if !granted {
            self.pending_request = None;
            self.phase = Phase::Idle;
            return self.raise(InterviewError::PermissionDenied, Vec::new());
        }
        match self.pending_request.clone() {
            Some(request) => vec![Effect::OpenSession { attempt, request }],
            None => {
                self.phase = Phase::Idle;
                Vec::new()
            }
        }
    }

    fn on_session_opened(
        &mut self,
        attempt: u64,
        user_id: String,
        result: Result<String, String>,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        if self.phase != Phase::Starting || attempt != self.attempt {
            return match result {
                Ok(session_id) => {
                    debug!(%session_id, "session opened after start was abandoned, closing it");
                    vec![Effect::CloseSession { user_id }]
                }
                Err(_) => Vec::new(),
            };
        }
        let request = match self.pending_request.take() {
            Some(request) => request,
            None => {
                self.phase = Phase::Idle;
                return Vec::new();
            }
        };
        match result {
            Ok(session_id) => {
                info!(%session_id, language = request.language.code, "🎙️ interview session open");
                let session = InterviewSession::open(session_id, &request);
                let language_tag = session.language.recognition_tag.to_string();
                self.session = Some(session);
                self.begin_listening(now);
                vec![Effect::StartCapture { language_tag }]
            }
            Err(message) => {
                self.phase = Phase::Idle;
                self.raise(InterviewError::SessionOpen(message), Vec::new())
            }
        }
    }

    // ------------------------------------------------------------------
    // Capture
    // ------------------------------------------------------------------

    fn on_utterance(&mut self, utterance: UtteranceEvent, now: DateTime<Utc>) -> Vec<Effect> {
        if self.phase != Phase::Listening {
            debug!(phase = %self.phase, is_final = utterance.is_final, "utterance outside listening discarded");
            return Vec::new();
        }
        if let Some(since) = self.listening_since {
            if utterance.recognized_at < since {
                debug!("utterance from a previous listening window discarded");
                return Vec::new();
            }
        }
        if !utterance.is_final {
            self.partial_transcript = utterance.transcript_text;
            return Vec::new();
        }

        let question = utterance.transcript_text.trim().to_string();
        self.partial_transcript.clear();
        if question.is_empty() {
            debug!("empty final transcript, listening again");
            return self.restart_capture(now);
        }
        let query = match self.session.as_ref() {
            Some(session) => session.answer_query(&question),
            None => return Vec::new(),
        };
        self.turn_seq += 1;
        self.phase = Phase::Answering;
        info!(turn = self.turn_seq, %question, "question captured");
        self.pending_question = Some(question);
        vec![
            Effect::StopCapture,
            Effect::RequestAnswer {
                turn: self.turn_seq,
                query,
            },
        ]
    }

    fn on_recognition_error(&mut self, err: RecognitionError, now: DateTime<Utc>) -> Vec<Effect> {
        if self.phase != Phase::Listening {
            debug!(phase = %self.phase, error = %err, "recognition error outside listening ignored");
            return Vec::new();
        }
        match err.kind {
            RecognitionErrorKind::NoSpeech => {
                debug!("no speech, restarting capture");
                self.restart_capture(now)
            }
            RecognitionErrorKind::Other => self.fail(InterviewError::Recognition(err)),
        }
    }

    // ------------------------------------------------------------------
    // Gateway
    // ------------------------------------------------------------------

    fn on_answer(
        &mut self,
        turn: u64,
        result: Result<String, GatewayError>,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        if self.phase != Phase::Answering || turn != self.turn_seq {
            debug!(turn, current = self.turn_seq, "stale answer ignored");
            return Vec::new();
        }
        let question = self.pending_question.take().unwrap_or_default();
        match result {
            Ok(answer) => {
                if let Some(session) = self.session.as_mut() {
                    session.record_turn(question, answer.clone());
                }
                self.phase = Phase::Speaking;
                self.current_utterance = None;
                vec![Effect::Speak { text: answer }]
            }
            Err(err) if err.is_recoverable() => {
                warn!(turn, error = %err, "answer failed, listening again");
                self.restart_capture(now)
            }
            Err(err) => self.fail(InterviewError::Gateway(err)),
        }
    }

    // ------------------------------------------------------------------
    // Synthesis
    // ------------------------------------------------------------------

    fn on_speech_issued(&mut self, id: UtteranceId) -> Vec<Effect> {
        if self.phase != Phase::Speaking {
            debug!(%id, "speech issued outside speaking ignored");
            return Vec::new();
        }
        if let Some(previous) = self.current_utterance {
            debug!(previous = %previous.utterance_id, %id, "newer utterance supersedes previous");
        }
        self.current_utterance = Some(SpeechUtteranceHandle::new(id));
        Vec::new()
    }

    fn on_speech_finished(&mut self, id: UtteranceId, now: DateTime<Utc>) -> Vec<Effect> {
        if self.phase != Phase::Speaking {
            debug!(%id, phase = %self.phase, "late synthesis completion ignored");
            return Vec::new();
        }
        let completed = self
            .current_utterance
            .as_mut()
            .map(|handle| handle.complete(id))
            .unwrap_or(false);
        if !completed {
            debug!(%id, current = ?self.current_utterance(), "stale or duplicate synthesis completion ignored");
            return Vec::new();
        }
        self.current_utterance = None;
        self.restart_capture(now)
    }

    fn on_speech_failed(&mut self, id: Option<UtteranceId>, message: String) -> Vec<Effect> {
        if self.phase != Phase::Speaking {
            return Vec::new();
        }
        if let (Some(id), Some(handle)) = (id, self.current_utterance) {
            if handle.is_stale(id) {
                debug!(%id, "stale synthesis failure ignored");
                return Vec::new();
            }
        }
        self.fail(InterviewError::Synthesis(message))
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn begin_listening(&mut self, now: DateTime<Utc>) {
        self.phase = Phase::Listening;
        self.listening_since = Some(now);
        self.partial_transcript.clear();
    }

    fn restart_capture(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        let language_tag = match self.session.as_ref() {
            Some(session) => session.language.recognition_tag.to_string(),
            None => return Vec::new(),
        };
        self.begin_listening(now);
        vec![Effect::StartCapture { language_tag }]
    }

    /// Stop everything the session owns and drop the session.
    fn teardown(&mut self) -> Vec<Effect> {
        let mut effects = vec![Effect::CancelSpeech, Effect::StopCapture];
        if let Some(session) = self.session.take() {
            effects.push(Effect::CloseSession {
                user_id: session.user_id,
            });
        }
        self.phase = Phase::Idle;
        self.pending_request = None;
        self.pending_question = None;
        self.current_utterance = None;
        self.listening_since = None;
        self.partial_transcript.clear();
        effects
    }

    fn fail(&mut self, err: InterviewError) -> Vec<Effect> {
        error!(phase = %self.phase, error = %err, "interview aborted");
        let effects = self.teardown();
        self.raise(err, effects)
    }

    fn raise(&mut self, err: InterviewError, mut effects: Vec<Effect>) -> Vec<Effect> {
        self.last_error = Some(err.clone());
        effects.push(Effect::Alert(err));
        effects
    }
}
