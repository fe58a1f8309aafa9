//! Interview session data model: the session itself, recognized utterances and
//! synthesis handles.

use chrono::{DateTime, Utc};
use pilot_core::{AnswerQuery, Language};
use serde::Serialize;
use std::fmt;

/// What the user supplies when pressing Start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterviewRequest {
    pub user_id: String,
    pub position_title: String,
    /// Where the backend can find the résumé (upload URL or file name).
    pub resume_ref: String,
    pub resume_digest: String,
    pub language: Language,
}

impl InterviewRequest {
    pub fn new(
        user_id: impl Into<String>,
        position_title: impl Into<String>,
        resume_ref: impl Into<String>,
        resume_digest: impl Into<String>,
        language: Language,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            position_title: position_title.into(),
            resume_ref: resume_ref.into(),
            resume_digest: resume_digest.into(),
            language,
        }
    }
}

/// One question paired with the answer that was read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

/// One continuous interview run, from a confirmed Start until End or failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterviewSession {
    pub session_id: String,
    pub user_id: String,
    pub position_title: String,
    pub resume_digest: String,
    pub language: Language,
    pub is_active: bool,
    turn_history: Vec<Turn>,
}

impl InterviewSession {
    /// Session confirmed by the backend under `session_id`.
    pub fn open(session_id: impl Into<String>, request: &InterviewRequest) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: request.user_id.clone(),
            position_title: request.position_title.clone(),
            resume_digest: request.resume_digest.clone(),
            language: request.language,
            is_active: true,
            turn_history: Vec::new(),
        }
    }

    /// Chronological transcript.
    pub fn turn_history(&self) -> &[Turn] {
        &self.turn_history
    }

    pub fn record_turn(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turn_history.push(Turn {
            question: question.into(),
            answer: answer.into(),
        });
    }

    /// Backend query for `question` in this session's context.
    pub fn answer_query(&self, question: &str) -> AnswerQuery {
        AnswerQuery {
            session_id: self.session_id.clone(),
            question: question.to_string(),
            position_title: self.position_title.clone(),
            resume_digest: self.resume_digest.clone(),
            language: self.language.name.to_string(),
        }
    }
}

/// A unit of recognized speech, partial or final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtteranceEvent {
    pub transcript_text: String,
    pub is_final: bool,
    pub recognized_at: DateTime<Utc>,
}

impl UtteranceEvent {
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            transcript_text: text.into(),
            is_final: false,
            recognized_at: Utc::now(),
        }
    }

    pub fn final_result(text: impl Into<String>) -> Self {
        Self {
            transcript_text: text.into(),
            is_final: true,
            recognized_at: Utc::now(),
        }
    }

    pub fn at(mut self, recognized_at: DateTime<Utc>) -> Self {
        self.recognized_at = recognized_at;
        self
    }
}

/// Adapter-assigned token identifying one `speak()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UtteranceId(pub u64);

impl fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.0)
    }
}

/// The outstanding synthesis the controller is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeechUtteranceHandle {
    pub utterance_id: UtteranceId,
    completed: bool,
}

impl SpeechUtteranceHandle {
    pub fn new(utterance_id: UtteranceId) -> Self {
        Self {
            utterance_id,
            completed: false,
        }
    }

    /// A completion for `id` is stale if a newer `speak()` has been issued since.
    pub fn is_stale(&self, id: UtteranceId) -> bool {
        id != self.utterance_id
    }

    /// Consume the completion for `id`. True only the first time for the current id.
    pub fn complete(&mut self, id: UtteranceId) -> bool {
        if self.is_stale(id) || self.completed {
            return false;
        }
        self.completed = true;
        true
    }
}
