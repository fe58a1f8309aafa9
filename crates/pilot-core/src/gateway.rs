//! Ports the interview loop uses to reach the backend: the session API and the answer gateway.

use crate::api::{AiTriggerRequest, ApiClient};
use crate::error::{ApiResult, GatewayError};
use tracing::warn;

/// Everything the backend needs to answer one interviewer question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerQuery {
    pub session_id: String,
    pub question: String,
    pub position_title: String,
    pub resume_digest: String,
    /// Display name of the interview language (e.g. "English").
    pub language: String,
}

/// Opens and closes interview sessions.
#[async_trait::async_trait]
pub trait SessionBackend: Send + Sync {
    /// Returns the backend-issued session id.
    async fn open_session(&self, user_id: &str, position_title: &str, resume_ref: &str) -> ApiResult<String>;

    async fn close_session(&self, user_id: &str) -> ApiResult<()>;
}

/// Turns an interviewer question into the candidate's answer.
#[async_trait::async_trait]
pub trait AnswerGateway: Send + Sync {
    async fn get_answer(&self, query: &AnswerQuery) -> Result<String, GatewayError>;
}

#[async_trait::async_trait]
impl SessionBackend for ApiClient {
    async fn open_session(&self, user_id: &str, position_title: &str, resume_ref: &str) -> ApiResult<String> {
        self.start_interview(user_id, position_title, resume_ref).await
    }

    async fn close_session(&self, user_id: &str) -> ApiResult<()> {
        self.end_interview(user_id).await
    }
}

#[async_trait::async_trait]
impl AnswerGateway for ApiClient {
    async fn get_answer(&self, query: &AnswerQuery) -> Result<String, GatewayError> {
        let request = AiTriggerRequest {
            interview_id: query.session_id.clone(),
            job_position: query.position_title.clone(),
            prompt: query.question.clone(),
            language: query.language.clone(),
            resume_content: query.resume_digest.clone(),
        };
        self.ai_trigger(&request).await.map_err(|e| {
            let mapped = GatewayError::from(e);
            warn!(kind = ?mapped.kind(), error = %mapped, "aiTrigger failed");
            mapped
        })
    }
}
