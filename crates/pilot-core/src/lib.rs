//! # Interview Pilot core
//!
//! Configuration, the supported-language table, résumé digests and the client for
//! the interview backend. The backend is reached through two ports,
//! [`SessionBackend`] and [`AnswerGateway`], both implemented by [`ApiClient`].

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod language;
pub mod resume;

pub use api::{AiTriggerRequest, ApiClient, AuthSession, AuthTokens};
pub use config::{env_opt_string, PilotConfig};
pub use error::{ApiError, ApiResult, GatewayError, GatewayErrorKind, INSUFFICIENT_CREDITS_CODE};
pub use gateway::{AnswerGateway, AnswerQuery, SessionBackend};
pub use language::{Language, DEFAULT_LANGUAGE, SUPPORTED_LANGUAGES};
pub use resume::{docx_text, extract_text, load_resume_digest, resume_digest, ResumeFormat};
