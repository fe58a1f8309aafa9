//! Interview backend client.
//!
//! Every call is a JSON `POST` with a bearer access token. A `401` triggers one
//! refresh (`POST /v1/refreshToken` with `x-refresh-token`) and one retry of the
//! original call, so callers only ever see [`ApiError::Unauthorized`] once the
//! refresh itself has failed.
//!
//! Responses use the `{success, data, code, error}` envelope; fields are also
//! accepted at the top level.

use crate::config::PilotConfig;
use crate::error::{ApiError, ApiResult};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const REFRESH_PATH: &str = "/v1/refreshToken";

/// Access/refresh token pair held by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Result of `login` / `register`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: Option<String>,
    pub tokens: AuthTokens,
}

/// Arguments of `aiTrigger`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiTriggerRequest {
    pub interview_id: String,
    pub job_position: String,
    pub prompt: String,
    pub language: String,
    pub resume_content: String,
}

pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
    tokens: RwLock<AuthTokens>,
}

impl ApiClient {
    /// Client for `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ApiResult<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ApiError::Config("backend URL is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;
        Ok(Self {
            base_url,
            client,
            tokens: RwLock::new(AuthTokens::default()),
        })
    }

    pub fn from_config(config: &PilotConfig) -> ApiResult<Self> {
        Self::new(config.api_url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn set_tokens(&self, tokens: AuthTokens) {
        *self.tokens.write().await = tokens;
    }

    pub async fn tokens(&self) -> AuthTokens {
        self.tokens.read().await.clone()
    }

    pub async fn login(&self, username: &str, password: &str) -> ApiResult<AuthSession> {
        let body = self
            .post("/userLogin", &json!({ "username": username, "password": password }))
            .await?;
        self.install_session(&body).await
    }

    pub async fn register(&self, username: &str, password: &str) -> ApiResult<AuthSession> {
        let body = self
            .post("/userRegister", &json!({ "username": username, "password": password }))
            .await?;
        self.install_session(&body).await
    }

    /// Open an interview for `user_id`; returns the backend-issued interview id.
    pub async fn start_interview(
        &self,
        user_id: &str,
        position_name: &str,
        resume_ref: &str,
    ) -> ApiResult<String> {
        let body = self
            .post(
                "/startInterview",
                &json!({
                    "userId": user_id,
                    "positionName": position_name,
                    "resumeUrl": resume_ref,
                }),
            )
            .await?;
        let interview_id = envelope_field(&body, "interviewId")
            .and_then(value_to_id)
            .ok_or_else(|| ApiError::Decode("startInterview response has no interviewId".to_string()))?;
        info!(interview_id = %interview_id, "Interview opened");
        Ok(interview_id)
    }

    pub async fn end_interview(&self, user_id: &str) -> ApiResult<()> {
        self.post("/endInterview", &json!({ "userId": user_id })).await?;
        info!(user_id = %user_id, "Interview closed");
        Ok(())
    }

    /// Ask the backend model for an answer to `prompt`.
    pub async fn ai_trigger(&self, request: &AiTriggerRequest) -> ApiResult<String> {
        let payload = serde_json::to_value(request)?;
        let body = self.post("/aiTrigger", &payload).await?;
        let answer = envelope_field(&body, "response")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if answer.is_empty() {
            return Err(ApiError::Backend {
                code: None,
                message: "empty answer".to_string(),
            });
        }
        Ok(answer)
    }

    /// POST with one refresh-and-retry on 401.
    async fn post(&self, path: &str, payload: &Value) -> ApiResult<Value> {
        match self.send(path, payload, None).await {
            Err(ApiError::Unauthorized(reason)) => {
                debug!(path, "401 received, refreshing token");
                if let Err(e) = self.refresh().await {
                    warn!(error = %e, "Token refresh failed");
                    return Err(ApiError::Unauthorized(reason));
                }
                self.send(path, payload, None).await
            }
            other => other,
        }
    }

    /// Exchange the refresh token for a new pair.
    pub async fn refresh(&self) -> ApiResult<AuthTokens> {
        let refresh_token = self
            .tokens
            .read()
            .await
            .refresh_token
            .clone()
            .ok_or_else(|| ApiError::Unauthorized("no refresh token".to_string()))?;
        let body = self
            .send(REFRESH_PATH, &json!({}), Some(&refresh_token))
            .await?;
        let access = envelope_field(&body, "accessToken").and_then(|v| v.as_str());
        let refresh = envelope_field(&body, "refreshToken").and_then(|v| v.as_str());
        match (access, refresh) {
            (Some(a), Some(r)) => {
                let tokens = AuthTokens {
                    access_token: Some(a.to_string()),
                    refresh_token: Some(r.to_string()),
                };
                self.set_tokens(tokens.clone()).await;
                info!("Access token refreshed");
                Ok(tokens)
            }
            _ => Err(ApiError::Unauthorized(
                "refresh response missing tokens".to_string(),
            )),
        }
    }

    async fn send(&self, path: &str, payload: &Value, refresh_token: Option<&str>) -> ApiResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.post(&url).json(payload);
        if let Some(token) = self.tokens.read().await.access_token.as_deref() {
            req = req.bearer_auth(token);
        }
        if let Some(rt) = refresh_token {
            req = req.header("x-refresh-token", rt);
        }

        let res = req.send().await?;
        let status = res.status();
        let text = res.text().await?;
        let body: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.clone()))
        };

        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized(envelope_message(&body).unwrap_or_else(|| text.clone())));
        }
        if let Some(err) = envelope_error(&body) {
            return Err(err);
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(body)
    }

    async fn install_session(&self, body: &Value) -> ApiResult<AuthSession> {
        let access = envelope_field(body, "accessToken")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ApiError::Decode("auth response has no accessToken".to_string()))?;
        let tokens = AuthTokens {
            access_token: Some(access.to_string()),
            refresh_token: envelope_field(body, "refreshToken")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        };
        self.set_tokens(tokens.clone()).await;
        Ok(AuthSession {
            user_id: envelope_field(body, "userId").and_then(value_to_id),
            tokens,
        })
    }
}

/// `data.<name>` or top-level `<name>`.
fn envelope_field<'a>(body: &'a Value, name: &str) -> Option<&'a Value> {
    body.get("data")
        .and_then(|d| d.get(name))
        .or_else(|| body.get(name))
        .filter(|v| !v.is_null())
}

fn envelope_message(body: &Value) -> Option<String> {
    ["error", "message"]
        .iter()
        .find_map(|k| body.get(*k).and_then(|v| v.as_str()))
        .map(str::to_string)
}

/// `{success:false, code, error}` → [`ApiError::Backend`].
fn envelope_error(body: &Value) -> Option<ApiError> {
    let code = body.get("code").and_then(value_to_id);
    let rejected = match body.get("success").and_then(|v| v.as_bool()) {
        Some(success) => !success,
        None => code.is_some(),
    };
    if !rejected {
        return None;
    }
    Some(ApiError::Backend {
        code,
        message: envelope_message(body).unwrap_or_else(|| "request rejected".to_string()),
    })
}

fn value_to_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_field_prefers_data() {
        let body = json!({ "success": true, "data": { "interviewId": 42 }, "interviewId": "outer" });
        assert_eq!(envelope_field(&body, "interviewId").and_then(value_to_id).as_deref(), Some("42"));
        let flat = json!({ "interviewId": "iv-7" });
        assert_eq!(envelope_field(&flat, "interviewId").and_then(value_to_id).as_deref(), Some("iv-7"));
    }

    #[test]
    fn envelope_error_reads_code() {
        let body = json!({ "success": false, "code": "E2003", "error": "Insufficient credits" });
        match envelope_error(&body) {
            Some(ApiError::Backend { code, message }) => {
                assert_eq!(code.as_deref(), Some("E2003"));
                assert_eq!(message, "Insufficient credits");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(envelope_error(&json!({ "success": true, "data": {} })).is_none());
        assert!(envelope_error(&json!({ "success": true, "code": 0 })).is_none());
    }

    #[test]
    fn empty_base_url_is_rejected() {
        assert!(ApiClient::new("  ", Duration::from_secs(1)).is_err());
    }
}
