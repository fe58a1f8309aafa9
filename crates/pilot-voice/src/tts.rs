//! **Text-to-Speech (TTS)**: turn answer text into playable audio bytes.

use crate::error::{VoiceError, VoiceResult};
use pilot_core::Language;
use std::time::Duration;

/// Backend that turns text into audio bytes (MP3/WAV).
#[async_trait::async_trait]
pub trait TtsBackend: Send + Sync {
    /// Synthesize text. An empty vec means nothing to play.
    async fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>>;
}

/// Placeholder TTS: returns empty audio so nothing plays.
#[derive(Debug, Default)]
pub struct PlaceholderTts;

#[async_trait::async_trait]
impl TtsBackend for PlaceholderTts {
    async fn synthesize(&self, _text: &str) -> VoiceResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Production TTS backend: OpenAI-compatible `/audio/speech`.
/// Uses `TTS_API_URL`, `TTS_API_KEY` (or `OPENAI_API_KEY`) and `TTS_MODEL` (default tts-1).
#[derive(Debug, Clone)]
pub struct OpenAiTts {
    /// Base URL without trailing slash.
    pub base_url: String,
    pub api_key: String,
    /// tts-1 (fast) or tts-1-hd.
    pub model: String,
    /// alloy, echo, fable, onyx, nova, shimmer.
    pub voice: String,
    client: reqwest::Client,
}

impl OpenAiTts {
    /// Build from environment; the voice follows the interview language unless `TTS_VOICE` is set.
    pub fn from_env(language: Language) -> VoiceResult<Self> {
        let base_url = std::env::var("TTS_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("TTS_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| VoiceError::Config("TTS requires TTS_API_KEY or OPENAI_API_KEY".to_string()))?;
        let model = std::env::var("TTS_MODEL").unwrap_or_else(|_| "tts-1".to_string());
        let tts = Self::new(base_url, api_key, model, language)?;
        Ok(match std::env::var("TTS_VOICE") {
            Ok(voice) if !voice.trim().is_empty() => tts.with_voice(voice.trim()),
            _ => tts,
        })
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        language: Language,
    ) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            voice: language.tts_voice().to_string(),
            client,
        })
    }

    /// Set a fixed voice instead of the language default.
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }
}

#[async_trait::async_trait]
impl TtsBackend for OpenAiTts {
    async fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res.bytes().await.map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
