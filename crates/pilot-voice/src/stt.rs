//! **Speech-to-Text (STT)**: turn an [`AudioTurn`] into a transcript.
//!
//! `OpenAiStt` talks to any OpenAI-compatible `/audio/transcriptions` endpoint;
//! `PlaceholderStt` returns a fixed string for wiring the loop without an API.

use crate::error::{VoiceError, VoiceResult};
use crate::turn::AudioTurn;
use std::time::Duration;

/// Backend for converting PCM to text.
#[async_trait::async_trait]
pub trait SttBackend: Send + Sync {
    /// Transcribe one utterance. PCM is mono f32; empty string if nothing was said.
    /// `language_tag` is a recognizer locale such as `en-US`.
    async fn transcribe(&self, turn: &AudioTurn, language_tag: &str) -> VoiceResult<String>;
}

/// Encode f32 PCM (mono) to 16-bit WAV bytes for API upload.
pub fn pcm_f32_to_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32; // 16-bit = 2 bytes per sample
    let header_len = 44u32;
    let file_len = header_len + data_len;

    let mut buf = Vec::with_capacity(file_len as usize);
    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(file_len - 8).to_le_bytes());
    buf.extend_from_slice(b"WAVE");
    // fmt subchunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // subchunk1 size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&1u16.to_le_bytes()); // mono
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    buf.extend_from_slice(&2u16.to_le_bytes()); // block align
    buf.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    // data subchunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &s in samples {
        let clamped = s.clamp(-1.0, 1.0);
        let i = (clamped * 32767.0).round() as i16;
        buf.extend_from_slice(&i.to_le_bytes());
    }
    buf
}

/// ISO-639-1 part of a recognizer locale: `zh-CN` -> `zh`.
fn language_hint(language_tag: &str) -> Option<String> {
    let primary = language_tag.split(['-', '_']).next()?.trim();
    if primary.is_empty() {
        None
    } else {
        Some(primary.to_ascii_lowercase())
    }
}

/// Placeholder STT: returns a fixed string.
#[derive(Debug, Default)]
pub struct PlaceholderStt {
    /// If set, return this instead of the default message.
    pub response: Option<String>,
}

impl PlaceholderStt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(s: impl Into<String>) -> Self {
        Self {
            response: Some(s.into()),
        }
    }
}

#[async_trait::async_trait]
impl SttBackend for PlaceholderStt {
    async fn transcribe(&self, turn: &AudioTurn, _language_tag: &str) -> VoiceResult<String> {
        if let Some(ref r) = self.response {
            return Ok(r.clone());
        }
        Ok(format!(
            "[STT placeholder: {} samples, {:.1}s]",
            turn.samples.len(),
            turn.duration.as_secs_f32()
        ))
    }
}

/// Production STT backend: OpenAI-compatible transcription API.
/// Uses `STT_API_URL` (e.g. https://api.openai.com/v1), `STT_API_KEY` and `STT_MODEL` (default whisper-1).
#[derive(Debug, Clone)]
pub struct OpenAiStt {
    /// Base URL without trailing slash.
    pub base_url: String,
    pub api_key: String,
    /// whisper-1, gpt-4o-transcribe, ...
    pub model: String,
    client: reqwest::Client,
}

impl OpenAiStt {
    /// Build from environment: STT_API_URL, STT_API_KEY (or OPENAI_API_KEY), STT_MODEL.
    pub fn from_env() -> VoiceResult<Self> {
        let base_url = std::env::var("STT_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("STT_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| VoiceError::Config("STT requires STT_API_KEY or OPENAI_API_KEY".to_string()))?;
        let model = std::env::var("STT_MODEL").unwrap_or_else(|_| "whisper-1".to_string());
        Self::new(base_url, api_key, model)
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl SttBackend for OpenAiStt {
    async fn transcribe(&self, turn: &AudioTurn, language_tag: &str) -> VoiceResult<String> {
        if turn.samples.is_empty() {
            return Ok(String::new());
        }
        let wav = pcm_f32_to_wav(&turn.samples, turn.sample_rate);
        let url = format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'));
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());
        if let Some(lang) = language_hint(language_tag) {
            form = form.text("language", lang);
        }
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Stt(format!("STT API error {}: {}", status, body)));
        }
        let json: serde_json::Value = res.json().await.map_err(|e| VoiceError::Stt(e.to_string()))?;
        let text = json
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        Ok(text)
    }
}

/// `OpenAiStt` when its env is configured, else the placeholder.
pub fn create_best_stt() -> Box<dyn SttBackend> {
    match OpenAiStt::from_env() {
        Ok(stt) => Box::new(stt),
        Err(e) => {
            tracing::warn!("STT unavailable ({}), using placeholder", e);
            Box::new(PlaceholderStt::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn turn(samples: Vec<f32>) -> AudioTurn {
        AudioTurn {
            samples,
            timestamp: Utc::now(),
            duration: Duration::from_millis(30),
            sample_rate: 16000,
        }
    }

    #[test]
    fn wav_header_and_samples() {
        let wav = pcm_f32_to_wav(&[0.0, 1.0, -1.0, 2.0], 16000);
        assert_eq!(wav.len(), 44 + 8);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes([wav[4], wav[5], wav[6], wav[7]]), 44 + 8 - 8);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 16000);
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 8);
        assert_eq!(i16::from_le_bytes([wav[44], wav[45]]), 0);
        assert_eq!(i16::from_le_bytes([wav[46], wav[47]]), 32767);
        assert_eq!(i16::from_le_bytes([wav[48], wav[49]]), -32767);
        // clamped
        assert_eq!(i16::from_le_bytes([wav[50], wav[51]]), 32767);
    }

    #[test]
    fn language_hint_from_tag() {
        assert_eq!(language_hint("zh-CN").as_deref(), Some("zh"));
        assert_eq!(language_hint("EN_us").as_deref(), Some("en"));
        assert_eq!(language_hint(""), None);
    }

    #[tokio::test]
    async fn placeholder_reports_samples() {
        let stt = PlaceholderStt::new();
        let s = stt.transcribe(&turn(vec![0.0; 480]), "en-US").await.unwrap();
        assert!(s.contains("480"));

        let stt = PlaceholderStt::with_response("hello world");
        assert_eq!(stt.transcribe(&turn(vec![]), "en-US").await.unwrap(), "hello world");
    }
}
