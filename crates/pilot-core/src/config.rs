//! Pilot configuration loaded from `config/pilot.toml` and the environment.
//!
//! | Key | Env | Default | Description |
//! |-----|-----|---------|-------------|
//! | api_url | PILOT__API_URL | http://127.0.0.1:3000 | Interview backend base URL. |
//! | request_timeout_secs | PILOT__REQUEST_TIMEOUT_SECS | 30 | Per-request timeout; a timeout is a transient failure. |
//! | language | PILOT__LANGUAGE | en | Interview language code (see [`crate::language`]). |
//! | resume_max_chars | PILOT__RESUME_MAX_CHARS | 12000 | Cap on the résumé digest sent with every question. |
//! | no_speech_timeout_ms | PILOT__NO_SPEECH_TIMEOUT_MS | 8000 | Listen window before the microphone reports no speech. |
//! | silence_gap_ms | PILOT__SILENCE_GAP_MS | 2000 | Silence that ends an utterance. |
//! | speech_words_per_minute | PILOT__SPEECH_WORDS_PER_MINUTE | 170 | Console playback pacing. |

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_api_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_language() -> String {
    "en".to_string()
}

fn default_resume_max_chars() -> usize {
    12_000
}

fn default_no_speech_timeout_ms() -> u64 {
    8_000
}

fn default_silence_gap_ms() -> u64 {
    2_000
}

fn default_speech_words_per_minute() -> u32 {
    170
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PilotConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_resume_max_chars")]
    pub resume_max_chars: usize,
    #[serde(default = "default_no_speech_timeout_ms")]
    pub no_speech_timeout_ms: u64,
    #[serde(default = "default_silence_gap_ms")]
    pub silence_gap_ms: u64,
    #[serde(default = "default_speech_words_per_minute")]
    pub speech_words_per_minute: u32,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout_secs(),
            language: default_language(),
            resume_max_chars: default_resume_max_chars(),
            no_speech_timeout_ms: default_no_speech_timeout_ms(),
            silence_gap_ms: default_silence_gap_ms(),
            speech_words_per_minute: default_speech_words_per_minute(),
        }
    }
}

impl PilotConfig {
    /// Load config from file and environment. Precedence: env `PILOT__*` > file at `PILOT_CONFIG`
    /// (default `config/pilot.toml`) > defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("PILOT_CONFIG").unwrap_or_else(|_| "config/pilot.toml".to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Same as [`PilotConfig::load`] with an explicit file path (missing file is fine).
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        let builder = config::Config::builder()
            .set_default("api_url", defaults.api_url)?
            .set_default("request_timeout_secs", defaults.request_timeout_secs as i64)?
            .set_default("language", defaults.language)?
            .set_default("resume_max_chars", defaults.resume_max_chars as i64)?
            .set_default("no_speech_timeout_ms", defaults.no_speech_timeout_ms as i64)?
            .set_default("silence_gap_ms", defaults.silence_gap_ms as i64)?
            .set_default("speech_words_per_minute", defaults.speech_words_per_minute as i64)?;

        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("PILOT").separator("__"))
            .build()?;

        let mut cfg: PilotConfig = built.try_deserialize()?;
        cfg.api_url = cfg.api_url.trim().trim_end_matches('/').to_string();
        cfg.request_timeout_secs = cfg.request_timeout_secs.max(1);
        cfg.speech_words_per_minute = cfg.speech_words_per_minute.clamp(60, 400);
        Ok(cfg)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn no_speech_timeout(&self) -> Duration {
        Duration::from_millis(self.no_speech_timeout_ms)
    }

    pub fn silence_gap(&self) -> Duration {
        Duration::from_millis(self.silence_gap_ms)
    }
}

/// Non-empty, trimmed env var.
pub fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
