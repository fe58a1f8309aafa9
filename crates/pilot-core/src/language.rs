//! Supported interview languages.
//!
//! The table follows the mobile app's language picker (11 languages), not the
//! desktop tool's full Whisper list.

/// One interview language: short code, display name, recognizer locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
    pub recognition_tag: &'static str,
}

pub const SUPPORTED_LANGUAGES: &[Language] = &[
    Language { code: "en", name: "English", recognition_tag: "en-US" },
    Language { code: "zh", name: "中文", recognition_tag: "zh-CN" },
    Language { code: "es", name: "Español", recognition_tag: "es-ES" },
    Language { code: "ja", name: "日本語", recognition_tag: "ja-JP" },
    Language { code: "ko", name: "한국어", recognition_tag: "ko-KR" },
    Language { code: "fr", name: "Français", recognition_tag: "fr-FR" },
    Language { code: "de", name: "Deutsch", recognition_tag: "de-DE" },
    Language { code: "pt", name: "Português", recognition_tag: "pt-PT" },
    Language { code: "ru", name: "Русский", recognition_tag: "ru-RU" },
    Language { code: "ar", name: "العربية", recognition_tag: "ar-SA" },
    Language { code: "hi", name: "हिन्दी", recognition_tag: "hi-IN" },
];

pub const DEFAULT_LANGUAGE: Language = SUPPORTED_LANGUAGES[0];

impl Language {
    /// Look up by code (`"en"`) or recognizer tag (`"en-US"`), case-insensitive.
    pub fn lookup(code: &str) -> Option<Language> {
        let code = code.trim();
        SUPPORTED_LANGUAGES
            .iter()
            .find(|l| l.code.eq_ignore_ascii_case(code) || l.recognition_tag.eq_ignore_ascii_case(code))
            .copied()
    }

    /// Like [`Language::lookup`], English when unknown.
    pub fn resolve(code: &str) -> Language {
        Self::lookup(code).unwrap_or(DEFAULT_LANGUAGE)
    }

    /// Synthesis voice: `nova` reads English best, `alloy` for everything else.
    pub fn tts_voice(&self) -> &'static str {
        if self.code == "en" {
            "nova"
        } else {
            "alloy"
        }
    }
}
