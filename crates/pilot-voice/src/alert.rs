//! One-shot, user-visible alerts for errors that end a session.

use crate::error::{InterviewError, RecognitionErrorKind};
use pilot_core::{GatewayErrorKind, Language};
use serde::Serialize;
use std::fmt;

/// Localized modal content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub title: String,
    pub message: String,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

enum Catalog {
    English,
    Chinese,
}

impl Catalog {
    fn for_language(language: Language) -> Self {
        match language.code {
            "zh" => Catalog::Chinese,
            _ => Catalog::English,
        }
    }
}

impl Alert {
    /// Alert for `err` in the interview language. Chinese and English are
    /// translated; everything else falls back to English.
    pub fn from_error(err: &InterviewError, language: Language) -> Self {
        let (title, message) = match Catalog::for_language(language) {
            Catalog::English => english(err),
            Catalog::Chinese => chinese(err),
        };
        Self {
            title: title.to_string(),
            message: message.to_string(),
        }
    }
}

fn english(err: &InterviewError) -> (&'static str, &'static str) {
    match err {
        InterviewError::PermissionDenied => (
            "Microphone unavailable",
            "Please allow microphone access and try again.",
        ),
        InterviewError::Recognition(e) => match e.kind {
            RecognitionErrorKind::NoSpeech => ("No speech", "We did not hear anything. Please try again."),
            RecognitionErrorKind::Other => ("Recording failed", "Please check the microphone and try again."),
        },
        InterviewError::Gateway(e) => match e.kind() {
            GatewayErrorKind::InsufficientCredits => (
                "Insufficient credits",
                "Your credits are used up. Top up to continue the interview.",
            ),
            GatewayErrorKind::Unauthorized => ("Signed out", "Your session has expired. Please log in again."),
            GatewayErrorKind::Transient | GatewayErrorKind::Unknown => {
                ("Error", "Could not generate an answer. Please try again.")
            }
        },
        InterviewError::Synthesis(_) => ("Error", "Something went wrong while playing audio. Please try again."),
        InterviewError::SessionOpen(_) => ("Error", "Could not start the interview. Please try again."),
    }
}

fn chinese(err: &InterviewError) -> (&'static str, &'static str) {
    match err {
        InterviewError::PermissionDenied => ("录音失败", "请检查麦克风权限并重试。"),
        InterviewError::Recognition(e) => match e.kind {
            RecognitionErrorKind::NoSpeech => ("未检测到语音", "没有听到声音，请重试。"),
            RecognitionErrorKind::Other => ("录音失败", "请检查麦克风并重试。"),
        },
        InterviewError::Gateway(e) => match e.kind() {
            GatewayErrorKind::InsufficientCredits => ("积分不足", "您的积分已用完，请充值后继续面试。"),
            GatewayErrorKind::Unauthorized => ("登录已过期", "请重新登录。"),
            GatewayErrorKind::Transient | GatewayErrorKind::Unknown => ("错误", "无法生成回答，请重试。"),
        },
        InterviewError::Synthesis(_) => ("错误", "播放音频时出现错误，请重试。"),
        InterviewError::SessionOpen(_) => ("错误", "无法开始面试，请重试。"),
    }
}
