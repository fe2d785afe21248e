//! Translation adapter
//!
//! Translation is presentation only. A failure or timeout never hides a
//! message; the caller simply keeps showing the original text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Languages offered to the user.
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "hi", "fr", "fa", "es", "ar", "zh", "ru", "pt", "de"];

pub fn is_supported(language: &str) -> bool {
    SUPPORTED_LANGUAGES.contains(&language)
}

#[derive(Error, Debug)]
pub enum TranslationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("translation service returned status {0}")]
    Status(u16),

    #[error("translation service returned no text")]
    Empty,

    #[error("translation timed out")]
    Timeout,
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslationError>;
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: Option<String>,
}

/// Client for a LibreTranslate-compatible `/translate` endpoint.
#[derive(Clone, Debug)]
pub struct LibreTranslate {
    client: reqwest::Client,
    base_url: String,
}

impl LibreTranslate {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Translator for LibreTranslate {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslationError> {
        let endpoint = format!("{}/translate", self.base_url);
        let resp = self
            .client
            .post(&endpoint)
            .json(&TranslateRequest {
                q: text,
                source,
                target,
                format: "text",
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(TranslationError::Status(resp.status().as_u16()));
        }

        let body: TranslateResponse = resp.json().await?;
        match body.translated_text {
            Some(translated) if !translated.trim().is_empty() => Ok(translated),
            _ => Err(TranslationError::Empty),
        }
    }
}

/// Translate `text`, falling back to the original on any failure.
pub async fn translate_or_original(
    translator: &dyn Translator,
    text: &str,
    source: &str,
    target: &str,
    timeout: Duration,
) -> String {
    if text.trim().is_empty() || source == target {
        return text.to_string();
    }

    let result = match tokio::time::timeout(timeout, translator.translate(text, source, target)).await
    {
        Ok(result) => result,
        Err(_) => Err(TranslationError::Timeout),
    };

    match result {
        Ok(translated) => {
            debug!("[Translate] {} -> {} ok", source, target);
            translated
        }
        Err(e) => {
            warn!(
                "[Translate] {} -> {} failed, showing original: {}",
                source, target, e
            );
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    #[async_trait]
    impl Translator for Upper {
        async fn translate(&self, text: &str, _: &str, _: &str) -> Result<String, TranslationError> {
            Ok(text.to_uppercase())
        }
    }

    struct Broken;

    #[async_trait]
    impl Translator for Broken {
        async fn translate(&self, _: &str, _: &str, _: &str) -> Result<String, TranslationError> {
            Err(TranslationError::Status(503))
        }
    }

    struct Stalled;

    #[async_trait]
    impl Translator for Stalled {
        async fn translate(&self, text: &str, _: &str, _: &str) -> Result<String, TranslationError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(text.to_string())
        }
    }

    #[tokio::test]
    async fn test_translate_success() {
        let out = translate_or_original(&Upper, "hello", "en", "fr", Duration::from_secs(1)).await;
        assert_eq!(out, "HELLO");
    }

    #[tokio::test]
    async fn test_failure_returns_original() {
        let out = translate_or_original(&Broken, "hello", "en", "fr", Duration::from_secs(1)).await;
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn test_timeout_returns_original() {
        let out =
            translate_or_original(&Stalled, "hello", "en", "fr", Duration::from_millis(50)).await;
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn test_same_language_skips_call() {
        let out = translate_or_original(&Upper, "hello", "en", "en", Duration::from_secs(1)).await;
        assert_eq!(out, "hello");
    }

    #[test]
    fn test_supported_languages() {
        assert!(is_supported("fa"));
        assert!(is_supported("zh"));
        assert!(!is_supported("xx"));
    }
}
