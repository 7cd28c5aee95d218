//! Document text extraction.
//!
//! The heavy lifting (PDF parsing, OCR) is delegated to an external
//! extraction service over HTTP; this module gates file types, downloads
//! bytes from Telegram, and wraps the service behind a trait so tests
//! can inject a fake.

use async_trait::async_trait;

use crate::core::config;
use crate::core::error::{AppError, AppResult};

/// Типы документов, которые бот принимает на анализ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportedFileKind {
    Pdf,
    Jpeg,
    Png,
}

impl SupportedFileKind {
    /// Определяет тип по MIME; незнакомый тип отклоняется.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "application/pdf" => Some(Self::Pdf),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// Extraction interface: file bytes in, plain text out.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, bytes: &[u8], kind: SupportedFileKind) -> AppResult<String>;
}

/// HTTP client for the extraction service.
pub struct HttpExtractor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpExtractor {
    pub fn new(endpoint: String) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config::network::extractor_timeout())
            .build()?;
        Ok(Self { client, endpoint })
    }

    pub fn from_env() -> AppResult<Self> {
        Self::new(config::EXTRACTOR_URL.clone())
    }
}

#[async_trait]
impl DocumentExtractor for HttpExtractor {
    async fn extract(&self, bytes: &[u8], kind: SupportedFileKind) -> AppResult<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", kind.mime())
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| AppError::Extraction(format!("extractor unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Extraction(format!(
                "extractor returned status {}",
                response.status()
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| AppError::Extraction(format!("extractor response unreadable: {}", e)))?;

        if text.trim().is_empty() {
            return Err(AppError::Extraction("no text found in document".to_string()));
        }

        Ok(text)
    }
}

/// Download a file's bytes from the Telegram file API.
///
/// Telegram serves file contents at a separate host path, not through the
/// Bot API methods, so this is a plain GET with the bot token in the URL.
pub async fn download_telegram_file(token: &str, file_path: &str) -> AppResult<Vec<u8>> {
    let url = format!("https://api.telegram.org/file/bot{}/{}", token, file_path);
    let response = reqwest::get(&url).await?;

    if !response.status().is_success() {
        return Err(AppError::HttpStatus(response.status()));
    }

    Ok(response.bytes().await?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_mime_gate() {
        assert_eq!(SupportedFileKind::from_mime("application/pdf"), Some(SupportedFileKind::Pdf));
        assert_eq!(SupportedFileKind::from_mime("image/jpeg"), Some(SupportedFileKind::Jpeg));
        assert_eq!(SupportedFileKind::from_mime("image/png"), Some(SupportedFileKind::Png));
        assert_eq!(SupportedFileKind::from_mime("video/mp4"), None);
        assert_eq!(SupportedFileKind::from_mime("application/zip"), None);
        assert_eq!(SupportedFileKind::from_mime(""), None);
    }

    #[tokio::test]
    async fn test_http_extractor_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .and(header("Content-Type", "application/pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Гемоглобин 142 г/л"))
            .mount(&server)
            .await;

        let extractor = HttpExtractor::new(format!("{}/extract", server.uri())).unwrap();
        let text = extractor.extract(b"%PDF-1.4", SupportedFileKind::Pdf).await.unwrap();
        assert_eq!(text, "Гемоглобин 142 г/л");
    }

    #[tokio::test]
    async fn test_http_extractor_maps_failures_to_extraction_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let extractor = HttpExtractor::new(format!("{}/extract", server.uri())).unwrap();
        let err = extractor.extract(b"junk", SupportedFileKind::Png).await.unwrap_err();
        assert!(matches!(err, AppError::Extraction(_)));
    }

    #[tokio::test]
    async fn test_empty_extraction_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .respond_with(ResponseTemplate::new(200).set_body_string("   "))
            .mount(&server)
            .await;

        let extractor = HttpExtractor::new(format!("{}/extract", server.uri())).unwrap();
        let err = extractor.extract(b"%PDF-1.4", SupportedFileKind::Pdf).await.unwrap_err();
        assert!(matches!(err, AppError::Extraction(_)));
    }
}
