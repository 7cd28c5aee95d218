//! LLM structuring service.
//!
//! One trait covers the four operations the conversation needs:
//! structuring raw text into lab values, writing the narrative report,
//! comparing records, and answering follow-up questions. The production
//! implementation talks to an OpenAI-compatible chat-completions API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::config;
use crate::core::error::{AppError, AppResult};
use crate::session::context::ContextAnswers;

/// Один показатель из результатов анализов.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Analyte {
    /// Название показателя (например, "Гемоглобин")
    pub name: String,
    /// Значение как в документе
    pub value: String,
    /// Единицы измерения, если указаны
    #[serde(default)]
    pub unit: Option<String>,
    /// Референсный диапазон, если указан
    #[serde(default)]
    pub reference_range: Option<String>,
    /// Отметка отклонения: "low", "high", "normal"
    #[serde(default)]
    pub flag: Option<String>,
}

/// Структурированный результат одного документа.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuredRecord {
    pub analytes: Vec<Analyte>,
}

impl StructuredRecord {
    pub fn from_json(json_str: &str) -> AppResult<Self> {
        serde_json::from_str(json_str).map_err(|e| AppError::Structuring(format!("bad structured JSON: {}", e)))
    }

    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Structuring interface, mockable in tests.
#[async_trait]
pub trait Structurer: Send + Sync {
    /// Raw text + клинический контекст -> структурированная запись
    async fn structure(&self, text: &str, context: &ContextAnswers) -> AppResult<StructuredRecord>;
    /// Нарративный отчёт по записи
    async fn report(&self, record: &StructuredRecord, context: &ContextAnswers) -> AppResult<String>;
    /// Сравнение нескольких записей в динамике
    async fn compare(&self, records: &[StructuredRecord]) -> AppResult<String>;
    /// Ответ на уточняющий вопрос по конкретной записи
    async fn answer_follow_up(&self, record: &StructuredRecord, question: &str) -> AppResult<String>;
}

const STRUCTURE_SYSTEM_PROMPT: &str = "Ты медицинский ассистент. Извлеки из текста результатов лабораторных \
анализов все показатели. Верни строго JSON вида \
{\"analytes\": [{\"name\": str, \"value\": str, \"unit\": str|null, \
\"reference_range\": str|null, \"flag\": \"low\"|\"high\"|\"normal\"|null}]}. \
Никакого текста вне JSON.";

const REPORT_SYSTEM_PROMPT: &str = "Ты медицинский ассистент. По структурированным показателям и контексту \
пациента составь понятный отчёт на русском: что в норме, какие отклонения, \
на что обратить внимание и какие вопросы обсудить с врачом. Не ставь \
диагнозов и не назначай лечение. Обязательно напомни, что отчёт не \
заменяет консультацию врача.";

const COMPARE_SYSTEM_PROMPT: &str = "Ты медицинский ассистент. Сравни несколько результатов анализов одного \
пациента в хронологическом порядке: какие показатели улучшились, какие \
ухудшились, какие стабильны. Без диагнозов и назначений.";

const FOLLOW_UP_SYSTEM_PROMPT: &str = "Ты медицинский ассистент. Ответь на уточняющий вопрос пациента по его \
результатам анализов коротко и по делу, на русском. Без диагнозов и \
назначений; при тревожных отклонениях рекомендуй очную консультацию.";

/// Chat-completions client for an OpenAI-compatible API.
pub struct OpenAiStructurer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiStructurer {
    pub fn new(base_url: String, api_key: String, model: String) -> AppResult<Self> {
        let client = reqwest::Client::builder().timeout(config::network::llm_timeout()).build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
            model,
        })
    }

    pub fn from_env() -> AppResult<Self> {
        Self::new(
            config::OPENAI_BASE_URL.clone(),
            config::OPENAI_API_KEY.clone(),
            config::OPENAI_MODEL.clone(),
        )
    }

    /// One chat-completions round trip; returns the assistant message text.
    async fn complete(&self, system: &str, user: &str, json_mode: bool) -> AppResult<String> {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": 0.2,
        });
        if json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Structuring(format!("LLM unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Structuring(format!(
                "LLM returned status {}",
                response.status()
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::Structuring(format!("LLM response unreadable: {}", e)))?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::Structuring("LLM response missing content".to_string()))
    }
}

#[async_trait]
impl Structurer for OpenAiStructurer {
    async fn structure(&self, text: &str, context: &ContextAnswers) -> AppResult<StructuredRecord> {
        let user = format!("Контекст пациента:\n{}\n\nТекст документа:\n{}", context.summary(), text);
        let content = self.complete(STRUCTURE_SYSTEM_PROMPT, &user, true).await?;
        let record = StructuredRecord::from_json(&content)?;
        if record.analytes.is_empty() {
            return Err(AppError::Structuring("no analytes recognized in document".to_string()));
        }
        Ok(record)
    }

    async fn report(&self, record: &StructuredRecord, context: &ContextAnswers) -> AppResult<String> {
        let user = format!(
            "Контекст пациента:\n{}\n\nПоказатели:\n{}",
            context.summary(),
            record.to_json()?
        );
        self.complete(REPORT_SYSTEM_PROMPT, &user, false).await
    }

    async fn compare(&self, records: &[StructuredRecord]) -> AppResult<String> {
        let mut user = String::from("Результаты в хронологическом порядке (старые первыми):\n");
        for (i, record) in records.iter().enumerate() {
            user.push_str(&format!("Анализ {}:\n{}\n", i + 1, record.to_json()?));
        }
        self.complete(COMPARE_SYSTEM_PROMPT, &user, false).await
    }

    async fn answer_follow_up(&self, record: &StructuredRecord, question: &str) -> AppResult<String> {
        let user = format!("Показатели:\n{}\n\nВопрос пациента: {}", record.to_json()?, question);
        self.complete(FOLLOW_UP_SYSTEM_PROMPT, &user, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_structured_record_parsing() {
        let json = r#"{"analytes": [
            {"name": "Гемоглобин", "value": "142", "unit": "г/л", "reference_range": "130-160", "flag": "normal"},
            {"name": "Ферритин", "value": "8", "flag": "low"}
        ]}"#;
        let record = StructuredRecord::from_json(json).unwrap();
        assert_eq!(record.analytes.len(), 2);
        assert_eq!(record.analytes[0].name, "Гемоглобин");
        assert_eq!(record.analytes[1].unit, None);
        assert_eq!(record.analytes[1].flag.as_deref(), Some("low"));
    }

    #[test]
    fn test_bad_json_is_a_structuring_error() {
        let err = StructuredRecord::from_json("not json").unwrap_err();
        assert!(matches!(err, AppError::Structuring(_)));
    }

    #[tokio::test]
    async fn test_structure_round_trip() {
        let server = MockServer::start().await;
        let content = r#"{\"analytes\": [{\"name\": \"ТТГ\", \"value\": \"2.1\"}]}"#;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"{{"choices": [{{"message": {{"content": "{}"}}}}]}}"#,
                content
            )))
            .mount(&server)
            .await;

        let llm = OpenAiStructurer::new(server.uri(), "test-key".to_string(), "gpt-4o-mini".to_string()).unwrap();
        let record = llm.structure("ТТГ 2.1", &ContextAnswers::default()).await.unwrap();
        assert_eq!(record.analytes[0].name, "ТТГ");
    }

    #[tokio::test]
    async fn test_upstream_failure_is_a_structuring_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let llm = OpenAiStructurer::new(server.uri(), "test-key".to_string(), "gpt-4o-mini".to_string()).unwrap();
        let err = llm.structure("text", &ContextAnswers::default()).await.unwrap_err();
        assert!(matches!(err, AppError::Structuring(_)));
    }
}
