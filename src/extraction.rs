use crate::error::{Result, ScraperError};
use crate::types::{ConcertMood, ConcertRecord, ConcertStyle, ConcertType, Genre};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Turns one assembled text block into a validated record, or fails for
/// that block alone. The schema travels as an enumerated instruction; the
/// typed deserialization on the way back is what enforces it.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(&self, text: &str) -> Result<ConcertRecord>;
}

const SYSTEM_PROMPT: &str = r#"You are a Korean concert information parser.
Your task is to extract structured data from concert information text.
Always output valid JSON in Korean following this exact format:
{
    "concert_name": string,
    "concert_poster": string | null,
    "genre": string,
    "concert_mood": string,
    "concert_style": string,
    "concert_type": string,
    "casting": [{"name": string}],
    "performance_rounds": [{"round": number, "datetime": "YYYY-MM-DDTHH:MM:SS"}],
    "venue": string | null,
    "running_time": number | null,
    "price": {"<seat grade>": number | null},
    "age_limit": string | null,
    "booking_limit": string | null,
    "selling_platform": "INTERPARK",
    "ticket_status": boolean,
    "ticket_open_dates": {"<round or booking type>": "YYYY-MM-DDTHH:MM:SS"},
    "booking_link": string | null,
    "additional_info": string | null
}"#;

/// The instruction restates the closed value sets straight from the domain
/// enums, so prompt and validation cannot drift apart.
fn build_instruction(text: &str) -> String {
    format!(
        r#"Convert the following concert notice into JSON.

Rules:
1. Every date and time uses the YYYY-MM-DDTHH:MM:SS format.
2. Convert prices to integers (e.g. "90,000원" -> 90000).
3. Use null when the information is absent.
4. ticket_status is true or false.
5. Keys of ticket_open_dates are a booking type or round number; values are
   YYYY-MM-DDTHH:MM:SS timestamps.
6. Each of the following fields takes exactly one of its permitted values:
   genre: [{genres}]
   concert_mood: [{moods}]
   concert_style: [{styles}]
   concert_type: [{types}]
7. Ignore navigation or advertising text that is not about the concert.

Concert notice:
{text}"#,
        genres = Genre::VALUES.join(", "),
        moods = ConcertMood::VALUES.join(", "),
        styles = ConcertStyle::VALUES.join(", "),
        types = ConcertType::VALUES.join(", "),
        text = text,
    )
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// `ExtractionService` over an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiExtractor {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiExtractor {
    const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ScraperError::Config("OPENAI_API_KEY is not set".to_string()))?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl ExtractionService for OpenAiExtractor {
    async fn extract(&self, text: &str) -> Result<ConcertRecord> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_instruction(text),
                },
            ],
            // Low temperature for consistent field mapping
            temperature: 0.1,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        debug!(model = %self.model, "Extraction request");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ScraperError::Extraction {
                message: format!("extraction endpoint returned status {status}: {message}"),
            });
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ScraperError::Extraction {
                message: "empty completion".to_string(),
            })?;

        let record: ConcertRecord =
            serde_json::from_str(strip_code_blocks(&content)).map_err(|e| {
                ScraperError::Extraction {
                    message: format!("schema-violating output: {e}"),
                }
            })?;

        Ok(record)
    }
}

/// Strip markdown code fences some models wrap JSON output in.
fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Runs extraction over a whole batch of assembled texts.
///
/// One failing record is logged, tallied, and skipped; the rest of the
/// batch proceeds. Calls are paced by `pacing` to stay under the service's
/// rate limits.
pub async fn extract_batch(
    service: &dyn ExtractionService,
    texts: &[String],
    pacing: Duration,
) -> (Vec<ConcertRecord>, usize) {
    let mut records = Vec::new();
    let mut failures = 0usize;

    for (idx, text) in texts.iter().enumerate() {
        if idx > 0 {
            tokio::time::sleep(pacing).await;
        }

        info!("Extracting record {}/{}", idx + 1, texts.len());
        match service.extract(text).await {
            Ok(record) => {
                debug!(concert = %record.concert_name, "Extraction succeeded");
                records.push(record);
            }
            Err(e) => {
                warn!("Extraction failed for record {}: {}", idx + 1, e);
                failures += 1;
            }
        }
    }

    (records, failures)
}
