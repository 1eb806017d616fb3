//! Gemini `generateContent` client
//!
//! Builds the structured-generation request (inline JPEG, fixed instruction,
//! declared response schema) and validates the model's JSON answer.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::types::{parse_reading, AuraReading, PalettePolicy, PALETTE_SIZE};
use super::{ReadingError, ReadingService};
use crate::capture::frame::JPEG_MIME_TYPE;
use crate::capture::CapturedImage;
use crate::config::ReadingSettings;

/// Instruction sent alongside every image
pub const AURA_INSTRUCTION: &str = "You are a mystical aura reader. Analyze the colors, mood, and expression in this person's image to provide a spiritual reading. Identify the three most dominant aura colors and provide their hex codes. Then, generate the full aura reading in the requested JSON format. Be creative, positive, and majestic.";

/// Longest error body excerpt kept in an error message
const ERROR_BODY_LIMIT: usize = 300;

/// Declared output structure for the model
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "auraColorInsight": {
                "type": "STRING",
                "description": "A description of the user's dominant aura color and what it signifies. Should be mystical and insightful. e.g., 'Your aura glows with a vibrant indigo...'"
            },
            "futureGlimpse": {
                "type": "STRING",
                "description": "A short, positive, and slightly vague glimpse into the user's near future. e.g., 'A wave of creative energy is approaching...'"
            },
            "angelNumber": {
                "type": "INTEGER",
                "description": "A significant 3 or 4 digit 'angel number' for the user, like 444, 777, or 1111."
            },
            "spiritualGuidance": {
                "type": "STRING",
                "description": "A piece of actionable spiritual advice or a mantra for the user to reflect on. e.g., 'Embrace spontaneity. Your spirit guides urge you to trust your intuition...'"
            },
            "primaryColors": {
                "type": "ARRAY",
                "description": "An array of exactly three hex color codes (as strings, e.g., '#FF5733') representing the most dominant colors in the user's aura.",
                "items": { "type": "STRING" },
                "minItems": PALETTE_SIZE,
                "maxItems": PALETTE_SIZE
            }
        },
        "required": ["auraColorInsight", "futureGlimpse", "angelNumber", "spiritualGuidance", "primaryColors"]
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
    temperature: f32,
}

impl GenerateContentRequest {
    /// Request for one image with the aura instruction and schema
    pub fn for_image(image: &CapturedImage, temperature: f32) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![
                    Part {
                        inline_data: Some(InlineData {
                            mime_type: JPEG_MIME_TYPE,
                            data: image.base64_payload(),
                        }),
                        text: None,
                    },
                    Part {
                        inline_data: None,
                        text: Some(AURA_INSTRUCTION.to_string()),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: response_schema(),
                temperature,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect();
        (!text.is_empty()).then_some(text)
    }

    /// Why no text came back, for the error message
    fn missing_text_reason(&self) -> String {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
        {
            return format!("prompt blocked ({})", reason);
        }
        match self.candidates.first().and_then(|c| c.finish_reason.as_deref()) {
            Some(reason) => format!("no text in response (finish reason {})", reason),
            None => "no text in response".to_string(),
        }
    }
}

/// Reading client talking to the Gemini REST API
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
    palette: PalettePolicy,
}

impl GeminiClient {
    /// Create a client from settings and an explicit credential
    pub fn new(settings: &ReadingSettings, api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self::with_http(http, settings, api_key))
    }

    /// Create a client over an existing HTTP client
    pub fn with_http(http: reqwest::Client, settings: &ReadingSettings, api_key: String) -> Self {
        Self {
            http,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key,
            temperature: settings.temperature,
            palette: PalettePolicy::from_enforce(settings.enforce_palette),
        }
    }

    /// Full `generateContent` URL for the configured model
    pub fn request_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    async fn generate(&self, request: &GenerateContentRequest) -> Result<String, ReadingError> {
        let response = self
            .http
            .post(self.request_url())
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ReadingError::ServiceUnavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ReadingError::ServiceUnavailable(format!("failed to read body: {}", e)))?;

        if !status.is_success() {
            let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(ReadingError::ServiceUnavailable(format!(
                "status {}: {}",
                status, excerpt
            )));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body).map_err(|e| {
            ReadingError::ServiceUnavailable(format!("malformed response body: {}", e))
        })?;

        parsed
            .text()
            .ok_or_else(|| ReadingError::InvalidResponseShape(parsed.missing_text_reason()))
    }
}

#[async_trait]
impl ReadingService for GeminiClient {
    async fn request_reading(&self, image: &CapturedImage) -> Result<AuraReading, ReadingError> {
        let request = GenerateContentRequest::for_image(image, self.temperature);
        debug!(
            "Requesting reading from {} ({} JPEG bytes)",
            self.model,
            image.jpeg_bytes().len()
        );

        let started = Instant::now();
        let text = self.generate(&request).await?;
        let reading = parse_reading(&text, self.palette)?;

        info!(
            "Reading received from {} in {:?}",
            self.model,
            started.elapsed()
        );
        Ok(reading)
    }
}
