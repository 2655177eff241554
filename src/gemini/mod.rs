//! Client for the hosted inference API (Google Generative Language,
//! `generateContent`).
//!
//! Two call shapes, both single-shot with no retry and no backoff:
//! - structured analysis: system instruction + screenshot + response schema,
//!   decoded into [`AnalysisResult`]
//! - free-text chat: system instruction synthesized from the last analysis +
//!   the full ordered history
//!
//! Transport errors, non-success statuses, and schema mismatches all surface
//! uniformly as [`CoachError::Provider`] with the message passed through.

pub mod model;
pub mod prompt;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::CoachError;
use model::{AnalysisResult, ChatTurn, Role};

/// Model used by the key-validation probe. Fixed, independent of the
/// user-selected model — matches the settings page behavior.
const PROBE_MODEL: &str = "gemini-2.0-flash";

/// Common interface to the hosted inference API.
///
/// The panel state machine and the settings store talk to this seam so tests
/// can substitute a scripted provider without any network.
#[async_trait]
pub trait Provider: Send + Sync {
    /// One structured-output analysis of a captured viewport.
    ///
    /// `image_base64` is the raw base64 JPEG payload, no data-URI envelope.
    async fn analyze_image(
        &self,
        api_key: &str,
        model: &str,
        image_base64: &str,
    ) -> Result<AnalysisResult, CoachError>;

    /// One free-text follow-up over the full chat history.
    async fn chat(
        &self,
        api_key: &str,
        model: &str,
        history: &[ChatTurn],
        last_analysis: Option<&AnalysisResult>,
    ) -> Result<String, CoachError>;

    /// Minimal request used to validate a candidate key. `Ok(false)` means the
    /// endpoint answered with a non-success status (bad key); `Err` means the
    /// request itself could not be made.
    async fn probe(&self, api_key: &str) -> Result<bool, CoachError>;
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// reqwest-backed [`Provider`] for the live Gemini endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
}

impl GeminiClient {
    /// `base_url` is the API root, e.g.
    /// `https://generativelanguage.googleapis.com/v1beta`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, model: &str, api_key: &str) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, api_key
        )
    }

    /// POST a `generateContent` body and return the concatenated text of the
    /// first candidate.
    async fn generate(&self, url: &str, body: Value) -> Result<String, CoachError> {
        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoachError::Provider(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| CoachError::Provider(e.to_string()))?;

        if !status.is_success() {
            return Err(CoachError::Provider(error_message(status.as_u16(), &text)));
        }

        first_candidate_text(&text)
    }
}

#[async_trait]
impl Provider for GeminiClient {
    async fn analyze_image(
        &self,
        api_key: &str,
        model: &str,
        image_base64: &str,
    ) -> Result<AnalysisResult, CoachError> {
        let body = json!({
            "systemInstruction": { "parts": [{ "text": prompt::SYSTEM_PROMPT }] },
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": prompt::ANALYZE_REQUEST },
                    { "inlineData": { "mimeType": "image/jpeg", "data": image_base64 } }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": analysis_response_schema()
            }
        });

        debug!(model = %model, "sending analysis request");
        let text = self.generate(&self.endpoint(model, api_key), body).await?;
        parse_analysis(&text)
    }

    async fn chat(
        &self,
        api_key: &str,
        model: &str,
        history: &[ChatTurn],
        last_analysis: Option<&AnalysisResult>,
    ) -> Result<String, CoachError> {
        let body = json!({
            "systemInstruction": {
                "parts": [{ "text": prompt::chat_system_instruction(last_analysis) }]
            },
            "contents": history_contents(history),
        });

        debug!(model = %model, turns = history.len(), "sending chat request");
        self.generate(&self.endpoint(model, api_key), body).await
    }

    async fn probe(&self, api_key: &str) -> Result<bool, CoachError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": "Say 'ok'" }] }]
        });
        let resp = self
            .http
            .post(self.endpoint(PROBE_MODEL, api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| CoachError::Provider(e.to_string()))?;
        Ok(resp.status().is_success())
    }
}

// ─── Request / response helpers ──────────────────────────────────────────────

/// Map the ordered history onto Gemini `contents`. The wire role for
/// assistant turns is `"model"`.
fn history_contents(history: &[ChatTurn]) -> Vec<Value> {
    history
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            json!({ "role": role, "parts": [{ "text": turn.content }] })
        })
        .collect()
}

/// Response schema for the structured analysis call (OpenAPI subset the
/// Gemini API accepts in `generationConfig.responseSchema`).
fn analysis_response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "country": { "type": "STRING", "description": "The most likely country" },
            "region": { "type": "STRING", "description": "Region if identifiable" },
            "confidence": { "type": "NUMBER", "description": "Confidence percentage" },
            "clues": {
                "type": "ARRAY",
                "description": "Key clues identified",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "type": {
                            "type": "STRING",
                            "description": "Type of clue: road, sign, vegetation, meta, etc."
                        },
                        "description": {
                            "type": "STRING",
                            "description": "Description citing the specific meta rule"
                        }
                    },
                    "required": ["type", "description"]
                }
            },
            "alternatives": {
                "type": "ARRAY",
                "description": "Alternative possibilities",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "country": { "type": "STRING" },
                        "confidence": { "type": "NUMBER" }
                    },
                    "required": ["country", "confidence"]
                }
            },
            "metaTip": { "type": "STRING", "description": "A specific META RULE to memorize" }
        },
        "required": ["country", "confidence", "clues", "alternatives", "metaTip"]
    })
}

/// Extract the first candidate's concatenated text parts.
fn first_candidate_text(body: &str) -> Result<String, CoachError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| CoachError::Provider(format!("unexpected response shape: {e}")))?;
    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| CoachError::Provider("response contained no candidates".to_string()))?;
    let text: String = candidate
        .content
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect();
    if text.is_empty() {
        return Err(CoachError::Provider(
            "response contained no text parts".to_string(),
        ));
    }
    Ok(text)
}

/// Decode and validate a structured analysis payload.
fn parse_analysis(text: &str) -> Result<AnalysisResult, CoachError> {
    let analysis: AnalysisResult = serde_json::from_str(text)
        .map_err(|e| CoachError::Provider(format!("analysis did not match schema: {e}")))?;
    if !(0.0..=100.0).contains(&analysis.confidence) {
        return Err(CoachError::Provider(format!(
            "analysis did not match schema: confidence {} out of range",
            analysis.confidence
        )));
    }
    Ok(analysis)
}

/// Best-effort human message for a non-success status: the API's own
/// `error.message` when the body carries one, else the bare status code.
fn error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => format!("Gemini API error (HTTP {status})"),
    }
}
