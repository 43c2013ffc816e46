// src/extractor.rs
// Extraction-service boundary. The service is opaque: given caption text
// and/or poster bytes it returns a best-effort structured record with a
// self-reported confidence. Only the consumption of that output is ours.

use crate::types::ExtractionResult;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract a structured event from caption text and/or image bytes.
    /// Both inputs empty yields `Ok(None)` without any remote call.
    async fn extract(
        &self,
        caption: Option<&str>,
        image: Option<&[u8]>,
    ) -> Result<Option<ExtractionResult>>;
}

const SYSTEM_PROMPT: &str = r#"You are a structured data extractor for quiz event announcements from quiz clubs.

Extract the following fields from the message and/or poster image. Return ONLY valid JSON, no commentary.

{
  "name": "Quiz name/title",
  "description": "A well-formatted markdown description of the event",
  "date": "YYYY-MM-DD format or null if not found",
  "time": "HH:MM format (24h) or descriptive like '2 PM' or null",
  "venue": "Full venue name and address or null",
  "venueMapLink": "Google Maps link if mentioned, or null",
  "eligibilityRaw": ["Human-readable eligibility as written, e.g. 'Open to all', 'Under 23'"],
  "eligibilityCategories": ["Normalized categories from ONLY this fixed set: 'Open', 'U18', 'U23', 'U25', 'U30', 'UG', 'PG', 'Research', 'DU Only'. Empty array if unclear."],
  "teamSize": "Maximum team size as a number, null if not mentioned",
  "crossCollegeAllowed": "true if cross-institution teams are explicitly allowed, false if restricted, null if not mentioned",
  "mode": "One of: 'offline', 'online', 'hybrid'. Default to 'offline' if a physical venue is mentioned.",
  "hostingOrg": "Organization hosting the quiz or null",
  "quizMasters": ["Quiz master names, empty array if not mentioned"],
  "pointOfContact": { "name": null, "phone": null, "whatsappNumber": null },
  "registrationLink": "Registration link or null",
  "socialLink": "Social media link or null",
  "city": "City the event is in, if stated, or null",
  "confidence": 0.85,
  "extractedFields": ["fields", "that", "were", "actually", "found"]
}

Rules:
- confidence: 0.0-1.0 based on how much information you could extract. Below 0.5 if only the name was found.
- extractedFields: only list fields where you found actual data, not nulls.
- Return ONLY the JSON object, nothing else."#;

/// OpenAI chat-completions implementation. Requires `OPENAI_API_KEY`.
pub struct OpenAiExtractor {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiExtractor {
    /// `model_override`: pass Some("gpt-4o-mini") to override; defaults to gpt-4o.
    pub fn new(model_override: Option<&str>) -> Self {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        let http = reqwest::Client::builder()
            .user_agent("quizsync/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(60))
            .build()
            .expect("reqwest client");
        let model = model_override.unwrap_or("gpt-4o").to_string();
        Self {
            http,
            api_key,
            model,
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: ImageUrl,
    },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MsgContent {
    Plain(&'static str),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
struct Msg {
    role: &'static str,
    content: MsgContent,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Msg>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: String,
}

#[async_trait]
impl Extractor for OpenAiExtractor {
    async fn extract(
        &self,
        caption: Option<&str>,
        image: Option<&[u8]>,
    ) -> Result<Option<ExtractionResult>> {
        let mut parts = Vec::new();

        if let Some(bytes) = image {
            let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:image/jpeg;base64,{encoded}"),
                    detail: "high",
                },
            });
        }
        if let Some(text) = caption.filter(|t| !t.trim().is_empty()) {
            parts.push(ContentPart::Text {
                text: format!("Message caption:\n\n{text}"),
            });
        }
        if parts.is_empty() {
            return Ok(None);
        }

        if self.api_key.is_empty() {
            return Err(anyhow!("OPENAI_API_KEY is not set"));
        }

        let req = ChatRequest {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: MsgContent::Plain(SYSTEM_PROMPT),
                },
                Msg {
                    role: "user",
                    content: MsgContent::Parts(parts),
                },
            ],
            temperature: 0.1,
            max_tokens: 1000,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("calling extraction service")?
            .error_for_status()
            .context("extraction service returned an error status")?;

        let body: ChatResponse = resp
            .json()
            .await
            .context("reading extraction service response")?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| anyhow!("extraction service returned no choices"))?;

        let result: ExtractionResult = serde_json::from_str(content)
            .context("parsing extraction service output as JSON")?;
        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_input_makes_no_call() {
        // No API key configured and no network: would error if a call were
        // attempted, so Ok(None) proves the early return.
        let ex = OpenAiExtractor::new(None);
        let out = ex.extract(None, None).await.unwrap();
        assert!(out.is_none());
        let blank = ex.extract(Some("   "), None).await.unwrap();
        assert!(blank.is_none());
    }
}
