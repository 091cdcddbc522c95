use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use tutor_contracts::providers::{GenerationError, StudyProvider};
use tutor_contracts::request::StudyRequest;
use tutor_contracts::response::{self, ParseError, StudyResponse};
use tutor_contracts::schema::{response_schema, RESPONSE_MIME_TYPE};

use crate::config::{GenerationSettings, ProviderConfig};

const ERROR_BODY_MAX_CHARS: usize = 512;
const API_KEY_HEADER: &str = "x-goog-api-key";

/// `generateContent` client that declares the study response schema on every
/// call and validates whatever comes back. One attempt per call.
pub struct GeminiStudyClient {
    config: ProviderConfig,
    http: HttpClient,
}

impl GeminiStudyClient {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        let trimmed = self.config.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.config.api_base, model_path)
    }

    fn send(&self, payload: &Value) -> Result<HttpResponse, GenerationError> {
        self.http
            .post(self.endpoint())
            .header(API_KEY_HEADER, self.config.api_key.as_str())
            .timeout(self.config.request_timeout)
            .json(payload)
            .send()
            .map_err(|err| self.transport_error(err))
    }

    /// Error text never carries the request URL.
    fn transport_error(&self, err: reqwest::Error) -> GenerationError {
        if err.is_timeout() {
            return GenerationError::ProviderTimeout(self.config.request_timeout);
        }
        GenerationError::ProviderUnavailable(error_chain_text(&err.without_url()))
    }

    fn read_envelope(&self, response: HttpResponse) -> Result<Value, GenerationError> {
        let status = response.status();
        let code = status.as_u16();
        let body = response.text().map_err(|err| self.transport_error(err))?;
        if code == 401 || code == 403 {
            return Err(GenerationError::ProviderUnavailable(format!(
                "provider refused credentials ({code})"
            )));
        }
        if !status.is_success() {
            return Err(GenerationError::ProviderRejected {
                status: code,
                body: truncate_text(&body, ERROR_BODY_MAX_CHARS),
            });
        }
        serde_json::from_str(&body).map_err(|err| {
            GenerationError::Response(ParseError::MalformedJson(format!(
                "provider envelope: {err}"
            )))
        })
    }
}

impl StudyProvider for GeminiStudyClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &StudyRequest) -> Result<StudyResponse, GenerationError> {
        if self.config.api_key.trim().is_empty() {
            return Err(GenerationError::ProviderUnavailable(
                "no API key configured".to_string(),
            ));
        }
        let payload = build_payload(request, &self.config.generation);
        tracing::debug!(
            model = %self.config.model,
            has_image = request.image().is_some(),
            "sending generation request"
        );
        let http_response = self.send(&payload)?;
        let envelope = self.read_envelope(http_response)?;
        let text = candidate_text(&envelope)?;
        let parsed = response::parse(&text)?;
        let usage = envelope
            .get("usageMetadata")
            .cloned()
            .unwrap_or(Value::Null);
        tracing::debug!(usage = %usage, "generation response validated");
        Ok(parsed)
    }
}

pub fn build_payload(request: &StudyRequest, settings: &GenerationSettings) -> Value {
    let mut parts = vec![json!({ "text": request.instruction_text() })];
    if let Some(image) = request.image() {
        parts.push(json!({
            "inlineData": {
                "mimeType": image.mime_type(),
                "data": image.to_base64(),
            }
        }));
    }
    json!({
        "contents": [{
            "role": "user",
            "parts": parts,
        }],
        "generationConfig": {
            "temperature": settings.temperature,
            "topP": settings.top_p,
            "topK": settings.top_k,
            "maxOutputTokens": settings.max_output_tokens,
            "responseMimeType": RESPONSE_MIME_TYPE,
            "responseSchema": response_schema(),
        },
    })
}

/// Concatenated text parts of the first candidate. An empty result is left
/// for the validator to reject.
pub fn candidate_text(envelope: &Value) -> Result<String, GenerationError> {
    if let Some(reason) = envelope
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
    {
        return Err(GenerationError::ProviderRejected {
            status: 200,
            body: format!("prompt blocked: {reason}"),
        });
    }
    let parts = envelope
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    Ok(parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect())
}

fn error_chain_text(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current = Some(err);
    while let Some(cause) = current {
        let text = cause.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty() && parts.last().map(String::as_str) != Some(trimmed) {
            parts.push(trimmed.to_string());
        }
        current = cause.source();
    }
    truncate_text(&parts.join(" | caused by: "), ERROR_BODY_MAX_CHARS)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
