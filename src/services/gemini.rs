use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ai_service::{ImagePayload, VisionModel};
use super::nutrition::truncate;
use super::prompt::{food_analysis_prompt, food_analysis_schema};
use crate::config::GeminiConfig;
use crate::error::AnalysisError;

const MAX_ATTEMPTS: u32 = 2;
const RETRY_DELAY: Duration = Duration::from_millis(500);

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: serde_json::Value,
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
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

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    status: Option<String>,
}

/// Google Gemini `generateContent` client for food photos.
pub struct GeminiService {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiService {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.config.api_base, self.config.model)
    }

    fn build_request(&self, image: &ImagePayload) -> GenerateContentRequest {
        let options = self.config.options;
        let safety_settings = if self.config.relax_safety {
            SAFETY_CATEGORIES
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: "BLOCK_ONLY_HIGH",
                })
                .collect()
        } else {
            Vec::new()
        };

        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: food_analysis_prompt(),
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: image.mime_type.to_string(),
                            data: image.data.clone(),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: food_analysis_schema(),
                temperature: options.temperature,
                top_p: options.top_p,
                top_k: options.top_k,
            },
            safety_settings,
        }
    }

    /// Sends the request, retrying once on timeouts and connection failures.
    async fn send(&self, request: &GenerateContentRequest) -> Result<reqwest::Response, AnalysisError> {
        let url = self.endpoint();
        let mut attempt = 1;

        loop {
            let result = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.config.api_key)
                .json(request)
                .send()
                .await;

            match result {
                Ok(response) => return Ok(response),
                Err(e) if attempt < MAX_ATTEMPTS && (e.is_timeout() || e.is_connect()) => {
                    log::warn!(
                        "⚠️ Gemini request attempt {} failed ({}), retrying in {:?}",
                        attempt,
                        e,
                        RETRY_DELAY
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                    attempt += 1;
                }
                Err(e) => {
                    log::error!("❌ Gemini request failed after {} attempt(s): {}", attempt, e);
                    return Err(AnalysisError::UpstreamTransport(e.to_string()));
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl VisionModel for GeminiService {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn analyze_food_image(&self, image: &ImagePayload) -> Result<String, AnalysisError> {
        let request = self.build_request(image);

        log::info!("🤖 Sending request to Gemini with model: {}", self.config.model);
        log::debug!(
            "📊 Image: {} bytes decoded, {} base64 chars, {}",
            image.size_bytes,
            image.data.len(),
            image.mime_type
        );

        let response = self.send(&request).await?;
        let status = response.status();
        log::debug!("📥 Gemini response status: {}", status);

        if !status.is_success() {
            // The status alone decides the outcome; an unreadable body only loses details.
            let body = response.text().await.unwrap_or_default();
            log::error!("❌ Gemini API error response: {}", truncate(&body, 500));
            return Err(rejection(status.as_u16(), &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::UpstreamTransport(format!("failed to read response: {}", e)))?;

        log::debug!("📄 Raw Gemini response size: {} bytes", body.len());
        extract_text(&body)
    }
}

fn rejection(status: u16, body: &str) -> AnalysisError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.status {
            Some(code) => format!("{}: {}", code, envelope.error.message),
            None => envelope.error.message,
        },
        Err(_) if body.trim().is_empty() => "no error details".to_string(),
        Err(_) => truncate(body, 500).to_string(),
    };
    AnalysisError::UpstreamRejected { status, message }
}

/// Pulls `candidates[0].content.parts[0].text` out of the response envelope.
fn extract_text(body: &str) -> Result<String, AnalysisError> {
    let envelope: GenerateContentResponse = serde_json::from_str(body).map_err(|e| {
        AnalysisError::MalformedUpstreamResponse(format!("response envelope is not valid JSON: {}", e))
    })?;

    let candidate = match envelope.candidates.first() {
        Some(candidate) => candidate,
        None => {
            let reason = envelope
                .prompt_feedback
                .and_then(|feedback| feedback.block_reason)
                .map(|reason| format!("prompt blocked: {}", reason))
                .unwrap_or_else(|| "response contains no candidates".to_string());
            return Err(AnalysisError::MalformedUpstreamResponse(reason));
        }
    };

    candidate
        .content
        .as_ref()
        .and_then(|content| content.parts.first())
        .and_then(|part| part.text.clone())
        .ok_or_else(|| {
            let finish = candidate.finish_reason.as_deref().unwrap_or("unknown");
            AnalysisError::MalformedUpstreamResponse(format!(
                "candidate has no text part (finish reason: {})",
                finish
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const IMAGE_PATH: &str = "/models/gemini-1.5-flash:generateContent";

    fn image() -> ImagePayload {
        ImagePayload {
            data: "/9j/4AAQ".to_string(),
            mime_type: "image/jpeg",
            size_bytes: 6,
        }
    }

    fn service(api_base: &str) -> GeminiService {
        let mut config = GeminiConfig::new("test_key");
        config.api_base = api_base.to_string();
        config.timeout = Duration::from_millis(200);
        GeminiService::new(config).unwrap()
    }

    fn envelope(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        })
    }

    #[test]
    fn test_request_shape() {
        let service = service("http://localhost");
        let request = serde_json::to_value(service.build_request(&image())).unwrap();

        let parts = &request["contents"][0]["parts"];
        assert!(parts[0]["text"].as_str().unwrap().contains("Return ONLY valid JSON"));
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[1]["inlineData"]["data"], "/9j/4AAQ");

        let config = &request["generationConfig"];
        assert_eq!(config["responseMimeType"], "application/json");
        assert_eq!(config["responseSchema"]["properties"]["items"]["type"], "ARRAY");
        assert_eq!(config["topK"], 40);
        assert!((config["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);

        assert_eq!(request["safetySettings"].as_array().unwrap().len(), 4);
        assert_eq!(request["safetySettings"][0]["threshold"], "BLOCK_ONLY_HIGH");
    }

    #[test]
    fn test_request_without_safety_relaxation() {
        let mut config = GeminiConfig::new("test_key");
        config.relax_safety = false;
        let service = GeminiService::new(config).unwrap();

        let request = serde_json::to_value(service.build_request(&image())).unwrap();
        assert!(request.get("safetySettings").is_none());
    }

    #[test]
    fn test_extract_text() {
        let body = envelope(r#"{"items": []}"#).to_string();
        assert_eq!(extract_text(&body).unwrap(), r#"{"items": []}"#);
    }

    #[test]
    fn test_extract_text_missing() {
        let cases = [
            json!({}).to_string(),
            json!({ "candidates": [] }).to_string(),
            json!({ "candidates": [{ "finishReason": "SAFETY" }] }).to_string(),
            json!({ "candidates": [{ "content": { "parts": [] } }] }).to_string(),
            json!({ "candidates": [{ "content": { "parts": [{ "inlineData": {} }] } }] }).to_string(),
            "<html>gateway</html>".to_string(),
        ];

        for body in cases {
            let err = extract_text(&body).unwrap_err();
            assert!(
                matches!(err, AnalysisError::MalformedUpstreamResponse(_)),
                "unexpected result for {}",
                body
            );
        }
    }

    #[test]
    fn test_extract_text_blocked_prompt() {
        let body = json!({ "promptFeedback": { "blockReason": "SAFETY" } }).to_string();

        match extract_text(&body).unwrap_err() {
            AnalysisError::MalformedUpstreamResponse(details) => {
                assert_eq!(details, "prompt blocked: SAFETY")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_rejection_message() {
        let body = json!({
            "error": { "code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT" }
        })
        .to_string();

        match rejection(400, &body) {
            AnalysisError::UpstreamRejected { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "INVALID_ARGUMENT: API key not valid.");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        match rejection(502, "Bad Gateway") {
            AnalysisError::UpstreamRejected { message, .. } => assert_eq!(message, "Bad Gateway"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_analyze_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(IMAGE_PATH))
            .and(header("x-goog-api-key", "test_key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(r#"{"items": []}"#)))
            .expect(1)
            .mount(&server)
            .await;

        let text = service(&server.uri()).analyze_food_image(&image()).await.unwrap();
        assert_eq!(text, r#"{"items": []}"#);

        let requests = server.received_requests().await.unwrap();
        let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(sent["contents"][0]["parts"][1]["inlineData"]["data"], "/9j/4AAQ");
    }

    #[tokio::test]
    async fn test_analyze_rejected_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(IMAGE_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "code": 403, "message": "Permission denied", "status": "PERMISSION_DENIED" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = service(&server.uri()).analyze_food_image(&image()).await.unwrap_err();

        match err {
            AnalysisError::UpstreamRejected { status, message } => {
                assert_eq!(status, 403);
                assert!(message.contains("Permission denied"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejection_with_truncated_body_keeps_status() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut chunk = [0u8; 8192];
            // Drain the whole request so closing does not reset the connection
            loop {
                let n = socket.read(&mut chunk).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&received);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if received.len() >= header_end + 4 + length {
                        break;
                    }
                }
            }
            let _ = socket
                .write_all(
                    b"HTTP/1.1 503 Service Unavailable\r\n\
                      Content-Type: application/json\r\n\
                      Content-Length: 1000\r\n\r\n{\"error\":",
                )
                .await;
            let _ = socket.shutdown().await;
        });

        let err = service(&format!("http://{}", addr))
            .analyze_food_image(&image())
            .await
            .unwrap_err();

        match err {
            AnalysisError::UpstreamRejected { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "no error details");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_analyze_timeout_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(IMAGE_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(envelope(r#"{"items": []}"#))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let err = service(&server.uri()).analyze_food_image(&image()).await.unwrap_err();

        assert!(matches!(err, AnalysisError::UpstreamTransport(_)));
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_analyze_connection_refused() {
        let err = service("http://127.0.0.1:1").analyze_food_image(&image()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::UpstreamTransport(_)));
    }

    #[tokio::test]
    async fn test_analyze_missing_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(IMAGE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let err = service(&server.uri()).analyze_food_image(&image()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedUpstreamResponse(_)));
    }
}
