use async_trait::async_trait;
use aws_sdk_bedrockruntime::error::DisplayErrorContext;
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::Client as BedrockClient;
use serde_json::{json, Value};

use super::{GenerationError, GenerationRequest, TextGenerator};

pub const DEFAULT_BEDROCK_MODEL: &str = "anthropic.claude-3-sonnet-20240229-v1:0";

/// [`TextGenerator`] backed by an Anthropic model on AWS Bedrock
pub struct BedrockGenerator {
    client: BedrockClient,
    model_id: String,
}

impl BedrockGenerator {
    pub fn new(sdk_config: &aws_config::SdkConfig, model_id: impl Into<String>) -> Self {
        Self {
            client: BedrockClient::new(sdk_config),
            model_id: model_id.into(),
        }
    }

    /// Messages API request body
    fn request_body(request: &GenerationRequest) -> Value {
        json!({
            "anthropic_version": "bedrock-2023-05-31",
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "top_p": request.top_p,
            "messages": [
                {"role": "user", "content": request.prompt}
            ]
        })
    }
}

/// Pull the completion text out of a Bedrock response body.
///
/// Understands both the messages format (`content[].text`) and the legacy
/// text-completion format (`completion`).
pub fn extract_completion(body: &Value) -> Option<String> {
    if let Some(completion) = body.get("completion").and_then(Value::as_str) {
        return Some(completion.to_string());
    }

    let parts: Vec<&str> = body
        .get("content")?
        .as_array()?
        .iter()
        .filter(|part| part.get("type").and_then(Value::as_str).unwrap_or("text") == "text")
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.concat())
    }
}

#[async_trait]
impl TextGenerator for BedrockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = serde_json::to_vec(&Self::request_body(request))?;

        tracing::debug!(model = %self.model_id, prompt_chars = request.prompt.len(), "Invoking Bedrock model");
        let response = self
            .client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(|e| GenerationError::Request(DisplayErrorContext(&e).to_string()))?;

        let value: Value = serde_json::from_slice(response.body().as_ref())?;
        extract_completion(&value)
            .ok_or_else(|| GenerationError::InvalidResponse("no completion text in response".to_string()))
    }

    fn provider_name(&self) -> &'static str {
        "bedrock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let request = GenerationRequest {
            prompt: "Summarize this".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
            top_p: 1.0,
        };
        let body = BedrockGenerator::request_body(&request);

        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Summarize this");
        assert_eq!(body["anthropic_version"], "bedrock-2023-05-31");
    }

    #[test]
    fn test_extract_messages_completion() {
        let body = json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "First paragraph. "},
                {"type": "text", "text": "Second paragraph."}
            ],
            "stop_reason": "end_turn"
        });
        assert_eq!(
            extract_completion(&body).as_deref(),
            Some("First paragraph. Second paragraph.")
        );
    }

    #[test]
    fn test_extract_legacy_completion() {
        let body = json!({"completion": " The video covers Rust.", "stop_reason": "stop_sequence"});
        assert_eq!(extract_completion(&body).as_deref(), Some(" The video covers Rust."));
    }

    #[test]
    fn test_extract_missing_completion() {
        assert_eq!(extract_completion(&json!({"content": []})), None);
        assert_eq!(extract_completion(&json!({"message": "throttled"})), None);
    }
}
