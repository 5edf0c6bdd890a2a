//! Structured-output LLM clients
//!
//! Provides [`StructuredLlm`] implementations for the OpenAI and Ollama
//! APIs. Both constrain generation with a JSON schema on the server side;
//! neither parses free-form text.
//!
//! Author: hephaex@gmail.com

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dynasty_core::{DynastyError, LlmConfig, LlmProvider, Result, StructuredLlm, StructuredRequest};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

// ============================================================================
// OpenAI Client
// ============================================================================

/// OpenAI API client using `json_schema` strict response format
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    response_format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    strict: bool,
    schema: &'a serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Message {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing)]
    refusal: Option<String>,
}

impl Message {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            refusal: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Choice {
    message: Message,
    finish_reason: Option<String>,
}

impl OpenAiClient {
    /// Create a new OpenAI client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            model: model.into(),
            temperature,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| DynastyError::Config("OpenAI API key required".to_string()))?;

        let base_url = config
            .openai_base_url
            .clone()
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string());

        Ok(Self::new(api_key.clone(), config.model.clone(), config.temperature)
            .with_base_url(base_url))
    }

    /// Set custom base URL (for Azure or compatible APIs)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_request<'a>(&'a self, request: &'a StructuredRequest) -> OpenAiRequest<'a> {
        OpenAiRequest {
            model: &self.model,
            messages: vec![
                Message::new("system", &request.system),
                Message::new("user", &request.user),
            ],
            temperature: self.temperature,
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: &request.schema_name,
                    strict: true,
                    schema: &request.schema,
                },
            },
        }
    }
}

/// Pull the JSON document out of a chat completion
fn parse_openai_response(response: OpenAiResponse) -> Result<serde_json::Value> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| DynastyError::Service("No response generated".to_string()))?;

    if let Some(refusal) = message.refusal {
        return Err(DynastyError::Service(format!("Model refused: {refusal}")));
    }

    let content = message
        .content
        .ok_or_else(|| DynastyError::Service("Empty message content".to_string()))?;

    serde_json::from_str(&content)
        .map_err(|e| DynastyError::Service(format!("Malformed JSON in response: {e}")))
}

#[async_trait]
impl StructuredLlm for OpenAiClient {
    async fn generate_structured(&self, request: &StructuredRequest) -> Result<serde_json::Value> {
        let start = Instant::now();

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.build_request(request))
            .send()
            .await
            .map_err(|e| DynastyError::Service(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(DynastyError::Service(format!(
                "OpenAI error {status}: {error_text}"
            )));
        }

        let result: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| DynastyError::Service(format!("Failed to parse response: {e}")))?;

        tracing::debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "OpenAI structured output"
        );

        parse_openai_response(result)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Ollama Client
// ============================================================================

/// Ollama API client using the `format` schema parameter
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    format: &'a serde_json::Value,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct OllamaResponse {
    message: Message,
    done: bool,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature: 0.0,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut client = Self::new(config.ollama_url.clone(), config.model.clone());
        client.temperature = config.temperature;
        client
    }
}

#[async_trait]
impl StructuredLlm for OllamaClient {
    async fn generate_structured(&self, request: &StructuredRequest) -> Result<serde_json::Value> {
        let body = OllamaRequest {
            model: &self.model,
            messages: vec![
                Message::new("system", &request.system),
                Message::new("user", &request.user),
            ],
            format: &request.schema,
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| DynastyError::Service(format!("Ollama request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DynastyError::Service(format!("Ollama error: {error_text}")));
        }

        let result: OllamaResponse = response.json().await.map_err(|e| {
            DynastyError::Service(format!("Failed to parse Ollama response: {e}"))
        })?;

        let content = result.message.content.unwrap_or_default();
        serde_json::from_str(&content)
            .map_err(|e| DynastyError::Service(format!("Malformed JSON in Ollama response: {e}")))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create a structured LLM client from config
pub fn create_llm_client(config: &LlmConfig) -> Result<Arc<dyn StructuredLlm>> {
    match config.provider {
        LlmProvider::OpenAI => Ok(Arc::new(OpenAiClient::from_config(config)?)),
        LlmProvider::Ollama => Ok(Arc::new(OllamaClient::from_config(config))),
    }
}

// ============================================================================
// Tests
// ============================================================================
