use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::LlmClient;
use super::StructuringError;

/// Model used for schema mapping unless configured otherwise.
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini-2024-07-18";

/// Public OpenAI API root.
pub const DEFAULT_LLM_URL: &str = "https://api.openai.com/v1";

/// Chat-completions client for OpenAI-compatible endpoints.
///
/// Calls are blocking; run them on the blocking pool. The underlying
/// `reqwest::blocking::Client` is built per call so it never lives on an
/// async worker thread.
pub struct OpenAiClient {
    base_url: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            timeout_secs,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn http_client(&self) -> Result<reqwest::blocking::Client, StructuringError> {
        reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| StructuringError::HttpClient(e.to_string()))
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Request body for /chat/completions
#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

/// Response body from /chat/completions
#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

fn first_choice_text(response: ChatCompletionResponse) -> Result<String, StructuringError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| StructuringError::ResponseParsing("completion has no message content".into()))
}

impl LlmClient for OpenAiClient {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, StructuringError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut request = self.http_client()?.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|e| {
            if e.is_connect() {
                StructuringError::LlmConnection(self.base_url.clone())
            } else if e.is_timeout() {
                StructuringError::HttpClient(format!(
                    "Request timed out after {}s",
                    self.timeout_secs
                ))
            } else {
                StructuringError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StructuringError::LlmError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .map_err(|e| StructuringError::ResponseParsing(e.to_string()))?;

        first_choice_text(parsed)
    }
}

/// Mock LLM client for testing: returns a fixed reply and remembers the
/// last prompt it was sent.
pub struct MockLlmClient {
    response: Option<String>,
    last_prompt: Mutex<Option<String>>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: Some(response.to_string()),
            last_prompt: Mutex::new(None),
        }
    }

    /// A client whose every call fails as if the endpoint were down.
    pub fn unreachable() -> Self {
        Self {
            response: None,
            last_prompt: Mutex::new(None),
        }
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|p| p.clone())
    }
}

impl LlmClient for MockLlmClient {
    fn generate(&self, _model: &str, prompt: &str) -> Result<String, StructuringError> {
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(prompt.to_string());
        }
        self.response
            .clone()
            .ok_or_else(|| StructuringError::LlmConnection("mock://unreachable".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = OpenAiClient::new("http://localhost:8080/v1/", None, 30);
        assert_eq!(client.base_url(), "http://localhost:8080/v1");
    }

    #[test]
    fn blank_api_key_treated_as_absent() {
        assert!(!OpenAiClient::new(DEFAULT_LLM_URL, Some("  ".into()), 30).has_api_key());
        assert!(OpenAiClient::new(DEFAULT_LLM_URL, Some("sk-test".into()), 30).has_api_key());
    }

    #[test]
    fn request_body_shape() {
        let body = ChatCompletionRequest {
            model: DEFAULT_LLM_MODEL,
            messages: [ChatMessage {
                role: "user",
                content: "hola",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini-2024-07-18");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hola");
    }

    #[test]
    fn first_choice_content_extracted() {
        let parsed: ChatCompletionResponse = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"{\"a\":1}"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice_text(parsed).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn empty_choices_is_parsing_error() {
        let parsed: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            first_choice_text(parsed),
            Err(StructuringError::ResponseParsing(_))
        ));
    }

    #[test]
    fn unreachable_endpoint_is_connection_error() {
        // Port 9 (discard) is closed on any sane test host.
        let client = OpenAiClient::new("http://127.0.0.1:9", None, 5);
        let err = client.generate(DEFAULT_LLM_MODEL, "hola").unwrap_err();
        assert!(matches!(
            err,
            StructuringError::LlmConnection(_) | StructuringError::HttpClient(_)
        ));
    }

    #[test]
    fn mock_records_prompt() {
        let mock = MockLlmClient::new("{}");
        assert_eq!(mock.generate("m", "prompt text").unwrap(), "{}");
        assert_eq!(mock.last_prompt().as_deref(), Some("prompt text"));
        assert!(MockLlmClient::unreachable().generate("m", "p").is_err());
    }
}
