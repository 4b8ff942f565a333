use crate::config::Config;
use crate::error::CompletionError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Anything that can turn one user message into one reply
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, user_text: &str) -> Result<String, CompletionError>;
}

/// Message in a completion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request body sent to the chat-completion endpoint
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<LlmMessage>,
    pub max_tokens: u32,
}

impl LlmRequest {
    /// System instruction followed by the single user turn
    pub fn single_turn(config: &Config, user_text: &str) -> Self {
        Self {
            model: config.model.clone(),
            messages: vec![
                LlmMessage::system(config.system_prompt.clone()),
                LlmMessage::user(user_text),
            ],
            max_tokens: config.max_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Pull `choices[0].message.content` out of a response body, trimmed
fn extract_reply(body: &str) -> Result<String, CompletionError> {
    let response: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;

    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or_else(|| CompletionError::MalformedResponse("response has no reply text".to_string()))?;

    Ok(content.trim().to_string())
}

/// HTTP client for an OpenAI-compatible chat-completion endpoint
#[derive(Clone)]
pub struct LlmClient {
    config: Config,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    /// Use a preconfigured HTTP client instead of building one from the config
    pub fn with_http_client(config: Config, client: reqwest::Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl CompletionService for LlmClient {
    async fn complete(&self, user_text: &str) -> Result<String, CompletionError> {
        let api_key = self
            .config
            .get_api_key()
            .ok_or_else(|| CompletionError::MissingApiKey {
                env: self.config.api_key_env.clone(),
            })?;

        let url = self.config.completions_url();
        let payload = LlmRequest::single_turn(&self.config, user_text);
        debug!(
            model = %payload.model,
            max_tokens = payload.max_tokens,
            prompt_chars = user_text.chars().count(),
            "sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&api_key)
            .json(&payload)
            .send()
            .await
            .map_err(CompletionError::from_transport)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(CompletionError::from_transport)?;

        if !status.is_success() {
            return Err(CompletionError::status(status, &body, &api_key));
        }

        let reply = extract_reply(&body)?;
        debug!(status = %status, reply_chars = reply.chars().count(), "completion received");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one HTTP response and hand back the raw request text
    async fn one_shot_server(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });
        (format!("http://{addr}/v1"), handle)
    }

    fn test_config(base_url: String) -> Config {
        Config {
            api_key: Some("sk-unit-test".to_string()),
            api_key_env: "BIT_TEST_UNSET_KEY_VAR".to_string(),
            base_url,
            ..Config::default()
        }
    }

    fn local_client(config: Config) -> LlmClient {
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        LlmClient::with_http_client(config, http)
    }

    #[test]
    fn request_carries_system_and_user_turns() {
        let config = Config::default();
        let request = LlmRequest::single_turn(&config, "hello there");
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["model"], "gpt-3.5-turbo");
        assert_eq!(value["max_tokens"], 300);
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][0]["content"], "You are a helpful assistant.");
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["messages"][1]["content"], "hello there");
    }

    #[test]
    fn extract_reply_trims_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  hi!\n"}}]}"#;
        assert_eq!(extract_reply(body).unwrap(), "hi!");
    }

    #[test]
    fn extract_reply_rejects_empty_choices() {
        assert!(matches!(
            extract_reply(r#"{"choices":[]}"#),
            Err(CompletionError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_reply("not json"),
            Err(CompletionError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn complete_posts_bearer_request_and_reads_reply() {
        let (base_url, server) = one_shot_server(
            "HTTP/1.1 200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":"Hello!"}}]}"#,
        )
        .await;
        let client = local_client(test_config(base_url));

        let reply = client.complete("say hello").await.unwrap();
        assert_eq!(reply, "Hello!");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/chat/completions"));
        assert!(request.contains("Bearer sk-unit-test") || request.contains("bearer sk-unit-test"));
        assert!(request.contains("\"say hello\""));
    }

    #[tokio::test]
    async fn non_success_status_becomes_redacted_error() {
        let (base_url, server) = one_shot_server(
            "HTTP/1.1 401 Unauthorized",
            r#"{"error":{"message":"Incorrect API key provided: sk-unit-test"}}"#,
        )
        .await;
        let client = local_client(test_config(base_url));

        let err = client.complete("hi").await.unwrap_err();
        server.await.unwrap();
        match &err {
            CompletionError::Status { status, .. } => assert_eq!(status.as_u16(), 401),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!err.to_string().contains("sk-unit-test"));
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let config = Config {
            api_key: None,
            api_key_env: "BIT_TEST_UNSET_KEY_VAR".to_string(),
            ..Config::default()
        };
        let client = LlmClient::new(config).unwrap();
        assert!(matches!(
            client.complete("hi").await,
            Err(CompletionError::MissingApiKey { .. })
        ));
    }
}
