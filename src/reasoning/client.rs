use super::{CompletionRequest, TextService};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

/// HTTP client for an OpenAI-compatible chat completions endpoint.
///
/// Authenticates with a Bearer token.
pub struct HttpTextService {
    api_key: String,
    http_client: Client,
    base_url: String,
}

impl HttpTextService {
    /// `base_url` is the API root, e.g. "https://api.groq.com/openai/v1".
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TextService for HttpTextService {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            response_format: request
                .json_object
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send completion request")?;

        check_response_status(response.status())?;

        let completion: ChatResponse = response
            .json()
            .await
            .context("Failed to parse completion response")?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("Completion response contained no choices"))
    }
}

fn check_response_status(status: StatusCode) -> Result<()> {
    match status {
        StatusCode::UNAUTHORIZED => Err(anyhow!("Text service rejected the API key")),
        StatusCode::TOO_MANY_REQUESTS => Err(anyhow!("Text service rate limit exceeded")),
        s if !s.is_success() => Err(anyhow!("Text service error: {}", s)),
        _ => Ok(()),
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
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
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn request(json_object: bool) -> CompletionRequest {
        CompletionRequest {
            model: "test-model".to_string(),
            system: "You are the arbiter.".to_string(),
            user: "Two agents want the sword.".to_string(),
            json_object,
        }
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test_key")
            .match_body(Matcher::PartialJson(json!({
                "model": "test-model",
                "messages": [
                    {"role": "system", "content": "You are the arbiter."},
                    {"role": "user", "content": "Two agents want the sword."}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": [{"message": {"role": "assistant", "content": "Alice wins."}}]}"#)
            .create_async()
            .await;

        let service = HttpTextService::new("test_key".to_string(), server.url());
        let reply = service.complete(request(false)).await.unwrap();

        assert_eq!(reply, "Alice wins.");
    }

    #[tokio::test]
    async fn test_json_object_response_format_sent() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({
                "response_format": {"type": "json_object"}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": [{"message": {"content": "{}"}}]}"#)
            .create_async()
            .await;

        let service = HttpTextService::new("test_key".to_string(), format!("{}/", server.url()));
        let reply = service.complete(request(true)).await.unwrap();

        assert_eq!(reply, "{}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_401_rejected_key() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error": "bad key"}"#)
            .create_async()
            .await;

        let service = HttpTextService::new("bad_key".to_string(), server.url());
        let err = service.complete(request(false)).await.unwrap_err();
        assert!(err.to_string().contains("rejected the API key"));
    }

    #[tokio::test]
    async fn test_empty_choices_is_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let service = HttpTextService::new("test_key".to_string(), server.url());
        let err = service.complete(request(false)).await.unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }
}
