use kuttai_core::{ChatMessage, ChatModel, Error, Result, SamplingOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_MODEL: &str = "gemma:2b";
pub const DEFAULT_LLM_TIMEOUT_MS: u64 = 120_000;

/// Chat client for a local Ollama runtime (`/api/chat`, non-streaming).
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout_ms: u64,
}

impl OllamaClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            timeout_ms,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Names of the models the runtime has pulled (`/api/tags`).
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(self.endpoint("/api/tags"))
            .timeout(Duration::from_millis(self.timeout_ms.min(5_000)))
            .send()
            .await
            .map_err(|e| Error::Llm(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Llm(format!("ollama tags HTTP {status}")));
        }
        let parsed: TagsResponse = resp.json().await.map_err(|e| Error::Llm(e.to_string()))?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait::async_trait]
impl ChatModel for OllamaClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage], opts: &SamplingOptions) -> Result<String> {
        let req = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: ChatOptions {
                temperature: opts.temperature,
                top_p: opts.top_p,
                num_predict: opts.max_tokens,
            },
        };

        let resp = self
            .client
            .post(self.endpoint("/api/chat"))
            .timeout(Duration::from_millis(self.timeout_ms))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Llm(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Llm(format!("ollama chat HTTP {status}")));
        }

        let parsed: ChatResponse = resp.json().await.map_err(|e| Error::Llm(e.to_string()))?;
        Ok(parsed.message.content.trim().to_string())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f64,
    top_p: f64,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, routing::post, Json, Router};
    use kuttai_core::Role;
    use std::net::SocketAddr;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn complete_posts_messages_and_sampling_options() {
        let app = Router::new().route(
            "/api/chat",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["model"], "gemma:2b");
                assert_eq!(body["stream"], false);
                assert_eq!(body["options"]["num_predict"], 512);
                assert_eq!(body["options"]["top_p"], 0.9);
                assert_eq!(body["messages"][0]["role"], "system");
                assert_eq!(body["messages"][1]["content"], "hello");
                Json(serde_json::json!({
                    "message": {"role": "assistant", "content": "  hi there \n"},
                    "done": true
                }))
            }),
        );
        let addr = serve(app).await;
        let client = OllamaClient::new(
            reqwest::Client::new(),
            format!("http://{addr}/"),
            DEFAULT_MODEL,
            2_000,
        );
        let out = client
            .complete(
                &[
                    ChatMessage::new(Role::System, "be nice"),
                    ChatMessage::new(Role::User, "hello"),
                ],
                &SamplingOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(out, "hi there");
        assert_eq!(client.name(), "gemma:2b");
    }

    #[tokio::test]
    async fn non_success_status_is_an_llm_error() {
        let app = Router::new().route(
            "/api/chat",
            post(|| async { (axum::http::StatusCode::NOT_FOUND, "model not found") }),
        );
        let addr = serve(app).await;
        let client = OllamaClient::new(reqwest::Client::new(), format!("http://{addr}"), "x", 2_000);
        let err = client
            .complete(&[ChatMessage::new(Role::User, "q")], &SamplingOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Llm(ref m) if m.contains("404")));
    }

    #[tokio::test]
    async fn list_models_reads_tags() {
        let app = Router::new().route(
            "/api/tags",
            get(|| async {
                Json(serde_json::json!({"models": [{"name": "gemma:2b"}, {"name": "llama3:8b"}]}))
            }),
        );
        let addr = serve(app).await;
        let client = OllamaClient::new(reqwest::Client::new(), format!("http://{addr}"), "x", 2_000);
        assert_eq!(client.list_models().await.unwrap(), vec!["gemma:2b", "llama3:8b"]);
    }
}
