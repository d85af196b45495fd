use std::time::Duration;

use super::{check_status, ChatRequest, ChatResponse, LineBuffer, LlmError, StreamChunk};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct GroqConfig {
    pub client: Client,
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct GroqRequest<'a> {
    model: &'a str,
    messages: Vec<GroqMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize, Deserialize)]
struct GroqMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct GroqResponse {
    choices: Vec<GroqChoice>,
}

#[derive(Deserialize)]
struct GroqChoice {
    message: GroqMessage,
}

#[derive(Deserialize)]
struct GroqStreamResponse {
    choices: Vec<GroqStreamChoice>,
}

#[derive(Deserialize)]
struct GroqStreamChoice {
    delta: GroqDelta,
}

#[derive(Deserialize)]
struct GroqDelta {
    content: Option<String>,
}

/// One decoded server-sent-events line.
#[derive(Debug, PartialEq)]
pub(crate) enum SseLine {
    Delta(String),
    Done,
    Skip,
}

/// Decode a `data: ...` line of a chat-completions stream.
pub(crate) fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<GroqStreamResponse>(data) {
        Ok(parsed) => parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|c| !c.is_empty())
            .map(SseLine::Delta)
            .unwrap_or(SseLine::Skip),
        Err(_) => SseLine::Skip,
    }
}

fn build_request(request: &ChatRequest, stream: bool) -> GroqRequest<'_> {
    GroqRequest {
        model: &request.model,
        messages: request
            .messages
            .iter()
            .map(|m| GroqMessage {
                role: m.role.clone(),
                content: m.content.clone(),
            })
            .collect(),
        stream,
        temperature: request.options.temperature,
        max_tokens: request.options.num_predict,
    }
}

pub async fn chat(config: &GroqConfig, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
    let resp = config
        .client
        .post(format!("{}/chat/completions", config.base_url))
        .bearer_auth(&config.api_key)
        .timeout(config.timeout)
        .json(&build_request(request, false))
        .send()
        .await?;
    let resp = check_status(resp).await?;

    let data: GroqResponse = resp
        .json()
        .await
        .map_err(|e| LlmError::Parse(e.to_string()))?;
    let content = data
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .unwrap_or_default();

    Ok(ChatResponse {
        content,
        model: request.model.clone(),
    })
}

pub async fn chat_stream(
    config: &GroqConfig,
    request: &ChatRequest,
    on_chunk: impl Fn(StreamChunk) + Send,
) -> Result<String, LlmError> {
    let resp = config
        .client
        .post(format!("{}/chat/completions", config.base_url))
        .bearer_auth(&config.api_key)
        .timeout(config.timeout)
        .json(&build_request(request, true))
        .send()
        .await?;
    let resp = check_status(resp).await?;

    let mut full_content = String::new();
    let mut stream = resp.bytes_stream();
    let mut lines = LineBuffer::default();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        for line in lines.push(&chunk) {
            match parse_sse_line(&line) {
                SseLine::Delta(content) => {
                    full_content.push_str(&content);
                    on_chunk(StreamChunk {
                        delta: content,
                        done: false,
                    });
                }
                SseLine::Done => {
                    on_chunk(StreamChunk {
                        delta: String::new(),
                        done: true,
                    });
                    return Ok(full_content);
                }
                SseLine::Skip => {}
            }
        }
    }

    if let Some(SseLine::Delta(content)) = lines.finish().map(|l| parse_sse_line(&l)) {
        full_content.push_str(&content);
        on_chunk(StreamChunk {
            delta: content,
            done: false,
        });
    }
    on_chunk(StreamChunk {
        delta: String::new(),
        done: true,
    });
    Ok(full_content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, GenerateOptions, Provider};
    use axum::routing::post;
    use axum::Router;
    use std::sync::Mutex;

    #[test]
    fn test_parse_sse_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Namaste"}}]}"#;
        assert_eq!(parse_sse_line(line), SseLine::Delta("Namaste".into()));
    }

    #[test]
    fn test_parse_sse_done_and_noise() {
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(parse_sse_line("data: {not json"), SseLine::Skip);
        let empty = r#"data: {"choices":[{"delta":{"content":""}}]}"#;
        assert_eq!(parse_sse_line(empty), SseLine::Skip);
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn request() -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::system("sys"), ChatMessage::user("hi")],
            model: "llama-3.3-70b-versatile".into(),
            images: None,
            options: GenerateOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_chat_stream_relays_deltas() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Shubha \"}}]}\n\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"din\"}}]}\n\n\
                    data: [DONE]\n\n";
        let base = serve(Router::new().route("/chat/completions", post(move || async move { body }))).await;
        let provider = Provider::groq(Client::new(), "key".into(), base);

        let seen = Mutex::new(Vec::new());
        let full = provider
            .chat_stream(&request(), |c| seen.lock().unwrap().push(c))
            .await
            .unwrap();

        assert_eq!(full, "Shubha din");
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen[2].done);
    }

    #[tokio::test]
    async fn test_chat_non_streaming() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Om"}}]}"#;
        let base = serve(Router::new().route("/chat/completions", post(move || async move { body }))).await;
        let provider = Provider::groq(Client::new(), "key".into(), base);
        let resp = provider.chat(&request()).await.unwrap();
        assert_eq!(resp.content, "Om");
    }

    #[tokio::test]
    async fn test_api_error_status() {
        let base = serve(Router::new().route(
            "/chat/completions",
            post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "bad key") }),
        ))
        .await;
        let provider = Provider::groq(Client::new(), "key".into(), base);
        let err = provider.chat_stream(&request(), |_| {}).await.unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_trailing_slash_in_base_url() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Om"}}]}"#;
        let base = serve(Router::new().route("/chat/completions", post(move || async move { body }))).await;
        let provider = Provider::groq(Client::new(), "key".into(), format!("{}/", base));
        let Provider::Groq(config) = &provider else { unreachable!() };
        assert_eq!(config.base_url, base);
        assert_eq!(provider.chat(&request()).await.unwrap().content, "Om");
    }

    #[tokio::test]
    async fn test_silent_upstream_times_out() {
        let base = serve(Router::new().route(
            "/chat/completions",
            post(|| async {
                tokio::time::sleep(std::time::Duration::from_secs(30)).await;
                "late"
            }),
        ))
        .await;
        let provider = Provider::groq(Client::new(), "key".into(), base)
            .with_timeout(std::time::Duration::from_millis(200));
        let err = provider.chat_stream(&request(), |_| {}).await.unwrap_err();
        assert!(matches!(err, LlmError::Http(ref e) if e.is_timeout()));
    }
}
