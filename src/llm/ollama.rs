use std::time::Duration;

use super::{
    check_status, ChatRequest, ChatResponse, GenerateOptions, LineBuffer, LlmError, StreamChunk,
};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub client: Client,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<&'a [String]>,
    options: &'a GenerateOptions,
}

#[derive(Deserialize, Default)]
struct GenerateLine {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

/// `/api/generate` takes a single prompt; messages are joined in order.
fn flatten_prompt(request: &ChatRequest) -> String {
    request
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn build_request(request: &ChatRequest, stream: bool) -> GenerateRequest<'_> {
    GenerateRequest {
        model: &request.model,
        prompt: flatten_prompt(request),
        stream,
        images: request.images.as_deref(),
        options: &request.options,
    }
}

/// Decode one NDJSON line into `(text, done)`; garbage lines yield nothing.
pub(crate) fn parse_ndjson_line(line: &str) -> (Option<String>, bool) {
    match serde_json::from_str::<GenerateLine>(line) {
        Ok(parsed) => (
            (!parsed.response.is_empty()).then_some(parsed.response),
            parsed.done,
        ),
        Err(_) => (None, false),
    }
}

pub async fn generate(
    config: &OllamaConfig,
    request: &ChatRequest,
) -> Result<ChatResponse, LlmError> {
    let resp = config
        .client
        .post(format!("{}/api/generate", config.base_url))
        .timeout(config.timeout)
        .json(&build_request(request, false))
        .send()
        .await?;
    let resp = check_status(resp).await?;

    let data: GenerateLine = resp
        .json()
        .await
        .map_err(|e| LlmError::Parse(e.to_string()))?;

    Ok(ChatResponse {
        content: data.response,
        model: request.model.clone(),
    })
}

pub async fn generate_stream(
    config: &OllamaConfig,
    request: &ChatRequest,
    on_chunk: impl Fn(StreamChunk) + Send,
) -> Result<String, LlmError> {
    let resp = config
        .client
        .post(format!("{}/api/generate", config.base_url))
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
            let (text, done) = parse_ndjson_line(&line);
            if let Some(text) = text {
                full_content.push_str(&text);
                on_chunk(StreamChunk {
                    delta: text,
                    done: false,
                });
            }
            if done {
                on_chunk(StreamChunk {
                    delta: String::new(),
                    done: true,
                });
                return Ok(full_content);
            }
        }
    }

    if let Some(line) = lines.finish() {
        if let (Some(text), _) = parse_ndjson_line(&line) {
            full_content.push_str(&text);
            on_chunk(StreamChunk {
                delta: text,
                done: false,
            });
        }
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
    use crate::llm::{ChatMessage, Provider};
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn request(stream_model: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::system("You are an astrologer.")],
            model: stream_model.into(),
            images: None,
            options: GenerateOptions {
                temperature: Some(0.7),
                num_predict: Some(400),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_parse_ndjson_line() {
        assert_eq!(
            parse_ndjson_line(r#"{"response":"Jai","done":false}"#),
            (Some("Jai".into()), false)
        );
        assert_eq!(parse_ndjson_line(r#"{"response":"","done":true}"#), (None, true));
        assert_eq!(parse_ndjson_line("not json"), (None, false));
    }

    #[test]
    fn test_request_body_omits_unset_fields() {
        let req = request("qwen2:0.5b");
        let body = serde_json::to_value(build_request(&req, true)).unwrap();
        assert_eq!(body["prompt"], "You are an astrologer.");
        assert!(body.get("images").is_none());
        assert_eq!(body["options"]["num_predict"], 400);
        assert!(body["options"].get("num_ctx").is_none());
    }

    #[tokio::test]
    async fn test_generate_stream_relays_ndjson() {
        let body = "{\"response\":\"Mesh \",\"done\":false}\n{\"response\":\"rashi\",\"done\":false}\n{\"response\":\"\",\"done\":true}\n";
        let base = serve(Router::new().route("/api/generate", post(move || async move { body }))).await;
        let provider = Provider::ollama(Client::new(), base);

        let seen = Mutex::new(Vec::new());
        let full = provider
            .chat_stream(&request("qwen2:0.5b"), |c| seen.lock().unwrap().push(c.delta))
            .await
            .unwrap();
        assert_eq!(full, "Mesh rashi");
        assert_eq!(seen.into_inner().unwrap(), vec!["Mesh ", "rashi", ""]);
    }

    #[tokio::test]
    async fn test_generate_sends_prompt_and_reads_response() {
        let captured: Arc<Mutex<Option<serde_json::Value>>> = Arc::default();
        let sink = captured.clone();
        let base = serve(Router::new().route(
            "/api/generate",
            post(move |Json(body): Json<serde_json::Value>| {
                let sink = sink.clone();
                async move {
                    *sink.lock().unwrap() = Some(body);
                    Json(serde_json::json!({ "response": "Shubha", "done": true }))
                }
            }),
        ))
        .await;
        let provider = Provider::ollama(Client::new(), format!("{}/", base));

        let resp = provider.chat(&request("qwen2:0.5b")).await.unwrap();
        assert_eq!(resp.content, "Shubha");
        let body = captured.lock().unwrap().clone().unwrap();
        assert_eq!(body["stream"], false);
        assert_eq!(body["model"], "qwen2:0.5b");
    }
}
