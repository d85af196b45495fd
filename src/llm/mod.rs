pub mod groq;
pub mod ollama;

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Sampling options forwarded to the backend. Unset fields are omitted.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    /// Base64 images for vision models (Ollama only).
    pub images: Option<Vec<String>>,
    pub options: GenerateOptions,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamChunk {
    pub delta: String,
    pub done: bool,
}

/// LLM backend: Groq's OpenAI-compatible cloud API or a local Ollama.
#[derive(Debug, Clone)]
pub enum Provider {
    Groq(groq::GroqConfig),
    Ollama(ollama::OllamaConfig),
}

/// Deadline for a whole Groq request, including the streamed body.
pub const GROQ_TIMEOUT: Duration = Duration::from_secs(60);
/// Local models are slower to produce a full answer.
pub const OLLAMA_TIMEOUT: Duration = Duration::from_secs(120);

impl Provider {
    pub fn groq(client: Client, api_key: String, base_url: String) -> Self {
        Provider::Groq(groq::GroqConfig {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: GROQ_TIMEOUT,
        })
    }

    pub fn ollama(client: Client, host: String) -> Self {
        Provider::Ollama(ollama::OllamaConfig {
            client,
            base_url: host.trim_end_matches('/').to_string(),
            timeout: OLLAMA_TIMEOUT,
        })
    }

    /// Replace the per-request deadline. An expired deadline surfaces as
    /// `LlmError::Http`, mid-stream included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        match &mut self {
            Provider::Groq(config) => config.timeout = timeout,
            Provider::Ollama(config) => config.timeout = timeout,
        }
        self
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Groq(_) => "groq",
            Provider::Ollama(_) => "ollama",
        }
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        match self {
            Provider::Groq(config) => groq::chat(config, request).await,
            Provider::Ollama(config) => ollama::generate(config, request).await,
        }
    }

    pub async fn chat_stream(
        &self,
        request: &ChatRequest,
        on_chunk: impl Fn(StreamChunk) + Send,
    ) -> Result<String, LlmError> {
        match self {
            Provider::Groq(config) => groq::chat_stream(config, request, on_chunk).await,
            Provider::Ollama(config) => ollama::generate_stream(config, request, on_chunk).await,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Splits a byte stream into lines, keeping partial lines (and partial UTF-8
/// sequences) buffered until their newline arrives.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append a network chunk and return every line it completed, trimmed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }

    /// Whatever is left once the stream ends without a trailing newline.
    pub fn finish(self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.pending).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

/// Turn a non-2xx response into [`LlmError::Api`].
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    Err(LlmError::Api {
        status,
        message: text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_buffer_joins_split_lines() {
        let mut buf = LineBuffer::default();
        assert!(buf.push(b"data: {\"a\":").is_empty());
        let lines = buf.push(b"1}\n\ndata: [DONE]\n");
        assert_eq!(lines, vec!["data: {\"a\":1}", "data: [DONE]"]);
        assert!(buf.finish().is_none());
    }

    #[test]
    fn test_line_buffer_keeps_multibyte_chars_intact() {
        let text = "{\"response\":\"नमस्ते\"}\n".as_bytes();
        let (head, tail) = text.split_at(15);
        let mut buf = LineBuffer::default();
        assert!(buf.push(head).is_empty());
        assert_eq!(buf.push(tail), vec!["{\"response\":\"नमस्ते\"}"]);
    }

    #[test]
    fn test_line_buffer_finish_returns_tail() {
        let mut buf = LineBuffer::default();
        buf.push(b"{\"done\":true}");
        assert_eq!(buf.finish().as_deref(), Some("{\"done\":true}"));
    }
}
