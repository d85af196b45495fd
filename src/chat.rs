//! The astrologer chat: prompt assembly, backend routing and the streamed
//! relay of the answer back to the browser.

use std::sync::Arc;

use futures::channel::mpsc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::models::NewChatMessage;
use crate::db::Store;
use crate::llm::{ChatMessage, ChatRequest, GenerateOptions, Provider, StreamChunk};
use crate::state::AppState;
use crate::vision::{self, Prepared};

/// First byte of every chat response, so proxies flush headers immediately.
pub const HEARTBEAT: &str = " ";
pub const FALLBACK: &str =
    "\nI'm having trouble connecting to my AI core. Please try again in 30 seconds.";

const PAGE_CONTENT_LIMIT: usize = 1000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatKundliRequest {
    #[serde(default)]
    pub user_question: String,
    pub file_data: Option<String>,
    pub mime_type: Option<String>,
    pub user_data: Option<Value>,
    pub kundli_data: Option<Value>,
    pub page_content: Option<String>,
    pub access_token: Option<String>,
}

/// The verified token owner, else the client-supplied `userData.user.id`.
pub async fn resolve_user(
    store: &dyn Store,
    access_token: Option<&str>,
    user_data: Option<&Value>,
) -> Option<String> {
    if let Some(token) = access_token.filter(|t| !t.is_empty()) {
        match store.user_for_token(token).await {
            Ok(Some(user)) => return Some(user.id),
            Ok(None) => warn!("access token rejected, falling back to client user data"),
            Err(e) => warn!(error = %e, "token verification failed"),
        }
    }
    user_data?
        .pointer("/user/id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

pub fn system_prompt(
    user_id: Option<&str>,
    kundli_data: Option<&Value>,
    page_content: Option<&str>,
    final_prompt: &str,
) -> String {
    let kundli = match kundli_data {
        None | Some(Value::Null) => "{}".to_string(),
        Some(v) => v.to_string(),
    };
    let page: String = page_content
        .unwrap_or_default()
        .chars()
        .take(PAGE_CONTENT_LIMIT)
        .collect();
    format!(
        "You are an expert Vedic astrologer for Nirvana Astro.\n\
         CONTEXT:\n\
         - User ID: {}\n\
         - Current Kundli Data: {}\n\
         - Relevant Page Text: {}\n\
         \n\
         USER QUESTION: {}",
        user_id.unwrap_or("Guest"),
        kundli,
        page,
        final_prompt
    )
}

/// Groq for plain text when a key is configured; Ollama for images or when
/// no key is set.
pub fn route(config: &Config, client: &Client, system: String, prepared: &Prepared) -> (Provider, ChatRequest) {
    if let (Some(key), None) = (&config.groq_api_key, &prepared.images) {
        let provider = Provider::groq(client.clone(), key.clone(), config.groq_base_url.clone())
            .with_timeout(config.groq_timeout);
        let request = ChatRequest {
            messages: vec![ChatMessage::system(system), ChatMessage::user(prepared.prompt.clone())],
            model: config.groq_model.clone(),
            images: None,
            options: GenerateOptions::default(),
        };
        return (provider, request);
    }

    let model = if prepared.images.is_some() {
        &config.ollama_vision_model
    } else {
        &config.ollama_model
    };
    let provider =
        Provider::ollama(client.clone(), config.ollama_base_url.clone()).with_timeout(config.ollama_timeout);
    let request = ChatRequest {
        // The system prompt already ends with the question.
        messages: vec![ChatMessage::system(system)],
        model: model.clone(),
        images: prepared.images.clone(),
        options: GenerateOptions {
            temperature: Some(0.7),
            num_predict: Some(400),
            num_ctx: Some(2048),
            ..Default::default()
        },
    };
    (provider, request)
}

/// Run a chat turn. The returned receiver yields the heartbeat, then the
/// answer as it streams in, and closes once the turn is finished.
pub async fn start(state: &AppState, body: ChatKundliRequest) -> mpsc::UnboundedReceiver<String> {
    // 1. Resolve the current user
    let user_id = resolve_user(
        state.store.as_ref(),
        body.access_token.as_deref(),
        body.user_data.as_ref(),
    )
    .await;

    // 2. Run any attachment through the CV service
    let prepared = vision::prepare(
        &state.client,
        &state.config.cv_base_url,
        &body.user_question,
        body.file_data.as_deref(),
        body.mime_type.as_deref(),
    )
    .await;

    // 3. Save user message
    if let Some(uid) = &user_id {
        let message = NewChatMessage {
            user_id: uid.clone(),
            role: "user".into(),
            content: body.user_question.clone(),
        };
        if let Err(e) = state.store.insert_chat_message(&message).await {
            warn!(error = %e, "failed to save user message");
        }
    }

    // 4. Build the prompt and pick a backend
    let system = system_prompt(
        user_id.as_deref(),
        body.kundli_data.as_ref(),
        body.page_content.as_deref(),
        &prepared.prompt,
    );
    let (provider, request) = route(&state.config, &state.client, system, &prepared);
    info!(provider = provider.name(), model = %request.model, user = user_id.as_deref().unwrap_or("guest"), "chat turn");

    // 5. Stream the answer from a separate task
    let (tx, rx) = mpsc::unbounded();
    let _ = tx.unbounded_send(HEARTBEAT.to_string());
    tokio::spawn(relay(
        state.store.clone(),
        provider,
        request,
        tx,
        user_id,
        prepared.chart_marker,
    ));
    rx
}

async fn relay(
    store: Arc<dyn Store>,
    provider: Provider,
    request: ChatRequest,
    tx: mpsc::UnboundedSender<String>,
    user_id: Option<String>,
    chart_marker: Option<String>,
) {
    let sink = tx.clone();
    let result = provider
        .chat_stream(&request, move |chunk: StreamChunk| {
            if !chunk.delta.is_empty() {
                let _ = sink.unbounded_send(chunk.delta);
            }
        })
        .await;

    let mut answer = match result {
        Ok(answer) => answer,
        Err(e) => {
            warn!(provider = provider.name(), error = %e, "chat backend failed");
            let _ = tx.unbounded_send(FALLBACK.to_string());
            return;
        }
    };

    let has_answer = !answer.is_empty();
    if let Some(marker) = chart_marker {
        let _ = tx.unbounded_send(marker.clone());
        answer.push_str(&marker);
    }

    // 6. Save assistant message
    if let (Some(uid), true) = (user_id, has_answer) {
        let message = NewChatMessage {
            user_id: uid,
            role: "assistant".into(),
            content: answer,
        };
        if let Err(e) = store.insert_chat_message(&message).await {
            warn!(error = %e, "failed to save assistant message");
        }
    }
}
