//! Voice assistant: a short, non-streamed Ollama answer suited to speech.

use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::llm::{ChatMessage, ChatRequest, GenerateOptions, LlmError, Provider};

const KNOWLEDGE_LIMIT: usize = 1000;

/// Condensed graha reference embedded in the voice prompt.
const KNOWLEDGE_BASE: &str = r#"{"planets":{"sun":{"name":{"en":"Sun","ne":"सूर्य"},"karaka":["soul","father","authority","vitality"],"element":"Fire","exaltation":"Aries 10°","debilitation":"Libra 10°","remedies":{"mantra":"Om Ghrini Suryaya Namah","gemstone":"Ruby (Manik)"}},"moon":{"name":{"en":"Moon","ne":"चंद्र"},"karaka":["mind","mother","emotions","public"],"element":"Water","exaltation":"Taurus 3°","debilitation":"Scorpio 3°","remedies":{"mantra":"Om Chandraya Namah","gemstone":"Pearl (Moti)"}},"mars":{"name":{"en":"Mars","ne":"मंगल"},"karaka":["energy","siblings","courage","action"],"element":"Fire","exaltation":"Capricorn 28°","debilitation":"Cancer 28°","remedies":{"mantra":"Om Mangalaya Namah","gemstone":"Red Coral (Moonga)"}},"mercury":{"name":{"en":"Mercury","ne":"बुध"},"karaka":["communication","intellect","trade","logic"],"element":"Earth","exaltation":"Virgo 15°","debilitation":"Pisces 15°","remedies":{"mantra":"Om Budhaya Namah","gemstone":"Emerald (Panna)"}},"jupiter":{"name":{"en":"Jupiter","ne":"गुरु"},"karaka":["wisdom","children","wealth","religion"],"element":"Ether","exaltation":"Cancer 5°","debilitation":"Capricorn 5°","remedies":{"mantra":"Om Gurave Namah","gemstone":"Yellow Sapphire (Pukhraj)"}}}}"#;

/// Clients also send `kundliData` and `voiceSettings`; neither shapes the
/// answer, so they are left undeserialized.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceChatRequest {
    #[serde(default)]
    pub user_question: String,
    pub user_data: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceChatResponse {
    pub success: bool,
    pub response: String,
    pub voice_optimized: bool,
    pub timestamp: String,
}

pub fn system_prompt(user_data: Option<&Value>) -> String {
    let authenticated = user_data
        .and_then(|u| u.get("isAuthenticated"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let records = user_data
        .and_then(|u| u.get("savedKundliData"))
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    let rules = if authenticated {
        "CRITICAL RESPONSE RULE: For simple factual questions, give direct answers without explanations. Answer directly based on user's birth data."
    } else {
        "Suggest logging in for personalized readings."
    };
    let knowledge: String = KNOWLEDGE_BASE.chars().take(KNOWLEDGE_LIMIT).collect();

    format!(
        "You are an expert Vedic astrologer with VOICE CAPABILITIES.\n\n{}\n\n\
         SYSTEM DATA:\n\
         - Knowledge Base: {}\n\
         - User Status: {}\n\
         - Records: {}\n",
        rules,
        knowledge,
        if authenticated { "Authenticated" } else { "Guest" },
        records
    )
}

pub async fn answer(config: &Config, client: &Client, body: &VoiceChatRequest) -> Result<VoiceChatResponse, LlmError> {
    let provider =
        Provider::ollama(client.clone(), config.ollama_base_url.clone()).with_timeout(config.ollama_timeout);
    let request = ChatRequest {
        messages: vec![
            ChatMessage::system(system_prompt(body.user_data.as_ref())),
            ChatMessage::user(format!("User Question: {}", body.user_question)),
        ],
        model: config.ollama_model.clone(),
        images: None,
        options: GenerateOptions {
            temperature: Some(0.7),
            top_p: Some(0.9),
            num_predict: Some(400),
            ..Default::default()
        },
    };
    let reply = provider.chat(&request).await?;
    Ok(VoiceChatResponse {
        success: true,
        response: reply.content,
        voice_optimized: true,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}
