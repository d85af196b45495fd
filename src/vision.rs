//! Image attachments on the chat route: chart photos and palm photos are
//! sent to the CV service, whose findings are folded into the prompt.

use reqwest::Client;
use serde_json::{json, Value};
use tracing::{error, warn};

pub const CHART_START: &str = ":::CHART_DATA_START:::";
pub const CHART_END: &str = ":::CHART_DATA_END:::";

const PALM_KEYWORDS: [&str; 4] = ["palm", "hand", "hast", "line"];

/// Prompt and model inputs after looking at an attachment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Prepared {
    pub prompt: String,
    /// Appended to the streamed answer and to the stored assistant turn.
    pub chart_marker: Option<String>,
    /// Raw base64 for a vision model, set only when the CV service was
    /// unreachable.
    pub images: Option<Vec<String>>,
}

pub fn is_palmistry(question: &str) -> bool {
    let lower = question.to_lowercase();
    PALM_KEYWORDS.iter().any(|k| lower.contains(k))
}

pub fn chart_marker(horoscope_data: &Value) -> String {
    format!("{}{}{}", CHART_START, horoscope_data, CHART_END)
}

/// The payload of a `data:` URL: the segment after the first comma.
pub fn base64_payload(data_url: &str) -> String {
    data_url
        .split(',')
        .nth(1)
        .unwrap_or(data_url)
        .to_string()
}

/// Run the attachment through the CV service when it is an image.
///
/// A non-2xx answer leaves the question as the prompt; a transport or
/// decoding failure hands the raw image to the vision model instead.
pub async fn prepare(
    client: &Client,
    cv_base_url: &str,
    question: &str,
    file_data: Option<&str>,
    mime_type: Option<&str>,
) -> Prepared {
    let mut prepared = Prepared {
        prompt: question.to_string(),
        ..Default::default()
    };
    let (Some(file_data), Some(mime)) = (file_data, mime_type) else {
        return prepared;
    };
    if !mime.starts_with("image/") {
        return prepared;
    }

    let palm = is_palmistry(question);
    let endpoint = if palm { "/analyze-palm" } else { "/analyze" };
    let url = format!("{}{}", cv_base_url.trim_end_matches('/'), endpoint);

    let outcome: Result<Option<Value>, reqwest::Error> = async {
        let resp = client
            .post(&url)
            .json(&json!({ "image": file_data }))
            .send()
            .await?;
        if !resp.status().is_success() {
            warn!(status = %resp.status(), endpoint, "CV service rejected the image");
            return Ok(None);
        }
        Ok(Some(resp.json::<Value>().await?))
    }
    .await;

    match outcome {
        Ok(Some(cv)) if palm => {
            prepared.prompt = format!("Analyze this palmistry data: {}. User asked: {}", cv, question);
        }
        Ok(Some(cv)) => {
            let facts = cv.get("horoscope_data").cloned().unwrap_or(Value::Null);
            prepared.prompt = format!(
                "I have analyzed the Kundali image. Facts: {}. User asked: {}",
                facts, question
            );
            prepared.chart_marker = Some(chart_marker(&facts));
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "CV service failed, falling back to LLM vision");
            prepared.images = Some(vec![base64_payload(file_data)]);
        }
    }
    prepared
}
