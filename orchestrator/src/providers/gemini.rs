//! Gemini generateContent adapter.
//!
//! API key travels as a query parameter rather than a header; response
//! content lives at `candidates[0].content.parts[0].text`. Gemini's usage
//! metadata is sometimes absent entirely, in which case the missing
//! counts default to zero rather than failing the call.

use crate::api_service::{classify_status, ApiCallError, CompletionRequest, CompletionResponse};
use shared::{ErrorCategory, TokenUsage};

pub async fn call(client: &reqwest::Client, api_key: &str, request: &CompletionRequest) -> Result<CompletionResponse, ApiCallError> {
    let body = serde_json::json!({
        "contents": [{"parts": [{"text": request.prompt}]}],
        "generationConfig": {
            "maxOutputTokens": request.max_tokens,
            "temperature": request.temperature,
        },
    });

    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
        request.model, api_key
    );

    let response = client
        .post(&url)
        .header("Content-Type", "application/json")
        .json(&body)
        .timeout(request.timeout)
        .send()
        .await
        .map_err(|e| network_error(&e))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ApiCallError::new(ErrorCategory::Server, format!("failed to read response body: {e}")))?;

    if !status.is_success() {
        return Err(classify_status(status.as_u16(), &text));
    }

    let json: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| ApiCallError::new(ErrorCategory::Server, format!("malformed json response: {e}")))?;

    let candidate = json.get("candidates").and_then(|c| c.get(0));

    let finish_reason = candidate
        .and_then(|c| c.get("finishReason"))
        .and_then(|f| f.as_str())
        .unwrap_or("STOP")
        .to_string();

    if finish_reason == "SAFETY" || finish_reason == "RECITATION" {
        return Err(ApiCallError::new(ErrorCategory::ContentFiltered, format!("Gemini blocked the response ({finish_reason})")));
    }

    let content = candidate
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("text"))
        .and_then(|t| t.as_str())
        .ok_or_else(|| ApiCallError::new(ErrorCategory::EmptyResponse, "no content in Gemini response"))?;

    if content.trim().is_empty() {
        return Err(ApiCallError::new(ErrorCategory::EmptyResponse, "Gemini returned empty content"));
    }

    let usage = json.get("usageMetadata");
    let prompt_tokens = usage.and_then(|u| u.get("promptTokenCount")).and_then(|t| t.as_u64()).unwrap_or(0);
    let completion_tokens = usage.and_then(|u| u.get("candidatesTokenCount")).and_then(|t| t.as_u64()).unwrap_or(0);

    Ok(CompletionResponse {
        content: content.to_string(),
        finish_reason,
        usage: TokenUsage {
            prompt_tokens,
            completion_tokens,
        },
    })
}

fn network_error(e: &reqwest::Error) -> ApiCallError {
    if e.is_timeout() {
        ApiCallError::new(ErrorCategory::Server, "request timed out")
    } else {
        ApiCallError::new(ErrorCategory::Server, format!("network error: {e}"))
    }
}
