//! OpenAI chat completions adapter.
//!
//! Talks to `/chat/completions` with the caller's prompt text, token
//! budget, and temperature.

use crate::api_service::{classify_status, ApiCallError, CompletionRequest, CompletionResponse};
use shared::{ErrorCategory, TokenUsage};

pub async fn call(client: &reqwest::Client, api_key: &str, request: &CompletionRequest) -> Result<CompletionResponse, ApiCallError> {
    let body = serde_json::json!({
        "model": request.model,
        "messages": [{"role": "user", "content": request.prompt}],
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
    });

    let response = client
        .post("https://api.openai.com/v1/chat/completions")
        .header("Authorization", format!("Bearer {api_key}"))
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

    let choice = json.get("choices").and_then(|c| c.get(0));
    let content = choice
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| ApiCallError::new(ErrorCategory::EmptyResponse, "no content in OpenAI response"))?;

    if content.trim().is_empty() {
        return Err(ApiCallError::new(ErrorCategory::EmptyResponse, "OpenAI returned empty content"));
    }

    let finish_reason = choice
        .and_then(|c| c.get("finish_reason"))
        .and_then(|f| f.as_str())
        .unwrap_or("stop")
        .to_string();

    if finish_reason == "content_filter" {
        return Err(ApiCallError::new(ErrorCategory::ContentFiltered, "OpenAI filtered the response"));
    }

    let usage = json.get("usage");
    let prompt_tokens = usage.and_then(|u| u.get("prompt_tokens")).and_then(|t| t.as_u64()).unwrap_or(0);
    let completion_tokens = usage.and_then(|u| u.get("completion_tokens")).and_then(|t| t.as_u64()).unwrap_or(0);

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
