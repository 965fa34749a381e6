//! Anthropic messages adapter.
//!
//! Same header shape (`x-api-key`, `anthropic-version`) and
//! `content[0].text` response path as Anthropic's Messages API.

use crate::api_service::{classify_status, ApiCallError, CompletionRequest, CompletionResponse};
use shared::{ErrorCategory, TokenUsage};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub async fn call(client: &reqwest::Client, api_key: &str, request: &CompletionRequest) -> Result<CompletionResponse, ApiCallError> {
    let body = serde_json::json!({
        "model": request.model,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "messages": [{"role": "user", "content": request.prompt}],
    });

    let response = client
        .post("https://api.anthropic.com/v1/messages")
        .header("x-api-key", api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
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

    let content = json
        .get("content")
        .and_then(|c| c.get(0))
        .and_then(|item| item.get("text"))
        .and_then(|t| t.as_str())
        .ok_or_else(|| ApiCallError::new(ErrorCategory::EmptyResponse, "no content in Anthropic response"))?;

    if content.trim().is_empty() {
        return Err(ApiCallError::new(ErrorCategory::EmptyResponse, "Anthropic returned empty content"));
    }

    let stop_reason = json.get("stop_reason").and_then(|s| s.as_str()).unwrap_or("end_turn").to_string();

    if stop_reason == "refusal" {
        return Err(ApiCallError::new(ErrorCategory::ContentFiltered, "Anthropic refused the request"));
    }

    let usage = json.get("usage");
    let prompt_tokens = usage.and_then(|u| u.get("input_tokens")).and_then(|t| t.as_u64()).unwrap_or(0);
    let completion_tokens = usage.and_then(|u| u.get("output_tokens")).and_then(|t| t.as_u64()).unwrap_or(0);

    Ok(CompletionResponse {
        content: content.to_string(),
        finish_reason: stop_reason,
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
