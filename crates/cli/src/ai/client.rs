//! Raw HTTP calls to the analysis providers.

use diffsentry_core::{AnalysisError, AnalysisRequest};
use reqwest::blocking::Client;
use serde_json::{json, Value};

pub fn call_anthropic(
    client: &Client,
    api_key: &str,
    request: &AnalysisRequest,
) -> Result<String, AnalysisError> {
    let body = json!({
        "model": request.model,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "system": request.system_prompt,
        "messages": [{"role": "user", "content": request.user_prompt}]
    });

    let resp = client
        .post("https://api.anthropic.com/v1/messages")
        .header("x-api-key", api_key)
        .header("anthropic-version", "2023-06-01")
        .header("content-type", "application/json")
        .timeout(request.timeout)
        .json(&body)
        .send()
        .map_err(|e| classify(e, request))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        return Err(AnalysisError::Provider(format!(
            "Anthropic API error {}: {}",
            status, text
        )));
    }

    let json: Value = resp
        .json()
        .map_err(|e| AnalysisError::Provider(format!("bad response body: {}", e)))?;
    Ok(json["content"][0]["text"].as_str().unwrap_or("").to_string())
}

pub fn call_openai(
    client: &Client,
    api_key: &str,
    request: &AnalysisRequest,
) -> Result<String, AnalysisError> {
    let body = json!({
        "model": request.model,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
        "messages": [
            {"role": "system", "content": request.system_prompt},
            {"role": "user", "content": request.user_prompt}
        ]
    });

    let resp = client
        .post("https://api.openai.com/v1/chat/completions")
        .header("Authorization", format!("Bearer {}", api_key))
        .header("content-type", "application/json")
        .timeout(request.timeout)
        .json(&body)
        .send()
        .map_err(|e| classify(e, request))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        return Err(AnalysisError::Provider(format!(
            "OpenAI API error {}: {}",
            status, text
        )));
    }

    let json: Value = resp
        .json()
        .map_err(|e| AnalysisError::Provider(format!("bad response body: {}", e)))?;
    Ok(json["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string())
}

fn classify(error: reqwest::Error, request: &AnalysisRequest) -> AnalysisError {
    if error.is_timeout() {
        AnalysisError::Timeout(request.timeout)
    } else {
        AnalysisError::Provider(error.to_string())
    }
}
