//! HTTP Transport
//!
//! Posts the [`RemoteCall`] as JSON to the step endpoint. A 2xx response is
//! a success whose body becomes the step output: JSON bodies are decoded,
//! other text is kept as a string, and an empty body means no output. Any
//! other status, or a failure to reach the endpoint, fails the step.

use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use serde_json::Value;

use super::{RemoteCall, RemoteTransport};

/// Longest response body quoted in a failure message.
const MAX_ERROR_BODY: usize = 200;

/// Remote transport speaking JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl RemoteTransport for HttpTransport {
    fn call(&self, call: &RemoteCall) -> Result<Option<Value>, String> {
        debug!("POST {} (step '{}')", call.endpoint, call.step_id);

        let response = self
            .client
            .post(&call.endpoint)
            .json(call)
            .send()
            .map_err(|e| format!("Request to {} failed: {}", call.endpoint, e))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| format!("Failed to read response from {}: {}", call.endpoint, e))?;

        if !status.is_success() {
            let detail = body.trim();
            return Err(if detail.is_empty() {
                format!("{} returned {}", call.endpoint, status)
            } else {
                format!(
                    "{} returned {}: {}",
                    call.endpoint,
                    status,
                    truncate(detail, MAX_ERROR_BODY)
                )
            });
        }

        Ok(decode_body(&body))
    }
}

/// Turns a successful response body into the step output.
fn decode_body(body: &str) -> Option<Value> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string())))
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}
