//! Minimal client for OpenAI-compatible JSON endpoints.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum OpenAiError {
    #[error("environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("api returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("api returned invalid JSON: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct OpenAiClient {
    api_base: String,
    api_key: String,
    timeout: Duration,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "OpenAiClient {{ api_base: {:?}, api_key: [REDUCTED], timeout: {:?} }}",
            self.api_base, self.timeout
        )
    }
}

impl OpenAiClient {
    pub fn new(api_base: &str, api_key: String, timeout: Duration) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            timeout,
        }
    }

    /// Build a client with the key taken from the environment variable `api_key_env`.
    pub fn from_env(api_base: &str, api_key_env: &str, timeout: Duration) -> Result<Self, OpenAiError> {
        let api_key = std::env::var(api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| OpenAiError::MissingApiKey(api_key_env.to_string()))?;

        Ok(Self::new(api_base, api_key, timeout))
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    /// POST a JSON body and return the decoded JSON response.
    ///
    /// Uses a blocking client built per call, so callers inside a tokio runtime
    /// must go through `block_in_place` or `spawn_blocking`.
    pub fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<Value, OpenAiError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;

        let resp = client
            .post(self.endpoint(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()?;

        let status = resp.status();
        let text = resp.text()?;

        decode_response(status.as_u16(), &text)
    }
}

/// Turn a response body into JSON, or into `Api` when the status is not 2xx.
/// Error bodies don't have to be JSON (proxies answer with HTML).
fn decode_response(status: u16, text: &str) -> Result<Value, OpenAiError> {
    if !(200..300).contains(&status) {
        let message = match serde_json::from_str::<Value>(text) {
            Ok(value) => error_message(&value),
            Err(_) => text.trim().to_string(),
        };
        return Err(OpenAiError::Api { status, message });
    }

    Ok(serde_json::from_str(text)?)
}

/// Pull a human readable message out of an error response.
fn error_message(value: &Value) -> String {
    value
        .get("error")
        .and_then(|err| err.get("message").or(Some(err)))
        .and_then(|msg| msg.as_str())
        .map(str::to_owned)
        .unwrap_or_else(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_joins_paths() {
        let client = OpenAiClient::new("https://api.openai.com/v1/", "k".into(), Duration::from_secs(1));
        assert_eq!(client.endpoint("/embeddings"), "https://api.openai.com/v1/embeddings");
        assert_eq!(
            client.endpoint("chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_missing_key() {
        let result = OpenAiClient::from_env(
            "https://api.openai.com/v1",
            "TRIBUTE_TEST_KEY_THAT_IS_NOT_SET",
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(OpenAiError::MissingApiKey(var)) if var == "TRIBUTE_TEST_KEY_THAT_IS_NOT_SET"));
    }

    #[test]
    fn test_error_message() {
        let value = json!({"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}});
        assert_eq!(error_message(&value), "Incorrect API key provided");

        let value = json!({"error": "rate limited"});
        assert_eq!(error_message(&value), "rate limited");

        let value = json!({"detail": "nope"});
        assert_eq!(error_message(&value), r#"{"detail":"nope"}"#);
    }

    #[test]
    fn test_decode_response() {
        let value = decode_response(200, r#"{"data": []}"#).unwrap();
        assert_eq!(value, json!({"data": []}));

        let err = decode_response(401, r#"{"error": {"message": "bad key"}}"#).unwrap_err();
        assert!(matches!(err, OpenAiError::Api { status: 401, message } if message == "bad key"));

        let err = decode_response(502, "<html>Bad Gateway</html>\n").unwrap_err();
        assert!(
            matches!(err, OpenAiError::Api { status: 502, message } if message == "<html>Bad Gateway</html>")
        );

        assert!(matches!(
            decode_response(200, "not json"),
            Err(OpenAiError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_debug_hides_key() {
        let client = OpenAiClient::new("http://localhost", "sk-secret".into(), Duration::from_secs(1));
        assert!(!format!("{client:?}").contains("sk-secret"));
    }
}
