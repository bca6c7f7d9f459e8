use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use super::{EmbeddingError, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::openai::OpenAiClient;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// Embeddings from an OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug)]
pub struct OpenAiEmbeddings {
    client: OpenAiClient,
    model: String,
}

impl OpenAiEmbeddings {
    pub fn new(client: OpenAiClient, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = OpenAiClient::from_env(
            &config.api_base,
            &config.api_key_env,
            Duration::from_secs(config.request_timeout_secs),
        )?;

        Ok(Self::new(client, &config.model))
    }
}

impl EmbeddingProvider for OpenAiEmbeddings {
    fn name(&self) -> &str {
        &self.model
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
        };

        let resp = self.client.post_json("embeddings", &request)?;
        parse_embedding_response(&resp)
    }
}

/// Extract `data[0].embedding` from an embeddings response.
fn parse_embedding_response(resp: &Value) -> Result<Vec<f32>, EmbeddingError> {
    let values = resp
        .get("data")
        .and_then(|data| data.get(0))
        .and_then(|item| item.get("embedding"))
        .and_then(|embedding| embedding.as_array())
        .ok_or(EmbeddingError::EmptyResponse)?;

    values
        .iter()
        .map(|value| value.as_f64().map(|v| v as f32))
        .collect::<Option<Vec<f32>>>()
        .filter(|vector| !vector.is_empty())
        .ok_or(EmbeddingError::EmptyResponse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_response() {
        let resp = json!({
            "object": "list",
            "data": [{"object": "embedding", "index": 0, "embedding": [0.1, -0.2, 0.3]}],
            "model": "text-embedding-3-small",
        });

        let vector = parse_embedding_response(&resp).unwrap();
        assert_eq!(vector, vec![0.1, -0.2, 0.3]);
    }

    #[test]
    fn test_parse_response_without_vector() {
        let resp = json!({"data": []});
        assert!(matches!(
            parse_embedding_response(&resp),
            Err(EmbeddingError::EmptyResponse)
        ));

        let resp = json!({"data": [{"embedding": [0.1, "x"]}]});
        assert!(matches!(
            parse_embedding_response(&resp),
            Err(EmbeddingError::EmptyResponse)
        ));
    }

    #[test]
    #[ignore = "requires OPENAI_API_KEY and network access"]
    fn test_live_embedding() {
        let provider = OpenAiEmbeddings::from_config(&EmbeddingConfig::default()).unwrap();
        let vector = provider.embed("Cartas sobre família").unwrap();
        assert_eq!(vector.len(), 1536);
    }
}
