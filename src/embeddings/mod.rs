//! Text embedding providers.
//!
//! - `openai`: hosted OpenAI-compatible `/embeddings` endpoint
//! - `local`: fastembed model running in-process (feature `local-embeddings`)
//!
//! Query vectors must come from the same model as the stored letter
//! embeddings, otherwise scores are meaningless.

#[cfg(feature = "local-embeddings")]
pub mod local;
pub mod openai;

use std::{path::Path, sync::Arc};

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::openai::OpenAiError;

#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbeddings;
pub use openai::OpenAiEmbeddings;

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error(transparent)]
    Api(#[from] OpenAiError),

    #[error("embedding response had no vector")]
    EmptyResponse,

    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),

    #[error("provider {0:?} is not available in this build")]
    Unavailable(EmbeddingProviderKind),
}

/// Something that turns a piece of text into a vector.
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, for logs
    fn name(&self) -> &str;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Build the provider selected in the config.
pub fn provider_from_config(
    config: &EmbeddingConfig,
    base_path: &Path,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider {
        EmbeddingProviderKind::OpenAi => Ok(Arc::new(OpenAiEmbeddings::from_config(config)?)),

        #[cfg(feature = "local-embeddings")]
        EmbeddingProviderKind::Local => Ok(Arc::new(LocalEmbeddings::new(
            &config.local_model,
            base_path.to_path_buf(),
        )?)),

        #[cfg(not(feature = "local-embeddings"))]
        EmbeddingProviderKind::Local => {
            let _ = base_path;
            Err(EmbeddingError::Unavailable(EmbeddingProviderKind::Local))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::OpenAiError;

    #[test]
    fn test_openai_provider_needs_key() {
        let config = EmbeddingConfig {
            api_key_env: "TRIBUTE_TEST_EMBEDDING_KEY_UNSET".to_string(),
            ..Default::default()
        };

        let result = provider_from_config(&config, Path::new("."));
        assert!(matches!(
            result,
            Err(EmbeddingError::Api(OpenAiError::MissingApiKey(_)))
        ));
    }

    #[test]
    fn test_local_provider_rejects_unknown_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbeddingConfig {
            provider: EmbeddingProviderKind::Local,
            local_model: "not-a-model".to_string(),
            ..Default::default()
        };

        let result = provider_from_config(&config, dir.path());

        #[cfg(feature = "local-embeddings")]
        assert!(matches!(result, Err(EmbeddingError::InvalidModel(_))));

        #[cfg(not(feature = "local-embeddings"))]
        assert!(matches!(result, Err(EmbeddingError::Unavailable(_))));
    }
}
