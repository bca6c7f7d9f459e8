//! Question answering over the letter collection.
//!
//! Embeds the question, ranks the stored letter embeddings against it and
//! resolves the winners back into letters. An empty result means nothing
//! matched; failures are errors so callers can tell the two apart.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::embeddings::{EmbeddingError, EmbeddingProvider};
use crate::letters::{Letter, LetterStore, LetterStoreError};
use crate::ranking::{self, RankError};

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("threshold must be between -1.0 and 1.0, got {0}")]
    InvalidThreshold(f32),

    #[error("could not embed the question: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("could not rank letters: {0}")]
    Rank(#[from] RankError),

    #[error("letter data unavailable: {0}")]
    Data(#[from] LetterStoreError),
}

impl SearchError {
    /// The question itself couldn't be processed, as opposed to search being down.
    pub fn is_question_error(&self) -> bool {
        matches!(
            self,
            SearchError::EmptyQuestion
                | SearchError::InvalidThreshold(_)
                | SearchError::Embedding(_)
                | SearchError::Rank(_)
        )
    }
}

/// Per-call overrides for the configured defaults.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SearchOptions {
    pub threshold: Option<f32>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// 1-based rank
    pub position: usize,
    pub score: f32,
    /// Position of the letter in `letters.json`
    pub index: usize,
    pub letter: Letter,
}

pub struct SearchService {
    store: Arc<LetterStore>,
    provider: Arc<dyn EmbeddingProvider>,
    config: SearchConfig,
}

impl SearchService {
    pub fn new(
        store: Arc<LetterStore>,
        provider: Arc<dyn EmbeddingProvider>,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    pub fn store(&self) -> &Arc<LetterStore> {
        &self.store
    }

    pub fn search(
        &self,
        question: &str,
        opts: SearchOptions,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SearchError::EmptyQuestion);
        }

        let threshold = opts.threshold.unwrap_or(self.config.threshold);
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(SearchError::InvalidThreshold(threshold));
        }

        let embeddings = self.store.embeddings()?;
        let letters = self.store.letters()?;

        log::debug!("embedding question with {}", self.provider.name());
        let query = self.provider.embed(question)?;

        let candidates = if embeddings.len() > letters.len() {
            log::warn!(
                "{} has {} entries but {} has only {} letters, ignoring the rest",
                self.store.embeddings_path().display(),
                embeddings.len(),
                self.store.letters_path().display(),
                letters.len()
            );
            &embeddings[..letters.len()]
        } else {
            &embeddings[..]
        };

        let limit = opts.limit.unwrap_or(self.config.limit);

        let ranked = ranking::rank(&query, candidates, threshold, limit)?;
        log::info!("question matched {} letters", ranked.len());

        Ok(ranked
            .into_iter()
            .enumerate()
            .map(|(i, scored)| SearchHit {
                position: i + 1,
                score: scored.score,
                index: scored.index,
                letter: letters[scored.index].clone(),
            })
            .collect())
    }
}
