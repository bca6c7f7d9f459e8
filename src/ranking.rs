//! Cosine similarity ranking of stored letter embeddings.
//!
//! Candidates come straight out of `letter_embeddings.json`, so each one may
//! be missing, a bare vector, or a letter object carrying an `embedding`
//! field. Anything that can't be scored is skipped rather than reported.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field that carries the vector when a candidate is a wrapper object.
const EMBEDDING_FIELD: &str = "embedding";

/// One entry of the candidate collection, as found on disk.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum RawEmbedding {
    /// `null`, or a wrapper object whose `embedding` is `null`
    Missing,
    /// A one-dimensional, purely numeric vector
    Vector(Vec<f32>),
    /// Any other shape
    Malformed,
}

impl RawEmbedding {
    /// Extract the numeric vector, if the candidate has a usable one.
    pub fn vector(&self) -> Option<&[f32]> {
        match self {
            RawEmbedding::Vector(v) => Some(v),
            _ => None,
        }
    }

    fn from_array(values: &[Value]) -> Self {
        let mut vector = Vec::with_capacity(values.len());
        for value in values {
            match value.as_f64() {
                Some(number) if (number as f32).is_finite() => vector.push(number as f32),
                _ => return RawEmbedding::Malformed,
            }
        }
        RawEmbedding::Vector(vector)
    }
}

impl From<Value> for RawEmbedding {
    fn from(value: Value) -> Self {
        RawEmbedding::from(&value)
    }
}

impl From<&Value> for RawEmbedding {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => RawEmbedding::Missing,
            Value::Array(values) => RawEmbedding::from_array(values),
            Value::Object(map) => match map.get(EMBEDDING_FIELD) {
                Some(Value::Null) => RawEmbedding::Missing,
                Some(Value::Array(values)) => RawEmbedding::from_array(values),
                _ => RawEmbedding::Malformed,
            },
            _ => RawEmbedding::Malformed,
        }
    }
}

impl From<Vec<f32>> for RawEmbedding {
    fn from(vector: Vec<f32>) -> Self {
        RawEmbedding::Vector(vector)
    }
}

impl From<Option<Vec<f32>>> for RawEmbedding {
    fn from(vector: Option<Vec<f32>>) -> Self {
        vector.map_or(RawEmbedding::Missing, RawEmbedding::Vector)
    }
}

/// A candidate that survived scoring and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredCandidate {
    /// Cosine similarity in [-1.0, 1.0]
    pub score: f32,
    /// Position in the original, unfiltered candidate collection
    pub index: usize,
}

/// Errors that make a ranking call meaningless.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RankError {
    #[error("query embedding is empty")]
    EmptyQuery,

    #[error("query embedding has zero norm")]
    ZeroNormQuery,

    #[error("query embedding contains non-finite values")]
    NonFiniteQuery,
}

/// Rank `candidates` against `query`.
///
/// Returns at most `limit` candidates scoring strictly above `threshold`,
/// highest score first, ties ordered by ascending index.
pub fn rank(
    query: &[f32],
    candidates: &[RawEmbedding],
    threshold: f32,
    limit: usize,
) -> Result<Vec<ScoredCandidate>, RankError> {
    if query.is_empty() {
        return Err(RankError::EmptyQuery);
    }
    if query.iter().any(|x| !x.is_finite()) {
        return Err(RankError::NonFiniteQuery);
    }

    let query_norm = l2_norm(query);
    if query_norm == 0.0 {
        return Err(RankError::ZeroNormQuery);
    }

    let scored: Vec<ScoredCandidate> = candidates
        .par_iter()
        .enumerate()
        .filter_map(|(index, candidate)| {
            let vector = candidate.vector()?;
            let score = cosine_similarity(query, vector, query_norm)?;
            Some(ScoredCandidate { score, index })
        })
        .collect();

    log::debug!(
        "scored {} of {} candidates (threshold={threshold}, limit={limit})",
        scored.len(),
        candidates.len()
    );

    let mut results: Vec<ScoredCandidate> = scored
        .into_iter()
        .filter(|candidate| candidate.score > threshold)
        .collect();

    results.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));
    results.truncate(limit);

    Ok(results)
}

/// L2 norm, accumulated in f64 so tiny and huge components don't under/overflow.
fn l2_norm(v: &[f32]) -> f64 {
    v.iter()
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        .sqrt()
}

/// Cosine similarity with a precomputed query norm.
/// `None` when the target can't be compared against the query.
fn cosine_similarity(query: &[f32], target: &[f32], query_norm: f64) -> Option<f32> {
    if target.len() != query.len() {
        return None;
    }

    let target_norm = l2_norm(target);
    if target_norm == 0.0 {
        return None;
    }

    let dot_product: f64 = query
        .iter()
        .zip(target.iter())
        .map(|(&a, &b)| f64::from(a) * f64::from(b))
        .sum();
    let score = (dot_product / (query_norm * target_norm)) as f32;

    score.is_finite().then_some(score)
}
