use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;

use crate::embeddings::EmbeddingProvider;
use crate::letters::Letter;
use crate::storage::write_atomic;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmbedSummary {
    pub total: usize,
    pub embedded: usize,
    /// Letters without text
    pub skipped: usize,
    /// Letters whose embedding request failed
    pub failed: usize,
}

/// Embed every letter of `letters_path` and write the result to `output_path`.
///
/// Each output entry is the letter object with an extra `embedding` field,
/// `null` when the letter has no text or the provider failed, so positions
/// keep matching `letters.json`.
pub fn embed_letters(
    letters_path: &Path,
    output_path: &Path,
    provider: &dyn EmbeddingProvider,
    delay: Duration,
) -> anyhow::Result<EmbedSummary> {
    let data = std::fs::read(letters_path)
        .with_context(|| format!("couldn't read {}", letters_path.display()))?;
    let letters: Vec<Letter> = serde_json::from_slice(&data)
        .with_context(|| format!("couldn't parse {}", letters_path.display()))?;

    log::info!(
        "embedding {} letters with {}",
        letters.len(),
        provider.name()
    );

    let mut summary = EmbedSummary {
        total: letters.len(),
        ..Default::default()
    };
    let mut output = Vec::with_capacity(letters.len());
    let bar = super::progress_bar(letters.len(), "embedding letters");

    for (idx, letter) in letters.iter().enumerate() {
        let embedding = match letter.embeddable_text() {
            None => {
                summary.skipped += 1;
                None
            }
            Some(text) => {
                let result = provider.embed(text);
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }

                match result {
                    Ok(vector) => {
                        summary.embedded += 1;
                        Some(vector)
                    }
                    Err(err) => {
                        bar.suspend(|| log::error!("error for letter {idx}: {err}"));
                        summary.failed += 1;
                        None
                    }
                }
            }
        };

        output.push(with_embedding(letter, embedding)?);
        bar.inc(1);
    }
    bar.finish_and_clear();

    let json = serde_json::to_vec_pretty(&output)?;
    write_atomic(output_path, &json)
        .with_context(|| format!("couldn't write {}", output_path.display()))?;

    log::info!(
        "saved {} embeddings to {} ({} skipped, {} failed)",
        summary.embedded,
        output_path.display(),
        summary.skipped,
        summary.failed
    );

    Ok(summary)
}

fn with_embedding(letter: &Letter, embedding: Option<Vec<f32>>) -> anyhow::Result<Value> {
    let mut item = serde_json::to_value(letter)?;
    if let Value::Object(map) = &mut item {
        map.insert("embedding".to_string(), serde_json::to_value(embedding)?);
    }
    Ok(item)
}
