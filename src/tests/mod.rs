mod search_flow;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::embeddings::{EmbeddingError, EmbeddingProvider};
use crate::letters::LetterStore;
use crate::pipeline;
use crate::search::SearchService;

const VOCABULARY: &[&str] = &["aniversário", "natal", "saudade", "viagem"];

/// Counts vocabulary words. Text without any of them embeds to a zero vector.
pub struct KeywordEmbeddings;

impl EmbeddingProvider for KeywordEmbeddings {
    fn name(&self) -> &str {
        "keywords"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text = text.to_lowercase();
        if text.contains("falha") {
            return Err(EmbeddingError::EmbeddingFailed("service unavailable".into()));
        }

        Ok(VOCABULARY
            .iter()
            .map(|word| text.matches(word).count() as f32)
            .collect())
    }
}

pub const LETTERS: &str = r#"[
    {"from": "Ana", "to": "Judith", "date": "12/03/1998", "text": "Feliz aniversário, querida! Muitos anos de vida.", "image_path": "all_letters/IMG_0001.jpg"},
    {"from": "Rui", "to": "Judith", "date": null, "text": "Feliz natal para toda a família."},
    {"from": "Bia", "to": "Judith", "text": "   "},
    {"from": "Leo", "to": "Judith", "text": "Que saudade da nossa viagem a Portugal."},
    {"from": "Eva", "text": "Saudade de você no meu aniversário."}
]"#;

/// Config rooted at `dir` with the letter fixtures in place.
pub fn fixture_config(dir: &Path) -> Config {
    let config = Config::load_with(dir).unwrap();
    std::fs::write(config.letters_path(), LETTERS).unwrap();
    config
}

/// Run the embed pipeline over the fixtures.
pub fn embed_fixtures(config: &Config) {
    pipeline::embed_letters(
        &config.letters_path(),
        &config.embeddings_path(),
        &KeywordEmbeddings,
        Duration::ZERO,
    )
    .unwrap();
}

pub fn search_service(config: &Config) -> SearchService {
    let store = Arc::new(LetterStore::new(
        config.letters_path(),
        config.embeddings_path(),
    ));
    SearchService::new(store, Arc::new(KeywordEmbeddings), config.search.clone())
}
