//! Letter records and the embeddings that go with them.
//!
//! Both files are loaded whole and cached. A cached file is reloaded when its
//! modification time changes, so regenerating embeddings doesn't need a restart.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::SystemTime,
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ranking::RawEmbedding;

const UNKNOWN_PERSON: &str = "Desconhecido";
const UNKNOWN_DATE: &str = "Data desconhecida";
const MISSING_TEXT: &str = "Texto não disponível";

/// A transcribed letter, as stored in `letters.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Letter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,

    /// Anything else the record carries is kept as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Letter {
    pub fn title(&self) -> Option<&str> {
        non_blank(&self.title)
    }

    pub fn sender(&self) -> &str {
        non_blank(&self.from).unwrap_or(UNKNOWN_PERSON)
    }

    pub fn recipient(&self) -> &str {
        non_blank(&self.to).unwrap_or(UNKNOWN_PERSON)
    }

    pub fn date_label(&self) -> &str {
        non_blank(&self.date).unwrap_or(UNKNOWN_DATE)
    }

    pub fn body(&self) -> &str {
        self.text.as_deref().unwrap_or(MISSING_TEXT)
    }

    /// Text worth embedding, if any.
    pub fn embeddable_text(&self) -> Option<&str> {
        non_blank(&self.text)
    }

    /// File name of the scanned image, looked up in the letter images dir.
    pub fn image_file_name(&self) -> Option<&str> {
        let path = non_blank(&self.image_path)?;
        Path::new(path).file_name().and_then(|name| name.to_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LetterStoreError {
    #[error("couldn't read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("couldn't parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

struct Cached<T> {
    modified: SystemTime,
    value: Arc<T>,
}

/// A JSON file kept in memory until it changes on disk.
struct CachedJson<T> {
    path: PathBuf,
    state: RwLock<Option<Cached<T>>>,
}

impl<T: DeserializeOwned> CachedJson<T> {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: RwLock::new(None),
        }
    }

    fn modtime(&self) -> Result<SystemTime, LetterStoreError> {
        std::fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .map_err(|source| LetterStoreError::Io {
                path: self.path.clone(),
                source,
            })
    }

    fn get(&self) -> Result<Arc<T>, LetterStoreError> {
        let modified = self.modtime()?;

        {
            let state = self.state.read().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = state.as_ref() {
                if cached.modified == modified {
                    return Ok(cached.value.clone());
                }
            }
        }

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        // another reader may have refreshed it meanwhile
        if let Some(cached) = state.as_ref() {
            if cached.modified == modified {
                return Ok(cached.value.clone());
            }
        }

        log::info!("loading {}", self.path.display());
        let value = Arc::new(self.load()?);
        *state = Some(Cached {
            modified,
            value: value.clone(),
        });

        Ok(value)
    }

    fn load(&self) -> Result<T, LetterStoreError> {
        let data = std::fs::read(&self.path).map_err(|source| LetterStoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        serde_json::from_slice(&data).map_err(|source| LetterStoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

/// One page of the letter gallery.
#[derive(Debug, Clone, Serialize)]
pub struct LetterPage {
    pub page: usize,
    pub total_pages: usize,
    pub total: usize,
    /// 1-based position of the first letter on the page (0 when empty)
    pub start: usize,
    /// 1-based position of the last letter on the page
    pub end: usize,
    pub letters: Vec<Letter>,
}

pub struct LetterStore {
    letters: CachedJson<Vec<Letter>>,
    embeddings: CachedJson<Vec<RawEmbedding>>,
}

impl LetterStore {
    pub fn new(letters_path: PathBuf, embeddings_path: PathBuf) -> Self {
        Self {
            letters: CachedJson::new(letters_path),
            embeddings: CachedJson::new(embeddings_path),
        }
    }

    pub fn letters_path(&self) -> &Path {
        &self.letters.path
    }

    pub fn embeddings_path(&self) -> &Path {
        &self.embeddings.path
    }

    pub fn letters(&self) -> Result<Arc<Vec<Letter>>, LetterStoreError> {
        self.letters.get()
    }

    pub fn embeddings(&self) -> Result<Arc<Vec<RawEmbedding>>, LetterStoreError> {
        self.embeddings.get()
    }

    pub fn letter(&self, index: usize) -> Result<Option<Letter>, LetterStoreError> {
        Ok(self.letters()?.get(index).cloned())
    }

    /// Fetch a 1-based page. Out of range pages are clamped.
    pub fn page(&self, page: usize, per_page: usize) -> Result<LetterPage, LetterStoreError> {
        let letters = self.letters()?;
        Ok(paginate(&letters, page, per_page))
    }
}

fn paginate(letters: &[Letter], page: usize, per_page: usize) -> LetterPage {
    let per_page = per_page.max(1);
    let total = letters.len();
    let total_pages = total.div_ceil(per_page).max(1);
    let page = page.clamp(1, total_pages);

    let start_idx = (page - 1) * per_page;
    let end_idx = (start_idx + per_page).min(total);

    LetterPage {
        page,
        total_pages,
        total,
        start: if total == 0 { 0 } else { start_idx + 1 },
        end: end_idx,
        letters: letters[start_idx..end_idx].to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn letter(text: &str) -> Letter {
        Letter {
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_letter_display_defaults() {
        let letter: Letter = serde_json::from_str(r#"{"from": "  ", "text": null}"#).unwrap();

        assert_eq!(letter.sender(), "Desconhecido");
        assert_eq!(letter.recipient(), "Desconhecido");
        assert_eq!(letter.date_label(), "Data desconhecida");
        assert_eq!(letter.body(), "Texto não disponível");
        assert!(letter.title().is_none());
        assert!(letter.embeddable_text().is_none());
    }

    #[test]
    fn test_letter_keeps_extra_fields() {
        let json = r#"{"from": "Ana", "to": "Judith", "date": "01/02/1980", "text": "Oi", "image_path": "archive/temp_images/carta_page1.jpg", "page": 1}"#;
        let letter: Letter = serde_json::from_str(json).unwrap();

        assert_eq!(letter.extra.get("page"), Some(&Value::from(1)));
        assert_eq!(letter.image_file_name(), Some("carta_page1.jpg"));

        let back = serde_json::to_value(&letter).unwrap();
        assert_eq!(back["page"], Value::from(1));
        assert_eq!(back["from"], Value::from("Ana"));
    }

    #[test]
    fn test_absent_fields_stay_absent() {
        let json = serde_json::json!({"from": "Ana", "text": "Oi", "page": 2});
        let letter: Letter = serde_json::from_value(json.clone()).unwrap();

        assert_eq!(serde_json::to_value(&letter).unwrap(), json);
    }

    #[test]
    fn test_pagination() {
        let letters: Vec<Letter> = (0..12).map(|i| letter(&i.to_string())).collect();

        let first = paginate(&letters, 1, 5);
        assert_eq!(first.total_pages, 3);
        assert_eq!((first.start, first.end), (1, 5));
        assert_eq!(first.letters.len(), 5);

        let last = paginate(&letters, 3, 5);
        assert_eq!((last.start, last.end), (11, 12));
        assert_eq!(last.letters[0].body(), "10");

        let clamped = paginate(&letters, 99, 5);
        assert_eq!(clamped.page, 3);

        let clamped = paginate(&letters, 0, 5);
        assert_eq!(clamped.page, 1);
    }

    #[test]
    fn test_pagination_empty() {
        let page = paginate(&[], 1, 5);
        assert_eq!(page.total_pages, 1);
        assert_eq!((page.start, page.end), (0, 0));
        assert!(page.letters.is_empty());
    }

    #[test]
    fn test_store_loads_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let letters_path = dir.path().join("letters.json");
        let embeddings_path = dir.path().join("letter_embeddings.json");

        std::fs::write(&letters_path, r#"[{"text": "primeira"}]"#).unwrap();
        std::fs::write(&embeddings_path, r#"[[1, 0], null]"#).unwrap();

        let store = LetterStore::new(letters_path.clone(), embeddings_path);
        let first = store.letters().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(store.embeddings().unwrap().len(), 2);

        // cached: same allocation
        assert!(Arc::ptr_eq(&first, &store.letters().unwrap()));

        // make sure the modification time moves
        std::thread::sleep(Duration::from_millis(20));
        std::fs::write(&letters_path, r#"[{"text": "a"}, {"text": "b"}]"#).unwrap();
        let file = std::fs::File::options().write(true).open(&letters_path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5)).unwrap();

        assert_eq!(store.letters().unwrap().len(), 2);
        assert_eq!(store.letter(1).unwrap().unwrap().body(), "b");
        assert!(store.letter(2).unwrap().is_none());
    }

    #[test]
    fn test_store_errors() {
        let dir = tempfile::tempdir().unwrap();
        let letters_path = dir.path().join("letters.json");
        let store = LetterStore::new(letters_path.clone(), dir.path().join("missing.json"));

        assert!(matches!(store.embeddings(), Err(LetterStoreError::Io { .. })));

        std::fs::write(&letters_path, "not json").unwrap();
        assert!(matches!(store.letters(), Err(LetterStoreError::Parse { .. })));
    }
}
