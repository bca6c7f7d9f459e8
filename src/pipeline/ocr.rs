//! Transcribe scanned letters with a vision model.
//!
//! Each image is sent as a base64 JPEG to a chat-completions endpoint which
//! is asked to answer with a strict JSON letter record.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use regex::Regex;
use serde_json::{json, Value};

use crate::config::OcrConfig;
use crate::letters::Letter;
use crate::openai::{OpenAiClient, OpenAiError};
use crate::storage::write_atomic;

const SUPPORTED_IMAGES: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

const SYSTEM_PROMPT: &str =
    "Você é um arquivista especializado em cartas antigas escritas em português.";

const IMAGE_PATH_PLACEHOLDER: &str = "CAMINHO_RELATIVO_DA_IMAGEM";

const USER_PROMPT: &str = r#"A carta nesta imagem está escrita em português. Transcreva o texto com cuidado, mantendo a ortografia e a pontuação originais. Identifique:
1. Quem escreveu a carta ('from')
2. Para quem foi escrita ('to')
3. A data da carta, se estiver visível ('date')
4. O texto completo da carta ('text')

Responda apenas com JSON no formato:
{
  "from": "Nome de quem escreveu ou null",
  "to": "Nome do destinatário ou null",
  "date": "DD/MM/AAAA ou null",
  "text": "Transcrição completa",
  "image_path": "CAMINHO_RELATIVO_DA_IMAGEM"
}"#;

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("couldn't read image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Api(#[from] OpenAiError),

    #[error("model response had no content")]
    EmptyResponse,

    #[error("model did not return valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Vision model client for letter transcription.
#[derive(Debug)]
pub struct OcrClient {
    client: OpenAiClient,
    model: String,
}

impl OcrClient {
    pub fn new(client: OpenAiClient, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    pub fn from_config(config: &OcrConfig) -> Result<Self, OcrError> {
        let client = OpenAiClient::from_env(
            &config.api_base,
            &config.api_key_env,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::new(client, &config.model))
    }

    /// Transcribe one image. `relative_path` ends up in the letter's `image_path`.
    pub fn transcribe(&self, image_path: &Path, relative_path: &str) -> Result<Letter, OcrError> {
        let encoded = encode_image(image_path)?;

        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {
                    "role": "user",
                    "content": [
                        {"type": "text", "text": USER_PROMPT.replace(IMAGE_PATH_PLACEHOLDER, relative_path)},
                        {"type": "image_url", "image_url": {"url": format!("data:image/jpeg;base64,{encoded}")}}
                    ]
                }
            ]
        });

        let resp = self.client.post_json("chat/completions", &body)?;
        let raw_output = message_content(&resp).ok_or(OcrError::EmptyResponse)?;
        log::debug!("raw model output for {relative_path}: {raw_output}");

        let mut letter = parse_letter(raw_output)?;
        letter.image_path = Some(relative_path.to_string());

        Ok(letter)
    }
}

/// Re-encode any supported image as an RGB JPEG, base64 encoded.
pub fn encode_image(path: &Path) -> Result<String, OcrError> {
    let to_err = |source: image::ImageError| OcrError::Image {
        path: path.to_path_buf(),
        source,
    };

    let img = image::open(path).map_err(to_err)?;
    let rgb = image::DynamicImage::ImageRgb8(img.to_rgb8());

    let mut buffer = Cursor::new(Vec::new());
    rgb.write_to(&mut buffer, ImageFormat::Jpeg).map_err(to_err)?;

    Ok(STANDARD.encode(buffer.into_inner()))
}

fn message_content(resp: &Value) -> Option<&str> {
    resp.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
}

/// Strip Markdown code fences (```` ```json ````) around a model answer.
pub fn clean_json_output(raw_output: &str) -> &str {
    static OPENING: OnceLock<Regex> = OnceLock::new();
    static CLOSING: OnceLock<Regex> = OnceLock::new();

    let opening = OPENING.get_or_init(|| Regex::new(r"(?i)^```(?:json)?\s*").expect("valid regex"));
    let closing = CLOSING.get_or_init(|| Regex::new(r"\s*```$").expect("valid regex"));

    let trimmed = raw_output.trim();
    let start = opening.find(trimmed).map_or(0, |m| m.end());
    let rest = &trimmed[start..];
    let end = closing.find(rest).map_or(rest.len(), |m| m.start());

    rest[..end].trim()
}

fn parse_letter(raw_output: &str) -> Result<Letter, OcrError> {
    let cleaned = clean_json_output(raw_output);
    serde_json::from_str(cleaned).map_err(|err| {
        log::error!("JSON parsing error: {err}\ncleaned output:\n{cleaned}");
        OcrError::InvalidJson(err)
    })
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
}

/// Files under `input_dir` that can be transcribed, sorted by name.
/// PDFs are reported and left out.
pub fn collect_images(input_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(input_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }

        match extension(&path).as_deref() {
            Some(ext) if SUPPORTED_IMAGES.contains(&ext) => files.push(path),
            Some("pdf") => log::warn!(
                "skipping {}: convert PDF pages to images first",
                path.display()
            ),
            _ => {}
        }
    }

    files.sort();
    Ok(files)
}

/// Path as recorded in the letter, relative to the working directory when possible.
fn relative_path(path: &Path) -> String {
    let relative = std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf());

    relative.to_string_lossy().into_owned()
}

/// Transcribe every image in `input_dir` and write the letters to `output_file`.
///
/// A file that fails is logged and left out. Returns the number of letters saved.
pub fn process_dir(
    input_dir: &Path,
    output_file: &Path,
    ocr: &OcrClient,
) -> anyhow::Result<usize> {
    let files = collect_images(input_dir)
        .with_context(|| format!("couldn't list {}", input_dir.display()))?;

    let bar = super::progress_bar(files.len(), "transcribing letters");
    let mut letters = Vec::with_capacity(files.len());

    for path in &files {
        match ocr.transcribe(path, &relative_path(path)) {
            Ok(letter) => letters.push(letter),
            Err(err) => bar.suspend(|| log::error!("error processing {}: {err}", path.display())),
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    let json = serde_json::to_vec_pretty(&letters)?;
    write_atomic(output_file, &json)
        .with_context(|| format!("couldn't write {}", output_file.display()))?;

    log::info!("saved {} letters to {}", letters.len(), output_file.display());
    Ok(letters.len())
}
