//! Offline data preparation.
//!
//! - `ocr`: transcribe scanned letters into `letters.json`
//! - `embed`: build `letter_embeddings.json` from `letters.json`

pub mod embed;
pub mod ocr;

use indicatif::{ProgressBar, ProgressStyle};

pub use embed::embed_letters;
pub use ocr::{process_dir, OcrClient};

fn progress_bar(len: usize, label: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({eta})") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(label);
    bar
}
