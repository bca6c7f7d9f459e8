use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the web service.
    Daemon {},

    /// Find letters related to a question
    Search {
        /// The question, in any language the embedding model understands
        #[clap(allow_hyphen_values = true)]
        question: String,

        /// Maximum number of letters
        #[clap(short, long)]
        limit: Option<usize>,

        /// Minimum similarity, exclusive
        #[clap(short, long, allow_hyphen_values = true)]
        threshold: Option<f32>,

        /// Print results as JSON
        #[clap(long, default_value = "false")]
        json: bool,
    },

    /// List letters page by page
    Letters {
        #[clap(short, long, default_value = "1")]
        page: usize,

        #[clap(long)]
        per_page: Option<usize>,
    },

    /// Print a single letter
    Letter {
        /// Position in letters.json, starting at 0
        index: usize,
    },

    /// List photos in the gallery
    Photos {},

    /// Build letter embeddings from letters.json
    Embed {
        /// Pause between embedding requests, in milliseconds.
        /// Defaults to embedding.request_delay_ms.
        #[clap(long)]
        delay_ms: Option<u64>,
    },

    /// Transcribe scanned letters into letters.json
    Ocr {
        /// Directory with scanned images. Defaults to ocr.input_dir.
        #[clap(short, long)]
        input_dir: Option<PathBuf>,

        /// Where to write the letters. Defaults to ocr.output_file.
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
}
