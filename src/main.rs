use std::{sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod embeddings;
mod letters;
mod openai;
mod photos;
mod pipeline;
mod ranking;
mod search;
mod storage;
#[cfg(test)]
mod tests;
mod web;

use config::Config;
use letters::{Letter, LetterStore};
use search::{SearchHit, SearchOptions, SearchService};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn search_service(config: &Config) -> anyhow::Result<SearchService> {
    let store = Arc::new(LetterStore::new(
        config.letters_path(),
        config.embeddings_path(),
    ));
    let provider = embeddings::provider_from_config(&config.embedding, config.base_path())?;
    Ok(SearchService::new(store, provider, config.search.clone()))
}

fn print_letter(letter: &Letter) {
    if let Some(title) = letter.title() {
        println!("{title}");
    }
    println!("De: {}", letter.sender());
    println!("Para: {}", letter.recipient());
    println!("Data: {}", letter.date_label());
    if let Some(image) = letter.image_file_name() {
        println!("Imagem: {image}");
    }
    println!();
    println!("{}", letter.body());
}

fn print_hits(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No letters found.");
        return;
    }

    for hit in hits {
        println!(
            "#{} [{:.3}] letter {}: {} → {} ({})",
            hit.position,
            hit.score,
            hit.index,
            hit.letter.sender(),
            hit.letter.recipient(),
            hit.letter.date_label()
        );
    }
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = cli::Args::parse();
    let config = Config::load().context("couldn't load config")?;

    match args.command {
        cli::Command::Daemon {} => {
            let service = Arc::new(search_service(&config)?);
            web::start_daemon(&config, service)
        }

        cli::Command::Search {
            question,
            limit,
            threshold,
            json,
        } => {
            let service = search_service(&config)?;
            let hits = service.search(&question, SearchOptions { threshold, limit })?;

            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                print_hits(&hits);
            }
            Ok(())
        }

        cli::Command::Letters { page, per_page } => {
            let store = LetterStore::new(config.letters_path(), config.embeddings_path());
            let per_page = per_page.unwrap_or(config.web.letters_per_page);
            println!("{}", serde_json::to_string_pretty(&store.page(page, per_page)?)?);
            Ok(())
        }

        cli::Command::Letter { index } => {
            let store = LetterStore::new(config.letters_path(), config.embeddings_path());
            match store.letter(index)? {
                Some(letter) => {
                    print_letter(&letter);
                    Ok(())
                }
                None => anyhow::bail!("letter {index} not found"),
            }
        }

        cli::Command::Photos {} => {
            for photo in photos::list_photos(&config.photos_path())? {
                if photo.is_heic() {
                    println!("{} (HEIC)", photo.name);
                } else {
                    println!("{}", photo.name);
                }
            }
            Ok(())
        }

        cli::Command::Embed { delay_ms } => {
            let provider =
                embeddings::provider_from_config(&config.embedding, config.base_path())?;
            let delay =
                Duration::from_millis(delay_ms.unwrap_or(config.embedding.request_delay_ms));

            let summary = pipeline::embed_letters(
                &config.letters_path(),
                &config.embeddings_path(),
                provider.as_ref(),
                delay,
            )?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }

        cli::Command::Ocr { input_dir, output } => {
            let input_dir = input_dir.unwrap_or_else(|| config.resolve(&config.ocr.input_dir));
            let output = output.unwrap_or_else(|| config.resolve(&config.ocr.output_file));

            let ocr = pipeline::OcrClient::from_config(&config.ocr)?;
            let count = pipeline::process_dir(&input_dir, &output, &ocr)?;
            println!("{count} letters saved to {}", output.display());
            Ok(())
        }
    }
}
