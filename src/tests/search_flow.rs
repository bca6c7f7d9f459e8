use super::{embed_fixtures, fixture_config, search_service};
use crate::pipeline::embed::EmbedSummary;
use crate::ranking::RawEmbedding;
use crate::search::{SearchError, SearchOptions};

#[test]
fn test_embed_then_search() {
    let dir = tempfile::tempdir().unwrap();
    let config = fixture_config(dir.path());
    embed_fixtures(&config);

    let service = search_service(&config);

    let hits = service
        .search("Cartas de aniversário", SearchOptions::default())
        .unwrap();
    let indices: Vec<usize> = hits.iter().map(|hit| hit.index).collect();
    assert_eq!(indices, vec![0, 4]);

    assert_eq!(hits[0].position, 1);
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert_eq!(hits[0].letter.sender(), "Ana");
    assert_eq!(hits[1].position, 2);
    assert!((hits[1].score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
}

#[test]
fn test_ties_keep_file_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = fixture_config(dir.path());
    embed_fixtures(&config);

    let hits = search_service(&config)
        .search("saudade", SearchOptions::default())
        .unwrap();

    let indices: Vec<usize> = hits.iter().map(|hit| hit.index).collect();
    assert_eq!(indices, vec![3, 4]);
    assert_eq!(hits[0].score, hits[1].score);
}

#[test]
fn test_options_override_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = fixture_config(dir.path());
    embed_fixtures(&config);
    let service = search_service(&config);

    let opts = SearchOptions {
        threshold: Some(0.9),
        limit: None,
    };
    let hits = service.search("aniversário", opts).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].index, 0);

    let opts = SearchOptions {
        threshold: Some(-1.0),
        limit: Some(3),
    };
    let hits = service.search("aniversário", opts).unwrap();
    assert_eq!(hits.len(), 3);
    // blank letter has no embedding and never shows up
    assert!(hits.iter().all(|hit| hit.index != 2));
}

#[test]
fn test_no_match_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = fixture_config(dir.path());
    embed_fixtures(&config);

    let opts = SearchOptions {
        threshold: Some(0.99),
        limit: None,
    };
    let hits = search_service(&config).search("natal e viagem", opts).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn test_question_errors() {
    let dir = tempfile::tempdir().unwrap();
    let config = fixture_config(dir.path());
    embed_fixtures(&config);
    let service = search_service(&config);

    assert!(matches!(
        service.search("   ", SearchOptions::default()),
        Err(SearchError::EmptyQuestion)
    ));
    assert!(matches!(
        service.search("bom dia", SearchOptions::default()),
        Err(SearchError::Rank(_))
    ));
    assert!(matches!(
        service.search("falha", SearchOptions::default()),
        Err(SearchError::Embedding(_))
    ));
}

#[test]
fn test_missing_embeddings_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = fixture_config(dir.path());

    let err = search_service(&config)
        .search("aniversário", SearchOptions::default())
        .unwrap_err();
    assert!(matches!(err, SearchError::Data(_)));
    assert!(!err.is_question_error());
}

#[test]
fn test_embed_summary_and_output() {
    let dir = tempfile::tempdir().unwrap();
    let config = fixture_config(dir.path());

    std::fs::write(
        config.letters_path(),
        r#"[{"from": "Ana", "text": "aniversário"}, {"from": "Rui", "text": "falha na rede"}, {"from": "Bia"}]"#,
    )
    .unwrap();

    let summary = crate::pipeline::embed_letters(
        &config.letters_path(),
        &config.embeddings_path(),
        &super::KeywordEmbeddings,
        std::time::Duration::ZERO,
    )
    .unwrap();

    assert_eq!(
        summary,
        EmbedSummary {
            total: 3,
            embedded: 1,
            skipped: 1,
            failed: 1,
        }
    );

    let store = search_service(&config);
    let embeddings = store.store().embeddings().unwrap();
    assert_eq!(
        embeddings.as_slice(),
        &[
            RawEmbedding::Vector(vec![1.0, 0.0, 0.0, 0.0]),
            RawEmbedding::Missing,
            RawEmbedding::Missing,
        ]
    );
}
