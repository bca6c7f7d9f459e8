use crate::{
    config::Config,
    letters::{Letter, LetterPage, LetterStoreError},
    photos::{self, Photo},
    search::{SearchError, SearchHit, SearchOptions, SearchService},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{path::PathBuf, sync::Arc};
use tokio::signal;

#[derive(Clone)]
struct SharedState {
    search: Arc<SearchService>,
    photos_dir: PathBuf,
    letters_per_page: usize,
}

pub fn router(config: &Config, service: Arc<SearchService>) -> Router {
    let shared_state = Arc::new(SharedState {
        search: service,
        photos_dir: config.photos_path(),
        letters_per_page: config.web.letters_per_page,
    });

    Router::new()
        .nest_service(
            "/api/file/letters",
            tower_http::services::ServeDir::new(config.letter_images_path()),
        )
        .nest_service(
            "/api/file/photos",
            tower_http::services::ServeDir::new(config.photos_path()),
        )
        .route("/api/search", post(search))
        .route("/api/letters", get(letters))
        .route("/api/letters/:index", get(letter))
        .route("/api/photos", get(list_photos))
        .route("/api/total", get(total))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutting down");
}

async fn start_app(listen: String, app: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&listen).await?;
    log::info!("listening on {listen}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn start_daemon(config: &Config, service: Arc<SearchService>) -> anyhow::Result<()> {
    let app = router(config, service);
    let listen = config.web.listen.clone();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_app(listen, app))
}

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("letter not found")]
    NotFound,

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Data(#[from] LetterStoreError),

    #[error("io error: {0}")]
    IO(#[from] std::io::Error),
}

#[derive(Debug)]
struct HttpError(ApiError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self.0 {
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.0.to_string()),
            ApiError::Search(SearchError::EmptyQuestion | SearchError::InvalidThreshold(_)) => {
                (StatusCode::BAD_REQUEST, self.0.to_string())
            }
            ApiError::Search(err) if err.is_question_error() => {
                log::warn!("{err}");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    format!("could not process the question: {err}"),
                )
            }
            ApiError::Search(_) | ApiError::Data(_) => {
                log::error!("{self:?}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "search unavailable".to_string(),
                )
            }
            ApiError::IO(_) => {
                log::error!("{self:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string())
            }
        };

        (status, Json(json!({"error": message}))).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<ApiError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub question: String,
    pub threshold: Option<f32>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub question: String,
    pub results: Vec<SearchHit>,
}

async fn search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    let opts = SearchOptions {
        threshold: payload.threshold,
        limit: payload.limit,
    };

    tokio::task::block_in_place(move || {
        let results = state.search.search(&payload.question, opts)?;
        Ok(Json(SearchResponse {
            question: payload.question,
            results,
        }))
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LettersQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

async fn letters(
    State(state): State<Arc<SharedState>>,
    Query(query): Query<LettersQuery>,
) -> Result<Json<LetterPage>, HttpError> {
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(state.letters_per_page);

    tokio::task::block_in_place(move || {
        Ok(Json(state.search.store().page(page, per_page)?))
    })
}

async fn letter(
    State(state): State<Arc<SharedState>>,
    Path(index): Path<usize>,
) -> Result<Json<Letter>, HttpError> {
    tokio::task::block_in_place(move || {
        state
            .search
            .store()
            .letter(index)?
            .map(Json)
            .ok_or(HttpError(ApiError::NotFound))
    })
}

async fn list_photos(
    State(state): State<Arc<SharedState>>,
) -> Result<Json<Vec<Photo>>, HttpError> {
    tokio::task::block_in_place(move || Ok(Json(photos::list_photos(&state.photos_dir)?)))
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TotalResponse {
    pub letters: usize,
    /// Letters that have a usable embedding
    pub embedded: usize,
    pub photos: usize,
}

async fn total(State(state): State<Arc<SharedState>>) -> Result<Json<TotalResponse>, HttpError> {
    tokio::task::block_in_place(move || {
        let store = state.search.store();
        let letters = store.letters()?.len();
        let embedded = store
            .embeddings()?
            .iter()
            .filter(|embedding| embedding.vector().is_some())
            .count();
        let photos = photos::list_photos(&state.photos_dir)?.len();

        Ok(Json(TotalResponse {
            letters,
            embedded,
            photos,
        }))
    })
}
