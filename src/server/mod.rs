use crate::data::configuration::{CheckStatus, Configuration};
use crate::data::dbconnector::{KinDBConnection, SQLConnector};
use crate::data::pictures::picture_type;
use crate::error::AppError;
use crate::family::dashboard::{Dashboard, SaveOutcome};
use crate::family::form::{PersonDraft, RelationCandidates};
use crate::family::person::Person;
use crate::family::render::Selection;
use crate::family::view::FamilyView;
pub mod types;
use axum::body::Bytes;
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use axum::routing::patch;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use log::{debug, error, info};
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use types::{CandidatesQuery, ConfigHealthResponse, TreeQuery, UploadPictureResponse};

#[derive(Clone)]
pub struct ServerConfig {
    pub database_connection: Arc<SQLConnector>,
    pub configuration: Arc<Configuration>,
}

impl ServerConfig {
    fn dashboard(&self) -> Dashboard<'_, SQLConnector> {
        Dashboard::new(
            self.database_connection.as_ref(),
            &self.configuration.display.date_format,
        )
    }

    async fn owner(&self, headers: &HeaderMap) -> Result<String, AppError> {
        self.dashboard().authenticate(bearer(headers)).await
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

pub fn router(state: ServerConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/config", get(config_health))
        .route("/people", get(list_people))
        .route("/people", post(create_person))
        .route("/people/candidates", get(relation_candidates))
        .route("/people/{id}", patch(update_person))
        .route("/tree", get(get_tree))
        .route("/pictures/{file_name}", post(upload_picture))
        .route("/pictures/{owner}/{file_name}", get(get_picture))
        .with_state(state)
}

pub async fn run(
    config: Configuration,
    database_connection: SQLConnector,
    port: u16,
) -> anyhow::Result<()> {
    debug!("Starting server on port {}", port);

    let state = ServerConfig {
        database_connection: Arc::new(database_connection),
        configuration: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    info!("Listening on {}", listener.local_addr()?);

    serve_until(listener, state, shutdown_signal()).await
}

/// Serve until `shutdown` resolves, let in-flight requests finish, then
/// close the database.
pub async fn serve_until(
    listener: tokio::net::TcpListener,
    state: ServerConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let database_connection = state.database_connection.clone();
    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server stopped, closing database");
    database_connection.close().await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn config_health(State(state): State<ServerConfig>) -> Json<ConfigHealthResponse> {
    let checks = state.configuration.diagnostics();
    Json(ConfigHealthResponse {
        ok: checks.iter().all(|c| c.status == CheckStatus::Ok),
        checks,
    })
}

async fn list_people(
    State(state): State<ServerConfig>,
    headers: HeaderMap,
) -> Result<Json<Vec<Person>>, AppError> {
    let owner = state.owner(&headers).await?;
    Ok(Json(state.dashboard().load(&owner).await?))
}

async fn create_person(
    State(state): State<ServerConfig>,
    headers: HeaderMap,
    Json(payload): Json<PersonDraft>,
) -> Result<(StatusCode, Json<SaveOutcome>), AppError> {
    let owner = state.owner(&headers).await?;
    let outcome = state.dashboard().save(&owner, &payload, None).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn update_person(
    State(state): State<ServerConfig>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Json(payload): Json<PersonDraft>,
) -> Result<Json<SaveOutcome>, AppError> {
    let owner = state.owner(&headers).await?;
    let outcome = state.dashboard().save(&owner, &payload, Some(id)).await?;
    Ok(Json(outcome))
}

async fn relation_candidates(
    State(state): State<ServerConfig>,
    headers: HeaderMap,
    Query(query): Query<CandidatesQuery>,
) -> Result<Json<RelationCandidates>, AppError> {
    let owner = state.owner(&headers).await?;
    let candidates = state
        .dashboard()
        .candidates(&owner, query.editing, query.parent)
        .await?;
    Ok(Json(candidates))
}

async fn get_tree(
    State(state): State<ServerConfig>,
    headers: HeaderMap,
    Query(query): Query<TreeQuery>,
) -> Result<Json<FamilyView>, AppError> {
    let owner = state.owner(&headers).await?;
    let today = chrono::Local::now().date_naive();
    let view = state
        .dashboard()
        .view(&owner, Selection::new(query.selected), today)
        .await?;
    Ok(Json(view))
}

async fn upload_picture(
    State(state): State<ServerConfig>,
    headers: HeaderMap,
    Path(file_name): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadPictureResponse>), AppError> {
    let owner = state.owner(&headers).await?;
    let url = state
        .dashboard()
        .upload_picture(&owner, &file_name, &body)
        .await?;
    Ok((StatusCode::CREATED, Json(UploadPictureResponse { url })))
}

async fn get_picture(
    State(state): State<ServerConfig>,
    Path((owner, file_name)): Path<(String, String)>,
) -> Response {
    let Some(media_type) = picture_type(&file_name) else {
        return (StatusCode::NOT_FOUND, format!("No picture {owner}/{file_name}")).into_response();
    };
    match state
        .database_connection
        .pictures()
        .read(&owner, &file_name)
        .await
    {
        Ok(Some(bytes)) => (
            [
                (header::CONTENT_TYPE, media_type),
                (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
            ],
            bytes,
        )
            .into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, format!("No picture {owner}/{file_name}")).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
