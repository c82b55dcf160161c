//! Document-type registry: types, their schemas, and stored mappings.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use super::blocking;
use crate::api::error::ApiError;
use crate::api::types::{AppState, ExtractionQuery};
use crate::models::*;
use crate::pipeline::structuring::render_prompt;

/// `GET /document-types`
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<DocumentType>>, ApiError> {
    let store = state.store.clone();
    let types = blocking(move || Ok(store.document_types()?)).await?;
    Ok(Json(types))
}

/// `POST /document-types`
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<NewDocumentType>,
) -> Result<(StatusCode, Json<DocumentType>), ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".into()));
    }
    let store = state.store.clone();
    let created = blocking(move || Ok(store.create_document_type(&payload)?)).await?;
    tracing::info!(id = created.id, name = %created.name, "Document type created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /document-types/:id/schemas`
pub async fn list_schemas(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<DocumentSchema>>, ApiError> {
    let store = state.store.clone();
    let schemas = blocking(move || {
        require_type(&store, id)?;
        Ok(store.schemas(id)?)
    })
    .await?;
    Ok(Json(schemas))
}

/// `POST /document-types/:id/schemas`
///
/// The template is test-rendered so a typo in a placeholder is caught here
/// rather than on the first mapping request.
pub async fn add_schema(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<NewDocumentSchema>,
) -> Result<(StatusCode, Json<DocumentSchema>), ApiError> {
    render_prompt(&payload.prompt_template, "", "")
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let store = state.store.clone();
    let schema = blocking(move || Ok(store.add_schema(id, &payload)?)).await?;
    tracing::info!(document_type_id = id, schema_id = schema.id, "Schema registered");
    Ok((StatusCode::CREATED, Json(schema)))
}

/// `GET /document-types/:id/extractions?limit=N`: newest first.
pub async fn list_extractions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<ExtractionQuery>,
) -> Result<Json<Vec<DocumentExtraction>>, ApiError> {
    let store = state.store.clone();
    let extractions = blocking(move || {
        require_type(&store, id)?;
        Ok(store.extractions(Some(id), query.limit)?)
    })
    .await?;
    Ok(Json(extractions))
}

fn require_type(store: &crate::db::SqliteStore, id: i64) -> Result<DocumentType, ApiError> {
    store
        .document_type(id)?
        .ok_or_else(|| ApiError::NotFound(format!("Document type {id} not found")))
}
