//! Upload endpoints: batch text extraction and schema mapping.
//!
//! Multipart fields are consumed as they arrive; each file is streamed
//! straight into the pipeline's staging area, never buffered whole in
//! memory (images for schema mapping excepted).

use std::path::Path;

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::Json;

use super::blocking;
use crate::api::error::ApiError;
use crate::api::types::AppState;
use crate::pipeline::extraction::{BatchResult, ExtractionError, UploadBody, NO_CONTENT_MESSAGE};

/// Multipart field name carrying batch documents.
pub const FILES_FIELD: &str = "files";

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Streams one multipart field into the pipeline.
struct FieldBody<'a>(Field<'a>);

impl UploadBody for FieldBody<'_> {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ExtractionError> {
        self.0
            .chunk()
            .await
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .map_err(|e| ExtractionError::Io(std::io::Error::other(e.body_text())))
    }
}

fn field_filename(field: &Field<'_>) -> String {
    field.file_name().unwrap_or_default().to_string()
}

/// `POST /data-extraction/`: one result per `files` part, in upload order.
pub async fn extract_batch(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BatchResult>, ApiError> {
    let mut results = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        let filename = field_filename(&field);
        let result = state
            .pipeline
            .process_document(&filename, None, &mut FieldBody(field))
            .await;
        results.push(result);
    }

    if results.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "expected at least one '{FILES_FIELD}' part"
        )));
    }

    tracing::info!(
        documents = results.len(),
        failed = results.iter().filter(|r| r.is_error()).count(),
        "Batch extraction finished"
    );
    Ok(Json(BatchResult { results }))
}

/// `POST /data-extraction/schema-mapping`: extract one document (PDF or
/// image) and map its text onto the schema registered for `document_type`.
pub async fn schema_mapping(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut document_type: Option<i64> = None;
    let mut extracted: Option<(String, String)> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("document_type") => {
                let raw = field.text().await?;
                let id = raw.trim().parse().map_err(|_| {
                    ApiError::BadRequest(format!("document_type must be an integer, got '{raw}'"))
                })?;
                document_type = Some(id);
            }
            Some("file") => {
                let filename = field_filename(&field);
                let text = extract_upload_text(&state, &filename, field).await?;
                extracted = Some((filename, text));
            }
            _ => {}
        }
    }

    let document_type =
        document_type.ok_or_else(|| ApiError::BadRequest("missing 'document_type' part".into()))?;
    let (filename, text) =
        extracted.ok_or_else(|| ApiError::BadRequest("missing 'file' part".into()))?;

    let mapper = state.mapper.clone();
    let result =
        blocking(move || Ok(mapper.map_document(document_type, &filename, &text)?)).await?;
    Ok(Json(result.response))
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

async fn extract_upload_text(
    state: &AppState,
    filename: &str,
    field: Field<'_>,
) -> Result<String, ApiError> {
    let extension = extension_of(filename);
    match extension.as_deref() {
        Some("pdf") => {
            let result = state
                .pipeline
                .process_document(filename, None, &mut FieldBody(field))
                .await;
            if let Some(error) = result.error {
                return Err(ApiError::Unprocessable(error));
            }
            non_blank(result.joined_content(), result.message)
        }
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => {
            let bytes = read_capped(filename, field, state.pipeline.settings().max_file_bytes)
                .await?;
            let text = state
                .pipeline
                .ocr()
                .recognize_image(bytes)
                .await
                .map_err(|e| ApiError::Unprocessable(e.to_string()))?;
            non_blank(Some(text), None)
        }
        _ => Err(ApiError::BadRequest(format!(
            "El archivo {filename} no es un PDF ni una imagen compatible (jpg, jpeg, png)."
        ))),
    }
}

fn non_blank(text: Option<String>, message: Option<String>) -> Result<String, ApiError> {
    match text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ApiError::Unprocessable(
            message.unwrap_or_else(|| NO_CONTENT_MESSAGE.to_string()),
        )),
    }
}

async fn read_capped(filename: &str, field: Field<'_>, max_bytes: u64) -> Result<Vec<u8>, ApiError> {
    let mut body = FieldBody(field);
    let mut bytes = Vec::new();
    while let Some(chunk) = body
        .next_chunk()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        bytes.extend_from_slice(&chunk);
        if bytes.len() as u64 > max_bytes {
            let err = ExtractionError::SizeLimitExceeded {
                filename: filename.to_string(),
                max_mb: max_bytes / (1024 * 1024),
            };
            return Err(ApiError::PayloadTooLarge(err.to_string()));
        }
    }
    Ok(bytes)
}
