use std::sync::Arc;

use super::parser::parse_mapping_response;
use super::prompt::render_prompt;
use super::types::{LlmClient, MappingResult, SchemaStore};
use super::StructuringError;
use crate::models::{DocumentSchema, NewExtraction};

/// Maps extracted document text onto the JSON schema registered for its
/// document type: schema lookup, prompt, LLM, parse, persist.
///
/// Blocking end to end; callers on the async runtime wrap it in
/// `spawn_blocking`.
pub struct SchemaMapper {
    store: Arc<dyn SchemaStore>,
    llm: Arc<dyn LlmClient>,
    model: String,
}

impl SchemaMapper {
    pub fn new(store: Arc<dyn SchemaStore>, llm: Arc<dyn LlmClient>, model: &str) -> Self {
        Self {
            store,
            llm,
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn map_document(
        &self,
        document_type_id: i64,
        document_path: &str,
        text: &str,
    ) -> Result<MappingResult, StructuringError> {
        if text.trim().is_empty() {
            return Err(StructuringError::InputEmpty);
        }

        let schemas = self.store.schemas_for_type(document_type_id)?;
        let schema = select_schema(&schemas, document_type_id)?;
        let schema_text = schema.schema.to_string();

        let prompt = render_prompt(&schema.prompt_template, text, &schema_text)?;

        tracing::info!(
            document_type_id,
            schema_id = schema.id,
            document = document_path,
            model = %self.model,
            text_len = text.len(),
            "Mapping document onto schema"
        );

        let raw = self.llm.generate(&self.model, &prompt)?;
        let response = parse_mapping_response(&raw).inspect_err(|e| {
            tracing::warn!(
                document_type_id,
                document = document_path,
                error = %e,
                "Model reply was not valid JSON"
            );
        })?;

        let extraction_id = self.store.record_extraction(&NewExtraction {
            document_path: document_path.to_string(),
            document_type_id,
            document_schema: schema.schema.clone(),
            ocr_text: text.to_string(),
            model_response: response.clone(),
        })?;

        tracing::info!(extraction_id, document_type_id, "Schema mapping stored");

        Ok(MappingResult {
            extraction_id,
            document_type_id,
            schema_id: schema.id,
            response,
        })
    }
}

/// The most recently registered schema wins when a type has several.
fn select_schema(
    schemas: &[DocumentSchema],
    document_type_id: i64,
) -> Result<&DocumentSchema, StructuringError> {
    let chosen = schemas
        .last()
        .ok_or(StructuringError::SchemaNotFound(document_type_id))?;
    if schemas.len() > 1 {
        tracing::warn!(
            document_type_id,
            count = schemas.len(),
            chosen = chosen.id,
            "Several schemas registered for document type; using the newest"
        );
    }
    Ok(chosen)
}
