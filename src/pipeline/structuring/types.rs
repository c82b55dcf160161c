use serde::{Deserialize, Serialize};

use super::StructuringError;
use crate::models::{DocumentSchema, NewExtraction};

/// LLM client abstraction (allows mocking)
pub trait LlmClient: Send + Sync {
    /// Single-turn completion: the prompt goes in as the user message,
    /// the assistant's text comes back verbatim.
    fn generate(&self, model: &str, prompt: &str) -> Result<String, StructuringError>;
}

/// Where schemas are looked up and mapping results recorded.
pub trait SchemaStore: Send + Sync {
    /// Schemas registered for a document type, oldest first.
    fn schemas_for_type(
        &self,
        document_type_id: i64,
    ) -> Result<Vec<DocumentSchema>, StructuringError>;

    /// Persist one mapping result; returns its id.
    fn record_extraction(&self, extraction: &NewExtraction) -> Result<i64, StructuringError>;
}

/// Outcome of mapping one document onto its type's schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappingResult {
    pub extraction_id: i64,
    pub document_type_id: i64,
    pub schema_id: i64,
    pub response: serde_json::Value,
}
