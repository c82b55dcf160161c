use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Stored result of mapping one document onto a schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentExtraction {
    pub id: i64,
    pub document_path: String,
    pub document_type_id: i64,
    pub document_schema: serde_json::Value,
    pub ocr_text: String,
    pub model_response: serde_json::Value,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewExtraction {
    pub document_path: String,
    pub document_type_id: i64,
    pub document_schema: serde_json::Value,
    pub ocr_text: String,
    pub model_response: serde_json::Value,
}
