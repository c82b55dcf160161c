use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A category of document (invoice, ID card, contract) that schemas attach to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentType {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocumentType {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// JSON schema plus the prompt template used to fill it for one document type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSchema {
    pub id: i64,
    pub document_type_id: i64,
    pub schema: serde_json::Value,
    /// Template with `{pdf_content}` and `{schema}` placeholders.
    pub prompt_template: String,
    pub version: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocumentSchema {
    pub schema: serde_json::Value,
    pub prompt_template: String,
    #[serde(default)]
    pub version: Option<String>,
}
