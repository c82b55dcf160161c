pub mod types;
pub mod prompt;
pub mod parser;
pub mod openai;
pub mod orchestrator;

pub use types::*;
pub use prompt::*;
pub use parser::*;
pub use openai::*;
pub use orchestrator::*;

use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum StructuringError {
    #[error("No schema registered for document type {0}")]
    SchemaNotFound(i64),

    #[error("Language model endpoint unreachable at {0}")]
    LlmConnection(String),

    #[error("Language model returned error (status {status}): {body}")]
    LlmError { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Model response is not valid JSON: {reason}")]
    SchemaMapping { reason: String, response: String },

    #[error("Prompt template error: {0}")]
    PromptTemplate(String),

    #[error("No text to map onto the schema")]
    InputEmpty,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
