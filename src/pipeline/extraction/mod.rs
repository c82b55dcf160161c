pub mod types;
pub mod preprocess;
pub mod pdf;
pub mod classify;
pub mod pdfium;
pub mod ocr;
pub mod ocr_pool;
pub mod layout;
pub mod staging;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod testing;

pub use types::*;
pub use preprocess::*;
pub use pdf::*;
pub use classify::*;
pub use pdfium::*;
pub use ocr::*;
pub use ocr_pool::*;
pub use layout::*;
pub use staging::*;
pub use orchestrator::*;

use thiserror::Error;

/// Per-document extraction failures.
///
/// Display strings are the user-facing `error` values reported in the
/// batch result, so they stay in the service's response language.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("El archivo {filename} excede el tamaño máximo permitido ({max_mb}MB).")]
    SizeLimitExceeded { filename: String, max_mb: u64 },

    #[error("El archivo {filename} no es un PDF.")]
    UnsupportedType { filename: String },

    #[error("Documento PDF ilegible: {0}")]
    MalformedDocument(String),

    #[error("Error en OCR: {0}")]
    OcrEngine(String),

    #[error("Imagen inválida: {0}")]
    InvalidImage(String),

    #[error("Tiempo de extracción agotado tras {secs}s")]
    Timeout { secs: u64 },

    #[error("Error inesperado: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error inesperado: {0}")]
    Unexpected(String),
}

impl ExtractionError {
    /// Collapse any failure inside the OCR path into a document-level
    /// `OcrEngine` error. Already-OCR errors pass through untouched.
    pub fn into_ocr(self) -> Self {
        match self {
            ExtractionError::OcrEngine(_) => self,
            ExtractionError::InvalidImage(msg) => {
                ExtractionError::OcrEngine(format!("imagen inválida: {msg}"))
            }
            other => ExtractionError::OcrEngine(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ExtractionError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_panic() {
            ExtractionError::Unexpected(format!("worker panicked: {e}"))
        } else {
            ExtractionError::Unexpected(format!("worker cancelled: {e}"))
        }
    }
}

impl From<lopdf::Error> for ExtractionError {
    fn from(e: lopdf::Error) -> Self {
        ExtractionError::MalformedDocument(e.to_string())
    }
}
