use serde::{Deserialize, Serialize};

use super::ExtractionError;

/// Outcome of one uploaded document in a batch.
///
/// Exactly one of `content`, `message` or `error` is set. Error entries
/// carry only the filename, matching what callers already parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentResult {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_pure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentResult {
    pub fn failed(filename: &str, err: &ExtractionError) -> Self {
        Self {
            filename: filename.to_string(),
            error: Some(err.to_string()),
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// All extracted text joined into a single string, if any.
    pub fn joined_content(&self) -> Option<String> {
        self.content.as_ref().map(|pages| pages.join("\n"))
    }
}

/// Batch response: one entry per input document, in input order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchResult {
    pub results: Vec<DocumentResult>,
}

/// How text was obtained for a document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    PdfDirect,
    Ocr,
    Layout,
    None,
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ExtractionMethod::PdfDirect => "pdf_direct",
            ExtractionMethod::Ocr => "ocr",
            ExtractionMethod::Layout => "layout",
            ExtractionMethod::None => "none",
        };
        f.write_str(label)
    }
}

/// Raw OCR result from the engine
#[derive(Debug, Clone)]
pub struct OcrPageResult {
    pub text: String,
    /// Mean confidence in 0.0-1.0 when the engine reports one.
    pub confidence: Option<f32>,
}

// ── Abstractions (mockable in tests) ────────────────────────────────────

/// OCR engine over a single preprocessed page image (PNG bytes).
pub trait OcrEngine: Send + Sync {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError>;
}

/// A parsed PDF exposing its text layer page by page.
pub trait PdfTextPages: Send {
    fn page_count(&self) -> usize;

    /// Text layer of one page. `index` is 0-based.
    fn page_text(&self, index: usize) -> Result<String, ExtractionError>;
}

/// Opens PDF bytes into a page-addressable text layer.
pub trait PdfTextLayer: Send + Sync {
    fn open(&self, pdf_bytes: &[u8]) -> Result<Box<dyn PdfTextPages>, ExtractionError>;
}

/// Renders PDF pages to raster images for OCR.
pub trait PdfPageRenderer: Send + Sync {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError>;

    /// Render one page (0-based) to PNG bytes at the given DPI.
    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError>;

    /// Render every page in document order.
    fn render_all(&self, pdf_bytes: &[u8], dpi: u32) -> Result<Vec<Vec<u8>>, ExtractionError> {
        let count = self.page_count(pdf_bytes)?;
        (0..count)
            .map(|page| self.render_page(pdf_bytes, page, dpi))
            .collect()
    }
}

/// Layout-aware text reconstruction, one string per page.
pub trait LayoutExtractor: Send + Sync {
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError>;
}
