use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::classify::is_pure;
use super::ocr_pool::OcrExtractor;
use super::pdf::extract_direct;
use super::staging::{StagedDocument, UploadBody};
use super::types::{BatchResult, DocumentResult, ExtractionMethod, LayoutExtractor, PdfTextLayer};
use super::ExtractionError;

/// Informational result when neither OCR nor layout analysis found text.
pub const NO_CONTENT_MESSAGE: &str =
    "No se pudo extraer contenido (PDF escaneado sin texto legible)";

/// Attached to results recovered by the layout fallback.
pub const LAYOUT_FALLBACK_NOTE: &str =
    "Contenido extraído mediante análisis de diseño (posible tabla o estructura compleja)";

/// Per-pipeline limits.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_file_bytes: u64,
    /// Wall-clock budget per document. On expiry queued OCR pages are
    /// dropped; a page already being recognised runs to completion while
    /// keeping its worker slot.
    pub document_timeout: Duration,
    /// Where uploads are staged; system temp dir when `None`.
    pub staging_dir: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_file_bytes: 200 * 1024 * 1024,
            document_timeout: Duration::from_secs(300),
            staging_dir: None,
        }
    }
}

/// One uploaded document awaiting processing.
pub struct Upload<B> {
    pub filename: String,
    /// Size announced by the client, checked before any byte is read.
    pub declared_size: Option<u64>,
    pub body: B,
}

/// Text-layer facts gathered in one parse of the document.
struct TextProbe {
    page_count: usize,
    pure: bool,
    direct: Option<Vec<String>>,
}

/// Classification + tiered extraction for uploaded PDFs.
///
/// Components are injected so tests can swap OCR and layout for mocks.
pub struct DocumentPipeline {
    text_layer: Arc<dyn PdfTextLayer>,
    ocr: OcrExtractor,
    layout: Arc<dyn LayoutExtractor>,
    settings: PipelineSettings,
}

impl DocumentPipeline {
    pub fn new(
        text_layer: Arc<dyn PdfTextLayer>,
        ocr: OcrExtractor,
        layout: Arc<dyn LayoutExtractor>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            text_layer,
            ocr,
            layout,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn ocr(&self) -> &OcrExtractor {
        &self.ocr
    }

    /// Process uploads one after another. One entry per upload, in order;
    /// a failing document never affects its siblings.
    pub async fn process_batch<B: UploadBody>(&self, uploads: Vec<Upload<B>>) -> BatchResult {
        let mut results = Vec::with_capacity(uploads.len());
        for mut upload in uploads {
            let result = self
                .process_document(&upload.filename, upload.declared_size, &mut upload.body)
                .await;
            results.push(result);
        }
        BatchResult { results }
    }

    /// Validate, stage, classify and extract a single document.
    ///
    /// Never fails: every error becomes the entry's `error` field. The
    /// staged file is released before this returns.
    pub async fn process_document<B: UploadBody>(
        &self,
        filename: &str,
        declared_size: Option<u64>,
        body: &mut B,
    ) -> DocumentResult {
        info!(filename, "Processing document");

        if let Err(e) = self.check_declared_size(filename, declared_size) {
            warn!(filename, error = %e, "Upload rejected");
            return DocumentResult::failed(filename, &e);
        }

        // Spooling enforces the byte cap, so an oversized upload is reported
        // as such even when its name is not a PDF.
        let staged = match StagedDocument::spool(
            body,
            filename,
            self.settings.staging_dir.as_deref(),
            self.settings.max_file_bytes,
        )
        .await
        {
            Ok(staged) => staged,
            Err(e) => {
                warn!(filename, error = %e, "Staging failed");
                return DocumentResult::failed(filename, &e);
            }
        };

        let outcome = match require_pdf(filename) {
            Ok(()) => self.extract_with_timeout(filename, &staged).await,
            Err(e) => Err(e),
        };

        if let Err(e) = staged.release().await {
            warn!(filename, error = %e, "Failed to release staged file");
        }

        match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!(filename, error = %e, "Extraction failed");
                DocumentResult::failed(filename, &e)
            }
        }
    }

    /// A size announced up front is rejected before any byte is read.
    fn check_declared_size(
        &self,
        filename: &str,
        declared_size: Option<u64>,
    ) -> Result<(), ExtractionError> {
        if declared_size.is_some_and(|size| size > self.settings.max_file_bytes) {
            return Err(ExtractionError::SizeLimitExceeded {
                filename: filename.to_string(),
                max_mb: self.settings.max_file_bytes / (1024 * 1024),
            });
        }
        Ok(())
    }

    async fn extract_with_timeout(
        &self,
        filename: &str,
        staged: &StagedDocument,
    ) -> Result<DocumentResult, ExtractionError> {
        let timeout = self.settings.document_timeout;
        tokio::time::timeout(timeout, self.extract_staged(filename, staged))
            .await
            .unwrap_or_else(|_| {
                Err(ExtractionError::Timeout {
                    secs: timeout.as_secs(),
                })
            })
    }

    async fn extract_staged(
        &self,
        filename: &str,
        staged: &StagedDocument,
    ) -> Result<DocumentResult, ExtractionError> {
        let bytes = Arc::new(staged.read().await?);

        let text_layer = Arc::clone(&self.text_layer);
        let probe_bytes = Arc::clone(&bytes);
        let probe = tokio::task::spawn_blocking(move || {
            let pages = text_layer.open(&probe_bytes)?;
            let page_count = pages.page_count();
            let pure = is_pure(pages.as_ref())?;
            let direct = if pure {
                Some(extract_direct(pages.as_ref())?)
            } else {
                None
            };
            Ok::<_, ExtractionError>(TextProbe {
                page_count,
                pure,
                direct,
            })
        })
        .await??;

        info!(
            filename,
            pages = probe.page_count,
            pdf_pure = probe.pure,
            "Document classified"
        );

        let mut result = DocumentResult {
            filename: filename.to_string(),
            size_bytes: Some(staged.size_bytes()),
            page_count: Some(probe.page_count),
            pdf_pure: Some(probe.pure),
            ..Default::default()
        };

        if let Some(pages) = probe.direct {
            result.content = Some(pages);
            log_method(filename, ExtractionMethod::PdfDirect);
            return Ok(result);
        }

        let ocr_text = self.ocr.extract(Arc::clone(&bytes)).await?;
        if !ocr_text.trim().is_empty() {
            result.content = Some(vec![ocr_text]);
            log_method(filename, ExtractionMethod::Ocr);
            return Ok(result);
        }

        info!(filename, "OCR found no text, trying layout analysis");
        let layout = Arc::clone(&self.layout);
        let pages = tokio::task::spawn_blocking(move || layout.extract_pages(&bytes)).await??;

        if pages.iter().any(|page| !page.trim().is_empty()) {
            result.content = Some(pages);
            result.note = Some(LAYOUT_FALLBACK_NOTE.to_string());
            log_method(filename, ExtractionMethod::Layout);
        } else {
            result.message = Some(NO_CONTENT_MESSAGE.to_string());
            log_method(filename, ExtractionMethod::None);
        }
        Ok(result)
    }
}

fn log_method(filename: &str, method: ExtractionMethod) {
    info!(filename, method = %method, "Extraction finished");
}

fn require_pdf(filename: &str) -> Result<(), ExtractionError> {
    if is_pdf_filename(filename) {
        Ok(())
    } else {
        Err(ExtractionError::UnsupportedType {
            filename: filename.to_string(),
        })
    }
}

/// `.pdf` extension, case-insensitive.
pub fn is_pdf_filename(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
