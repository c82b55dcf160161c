//! Parallel OCR over every page of a scanned PDF.
//!
//! Pages are rendered up front, then each page image is preprocessed and
//! recognised on the blocking pool. One semaphore per extractor caps how
//! many pages are in flight across all documents; a permit lives inside
//! the blocking job, so a job left running by an abandoned document still
//! counts against the cap. Results are reassembled by page index, so the
//! joined text never depends on completion order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::preprocess::ImagePreprocessor;
use super::types::{OcrEngine, PdfPageRenderer};
use super::ExtractionError;

/// Separator placed between consecutive page texts.
pub const PAGE_SEPARATOR: &str = "\n";

pub struct OcrExtractor {
    renderer: Arc<dyn PdfPageRenderer>,
    preprocessor: Arc<dyn ImagePreprocessor>,
    engine: Arc<dyn OcrEngine>,
    dpi: u32,
    workers: usize,
    permits: Arc<Semaphore>,
}

/// Raised when the owning `extract` call is dropped or fails, so page jobs
/// that have not started yet skip their work.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn abandoned() -> ExtractionError {
    ExtractionError::OcrEngine("document abandoned".into())
}

impl OcrExtractor {
    pub fn new(
        renderer: Arc<dyn PdfPageRenderer>,
        preprocessor: Arc<dyn ImagePreprocessor>,
        engine: Arc<dyn OcrEngine>,
        dpi: u32,
        workers: usize,
    ) -> Self {
        let workers = workers.max(1);
        Self {
            renderer,
            preprocessor,
            engine,
            dpi,
            workers,
            permits: Arc::new(Semaphore::new(workers)),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// OCR every page and join the texts in page order.
    ///
    /// Any render, preprocessing or recognition failure fails the whole
    /// document with [`ExtractionError::OcrEngine`]; partial text is
    /// never returned. Dropping the future (on timeout) stops pages that
    /// have not started; a render or page already running finishes in the
    /// background.
    pub async fn extract(&self, pdf_bytes: Arc<Vec<u8>>) -> Result<String, ExtractionError> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let _cancel_guard = CancelOnDrop(Arc::clone(&cancelled));

        let renderer = Arc::clone(&self.renderer);
        let dpi = self.dpi;
        let pages = tokio::task::spawn_blocking(move || renderer.render_all(&pdf_bytes, dpi))
            .await
            .map_err(|e| ExtractionError::from(e).into_ocr())?
            .map_err(ExtractionError::into_ocr)?;

        let page_count = pages.len();
        info!(pages = page_count, workers = self.workers, "Starting parallel OCR");

        let mut tasks = JoinSet::new();

        for (index, image) in pages.into_iter().enumerate() {
            let permits = Arc::clone(&self.permits);
            let cancelled = Arc::clone(&cancelled);
            let preprocessor = Arc::clone(&self.preprocessor);
            let engine = Arc::clone(&self.engine);
            tasks.spawn(async move {
                let permit = acquire(permits).await?;
                tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    if cancelled.load(Ordering::SeqCst) {
                        return Err(abandoned());
                    }
                    let prepared = preprocessor.preprocess(&image)?;
                    if cancelled.load(Ordering::SeqCst) {
                        return Err(abandoned());
                    }
                    let result = engine.ocr_image(&prepared.png_bytes)?;
                    debug!(page = index + 1, chars = result.text.len(), "Page recognised");
                    Ok::<_, ExtractionError>((index, result.text))
                })
                .await?
            });
        }

        let mut texts: Vec<Option<String>> = vec![None; page_count];
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(ExtractionError::from)
                .and_then(|inner| inner);
            match outcome {
                Ok((index, text)) => texts[index] = Some(text),
                Err(e) => {
                    tasks.abort_all();
                    warn!(error = %e, "OCR failed, abandoning document");
                    return Err(e.into_ocr());
                }
            }
        }

        let ordered: Vec<String> = texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| {
                text.ok_or_else(|| {
                    ExtractionError::OcrEngine(format!("page {} produced no result", index + 1))
                })
            })
            .collect::<Result<_, _>>()?;

        Ok(ordered.join(PAGE_SEPARATOR))
    }

    /// Preprocess and recognise a single uploaded image.
    pub async fn recognize_image(&self, image_bytes: Vec<u8>) -> Result<String, ExtractionError> {
        let permit = acquire(Arc::clone(&self.permits))
            .await
            .map_err(ExtractionError::into_ocr)?;
        let preprocessor = Arc::clone(&self.preprocessor);
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let prepared = preprocessor.preprocess(&image_bytes)?;
            Ok::<_, ExtractionError>(engine.ocr_image(&prepared.png_bytes)?.text)
        })
        .await
        .map_err(ExtractionError::from)
        .and_then(|inner| inner)
        .map_err(ExtractionError::into_ocr)
    }
}

async fn acquire(permits: Arc<Semaphore>) -> Result<OwnedSemaphorePermit, ExtractionError> {
    permits
        .acquire_owned()
        .await
        .map_err(|e| ExtractionError::OcrEngine(format!("worker pool closed: {e}")))
}
