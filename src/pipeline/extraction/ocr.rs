use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::debug;

use super::types::{OcrEngine, OcrPageResult};
use super::ExtractionError;

/// Default recognition languages.
pub const DEFAULT_OCR_LANG: &str = "eng";

/// LSTM engine, single uniform block of text.
const OEM_LSTM: &str = "3";
const PSM_SINGLE_BLOCK: &str = "6";

/// Tesseract driven through its command-line binary.
///
/// Each call writes the page image to a private temp file and reads the
/// recognised text from stdout, so instances are freely shareable across
/// worker threads.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: PathBuf,
    lang: String,
}

impl TesseractCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            lang: DEFAULT_OCR_LANG.to_string(),
        }
    }

    /// Set language(s) for OCR (e.g., "eng", "spa+eng")
    pub fn with_languages(mut self, langs: &str) -> Self {
        self.lang = langs.to_string();
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Run `tesseract --version` to confirm the binary is callable.
    pub fn verify(&self) -> Result<String, ExtractionError> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .map_err(|e| {
                ExtractionError::OcrEngine(format!(
                    "cannot run {}: {e}",
                    self.binary.display()
                ))
            })?;
        let banner = String::from_utf8_lossy(&output.stdout);
        Ok(banner.lines().next().unwrap_or_default().trim().to_string())
    }
}

impl OcrEngine for TesseractCli {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        let mut input = tempfile::Builder::new()
            .prefix("pdfintake-page-")
            .suffix(".png")
            .tempfile()?;
        input.write_all(image_bytes)?;
        input.flush()?;

        let output = Command::new(&self.binary)
            .arg(input.path())
            .arg("stdout")
            .args(["-l", &self.lang, "--oem", OEM_LSTM, "--psm", PSM_SINGLE_BLOCK])
            .output()
            .map_err(|e| {
                ExtractionError::OcrEngine(format!(
                    "cannot run {}: {e}",
                    self.binary.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::OcrEngine(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout)
            .trim_end_matches('\u{c}')
            .to_string();
        debug!(chars = text.len(), "Tesseract CLI recognised page");

        Ok(OcrPageResult {
            text,
            confidence: None,
        })
    }
}

/// In-process Tesseract via libtesseract.
/// Only available when compiled with the `ocr` feature flag.
#[cfg(feature = "ocr")]
pub struct BundledTesseract {
    tessdata_dir: Option<PathBuf>,
    lang: String,
}

#[cfg(feature = "ocr")]
impl BundledTesseract {
    /// `tessdata_dir` of `None` uses libtesseract's compiled-in search path.
    pub fn new(tessdata_dir: Option<&Path>) -> Result<Self, ExtractionError> {
        if let Some(dir) = tessdata_dir {
            if !dir.is_dir() {
                return Err(ExtractionError::OcrEngine(format!(
                    "tessdata directory not found: {}",
                    dir.display()
                )));
            }
        }
        Ok(Self {
            tessdata_dir: tessdata_dir.map(Path::to_path_buf),
            lang: DEFAULT_OCR_LANG.to_string(),
        })
    }

    pub fn with_languages(mut self, langs: &str) -> Self {
        self.lang = langs.to_string();
        self
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for BundledTesseract {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        let tessdata = match &self.tessdata_dir {
            Some(dir) => Some(dir.to_str().ok_or_else(|| {
                ExtractionError::OcrEngine("tessdata path is not valid UTF-8".into())
            })?),
            None => None,
        };

        let tess = tesseract::Tesseract::new(tessdata, Some(&self.lang))
            .map_err(|e| ExtractionError::OcrEngine(format!("init failed: {e:?}")))?
            .set_variable("tessedit_pageseg_mode", PSM_SINGLE_BLOCK)
            .map_err(|e| ExtractionError::OcrEngine(format!("config failed: {e:?}")))?;

        let mut tess = tess
            .set_image_from_mem(image_bytes)
            .map_err(|e| ExtractionError::OcrEngine(format!("{e:?}")))?;

        let text = tess
            .get_text()
            .map_err(|e| ExtractionError::OcrEngine(format!("{e:?}")))?;
        let confidence = tess.mean_text_conf().max(0) as f32 / 100.0;

        Ok(OcrPageResult {
            text,
            confidence: Some(confidence),
        })
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Mock OCR engine for unit testing without Tesseract.
///
/// Per-page mode relies on [`super::pdfium::MockPdfPageRenderer`], whose
/// page `i` is `i + 1` pixels wide.
pub struct MockOcrEngine {
    pages: Vec<String>,
    delays_ms: Vec<u64>,
    fail_page: Option<usize>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl MockOcrEngine {
    /// Same text for every image.
    pub fn new(text: &str) -> Self {
        Self::per_page(&[text])
    }

    /// Text for page `i` is `texts[i]`; images outside the list reuse the
    /// last entry.
    pub fn per_page(texts: &[&str]) -> Self {
        Self {
            pages: texts.iter().map(|t| t.to_string()).collect(),
            delays_ms: Vec::new(),
            fail_page: None,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep `delays_ms[i]` before answering for page `i`.
    pub fn with_delays(mut self, delays_ms: &[u64]) -> Self {
        self.delays_ms = delays_ms.to_vec();
        self
    }

    /// Recognition of page `index` fails.
    pub fn failing_on(mut self, index: usize) -> Self {
        self.fail_page = Some(index);
        self
    }

    /// Highest number of concurrent `ocr_image` calls observed.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn page_index(image_bytes: &[u8]) -> usize {
        use image::GenericImageView;
        image::load_from_memory(image_bytes)
            .map(|img| img.width().saturating_sub(1) as usize)
            .unwrap_or(0)
    }
}

impl OcrEngine for MockOcrEngine {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let index = Self::page_index(image_bytes);
        if let Some(ms) = self.delays_ms.get(index) {
            std::thread::sleep(Duration::from_millis(*ms));
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_page == Some(index) {
            return Err(ExtractionError::OcrEngine(format!(
                "mock failure on page {index}"
            )));
        }

        let text = self
            .pages
            .get(index)
            .or_else(|| self.pages.last())
            .cloned()
            .unwrap_or_default();
        Ok(OcrPageResult {
            text,
            confidence: None,
        })
    }
}
