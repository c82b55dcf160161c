//! Page rasterisation through PDFium.
//!
//! The renderer holds no PDFium handle between calls: each call binds the
//! library, opens the document, and drops both before returning.
//! `render_all` binds once for the whole document.

use std::io::Cursor;
use std::path::PathBuf;

use image::{DynamicImage, ImageOutputFormat};
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::types::PdfPageRenderer;
use super::ExtractionError;

/// Rendering DPI used when none is configured.
pub const DEFAULT_RENDER_DPI: u32 = 200;

/// Longest allowed side of a rendered page, in pixels.
const MAX_SIDE_PX: u32 = 4096;

const POINTS_PER_INCH: f32 = 72.0;

/// Env var naming an explicit PDFium library file.
pub const PDFIUM_LIB_ENV: &str = "PDFIUM_DYNAMIC_LIB_PATH";

/// Stateless PDFium-backed renderer.
pub struct PdfiumRenderer;

impl PdfiumRenderer {
    /// Fails when no PDFium library can be bound.
    pub fn new() -> Result<Self, ExtractionError> {
        load_pdfium().map(|_| Self)
    }
}

/// Directories next to the executable that may hold a bundled PDFium.
fn bundled_library_dirs() -> Vec<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.to_path_buf()))
        .map(|dir| vec![dir.clone(), dir.join("pdfium").join("lib")])
        .unwrap_or_default()
}

/// Bind PDFium: explicit path from the env var, then bundled copies, then
/// the system loader.
fn load_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var(PDFIUM_LIB_ENV) {
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            ExtractionError::OcrEngine(format!("cannot load PDFium from {path}: {e}"))
        })?;
        debug!(%path, "PDFium bound from {PDFIUM_LIB_ENV}");
        return Ok(Pdfium::new(bindings));
    }

    for dir in bundled_library_dirs() {
        let candidate = Pdfium::pdfium_platform_library_name_at_path(&dir);
        if let Ok(bindings) = Pdfium::bind_to_library(&candidate) {
            debug!(dir = %dir.display(), "PDFium bound from bundled copy");
            return Ok(Pdfium::new(bindings));
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| {
            ExtractionError::OcrEngine(format!(
                "no PDFium library found (set {PDFIUM_LIB_ENV} or install it system-wide): {e}"
            ))
        })
}

/// Bind, open, run `f`, then release everything.
fn with_document<T>(
    pdf_bytes: &[u8],
    f: impl FnOnce(&PdfDocument<'_>) -> Result<T, ExtractionError>,
) -> Result<T, ExtractionError> {
    let pdfium = load_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(|e| ExtractionError::MalformedDocument(format!("PDFium: {e}")))?;
    f(&document)
}

/// Pixel size for a page rendered at `dpi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TargetSize {
    width: u32,
    height: u32,
    /// Whether the longest side had to be scaled down to `MAX_SIDE_PX`.
    capped: bool,
}

fn target_size(width_pt: f32, height_pt: f32, dpi: u32) -> TargetSize {
    let px_per_pt = dpi as f32 / POINTS_PER_INCH;
    let width = (width_pt * px_per_pt).max(1.0);
    let height = (height_pt * px_per_pt).max(1.0);

    let longest = width.max(height);
    let shrink = if longest > MAX_SIDE_PX as f32 {
        MAX_SIDE_PX as f32 / longest
    } else {
        1.0
    };

    TargetSize {
        width: ((width * shrink) as u32).clamp(1, MAX_SIDE_PX),
        height: ((height * shrink) as u32).clamp(1, MAX_SIDE_PX),
        capped: shrink < 1.0,
    }
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ExtractionError> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::OcrEngine(format!("PNG encoding failed: {e}")))?;
    Ok(out.into_inner())
}

fn render_to_png(pages: &PdfPages<'_>, index: usize, dpi: u32) -> Result<Vec<u8>, ExtractionError> {
    let page = u16::try_from(index)
        .ok()
        .and_then(|i| pages.get(i).ok())
        .ok_or_else(|| {
            ExtractionError::OcrEngine(format!(
                "page {index} does not exist (document has {} pages)",
                pages.len()
            ))
        })?;

    let size = target_size(page.width().value, page.height().value, dpi);
    if size.capped {
        warn!(page = index, dpi, width = size.width, height = size.height, "Oversized page scaled down");
    }

    let render = PdfRenderConfig::new()
        .set_target_width(size.width as i32)
        .set_maximum_height(size.height as i32);
    let bitmap = page
        .render_with_config(&render)
        .map_err(|e| ExtractionError::OcrEngine(format!("page {index} failed to render: {e}")))?;

    let png = encode_png(&bitmap.as_image())?;
    debug!(page = index, width = size.width, height = size.height, bytes = png.len(), "Page rendered");
    Ok(png)
}

impl PdfPageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        with_document(pdf_bytes, |doc| Ok(usize::from(doc.pages().len())))
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        with_document(pdf_bytes, |doc| render_to_png(doc.pages(), page_number, dpi))
    }

    fn render_all(&self, pdf_bytes: &[u8], dpi: u32) -> Result<Vec<Vec<u8>>, ExtractionError> {
        with_document(pdf_bytes, |doc| {
            let pages = doc.pages();
            (0..usize::from(pages.len()))
                .map(|index| render_to_png(pages, index, dpi))
                .collect()
        })
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Renderer stand-in that never touches PDFium.
///
/// Page `i` comes out `i + 1` pixels wide, so OCR mocks can tell pages
/// apart after preprocessing.
pub struct MockPdfPageRenderer {
    pages: usize,
    corrupt: Option<usize>,
    broken: bool,
}

impl MockPdfPageRenderer {
    pub fn new(pages: usize) -> Self {
        Self {
            pages,
            corrupt: None,
            broken: false,
        }
    }

    /// Page `index` renders to bytes that are not an image.
    pub fn with_corrupt_page(mut self, index: usize) -> Self {
        self.corrupt = Some(index);
        self
    }

    /// Every render fails.
    pub fn failing() -> Self {
        Self {
            broken: true,
            ..Self::new(1)
        }
    }
}

impl PdfPageRenderer for MockPdfPageRenderer {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        Ok(self.pages)
    }

    fn render_page(
        &self,
        _pdf_bytes: &[u8],
        page_number: usize,
        _dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        if self.broken {
            return Err(ExtractionError::OcrEngine("mock renderer failure".into()));
        }
        if page_number >= self.pages {
            return Err(ExtractionError::OcrEngine(format!(
                "page {page_number} does not exist (mock has {} pages)",
                self.pages
            )));
        }
        if self.corrupt == Some(page_number) {
            return Ok(b"not an image at all".to_vec());
        }

        // Dark band over a light background.
        let page = image::RgbImage::from_fn(page_number as u32 + 1, 8, |_, y| {
            if y < 4 {
                image::Rgb([20, 20, 20])
            } else {
                image::Rgb([245, 245, 245])
            }
        });
        encode_png(&DynamicImage::ImageRgb8(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_page_at_default_dpi() {
        let size = target_size(595.0, 842.0, DEFAULT_RENDER_DPI);
        assert!((1650..=1653).contains(&size.width), "width {}", size.width);
        assert!((2336..=2339).contains(&size.height), "height {}", size.height);
        assert!(!size.capped);
    }

    #[test]
    fn oversized_page_is_capped_keeping_ratio() {
        let size = target_size(5000.0, 10000.0, DEFAULT_RENDER_DPI);
        assert!(size.capped);
        assert_eq!(size.height, MAX_SIDE_PX);
        let ratio = size.height as f32 / size.width as f32;
        assert!((ratio - 2.0).abs() < 0.01, "ratio {ratio}");
    }

    #[test]
    fn degenerate_page_still_one_pixel() {
        let size = target_size(0.0, -3.0, DEFAULT_RENDER_DPI);
        assert_eq!((size.width, size.height), (1, 1));
    }

    #[test]
    fn mock_page_widths_identify_pages() {
        let pages = MockPdfPageRenderer::new(3)
            .render_all(&[], DEFAULT_RENDER_DPI)
            .unwrap();
        let widths: Vec<u32> = pages
            .iter()
            .map(|png| image::load_from_memory(png).unwrap().to_rgb8().width())
            .collect();
        assert_eq!(widths, vec![1, 2, 3]);
    }

    #[test]
    fn mock_rejects_missing_page() {
        assert!(MockPdfPageRenderer::new(2).render_page(&[], 2, 200).is_err());
    }

    #[test]
    fn mock_corrupt_page_does_not_decode() {
        let bytes = MockPdfPageRenderer::new(2)
            .with_corrupt_page(1)
            .render_page(&[], 1, 200)
            .unwrap();
        assert!(image::load_from_memory(&bytes).is_err());
    }

    #[test]
    fn failing_mock_fails_whole_document() {
        assert!(MockPdfPageRenderer::failing().render_all(&[], 200).is_err());
    }
}
