use lopdf::{Document, ObjectId};

use super::layout::form_xobject_text;
use super::types::{PdfTextLayer, PdfTextPages};
use super::ExtractionError;

/// PDF text layer backed by lopdf.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfTextLayer;

impl PdfTextLayer for LopdfTextLayer {
    fn open(&self, pdf_bytes: &[u8]) -> Result<Box<dyn PdfTextPages>, ExtractionError> {
        let doc = Document::load_mem(pdf_bytes)?;
        let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();
        Ok(Box::new(LopdfPages { doc, pages }))
    }
}

struct LopdfPages {
    doc: Document,
    /// 1-based page numbers with their page objects, in document order.
    pages: Vec<(u32, ObjectId)>,
}

impl PdfTextPages for LopdfPages {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// The page's own text-show operators, followed by any text drawn
    /// through form XObjects.
    fn page_text(&self, index: usize) -> Result<String, ExtractionError> {
        let &(number, page_id) = self.pages.get(index).ok_or_else(|| {
            ExtractionError::MalformedDocument(format!("page index {index} out of range"))
        })?;
        let mut text = self.doc.extract_text(&[number])?;

        let forms = form_xobject_text(&self.doc, page_id)?;
        if !forms.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&forms);
        }
        Ok(text)
    }
}

/// Direct text-layer extraction: one trimmed string per page.
pub fn extract_direct(pages: &dyn PdfTextPages) -> Result<Vec<String>, ExtractionError> {
    (0..pages.page_count())
        .map(|index| pages.page_text(index).map(|text| text.trim().to_string()))
        .collect()
}
