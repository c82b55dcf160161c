use tracing::debug;

use super::types::PdfTextPages;
use super::ExtractionError;

/// Whether a PDF carries a usable text layer.
///
/// Pages are inspected in order and the first page whose trimmed text is
/// non-empty decides `true`. Only a document with every page empty or
/// whitespace is `false` (scanned).
pub fn is_pure(pages: &dyn PdfTextPages) -> Result<bool, ExtractionError> {
    for index in 0..pages.page_count() {
        if !pages.page_text(index)?.trim().is_empty() {
            debug!(page = index + 1, "Text layer found");
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::pipeline::extraction::pdf::LopdfTextLayer;
    use crate::pipeline::extraction::testing::{pdf_with_forms, pdf_with_pages, FormFixture};
    use crate::pipeline::extraction::types::PdfTextLayer;

    /// Counts page reads so early exit can be observed.
    struct CountingPages {
        texts: Vec<&'static str>,
        reads: Cell<usize>,
    }

    impl PdfTextPages for CountingPages {
        fn page_count(&self) -> usize {
            self.texts.len()
        }

        fn page_text(&self, index: usize) -> Result<String, ExtractionError> {
            self.reads.set(self.reads.get() + 1);
            Ok(self.texts[index].to_string())
        }
    }

    fn counting(texts: Vec<&'static str>) -> CountingPages {
        CountingPages {
            texts,
            reads: Cell::new(0),
        }
    }

    #[test]
    fn text_pdf_is_pure() {
        let pages = LopdfTextLayer
            .open(&pdf_with_pages(&["Invoice #123"]))
            .unwrap();
        assert!(is_pure(pages.as_ref()).unwrap());
    }

    #[test]
    fn all_blank_pages_is_scanned() {
        let pages = LopdfTextLayer.open(&pdf_with_pages(&["", ""])).unwrap();
        assert!(!is_pure(pages.as_ref()).unwrap());
    }

    #[test]
    fn text_on_later_page_is_enough() {
        let pages = LopdfTextLayer
            .open(&pdf_with_pages(&["", "", "late text"]))
            .unwrap();
        assert!(is_pure(pages.as_ref()).unwrap());
    }

    #[test]
    fn whitespace_only_pages_are_empty() {
        let pages = counting(vec!["   ", "\n\t", " "]);
        assert!(!is_pure(&pages).unwrap());
        assert_eq!(pages.reads.get(), 3);
    }

    #[test]
    fn stops_at_first_non_empty_page() {
        let pages = counting(vec!["", "found", "never read"]);
        assert!(is_pure(&pages).unwrap());
        assert_eq!(pages.reads.get(), 2);
    }

    #[test]
    fn text_only_inside_form_xobject_is_pure() {
        let bytes = pdf_with_forms(
            "q /Fm1 Do Q",
            &[FormFixture::new("Fm1", "BT /F1 12 Tf 100 700 Td (Total 50) Tj ET")],
        );
        let pages = LopdfTextLayer.open(&bytes).unwrap();
        assert!(is_pure(pages.as_ref()).unwrap());
    }

    #[test]
    fn image_only_form_is_still_scanned() {
        let bytes = pdf_with_forms(
            "q /Fm1 Do Q",
            &[FormFixture::new("Fm1", "0 0 1 rg 10 10 100 100 re f")],
        );
        let pages = LopdfTextLayer.open(&bytes).unwrap();
        assert!(!is_pure(pages.as_ref()).unwrap());
    }

    #[test]
    fn zero_pages_is_scanned() {
        assert!(!is_pure(&counting(vec![])).unwrap());
    }

    #[test]
    fn classification_is_idempotent() {
        let bytes = pdf_with_pages(&["", "Some text"]);
        let first = is_pure(LopdfTextLayer.open(&bytes).unwrap().as_ref()).unwrap();
        let second = is_pure(LopdfTextLayer.open(&bytes).unwrap().as_ref()).unwrap();
        assert_eq!(first, second);
    }
}
