use crate::error::ExtractError;
use crate::extract::{TextExtractor, UploadedFile};

pub struct PdfExtractor {
    max_size: u64,
}

impl PdfExtractor {
    pub fn new(max_size: u64) -> Self {
        Self { max_size }
    }
}

impl TextExtractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &["application/pdf"]
    }

    fn max_size(&self) -> u64 {
        self.max_size
    }

    fn decode(&self, file: &UploadedFile) -> Result<String, ExtractError> {
        let doc = lopdf::Document::load_mem(&file.bytes)
            .map_err(|e| ExtractError::Pdf(e.to_string()))?;
        Ok(extract_text_from_pdf(&doc))
    }
}

/// Joins per-page text with newlines. Pages lopdf cannot read contribute an
/// empty string instead of failing the whole document.
fn extract_text_from_pdf(doc: &lopdf::Document) -> String {
    doc.get_pages()
        .keys()
        .map(|page_num| match doc.extract_text(&[*page_num]) {
            Ok(text) => text,
            Err(e) => {
                log::debug!("No text on page {}: {}", page_num, e);
                String::new()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
