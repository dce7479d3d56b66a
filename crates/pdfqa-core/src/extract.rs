//! Text extraction from PDF documents
//!
//! Pages are read in page order and their text concatenated as-is. A page
//! whose content cannot be decoded (scanned images, exotic fonts) contributes
//! nothing rather than failing the whole document.

use std::path::Path;

use lopdf::Document as PdfDocument;

use crate::{PdfQaError, Result};

/// A loaded PDF and the text extracted from it.
#[derive(Debug, Clone)]
pub struct Document {
    /// Blake3 hash of the PDF bytes
    pub fingerprint: String,
    /// Number of pages in the PDF
    pub page_count: usize,
    /// Pages that yielded no text
    pub empty_pages: usize,
    /// Concatenated text of every page
    pub text: String,
}

impl Document {
    /// Number of characters in the extracted text.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Read PDF bytes from disk.
pub fn read_pdf(path: &Path) -> Result<Vec<u8>> {
    Ok(std::fs::read(path)?)
}

/// Extract the text of every page, in page order.
pub fn extract_text(bytes: &[u8]) -> Result<Document> {
    let fingerprint = blake3::hash(bytes).to_hex().to_string();

    let pdf = PdfDocument::load_mem(bytes)
        .map_err(|e| PdfQaError::Extraction(format!("not a readable PDF: {}", e)))?;

    // get_pages() is keyed by page number, so iteration is already in order
    let pages = pdf.get_pages();
    let mut text = String::new();
    let mut empty_pages = 0;

    for &page_number in pages.keys() {
        match pdf.extract_text(&[page_number]) {
            Ok(page_text) => {
                if page_text.trim().is_empty() {
                    empty_pages += 1;
                }
                text.push_str(&page_text);
            }
            Err(e) => {
                tracing::warn!("No text extracted from page {}: {}", page_number, e);
                empty_pages += 1;
            }
        }
    }

    tracing::debug!(
        "Extracted {} bytes of text from {} pages ({} empty)",
        text.len(),
        pages.len(),
        empty_pages
    );

    Ok(Document {
        fingerprint,
        page_count: pages.len(),
        empty_pages,
        text,
    })
}
