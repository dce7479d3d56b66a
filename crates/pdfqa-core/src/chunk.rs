//! Overlapping fixed-size text chunking
//!
//! Lengths are counted in characters. Every chunk but the last ends either
//! just after the separator closest to the size limit or, when no separator
//! leaves the chunk longer than the overlap, at exactly the size limit. The
//! next chunk always starts `overlap` characters before the previous end, so
//! dropping the first `overlap` characters of every chunk after the first and
//! concatenating gives back the input.

use crate::{Config, PdfQaError, Result};

/// A chunk of document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The text content
    pub text: String,
    /// Position of this chunk in the document (0-based)
    pub index: usize,
    /// Character offset of the first character in the document text
    pub start: usize,
}

impl Chunk {
    /// Length in characters.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Splits text into overlapping chunks.
#[derive(Debug, Clone)]
pub struct Chunker {
    size: usize,
    overlap: usize,
    separator: char,
}

impl Chunker {
    /// Create a chunker; `overlap` must be smaller than `size`.
    pub fn new(size: usize, overlap: usize, separator: char) -> Result<Self> {
        if size == 0 {
            return Err(PdfQaError::Config("chunk size must be positive".into()));
        }
        if overlap >= size {
            return Err(PdfQaError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, size
            )));
        }
        Ok(Self {
            size,
            overlap,
            separator,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap, config.separator)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into chunks.
    ///
    /// Text no longer than the chunk size (including the empty string) comes
    /// back as a single chunk.
    pub fn split(&self, text: &str) -> Vec<Chunk> {
        // Byte offset of every char, plus the end of the text
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = bounds.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let limit = start + self.size;
            if limit >= total {
                chunks.push(Chunk {
                    text: text[bounds[start]..].to_string(),
                    index: chunks.len(),
                    start,
                });
                break;
            }

            let end = self.break_point(text, &bounds, start, limit);
            chunks.push(Chunk {
                text: text[bounds[start]..bounds[end]].to_string(),
                index: chunks.len(),
                start,
            });

            // end > start + overlap, so this always advances
            start = end - self.overlap;
        }

        chunks
    }

    /// Pick the end (exclusive, in chars) of the chunk starting at `start`.
    fn break_point(&self, text: &str, bounds: &[usize], start: usize, limit: usize) -> usize {
        (start + self.overlap..limit)
            .rev()
            .find(|&i| text[bounds[i]..bounds[i + 1]].starts_with(self.separator))
            .map(|i| i + 1)
            .unwrap_or(limit)
    }
}

/// Rebuild the original text from chunks produced with `overlap`.
pub fn reassemble(chunks: &[Chunk], overlap: usize) -> String {
    let mut text = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            text.push_str(&chunk.text);
        } else {
            text.extend(chunk.text.chars().skip(overlap));
        }
    }
    text
}
