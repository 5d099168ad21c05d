//! Fixed-size character windows over a document.
//!
//! Sizes are counted in Unicode scalar values, so a window never splits a
//! UTF-8 sequence. Windows are contiguous and do not overlap: concatenating
//! every chunk reproduces the document exactly.

use crate::pipeline::extract::Document;

/// An ordered, contiguous slice of a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// 0-based position in the chunk sequence.
    pub index: usize,
    pub text: &'a str,
}

impl Chunk<'_> {
    /// Length in characters; never more than the chunk size.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Lazy iterator of chunks. `Clone` it to restart from the current position.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    rest: &'a str,
    size: usize,
    next_index: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let split = self
            .rest
            .char_indices()
            .nth(self.size)
            .map(|(idx, _)| idx)
            .unwrap_or(self.rest.len());
        let (head, tail) = self.rest.split_at(split);
        self.rest = tail;
        let chunk = Chunk {
            index: self.next_index,
            text: head,
        };
        self.next_index += 1;
        Some(chunk)
    }
}

/// Split `document` into windows of at most `size` characters.
///
/// `size` must be positive; [`crate::config::DecoderConfigBuilder::build`]
/// rejects zero. A zero size passed directly yields no chunks.
pub fn chunk(document: &Document, size: usize) -> Chunks<'_> {
    chunk_str(document.text(), size)
}

/// [`chunk`] over a bare string.
pub fn chunk_str(text: &str, size: usize) -> Chunks<'_> {
    Chunks {
        rest: if size == 0 { "" } else { text },
        size,
        next_index: 0,
    }
}

/// Number of chunks `text` splits into: `ceil(chars / size)`.
pub fn chunk_count(char_count: usize, size: usize) -> usize {
    if size == 0 {
        0
    } else {
        char_count.div_ceil(size)
    }
}
