//! Loaded-document model: page geometry plus the flat text layer.
//!
//! The document source collaborator supplies page dimensions and a
//! token layer (paginated documents) or raw text (flat documents).
//! Loading builds the flat text and the offset→token map exactly once;
//! zoom afterwards only rescales, never rebuilds.

use log::info;

use crate::geometry::PageGeometry;

/// Location of one token in the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TokenRef {
    pub page: usize,
    pub token: usize,
}

#[derive(Clone, Copy, Debug)]
struct MapEntry {
    start: usize,
    end: usize,
    page: usize,
    token: usize,
}

/// Mapping from global offsets (into the concatenated document text)
/// to tokens. Built once at load; consumed by search indexing and
/// span↔token conversion.
#[derive(Clone, Debug, Default)]
pub struct TokenMap {
    /// Non-overlapping ranges, ascending by start
    entries: Vec<MapEntry>,
}

impl TokenMap {
    /// Token covering the given offset. Separator characters between
    /// tokens map to nothing.
    #[must_use]
    pub fn locate(&self, offset: usize) -> Option<TokenRef> {
        let idx = self.entries.partition_point(|e| e.start <= offset);
        let entry = self.entries.get(idx.checked_sub(1)?)?;
        (offset < entry.end).then_some(TokenRef {
            page: entry.page,
            token: entry.token,
        })
    }

    /// Tokens whose mapped range intersects `[start, end)`, in
    /// document order.
    #[must_use]
    pub fn tokens_in_range(&self, start: usize, end: usize) -> Vec<TokenRef> {
        let first = self.entries.partition_point(|e| e.end <= start);
        self.entries[first..]
            .iter()
            .take_while(|e| e.start < end)
            .map(|e| TokenRef {
                page: e.page,
                token: e.token,
            })
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A loaded document: geometry for every page and one flat text layer.
pub struct Document {
    /// Identity of the active document; search recompute keys on it
    pub id: String,
    pages: Vec<PageGeometry>,
    text: String,
    token_map: TokenMap,
    read_only: bool,
}

impl Document {
    /// Build a paginated document from its page geometry. The flat
    /// text is the token texts joined with single spaces across the
    /// whole document; the token map records each token's range in it.
    #[must_use]
    pub fn paginated(id: impl Into<String>, pages: Vec<PageGeometry>) -> Self {
        let mut text = String::new();
        let mut entries = Vec::new();

        for page in &pages {
            for token in page.tokens() {
                if !text.is_empty() {
                    text.push(' ');
                }
                let start = text.len();
                text.push_str(&token.text);
                entries.push(MapEntry {
                    start,
                    end: text.len(),
                    page: token.page,
                    token: token.index,
                });
            }
        }

        let id = id.into();
        info!(
            "loaded document {id}: {} pages, {} tokens, {} chars",
            pages.len(),
            entries.len(),
            text.len()
        );

        Self {
            id,
            pages,
            text,
            token_map: TokenMap { entries },
            read_only: false,
        }
    }

    /// Build a flat-text document. No pages, no token map; annotations
    /// anchor by character span.
    #[must_use]
    pub fn flat_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pages: vec![],
            text: text.into(),
            token_map: TokenMap::default(),
            read_only: false,
        }
    }

    #[must_use]
    pub fn is_paginated(&self) -> bool {
        !self.pages.is_empty()
    }

    #[must_use]
    pub fn page(&self, index: usize) -> Option<&PageGeometry> {
        self.pages.get(index)
    }

    #[must_use]
    pub fn pages(&self) -> &[PageGeometry] {
        &self.pages
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn token_map(&self) -> &TokenMap {
        &self.token_map
    }

    /// Natural (unscaled) page heights, for the renderer's layout.
    #[must_use]
    pub fn natural_heights(&self) -> Vec<f32> {
        self.pages.iter().map(|p| p.height).collect()
    }

    /// Propagate a zoom change to every page. Rescales only.
    pub fn set_scale(&mut self, factor: f32) {
        for page in &mut self.pages {
            page.set_scale(factor);
        }
    }

    #[must_use]
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }
}
