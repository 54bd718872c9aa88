//! Token-indexed text search over the flat document layer.
//!
//! Matches are ephemeral: they are recomputed whenever the normalized
//! query or the active document identity changes, and at no other
//! time. Each match carries bounded lead-in/lead-out context built by
//! walking the offset→token map outward from the match, plus per-page
//! token groups and bounding boxes for overlay painting and scroll
//! targeting.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use log::debug;
use regex::RegexBuilder;

use crate::document::{Document, TokenRef};
use crate::geometry::BoundingBox;

/// Context budget on each side of a match, in characters.
pub const CONTEXT_BUDGET: usize = 128;

/// One search hit.
#[derive(Clone, Debug)]
pub struct SearchMatch {
    /// Match ordinal within the current result set
    pub id: usize,
    /// Offset range `[start, end)` into the flat text
    pub start: usize,
    pub end: usize,
    /// Covered token indices grouped by page
    pub tokens_by_page: BTreeMap<usize, Vec<usize>>,
    /// Union bounds of the covered tokens, per page, unscaled
    pub bounds_by_page: BTreeMap<usize, BoundingBox>,
    /// Context before the match, forward reading order
    pub lead_in: String,
    /// Context after the match
    pub lead_out: String,
    /// First page touched, for scroll targeting
    pub start_page: usize,
    /// Last page touched
    pub end_page: usize,
}

/// Search state over one document at a time.
#[derive(Debug, Default)]
pub struct TextSearchIndexer {
    doc_id: Option<String>,
    applied_query: Option<String>,
    matches: Vec<SearchMatch>,
    selected: Option<usize>,
}

impl TextSearchIndexer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn matches(&self) -> &[SearchMatch] {
        &self.matches
    }

    #[must_use]
    pub fn selected_match(&self) -> Option<&SearchMatch> {
        self.selected.and_then(|i| self.matches.get(i))
    }

    /// `[current/total]` indicator for the host's search bar.
    #[must_use]
    pub fn match_info(&self) -> String {
        match (self.selected, self.matches.len()) {
            (_, 0) => "No matches".to_string(),
            (Some(current), total) => format!("[{}/{}]", current + 1, total),
            (None, total) => format!("[{total} matches]"),
        }
    }

    /// Apply a query against a document. Returns false — leaving the
    /// match set untouched — when neither the normalized query nor the
    /// document identity changed. An empty query clears matches
    /// immediately.
    pub fn apply(&mut self, doc: &Document, query: &str) -> bool {
        let normalized = normalize_query(query);
        if self.doc_id.as_deref() == Some(doc.id.as_str())
            && self.applied_query.as_deref() == Some(normalized.as_str())
        {
            return false;
        }

        self.doc_id = Some(doc.id.clone());
        self.applied_query = Some(normalized.clone());

        if normalized.is_empty() {
            self.matches.clear();
            self.selected = None;
            return true;
        }

        self.matches = find_matches(doc, &normalized);
        self.selected = if self.matches.is_empty() { None } else { Some(0) };
        debug!(
            "query {normalized:?} over {}: {} matches",
            doc.id,
            self.matches.len()
        );
        true
    }

    /// Advance the selected match, wrapping past the end.
    pub fn next_match(&mut self) -> Option<&SearchMatch> {
        if self.matches.is_empty() {
            return None;
        }
        self.selected = Some(match self.selected {
            Some(i) => (i + 1) % self.matches.len(),
            None => 0,
        });
        self.selected_match()
    }

    /// Retreat the selected match, wrapping past the start.
    pub fn previous_match(&mut self) -> Option<&SearchMatch> {
        if self.matches.is_empty() {
            return None;
        }
        self.selected = Some(match self.selected {
            Some(0) | None => self.matches.len() - 1,
            Some(i) => i - 1,
        });
        self.selected_match()
    }
}

/// Trim + lowercase. Queries equal after normalization are the same
/// query for recompute and debounce purposes.
#[must_use]
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

fn find_matches(doc: &Document, normalized: &str) -> Vec<SearchMatch> {
    let Ok(pattern) = RegexBuilder::new(&regex::escape(normalized))
        .case_insensitive(true)
        .build()
    else {
        return vec![];
    };

    pattern
        .find_iter(doc.text())
        .enumerate()
        .map(|(id, m)| build_match(doc, id, m.start(), m.end()))
        .collect()
}

fn build_match(doc: &Document, id: usize, start: usize, end: usize) -> SearchMatch {
    let covered = doc.token_map().tokens_in_range(start, end);

    let mut tokens_by_page: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for TokenRef { page, token } in covered {
        tokens_by_page.entry(page).or_default().push(token);
    }

    let mut bounds_by_page = BTreeMap::new();
    for (&page, tokens) in &tokens_by_page {
        if let Some(bounds) = doc.page(page).and_then(|g| g.bounds_for_tokens(tokens)) {
            bounds_by_page.insert(page, bounds);
        }
    }

    let start_page = tokens_by_page.keys().next().copied().unwrap_or(0);
    let end_page = tokens_by_page.keys().next_back().copied().unwrap_or(0);

    SearchMatch {
        id,
        start,
        end,
        tokens_by_page,
        bounds_by_page,
        lead_in: lead_in_context(doc, start),
        lead_out: lead_out_context(doc, end),
        start_page,
        end_page,
    }
}

/// Walk backward from the match start, at most [`CONTEXT_BUDGET`]
/// characters, collecting each token once as its identity changes,
/// then reverse into forward reading order.
fn lead_in_context(doc: &Document, start: usize) -> String {
    let mut collected: Vec<TokenRef> = Vec::new();
    let mut last: Option<TokenRef> = None;

    for (steps, (offset, _)) in doc.text()[..start].char_indices().rev().enumerate() {
        if steps >= CONTEXT_BUDGET {
            break;
        }
        let here = doc.token_map().locate(offset);
        if let Some(token) = here {
            if last != Some(token) {
                collected.push(token);
            }
        }
        last = here;
    }

    collected.reverse();
    join_token_texts(doc, &collected)
}

/// Forward mirror of [`lead_in_context`], from the match end.
fn lead_out_context(doc: &Document, end: usize) -> String {
    let mut collected: Vec<TokenRef> = Vec::new();
    let mut last: Option<TokenRef> = None;

    for (steps, (offset, _)) in doc.text()[end..].char_indices().enumerate() {
        if steps >= CONTEXT_BUDGET {
            break;
        }
        let here = doc.token_map().locate(end + offset);
        if let Some(token) = here {
            if last != Some(token) {
                collected.push(token);
            }
        }
        last = here;
    }

    join_token_texts(doc, &collected)
}

fn join_token_texts(doc: &Document, tokens: &[TokenRef]) -> String {
    tokens
        .iter()
        .filter_map(|t| Some(doc.page(t.page)?.token(t.token)?.text.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Explicit debounce rule for search input: at most one application
/// per window, trailing edge, skipped entirely when the normalized
/// value matches the last applied one. Independent of any rendering
/// mechanism — the host submits keystrokes and polls with the current
/// instant.
#[derive(Debug)]
pub struct QueryDebouncer {
    window: Duration,
    pending: Option<(String, Instant)>,
    last_applied: Option<String>,
}

impl QueryDebouncer {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            last_applied: None,
        }
    }

    /// Submit raw input. Returns a query to apply immediately only for
    /// the empty query (clearing matches is not debounced); anything
    /// else waits for the trailing edge.
    pub fn submit(&mut self, query: &str, now: Instant) -> Option<String> {
        let normalized = normalize_query(query);

        if self.last_applied.as_deref() == Some(normalized.as_str()) {
            self.pending = None;
            return None;
        }

        if normalized.is_empty() {
            self.pending = None;
            self.last_applied = Some(normalized.clone());
            return Some(normalized);
        }

        self.pending = Some((normalized, now));
        None
    }

    /// Trailing-edge poll: hands out the pending query once the window
    /// has elapsed since the last submit.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        let (_, since) = self.pending.as_ref()?;
        if now.duration_since(*since) < self.window {
            return None;
        }
        let (query, _) = self.pending.take()?;
        self.last_applied = Some(query.clone());
        Some(query)
    }
}
