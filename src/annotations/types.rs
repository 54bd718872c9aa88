//! Annotation data model.
//!
//! Annotations anchor either to a character-offset span in the flat
//! document text or to per-page token sets with explicit bounding
//! boxes. The anchoring mode is a tagged enum matched exhaustively —
//! there is no runtime type sniffing anywhere downstream. Relations
//! reference annotations by id only, so deleting an annotation is a
//! pure filter over id sets.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::geometry::{BoundingBox, PageAnnotation, PageGeometry};

/// Identifier shared by annotations, relations, and document labels.
///
/// Records start life with a locally-generated pending id; the
/// authoritative server id replaces it when persistence acknowledges
/// the create. The two can never be confused: they are distinct
/// variants, not a string convention.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    /// Locally-generated id for an optimistic record
    Pending(u64),
    /// Server-assigned id for a persisted record
    Server(String),
}

impl RecordId {
    /// Draw a fresh pending id. Process-local uniqueness is all that
    /// is needed; the server id arrives on acknowledge.
    #[must_use]
    pub fn fresh_pending() -> Self {
        Self::Pending(rand::random::<u64>())
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending(n) => write!(f, "pending-{n}"),
            Self::Server(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::Server(id.to_string())
    }
}

/// A label users attach to annotations and relations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Label {
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            color: None,
        }
    }
}

/// Review status. Approved and rejected were a pair of mutually
/// exclusive booleans in the persisted wire format; here the
/// exclusivity is structural.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    #[default]
    Unreviewed,
    Approved,
    Rejected,
}

/// Per-record capability granted by the permission resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Update,
    Delete,
    Approve,
}

/// How an annotation is anchored to the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    /// Character-offset range `[start, end)` into the flat document
    /// text; used for non-paginated documents.
    Span { start: usize, end: usize },

    /// Per-page token payloads; may span multiple pages. The anchor
    /// page (lowest page touched) is used for single-page operations
    /// like scroll targeting.
    Tokens {
        pages: BTreeMap<usize, PageAnnotation>,
        anchor_page: usize,
    },
}

impl Anchor {
    /// Page used for single-page operations; `None` for span anchors.
    #[must_use]
    pub fn anchor_page(&self) -> Option<usize> {
        match self {
            Self::Span { .. } => None,
            Self::Tokens { anchor_page, .. } => Some(*anchor_page),
        }
    }

    /// All pages this anchor touches, ascending. Empty for spans.
    #[must_use]
    pub fn pages(&self) -> Vec<usize> {
        match self {
            Self::Span { .. } => vec![],
            Self::Tokens { pages, .. } => pages.keys().copied().collect(),
        }
    }

    #[must_use]
    pub fn page_payload(&self, page: usize) -> Option<&PageAnnotation> {
        match self {
            Self::Span { .. } => None,
            Self::Tokens { pages, .. } => pages.get(&page),
        }
    }
}

/// A labeled annotation over document content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: RecordId,
    pub label: Label,
    /// Covered text as the user sees it
    pub raw_text: String,
    /// System/layout-derived rather than user-authored
    pub structural: bool,
    pub review: ReviewState,
    pub permissions: BTreeSet<Permission>,
    pub anchor: Anchor,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Annotation {
    /// Build a token-anchored annotation from per-page payloads. The
    /// anchor page is the lowest page touched; the raw text is the
    /// per-page text joined with single spaces in page order.
    pub fn token_anchored(
        label: Label,
        pages: BTreeMap<usize, PageAnnotation>,
    ) -> Result<Self, ValidationError> {
        let raw_text = pages
            .values()
            .map(|p| p.raw_text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        if raw_text.trim().is_empty() {
            return Err(ValidationError::EmptyText);
        }
        let anchor_page = *pages.keys().next().expect("non-empty: text was non-blank");

        let now = Utc::now();
        Ok(Self {
            id: RecordId::fresh_pending(),
            label,
            raw_text,
            structural: false,
            review: ReviewState::Unreviewed,
            permissions: default_own_permissions(),
            anchor: Anchor::Tokens { pages, anchor_page },
            created_at: now,
            updated_at: now,
        })
    }

    /// Build a span-anchored annotation for a flat-text document.
    pub fn span_anchored(
        label: Label,
        start: usize,
        end: usize,
        raw_text: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let raw_text = raw_text.into();
        if raw_text.trim().is_empty() {
            return Err(ValidationError::EmptyText);
        }

        let now = Utc::now();
        Ok(Self {
            id: RecordId::fresh_pending(),
            label,
            raw_text,
            structural: false,
            review: ReviewState::Unreviewed,
            permissions: default_own_permissions(),
            anchor: Anchor::Span { start, end },
            created_at: now,
            updated_at: now,
        })
    }

    /// Candidate annotation for a selection rectangle on one page:
    /// every token with nonzero-area overlap is included. `None` when
    /// nothing overlaps (or the page has no tokens).
    #[must_use]
    pub fn for_bounds(page: &PageGeometry, selection: &BoundingBox, label: Label) -> Option<Self> {
        let payload = page.page_annotation(std::slice::from_ref(selection))?;
        let mut pages = BTreeMap::new();
        pages.insert(page.page, payload);
        Self::token_anchored(label, pages).ok()
    }

    /// Mark approved; clears any rejection.
    pub fn approve(&mut self) {
        self.review = ReviewState::Approved;
        self.updated_at = Utc::now();
    }

    /// Mark rejected; clears any approval.
    pub fn reject(&mut self) {
        self.review = ReviewState::Rejected;
        self.updated_at = Utc::now();
    }

    #[must_use]
    pub fn can(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Page used for scroll targeting; `None` for span anchors.
    #[must_use]
    pub fn anchor_page(&self) -> Option<usize> {
        self.anchor.anchor_page()
    }
}

fn default_own_permissions() -> BTreeSet<Permission> {
    BTreeSet::from([
        Permission::Read,
        Permission::Update,
        Permission::Delete,
        Permission::Approve,
    ])
}

/// Directed many-to-many grouping between two annotation-id sets.
///
/// Invariant: both sets stay non-empty. Removal that would empty a
/// side deletes the whole relation instead — see
/// [`Self::without_annotation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationGroup {
    pub id: RecordId,
    pub label: Label,
    pub sources: BTreeSet<RecordId>,
    pub targets: BTreeSet<RecordId>,
    pub structural: bool,
}

impl RelationGroup {
    #[must_use]
    pub fn new(label: Label, sources: BTreeSet<RecordId>, targets: BTreeSet<RecordId>) -> Self {
        Self {
            id: RecordId::fresh_pending(),
            label,
            sources,
            targets,
            structural: false,
        }
    }

    #[must_use]
    pub fn references(&self, id: &RecordId) -> bool {
        self.sources.contains(id) || self.targets.contains(id)
    }

    /// The cascading-delete rule: drop `id` from whichever sets
    /// contain it. Returns `None` when that would leave a side empty,
    /// meaning the relation itself must go.
    #[must_use]
    pub fn without_annotation(&self, id: &RecordId) -> Option<Self> {
        if !self.references(id) {
            return Some(self.clone());
        }

        if (self.sources.contains(id) && self.sources.len() == 1)
            || (self.targets.contains(id) && self.targets.len() == 1)
        {
            return None;
        }

        let mut pruned = self.clone();
        pruned.sources.remove(id);
        pruned.targets.remove(id);
        Some(pruned)
    }
}

/// Document-level label with no geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocTypeAnnotation {
    pub id: RecordId,
    pub label: Label,
}

impl DocTypeAnnotation {
    #[must_use]
    pub fn new(label: Label) -> Self {
        Self {
            id: RecordId::fresh_pending(),
            label,
        }
    }
}
