//! Page geometry and coordinate conversions.
//!
//! Each page carries its token layout in *unscaled page space* (the
//! document source's natural pixel units). Screen space is unscaled
//! space multiplied by the current scale factor plus the page
//! container's offset. The two spaces are never mixed implicitly:
//! every conversion goes through [`PageGeometry`].

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle. The coordinate space (unscaled page space
/// vs. screen space) is determined by where the box came from; see the
/// module docs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    #[must_use]
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Build a box from two arbitrary corners, normalizing so that
    /// `left <= right` and `top <= bottom`. Drag selections hand in
    /// corners in whatever order the pointer produced them.
    #[must_use]
    pub fn from_corners(a: (f32, f32), b: (f32, f32)) -> Self {
        Self {
            left: a.0.min(b.0),
            top: a.1.min(b.1),
            right: a.0.max(b.0),
            bottom: a.1.max(b.1),
        }
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        (self.right - self.left).max(0.0)
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        (self.bottom - self.top).max(0.0)
    }

    #[must_use]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// True if the two boxes share nonzero area. Edge-touching boxes
    /// do not overlap.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    /// Smallest box containing both inputs.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    #[must_use]
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            left: self.left * factor,
            top: self.top * factor,
            right: self.right * factor,
            bottom: self.bottom * factor,
        }
    }

    #[must_use]
    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self {
            left: self.left + dx,
            top: self.top + dy,
            right: self.right + dx,
            bottom: self.bottom + dy,
        }
    }

    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }
}

/// Smallest addressable text unit on a page.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    /// Page index (0-based)
    pub page: usize,
    /// Token index within the page
    pub index: usize,
    /// Bounding box in unscaled page space
    pub bounds: BoundingBox,
    /// Surface text
    pub text: String,
}

/// Persisted per-page annotation payload: the token indices covered on
/// one page, their union bounds in unscaled units, and the covered
/// text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageAnnotation {
    pub tokens: Vec<usize>,
    pub bounds: BoundingBox,
    #[serde(rename = "rawText")]
    pub raw_text: String,
}

/// One page's geometry: ordered token layout plus natural dimensions.
///
/// Built once at document load. Zoom mutates `scale` in place; nothing
/// ever rebuilds the token list.
#[derive(Clone, Debug)]
pub struct PageGeometry {
    /// Page index (0-based)
    pub page: usize,
    /// Ordered token list
    tokens: Vec<Token>,
    /// Natural (unscaled) page width in pixels
    pub width: f32,
    /// Natural (unscaled) page height in pixels
    pub height: f32,
    /// Current scale factor (1.0 = natural size)
    scale: f32,
}

impl PageGeometry {
    #[must_use]
    pub fn new(page: usize, tokens: Vec<Token>, width: f32, height: f32) -> Self {
        Self {
            page,
            tokens,
            width,
            height,
            scale: 1.0,
        }
    }

    #[must_use]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Update the scale factor. The only mutation a page ever sees
    /// after construction.
    pub fn set_scale(&mut self, scale: f32) {
        self.scale = crate::render::Zoom::clamp_factor(scale);
    }

    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    #[must_use]
    pub fn token(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    /// A token's box at the current scale, in screen units relative to
    /// the page origin.
    #[must_use]
    pub fn scaled_token_bounds(&self, index: usize) -> Option<BoundingBox> {
        self.tokens.get(index).map(|t| t.bounds.scaled(self.scale))
    }

    /// Axis-aligned union of the given tokens' unscaled boxes. `None`
    /// if the input is empty or no index resolves to a token.
    #[must_use]
    pub fn bounds_for_tokens(&self, indices: &[usize]) -> Option<BoundingBox> {
        let mut acc: Option<BoundingBox> = None;
        for &index in indices {
            let Some(token) = self.tokens.get(index) else {
                continue;
            };
            acc = Some(match acc {
                Some(current) => current.union(&token.bounds),
                None => token.bounds,
            });
        }
        acc
    }

    /// Token indices whose unscaled box shares nonzero area with the
    /// unscaled selection rectangle. Overlap, not containment: a
    /// partial drag still captures boundary tokens.
    #[must_use]
    pub fn tokens_overlapping(&self, selection: &BoundingBox) -> Vec<usize> {
        self.tokens
            .iter()
            .filter(|t| t.bounds.overlaps(selection))
            .map(|t| t.index)
            .collect()
    }

    /// Convert one or more same-page selection rectangles (unscaled)
    /// into the persisted per-page payload. `None` when no token
    /// overlaps any rectangle — including the zero-token page case,
    /// which callers treat as "no overlay", not an error.
    #[must_use]
    pub fn page_annotation(&self, selections: &[BoundingBox]) -> Option<PageAnnotation> {
        if self.tokens.is_empty() {
            return None;
        }

        let mut indices: Vec<usize> = selections
            .iter()
            .flat_map(|rect| self.tokens_overlapping(rect))
            .collect();
        indices.sort_unstable();
        indices.dedup();

        if indices.is_empty() {
            return None;
        }

        let bounds = self.bounds_for_tokens(&indices)?;
        let raw_text = indices
            .iter()
            .filter_map(|&i| self.tokens.get(i))
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        Some(PageAnnotation {
            tokens: indices,
            bounds,
            raw_text,
        })
    }

    /// Unscaled page-space rect at the current scale, still relative
    /// to the page origin.
    #[must_use]
    pub fn scaled_bounds(&self, rect: &BoundingBox) -> BoundingBox {
        rect.scaled(self.scale)
    }

    /// Unscaled page-space rect converted to on-screen pixels: scale,
    /// then translate by the page container's screen offset.
    #[must_use]
    pub fn screen_space_bounds(&self, rect: &BoundingBox, origin: (f32, f32)) -> BoundingBox {
        rect.scaled(self.scale).translated(origin.0, origin.1)
    }

    /// Inverse of [`Self::screen_space_bounds`]: a screen rect back
    /// into unscaled page space.
    #[must_use]
    pub fn page_space_bounds(&self, rect: &BoundingBox, origin: (f32, f32)) -> BoundingBox {
        rect.translated(-origin.0, -origin.1)
            .scaled(1.0 / self.scale)
    }
}
