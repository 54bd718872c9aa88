//! Cumulative-height index for virtualized page rendering.
//!
//! The layout is a prefix-sum table over per-page screen heights
//! (natural height × zoom + a fixed inter-page margin). Visible-window
//! queries binary-search this table; it is rebuilt whenever zoom or the
//! page count changes and at no other time.

use std::collections::BTreeSet;

/// Extra pages rendered beyond the strict viewport on each side to
/// mask scroll pop-in.
pub const OVERSCAN_PAGES: usize = 2;

/// Fixed margin between consecutive pages, in screen pixels.
pub const PAGE_MARGIN_PX: f32 = 32.0;

/// Contiguous mounted page range plus individually pinned pages.
///
/// Pinned pages hold the primary selected annotation or search match;
/// they stay mounted even when scrolled out of the core range so the
/// interaction they anchor is never torn down mid-flight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisibleWindow {
    /// First page of the contiguous core range (inclusive)
    pub first: usize,
    /// Last page of the contiguous core range (inclusive)
    pub last: usize,
    /// Force-included pages outside the core range
    pub pinned: BTreeSet<usize>,
}

impl VisibleWindow {
    #[must_use]
    pub fn contains(&self, page: usize) -> bool {
        (self.first..=self.last).contains(&page) || self.pinned.contains(&page)
    }

    /// All mounted pages: the core range followed by pinned outliers,
    /// ascending.
    #[must_use]
    pub fn pages(&self) -> Vec<usize> {
        let mut pages: BTreeSet<usize> = (self.first..=self.last).collect();
        pages.extend(self.pinned.iter().copied());
        pages.into_iter().collect()
    }

    #[must_use]
    pub fn core_len(&self) -> usize {
        self.last - self.first + 1
    }
}

/// Prefix-sum layout over page heights.
#[derive(Clone, Debug, Default)]
pub struct PageLayout {
    /// Per-page height including margin
    heights: Vec<f32>,
    /// Cumulative offsets; `offsets[i]` is the top of page `i`,
    /// `offsets[len]` the total scrollable height
    offsets: Vec<f32>,
}

impl PageLayout {
    /// Build from natural page heights at the given zoom factor.
    #[must_use]
    pub fn build(natural_heights: &[f32], zoom: f32, margin: f32) -> Self {
        let heights: Vec<f32> = natural_heights
            .iter()
            .map(|h| h * zoom + margin)
            .collect();

        let mut offsets = Vec::with_capacity(heights.len() + 1);
        let mut acc = 0.0f32;
        offsets.push(acc);
        for h in &heights {
            acc += h;
            offsets.push(acc);
        }

        Self { heights, offsets }
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.heights.len()
    }

    /// Total scrollable height. Unmounted pages render as placeholders
    /// of their layout height, so this never depends on mount state.
    #[must_use]
    pub fn total_height(&self) -> f32 {
        *self.offsets.last().unwrap_or(&0.0)
    }

    #[must_use]
    pub fn offset_of(&self, page: usize) -> Option<f32> {
        (page < self.heights.len()).then(|| self.offsets[page])
    }

    #[must_use]
    pub fn height_of(&self, page: usize) -> Option<f32> {
        self.heights.get(page).copied()
    }

    /// First page whose span covers or follows the given offset.
    #[must_use]
    pub fn page_at(&self, y: f32) -> Option<usize> {
        if self.heights.is_empty() {
            return None;
        }
        // Count pages that end at or before y; the next one covers it.
        let idx = self.offsets[1..].partition_point(|&end| end <= y);
        Some(idx.min(self.heights.len() - 1))
    }

    /// Strict viewport range: first page covering-or-following the
    /// viewport top through the last page preceding-or-covering the
    /// viewport bottom.
    #[must_use]
    pub fn viewport_range(&self, scroll_top: f32, viewport_height: f32) -> Option<(usize, usize)> {
        if self.heights.is_empty() {
            return None;
        }

        let first = self.page_at(scroll_top)?;
        let bottom = scroll_top + viewport_height.max(0.0);
        // Pages starting strictly above the viewport bottom intersect it.
        let below = self.offsets[..self.heights.len()].partition_point(|&start| start < bottom);
        let last = below.saturating_sub(1).max(first);

        Some((first, last.min(self.heights.len() - 1)))
    }

    /// Mounted window: strict range expanded by `overscan` on each
    /// side, with `pinned` pages force-included.
    #[must_use]
    pub fn window(
        &self,
        scroll_top: f32,
        viewport_height: f32,
        overscan: usize,
        pinned: &[usize],
    ) -> Option<VisibleWindow> {
        let (first, last) = self.viewport_range(scroll_top, viewport_height)?;
        let first = first.saturating_sub(overscan);
        let last = (last + overscan).min(self.heights.len() - 1);

        let pinned: BTreeSet<usize> = pinned
            .iter()
            .copied()
            .filter(|&p| p < self.heights.len() && !(first..=last).contains(&p))
            .collect();

        Some(VisibleWindow {
            first,
            last,
            pinned,
        })
    }
}
