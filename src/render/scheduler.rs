//! Virtualized page renderer.
//!
//! Owns the cumulative-height layout, the visible window, and the
//! paint-task lifecycle. Scroll and resize events only mark the window
//! dirty; the window itself is recomputed at most once per animation
//! frame, when the host applies [`Command::FrameTick`]. State changes
//! go through [`RendererState::apply`], which returns the effects to
//! execute — the same shape the paint pipeline's state machine has
//! always had.

use std::collections::HashMap;

use flume::{Receiver, Sender};
use log::debug;

use crate::annotations::RecordId;
use crate::error::ErrorSink;

use super::layout::{OVERSCAN_PAGES, PAGE_MARGIN_PX, PageLayout, VisibleWindow};
use super::paint::{
    CacheKey, CancelToken, PaintCache, PaintOutcome, PaintParams, PaintRequest, RequestId,
};
use super::zoom::Zoom;

/// Default capacity of the paint cache
pub const DEFAULT_PAINT_CACHE_SIZE: usize = 24;

/// Default prefetch radius beyond the visible window
pub const DEFAULT_PREFETCH_RADIUS: usize = 2;

/// Default lead-in margin above a jump target, in screen pixels
pub const DEFAULT_LEAD_IN_MARGIN: f32 = 24.0;

/// Commands that modify renderer state
#[derive(Clone, Debug)]
pub enum Command {
    /// Set the viewport dimensions
    SetViewport { width: f32, height: f32 },
    /// Set the scroll offset
    SetScrollTop(f32),
    /// Replace the natural page heights (document load / page count change)
    SetPageHeights(Vec<f32>),
    /// Set an absolute zoom factor
    SetZoom(f32),
    /// Zoom in by one step
    ZoomIn,
    /// Zoom out by one step
    ZoomOut,
    /// Pin the page owning the primary selected annotation
    SelectAnnotationPage(Option<usize>),
    /// Pin the page owning the primary selected search match
    SelectMatchPage(Option<usize>),
    /// Mark a page's paint stale
    PageNeedsRepaint(usize),
    /// Animation-frame tick; the only moment window work happens
    FrameTick,
}

/// Effects produced by state changes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Rebuild the cumulative-height layout
    RebuildLayout,
    /// Invalidate the entire paint cache
    InvalidateCache,
    /// Invalidate a specific page's paints
    InvalidatePage(usize),
    /// Recompute the visible window and reconcile paint tasks
    RecomputeWindow,
}

/// Pure renderer state; transitions via [`Self::apply`].
#[derive(Clone, Debug)]
pub struct RendererState {
    pub zoom: Zoom,
    pub viewport_width: f32,
    pub viewport_height: f32,
    pub scroll_top: f32,
    pub natural_heights: Vec<f32>,
    pub selected_annotation_page: Option<usize>,
    pub selected_match_page: Option<usize>,
    window_dirty: bool,
}

impl RendererState {
    #[must_use]
    pub fn new(natural_heights: Vec<f32>) -> Self {
        Self {
            zoom: Zoom::default(),
            viewport_width: 0.0,
            viewport_height: 0.0,
            scroll_top: 0.0,
            natural_heights,
            selected_annotation_page: None,
            selected_match_page: None,
            window_dirty: true,
        }
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::SetViewport { width, height } => {
                if (self.viewport_width - width).abs() > f32::EPSILON
                    || (self.viewport_height - height).abs() > f32::EPSILON
                {
                    self.viewport_width = width;
                    self.viewport_height = height;
                    self.window_dirty = true;
                }
                vec![]
            }

            Command::SetScrollTop(offset) => {
                let clamped = offset.max(0.0);
                if (self.scroll_top - clamped).abs() > f32::EPSILON {
                    self.scroll_top = clamped;
                    self.window_dirty = true;
                }
                vec![]
            }

            Command::SetPageHeights(heights) => {
                self.natural_heights = heights;
                self.window_dirty = true;
                vec![Effect::RebuildLayout, Effect::InvalidateCache]
            }

            Command::SetZoom(factor) => {
                if self.zoom.set(factor) {
                    self.window_dirty = true;
                    vec![Effect::RebuildLayout, Effect::InvalidateCache]
                } else {
                    vec![]
                }
            }

            Command::ZoomIn => {
                self.zoom.step_in();
                self.window_dirty = true;
                vec![Effect::RebuildLayout, Effect::InvalidateCache]
            }

            Command::ZoomOut => {
                self.zoom.step_out();
                self.window_dirty = true;
                vec![Effect::RebuildLayout, Effect::InvalidateCache]
            }

            Command::SelectAnnotationPage(page) => {
                if self.selected_annotation_page != page {
                    self.selected_annotation_page = page;
                    self.window_dirty = true;
                }
                vec![]
            }

            Command::SelectMatchPage(page) => {
                if self.selected_match_page != page {
                    self.selected_match_page = page;
                    self.window_dirty = true;
                }
                vec![]
            }

            Command::PageNeedsRepaint(page) => {
                self.window_dirty = true;
                vec![Effect::InvalidatePage(page)]
            }

            Command::FrameTick => {
                if self.window_dirty {
                    self.window_dirty = false;
                    vec![Effect::RecomputeWindow]
                } else {
                    vec![]
                }
            }
        }
    }

    /// Paint parameters for the current state
    #[must_use]
    pub fn paint_params(&self) -> PaintParams {
        PaintParams {
            scale: self.zoom.factor(),
            viewport_width: self.viewport_width,
            viewport_height: self.viewport_height,
        }
    }

    fn pinned_pages(&self) -> Vec<usize> {
        [self.selected_annotation_page, self.selected_match_page]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// What a mounted page currently shows.
#[derive(Clone, Debug)]
pub enum PageSlot {
    /// Correct-height empty box; no paint yet
    Placeholder,
    /// Painted surface ready for display
    Painted(std::sync::Arc<super::paint::PaintedPage>),
}

/// What a jump was aimed at; consumed by the target page once it
/// mounts and renders.
#[derive(Clone, Debug, PartialEq)]
pub enum ScrollTarget {
    Annotation(RecordId),
    SearchMatch(usize),
}

/// Scroll instruction for the host's scroll container.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrollCommand {
    /// Target scroll offset
    pub to: f32,
    pub behavior: ScrollBehavior,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollBehavior {
    Smooth,
    Instant,
}

#[derive(Debug)]
struct PendingPaint {
    page: usize,
    params: PaintParams,
    cancel: CancelToken,
}

#[derive(Debug)]
struct PendingScroll {
    page: usize,
    target: ScrollTarget,
}

/// Virtualized page renderer: layout + window + paint scheduling.
pub struct PageRenderer {
    state: RendererState,
    layout: PageLayout,
    window: Option<VisibleWindow>,
    cache: PaintCache,
    request_tx: Sender<PaintRequest>,
    request_rx: Receiver<PaintRequest>,
    next_request_id: u64,
    pending: HashMap<RequestId, PendingPaint>,
    /// Page → its single in-flight paint request
    in_flight: HashMap<usize, RequestId>,
    mounted: HashMap<usize, PageSlot>,
    pending_scroll: Option<PendingScroll>,
    prefetch_radius: usize,
    lead_in_margin: f32,
    error_sink: Box<dyn ErrorSink>,
}

impl PageRenderer {
    /// Create a renderer with default configuration
    #[must_use]
    pub fn new(natural_heights: Vec<f32>, error_sink: Box<dyn ErrorSink>) -> Self {
        Self::with_config(
            natural_heights,
            DEFAULT_PAINT_CACHE_SIZE,
            DEFAULT_PREFETCH_RADIUS,
            DEFAULT_LEAD_IN_MARGIN,
            error_sink,
        )
    }

    /// Create a renderer with custom configuration
    #[must_use]
    pub fn with_config(
        natural_heights: Vec<f32>,
        cache_size: usize,
        prefetch_radius: usize,
        lead_in_margin: f32,
        error_sink: Box<dyn ErrorSink>,
    ) -> Self {
        let (request_tx, request_rx) = flume::unbounded();
        let state = RendererState::new(natural_heights);
        let layout = PageLayout::build(&state.natural_heights, state.zoom.factor(), PAGE_MARGIN_PX);

        Self {
            state,
            layout,
            window: None,
            cache: PaintCache::new(cache_size),
            request_tx,
            request_rx,
            next_request_id: 1,
            pending: HashMap::new(),
            in_flight: HashMap::new(),
            mounted: HashMap::new(),
            pending_scroll: None,
            prefetch_radius,
            lead_in_margin,
            error_sink,
        }
    }

    #[must_use]
    pub fn state(&self) -> &RendererState {
        &self.state
    }

    #[must_use]
    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    #[must_use]
    pub fn window(&self) -> Option<&VisibleWindow> {
        self.window.as_ref()
    }

    /// Total scrollable height, independent of mount state.
    #[must_use]
    pub fn total_height(&self) -> f32 {
        self.layout.total_height()
    }

    /// Current display slot for a page; `None` when unmounted (render
    /// a placeholder of `layout().height_of(page)`).
    #[must_use]
    pub fn slot(&self, page: usize) -> Option<&PageSlot> {
        self.mounted.get(&page)
    }

    #[must_use]
    pub fn mounted_pages(&self) -> Vec<usize> {
        let mut pages: Vec<usize> = self.mounted.keys().copied().collect();
        pages.sort_unstable();
        pages
    }

    /// Receiver end of the paint queue, for the host's paint loop.
    #[must_use]
    pub fn request_receiver(&self) -> &Receiver<PaintRequest> {
        &self.request_rx
    }

    /// Apply a command to the renderer state and execute its effects.
    pub fn apply(&mut self, cmd: Command) {
        let effects = self.state.apply(cmd);
        for effect in effects {
            match effect {
                Effect::RebuildLayout => {
                    self.layout = PageLayout::build(
                        &self.state.natural_heights,
                        self.state.zoom.factor(),
                        PAGE_MARGIN_PX,
                    );
                }

                Effect::InvalidateCache => {
                    self.cache.invalidate_all();
                }

                Effect::InvalidatePage(page) => {
                    self.cache.invalidate_page(page);
                    if let Some(slot) = self.mounted.get_mut(&page) {
                        *slot = PageSlot::Placeholder;
                    }
                }

                Effect::RecomputeWindow => {
                    self.recompute_window();
                }
            }
        }
    }

    /// Convenience for the host's animation-frame callback.
    pub fn on_frame(&mut self) {
        self.apply(Command::FrameTick);
    }

    /// Phase one of a jump to an annotation: emit the scroll command
    /// and stash the target id for the page to pick up once mounted.
    pub fn jump_to_annotation(&mut self, id: RecordId, page: usize) -> Option<ScrollCommand> {
        self.jump_to(page, ScrollTarget::Annotation(id))
    }

    /// Phase one of a jump to a search match.
    pub fn jump_to_match(&mut self, match_id: usize, page: usize) -> Option<ScrollCommand> {
        self.jump_to(page, ScrollTarget::SearchMatch(match_id))
    }

    fn jump_to(&mut self, page: usize, target: ScrollTarget) -> Option<ScrollCommand> {
        let offset = self.layout.offset_of(page)?;
        self.pending_scroll = Some(PendingScroll { page, target });
        Some(ScrollCommand {
            to: (offset - self.lead_in_margin).max(0.0),
            behavior: ScrollBehavior::Smooth,
        })
    }

    /// Phase two of a jump: the now-mounted page claims its pending
    /// target so it can scroll the specific element into centered
    /// view. Returns `None` for every page but the target's.
    pub fn take_scroll_target(&mut self, page: usize) -> Option<ScrollTarget> {
        if self.pending_scroll.as_ref().is_some_and(|p| p.page == page) {
            self.pending_scroll.take().map(|p| p.target)
        } else {
            None
        }
    }

    /// Feed one paint outcome back into the scheduler.
    pub fn handle_outcome(&mut self, outcome: PaintOutcome) {
        match outcome {
            PaintOutcome::Completed { id, data } => {
                let Some(pending) = self.pending.remove(&id) else {
                    // Superseded long ago; nothing references it.
                    return;
                };
                self.clear_in_flight(pending.page, id);

                let key = CacheKey::from_params(pending.page, &pending.params);
                let arc = self.cache.insert(key, data);

                // Display update only if the paint still matches what
                // the page would be painted with right now.
                if pending.params == self.state.paint_params() {
                    if let Some(slot) = self.mounted.get_mut(&pending.page) {
                        *slot = PageSlot::Painted(arc);
                    }
                }
            }

            PaintOutcome::Cancelled(id) => {
                // Expected end of a superseded paint; swallowed.
                if let Some(pending) = self.pending.remove(&id) {
                    self.clear_in_flight(pending.page, id);
                    debug!("paint cancelled for page {}", pending.page);
                }
            }

            PaintOutcome::Failed { id, error } => {
                if let Some(pending) = self.pending.remove(&id) {
                    self.clear_in_flight(pending.page, id);
                }
                self.error_sink.report(error);
            }
        }
    }

    fn clear_in_flight(&mut self, page: usize, id: RequestId) {
        if self.in_flight.get(&page) == Some(&id) {
            self.in_flight.remove(&page);
        }
    }

    fn recompute_window(&mut self) {
        let pinned = self.state.pinned_pages();
        let window = self.layout.window(
            self.state.scroll_top,
            self.state.viewport_height,
            OVERSCAN_PAGES,
            &pinned,
        );

        let Some(window) = window else {
            self.unmount_all();
            self.window = None;
            return;
        };

        // Unmount pages that left the window, cancelling their paints.
        let stale: Vec<usize> = self
            .mounted
            .keys()
            .copied()
            .filter(|&p| !window.contains(p))
            .collect();
        for page in stale {
            self.unmount(page);
        }

        for page in window.pages() {
            self.mount(page);
        }

        self.window = Some(window.clone());
        self.schedule_prefetch(&window);
    }

    fn mount(&mut self, page: usize) {
        let params = self.state.paint_params();
        let key = CacheKey::from_params(page, &params);

        if let Some(data) = self.cache.get(&key) {
            self.mounted.insert(page, PageSlot::Painted(data));
            self.cancel_stale_paint(page, &params);
            return;
        }

        if !matches!(self.mounted.get(&page), Some(PageSlot::Painted(_))) {
            self.mounted.insert(page, PageSlot::Placeholder);
        }
        self.request_paint(page, false);
    }

    fn unmount(&mut self, page: usize) {
        self.mounted.remove(&page);
        if let Some(id) = self.in_flight.remove(&page) {
            self.cancel_request(id);
        }
    }

    fn unmount_all(&mut self) {
        let pages: Vec<usize> = self.mounted.keys().copied().collect();
        for page in pages {
            self.unmount(page);
        }
    }

    /// Cancel an in-flight paint whose parameters no longer match.
    fn cancel_stale_paint(&mut self, page: usize, params: &PaintParams) {
        if let Some(&id) = self.in_flight.get(&page) {
            let stale = self
                .pending
                .get(&id)
                .is_some_and(|p| p.params != *params);
            if stale {
                self.in_flight.remove(&page);
                self.cancel_request(id);
            }
        }
    }

    /// Issue a paint for a page, enforcing at most one in-flight paint
    /// per page: a request at changed parameters cancels the old paint
    /// before the new one is sent.
    fn request_paint(&mut self, page: usize, prefetch: bool) {
        let params = self.state.paint_params();

        if let Some(&existing) = self.in_flight.get(&page) {
            match self.pending.get(&existing) {
                Some(p) if p.params == params => return,
                _ => {
                    self.in_flight.remove(&page);
                    self.cancel_request(existing);
                }
            }
        }

        let id = self.next_id();
        let cancel = CancelToken::new();
        let request = if prefetch {
            PaintRequest::Prefetch {
                id,
                page,
                params,
                cancel: cancel.clone(),
            }
        } else {
            PaintRequest::Page {
                id,
                page,
                params,
                cancel: cancel.clone(),
            }
        };

        let _ = self.request_tx.send(request);
        self.pending.insert(
            id,
            PendingPaint {
                page,
                params,
                cancel,
            },
        );
        self.in_flight.insert(page, id);
    }

    fn cancel_request(&mut self, id: RequestId) {
        // The pending entry stays until the host reports the outcome;
        // only the token flips now.
        if let Some(pending) = self.pending.get(&id) {
            pending.cancel.cancel();
        }
    }

    fn schedule_prefetch(&mut self, window: &VisibleWindow) {
        let page_count = self.layout.page_count();
        if page_count == 0 {
            return;
        }

        let params = self.state.paint_params();
        for offset in 1..=self.prefetch_radius {
            let after = window.last + offset;
            if after < page_count {
                self.maybe_prefetch(after, &params);
            }
            if let Some(before) = window.first.checked_sub(offset) {
                self.maybe_prefetch(before, &params);
            }
        }
    }

    fn maybe_prefetch(&mut self, page: usize, params: &PaintParams) {
        if self.in_flight.contains_key(&page) {
            return;
        }
        let key = CacheKey::from_params(page, params);
        if self.cache.contains(&key) {
            return;
        }
        self.request_paint(page, true);
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingErrorSink;
    use crate::error::GeometryError;
    use crate::render::paint::test_support::painted;

    fn renderer(pages: usize) -> PageRenderer {
        let mut r = PageRenderer::new(
            vec![800.0; pages],
            Box::new(crate::error::LogErrorSink),
        );
        r.apply(Command::SetViewport {
            width: 1280.0,
            height: 600.0,
        });
        r
    }

    fn drain(r: &PageRenderer) -> Vec<PaintRequest> {
        r.request_receiver().try_iter().collect()
    }

    #[test]
    fn scroll_is_coalesced_until_frame_tick() {
        let mut r = renderer(20);
        r.on_frame();
        drain(&r);

        for offset in [100.0, 200.0, 300.0, 5_000.0] {
            r.apply(Command::SetScrollTop(offset));
        }
        assert!(drain(&r).is_empty());

        r.on_frame();
        assert!(!drain(&r).is_empty());

        // A second tick with no state change does nothing.
        r.on_frame();
        assert!(drain(&r).is_empty());
    }

    #[test]
    fn window_bounds_and_placeholders() {
        let mut r = renderer(20);
        r.on_frame();

        let window = r.window().unwrap().clone();
        assert_eq!(window.first, 0);
        // One page covers the 600px viewport at 832px layout height.
        assert!(window.core_len() <= 1 + 2 * OVERSCAN_PAGES);

        for page in window.pages() {
            assert!(matches!(r.slot(page), Some(PageSlot::Placeholder)));
        }
        assert!(r.slot(10).is_none());
        assert_eq!(r.total_height(), 20.0 * 832.0);
    }

    #[test]
    fn at_most_one_in_flight_paint_per_page() {
        let mut r = renderer(5);
        r.on_frame();
        let first_batch = drain(&r);
        let pages: Vec<usize> = first_batch.iter().map(PaintRequest::page).collect();
        let mut deduped = pages.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(pages.len(), deduped.len());

        // Re-ticking without changes issues nothing new.
        r.apply(Command::SetScrollTop(1.0));
        r.on_frame();
        assert!(drain(&r).is_empty());
    }

    #[test]
    fn zoom_change_cancels_in_flight_paint_before_reissue() {
        let mut r = renderer(3);
        r.on_frame();
        let initial = drain(&r);
        let page0 = initial
            .iter()
            .find(|req| req.page() == 0)
            .expect("page 0 painted");
        let old_token = match page0 {
            PaintRequest::Page { cancel, .. } | PaintRequest::Prefetch { cancel, .. } => {
                cancel.clone()
            }
        };
        assert!(!old_token.is_cancelled());

        r.apply(Command::ZoomIn);
        r.on_frame();

        // Old paint was cancelled before its replacement was issued.
        assert!(old_token.is_cancelled());
        let reissued = drain(&r);
        assert!(reissued.iter().any(|req| req.page() == 0));
    }

    #[test]
    fn completed_paint_updates_slot_and_cache() {
        let mut r = renderer(3);
        r.on_frame();
        let requests = drain(&r);
        let (id, page, params) = match &requests[0] {
            PaintRequest::Page {
                id, page, params, ..
            }
            | PaintRequest::Prefetch {
                id, page, params, ..
            } => (*id, *page, *params),
        };

        r.handle_outcome(PaintOutcome::Completed {
            id,
            data: painted(page, params.scale),
        });

        assert!(matches!(r.slot(page), Some(PageSlot::Painted(_))));

        // Unmount then remount: served from cache, no new request.
        r.apply(Command::SetScrollTop(10.0 * 832.0));
        r.on_frame();
        drain(&r);
        r.apply(Command::SetScrollTop(0.0));
        r.on_frame();
        let remount = drain(&r);
        assert!(!remount.iter().any(|req| req.page() == page));
        assert!(matches!(r.slot(page), Some(PageSlot::Painted(_))));
    }

    #[test]
    fn cancelled_outcome_is_swallowed() {
        let mut r = renderer(3);
        r.on_frame();
        let requests = drain(&r);
        let id = requests[0].id();

        r.handle_outcome(PaintOutcome::Cancelled(id));
        // No panic, no failure; the slot stays a placeholder.
        assert!(matches!(
            r.slot(requests[0].page()),
            Some(PageSlot::Placeholder)
        ));
    }

    #[test]
    fn failed_paint_reaches_error_sink_only() {
        let mut r = PageRenderer::new(vec![800.0; 3], Box::new(CollectingErrorSink::default()));
        r.apply(Command::SetViewport {
            width: 1280.0,
            height: 600.0,
        });
        r.on_frame();
        let requests = drain(&r);
        let id = requests[0].id();

        r.handle_outcome(PaintOutcome::Failed {
            id,
            error: GeometryError::SurfaceUnavailable { page: 0 },
        });
        // Page 0 keeps its placeholder; the session carries on.
        assert!(matches!(r.slot(0), Some(PageSlot::Placeholder)));
    }

    #[test]
    fn selected_annotation_page_stays_mounted() {
        let mut r = renderer(50);
        r.apply(Command::SelectAnnotationPage(Some(40)));
        r.on_frame();

        let window = r.window().unwrap();
        assert!(window.contains(40));
        assert!(r.slot(40).is_some());

        // Scrolling far away does not unmount the pinned page.
        r.apply(Command::SetScrollTop(2.0 * 832.0));
        r.on_frame();
        assert!(r.window().unwrap().contains(40));
        assert!(r.slot(40).is_some());
    }

    #[test]
    fn jump_hands_off_pending_target_to_owning_page() {
        let mut r = renderer(50);
        let id = RecordId::Server("a-1".into());

        let cmd = r.jump_to_annotation(id.clone(), 30).unwrap();
        assert_eq!(cmd.behavior, ScrollBehavior::Smooth);
        assert!((cmd.to - (30.0 * 832.0 - DEFAULT_LEAD_IN_MARGIN)).abs() < 0.01);

        // Wrong page claims nothing; the owning page claims once.
        assert!(r.take_scroll_target(29).is_none());
        assert_eq!(
            r.take_scroll_target(30),
            Some(ScrollTarget::Annotation(id))
        );
        assert!(r.take_scroll_target(30).is_none());
    }

    #[test]
    fn prefetch_ring_surrounds_window() {
        let mut r = renderer(50);
        r.apply(Command::SetScrollTop(10.0 * 832.0));
        r.on_frame();

        let window = r.window().unwrap().clone();
        let requests = drain(&r);
        let prefetched: Vec<usize> = requests
            .iter()
            .filter(|req| matches!(req, PaintRequest::Prefetch { .. }))
            .map(PaintRequest::page)
            .collect();

        assert!(prefetched.contains(&(window.last + 1)));
        assert!(prefetched.contains(&(window.first - 1)));
    }
}
