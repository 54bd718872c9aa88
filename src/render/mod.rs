//! Virtualized page rendering infrastructure

mod layout;
mod paint;
mod scheduler;
mod zoom;

pub use layout::{OVERSCAN_PAGES, PAGE_MARGIN_PX, PageLayout, VisibleWindow};
pub use paint::{
    CacheKey, CancelToken, PagePainter, PaintCache, PaintFault, PaintOutcome, PaintParams,
    PaintRequest, PaintSurface, PaintedPage, RequestId,
};
pub use scheduler::{
    Command, DEFAULT_LEAD_IN_MARGIN, DEFAULT_PAINT_CACHE_SIZE, DEFAULT_PREFETCH_RADIUS, Effect,
    PageRenderer, PageSlot, RendererState, ScrollBehavior, ScrollCommand, ScrollTarget,
};
pub use zoom::Zoom;
