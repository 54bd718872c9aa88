//! Paint request and outcome types, cancellation, and the paint cache.
//!
//! The engine never rasterizes anything itself. It enqueues
//! [`PaintRequest`]s; the host drains them, runs its paint primitive
//! against the request's [`CancelToken`], and reports a
//! [`PaintOutcome`]. Cancellation is request-and-forget: a cancelled
//! paint resolves as [`PaintOutcome::Cancelled`] and is swallowed by
//! the scheduler, never surfaced as a failure.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lru::LruCache;

use crate::error::GeometryError;

/// Unique identifier for paint requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Parameters for painting a page
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PaintParams {
    /// Target scale factor
    pub scale: f32,
    /// Viewport width in screen pixels
    pub viewport_width: f32,
    /// Viewport height in screen pixels
    pub viewport_height: f32,
}

/// Cancellation token threaded into the paint call. The paint
/// primitive checks it at well-defined points and bails out with
/// [`PaintFault::Cancelled`] once it is set.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Checkpoint for paint primitives: `painter.checkpoint(&cancel)?`
    /// between pipeline stages.
    pub fn checkpoint(&self) -> Result<(), PaintFault> {
        if self.is_cancelled() {
            Err(PaintFault::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Host-produced paint artifact. Opaque to the engine: it is cached,
/// handed back for display, and dropped, never inspected beyond its
/// dimensions.
pub trait PaintSurface: Send + Sync {
    /// Painted size in device pixels
    fn size(&self) -> (u32, u32);
}

/// A completed paint for one page at one scale.
#[derive(Clone)]
pub struct PaintedPage {
    pub page: usize,
    pub scale: f32,
    pub surface: Arc<dyn PaintSurface>,
}

impl std::fmt::Debug for PaintedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (w, h) = self.surface.size();
        f.debug_struct("PaintedPage")
            .field("page", &self.page)
            .field("scale", &self.scale)
            .field("surface_px", &(w, h))
            .finish()
    }
}

/// Why a paint did not complete.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PaintFault {
    /// Expected outcome of a superseded request; never a failure
    #[error("paint cancelled")]
    Cancelled,

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// The document source's paint primitive, parameterized by target
/// scale and cancellation-aware.
pub trait PagePainter {
    fn paint(
        &mut self,
        page: usize,
        params: &PaintParams,
        cancel: &CancelToken,
    ) -> Result<Arc<dyn PaintSurface>, PaintFault>;
}

/// Request sent to the host's paint loop
#[derive(Debug)]
pub enum PaintRequest {
    /// Paint a mounted page (high priority)
    Page {
        id: RequestId,
        page: usize,
        params: PaintParams,
        cancel: CancelToken,
    },

    /// Warm the cache for a page just outside the window (low priority)
    Prefetch {
        id: RequestId,
        page: usize,
        params: PaintParams,
        cancel: CancelToken,
    },
}

impl PaintRequest {
    #[must_use]
    pub fn id(&self) -> RequestId {
        match self {
            Self::Page { id, .. } | Self::Prefetch { id, .. } => *id,
        }
    }

    #[must_use]
    pub fn page(&self) -> usize {
        match self {
            Self::Page { page, .. } | Self::Prefetch { page, .. } => *page,
        }
    }
}

/// Outcome reported by the host's paint loop
#[derive(Debug)]
pub enum PaintOutcome {
    /// Paint finished; display update follows
    Completed { id: RequestId, data: PaintedPage },

    /// Request was superseded; swallowed
    Cancelled(RequestId),

    /// Paint failed for this page only
    Failed { id: RequestId, error: GeometryError },
}

/// Cache key for painted pages
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Page number
    pub page: usize,
    /// Scale factor (stored as millionths for stable hashing)
    pub scale_millionths: u32,
    /// Viewport width in whole pixels
    pub viewport_width: u32,
    /// Viewport height in whole pixels
    pub viewport_height: u32,
}

impl CacheKey {
    /// Create a cache key from paint parameters
    #[must_use]
    pub fn from_params(page: usize, params: &PaintParams) -> Self {
        Self {
            page,
            scale_millionths: (params.scale * 1_000_000.0) as u32,
            viewport_width: params.viewport_width as u32,
            viewport_height: params.viewport_height as u32,
        }
    }
}

/// LRU cache for painted pages
pub struct PaintCache {
    cache: LruCache<CacheKey, Arc<PaintedPage>>,
}

impl PaintCache {
    /// Create a new cache with the given capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).expect("1 is non-zero")),
            ),
        }
    }

    /// Get a cached paint, promoting it in the LRU order
    #[must_use]
    pub fn get(&mut self, key: &CacheKey) -> Option<Arc<PaintedPage>> {
        self.cache.get(key).cloned()
    }

    /// Check if a key is cached without promoting it
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cache.contains(key)
    }

    /// Insert a paint, returning an Arc to it
    pub fn insert(&mut self, key: CacheKey, data: PaintedPage) -> Arc<PaintedPage> {
        let arc = Arc::new(data);
        self.cache.put(key, arc.clone());
        arc
    }

    /// Clear everything
    pub fn invalidate_all(&mut self) {
        self.cache.clear();
    }

    /// Drop all cached paints of a specific page
    pub fn invalidate_page(&mut self, page: usize) {
        let keys_to_remove: Vec<_> = self
            .cache
            .iter()
            .filter(|(k, _)| k.page == page)
            .map(|(k, _)| k.clone())
            .collect();

        for key in keys_to_remove {
            self.cache.pop(&key);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Fixed-size stand-in for a host paint artifact.
    #[derive(Debug)]
    pub struct StubSurface(pub u32, pub u32);

    impl PaintSurface for StubSurface {
        fn size(&self) -> (u32, u32) {
            (self.0, self.1)
        }
    }

    pub fn painted(page: usize, scale: f32) -> PaintedPage {
        PaintedPage {
            page,
            scale,
            surface: Arc::new(StubSurface(612, 792)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::painted;
    use super::*;

    fn params(scale: f32) -> PaintParams {
        PaintParams {
            scale,
            viewport_width: 1280.0,
            viewport_height: 720.0,
        }
    }

    #[test]
    fn cancel_token_checkpoint() {
        let token = CancelToken::new();
        assert!(token.checkpoint().is_ok());

        token.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.checkpoint(), Err(PaintFault::Cancelled)));
    }

    #[test]
    fn cloned_tokens_share_the_flag() {
        let token = CancelToken::new();
        let held_by_paint = token.clone();

        token.cancel();
        assert!(held_by_paint.is_cancelled());
    }

    #[test]
    fn cache_key_distinguishes_scales() {
        let a = CacheKey::from_params(0, &params(1.0));
        let b = CacheKey::from_params(0, &params(1.5));
        assert_ne!(a, b);
    }

    #[test]
    fn cache_insert_and_get() {
        let mut cache = PaintCache::new(10);
        let key = CacheKey::from_params(0, &params(1.0));

        cache.insert(key.clone(), painted(0, 1.0));

        assert!(cache.contains(&key));
        assert!(cache.get(&key).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_lru_eviction() {
        let mut cache = PaintCache::new(2);

        for i in 0..3 {
            let key = CacheKey::from_params(i, &params(1.0));
            cache.insert(key, painted(i, 1.0));
        }

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&CacheKey::from_params(0, &params(1.0))));
        assert!(cache.contains(&CacheKey::from_params(1, &params(1.0))));
        assert!(cache.contains(&CacheKey::from_params(2, &params(1.0))));
    }

    #[test]
    fn cache_invalidate_page_spares_others() {
        let mut cache = PaintCache::new(10);

        cache.insert(CacheKey::from_params(0, &params(1.0)), painted(0, 1.0));
        cache.insert(CacheKey::from_params(0, &params(1.5)), painted(0, 1.5));
        let other = CacheKey::from_params(1, &params(1.0));
        cache.insert(other.clone(), painted(1, 1.0));

        cache.invalidate_page(0);

        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&other));
    }
}
