//! Error taxonomy for the annotation engine.
//!
//! Three of the four failure classes here never leave the engine as
//! panics or process-level errors: validation failures abort the local
//! operation, geometry faults are fatal only to one page's render, and
//! persistence failures surface as transient notifications. Paint
//! cancellation is not represented here at all — it is an expected
//! outcome, modeled in `render::paint`.

use thiserror::Error;

/// Local validation failures. Raised before any persistence call and
/// abort the operation in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("annotation text is empty")]
    EmptyText,

    #[error("no label is active")]
    NoActiveLabel,

    #[error("selection box has zero area")]
    ZeroAreaSelection,
}

/// Geometry and paint-surface faults. Fatal only to a single page's
/// render; reported to an [`ErrorSink`], never propagated further.
#[derive(Debug, Clone, Error)]
pub enum GeometryError {
    #[error("no paint surface available for page {page}")]
    SurfaceUnavailable { page: usize },

    #[error("no geometry for page {page}")]
    MissingPage { page: usize },

    #[error("{detail}")]
    Generic { detail: String },
}

impl GeometryError {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// Failure reported by the persistence collaborator. Recoverable: the
/// optimistic local record stays in place and the user sees a
/// transient notification.
#[derive(Debug, Clone, Error)]
#[error("persistence failed: {detail}")]
pub struct PersistenceError {
    pub detail: String,
}

impl PersistenceError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Injected sink for per-page render faults.
pub trait ErrorSink {
    fn report(&mut self, error: GeometryError);
}

/// Default sink: forwards faults to the log facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn report(&mut self, error: GeometryError) {
        log::error!("page render fault: {error}");
    }
}

/// Sink that collects faults, for tests and diagnostics overlays.
#[derive(Debug, Default)]
pub struct CollectingErrorSink {
    pub faults: Vec<GeometryError>,
}

impl ErrorSink for CollectingErrorSink {
    fn report(&mut self, error: GeometryError) {
        self.faults.push(error);
    }
}
