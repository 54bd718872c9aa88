//! Coordinate and rendering engine for annotating paginated (and
//! flat-text) documents: page geometry, a virtualized page renderer
//! with cancellable paints, an annotation store with cascading-delete
//! invariants, a drag-to-select state machine, and token-indexed text
//! search.
//!
//! The host supplies a paint primitive, a clipboard sink, a
//! persistence backend, and animation-frame ticks; the engine supplies
//! state and scheduling.

pub mod annotations;
pub mod clipboard;
pub mod document;
pub mod error;
pub mod geometry;
pub mod notification;
pub mod persistence;
pub mod render;
pub mod search;
pub mod selection;
pub mod settings;

pub use annotations::{
    Anchor, Annotation, AnnotationSnapshot, AnnotationStore, DocTypeAnnotation, Label, Permission,
    RecordId, RelationGroup, ReviewState, VisibilityOptions,
};
pub use document::{Document, TokenMap, TokenRef};
pub use error::{ErrorSink, GeometryError, PersistenceError, ValidationError};
pub use geometry::{BoundingBox, PageAnnotation, PageGeometry, Token};
pub use render::{PageRenderer, PaintOutcome, PaintRequest, VisibleWindow};
pub use search::{QueryDebouncer, SearchMatch, TextSearchIndexer};
pub use selection::{PointerButton, ReleaseAction, SelectionEngine, SelectionPhase};
pub use settings::Settings;
