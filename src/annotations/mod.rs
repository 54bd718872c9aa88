//! Annotation data model and canonical store

mod store;
mod types;

pub use store::{AnnotationSnapshot, AnnotationStore, VisibilityOptions};
pub use types::{
    Anchor, Annotation, DocTypeAnnotation, Label, Permission, RecordId, RelationGroup, ReviewState,
};
