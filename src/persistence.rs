//! Persistence collaborator seam.
//!
//! The backend supplies the initial records and acknowledges each
//! mutation with the authoritative record (carrying the server id).
//! Writes are optimistic: the store mutates first, the backend is
//! asked second, and a failure leaves the local record in place with
//! only a transient notification — no automatic rollback.

use log::{info, warn};

use crate::annotations::{Annotation, AnnotationStore, DocTypeAnnotation, RecordId, RelationGroup};
use crate::error::{PersistenceError, ValidationError};
use crate::notification::NotificationManager;

/// Initial record set for one document.
#[derive(Debug, Default, Clone)]
pub struct StoredRecords {
    pub annotations: Vec<Annotation>,
    pub structural_annotations: Vec<Annotation>,
    pub relations: Vec<RelationGroup>,
    pub doc_labels: Vec<DocTypeAnnotation>,
}

/// External persistence collaborator. Every write returns the
/// authoritative record that must replace the optimistic one.
pub trait PersistenceBackend {
    fn load(&mut self, doc_id: &str) -> Result<StoredRecords, PersistenceError>;

    fn create_annotation(&mut self, annotation: &Annotation) -> Result<Annotation, PersistenceError>;

    fn update_annotation(&mut self, annotation: &Annotation) -> Result<Annotation, PersistenceError>;

    fn delete_annotation(&mut self, id: &RecordId) -> Result<(), PersistenceError>;

    fn approve_annotation(&mut self, id: &RecordId) -> Result<Annotation, PersistenceError>;

    fn reject_annotation(&mut self, id: &RecordId) -> Result<Annotation, PersistenceError>;
}

/// Drives the optimistic-write protocol between the store and a
/// backend.
pub struct PersistenceBridge<B: PersistenceBackend> {
    backend: B,
}

impl<B: PersistenceBackend> PersistenceBridge<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Populate the store from the backend.
    pub fn load_into(
        &mut self,
        doc_id: &str,
        store: &mut AnnotationStore,
    ) -> Result<(), PersistenceError> {
        let records = self.backend.load(doc_id)?;
        info!(
            "loaded {} annotations, {} structural, {} relations for {doc_id}",
            records.annotations.len(),
            records.structural_annotations.len(),
            records.relations.len()
        );
        store.load(
            records.annotations,
            records.structural_annotations,
            records.relations,
            records.doc_labels,
        );
        Ok(())
    }

    /// Optimistic create: the pending record lands in the store first;
    /// on acknowledgement the authoritative record replaces it without
    /// disturbing selection state. On failure the pending record stays
    /// and the user is notified.
    pub fn create(
        &mut self,
        store: &mut AnnotationStore,
        notifications: &mut NotificationManager,
        annotation: Annotation,
    ) -> Result<RecordId, ValidationError> {
        let pending_id = store.create(annotation.clone())?;

        match self.backend.create_annotation(&annotation) {
            Ok(authoritative) => {
                let id = authoritative.id.clone();
                store.acknowledge(&pending_id, authoritative);
                Ok(id)
            }
            Err(e) => {
                warn!("create not persisted, keeping optimistic record: {e}");
                notifications.error(format!("Could not save annotation: {}", e.detail));
                Ok(pending_id)
            }
        }
    }

    /// Optimistic update (label or review edits already applied to the
    /// store): pushes the current record and applies the authoritative
    /// echo. Failure keeps the local edit.
    pub fn update(
        &mut self,
        store: &mut AnnotationStore,
        notifications: &mut NotificationManager,
        id: &RecordId,
    ) {
        let Some(current) = store.snapshot().annotation(id).cloned() else {
            return;
        };

        match self.backend.update_annotation(&current) {
            Ok(authoritative) => {
                store.acknowledge(id, authoritative);
            }
            Err(e) => {
                warn!("update of {id} not persisted: {e}");
                notifications.error(format!("Could not update annotation: {}", e.detail));
            }
        }
    }

    /// Optimistic delete: local removal (with its relation cascade)
    /// happens regardless; a backend failure is only notified.
    pub fn delete(
        &mut self,
        store: &mut AnnotationStore,
        notifications: &mut NotificationManager,
        id: &RecordId,
    ) {
        store.delete(id);

        if let Err(e) = self.backend.delete_annotation(id) {
            warn!("delete of {id} not persisted: {e}");
            notifications.error(format!("Could not delete annotation: {}", e.detail));
        }
    }

    pub fn approve(
        &mut self,
        store: &mut AnnotationStore,
        notifications: &mut NotificationManager,
        id: &RecordId,
    ) {
        store.approve(id);

        match self.backend.approve_annotation(id) {
            Ok(authoritative) => {
                store.acknowledge(id, authoritative);
            }
            Err(e) => {
                notifications.error(format!("Could not approve annotation: {}", e.detail));
            }
        }
    }

    pub fn reject(
        &mut self,
        store: &mut AnnotationStore,
        notifications: &mut NotificationManager,
        id: &RecordId,
    ) {
        store.reject(id);

        match self.backend.reject_annotation(id) {
            Ok(authoritative) => {
                store.acknowledge(id, authoritative);
            }
            Err(e) => {
                notifications.error(format!("Could not reject annotation: {}", e.detail));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{Label, ReviewState};
    use crate::notification::NotificationLevel;

    /// Backend that assigns sequential server ids, or fails on demand.
    #[derive(Default)]
    struct FakeBackend {
        next_id: u64,
        fail_writes: bool,
    }

    impl FakeBackend {
        fn authoritative(&mut self, annotation: &Annotation) -> Annotation {
            self.next_id += 1;
            let mut persisted = annotation.clone();
            persisted.id = RecordId::Server(format!("srv-{}", self.next_id));
            persisted
        }

        fn check(&self) -> Result<(), PersistenceError> {
            if self.fail_writes {
                Err(PersistenceError::new("backend offline"))
            } else {
                Ok(())
            }
        }
    }

    impl PersistenceBackend for FakeBackend {
        fn load(&mut self, _doc_id: &str) -> Result<StoredRecords, PersistenceError> {
            Ok(StoredRecords::default())
        }

        fn create_annotation(
            &mut self,
            annotation: &Annotation,
        ) -> Result<Annotation, PersistenceError> {
            self.check()?;
            Ok(self.authoritative(annotation))
        }

        fn update_annotation(
            &mut self,
            annotation: &Annotation,
        ) -> Result<Annotation, PersistenceError> {
            self.check()?;
            Ok(annotation.clone())
        }

        fn delete_annotation(&mut self, _id: &RecordId) -> Result<(), PersistenceError> {
            self.check()
        }

        fn approve_annotation(&mut self, id: &RecordId) -> Result<Annotation, PersistenceError> {
            self.check()?;
            let mut a = Annotation::span_anchored(Label::new("l1", "L"), 0, 1, "x").unwrap();
            a.id = id.clone();
            a.approve();
            Ok(a)
        }

        fn reject_annotation(&mut self, id: &RecordId) -> Result<Annotation, PersistenceError> {
            self.check()?;
            let mut a = Annotation::span_anchored(Label::new("l1", "L"), 0, 1, "x").unwrap();
            a.id = id.clone();
            a.reject();
            Ok(a)
        }
    }

    fn span(text: &str) -> Annotation {
        Annotation::span_anchored(Label::new("l1", "Person"), 0, text.len(), text).unwrap()
    }

    #[test]
    fn acknowledged_create_swaps_in_server_id() {
        let mut bridge = PersistenceBridge::new(FakeBackend::default());
        let mut store = AnnotationStore::new();
        let mut notifications = NotificationManager::new();

        let id = bridge
            .create(&mut store, &mut notifications, span("hello"))
            .unwrap();

        assert_eq!(id, RecordId::Server("srv-1".into()));
        let snapshot = store.snapshot();
        assert!(snapshot.annotation(&id).is_some());
        assert!(!snapshot.annotations.iter().any(|a| a.id.is_pending()));
        assert!(!notifications.has_notifications());
    }

    #[test]
    fn failed_create_keeps_optimistic_record_and_notifies() {
        let mut bridge = PersistenceBridge::new(FakeBackend {
            fail_writes: true,
            ..Default::default()
        });
        let mut store = AnnotationStore::new();
        let mut notifications = NotificationManager::new();

        let id = bridge
            .create(&mut store, &mut notifications, span("hello"))
            .unwrap();

        // Local optimistic state stays; only a notification appears.
        assert!(id.is_pending());
        assert!(store.snapshot().annotation(&id).is_some());
        let current = notifications.current().unwrap();
        assert_eq!(current.level, NotificationLevel::Error);
        assert!(current.message.contains("backend offline"));
    }

    #[test]
    fn blank_create_never_reaches_the_backend() {
        let mut bridge = PersistenceBridge::new(FakeBackend::default());
        let mut store = AnnotationStore::new();
        let mut notifications = NotificationManager::new();

        let mut blank = span("placeholder");
        blank.raw_text = "  ".to_string();
        assert_eq!(
            bridge.create(&mut store, &mut notifications, blank),
            Err(ValidationError::EmptyText)
        );
        assert!(store.snapshot().annotations.is_empty());
    }

    #[test]
    fn approve_applies_authoritative_record() {
        let mut bridge = PersistenceBridge::new(FakeBackend::default());
        let mut store = AnnotationStore::new();
        let mut notifications = NotificationManager::new();

        let id = bridge
            .create(&mut store, &mut notifications, span("hello"))
            .unwrap();
        bridge.approve(&mut store, &mut notifications, &id);

        assert_eq!(
            store.snapshot().annotation(&id).unwrap().review,
            ReviewState::Approved
        );
    }

    #[test]
    fn failed_update_keeps_local_edit() {
        let mut bridge = PersistenceBridge::new(FakeBackend::default());
        let mut store = AnnotationStore::new();
        let mut notifications = NotificationManager::new();

        let id = bridge
            .create(&mut store, &mut notifications, span("hello"))
            .unwrap();

        store.set_label(&id, Label::new("l2", "Place"));
        bridge.backend.fail_writes = true;
        bridge.update(&mut store, &mut notifications, &id);

        assert_eq!(
            store.snapshot().annotation(&id).unwrap().label.id,
            "l2"
        );
        assert!(notifications.has_notifications());
    }

    #[test]
    fn failed_delete_still_removes_locally() {
        let mut bridge = PersistenceBridge::new(FakeBackend::default());
        let mut store = AnnotationStore::new();
        let mut notifications = NotificationManager::new();

        let id = bridge
            .create(&mut store, &mut notifications, span("hello"))
            .unwrap();

        bridge.backend.fail_writes = true;
        bridge.delete(&mut store, &mut notifications, &id);

        assert!(store.snapshot().annotation(&id).is_none());
        assert!(notifications.has_notifications());
    }
}
