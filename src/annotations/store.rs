//! Canonical annotation collection.
//!
//! The store owns the user and structural source lists and publishes
//! an immutable [`AnnotationSnapshot`] rebuilt wholesale on every
//! mutation. Readers hold an `Arc` to a snapshot and can never observe
//! a partially-mutated collection; derived indices are memoized per
//! snapshot, so they recompute exactly when a source list's identity
//! changes and never otherwise.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use log::debug;

use crate::error::ValidationError;

use super::types::{Annotation, DocTypeAnnotation, Label, RecordId, RelationGroup};

/// Visibility filtering inputs, evaluated in precedence order; see
/// [`AnnotationSnapshot::visible`].
#[derive(Clone, Debug, Default)]
pub struct VisibilityOptions {
    /// Always shown: the current selection, or annotations implicated
    /// by a selected relation
    pub forced_visible: BTreeSet<RecordId>,
    /// Show system/layout-derived annotations
    pub show_structural: bool,
    /// Hide everything that is not selected
    pub show_selected_only: bool,
    pub selected: BTreeSet<RecordId>,
    /// Empty = all labels pass
    pub label_allowlist: BTreeSet<String>,
}

/// Immutable, versioned view of the annotation collection.
#[derive(Debug)]
pub struct AnnotationSnapshot {
    pub version: u64,
    /// Deduplicated union of user + structural annotations,
    /// first-seen-by-id wins
    pub annotations: Vec<Annotation>,
    pub relations: Vec<RelationGroup>,
    pub doc_labels: Vec<DocTypeAnnotation>,
    page_index: OnceLock<HashMap<usize, Vec<usize>>>,
}

impl AnnotationSnapshot {
    fn empty() -> Self {
        Self {
            version: 0,
            annotations: vec![],
            relations: vec![],
            doc_labels: vec![],
            page_index: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn annotation(&self, id: &RecordId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| &a.id == id)
    }

    #[must_use]
    pub fn relation(&self, id: &RecordId) -> Option<&RelationGroup> {
        self.relations.iter().find(|r| &r.id == id)
    }

    /// Annotations anchored to the given page. The page index is built
    /// on first use and cached for this snapshot's lifetime.
    #[must_use]
    pub fn on_page(&self, page: usize) -> Vec<&Annotation> {
        let index = self.page_index.get_or_init(|| {
            let mut index: HashMap<usize, Vec<usize>> = HashMap::new();
            for (i, annotation) in self.annotations.iter().enumerate() {
                for page in annotation.anchor.pages() {
                    index.entry(page).or_default().push(i);
                }
            }
            index
        });

        index
            .get(&page)
            .map(|indices| indices.iter().map(|&i| &self.annotations[i]).collect())
            .unwrap_or_default()
    }

    /// Apply the visibility filter.
    ///
    /// Precedence: forced-visible always shows; structural shows iff
    /// `show_structural`; selected-only hides the unselected; a
    /// non-empty label allowlist hides other labels; everything else
    /// shows.
    #[must_use]
    pub fn visible(&self, opts: &VisibilityOptions) -> Vec<&Annotation> {
        self.annotations
            .iter()
            .filter(|a| Self::is_visible(a, opts))
            .collect()
    }

    fn is_visible(annotation: &Annotation, opts: &VisibilityOptions) -> bool {
        if opts.forced_visible.contains(&annotation.id) {
            return true;
        }
        if annotation.structural {
            return opts.show_structural;
        }
        if opts.show_selected_only && !opts.selected.contains(&annotation.id) {
            return false;
        }
        if !opts.label_allowlist.is_empty() && !opts.label_allowlist.contains(&annotation.label.id)
        {
            return false;
        }
        true
    }
}

/// Mutable owner of the annotation collection. Every mutation swaps in
/// a freshly-built snapshot.
pub struct AnnotationStore {
    user: Vec<Annotation>,
    structural: Vec<Annotation>,
    relations: Vec<RelationGroup>,
    doc_labels: Vec<DocTypeAnnotation>,
    snapshot: Arc<AnnotationSnapshot>,
    version: u64,
}

impl Default for AnnotationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            user: vec![],
            structural: vec![],
            relations: vec![],
            doc_labels: vec![],
            snapshot: Arc::new(AnnotationSnapshot::empty()),
            version: 0,
        }
    }

    /// Current snapshot. Cheap to clone; never mutated in place.
    #[must_use]
    pub fn snapshot(&self) -> Arc<AnnotationSnapshot> {
        self.snapshot.clone()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Replace everything at once (initial load from persistence).
    pub fn load(
        &mut self,
        user: Vec<Annotation>,
        structural: Vec<Annotation>,
        relations: Vec<RelationGroup>,
        doc_labels: Vec<DocTypeAnnotation>,
    ) {
        self.user = user;
        self.structural = structural;
        self.relations = relations;
        self.doc_labels = doc_labels;
        self.commit();
    }

    pub fn set_user_annotations(&mut self, user: Vec<Annotation>) {
        self.user = user;
        self.commit();
    }

    pub fn set_structural_annotations(&mut self, structural: Vec<Annotation>) {
        self.structural = structural;
        self.commit();
    }

    /// Append an optimistic annotation. Blank text aborts locally with
    /// no state change.
    pub fn create(&mut self, annotation: Annotation) -> Result<RecordId, ValidationError> {
        if annotation.raw_text.trim().is_empty() {
            return Err(ValidationError::EmptyText);
        }

        let id = annotation.id.clone();
        self.user.push(annotation);
        self.commit();
        Ok(id)
    }

    /// Id-keyed upsert. Entries whose id is not present in
    /// `annotations` are untouched.
    pub fn replace(&mut self, annotations: Vec<Annotation>) {
        for incoming in annotations {
            if let Some(slot) = self.find_mut(&incoming.id) {
                *slot = incoming;
            } else {
                self.user.push(incoming);
            }
        }
        self.commit();
    }

    /// Remove an annotation and cascade into relations: a relation
    /// whose source or target set would be left empty is deleted
    /// outright; otherwise the id is pruned from whichever set held
    /// it.
    pub fn delete(&mut self, id: &RecordId) {
        self.user.retain(|a| &a.id != id);
        self.structural.retain(|a| &a.id != id);

        let relations = std::mem::take(&mut self.relations);
        self.relations = relations
            .into_iter()
            .filter_map(|r| r.without_annotation(id))
            .collect();

        self.assert_relation_consistency(id);
        self.commit();
    }

    /// Swap a pending optimistic record for the authoritative one,
    /// preserving its list position so selection state keyed on order
    /// survives the id change.
    pub fn acknowledge(&mut self, pending: &RecordId, authoritative: Annotation) -> bool {
        match self.find_mut(pending) {
            Some(slot) => {
                *slot = authoritative;
                self.commit();
                true
            }
            None => {
                debug!("acknowledge for unknown record {pending}");
                false
            }
        }
    }

    pub fn approve(&mut self, id: &RecordId) {
        if let Some(annotation) = self.find_mut(id) {
            annotation.approve();
            self.commit();
        }
    }

    pub fn reject(&mut self, id: &RecordId) {
        if let Some(annotation) = self.find_mut(id) {
            annotation.reject();
            self.commit();
        }
    }

    pub fn set_label(&mut self, id: &RecordId, label: Label) {
        if let Some(annotation) = self.find_mut(id) {
            annotation.label = label;
            annotation.updated_at = chrono::Utc::now();
            self.commit();
        }
    }

    pub fn add_relation(&mut self, relation: RelationGroup) -> RecordId {
        let id = relation.id.clone();
        self.relations.push(relation);
        self.commit();
        id
    }

    pub fn remove_relation(&mut self, id: &RecordId) {
        self.relations.retain(|r| &r.id != id);
        self.commit();
    }

    pub fn relabel_relation(&mut self, id: &RecordId, label: Label) {
        if let Some(relation) = self.relations.iter_mut().find(|r| &r.id == id) {
            relation.label = label;
            self.commit();
        }
    }

    pub fn add_doc_label(&mut self, doc_label: DocTypeAnnotation) -> RecordId {
        let id = doc_label.id.clone();
        self.doc_labels.push(doc_label);
        self.commit();
        id
    }

    pub fn remove_doc_label(&mut self, id: &RecordId) {
        self.doc_labels.retain(|d| &d.id != id);
        self.commit();
    }

    fn find_mut(&mut self, id: &RecordId) -> Option<&mut Annotation> {
        self.user
            .iter_mut()
            .chain(self.structural.iter_mut())
            .find(|a| &a.id == id)
    }

    /// Rebuild the canonical snapshot: dedupe-by-id over user then
    /// structural, first occurrence wins.
    fn commit(&mut self) {
        self.version += 1;

        let mut seen: HashSet<RecordId> = HashSet::new();
        let mut canonical = Vec::with_capacity(self.user.len() + self.structural.len());
        for annotation in self.user.iter().chain(self.structural.iter()) {
            if seen.insert(annotation.id.clone()) {
                canonical.push(annotation.clone());
            }
        }

        self.snapshot = Arc::new(AnnotationSnapshot {
            version: self.version,
            annotations: canonical,
            relations: self.relations.clone(),
            doc_labels: self.doc_labels.clone(),
            page_index: OnceLock::new(),
        });
    }

    fn assert_relation_consistency(&self, deleted: &RecordId) {
        for relation in &self.relations {
            debug_assert!(
                !relation.sources.is_empty() && !relation.targets.is_empty(),
                "relation {} kept an empty side",
                relation.id
            );
            debug_assert!(
                !relation.references(deleted),
                "relation {} still references deleted {deleted}",
                relation.id
            );
        }
    }
}
