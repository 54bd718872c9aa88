//! Drag-to-select state machine.
//!
//! Idle → (permitted pointer-down) → Dragging → pointer-up: with the
//! queue modifier held the box joins a per-page pending list and the
//! machine returns to Idle for further drags; without it the machine
//! commits and a pending-action menu opens over the queued boxes.
//! Every path out of the menu (copy, apply label, cancel) drains the
//! queue; escape or clicking outside the selection UI cancels with no
//! side effects.
//!
//! Pointer coordinates are page-local screen pixels (relative to the
//! page container's top-left). Queued boxes are stored in unscaled
//! page space so a zoom between drags cannot skew them.

use std::collections::BTreeMap;

use log::debug;

use crate::annotations::{Annotation, AnnotationStore, Label, RecordId};
use crate::clipboard::ClipboardSink;
use crate::document::Document;
use crate::error::ValidationError;
use crate::geometry::BoundingBox;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

/// An in-progress drag: box anchored at the down-point, growing with
/// the pointer.
#[derive(Clone, Debug)]
pub struct DragBox {
    pub page: usize,
    origin: (f32, f32),
    current: (f32, f32),
}

impl DragBox {
    /// Current drag rectangle in page-local screen pixels.
    #[must_use]
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_corners(self.origin, self.current)
    }
}

#[derive(Clone, Debug, Default)]
pub enum SelectionPhase {
    #[default]
    Idle,
    Dragging(DragBox),
    /// Pointer released without the queue modifier; the pending-action
    /// menu is open
    Committed,
}

/// What a pointer release did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseAction {
    /// No drag was in progress
    Ignored,
    /// Box queued; ready for further drags
    Queued,
    /// Queue committed; pending-action menu opened
    MenuOpened,
}

/// Drag/queue/commit state machine producing pending annotations.
#[derive(Debug, Default)]
pub struct SelectionEngine {
    phase: SelectionPhase,
    /// Queued selection boxes per page, unscaled page space
    queued: BTreeMap<usize, Vec<BoundingBox>>,
    active_label: Option<Label>,
    can_update: bool,
}

impl SelectionEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active_label(&mut self, label: Option<Label>) {
        self.active_label = label;
    }

    #[must_use]
    pub fn active_label(&self) -> Option<&Label> {
        self.active_label.as_ref()
    }

    /// Grant or revoke the update permission resolved for this user.
    pub fn set_can_update(&mut self, can_update: bool) {
        self.can_update = can_update;
    }

    #[must_use]
    pub fn phase(&self) -> &SelectionPhase {
        &self.phase
    }

    #[must_use]
    pub fn menu_open(&self) -> bool {
        matches!(self.phase, SelectionPhase::Committed)
    }

    #[must_use]
    pub fn queued_pages(&self) -> Vec<usize> {
        self.queued.keys().copied().collect()
    }

    #[must_use]
    pub fn queued_boxes(&self, page: usize) -> &[BoundingBox] {
        self.queued.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Begin a drag. Ignored entirely — no partial state — unless the
    /// machine is Idle, the button is primary, the pointer is on a
    /// real page, update permission is granted, and the document is
    /// not read-only.
    pub fn pointer_down(
        &mut self,
        doc: &Document,
        page: usize,
        x: f32,
        y: f32,
        button: PointerButton,
    ) -> bool {
        if !matches!(self.phase, SelectionPhase::Idle) {
            return false;
        }
        if button != PointerButton::Primary {
            return false;
        }
        if !self.can_update || doc.read_only() {
            return false;
        }
        if doc.page(page).is_none() {
            return false;
        }

        self.phase = SelectionPhase::Dragging(DragBox {
            page,
            origin: (x, y),
            current: (x, y),
        });
        true
    }

    /// Grow the drag box toward the pointer.
    pub fn pointer_move(&mut self, x: f32, y: f32) {
        if let SelectionPhase::Dragging(drag) = &mut self.phase {
            drag.current = (x, y);
        }
    }

    /// Finish the drag. The box is converted to unscaled page space
    /// and appended to the page's pending list; a zero-area box is
    /// rejected and the drag discarded. With `queue_modifier` held the
    /// machine stays open for more drags, otherwise the pending-action
    /// menu opens.
    pub fn pointer_up(
        &mut self,
        doc: &Document,
        queue_modifier: bool,
    ) -> Result<ReleaseAction, ValidationError> {
        let drag = match std::mem::take(&mut self.phase) {
            SelectionPhase::Dragging(drag) => drag,
            other => {
                self.phase = other;
                return Ok(ReleaseAction::Ignored);
            }
        };

        let Some(geometry) = doc.page(drag.page) else {
            return Ok(ReleaseAction::Ignored);
        };

        let unscaled = geometry.page_space_bounds(&drag.bounds(), (0.0, 0.0));
        if unscaled.area() <= 0.0 {
            return Err(ValidationError::ZeroAreaSelection);
        }

        self.queued.entry(drag.page).or_default().push(unscaled);

        if queue_modifier {
            Ok(ReleaseAction::Queued)
        } else {
            self.phase = SelectionPhase::Committed;
            Ok(ReleaseAction::MenuOpened)
        }
    }

    /// Escape key: cancel the drag or the open menu, dropping every
    /// queued box. No side effects in Idle.
    pub fn escape(&mut self) {
        match self.phase {
            SelectionPhase::Idle => {}
            _ => self.reset(),
        }
    }

    /// Click outside the selection UI; same cancellation as escape.
    pub fn click_outside(&mut self) {
        self.escape();
    }

    /// Menu action: join the per-page text of every queued box with
    /// single spaces, write it to the clipboard, and drain the queue.
    pub fn copy(
        &mut self,
        doc: &Document,
        clipboard: &mut dyn ClipboardSink,
    ) -> anyhow::Result<String> {
        let text = self.queued_text(doc);
        clipboard.set_text(&text)?;
        debug!("copied {} chars from selection", text.len());
        self.reset();
        Ok(text)
    }

    /// Menu action: build one token annotation covering every queued
    /// page and submit it. Requires an active label; the queue and
    /// menu survive a failure so the user can fix the problem and
    /// retry.
    pub fn apply_label(
        &mut self,
        doc: &Document,
        store: &mut AnnotationStore,
    ) -> Result<RecordId, ValidationError> {
        let label = self
            .active_label
            .clone()
            .ok_or(ValidationError::NoActiveLabel)?;

        let mut pages = BTreeMap::new();
        for (&page, boxes) in &self.queued {
            if let Some(payload) = doc.page(page).and_then(|g| g.page_annotation(boxes)) {
                pages.insert(page, payload);
            }
        }

        let annotation = Annotation::token_anchored(label, pages)?;
        let id = store.create(annotation)?;
        self.reset();
        Ok(id)
    }

    /// Menu action: discard the queue, no side effects.
    pub fn cancel(&mut self) {
        self.reset();
    }

    fn queued_text(&self, doc: &Document) -> String {
        self.queued
            .iter()
            .filter_map(|(&page, boxes)| {
                doc.page(page)
                    .and_then(|g| g.page_annotation(boxes))
                    .map(|p| p.raw_text)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn reset(&mut self) {
        self.phase = SelectionPhase::Idle;
        self.queued.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemoryClipboard;
    use crate::document::test_support::document_from_words;

    fn engine_with_label() -> SelectionEngine {
        let mut engine = SelectionEngine::new();
        engine.set_can_update(true);
        engine.set_active_label(Some(Label::new("l1", "Person")));
        engine
    }

    fn drag(engine: &mut SelectionEngine, doc: &Document, page: usize, to: (f32, f32)) {
        assert!(engine.pointer_down(doc, page, 0.0, 30.0, PointerButton::Primary));
        engine.pointer_move(to.0, to.1);
    }

    #[test]
    fn pointer_down_guards_leave_no_partial_state() {
        let mut doc = document_from_words(&[&["a"]]);
        let mut engine = engine_with_label();

        // Secondary button.
        assert!(!engine.pointer_down(&doc, 0, 0.0, 0.0, PointerButton::Secondary));
        // Off-document page.
        assert!(!engine.pointer_down(&doc, 9, 0.0, 0.0, PointerButton::Primary));
        // Read-only document.
        doc.set_read_only(true);
        assert!(!engine.pointer_down(&doc, 0, 0.0, 0.0, PointerButton::Primary));
        doc.set_read_only(false);
        // Missing update permission.
        engine.set_can_update(false);
        assert!(!engine.pointer_down(&doc, 0, 0.0, 0.0, PointerButton::Primary));

        assert!(matches!(engine.phase(), SelectionPhase::Idle));
        assert!(engine.queued_pages().is_empty());
    }

    #[test]
    fn release_without_modifier_opens_menu() {
        let doc = document_from_words(&[&["the", "cat"]]);
        let mut engine = engine_with_label();

        drag(&mut engine, &doc, 0, (120.0, 60.0));
        let action = engine.pointer_up(&doc, false).unwrap();

        assert_eq!(action, ReleaseAction::MenuOpened);
        assert!(engine.menu_open());
        assert_eq!(engine.queued_boxes(0).len(), 1);
    }

    #[test]
    fn modifier_queues_and_returns_to_idle() {
        let doc = document_from_words(&[&["the", "cat"], &["sat"]]);
        let mut engine = engine_with_label();

        drag(&mut engine, &doc, 0, (120.0, 60.0));
        assert_eq!(engine.pointer_up(&doc, true).unwrap(), ReleaseAction::Queued);
        assert!(matches!(engine.phase(), SelectionPhase::Idle));

        drag(&mut engine, &doc, 1, (55.0, 60.0));
        assert_eq!(engine.pointer_up(&doc, true).unwrap(), ReleaseAction::Queued);

        assert_eq!(engine.queued_pages(), vec![0, 1]);
    }

    #[test]
    fn zero_area_drag_is_rejected() {
        let doc = document_from_words(&[&["a"]]);
        let mut engine = engine_with_label();

        assert!(engine.pointer_down(&doc, 0, 10.0, 10.0, PointerButton::Primary));
        // No movement: zero-area box.
        assert_eq!(
            engine.pointer_up(&doc, false).unwrap_err(),
            ValidationError::ZeroAreaSelection
        );
        assert!(matches!(engine.phase(), SelectionPhase::Idle));
        assert!(engine.queued_pages().is_empty());
    }

    #[test]
    fn queued_boxes_are_stored_unscaled() {
        let mut doc = document_from_words(&[&["the", "cat"]]);
        doc.set_scale(2.0);
        let mut engine = engine_with_label();

        // Screen drag 0..240 covers 0..120 unscaled.
        drag(&mut engine, &doc, 0, (240.0, 120.0));
        engine.pointer_up(&doc, false).unwrap();

        let rect = engine.queued_boxes(0)[0];
        assert!((rect.right - 120.0).abs() < 1e-3);
        assert!((rect.bottom - 60.0).abs() < 1e-3);
    }

    #[test]
    fn escape_cancels_without_side_effects() {
        let doc = document_from_words(&[&["the", "cat"]]);
        let mut engine = engine_with_label();

        drag(&mut engine, &doc, 0, (120.0, 60.0));
        engine.pointer_up(&doc, false).unwrap();
        assert!(engine.menu_open());

        engine.escape();
        assert!(matches!(engine.phase(), SelectionPhase::Idle));
        assert!(engine.queued_pages().is_empty());
    }

    #[test]
    fn copy_joins_per_page_text_with_spaces() {
        let doc = document_from_words(&[&["the", "cat"], &["sat"]]);
        let mut engine = engine_with_label();
        let mut clipboard = MemoryClipboard::default();

        drag(&mut engine, &doc, 0, (120.0, 60.0));
        engine.pointer_up(&doc, true).unwrap();
        drag(&mut engine, &doc, 1, (55.0, 60.0));
        engine.pointer_up(&doc, false).unwrap();

        let text = engine.copy(&doc, &mut clipboard).unwrap();
        assert_eq!(text, "the cat sat");
        assert_eq!(clipboard.contents.as_deref(), Some("the cat sat"));
        assert!(engine.queued_pages().is_empty());
    }

    #[test]
    fn apply_label_builds_multi_page_annotation() {
        let doc = document_from_words(&[&["the", "cat"], &["sat"]]);
        let mut engine = engine_with_label();
        let mut store = AnnotationStore::new();

        drag(&mut engine, &doc, 0, (120.0, 60.0));
        engine.pointer_up(&doc, true).unwrap();
        drag(&mut engine, &doc, 1, (55.0, 60.0));
        engine.pointer_up(&doc, false).unwrap();

        let id = engine.apply_label(&doc, &mut store).unwrap();
        assert!(id.is_pending());

        let snapshot = store.snapshot();
        let annotation = snapshot.annotation(&id).unwrap();
        assert_eq!(annotation.raw_text, "the cat sat");
        assert_eq!(annotation.anchor_page(), Some(0));
        assert_eq!(annotation.anchor.pages(), vec![0, 1]);
        assert!(!engine.menu_open());
    }

    #[test]
    fn apply_label_without_active_label_keeps_menu() {
        let doc = document_from_words(&[&["the", "cat"]]);
        let mut engine = engine_with_label();
        engine.set_active_label(None);
        let mut store = AnnotationStore::new();

        drag(&mut engine, &doc, 0, (120.0, 60.0));
        engine.pointer_up(&doc, false).unwrap();

        assert_eq!(
            engine.apply_label(&doc, &mut store).unwrap_err(),
            ValidationError::NoActiveLabel
        );
        assert!(engine.menu_open());
        assert_eq!(engine.queued_boxes(0).len(), 1);
    }
}
