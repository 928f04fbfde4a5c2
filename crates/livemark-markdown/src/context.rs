//! Document context: the live document a widget renders.
//!
//! Storage, persistence, and dirty tracking belong to the host. Widgets only read the current
//! text and listen to the signals exposed by [`DocumentContext`]. [`TextDocument`] is a minimal
//! in-memory implementation for hosts that keep the text themselves (and for tests).

use livemark_core::signal::Signal;
use std::cell::Cell;
use std::cell::RefCell;
use std::fmt;

/// The kind of model backing a document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ModelKind {
    #[default]
    Text,
    Notebook,
    Base64,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Notebook => "notebook",
            Self::Base64 => "base64",
        })
    }
}

/// Read-only view of a live document plus its change notifications.
pub trait DocumentContext {
    fn path(&self) -> String;

    fn current_text(&self) -> String;

    fn model_kind(&self) -> ModelKind;

    /// Emitted after every content change. Carries no payload: read [`Self::current_text`].
    fn content_changed(&self) -> &Signal<()>;

    /// Emitted with the new path after a rename.
    fn path_changed(&self) -> &Signal<String>;

    /// Emitted once when the context is closed.
    fn disposed(&self) -> &Signal<()>;

    fn is_disposed(&self) -> bool;
}

/// An in-memory [`DocumentContext`].
pub struct TextDocument {
    path: RefCell<String>,
    text: RefCell<String>,
    kind: ModelKind,
    is_disposed: Cell<bool>,
    content_changed: Signal<()>,
    path_changed: Signal<String>,
    disposed: Signal<()>,
}

impl fmt::Debug for TextDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextDocument")
            .field("path", &*self.path.borrow())
            .field("len", &self.text.borrow().len())
            .field("kind", &self.kind)
            .field("disposed", &self.is_disposed.get())
            .finish()
    }
}

impl TextDocument {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_kind(path, text, ModelKind::Text)
    }

    pub fn with_kind(path: impl Into<String>, text: impl Into<String>, kind: ModelKind) -> Self {
        Self {
            path: RefCell::new(path.into()),
            text: RefCell::new(text.into()),
            kind,
            is_disposed: Cell::new(false),
            content_changed: Signal::new("content_changed"),
            path_changed: Signal::new("path_changed"),
            disposed: Signal::new("disposed"),
        }
    }

    /// Replaces the whole text. Emits `content_changed` only if the text actually changed.
    pub fn set_text(&self, text: impl Into<String>) -> bool {
        if self.is_disposed.get() {
            return false;
        }
        let text = text.into();
        {
            let mut current = self.text.borrow_mut();
            if *current == text {
                return false;
            }
            *current = text;
        }
        self.content_changed.emit(&());
        true
    }

    pub fn append(&self, delta: &str) {
        if self.is_disposed.get() || delta.is_empty() {
            return;
        }
        self.text.borrow_mut().push_str(delta);
        self.content_changed.emit(&());
    }

    pub fn set_path(&self, path: impl Into<String>) {
        if self.is_disposed.get() {
            return;
        }
        let path = path.into();
        if *self.path.borrow() == path {
            return;
        }
        *self.path.borrow_mut() = path.clone();
        self.path_changed.emit(&path);
    }

    /// Closes the document. Listeners hear `disposed` exactly once; later calls do nothing.
    pub fn dispose(&self) {
        if self.is_disposed.replace(true) {
            return;
        }
        self.disposed.emit(&());
        self.content_changed.clear();
        self.path_changed.clear();
        self.disposed.clear();
    }
}

impl DocumentContext for TextDocument {
    fn path(&self) -> String {
        self.path.borrow().clone()
    }

    fn current_text(&self) -> String {
        self.text.borrow().clone()
    }

    fn model_kind(&self) -> ModelKind {
        self.kind
    }

    fn content_changed(&self) -> &Signal<()> {
        &self.content_changed
    }

    fn path_changed(&self) -> &Signal<String> {
        &self.path_changed
    }

    fn disposed(&self) -> &Signal<()> {
        &self.disposed
    }

    fn is_disposed(&self) -> bool {
        self.is_disposed.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn set_text_notifies_only_on_change() {
        let doc = TextDocument::new("notes.md", "a");
        let hits = Rc::new(Cell::new(0));
        let hits2 = Rc::clone(&hits);
        doc.content_changed().subscribe(move |_| hits2.set(hits2.get() + 1));

        assert!(!doc.set_text("a"));
        assert!(doc.set_text("b"));
        doc.append("c");
        doc.append("");

        assert_eq!(hits.get(), 2);
        assert_eq!(doc.current_text(), "bc");
    }

    #[test]
    fn rename_carries_new_path() {
        let doc = TextDocument::new("a.md", "");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = Rc::clone(&seen);
        doc.path_changed()
            .subscribe(move |p: &String| seen2.borrow_mut().push(p.clone()));

        doc.set_path("docs/b.md");
        doc.set_path("docs/b.md");
        assert_eq!(*seen.borrow(), vec!["docs/b.md".to_string()]);
        assert_eq!(doc.path(), "docs/b.md");
    }

    #[test]
    fn dispose_is_idempotent_and_silences_the_document() {
        let doc = TextDocument::new("a.md", "x");
        let disposed = Rc::new(Cell::new(0));
        let disposed2 = Rc::clone(&disposed);
        doc.disposed().subscribe(move |_| disposed2.set(disposed2.get() + 1));
        doc.content_changed().subscribe(|_| panic!("no edits after dispose"));

        doc.dispose();
        doc.dispose();
        assert!(!doc.set_text("y"));

        assert_eq!(disposed.get(), 1);
        assert!(doc.is_disposed());
        assert_eq!(doc.content_changed().listener_count(), 0);
    }

    #[test]
    fn model_kind_is_reported() {
        let doc = TextDocument::with_kind("a.ipynb", "{}", ModelKind::Notebook);
        assert_eq!(doc.model_kind(), ModelKind::Notebook);
        assert_eq!(ModelKind::Notebook.to_string(), "notebook");
    }
}
