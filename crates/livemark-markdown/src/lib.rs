//! Live markdown preview for `ratatui`.
//!
//! A [`widget::MarkdownWidget`] observes a [`context::DocumentContext`], coalesces its change
//! notifications into one deferred render per loop iteration, and swaps the rendered output in as
//! its single child.
//!
//! ## Layers
//!
//! - [`document`]: the render core (parse once, lay out at any width).
//! - [`mime`]: the renderer adapter that picks a MIME type from a capability set.
//! - [`widget`] + [`factory`]: the live view and the factory hosts use to create it.
//!
//! ```no_run
//! use std::rc::Rc;
//! use livemark_core::schedule::EventLoop;
//! use livemark_markdown::{MarkdownWidgetFactory, RenderMime, TextDocument};
//!
//! let host = EventLoop::new();
//! let factory = MarkdownWidgetFactory::new(Rc::new(RenderMime::new()), Rc::new(host.clone()));
//! let doc = Rc::new(TextDocument::new("README.md", "# Hello"));
//! let mut widget = factory.create_new(doc.clone()).unwrap();
//! widget.attach().unwrap();
//! doc.append("\n\nmore text");
//! host.run_until_idle(16).unwrap();
//! assert_eq!(widget.child_count(), 1);
//! ```
pub mod context;
pub mod document;
pub mod error;
pub mod factory;
pub mod mime;
pub mod widget;

pub use context::DocumentContext;
pub use context::ModelKind;
pub use context::TextDocument;
pub use error::RenderError;
pub use error::WidgetError;
pub use factory::MarkdownWidgetFactory;
pub use mime::MimeSet;
pub use mime::RenderMime;
pub use mime::RenderMimeOptions;
pub use mime::RenderedOutput;
pub use mime::Renderer;
pub use widget::FlushOutcome;
pub use widget::Lifecycle;
pub use widget::LifecycleEvent;
pub use widget::MarkdownWidget;
pub use widget::MarkdownWidgetOptions;
