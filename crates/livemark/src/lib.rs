//! Live markdown previews for `ratatui`.
//!
//! This crate re-exports the pieces most apps need:
//!
//! - [`schedule`], [`signal`]: the event-loop plumbing (from `livemark-core`).
//! - [`markdown`]: the document context, renderer adapter, widget, and factory (feature
//!   `markdown`, on by default).
//! - [`theme`], [`viewport`], [`render`]: styling, scrolling, and drawing helpers.
pub use livemark_core::Error;
pub use livemark_core::Result;
pub use livemark_core::error;
pub use livemark_core::render;
pub use livemark_core::schedule;
pub use livemark_core::signal;
pub use livemark_core::theme;
pub use livemark_core::viewport;

#[cfg(feature = "markdown")]
pub use livemark_markdown as markdown;

#[cfg(feature = "markdown")]
pub use livemark_markdown::MarkdownWidget;
#[cfg(feature = "markdown")]
pub use livemark_markdown::MarkdownWidgetFactory;
#[cfg(feature = "markdown")]
pub use livemark_markdown::TextDocument;
