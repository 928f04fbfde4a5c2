use crate::context::ModelKind;
use thiserror::Error;

/// Why the renderer adapter could not produce output for a text snapshot.
///
/// The widget recovers from these: the previous output stays on screen and the error is handed
/// to its error reporter.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("no renderer for any of the permitted mime types {requested:?}")]
    UnsupportedMimeType { requested: Vec<String> },

    #[error("embedded content `{alt}` has unsupported mime type {mime}")]
    UnsupportedEmbed { mime: String, alt: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WidgetError {
    #[error("widget is already attached")]
    AlreadyAttached,

    #[error("widget is not attached")]
    NotAttached,

    #[error("widget has been disposed")]
    Disposed,

    #[error("document context has been disposed")]
    ContextDisposed,

    #[error("cannot render a {found} model as markdown (expected {expected})")]
    IncompatibleModel { expected: ModelKind, found: ModelKind },
}
