//! The renderer adapter: text + MIME capability set -> one [`RenderedOutput`].
//!
//! [`RenderMime`] plays the role of a MIME renderer registry: it knows an ordered list of MIME
//! types it can produce and, for each render, picks the first one the caller's [`MimeSet`]
//! permits.

use crate::document::MarkdownDocument;
use crate::document::MarkdownRenderOptions;
use crate::document::RenderedMarkdown;
use crate::error::RenderError;
use livemark_core::render::line_to_plain;
use livemark_core::theme::Theme;
use ratatui::text::Line;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

pub const TEXT_MARKDOWN: &str = "text/markdown";
pub const TEXT_PLAIN: &str = "text/plain";

/// The set of MIME types a renderer is permitted to produce.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct MimeSet(BTreeSet<String>);

impl MimeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// `text/markdown` with a `text/plain` fallback.
    pub fn default_markdown() -> Self {
        [TEXT_MARKDOWN, TEXT_PLAIN].into_iter().collect()
    }

    pub fn with(mut self, mime: impl Into<String>) -> Self {
        self.insert(mime);
        self
    }

    pub fn insert(&mut self, mime: impl Into<String>) -> bool {
        self.0.insert(mime.into().trim().to_ascii_lowercase())
    }

    pub fn contains(&self, mime: &str) -> bool {
        self.0.contains(&mime.trim().to_ascii_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for MimeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for mime in iter {
            set.insert(mime);
        }
        set
    }
}

/// Process-unique identity of a [`RenderedOutput`]; two renders never share one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(u64);

impl OutputId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output#{}", self.0)
    }
}

/// One rendered snapshot of a document, ready to be laid out at any width.
///
/// Layouts are cached per width, so drawing the same output frame after frame is cheap.
#[derive(Debug)]
pub struct RenderedOutput {
    id: OutputId,
    mime: &'static str,
    document: MarkdownDocument,
    options: MarkdownRenderOptions,
    layout: RefCell<Option<(u16, RenderedMarkdown)>>,
}

impl RenderedOutput {
    fn new(mime: &'static str, document: MarkdownDocument, options: MarkdownRenderOptions) -> Self {
        Self {
            id: OutputId::next(),
            mime,
            document,
            options,
            layout: RefCell::new(None),
        }
    }

    pub fn id(&self) -> OutputId {
        self.id
    }

    /// The MIME type that was chosen to render this output.
    pub fn mime(&self) -> &'static str {
        self.mime
    }

    /// The text snapshot this output was rendered from.
    pub fn source(&self) -> &str {
        self.document.source()
    }

    pub fn document(&self) -> &MarkdownDocument {
        &self.document
    }

    pub fn lines_for_width(&self, width: u16, theme: &Theme) -> Vec<Line<'static>> {
        self.with_layout(width, theme, |r| r.lines().to_vec())
    }

    pub fn content_size(&self, width: u16, theme: &Theme) -> (u32, u32) {
        self.with_layout(width, theme, RenderedMarkdown::content_size)
    }

    /// Plain text of every rendered line at `width`; handy for tests and snapshots.
    pub fn plain_lines(&self, width: u16) -> Vec<String> {
        self.with_layout(width, &Theme::default(), |r| {
            r.lines().iter().map(line_to_plain).collect()
        })
    }

    /// Runs `f` against the layout for `width`, computing it on first use.
    ///
    /// The cache holds a single width; the theme is not part of the key, so callers that swap
    /// themes should call [`Self::invalidate_layout`].
    pub fn with_layout<R>(
        &self,
        width: u16,
        theme: &Theme,
        f: impl FnOnce(&RenderedMarkdown) -> R,
    ) -> R {
        let mut cache = self.layout.borrow_mut();
        let hit = matches!(cache.as_ref(), Some((w, _)) if *w == width);
        if !hit {
            *cache = Some((width, self.document.render(width, theme, &self.options)));
        }
        match cache.as_ref() {
            Some((_, rendered)) => f(rendered),
            None => f(&RenderedMarkdown::default()),
        }
    }

    pub fn invalidate_layout(&self) {
        self.layout.borrow_mut().take();
    }
}

/// The seam between the widget and whatever turns text into output.
pub trait Renderer {
    fn render(&self, text: &str, mimes: &MimeSet) -> Result<RenderedOutput, RenderError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RenderMimeOptions {
    /// Fail the render (instead of showing alt text) when the text embeds content whose MIME
    /// type is not in the capability set.
    pub strict_embeds: bool,
    pub render: MarkdownRenderOptions,
}

impl Default for RenderMimeOptions {
    fn default() -> Self {
        Self {
            strict_embeds: true,
            render: MarkdownRenderOptions::default(),
        }
    }
}

/// The default [`Renderer`]: markdown first, plain text as a fallback.
#[derive(Clone, Debug, Default)]
pub struct RenderMime {
    options: RenderMimeOptions,
}

impl RenderMime {
    /// Preference order used to pick a MIME type from the caller's capability set.
    pub const ORDER: [&'static str; 2] = [TEXT_MARKDOWN, TEXT_PLAIN];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: RenderMimeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RenderMimeOptions {
        &self.options
    }

    /// First MIME type in [`Self::ORDER`] that `mimes` allows.
    pub fn preferred_mime(&self, mimes: &MimeSet) -> Option<&'static str> {
        Self::ORDER.into_iter().find(|m| mimes.contains(m))
    }
}

impl Renderer for RenderMime {
    fn render(&self, text: &str, mimes: &MimeSet) -> Result<RenderedOutput, RenderError> {
        let Some(mime) = self.preferred_mime(mimes) else {
            return Err(RenderError::UnsupportedMimeType {
                requested: mimes.iter().map(str::to_string).collect(),
            });
        };

        let document = match mime {
            TEXT_MARKDOWN => MarkdownDocument::parse(text, &self.options.render),
            _ => MarkdownDocument::plain(text),
        };

        if self.options.strict_embeds
            && let Some(embed) = document.embeds().iter().find(|e| !mimes.contains(&e.mime))
        {
            return Err(RenderError::UnsupportedEmbed {
                mime: embed.mime.clone(),
                alt: embed.alt.clone(),
            });
        }

        tracing::trace!(mime, bytes = text.len(), "rendered");
        Ok(RenderedOutput::new(
            mime,
            document,
            self.options.render.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_markdown_over_plain() {
        let out = RenderMime::new()
            .render("# Hi", &MimeSet::default_markdown())
            .unwrap();
        assert_eq!(out.mime(), TEXT_MARKDOWN);
        assert_eq!(out.plain_lines(80), vec!["Hi"]);
    }

    #[test]
    fn falls_back_to_plain_text() {
        let mimes: MimeSet = [TEXT_PLAIN].into_iter().collect();
        let out = RenderMime::new().render("# Hi", &mimes).unwrap();
        assert_eq!(out.mime(), TEXT_PLAIN);
        assert_eq!(out.plain_lines(80), vec!["# Hi"]);
    }

    #[test]
    fn rejects_capability_sets_without_a_known_mime() {
        let mimes: MimeSet = ["image/png"].into_iter().collect();
        let err = RenderMime::new().render("x", &mimes).unwrap_err();
        assert!(matches!(err, RenderError::UnsupportedMimeType { ref requested } if requested == &["image/png".to_string()]));
    }

    #[test]
    fn strict_embeds_require_the_embedded_mime() {
        let md = "![plot](data:image/png;base64,AAAA)";
        let renderer = RenderMime::new();

        let err = renderer.render(md, &MimeSet::default_markdown()).unwrap_err();
        assert_eq!(
            err,
            RenderError::UnsupportedEmbed {
                mime: "image/png".to_string(),
                alt: "plot".to_string(),
            }
        );

        let out = renderer
            .render(md, &MimeSet::default_markdown().with("image/png"))
            .unwrap();
        assert_eq!(out.plain_lines(80), vec!["[plot]"]);
    }

    #[test]
    fn lenient_embeds_show_alt_text() {
        let renderer = RenderMime::with_options(RenderMimeOptions {
            strict_embeds: false,
            ..RenderMimeOptions::default()
        });
        let out = renderer
            .render("![plot](data:image/png;base64,AAAA)", &MimeSet::default_markdown())
            .unwrap();
        assert_eq!(out.plain_lines(80), vec!["[plot]"]);
    }

    #[test]
    fn every_output_gets_a_fresh_id() {
        let renderer = RenderMime::new();
        let mimes = MimeSet::default_markdown();
        let a = renderer.render("same", &mimes).unwrap();
        let b = renderer.render("same", &mimes).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.source(), b.source());
    }

    #[test]
    fn layout_cache_follows_width() {
        let out = RenderMime::new()
            .render("alpha beta", &MimeSet::default_markdown())
            .unwrap();
        let theme = Theme::default();
        assert_eq!(out.content_size(80, &theme), (10, 1));
        assert_eq!(out.content_size(5, &theme), (5, 2));
        assert_eq!(out.plain_lines(5), vec!["alpha", "beta"]);
    }

    #[test]
    fn mime_set_normalizes_case() {
        let set: MimeSet = ["Text/Markdown "].into_iter().collect();
        assert!(set.contains(TEXT_MARKDOWN));
    }
}
