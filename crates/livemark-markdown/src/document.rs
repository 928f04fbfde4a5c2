//! The markdown engine behind every rendered output.
//!
//! Parsing and layout are split the same way as the rest of the crate uses them:
//!
//! - [`MarkdownDocument::parse`] turns source text into an opaque list of blocks once per text
//!   snapshot.
//! - [`MarkdownDocument::render`] lays the blocks out for a terminal `width` and [`Theme`]. The
//!   result is fully owned and meant to be cached per width.
//!
//! The engine covers the common CommonMark surface (headings, paragraphs, emphasis, links,
//! images, lists, task lists, block quotes, code, rules). Raw HTML is reduced to its text. It is
//! not trying to be a faithful CommonMark renderer.

use livemark_core::render::line_width;
use livemark_core::theme::Theme;
use pulldown_cmark::CowStr;
use pulldown_cmark::Event;
use pulldown_cmark::HeadingLevel;
use pulldown_cmark::Options;
use pulldown_cmark::Parser;
use pulldown_cmark::Tag;
use pulldown_cmark::TagEnd;
use ratatui::style::Modifier;
use ratatui::style::Style;
use ratatui::text::Line;
use ratatui::text::Span;
use ratatui::text::Text;
use unicode_width::UnicodeWidthChar;
use unicode_width::UnicodeWidthStr;
use url::Url;

/// Layout and parsing knobs for [`MarkdownDocument`].
///
/// Options that change what the parser produces (link destinations, heading markers, base URL)
/// only take effect on the next [`MarkdownDocument::parse`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MarkdownRenderOptions {
    pub wrap_prose: bool,
    pub show_link_destinations: bool,
    pub show_heading_markers: bool,
    pub blockquote_prefix: String,
    pub bullet: String,
    pub code_block_indent: u16,
    pub base_url: Option<String>,
}

impl Default for MarkdownRenderOptions {
    fn default() -> Self {
        Self {
            wrap_prose: true,
            show_link_destinations: false,
            show_heading_markers: false,
            blockquote_prefix: "| ".to_string(),
            bullet: "• ".to_string(),
            code_block_indent: 4,
            base_url: None,
        }
    }
}

/// An image embedded inline through a `data:` URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Embed {
    pub mime: String,
    pub alt: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct InlineFlags {
    emphasis: bool,
    strong: bool,
    strike: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ProseStyle {
    Normal,
    Heading(u8),
    Marker,
}

#[derive(Clone, Debug)]
struct Segment {
    text: String,
    style: ProseStyle,
    flags: InlineFlags,
    inline_code: bool,
    link: bool,
    muted: bool,
}

impl Segment {
    fn new(text: impl Into<String>, style: ProseStyle, flags: InlineFlags) -> Self {
        Self {
            text: text.into(),
            style,
            flags,
            inline_code: false,
            link: false,
            muted: false,
        }
    }

    fn muted(text: impl Into<String>) -> Self {
        let mut seg = Self::new(text, ProseStyle::Normal, InlineFlags::default());
        seg.muted = true;
        seg
    }

    fn marker(text: impl Into<String>) -> Self {
        Self::new(text, ProseStyle::Marker, InlineFlags::default())
    }
}

#[derive(Clone, Debug)]
enum Block {
    Prose {
        lines: Vec<Vec<Segment>>,
        initial_prefix: Vec<Segment>,
        subsequent_prefix: Vec<Segment>,
    },
    Code {
        lines: Vec<String>,
        prefix: Vec<Segment>,
        indent: u16,
        highlighted: bool,
    },
    Rule(Vec<Segment>),
    Blank(Vec<Segment>),
}

#[derive(Clone, Debug)]
pub struct MarkdownDocument {
    source: String,
    blocks: Vec<Block>,
    embeds: Vec<Embed>,
}

impl MarkdownDocument {
    /// Parses `source` as markdown.
    pub fn parse(source: impl Into<String>, options: &MarkdownRenderOptions) -> Self {
        let source = source.into();
        let (blocks, embeds) = parse_blocks(&source, options);
        Self {
            source,
            blocks,
            embeds,
        }
    }

    /// Treats `source` as preformatted plain text: no markup, no wrapping.
    pub fn plain(source: impl Into<String>) -> Self {
        let source = source.into();
        let lines = source.lines().map(str::to_string).collect::<Vec<_>>();
        let blocks = if lines.is_empty() {
            Vec::new()
        } else {
            vec![Block::Code {
                lines,
                prefix: Vec::new(),
                indent: 0,
                highlighted: false,
            }]
        };
        Self {
            source,
            blocks,
            embeds: Vec::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Images embedded through `data:` URIs, in document order.
    pub fn embeds(&self) -> &[Embed] {
        &self.embeds
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Lays the document out for `width` columns.
    pub fn render(
        &self,
        width: u16,
        theme: &Theme,
        options: &MarkdownRenderOptions,
    ) -> RenderedMarkdown {
        if width == 0 {
            return RenderedMarkdown::default();
        }
        let lines = layout_blocks(&self.blocks, width, options.wrap_prose, theme);
        let content_height = lines.len() as u32;
        let content_width = lines
            .iter()
            .map(|l| line_width(l) as u32)
            .max()
            .unwrap_or(0);
        RenderedMarkdown {
            text: Text::from(lines),
            content_width,
            content_height,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RenderedMarkdown {
    text: Text<'static>,
    content_width: u32,
    content_height: u32,
}

impl RenderedMarkdown {
    pub fn text(&self) -> &Text<'static> {
        &self.text
    }

    pub fn into_text(self) -> Text<'static> {
        self.text
    }

    pub fn lines(&self) -> &[Line<'static>] {
        &self.text.lines
    }

    /// Returns `(content_width, content_height)` in terminal cells.
    pub fn content_size(&self) -> (u32, u32) {
        (self.content_width, self.content_height)
    }
}

#[derive(Clone, Debug)]
enum Container {
    Quote,
    Item { marker: String, marker_used: bool },
}

#[derive(Clone, Copy, Debug)]
struct ListCtx {
    ordered: bool,
    index: u64,
}

struct ProseBuf {
    lines: Vec<Vec<Segment>>,
    initial_prefix: Vec<Segment>,
    subsequent_prefix: Vec<Segment>,
}

struct CodeBuf {
    text: String,
    prefix: Vec<Segment>,
}

struct LinkCtx {
    dest: String,
    text: String,
}

struct ImageCtx {
    dest: String,
    alt: String,
}

struct Builder<'a> {
    options: &'a MarkdownRenderOptions,
    blocks: Vec<Block>,
    embeds: Vec<Embed>,
    containers: Vec<Container>,
    lists: Vec<ListCtx>,
    prose: Option<ProseBuf>,
    code: Option<CodeBuf>,
    style: ProseStyle,
    inline: InlineFlags,
    link: Option<LinkCtx>,
    image: Option<ImageCtx>,
    wants_blank: bool,
}

impl<'a> Builder<'a> {
    fn new(options: &'a MarkdownRenderOptions) -> Self {
        Self {
            options,
            blocks: Vec::new(),
            embeds: Vec::new(),
            containers: Vec::new(),
            lists: Vec::new(),
            prose: None,
            code: None,
            style: ProseStyle::Normal,
            inline: InlineFlags::default(),
            link: None,
            image: None,
            wants_blank: false,
        }
    }

    /// Prefixes for the next block. The first block of a list item gets the item marker; every
    /// later line gets the hanging indent.
    fn take_prefixes(&mut self) -> (Vec<Segment>, Vec<Segment>) {
        let mut initial = Vec::new();
        let mut subsequent = Vec::new();
        for container in &mut self.containers {
            match container {
                Container::Quote => {
                    let prefix = Segment::muted(self.options.blockquote_prefix.clone());
                    initial.push(prefix.clone());
                    subsequent.push(prefix);
                }
                Container::Item {
                    marker,
                    marker_used,
                } => {
                    let hang = " ".repeat(UnicodeWidthStr::width(marker.as_str()));
                    if *marker_used {
                        initial.push(Segment::marker(hang.clone()));
                    } else {
                        initial.push(Segment::marker(marker.clone()));
                        *marker_used = true;
                    }
                    subsequent.push(Segment::marker(hang));
                }
            }
        }
        (initial, subsequent)
    }

    fn blank_prefix(&self) -> Vec<Segment> {
        let mut out = Vec::new();
        for container in &self.containers {
            match container {
                Container::Quote => out.push(Segment::muted(
                    self.options.blockquote_prefix.trim_end().to_string(),
                )),
                Container::Item { .. } => {}
            }
        }
        out
    }

    fn maybe_blank(&mut self) {
        if self.wants_blank && !matches!(self.blocks.last(), None | Some(Block::Blank(_))) {
            let prefix = self.blank_prefix();
            self.blocks.push(Block::Blank(prefix));
        }
        self.wants_blank = false;
    }

    fn start_prose(&mut self, style: ProseStyle) {
        self.flush_prose();
        self.maybe_blank();
        self.style = style;
        let (initial_prefix, subsequent_prefix) = self.take_prefixes();
        self.prose = Some(ProseBuf {
            lines: vec![Vec::new()],
            initial_prefix,
            subsequent_prefix,
        });
    }

    fn flush_prose(&mut self) {
        let Some(prose) = self.prose.take() else {
            return;
        };
        self.style = ProseStyle::Normal;
        let has_text = prose
            .lines
            .iter()
            .flatten()
            .any(|s| !s.text.trim().is_empty());
        if !has_text {
            return;
        }
        let mut lines = prose.lines;
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        self.blocks.push(Block::Prose {
            lines,
            initial_prefix: prose.initial_prefix,
            subsequent_prefix: prose.subsequent_prefix,
        });
    }

    fn push_inline(&mut self, seg: Segment) {
        if self.prose.is_none() {
            self.start_prose(self.style);
        }
        if let Some(prose) = self.prose.as_mut()
            && let Some(line) = prose.lines.last_mut()
        {
            line.push(seg);
        }
    }

    fn push_text(&mut self, text: &CowStr<'_>) {
        if let Some(code) = self.code.as_mut() {
            code.text.push_str(text);
            return;
        }
        if let Some(image) = self.image.as_mut() {
            image.alt.push_str(text);
            return;
        }
        if let Some(link) = self.link.as_mut() {
            link.text.push_str(text);
        }
        let mut seg = Segment::new(text.to_string(), self.style, self.inline);
        seg.link = self.link.is_some();
        self.push_inline(seg);
    }

    fn hard_break(&mut self) {
        if let Some(prose) = self.prose.as_mut() {
            prose.lines.push(Vec::new());
        }
    }

    fn start_code(&mut self) {
        self.flush_prose();
        self.maybe_blank();
        let (_, prefix) = self.take_prefixes();
        self.code = Some(CodeBuf {
            text: String::new(),
            prefix,
        });
    }

    fn end_code(&mut self) {
        let Some(code) = self.code.take() else {
            return;
        };
        let mut lines = code.text.lines().map(str::to_string).collect::<Vec<_>>();
        if lines.is_empty() {
            lines.push(String::new());
        }
        self.blocks.push(Block::Code {
            lines,
            prefix: code.prefix,
            indent: self.options.code_block_indent,
            highlighted: true,
        });
        self.wants_blank = true;
    }

    fn end_link(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };
        if !self.options.show_link_destinations || link.dest.is_empty() {
            return;
        }
        let text = link.text.trim();
        let bare = link.dest.strip_prefix("mailto:").unwrap_or(&link.dest);
        if text.is_empty() || text == link.dest || text == bare {
            return;
        }
        self.push_inline(Segment::muted(format!(" ({})", link.dest)));
    }

    fn end_image(&mut self) {
        let Some(image) = self.image.take() else {
            return;
        };
        let alt = image.alt.trim().to_string();
        let label = if alt.is_empty() { "image" } else { alt.as_str() };

        if let Some(mime) = data_uri_mime(&image.dest) {
            self.embeds.push(Embed {
                mime: mime.to_string(),
                alt: alt.clone(),
            });
            self.push_inline(Segment::muted(format!("[{label}]")));
            return;
        }

        let mut seg = Segment::new(format!("[{label}]"), self.style, self.inline);
        seg.link = true;
        self.push_inline(seg);
        if self.options.show_link_destinations && !image.dest.is_empty() {
            self.push_inline(Segment::muted(format!(" ({})", image.dest)));
        }
    }

    fn resolve_dest(&self, dest: &str) -> String {
        resolve_url(self.options.base_url.as_deref(), dest)
    }

    fn handle(&mut self, ev: Event<'_>) {
        match ev {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => self.push_text(&text),
            Event::Code(code) => {
                let mut seg = Segment::new(code.to_string(), self.style, self.inline);
                seg.inline_code = true;
                if let Some(link) = self.link.as_mut() {
                    link.text.push_str(&code);
                }
                self.push_inline(seg);
            }
            Event::SoftBreak => {
                if self.image.is_some() {
                    return;
                }
                self.push_inline(Segment::new(" ", self.style, self.inline));
            }
            Event::HardBreak => self.hard_break(),
            Event::Rule => {
                self.flush_prose();
                self.maybe_blank();
                let (_, prefix) = self.take_prefixes();
                self.blocks.push(Block::Rule(prefix));
                self.wants_blank = true;
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                let text = html_to_text(&html);
                if !text.is_empty() {
                    let mut seg = Segment::muted(text);
                    seg.style = self.style;
                    self.push_inline(seg);
                }
            }
            Event::TaskListMarker(checked) => {
                let mark = if checked { "[x] " } else { "[ ] " };
                self.push_inline(Segment::marker(mark));
            }
            _ => {}
        }
    }

    fn start_tag(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.start_prose(ProseStyle::Normal),
            Tag::Heading { level, .. } => {
                let level = heading_level(level);
                self.start_prose(ProseStyle::Heading(level));
                if self.options.show_heading_markers {
                    let hashes = "#".repeat(level as usize);
                    self.push_inline(Segment::new(
                        format!("{hashes} "),
                        ProseStyle::Heading(level),
                        self.inline,
                    ));
                }
            }
            Tag::HtmlBlock => self.start_prose(ProseStyle::Normal),
            Tag::BlockQuote(_) => {
                self.flush_prose();
                self.maybe_blank();
                self.containers.push(Container::Quote);
            }
            Tag::CodeBlock(_) => self.start_code(),
            Tag::List(start) => {
                self.flush_prose();
                if self.lists.is_empty() {
                    self.maybe_blank();
                }
                self.lists.push(ListCtx {
                    ordered: start.is_some(),
                    index: start.unwrap_or(1),
                });
            }
            Tag::Item => {
                self.flush_prose();
                let marker = match self.lists.last() {
                    Some(list) if list.ordered => format!("{}. ", list.index),
                    _ => self.options.bullet.clone(),
                };
                self.containers.push(Container::Item {
                    marker,
                    marker_used: false,
                });
            }
            Tag::Emphasis => self.inline.emphasis = true,
            Tag::Strong => self.inline.strong = true,
            Tag::Strikethrough => self.inline.strike = true,
            Tag::Link { dest_url, .. } => {
                self.link = Some(LinkCtx {
                    dest: self.resolve_dest(dest_url.as_ref()),
                    text: String::new(),
                });
            }
            Tag::Image { dest_url, .. } => {
                let dest = if dest_url.starts_with("data:") {
                    dest_url.to_string()
                } else {
                    self.resolve_dest(dest_url.as_ref())
                };
                self.image = Some(ImageCtx {
                    dest,
                    alt: String::new(),
                });
            }
            _ => {}
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::HtmlBlock => {
                self.flush_prose();
                self.wants_blank = true;
            }
            TagEnd::BlockQuote(_) => {
                self.flush_prose();
                self.containers.pop();
                self.wants_blank = true;
            }
            TagEnd::CodeBlock => self.end_code(),
            TagEnd::List(_) => {
                self.flush_prose();
                self.lists.pop();
                self.wants_blank = self.lists.is_empty();
            }
            TagEnd::Item => {
                self.flush_prose();
                self.containers.pop();
                if let Some(list) = self.lists.last_mut()
                    && list.ordered
                {
                    list.index += 1;
                }
            }
            TagEnd::Emphasis => self.inline.emphasis = false,
            TagEnd::Strong => self.inline.strong = false,
            TagEnd::Strikethrough => self.inline.strike = false,
            TagEnd::Link => self.end_link(),
            TagEnd::Image => self.end_image(),
            _ => {}
        }
    }

    fn finish(mut self) -> (Vec<Block>, Vec<Embed>) {
        self.flush_prose();
        self.end_code();
        while matches!(self.blocks.last(), Some(Block::Blank(_))) {
            self.blocks.pop();
        }
        (self.blocks, self.embeds)
    }
}

fn parse_blocks(input: &str, options: &MarkdownRenderOptions) -> (Vec<Block>, Vec<Embed>) {
    let mut parser_options = Options::empty();
    parser_options.insert(Options::ENABLE_TASKLISTS);
    parser_options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut builder = Builder::new(options);
    for ev in Parser::new_ext(input, parser_options) {
        builder.handle(ev);
    }
    builder.finish()
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// `data:image/png;base64,...` -> `image/png`. A bare `data:,` defaults to `text/plain`.
fn data_uri_mime(dest: &str) -> Option<&str> {
    let rest = dest.trim().strip_prefix("data:")?;
    let end = rest.find([';', ',']).unwrap_or(rest.len());
    let mime = rest[..end].trim();
    Some(if mime.is_empty() { "text/plain" } else { mime })
}

fn resolve_url(base_url: Option<&str>, dest: &str) -> String {
    let dest = dest.trim();
    if dest.is_empty() || is_absolute_url(dest) {
        return dest.to_string();
    }
    let Some(base) = base_url.map(str::trim).filter(|s| !s.is_empty()) else {
        return dest.to_string();
    };
    match Url::parse(base).and_then(|base| base.join(dest)) {
        Ok(url) => url.to_string(),
        Err(_) => format!(
            "{}/{}",
            base.trim_end_matches('/'),
            dest.trim_start_matches("./")
        ),
    }
}

fn is_absolute_url(dest: &str) -> bool {
    dest.starts_with('#')
        || dest.starts_with('/')
        || dest.starts_with("mailto:")
        || dest.starts_with("data:")
        || dest.contains("://")
}

fn html_to_text(html: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if in_tag => {}
            _ => out.push(ch),
        }
    }
    let decoded = out
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn layout_blocks(blocks: &[Block], width: u16, wrap: bool, theme: &Theme) -> Vec<Line<'static>> {
    let mut out = Vec::new();
    for block in blocks {
        match block {
            Block::Prose {
                lines,
                initial_prefix,
                subsequent_prefix,
            } => {
                for (i, line) in lines.iter().enumerate() {
                    let first = if i == 0 {
                        initial_prefix
                    } else {
                        subsequent_prefix
                    };
                    if wrap {
                        out.extend(wrap_segments(first, subsequent_prefix, line, width, theme));
                    } else {
                        let mut spans = segments_to_spans(first, theme);
                        spans.extend(segments_to_spans(line, theme));
                        out.push(Line::from(spans));
                    }
                }
            }
            Block::Code {
                lines,
                prefix,
                indent,
                highlighted,
            } => {
                let style = if *highlighted {
                    theme.code_inline
                } else {
                    theme.text_primary
                };
                for line in lines.iter() {
                    let mut spans = segments_to_spans(prefix, theme);
                    if *indent > 0 {
                        spans.push(Span::raw(" ".repeat(*indent as usize)));
                    }
                    spans.push(Span::styled(line.clone(), style));
                    out.push(Line::from(spans));
                }
            }
            Block::Rule(prefix) => {
                let mut spans = segments_to_spans(prefix, theme);
                let used = spans
                    .iter()
                    .map(|s| UnicodeWidthStr::width(s.content.as_ref()))
                    .sum::<usize>();
                let len = (width as usize).saturating_sub(used).max(1);
                spans.push(Span::styled("─".repeat(len), theme.text_muted));
                out.push(Line::from(spans));
            }
            Block::Blank(prefix) => out.push(Line::from(segments_to_spans(prefix, theme))),
        }
    }
    out
}

/// Greedy word wrap. Words wider than the remaining room are split at column boundaries.
fn wrap_segments(
    initial_prefix: &[Segment],
    subsequent_prefix: &[Segment],
    segments: &[Segment],
    width: u16,
    theme: &Theme,
) -> Vec<Line<'static>> {
    let width = width as usize;
    let mut out = Vec::new();

    let mut prefix = initial_prefix;
    let mut cur: Vec<Segment> = Vec::new();
    let mut cur_cols = segments_width(prefix);

    let mut tokens = segments.iter().flat_map(split_segment_ws).collect::<Vec<_>>();
    tokens.reverse();

    while let Some(tok) = tokens.pop() {
        let is_ws = tok.text.chars().all(char::is_whitespace);
        if is_ws && cur.is_empty() {
            continue;
        }
        let tok_cols = UnicodeWidthStr::width(tok.text.as_str());
        if cur_cols + tok_cols <= width {
            cur_cols += tok_cols;
            cur.push(tok);
            continue;
        }
        if is_ws {
            continue;
        }
        if !cur.is_empty() {
            out.push(finish_line(prefix, &mut cur, theme));
            prefix = subsequent_prefix;
            cur_cols = segments_width(prefix);
            tokens.push(tok);
            continue;
        }

        let room = width.saturating_sub(cur_cols).max(1);
        let (head, tail) = split_to_width(&tok, room);
        cur.push(head);
        out.push(finish_line(prefix, &mut cur, theme));
        prefix = subsequent_prefix;
        cur_cols = segments_width(prefix);
        if !tail.text.is_empty() {
            tokens.push(tail);
        }
    }

    if !cur.is_empty() || out.is_empty() {
        out.push(finish_line(prefix, &mut cur, theme));
    }
    out
}

fn finish_line(prefix: &[Segment], cur: &mut Vec<Segment>, theme: &Theme) -> Line<'static> {
    while cur
        .last()
        .is_some_and(|s| s.text.chars().all(char::is_whitespace))
    {
        cur.pop();
    }
    let mut spans = segments_to_spans(prefix, theme);
    spans.extend(segments_to_spans(cur, theme));
    cur.clear();
    Line::from(spans)
}

fn segments_width(segs: &[Segment]) -> usize {
    segs.iter()
        .map(|s| UnicodeWidthStr::width(s.text.as_str()))
        .sum()
}

fn split_segment_ws(seg: &Segment) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut last_ws: Option<bool> = None;
    for ch in seg.text.chars() {
        let ws = ch.is_whitespace();
        if last_ws.is_some_and(|prev| prev != ws) {
            let mut s = seg.clone();
            s.text = std::mem::take(&mut buf);
            out.push(s);
        }
        buf.push(ch);
        last_ws = Some(ws);
    }
    if !buf.is_empty() {
        let mut s = seg.clone();
        s.text = buf;
        out.push(s);
    }
    out
}

fn split_to_width(seg: &Segment, max_cols: usize) -> (Segment, Segment) {
    let mut cols = 0usize;
    let mut idx = 0usize;
    for (byte_idx, ch) in seg.text.char_indices() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if cols + w > max_cols && idx > 0 {
            break;
        }
        cols += w;
        idx = byte_idx + ch.len_utf8();
    }
    let (a, b) = seg.text.split_at(idx);
    let mut left = seg.clone();
    left.text = a.to_string();
    let mut right = seg.clone();
    right.text = b.to_string();
    (left, right)
}

fn segments_to_spans(segs: &[Segment], theme: &Theme) -> Vec<Span<'static>> {
    segs.iter()
        .filter(|s| !s.text.is_empty())
        .map(|s| Span::styled(s.text.clone(), style_for_segment(theme, s)))
        .collect()
}

fn style_for_segment(theme: &Theme, seg: &Segment) -> Style {
    let mut style = match seg.style {
        _ if seg.muted => theme.text_muted,
        ProseStyle::Normal => theme.text_primary,
        ProseStyle::Heading(1) => theme.heading.add_modifier(Modifier::UNDERLINED),
        ProseStyle::Heading(_) => theme.heading,
        ProseStyle::Marker => theme.text_muted,
    };
    if seg.inline_code {
        style = theme.code_inline;
    }
    if seg.link {
        style = theme.accent.add_modifier(Modifier::UNDERLINED);
    }
    if seg.flags.emphasis {
        style = style.add_modifier(Modifier::ITALIC);
    }
    if seg.flags.strong {
        style = style.add_modifier(Modifier::BOLD);
    }
    if seg.flags.strike {
        style = style.add_modifier(Modifier::CROSSED_OUT);
    }
    style
}

#[cfg(test)]
mod tests {
    use super::*;
    use livemark_core::render::line_to_plain;

    fn plain(md: &str, width: u16) -> Vec<String> {
        plain_with(md, width, &MarkdownRenderOptions::default())
    }

    fn plain_with(md: &str, width: u16, options: &MarkdownRenderOptions) -> Vec<String> {
        let doc = MarkdownDocument::parse(md, options);
        doc.render(width, &Theme::default(), options)
            .lines()
            .iter()
            .map(|l| line_to_plain(l).trim_end().to_string())
            .collect()
    }

    #[test]
    fn heading_and_paragraph_are_separated_by_one_blank_line() {
        assert_eq!(plain("# Hi\n\nhello world\n", 80), vec!["Hi", "", "hello world"]);
    }

    #[test]
    fn wraps_prose_but_not_code() {
        let lines = plain("hello world\n\n```txt\nabcdefgh\n```\n", 6);
        assert_eq!(lines, vec!["hello", "world", "", "    abcdefgh"]);
    }

    #[test]
    fn splits_words_longer_than_the_width() {
        assert_eq!(plain("abcdefgh", 3), vec!["abc", "def", "gh"]);
    }

    #[test]
    fn lists_get_markers_and_hanging_indent() {
        let lines = plain("- one two three\n- four\n\n1. a\n2. b\n", 9);
        assert_eq!(lines, vec!["• one two", "  three", "• four", "", "1. a", "2. b"]);
    }

    #[test]
    fn task_markers_and_nested_lists() {
        let lines = plain("- [x] done\n- [ ] todo\n  - nested\n", 40);
        assert_eq!(lines, vec!["• [x] done", "• [ ] todo", "  • nested"]);
    }

    #[test]
    fn block_quotes_prefix_every_line() {
        let lines = plain("> quoted words here\n", 10);
        assert_eq!(lines, vec!["| quoted", "| words", "| here"]);
    }

    #[test]
    fn link_destinations_are_optional_and_resolved() {
        assert_eq!(plain("[docs](./guide.md)", 80), vec!["docs"]);

        let options = MarkdownRenderOptions {
            show_link_destinations: true,
            base_url: Some("https://example.com/book/".to_string()),
            ..MarkdownRenderOptions::default()
        };
        assert_eq!(
            plain_with("[docs](./guide.md)", 80, &options),
            vec!["docs (https://example.com/book/guide.md)"]
        );
    }

    #[test]
    fn data_uri_images_are_recorded_as_embeds() {
        let md = "![chart](data:image/png;base64,AAAA) and ![logo](https://x.test/l.svg)";
        let doc = MarkdownDocument::parse(md, &MarkdownRenderOptions::default());
        assert_eq!(
            doc.embeds(),
            &[Embed {
                mime: "image/png".to_string(),
                alt: "chart".to_string(),
            }]
        );
        let lines = plain(md, 80);
        assert_eq!(lines, vec!["[chart] and [logo]"]);
    }

    #[test]
    fn raw_html_is_reduced_to_text() {
        assert_eq!(plain("<div>a &amp; <b>b</b></div>\n", 80), vec!["a & b"]);
    }

    #[test]
    fn plain_documents_keep_markup_verbatim() {
        let doc = MarkdownDocument::plain("# not a heading\n  *x*");
        let options = MarkdownRenderOptions::default();
        let lines = doc
            .render(80, &Theme::default(), &options)
            .lines()
            .iter()
            .map(line_to_plain)
            .collect::<Vec<_>>();
        assert_eq!(lines, vec!["# not a heading", "  *x*"]);
    }

    #[test]
    fn zero_width_renders_nothing() {
        let doc = MarkdownDocument::parse("# Hi", &MarkdownRenderOptions::default());
        let out = doc.render(0, &Theme::default(), &MarkdownRenderOptions::default());
        assert_eq!(out.content_size(), (0, 0));
    }

    #[test]
    fn content_size_tracks_widest_line() {
        let doc = MarkdownDocument::parse("ab\n\nabcd", &MarkdownRenderOptions::default());
        let out = doc.render(80, &Theme::default(), &MarkdownRenderOptions::default());
        assert_eq!(out.content_size(), (4, 3));
    }

    #[test]
    fn data_uri_mime_defaults_to_text_plain() {
        assert_eq!(data_uri_mime("data:,hello"), Some("text/plain"));
        assert_eq!(data_uri_mime("data:image/gif;base64,R0"), Some("image/gif"));
        assert_eq!(data_uri_mime("https://x"), None);
    }
}
