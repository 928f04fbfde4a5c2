use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::text::Line;
use ratatui::text::Span;
use unicode_width::UnicodeWidthChar;
use unicode_width::UnicodeWidthStr;

use crate::viewport::ViewportState;

const TAB_COLS: usize = 4;

pub fn render_scrollbar(area: Rect, buf: &mut Buffer, state: &ViewportState, style: Style) {
    buf.set_style(area, style);
    if area.height == 0 {
        return;
    }
    if state.content_h <= state.viewport_h as u32 || state.content_h == 0 {
        for dy in 0..area.height {
            buf.set_stringn(area.x, area.y + dy, " ", 1, style);
        }
        return;
    }

    let track_h = area.height as f64;
    let thumb_h = ((state.viewport_h as f64 / state.content_h as f64) * track_h)
        .round()
        .clamp(1.0, track_h) as u16;

    let max_y = state
        .content_h
        .saturating_sub(state.viewport_h as u32)
        .max(1) as f64;
    let thumb_top = ((state.y as f64 / max_y) * (track_h - thumb_h as f64))
        .round()
        .clamp(0.0, (track_h - thumb_h as f64).max(0.0)) as u16;

    for dy in 0..area.height {
        let ch = if dy >= thumb_top && dy < thumb_top + thumb_h {
            "█"
        } else {
            " "
        };
        buf.set_stringn(area.x, area.y + dy, ch, 1, style);
    }
}

/// Draws `spans` on row `y`, skipping the first `start_col` cells and writing at most `max_cols`.
///
/// Wide characters that straddle either edge are dropped rather than split. Spans with the
/// default style are drawn with `fallback_style`.
pub fn render_spans_clipped(
    x: u16,
    y: u16,
    start_col: u32,
    max_cols: u16,
    buf: &mut Buffer,
    spans: &[Span<'_>],
    fallback_style: Style,
) {
    let mut cursor = ClipCursor {
        x,
        y,
        start_col: start_col as usize,
        max_cols: max_cols as usize,
        col: 0,
        out_cols: 0,
    };
    if cursor.max_cols == 0 {
        return;
    }

    for span in spans {
        let style = if span.style == Style::default() {
            fallback_style
        } else {
            span.style
        };
        for ch in span.content.chars() {
            if !cursor.put(buf, ch, style) {
                return;
            }
        }
    }
}

struct ClipCursor {
    x: u16,
    y: u16,
    start_col: usize,
    max_cols: usize,
    col: usize,
    out_cols: usize,
}

impl ClipCursor {
    /// Returns `false` once the row is full.
    fn put(&mut self, buf: &mut Buffer, ch: char, style: Style) -> bool {
        if ch == '\t' {
            for _ in 0..TAB_COLS {
                if !self.put(buf, ' ', style) {
                    return false;
                }
            }
            return true;
        }

        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if w == 0 {
            return true;
        }
        if self.col < self.start_col {
            self.col += w;
            return true;
        }
        if self.out_cols + w > self.max_cols {
            return false;
        }

        let mut tmp = [0u8; 4];
        let dx = self.out_cols as u16;
        if let Some(cell) = buf.cell_mut((self.x + dx, self.y)) {
            cell.set_style(style);
            cell.set_symbol(ch.encode_utf8(&mut tmp));
        }
        if w == 2
            && let Some(cell) = buf.cell_mut((self.x + dx + 1, self.y))
        {
            cell.set_style(style);
            cell.set_symbol("");
        }
        self.out_cols += w;
        self.col += w;
        true
    }
}

pub fn line_width(line: &Line<'_>) -> usize {
    line.spans
        .iter()
        .map(|s| UnicodeWidthStr::width(s.content.as_ref()))
        .sum()
}

pub fn line_to_plain(line: &Line<'_>) -> String {
    let mut out = String::new();
    for span in &line.spans {
        out.push_str(span.content.as_ref());
    }
    out
}

/// Shrinks `area` horizontally by the given paddings (clamped to the available width).
pub fn inset_h(area: Rect, left: u16, right: u16) -> Rect {
    let left = left.min(area.width);
    let right = right.min(area.width.saturating_sub(left));
    Rect::new(
        area.x.saturating_add(left),
        area.y,
        area.width.saturating_sub(left).saturating_sub(right),
        area.height,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(buf: &Buffer, y: u16) -> String {
        let area = buf.area;
        (area.x..area.x + area.width)
            .map(|x| buf[(x, y)].symbol().to_string())
            .collect()
    }

    #[test]
    fn clips_on_both_sides() {
        let mut buf = Buffer::empty(Rect::new(0, 0, 5, 1));
        let spans = [Span::raw("abc"), Span::raw("defgh")];
        render_spans_clipped(0, 0, 2, 4, &mut buf, &spans, Style::default());
        assert_eq!(row(&buf, 0), "cdef ");
    }

    #[test]
    fn expands_tabs_and_skips_straddling_wide_chars() {
        let mut buf = Buffer::empty(Rect::new(0, 0, 6, 1));
        let spans = [Span::raw("\tx")];
        render_spans_clipped(0, 0, 0, 6, &mut buf, &spans, Style::default());
        assert_eq!(row(&buf, 0), "    x ");

        let mut buf = Buffer::empty(Rect::new(0, 0, 4, 1));
        let spans = [Span::raw("你好")];
        render_spans_clipped(0, 0, 1, 4, &mut buf, &spans, Style::default());
        assert_eq!(row(&buf, 0).trim_end(), "好");
    }

    #[test]
    fn inset_never_underflows() {
        let area = Rect::new(3, 0, 4, 2);
        assert_eq!(inset_h(area, 1, 1), Rect::new(4, 0, 2, 2));
        assert_eq!(inset_h(area, 9, 9).width, 0);
    }
}
