//! Width-aware wrapping and scroll math for the transcript pane.
//!
//! The transcript is rendered from pre-wrapped lines so the scroll offset
//! arithmetic and what ratatui paints can never disagree.

use ratatui::style::Style;
use ratatui::text::{Line, Span};
use unicode_width::UnicodeWidthChar;

pub struct ScrollCalculator;

impl ScrollCalculator {
    /// Wrap styled lines to the terminal width. Breaks at the last space in
    /// the current segment when one exists, otherwise hard-breaks. A width
    /// of zero returns owned clones unchanged.
    pub fn prewrap_lines(lines: &[Line], terminal_width: u16) -> Vec<Line<'static>> {
        let width = terminal_width as usize;
        let mut out: Vec<Line<'static>> = Vec::with_capacity(lines.len());

        for line in lines {
            if width == 0 || display_width(line) <= width {
                out.push(owned_line(line));
            } else {
                out.extend(wrap_line(line, width));
            }
        }

        out
    }

    /// Scroll offset that puts the last line at the bottom of the viewport.
    pub fn max_scroll_offset(total_lines: usize, viewport_height: u16) -> u16 {
        let total = total_lines.min(u16::MAX as usize) as u16;
        total.saturating_sub(viewport_height)
    }
}

fn display_width(line: &Line) -> usize {
    line.spans
        .iter()
        .map(|span| {
            span.content
                .chars()
                .map(|c| c.width().unwrap_or(0))
                .sum::<usize>()
        })
        .sum()
}

fn owned_line(line: &Line) -> Line<'static> {
    if line.spans.is_empty() {
        return Line::from("");
    }
    let spans: Vec<Span<'static>> = line
        .spans
        .iter()
        .map(|s| Span::styled(s.content.to_string(), s.style))
        .collect();
    Line::from(spans)
}

fn spans_from_cells(cells: &[(char, Style)]) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    for &(c, style) in cells {
        match spans.last_mut() {
            Some(last) if last.style == style => {
                let mut content = last.content.to_string();
                content.push(c);
                *last = Span::styled(content, style);
            }
            _ => spans.push(Span::styled(c.to_string(), style)),
        }
    }
    if spans.is_empty() {
        Line::from("")
    } else {
        Line::from(spans)
    }
}

fn wrap_line(line: &Line, width: usize) -> Vec<Line<'static>> {
    let cells: Vec<(char, Style)> = line
        .spans
        .iter()
        .flat_map(|span| span.content.chars().map(move |c| (c, span.style)))
        .collect();

    let mut out = Vec::new();
    let mut start = 0usize;

    while start < cells.len() {
        let mut col = 0usize;
        let mut end = start;
        let mut last_space: Option<usize> = None;

        while end < cells.len() {
            let char_width = cells[end].0.width().unwrap_or(0);
            if col + char_width > width {
                break;
            }
            if cells[end].0 == ' ' {
                last_space = Some(end);
            }
            col += char_width;
            end += 1;
        }

        if end == cells.len() {
            out.push(spans_from_cells(&cells[start..]));
            break;
        }

        match last_space {
            // Break at the space and swallow it.
            Some(space) if space > start => {
                out.push(spans_from_cells(&cells[start..space]));
                start = space + 1;
            }
            _ => {
                // No breakable point fit; hard break. Guarantee progress even
                // for an oversized single character.
                let end = end.max(start + 1);
                out.push(spans_from_cells(&cells[start..end]));
                start = end;
            }
        }
    }

    if out.is_empty() {
        out.push(Line::from(""));
    }
    out
}
