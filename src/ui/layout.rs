//! Frame layout: an optional fixed-width sidebar beside a transcript pane
//! with the input box anchored underneath.

use ratatui::layout::{Constraint, Direction, Layout, Rect};

pub const SIDEBAR_WIDTH: u16 = 28;

/// Rows of the input box including its borders.
pub const INPUT_MIN_HEIGHT: u16 = 3;
pub const INPUT_MAX_HEIGHT: u16 = 8;

#[derive(Debug, Clone, Copy)]
pub struct AppLayout {
    pub sidebar: Option<Rect>,
    pub transcript: Rect,
    pub input: Rect,
}

/// Split the frame. `input_lines` is the current number of lines in the
/// composer; the input box grows with it up to a cap.
pub fn compute_layout(area: Rect, sidebar_visible: bool, input_lines: u16) -> AppLayout {
    let input_height = (input_lines + 2).clamp(INPUT_MIN_HEIGHT, INPUT_MAX_HEIGHT);

    let (sidebar, main) = if sidebar_visible && area.width > SIDEBAR_WIDTH {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(0)])
            .split(area);
        (Some(columns[0]), columns[1])
    } else {
        (None, area)
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(input_height)])
        .split(main);

    AppLayout {
        sidebar,
        transcript: rows[0],
        input: rows[1],
    }
}
