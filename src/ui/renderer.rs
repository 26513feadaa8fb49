//! Draws the sidebar, transcript, and input box from the current app state.

use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::Frame;
use unicode_width::UnicodeWidthChar;

use crate::core::app::App;
use crate::core::chat::Chat;
use crate::ui::layout::{compute_layout, AppLayout};
use crate::ui::theme::Theme;
use crate::utils::scroll::ScrollCalculator;

/// Build the unwrapped display lines for one chat's transcript.
pub fn transcript_lines(chat: &Chat, theme: &Theme) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    for msg in &chat.messages {
        if msg.is_user() {
            let mut content_lines = msg.content.lines();
            let first = content_lines.next().unwrap_or("");
            lines.push(Line::from(vec![
                Span::styled("You: ", theme.user_prefix_style),
                Span::styled(first.to_string(), theme.user_text_style),
            ]));
            for content_line in content_lines {
                lines.push(Line::from(Span::styled(
                    content_line.to_string(),
                    theme.user_text_style,
                )));
            }
            lines.push(Line::from(""));
        } else if msg.role.is_app() {
            for content_line in msg.content.lines() {
                lines.push(Line::from(Span::styled(
                    content_line.to_string(),
                    theme.app_message_style,
                )));
            }
            lines.push(Line::from(""));
        } else if !msg.content.is_empty() {
            // Assistant message; an empty one is still waiting for its first
            // streamed chunk and stays invisible.
            for content_line in msg.content.lines() {
                if content_line.trim().is_empty() {
                    lines.push(Line::from(""));
                } else {
                    lines.push(Line::from(Span::styled(
                        content_line.to_string(),
                        theme.assistant_text_style,
                    )));
                }
            }
            lines.push(Line::from(""));
        }
    }

    lines
}

/// Total wrapped transcript lines and the viewport height for a frame size,
/// used by the event loop for scroll clamping.
pub fn transcript_metrics(app: &App, area: Rect) -> (usize, u16) {
    let layout = compute_layout(area, app.sidebar_visible, app.input.lines().len() as u16);
    let inner_width = layout.transcript.width.saturating_sub(2);
    let lines = transcript_lines(app.chats.selected_chat(), &app.theme);
    let wrapped = ScrollCalculator::prewrap_lines(&lines, inner_width);
    (wrapped.len(), layout.transcript.height.saturating_sub(2))
}

fn truncate_to_width(text: &str, max_width: usize) -> String {
    let mut width = 0;
    let mut out = String::new();
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if width + w > max_width.saturating_sub(1) {
            out.push('…');
            return out;
        }
        width += w;
        out.push(c);
    }
    out
}

fn draw_sidebar(f: &mut Frame, app: &App, area: Rect) {
    let theme = &app.theme;
    let inner_width = area.width.saturating_sub(2) as usize;

    let items: Vec<ListItem> = app
        .chats
        .chats()
        .iter()
        .map(|chat| {
            let (label, style) = match &app.rename {
                Some(editor) if editor.chat_id == chat.id => {
                    (editor.buffer.clone(), theme.sidebar_rename_style)
                }
                _ => (chat.name.clone(), theme.sidebar_item_style),
            };
            ListItem::new(Span::styled(
                truncate_to_width(&label, inner_width),
                style,
            ))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.sidebar_border_style)
                .title(Span::styled("Chats", theme.sidebar_title_style)),
        )
        .highlight_style(theme.sidebar_selected_style);

    let mut state = ListState::default().with_selected(Some(app.chats.selected_index()));
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_transcript(f: &mut Frame, app: &mut App, area: Rect) {
    let theme = app.theme.clone();
    let chat = app.chats.selected_chat();

    let inner_width = area.width.saturating_sub(2);
    let lines = transcript_lines(chat, &theme);
    let wrapped = ScrollCalculator::prewrap_lines(&lines, inner_width);

    let viewport = area.height.saturating_sub(2);
    let max_offset = ScrollCalculator::max_scroll_offset(wrapped.len(), viewport);
    if app.auto_scroll {
        app.scroll_offset = max_offset;
    } else {
        app.scroll_offset = app.scroll_offset.min(max_offset);
    }

    let mut title_spans = vec![Span::styled(chat.name.clone(), theme.title_style)];
    if app.is_streaming {
        title_spans.push(Span::styled(
            " ● streaming",
            theme.streaming_indicator_style,
        ));
    }

    let paragraph = Paragraph::new(wrapped)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.input_border_style)
                .title(Line::from(title_spans)),
        )
        .scroll((app.scroll_offset, 0));

    f.render_widget(paragraph, area);
}

fn draw_input(f: &mut Frame, app: &mut App, area: Rect) {
    let theme = &app.theme;
    app.input.set_style(theme.input_text_style);
    app.input.set_cursor_style(theme.input_cursor_style);
    app.input.set_block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(theme.input_border_style)
            .title(Span::styled(
                "Message (Enter to send, Alt+Enter for newline)",
                theme.input_title_style,
            )),
    );
    f.render_widget(&app.input, area);
}

pub fn ui(f: &mut Frame, app: &mut App) {
    let background = Block::default().style(Style::default().bg(app.theme.background_color));
    f.render_widget(background, f.area());

    let AppLayout {
        sidebar,
        transcript,
        input,
    } = compute_layout(
        f.area(),
        app.sidebar_visible,
        app.input.lines().len() as u16,
    );

    if let Some(sidebar_area) = sidebar {
        draw_sidebar(f, app, sidebar_area);
    }
    draw_transcript(f, app, transcript);
    draw_input(f, app, input);
}
