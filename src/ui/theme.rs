use ratatui::style::{Color, Modifier, Style};

#[derive(Debug, Clone)]
pub struct Theme {
    // Overall background color to paint the full frame
    pub background_color: Color,
    // Chat message styles
    pub user_prefix_style: Style,
    pub user_text_style: Style,
    pub assistant_text_style: Style,
    pub app_message_style: Style,

    // Chrome
    pub title_style: Style,
    pub streaming_indicator_style: Style,
    pub input_border_style: Style,
    pub input_title_style: Style,
    pub input_text_style: Style,
    pub input_cursor_style: Style,

    // Sidebar
    pub sidebar_border_style: Style,
    pub sidebar_title_style: Style,
    pub sidebar_item_style: Style,
    pub sidebar_selected_style: Style,
    pub sidebar_rename_style: Style,
}

impl Theme {
    pub fn dark_default() -> Self {
        Theme {
            background_color: Color::Black,
            user_prefix_style: Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
            user_text_style: Style::default().fg(Color::Cyan),
            assistant_text_style: Style::default().fg(Color::White),
            app_message_style: Style::default().fg(Color::DarkGray),

            title_style: Style::default().fg(Color::Gray),
            streaming_indicator_style: Style::default().fg(Color::White),
            input_border_style: Style::default().fg(Color::Gray),
            input_title_style: Style::default().fg(Color::Gray),
            input_text_style: Style::default().fg(Color::White),
            input_cursor_style: Style::default().add_modifier(Modifier::REVERSED),

            sidebar_border_style: Style::default().fg(Color::Gray),
            sidebar_title_style: Style::default().fg(Color::Gray),
            sidebar_item_style: Style::default().fg(Color::White),
            sidebar_selected_style: Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
            sidebar_rename_style: Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::UNDERLINED),
        }
    }

    pub fn light() -> Self {
        Theme {
            background_color: Color::White,
            user_prefix_style: Style::default()
                .fg(Color::Blue)
                .add_modifier(Modifier::BOLD),
            user_text_style: Style::default().fg(Color::Blue),
            assistant_text_style: Style::default().fg(Color::Black),
            app_message_style: Style::default().fg(Color::Gray),

            title_style: Style::default().fg(Color::DarkGray),
            streaming_indicator_style: Style::default().fg(Color::Black),
            input_border_style: Style::default().fg(Color::Black),
            input_title_style: Style::default().fg(Color::DarkGray),
            input_text_style: Style::default().fg(Color::Black),
            input_cursor_style: Style::default().add_modifier(Modifier::REVERSED),

            sidebar_border_style: Style::default().fg(Color::Black),
            sidebar_title_style: Style::default().fg(Color::DarkGray),
            sidebar_item_style: Style::default().fg(Color::Black),
            sidebar_selected_style: Style::default()
                .fg(Color::White)
                .bg(Color::Blue)
                .add_modifier(Modifier::BOLD),
            sidebar_rename_style: Style::default()
                .fg(Color::Blue)
                .add_modifier(Modifier::UNDERLINED),
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "light" => Self::light(),
            // Fallback
            _ => Self::dark_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_theme_names_fall_back_to_dark() {
        let theme = Theme::from_name("no-such-theme");
        assert_eq!(theme.background_color, Color::Black);
        let light = Theme::from_name("LIGHT");
        assert_eq!(light.background_color, Color::White);
    }
}
