//! Main chat event loop: terminal setup and teardown, input handling, and
//! draining the stream relay channel into the transcript.

use std::error::Error;
use std::io;
use std::time::Duration;

use ratatui::backend::CrosstermBackend;
use ratatui::crossterm::{
    event::{
        self, DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste,
        EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers,
        MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::layout::Rect;
use ratatui::Terminal;

use crate::core::app::App;
use crate::core::chat_stream::{StreamDispatcher, StreamEvent};
use crate::ui::renderer::{transcript_metrics, ui};
use crate::utils::input::sanitize_text_input;
use crate::utils::scroll::ScrollCalculator;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub async fn run_chat_loop(mut app: App) -> Result<(), Box<dyn Error>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableBracketedPaste,
        EnableMouseCapture
    )?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (dispatcher, mut rx) = StreamDispatcher::new();

    let result = loop {
        if let Err(e) = terminal.draw(|f| ui(f, &mut app)) {
            break Err(e.into());
        }

        if event::poll(POLL_INTERVAL)? {
            let size = terminal.size()?;
            let frame = Rect::new(0, 0, size.width, size.height);
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    handle_key(&mut app, key, &dispatcher, frame);
                }
                Event::Mouse(mouse) => match mouse.kind {
                    MouseEventKind::ScrollUp => scroll_up(&mut app, 3),
                    MouseEventKind::ScrollDown => scroll_down(&mut app, 3, frame),
                    _ => {}
                },
                Event::Paste(text) => {
                    app.input.insert_str(sanitize_text_input(&text));
                }
                _ => {}
            }
            if app.exit_requested {
                break Ok(());
            }
        }

        // Drain everything the relay produced since the last pass so a burst
        // of chunks costs one redraw.
        let mut received_any = false;
        while let Ok((stream_event, stream_id)) = rx.try_recv() {
            match stream_event {
                StreamEvent::Chunk(content) => app.apply_stream_chunk(stream_id, &content),
                StreamEvent::Error(message) => app.handle_stream_error(stream_id, message),
                StreamEvent::End => app.finish_stream(stream_id),
            }
            received_any = true;
        }
        if received_any {
            continue;
        }
    };

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableBracketedPaste,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn handle_key(app: &mut App, key: KeyEvent, dispatcher: &StreamDispatcher, frame: Rect) {
    // The rename editor captures the keyboard while it is open.
    if app.rename.is_some() {
        handle_rename_key(app, key);
        return;
    }

    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);

    match key.code {
        KeyCode::Char('c') if ctrl => {
            app.exit_requested = true;
        }
        KeyCode::Char('n') if ctrl => app.new_chat(),
        KeyCode::Char('d') if ctrl => app.delete_selected_chat(),
        KeyCode::Char('r') if ctrl => app.begin_rename(),
        KeyCode::Char('b') if ctrl => app.toggle_sidebar(),
        KeyCode::Char('l') if ctrl => app.toggle_transcript_logging(),
        KeyCode::Up if ctrl => app.select_previous_chat(),
        KeyCode::Down if ctrl => app.select_next_chat(),
        KeyCode::Esc => app.cancel_current_stream(),
        KeyCode::Enter if alt => {
            app.input.insert_newline();
        }
        KeyCode::Enter => {
            if let Some(params) = app.submit_input() {
                dispatcher.spawn(params);
            }
        }
        KeyCode::Up => scroll_up(app, 1),
        KeyCode::Down => scroll_down(app, 1, frame),
        KeyCode::PageUp => {
            let (_, viewport) = transcript_metrics(app, frame);
            scroll_up(app, viewport.max(1));
        }
        KeyCode::PageDown => {
            let (_, viewport) = transcript_metrics(app, frame);
            scroll_down(app, viewport.max(1), frame);
        }
        _ => {
            app.input.input(key);
        }
    }
}

fn handle_rename_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => app.commit_rename(),
        KeyCode::Esc => app.cancel_rename(),
        KeyCode::Backspace => {
            if let Some(editor) = app.rename.as_mut() {
                editor.buffer.pop();
            }
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            if let Some(editor) = app.rename.as_mut() {
                editor.buffer.push(c);
            }
        }
        _ => {}
    }
}

fn scroll_up(app: &mut App, amount: u16) {
    app.auto_scroll = false;
    app.scroll_offset = app.scroll_offset.saturating_sub(amount);
}

fn scroll_down(app: &mut App, amount: u16, frame: Rect) {
    let (total_lines, viewport) = transcript_metrics(app, frame);
    let max_offset = ScrollCalculator::max_scroll_offset(total_lines, viewport);
    app.scroll_offset = app.scroll_offset.saturating_add(amount).min(max_offset);
    // Reaching the bottom re-engages follow-the-stream scrolling.
    if app.scroll_offset >= max_offset {
        app.auto_scroll = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::app::SessionSettings;
    use crate::core::store::ChatsFile;
    use crate::ui::theme::Theme;

    fn test_app(dir: &tempfile::TempDir) -> App {
        let settings = SessionSettings {
            model: "test-model".to_string(),
            base_url: "http://localhost:9999/v1".to_string(),
            api_key: "sk-test".to_string(),
            theme: Theme::dark_default(),
            sidebar_visible: true,
            log_file: None,
        };
        App::new(
            settings,
            ChatsFile::new(dir.path().join("chats.json")),
            Vec::new(),
        )
    }

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[tokio::test]
    async fn ctrl_keys_drive_chat_management() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(&dir);
        let (dispatcher, _rx) = StreamDispatcher::new();
        let frame = Rect::new(0, 0, 80, 24);

        handle_key(
            &mut app,
            key(KeyCode::Char('n'), KeyModifiers::CONTROL),
            &dispatcher,
            frame,
        );
        assert_eq!(app.chats.chats().len(), 2);

        handle_key(
            &mut app,
            key(KeyCode::Char('b'), KeyModifiers::CONTROL),
            &dispatcher,
            frame,
        );
        assert!(!app.sidebar_visible);

        handle_key(
            &mut app,
            key(KeyCode::Char('c'), KeyModifiers::CONTROL),
            &dispatcher,
            frame,
        );
        assert!(app.exit_requested);
    }

    #[tokio::test]
    async fn typed_characters_land_in_the_composer() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(&dir);
        let (dispatcher, _rx) = StreamDispatcher::new();
        let frame = Rect::new(0, 0, 80, 24);

        for c in ['h', 'i'] {
            handle_key(&mut app, key(KeyCode::Char(c), KeyModifiers::NONE), &dispatcher, frame);
        }
        handle_key(&mut app, key(KeyCode::Enter, KeyModifiers::ALT), &dispatcher, frame);
        handle_key(&mut app, key(KeyCode::Char('!'), KeyModifiers::NONE), &dispatcher, frame);

        assert_eq!(app.input_text(), "hi\n!");
    }

    #[tokio::test]
    async fn enter_submits_and_spawns_a_stream() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(&dir);
        let (dispatcher, _rx) = StreamDispatcher::new();
        let frame = Rect::new(0, 0, 80, 24);

        app.input.insert_str("hello");
        handle_key(&mut app, key(KeyCode::Enter, KeyModifiers::NONE), &dispatcher, frame);

        assert!(app.is_streaming);
        assert_eq!(app.chats.selected_chat().messages.len(), 2);
    }

    #[tokio::test]
    async fn rename_mode_captures_typing_until_enter() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(&dir);
        let (dispatcher, _rx) = StreamDispatcher::new();
        let frame = Rect::new(0, 0, 80, 24);

        handle_key(
            &mut app,
            key(KeyCode::Char('r'), KeyModifiers::CONTROL),
            &dispatcher,
            frame,
        );
        assert!(app.rename.is_some());

        // Clear the prefilled name, then type a new one.
        for _ in 0.."New Chat".len() {
            handle_key(&mut app, key(KeyCode::Backspace, KeyModifiers::NONE), &dispatcher, frame);
        }
        for c in ['i', 'd', 'e', 'a', 's'] {
            handle_key(&mut app, key(KeyCode::Char(c), KeyModifiers::NONE), &dispatcher, frame);
        }
        handle_key(&mut app, key(KeyCode::Enter, KeyModifiers::NONE), &dispatcher, frame);

        assert!(app.rename.is_none());
        assert_eq!(app.chats.selected_chat().name, "ideas");
        assert!(app.input_text().is_empty());
    }

    #[tokio::test]
    async fn scrolling_up_disables_auto_scroll_and_bottom_reengages_it() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(&dir);
        let frame = Rect::new(0, 0, 80, 24);

        scroll_up(&mut app, 2);
        assert!(!app.auto_scroll);

        scroll_down(&mut app, 5, frame);
        assert!(app.auto_scroll);
    }
}
