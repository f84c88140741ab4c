use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crate::app::App;
use crate::tui::AppEvent;

const PAGE: u16 = 10;

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Paste(text) => app.insert_str(&text),
        AppEvent::Resize => {
            if app.follow_bottom {
                app.scroll_to_bottom();
            }
        }
        AppEvent::Tick => {
            app.tick_animation();
            app.poll_turn().await;
        }
        AppEvent::Conversation(snapshot) => {
            app.apply_snapshot(snapshot);
            app.poll_turn().await;
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    // Pending clear confirmation swallows the next key
    if app.confirm_clear {
        let confirmed = matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) && !ctrl;
        app.answer_clear(confirmed);
        return;
    }

    match key.code {
        // Global keys
        KeyCode::Char('c') if ctrl => app.should_quit = true,
        KeyCode::Esc => app.should_quit = true,
        KeyCode::Char('l') if ctrl => app.request_clear(),

        // Send
        KeyCode::Enter => app.submit(),
        KeyCode::Tab => app.cycle_suggestion(),

        // Chat scrolling
        KeyCode::PageUp => app.scroll_up(PAGE),
        KeyCode::PageDown => app.scroll_down(PAGE),
        KeyCode::Up => app.scroll_up(1),
        KeyCode::Down => app.scroll_down(1),

        // Input editing
        KeyCode::Backspace => app.backspace(),
        KeyCode::Delete => app.delete(),
        KeyCode::Left => app.cursor_left(),
        KeyCode::Right => app.cursor_right(),
        KeyCode::Home => app.cursor_home(),
        KeyCode::End => app.cursor_end(),
        KeyCode::Char('a') if ctrl => app.cursor_home(),
        KeyCode::Char('e') if ctrl => app.cursor_end(),
        KeyCode::Char(_) if ctrl => {}
        KeyCode::Char(c) => {
            app.status = None;
            app.insert_char(c);
        }
        _ => {}
    }
}
