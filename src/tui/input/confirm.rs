use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::model::NodeId;
use crate::tui::app::{App, ConfirmAction, Mode};

pub(super) fn handle_confirm(app: &mut App, key: KeyEvent) {
    let Mode::Confirm(action) = app.mode.clone() else {
        return;
    };
    match (key.modifiers, key.code) {
        (KeyModifiers::NONE, KeyCode::Char('y')) => {
            app.mode = Mode::Navigate;
            match action {
                ConfirmAction::Quit => app.quit_discarding(),
                ConfirmAction::Reload => app.reload(),
                ConfirmAction::Delete(id) => confirm_delete(app, id),
            }
        }
        // Save first, then quit
        (KeyModifiers::NONE, KeyCode::Char('s')) if action == ConfirmAction::Quit => {
            app.mode = Mode::Navigate;
            app.save();
            if app.list.dirty_count() == 0 {
                app.should_quit = true;
            }
        }
        (KeyModifiers::NONE, KeyCode::Char('n')) | (_, KeyCode::Esc) => {
            app.mode = Mode::Navigate;
        }
        _ => {}
    }
}

fn confirm_delete(app: &mut App, id: NodeId) {
    match app.list.mark_delete(id) {
        Ok(count) => {
            app.message = Some(format!("deleted {} task(s), unsaved", count));
            app.refresh(None);
        }
        Err(e) => app.message = Some(e.to_string()),
    }
}
