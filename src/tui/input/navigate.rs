use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::tui::app::{App, ConfirmAction, EditRequest, Mode};

use super::search::{begin_search, search_step};

pub(super) fn handle_navigate(app: &mut App, key: KeyEvent) {
    app.message = None;
    match (key.modifiers, key.code) {
        (KeyModifiers::NONE, KeyCode::Char('j') | KeyCode::Down) => move_cursor(app, 1),
        (KeyModifiers::NONE, KeyCode::Char('k') | KeyCode::Up) => move_cursor(app, -1),
        (KeyModifiers::NONE, KeyCode::Char('g') | KeyCode::Home) => jump_to_first(app),
        (KeyModifiers::NONE, KeyCode::Char('G') | KeyCode::End) => jump_to_last(app),
        (KeyModifiers::CONTROL, KeyCode::Char('d')) | (_, KeyCode::PageDown) => {
            page(app, true)
        }
        (KeyModifiers::CONTROL, KeyCode::Char('u')) | (_, KeyCode::PageUp) => page(app, false),

        (KeyModifiers::NONE, KeyCode::Char('e') | KeyCode::Enter) => {
            if let Some(id) = app.cursor_task() {
                app.pending_edit = Some(EditRequest::Edit(id));
            }
        }
        (KeyModifiers::NONE, KeyCode::Char('a')) => {
            app.pending_edit = Some(match app.cursor_task() {
                Some(id) => EditRequest::AddSibling(id),
                None => EditRequest::AddInCategory(app.cursor_category().unwrap_or_default()),
            });
        }
        (KeyModifiers::NONE, KeyCode::Char('A')) => {
            if let Some(id) = app.cursor_task() {
                app.pending_edit = Some(EditRequest::AddChild(id));
            }
        }
        (KeyModifiers::NONE, KeyCode::Char('c')) => complete_at_cursor(app),
        (KeyModifiers::NONE, KeyCode::Char('d')) => {
            if let Some(id) = app.cursor_task() {
                app.mode = Mode::Confirm(ConfirmAction::Delete(id));
            }
        }

        (KeyModifiers::NONE, KeyCode::Char('/')) => begin_search(app),
        (KeyModifiers::NONE, KeyCode::Char('n')) => search_step(app, true),
        (KeyModifiers::NONE, KeyCode::Char('N')) => search_step(app, false),

        (KeyModifiers::NONE, KeyCode::Char('s')) => app.save(),
        (KeyModifiers::NONE, KeyCode::Char('r')) => {
            if app.list.dirty_count() > 0 {
                app.mode = Mode::Confirm(ConfirmAction::Reload);
            } else {
                app.reload();
            }
        }
        (KeyModifiers::NONE, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
            if app.list.dirty_count() > 0 {
                app.mode = Mode::Confirm(ConfirmAction::Quit);
            } else {
                app.should_quit = true;
            }
        }
        _ => {}
    }
}

/// Move `steps` task lines up or down, stopping at either end
fn move_cursor(app: &mut App, steps: isize) {
    let tasks: Vec<usize> = app.screen.task_lines().map(|(n, _)| n).collect();
    if tasks.is_empty() {
        return;
    }
    let here = tasks
        .iter()
        .position(|&n| n >= app.cursor)
        .unwrap_or(tasks.len() - 1);
    // Off a task line, the first step down lands on the next task
    let steps = if steps > 0 && tasks[here] != app.cursor {
        steps - 1
    } else {
        steps
    };
    let target = here.saturating_add_signed(steps).min(tasks.len() - 1);
    app.cursor = tasks[target];
}

fn jump_to_first(app: &mut App) {
    if let Some(line) = app.screen.first_task_line() {
        app.cursor = line;
    }
}

fn jump_to_last(app: &mut App) {
    if let Some((line, _)) = app.screen.task_lines().last() {
        app.cursor = line;
    }
}

/// Half a screen down or up, landing on the nearest task line in that
/// direction
fn page(app: &mut App, down: bool) {
    let half = (app.list_height / 2).max(1);
    let target = if down {
        app.cursor.saturating_add(half)
    } else {
        app.cursor.saturating_sub(half)
    };
    let mut tasks = app.screen.task_lines().map(|(n, _)| n);
    let landed = if down {
        tasks.find(|&n| n >= target).or_else(|| app.screen.task_lines().last().map(|(n, _)| n))
    } else {
        tasks
            .filter(|&n| n <= target)
            .last()
            .or_else(|| app.screen.first_task_line())
    };
    if let Some(line) = landed {
        app.cursor = line;
    }
}

fn complete_at_cursor(app: &mut App) {
    let Some(id) = app.cursor_task() else {
        return;
    };
    match app.list.mark_complete(id) {
        Ok(count) => {
            app.message = Some(format!("completed {} task(s)", count));
            app.refresh(None);
        }
        Err(e) => app.message = Some(e.to_string()),
    }
}
