use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::tui::app::{App, Mode, compile_search};

pub(super) fn begin_search(app: &mut App) {
    app.search_input.clear();
    app.mode = Mode::Search;
}

pub(super) fn handle_search(app: &mut App, key: KeyEvent) {
    match (key.modifiers, key.code) {
        (_, KeyCode::Esc) => {
            app.search_input.clear();
            app.mode = Mode::Navigate;
        }
        (_, KeyCode::Enter) => {
            app.mode = Mode::Navigate;
            if app.search_input.is_empty() {
                return;
            }
            app.last_search = Some(std::mem::take(&mut app.search_input));
            execute_search(app, 0, true);
        }
        (_, KeyCode::Backspace) => {
            app.search_input.pop();
        }
        (KeyModifiers::NONE, KeyCode::Char(c)) => app.search_input.push(c),
        _ => {}
    }
}

/// Jump to the next (or previous) task whose name matches the last search
pub(super) fn search_step(app: &mut App, forward: bool) {
    if app.last_search.is_none() {
        app.message = Some("no search".into());
        return;
    }
    execute_search(app, 1, forward);
}

/// Find the first matching task line `skip` lines past the cursor in the
/// given direction, wrapping around the end
fn execute_search(app: &mut App, skip: usize, forward: bool) {
    let Some(pattern) = app.last_search.clone() else {
        return;
    };
    let Some(re) = compile_search(&pattern) else {
        return;
    };
    let matches: Vec<usize> = app
        .screen
        .task_lines()
        .filter(|&(_, id)| re.is_match(app.list[id].name()))
        .map(|(n, _)| n)
        .collect();
    if matches.is_empty() {
        app.message = Some(format!("no match: {}", pattern));
        return;
    }

    let found = if forward {
        let from = app.cursor + skip;
        matches.iter().find(|&&n| n >= from).or(matches.first())
    } else {
        let from = app.cursor.checked_sub(skip);
        from.and_then(|from| matches.iter().rev().find(|&&n| n <= from))
            .or(matches.last())
    };
    if let Some(&line) = found {
        app.cursor = line;
    }
}
