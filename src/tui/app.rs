use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use regex::Regex;
use tracing::{info, warn};

use crate::io::config_io::LoadedConfig;
use crate::io::editor::{EditOutcome, edit_record, resolve_editor};
use crate::io::state::{ListUiState, read_ui_state, write_ui_state};
use crate::model::{NodeId, Record, STATUS_OPEN};
use crate::ops::list::TaskList;
use crate::ops::screen::{LineItem, Screen};
use crate::ops::sync::Store;

use super::input;
use super::render;
use super::theme::Theme;

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Current interaction mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Navigate,
    /// Typing a search pattern
    Search,
    /// Waiting for y/n on a destructive action
    Confirm(ConfirmAction),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmAction {
    /// Quit with unsaved changes
    Quit,
    /// Reload from the backend, dropping unsaved changes
    Reload,
    /// Delete a task and its subtasks
    Delete(NodeId),
}

/// Work that needs the terminal handed over to an external editor.
/// Key handlers queue it; the event loop runs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditRequest {
    /// Edit an existing task
    Edit(NodeId),
    /// New top-level task in a category
    AddInCategory(String),
    /// New task next to an existing one (same parent and category)
    AddSibling(NodeId),
    /// New subtask
    AddChild(NodeId),
}

/// Main application state
pub struct App {
    pub list: TaskList,
    pub screen: Screen,
    /// Cursor line in `screen`
    pub cursor: usize,
    pub store: Store,
    pub mode: Mode,
    pub theme: Theme,
    pub editor: String,
    pub should_quit: bool,
    /// One-shot message for the status row
    pub message: Option<String>,
    /// Search mode: pattern being typed
    pub search_input: String,
    /// Last executed search pattern
    pub last_search: Option<String>,
    /// Queued editor work
    pub pending_edit: Option<EditRequest>,
    /// Rows available for list lines, set on each render
    pub list_height: usize,
}

impl App {
    pub fn new(list: TaskList, store: Store, theme: Theme, editor: String) -> Self {
        let screen = Screen::project(&list);
        let cursor = screen.first_task_line().unwrap_or(0);
        App {
            list,
            screen,
            cursor,
            store,
            mode: Mode::Navigate,
            theme,
            editor,
            should_quit: false,
            message: None,
            search_input: String::new(),
            last_search: None,
            pending_edit: None,
            list_height: 0,
        }
    }

    /// Task under the cursor, if the cursor is on a task line
    pub fn cursor_task(&self) -> Option<NodeId> {
        self.screen.line_at(self.cursor).and_then(|line| line.task())
    }

    /// Category of the cursor line. On a blank line this is the category
    /// below it.
    pub fn cursor_category(&self) -> Option<String> {
        let lines = self.screen.lines();
        let here = lines.get(self.cursor)?;
        match &here.item {
            LineItem::Category(name) => Some(name.clone()),
            LineItem::Task(id) => Some(self.list[*id].category().to_string()),
            LineItem::Blank => lines[self.cursor..].iter().find_map(|line| match &line.item {
                LineItem::Category(name) => Some(name.clone()),
                _ => None,
            }),
        }
    }

    /// Regenerate screen lines after a mutation and put the cursor back on
    /// `focus` when it is still visible. Otherwise the cursor stays on the
    /// same line number, clamped to the new screen.
    pub fn refresh(&mut self, focus: Option<NodeId>) {
        self.screen.rebuild(&self.list);
        if let Some(line) = focus.and_then(|id| self.screen.find_task(id)) {
            self.cursor = line;
            return;
        }
        self.cursor = self.cursor.min(self.screen.len().saturating_sub(1));
        if self.cursor_task().is_none() {
            self.cursor = self.nearest_task_line(self.cursor).unwrap_or(0);
        }
    }

    fn nearest_task_line(&self, from: usize) -> Option<usize> {
        let lines = self.screen.lines();
        let after = lines[from.min(lines.len())..]
            .iter()
            .find(|l| l.task().is_some());
        let before = lines[..from.min(lines.len())]
            .iter()
            .rev()
            .find(|l| l.task().is_some());
        after.or(before).map(|l| l.number)
    }

    /// Compiled search regex for highlighting: the pattern being typed in
    /// search mode, otherwise the last executed one
    pub fn active_search_re(&self) -> Option<Regex> {
        let pattern = match self.mode {
            Mode::Search if !self.search_input.is_empty() => &self.search_input,
            Mode::Search => return None,
            _ => self.last_search.as_deref()?,
        };
        compile_search(pattern)
    }

    pub fn save(&mut self) {
        let focus_id = self.cursor_task().map(|id| self.list[id].id().to_string());
        match self.store.save(&mut self.list) {
            Ok(summary) if summary.total() == 0 => {
                self.message = Some("nothing to save".into());
            }
            Ok(summary) => {
                self.message = Some(format!("saved {} change(s)", summary.total()));
            }
            Err(e) => {
                self.message = Some(format!("save failed: {}", e));
                return;
            }
        }
        // Purging invalidates node handles; find the cursor task by id
        let focus = focus_id.and_then(|id| self.list.find_by_id(&id));
        self.refresh(focus);
    }

    /// Replace the list with a fresh load from the backend. Pending changes
    /// go to the recovery log first.
    pub fn reload(&mut self) {
        if self.list.dirty_count() > 0 {
            self.store.discard(&self.list, "reload");
        }
        match self.store.load() {
            Ok((list, report)) => {
                self.list = list;
                self.message = Some(if report.skipped.is_empty() {
                    format!("reloaded {} task(s)", report.loaded)
                } else {
                    format!(
                        "reloaded {} task(s), skipped {}",
                        report.loaded,
                        report.skipped.len()
                    )
                });
            }
            Err(e) => self.message = Some(format!("reload failed: {}", e)),
        }
        self.refresh(None);
    }

    /// Quit, logging unsaved changes to the recovery log
    pub fn quit_discarding(&mut self) {
        if self.list.dirty_count() > 0 {
            self.store.discard(&self.list, "quit");
            info!(pending = self.list.dirty_count(), "quit with unsaved changes");
        }
        self.should_quit = true;
    }

    /// Starting record for a new task
    pub fn new_task_record(&self, parent_id: &str, category: &str) -> Record {
        let mut record = Record::new()
            .with("id", &self.list.next_id().to_string())
            .with("parent_id", parent_id)
            .with("category", category)
            .with("name", "")
            .with("status", STATUS_OPEN);
        for key in self.list.keys() {
            if !record.contains(key) {
                record.set(key, "");
            }
        }
        record
    }

    /// The record an edit request starts from, or None when its task is gone
    pub fn edit_template(&self, request: &EditRequest) -> Option<Record> {
        match request {
            EditRequest::Edit(id) => self.list.node(*id).map(|n| n.record.clone()),
            EditRequest::AddInCategory(category) => Some(self.new_task_record("", category)),
            EditRequest::AddSibling(id) => {
                let node = self.list.node(*id)?;
                Some(self.new_task_record(node.parent_id(), node.category()))
            }
            EditRequest::AddChild(id) => {
                let node = self.list.node(*id)?;
                Some(self.new_task_record(node.id(), node.category()))
            }
        }
    }

    /// Apply the outcome of an editor session
    pub fn apply_edit(&mut self, request: &EditRequest, outcome: EditOutcome) {
        let adding = !matches!(request, EditRequest::Edit(_));
        let record = match outcome {
            EditOutcome::Unmodified => {
                let text = if adding { "add cancelled" } else { "no changes" };
                self.message = Some(text.to_string());
                return;
            }
            EditOutcome::Modified(record) => record,
        };
        if adding && record.value("name").trim().is_empty() {
            self.message = Some("add cancelled: empty name".into());
            return;
        }
        let id = record.value("id").to_string();
        match self.list.upsert(record) {
            Ok(result) => {
                let verb = if adding { "added" } else { "updated" };
                self.message = Some(format!("{} {}", verb, id));
                self.refresh(Some(result.node()));
            }
            Err(e) => {
                warn!(id = %id, error = %e, "edit rejected");
                self.message = Some(format!("rejected: {}", e));
            }
        }
    }

    fn ui_state(&self) -> ListUiState {
        ListUiState {
            cursor: self.cursor,
            offset: self.screen.offset(),
            last_search: self.last_search.clone(),
        }
    }

    fn restore(&mut self, state: &ListUiState) {
        self.screen.set_offset(state.offset);
        self.last_search = state.last_search.clone();
        self.cursor = state.cursor;
        self.refresh(None);
    }
}

/// Case-insensitive regex, falling back to a literal match when the
/// pattern does not compile
pub fn compile_search(pattern: &str) -> Option<Regex> {
    Regex::new(&format!("(?i){}", pattern))
        .or_else(|_| Regex::new(&format!("(?i){}", regex::escape(pattern))))
        .ok()
}

fn restore_ui_state(app: &mut App, loaded: &LoadedConfig) {
    let Some(state) = read_ui_state(&loaded.state_dir) else {
        return;
    };
    if let Some(list_state) = state.lists.get(app.list.name()) {
        app.restore(list_state);
    }
}

fn save_ui_state(app: &App, loaded: &LoadedConfig) {
    let mut state = read_ui_state(&loaded.state_dir).unwrap_or_default();
    state
        .lists
        .insert(app.list.name().to_string(), app.ui_state());
    if let Err(e) = write_ui_state(&loaded.state_dir, &state) {
        warn!(error = %e, "could not write ui state");
    }
}

/// Run the TUI application
pub fn run(loaded: &LoadedConfig) -> AppResult<()> {
    let mut store = Store::open(loaded, false)?;
    let (list, report) = store.load()?;

    let theme = Theme::from_config(&loaded.config.ui);
    let editor = resolve_editor(loaded.config.ui.editor.as_deref());
    let mut app = App::new(list, store, theme, editor);
    restore_ui_state(&mut app, loaded);
    if !report.skipped.is_empty() {
        app.message = Some(format!(
            "skipped {} invalid task(s), see log",
            report.skipped.len()
        ));
    }

    let mut terminal = enter_terminal()?;

    // Restore the terminal on panic
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));

    let result = run_event_loop(&mut terminal, &mut app);

    save_ui_state(&app, loaded);
    leave_terminal(&mut terminal)?;

    result
}

type Term = Terminal<CrosstermBackend<io::Stdout>>;

fn enter_terminal() -> AppResult<Term> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    terminal.clear()?;
    Ok(terminal)
}

fn leave_terminal(terminal: &mut Term) -> AppResult<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Hand the terminal to the editor for one queued request
fn run_pending_edit(terminal: &mut Term, app: &mut App, request: EditRequest) -> AppResult<()> {
    let Some(template) = app.edit_template(&request) else {
        return Ok(());
    };
    leave_terminal(terminal)?;
    let outcome = edit_record(&template, &app.editor);
    enable_raw_mode()?;
    execute!(terminal.backend_mut(), EnterAlternateScreen)?;
    terminal.clear()?;

    match outcome {
        Ok(outcome) => app.apply_edit(&request, outcome),
        Err(e) => {
            warn!(error = %e, "edit failed");
            app.message = Some(format!("edit failed: {}", e));
        }
    }
    Ok(())
}

fn run_event_loop(terminal: &mut Term, app: &mut App) -> AppResult<()> {
    loop {
        terminal.draw(|frame| render::render(frame, app))?;

        if event::poll(Duration::from_millis(250))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    input::handle_key(app, key);
                }
            }
        }

        if let Some(request) = app.pending_edit.take() {
            run_pending_edit(terminal, app, request)?;
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}
