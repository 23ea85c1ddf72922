use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use regex::Regex;

use crate::model::NodeId;
use crate::ops::screen::{Line as ScreenLine, LineItem};
use crate::tui::app::App;
use crate::util::unicode::{display_width, truncate_to_width};

use super::push_highlighted_spans;

/// Render the visible window of the screen. Scrolls first so the cursor
/// line is on screen.
pub fn render_list_view(frame: &mut Frame, app: &mut App, area: Rect) {
    let height = area.height as usize;
    app.list_height = height;
    app.screen.follow(app.cursor, height);

    let bg = app.theme.background;
    let search_re = app.active_search_re();

    let mut lines: Vec<Line> = app
        .screen
        .visible(height)
        .iter()
        .map(|line| render_line(app, line, area.width as usize, search_re.as_ref()))
        .collect();

    if app.screen.is_empty() {
        lines.push(Line::from(Span::styled(
            " No open tasks. Press a to add one.",
            Style::default().fg(app.theme.dim).bg(bg),
        )));
    }

    let paragraph = Paragraph::new(lines).style(Style::default().bg(bg));
    frame.render_widget(paragraph, area);
}

fn render_line<'a>(
    app: &App,
    line: &ScreenLine,
    width: usize,
    search_re: Option<&Regex>,
) -> Line<'a> {
    match &line.item {
        LineItem::Blank => Line::from(""),
        LineItem::Category(name) => render_category(app, line, name),
        LineItem::Task(id) => render_task(app, line, *id, width, search_re),
    }
}

fn render_category<'a>(app: &App, line: &ScreenLine, name: &str) -> Line<'a> {
    let bg = if line.number == app.cursor {
        app.theme.selection_bg
    } else {
        app.theme.background
    };
    let (open, total) = app
        .list
        .category(name)
        .map_or((0, 0), |c| (c.open_count, c.task_count));
    Line::from(vec![
        Span::styled(" ", Style::default().bg(bg)),
        Span::styled(
            name.to_string(),
            Style::default()
                .fg(app.theme.category)
                .bg(bg)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(" {}/{}", open, total),
            Style::default().fg(app.theme.dim).bg(bg),
        ),
    ])
}

/// " " + two cells per level below the top + id + two spaces + name
fn render_task<'a>(
    app: &App,
    line: &ScreenLine,
    id: NodeId,
    width: usize,
    search_re: Option<&Regex>,
) -> Line<'a> {
    let node = &app.list[id];
    let is_cursor = line.number == app.cursor;
    let bg = if is_cursor {
        app.theme.selection_bg
    } else {
        app.theme.background
    };

    let prefix = format!(" {}", "  ".repeat(line.level.saturating_sub(1)));
    let id_text = node.id().to_string();
    let id_style = if is_cursor {
        Style::default()
            .fg(app.theme.selection_id)
            .bg(bg)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(app.theme.dim).bg(bg)
    };
    let name_style = Style::default()
        .fg(if is_cursor {
            app.theme.text_bright
        } else {
            app.theme.text
        })
        .bg(bg);
    let match_style = Style::default()
        .fg(app.theme.search_match_fg)
        .bg(app.theme.search_match_bg);

    let used = display_width(&prefix) + display_width(&id_text) + 2;
    let name = truncate_to_width(node.name(), width.saturating_sub(used));

    let mut spans = vec![
        Span::styled(prefix, Style::default().bg(bg)),
        Span::styled(id_text, id_style),
        Span::styled("  ", Style::default().bg(bg)),
    ];
    push_highlighted_spans(&mut spans, &name, name_style, match_style, search_re);

    if is_cursor {
        let filled = used + display_width(&name);
        if filled < width {
            spans.push(Span::styled(
                " ".repeat(width - filled),
                Style::default().bg(bg),
            ));
        }
    }
    Line::from(spans)
}
