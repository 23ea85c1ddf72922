use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use crate::tui::app::App;
use crate::util::unicode::{display_width, truncate_to_width};

use super::right_align_padding;

/// List name on the left, unsaved change count on the right
pub fn render_title_row(frame: &mut Frame, app: &App, area: Rect) {
    let bg = app.theme.background;
    let width = area.width as usize;

    let name = truncate_to_width(app.list.name(), width);
    let mut spans = vec![Span::styled(
        name.clone(),
        Style::default()
            .fg(app.theme.highlight)
            .bg(bg)
            .add_modifier(Modifier::BOLD),
    )];

    let dirty = app.list.dirty_count();
    if dirty > 0 {
        let right = format!("{} unsaved", dirty);
        if let Some(padding) = right_align_padding(display_width(&name), &right, width) {
            spans.push(Span::styled(padding, Style::default().bg(bg)));
            spans.push(Span::styled(right, Style::default().fg(app.theme.red).bg(bg)));
        }
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(bg));
    frame.render_widget(paragraph, area);
}
