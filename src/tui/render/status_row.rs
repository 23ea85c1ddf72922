use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use crate::tui::app::{App, ConfirmAction, Mode};
use crate::util::unicode::display_width;

use super::right_align_padding;

/// Render the status row (bottom of screen)
pub fn render_status_row(frame: &mut Frame, app: &App, area: Rect) {
    let bg = app.theme.background;
    let width = area.width as usize;

    let line = match &app.mode {
        Mode::Navigate => {
            if let Some(message) = &app.message {
                Line::from(Span::styled(
                    message.clone(),
                    Style::default().fg(app.theme.text_bright).bg(bg),
                ))
            } else if let Some(pattern) = &app.last_search {
                let text = format!("/{}", pattern);
                let mut spans = vec![Span::styled(
                    text.clone(),
                    Style::default().fg(app.theme.dim).bg(bg),
                )];
                let hint = "n/N next/prev";
                if let Some(padding) = right_align_padding(display_width(&text), hint, width) {
                    spans.push(Span::styled(padding, Style::default().bg(bg)));
                    spans.push(Span::styled(hint, Style::default().fg(app.theme.dim).bg(bg)));
                }
                Line::from(spans)
            } else {
                Line::default()
            }
        }
        Mode::Search => {
            // Search prompt: /pattern▌
            let text = format!("/{}", app.search_input);
            let mut spans = vec![
                Span::styled(
                    text.clone(),
                    Style::default().fg(app.theme.text_bright).bg(bg),
                ),
                Span::styled("\u{258C}", Style::default().fg(app.theme.highlight).bg(bg)),
            ];
            let hint = "Enter search  Esc cancel";
            if let Some(padding) = right_align_padding(display_width(&text) + 1, hint, width) {
                spans.push(Span::styled(padding, Style::default().bg(bg)));
                spans.push(Span::styled(hint, Style::default().fg(app.theme.dim).bg(bg)));
            }
            Line::from(spans)
        }
        Mode::Confirm(action) => {
            let prompt = match action {
                ConfirmAction::Quit => "quit without saving? y/n, s to save".to_string(),
                ConfirmAction::Reload => "drop unsaved changes and reload? y/n".to_string(),
                ConfirmAction::Delete(id) => {
                    let task_id = app.list.node(*id).map_or("", |n| n.id());
                    format!("delete {} and its subtasks? y/n", task_id)
                }
            };
            Line::from(Span::styled(
                prompt,
                Style::default().fg(app.theme.red).bg(bg),
            ))
        }
    };

    let paragraph = Paragraph::new(line).style(Style::default().bg(bg));
    frame.render_widget(paragraph, area);
}
