use ratatui::Terminal;
use ratatui::backend::TestBackend;

use crate::tui::app::App;

/// Render the whole app into a `w`x`h` buffer and return plain text (no
/// styles), with trailing spaces and trailing blank rows trimmed.
pub fn render_app(app: &mut App, w: u16, h: u16) -> String {
    let mut terminal = Terminal::new(TestBackend::new(w, h)).unwrap();
    terminal.draw(|frame| super::render(frame, app)).unwrap();

    let buf = terminal.backend().buffer().clone();
    let width = buf.area.width as usize;
    let rows: Vec<String> = buf
        .content
        .chunks(width)
        .map(|row| {
            let s: String = row.iter().map(|cell| cell.symbol()).collect();
            s.trim_end().to_string()
        })
        .collect();

    let end = rows.iter().rposition(|l| !l.is_empty()).map_or(0, |i| i + 1);
    rows[..end].join("\n")
}
