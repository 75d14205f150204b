use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

use super::{format_date, truncate};
use crate::tui::App;

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let title = if app.filter_input.is_empty() {
        format!(" Sessions ({}) ", app.sessions.items.len())
    } else {
        format!(
            " Sessions ({}, search: {}) ",
            app.sessions.items.len(),
            app.filter_input
        )
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_style(Style::default().fg(Color::Cyan));

    if app.sessions.items.is_empty() {
        let empty = Paragraph::new(Line::from(Span::styled(
            "No sessions yet. Start chatting!",
            Style::default().fg(Color::DarkGray),
        )))
        .block(block);
        f.render_widget(empty, area);
        return;
    }

    let current = app.study.session_id();
    let items: Vec<ListItem> = app
        .sessions
        .items
        .iter()
        .map(|s| {
            let marker = if s.session.id == current { "● " } else { "  " };
            ListItem::new(Line::from(vec![
                Span::styled(marker, Style::default().fg(Color::Green)),
                Span::styled(
                    format!("{:<44}", truncate(&s.title, 43)),
                    Style::default().fg(Color::White),
                ),
                Span::styled(
                    format!("{:<14}", format_date(&s.session.started_at)),
                    Style::default().fg(Color::Gray),
                ),
                Span::styled(
                    format!("{} msgs", s.session.message_count),
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select(app.sessions.selected);

    f.render_stateful_widget(list, area, &mut state);
}
