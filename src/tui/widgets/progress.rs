use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

use super::{create_level_bar, level_color, truncate};
use crate::tui::App;

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(8), // Stats + review queue row
            Constraint::Min(0),    // All concepts
        ])
        .split(area);

    let top_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(chunks[0]);

    draw_stats(f, app, top_chunks[0]);
    draw_review_queue(f, app, top_chunks[1]);
    draw_concepts(f, app, chunks[1]);
}

fn draw_stats(f: &mut Frame, app: &App, area: Rect) {
    let stats = &app.stats;
    let remaining = app.study.budget().remaining();

    let text = vec![
        Line::from(vec![
            Span::styled("Concepts: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{}", stats.total_concepts),
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::styled("Needs review: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{}", stats.needs_review),
                Style::default().fg(if stats.needs_review > 0 {
                    Color::Yellow
                } else {
                    Color::White
                }),
            ),
        ]),
        Line::from(vec![
            Span::styled("Messages left: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{}", remaining),
                Style::default().fg(if remaining == 0 { Color::Red } else { Color::White }),
            ),
        ]),
        Line::from(vec![
            Span::styled("Sessions: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{}", stats.total_sessions),
                Style::default().fg(Color::White),
            ),
        ]),
        Line::from(vec![
            Span::styled("Avg understanding: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{:.1}", stats.avg_understanding),
                Style::default().fg(Color::Cyan),
            ),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Progress ")
        .title_style(Style::default().fg(Color::Cyan));

    f.render_widget(Paragraph::new(text).block(block), area);
}

fn draw_review_queue(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = if app.review_queue.is_empty() {
        vec![ListItem::new(Span::styled(
            "Nothing due. Nice!",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        app.review_queue
            .iter()
            .map(|c| {
                ListItem::new(Line::from(vec![
                    Span::styled(
                        format!("{:<28}", truncate(&c.name, 26)),
                        Style::default().fg(Color::White),
                    ),
                    Span::styled(
                        c.level_label(),
                        Style::default().fg(level_color(c.understanding_level)),
                    ),
                ]))
            })
            .collect()
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Review queue ")
        .title_style(Style::default().fg(Color::Yellow));

    f.render_widget(List::new(items).block(block), area);
}

fn draw_concepts(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" All concepts ")
        .title_style(Style::default().fg(Color::Cyan));

    if app.concepts.items.is_empty() {
        let empty = Paragraph::new(Line::from(Span::styled(
            "No concepts yet. Chat about something and they'll show up here.",
            Style::default().fg(Color::DarkGray),
        )))
        .block(block);
        f.render_widget(empty, area);
        return;
    }

    // Category shown on the first concept of each group.
    let mut previous: Option<&str> = None;
    let items: Vec<ListItem> = app
        .concepts
        .items
        .iter()
        .map(|c| {
            let category = c.display_category();
            let heading = if previous == Some(category) {
                String::new()
            } else {
                truncate(category, 20)
            };
            previous = Some(category);

            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<22}", heading),
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!("{:<30}", truncate(&c.name, 28)),
                    Style::default().fg(Color::White),
                ),
                Span::styled(
                    create_level_bar(c.understanding_level),
                    Style::default().fg(level_color(c.understanding_level)),
                ),
                Span::styled(
                    format!(" {:<11}", c.level_label()),
                    Style::default().fg(level_color(c.understanding_level)),
                ),
                Span::styled(
                    format!("{}x", c.times_discussed),
                    Style::default().fg(Color::Gray),
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
    state.select(app.concepts.selected);

    f.render_stateful_widget(list, area, &mut state);
}
