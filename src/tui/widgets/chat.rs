use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use super::quiz;
use crate::models::Role;
use crate::tui::App;

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    if app.study.in_quiz() {
        quiz::draw(f, app, area);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),    // Transcript
            Constraint::Length(3), // Input
        ])
        .split(area);

    draw_transcript(f, app, chunks[0]);
    draw_input(f, app, chunks[1]);
}

fn draw_transcript(f: &mut Frame, app: &App, area: Rect) {
    let transcript = app.study.transcript();

    let mut lines: Vec<Line> = Vec::new();
    if transcript.is_empty() {
        lines.push(Line::from(Span::styled(
            "Ask me anything about cybersecurity!",
            Style::default().fg(Color::DarkGray),
        )));
    }

    for msg in transcript {
        let (label, color) = match msg.role {
            Role::User => ("You", Color::Cyan),
            Role::Assistant => ("CyberBud", Color::Green),
        };
        lines.push(Line::from(Span::styled(
            label,
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )));
        for text_line in msg.content.lines() {
            lines.push(Line::from(text_line.to_string()));
        }
        lines.push(Line::from(""));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Chat ")
        .title_style(Style::default().fg(Color::Cyan));

    // Stick to the bottom; chat_scroll counts lines back from there.
    let inner_width = area.width.saturating_sub(2).max(1) as usize;
    let inner_height = area.height.saturating_sub(2) as usize;
    let total: usize = lines
        .iter()
        .map(|l| wrapped_height(l.width(), inner_width))
        .sum();
    let bottom = total.saturating_sub(inner_height);
    let offset = bottom.saturating_sub(app.chat_scroll as usize);

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((offset.min(u16::MAX as usize) as u16, 0));

    f.render_widget(paragraph, area);
}

fn draw_input(f: &mut Frame, app: &App, area: Rect) {
    let budget = app.study.budget();

    let (text, style) = if budget.is_exhausted() {
        (
            "Message limit reached".to_string(),
            Style::default().fg(Color::DarkGray),
        )
    } else if app.editing {
        (format!("{}█", app.input), Style::default().fg(Color::White))
    } else if app.input.is_empty() {
        (
            "What would you like to learn about?".to_string(),
            Style::default().fg(Color::DarkGray),
        )
    } else {
        (app.input.clone(), Style::default().fg(Color::Gray))
    };

    let border = if app.editing { Color::Yellow } else { Color::Gray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(" Message ");

    f.render_widget(Paragraph::new(text).style(style).block(block), area);
}

fn wrapped_height(line_width: usize, width: usize) -> usize {
    if line_width == 0 {
        1
    } else {
        line_width.div_ceil(width)
    }
}
