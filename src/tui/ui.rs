use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs},
    Frame,
};

use super::widgets::{chat, progress, sessions};
use super::{App, View};
use crate::quiz::QuizPhase;

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Tab bar
            Constraint::Min(0),    // Content
            Constraint::Length(1), // Status line
            Constraint::Length(1), // Help bar
        ])
        .split(f.area());

    draw_tabs(f, app, chunks[0]);
    draw_content(f, app, chunks[1]);
    draw_status(f, app, chunks[2]);
    draw_help_bar(f, app, chunks[3]);
}

fn draw_tabs(f: &mut Frame, app: &App, area: Rect) {
    let tab_titles = vec!["Chat", "Sessions", "Progress"];
    let selected = match app.view {
        View::Chat => 0,
        View::Sessions => 1,
        View::Progress => 2,
    };

    let budget = app.study.budget();
    let title = format!(
        " CyberBud | session {} | {} of {} messages left ",
        app.study.session_id(),
        budget.remaining(),
        budget.cap()
    );

    let tabs = Tabs::new(tab_titles)
        .block(Block::default().borders(Borders::ALL).title(title))
        .select(selected)
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

    f.render_widget(tabs, area);
}

fn draw_content(f: &mut Frame, app: &App, area: Rect) {
    match app.view {
        View::Chat => chat::draw(f, app, area),
        View::Sessions => sessions::draw(f, app, area),
        View::Progress => progress::draw(f, app, area),
    }
}

fn draw_status(f: &mut Frame, app: &App, area: Rect) {
    let line = if let Some(status) = app.pending_status() {
        Line::from(Span::styled(status, Style::default().fg(Color::Yellow)))
    } else if app.confirm_reset {
        Line::from(vec![
            Span::styled(
                "Delete ALL sessions, messages and concepts? ",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ),
            Span::styled("y", Style::default().fg(Color::Cyan)),
            Span::raw(" Confirm  "),
            Span::styled("any key", Style::default().fg(Color::Cyan)),
            Span::raw(" Cancel"),
        ])
    } else if let Some(notice) = app.current_notice() {
        Line::from(Span::styled(notice, Style::default().fg(Color::LightRed)))
    } else {
        Line::from("")
    };

    f.render_widget(Paragraph::new(line), area);
}

fn draw_help_bar(f: &mut Frame, app: &App, area: Rect) {
    let help_text = if app.filter_mode {
        vec![
            Span::styled("/", Style::default().fg(Color::Yellow)),
            Span::raw(&app.filter_input),
            Span::styled("█", Style::default().fg(Color::Yellow)),
            Span::raw(" | "),
            Span::styled("<CR>", Style::default().fg(Color::Cyan)),
            Span::raw(" Apply  "),
            Span::styled("<Esc>", Style::default().fg(Color::Cyan)),
            Span::raw(" Cancel"),
        ]
    } else if app.editing {
        vec![
            Span::styled("<CR>", Style::default().fg(Color::Cyan)),
            Span::raw(" Send  "),
            Span::styled("<Esc>", Style::default().fg(Color::Cyan)),
            Span::raw(" Stop typing"),
        ]
    } else {
        let mut spans = vec![
            Span::styled("Tab", Style::default().fg(Color::Cyan)),
            Span::raw(" Views  "),
        ];

        match (app.view, app.study.quiz().map(|q| q.phase())) {
            (View::Chat, Some(QuizPhase::ShowingQuestion)) => {
                spans.extend(vec![
                    Span::styled("a-d", Style::default().fg(Color::Cyan)),
                    Span::raw(" Answer  "),
                    Span::styled("<Esc>", Style::default().fg(Color::Cyan)),
                    Span::raw(" Cancel quiz  "),
                ]);
            }
            (View::Chat, Some(QuizPhase::ShowingAnswer)) => {
                spans.extend(vec![
                    Span::styled("n/<CR>", Style::default().fg(Color::Cyan)),
                    Span::raw(" Next  "),
                    Span::styled("e", Style::default().fg(Color::Cyan)),
                    Span::raw(" End quiz  "),
                ]);
            }
            (View::Chat, Some(QuizPhase::AwaitingRating)) => {
                spans.extend(vec![
                    Span::styled("1", Style::default().fg(Color::Cyan)),
                    Span::raw(" Still fuzzy  "),
                    Span::styled("3", Style::default().fg(Color::Cyan)),
                    Span::raw(" Getting it  "),
                    Span::styled("5", Style::default().fg(Color::Cyan)),
                    Span::raw(" Got it!  "),
                ]);
            }
            (View::Chat, _) => {
                spans.extend(vec![
                    Span::styled("i/<CR>", Style::default().fg(Color::Cyan)),
                    Span::raw(" Type  "),
                    Span::styled("j/k", Style::default().fg(Color::Cyan)),
                    Span::raw(" Scroll  "),
                    Span::styled("n", Style::default().fg(Color::Cyan)),
                    Span::raw(" New session  "),
                ]);
            }
            (View::Sessions, _) => {
                spans.extend(vec![
                    Span::styled("j/k", Style::default().fg(Color::Cyan)),
                    Span::raw(" Nav  "),
                    Span::styled("l/<CR>", Style::default().fg(Color::Cyan)),
                    Span::raw(" Load  "),
                    Span::styled("d", Style::default().fg(Color::Cyan)),
                    Span::raw(" Delete  "),
                    Span::styled("n", Style::default().fg(Color::Cyan)),
                    Span::raw(" New  "),
                    Span::styled("/", Style::default().fg(Color::Cyan)),
                    Span::raw(" Search  "),
                ]);
            }
            (View::Progress, _) => {
                spans.extend(vec![
                    Span::styled("j/k", Style::default().fg(Color::Cyan)),
                    Span::raw(" Nav  "),
                    Span::styled("a/<CR>", Style::default().fg(Color::Cyan)),
                    Span::raw(" Ask about  "),
                    Span::styled("s", Style::default().fg(Color::Cyan)),
                    Span::raw(" Quiz me  "),
                    Span::styled("R", Style::default().fg(Color::Cyan)),
                    Span::raw(" Reset all  "),
                ]);
            }
        }

        spans.extend(vec![
            Span::styled("q", Style::default().fg(Color::Cyan)),
            Span::raw(" Quit"),
        ]);

        spans
    };

    let help = Paragraph::new(Line::from(help_text)).style(Style::default().bg(Color::DarkGray));

    f.render_widget(help, area);
}
