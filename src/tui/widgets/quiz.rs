use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::quiz::{Letter, QuizPhase, QuizState};
use crate::tui::App;

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let Some(quiz) = app.study.quiz() else {
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Body
        ])
        .split(area);

    draw_header(f, quiz, chunks[0]);

    let lines = match quiz.phase() {
        QuizPhase::AwaitingQuestion => vec![Line::from(Span::styled(
            format!("Generating question about {}...", quiz.current_concept().name),
            Style::default().fg(Color::Yellow),
        ))],
        QuizPhase::ShowingQuestion => question_lines(quiz),
        QuizPhase::ShowingAnswer => answer_lines(quiz),
        QuizPhase::AwaitingRating => rating_lines(quiz),
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Quiz ")
        .title_style(Style::default().fg(Color::Cyan));

    f.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
        chunks[1],
    );
}

fn draw_header(f: &mut Frame, quiz: &QuizState, area: Rect) {
    let text = if quiz.phase() == QuizPhase::AwaitingRating {
        "Quiz Complete!".to_string()
    } else {
        format!(
            "Quiz: {} ({} of {})",
            quiz.current_concept().name,
            quiz.current_index() + 1,
            quiz.concepts().len()
        )
    };

    let header = Paragraph::new(Line::from(Span::styled(
        text,
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    )))
    .block(Block::default().borders(Borders::ALL));

    f.render_widget(header, area);
}

fn question_lines(quiz: &QuizState) -> Vec<Line<'static>> {
    let Some(question) = quiz.question() else {
        return Vec::new();
    };

    let mut lines = vec![
        Line::from(Span::styled(
            question.question.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];
    for letter in Letter::ALL {
        lines.push(Line::from(vec![
            Span::styled(
                format!("  {}) ", letter),
                Style::default().fg(Color::Cyan),
            ),
            Span::raw(question.option(letter).to_string()),
        ]));
    }
    lines
}

fn answer_lines(quiz: &QuizState) -> Vec<Line<'static>> {
    let (Some(question), Some(answer)) = (quiz.question(), quiz.user_answer()) else {
        return Vec::new();
    };

    let color = if question.is_correct(answer) {
        Color::Green
    } else {
        Color::Red
    };

    let mut lines: Vec<Line> = question
        .feedback(answer)
        .lines()
        .enumerate()
        .map(|(i, l)| {
            if i == 0 {
                Line::from(Span::styled(
                    l.to_string(),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ))
            } else {
                Line::from(l.to_string())
            }
        })
        .collect();

    lines.push(Line::from(""));
    let next = if quiz.is_last() {
        "Press Enter to finish"
    } else {
        "Press n for the next question, e to end the quiz"
    };
    lines.push(Line::from(Span::styled(next, Style::default().fg(Color::DarkGray))));
    lines
}

fn rating_lines(quiz: &QuizState) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    let (correct, answered) = quiz.score();
    if answered > 0 {
        lines.push(Line::from(Span::styled(
            format!("Score: {} / {}", correct, answered),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(""));
    }

    let names: Vec<&str> = quiz.concepts().iter().map(|c| c.name.as_str()).collect();
    lines.push(Line::from("Rate your understanding:"));
    lines.push(Line::from(Span::styled(
        format!("Concepts: {}", names.join(", ")),
        Style::default().fg(Color::DarkGray),
    )));
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("  [1] Still fuzzy", Style::default().fg(Color::Red)),
        Span::styled("   [3] Getting it", Style::default().fg(Color::Yellow)),
        Span::styled("   [5] Got it!", Style::default().fg(Color::Green)),
    ]));
    lines
}
