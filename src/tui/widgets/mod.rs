pub mod chat;
pub mod progress;
pub mod quiz;
pub mod sessions;

use ratatui::style::Color;

use crate::models::MAX_UNDERSTANDING;

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

fn format_date(timestamp: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(timestamp) {
        Ok(dt) => dt.format("%b %d %H:%M").to_string(),
        Err(_) => "Unknown".to_string(),
    }
}

fn create_level_bar(level: i32) -> String {
    let filled = level.clamp(0, MAX_UNDERSTANDING) as usize;
    let empty = MAX_UNDERSTANDING as usize - filled;
    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}

fn level_color(level: i32) -> Color {
    match level {
        5 => Color::Magenta,
        4 => Color::Blue,
        3 => Color::Green,
        2 => Color::Yellow,
        _ => Color::Red,
    }
}
