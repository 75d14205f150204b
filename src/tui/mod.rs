mod ui;
mod widgets;

use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::chat::{StudySession, TurnOutcome};
use crate::config::Config;
use crate::db::{Database, Stats};
use crate::error::AppError;
use crate::llm::LlmClient;
use crate::models::{Concept, SessionSummary};
use crate::quiz::{Letter, QuizPhase};

const RECENT_SESSIONS: usize = 20;
const REVIEW_QUEUE_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Chat,
    Sessions,
    Progress,
}

impl View {
    fn next(&self) -> Self {
        match self {
            View::Chat => View::Sessions,
            View::Sessions => View::Progress,
            View::Progress => View::Chat,
        }
    }

    fn prev(&self) -> Self {
        match self {
            View::Chat => View::Progress,
            View::Sessions => View::Chat,
            View::Progress => View::Sessions,
        }
    }
}

/// Slow work queued by a key press and run after the next frame, so the
/// status line is on screen while the LLM call blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    Send(String),
    AskAbout(String),
    LoadQuestion,
}

pub struct StatefulList<T> {
    pub items: Vec<T>,
    pub selected: Option<usize>,
}

impl<T> StatefulList<T> {
    fn with_items(items: Vec<T>) -> Self {
        let selected = if items.is_empty() { None } else { Some(0) };
        Self { items, selected }
    }

    fn next(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.selected {
            Some(i) => {
                if i >= self.items.len() - 1 {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        self.selected = Some(i);
    }

    fn previous(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.selected {
            Some(i) => {
                if i == 0 {
                    self.items.len() - 1
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        self.selected = Some(i);
    }

    fn first(&mut self) {
        if !self.items.is_empty() {
            self.selected = Some(0);
        }
    }

    fn last(&mut self) {
        if !self.items.is_empty() {
            self.selected = Some(self.items.len() - 1);
        }
    }

    fn selected_item(&self) -> Option<&T> {
        self.selected.and_then(|i| self.items.get(i))
    }
}

pub struct App {
    db: Database,
    llm: Box<dyn LlmClient>,
    quiz_batch: usize,
    pub study: StudySession,
    pub view: View,
    pub input: String,
    pub editing: bool,
    pub chat_scroll: u16,
    pub sessions: StatefulList<SessionSummary>,
    pub concepts: StatefulList<Concept>,
    pub review_queue: Vec<Concept>,
    pub stats: Stats,
    pub filter_input: String,
    pub filter_mode: bool,
    pub confirm_reset: bool,
    pub notice: Option<String>,
    pub pending: Option<PendingAction>,
    pub should_quit: bool,
}

impl App {
    pub fn new(
        db: Database,
        llm: Box<dyn LlmClient>,
        max_messages: usize,
        quiz_batch: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let study = StudySession::open(&db, max_messages)?;
        let stats = db.get_stats()?;

        let mut app = Self {
            db,
            llm,
            quiz_batch,
            study,
            view: View::Chat,
            input: String::new(),
            editing: false,
            chat_scroll: 0,
            sessions: StatefulList::with_items(Vec::new()),
            concepts: StatefulList::with_items(Vec::new()),
            review_queue: Vec::new(),
            stats,
            filter_input: String::new(),
            filter_mode: false,
            confirm_reset: false,
            notice: None,
            pending: None,
            should_quit: false,
        };
        app.refresh_data()?;
        Ok(app)
    }

    pub fn refresh_data(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.stats = self.db.get_stats()?;
        self.apply_filter()?;
        // Grouped order, so the progress list reads category by category.
        self.concepts = StatefulList::with_items(
            self.db
                .get_concepts_by_category()?
                .into_iter()
                .flat_map(|g| g.concepts)
                .collect(),
        );
        self.review_queue = self.db.get_concepts_needing_review()?;
        self.review_queue.truncate(REVIEW_QUEUE_LEN);
        Ok(())
    }

    fn apply_filter(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let query = self.filter_input.trim().to_string();
        self.sessions = StatefulList::with_items(
            self.db
                .list_recent_sessions(RECENT_SESSIONS)?
                .into_iter()
                .filter(|s| s.matches(&query))
                .collect(),
        );
        Ok(())
    }

    /// Status line for the queued action, shown while it runs.
    pub fn pending_status(&self) -> Option<String> {
        match &self.pending {
            Some(PendingAction::Send(_)) | Some(PendingAction::AskAbout(_)) => {
                Some("Thinking...".to_string())
            }
            Some(PendingAction::LoadQuestion) => self
                .study
                .quiz()
                .map(|q| format!("Generating question about {}...", q.current_concept().name)),
            None => None,
        }
    }

    pub fn current_notice(&self) -> Option<&str> {
        self.notice.as_deref().or_else(|| self.study.last_notice())
    }

    pub fn run_pending(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let Some(action) = self.pending.take() else {
            return Ok(());
        };

        match action {
            PendingAction::Send(text) => {
                let outcome = self.study.send(&self.db, self.llm.as_ref(), &text)?;
                self.after_turn(outcome)?;
            }
            PendingAction::AskAbout(name) => {
                let outcome = self.study.ask_about(&self.db, self.llm.as_ref(), &name)?;
                self.after_turn(outcome)?;
            }
            PendingAction::LoadQuestion => {
                self.study.load_quiz_question(&self.db, self.llm.as_ref())?;
            }
        }
        self.queue_quiz_load();
        Ok(())
    }

    fn after_turn(&mut self, outcome: TurnOutcome) -> Result<(), Box<dyn std::error::Error>> {
        if let TurnOutcome::Replied(_) = outcome {
            self.chat_scroll = 0;
            self.refresh_data()?;
        }
        Ok(())
    }

    // A quiz waiting on a question always has a load queued.
    fn queue_quiz_load(&mut self) {
        let loading = self.study.quiz().map(|q| q.is_loading()).unwrap_or(false);
        if loading && self.pending.is_none() {
            self.pending = Some(PendingAction::LoadQuestion);
        }
    }

    fn start_quiz(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.notice = None;
        if self.study.start_quiz(&self.db, self.quiz_batch)? {
            self.view = View::Chat;
            self.editing = false;
            self.queue_quiz_load();
        }
        Ok(())
    }

    fn ask_about_selected(&mut self) {
        if self.study.in_quiz() {
            self.notice = Some("Finish the quiz before asking about a concept.".to_string());
            return;
        }
        if let Some(concept) = self.concepts.selected_item() {
            self.pending = Some(PendingAction::AskAbout(concept.name.clone()));
            self.view = View::Chat;
        }
    }

    fn load_selected_session(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(summary) = self.sessions.selected_item() {
            let id = summary.session.id;
            self.study.switch_to(&self.db, id)?;
            self.chat_scroll = 0;
            self.notice = None;
            self.view = View::Chat;
        }
        Ok(())
    }

    fn delete_selected_session(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(summary) = self.sessions.selected_item() {
            let id = summary.session.id;
            match self.study.delete_session(&self.db, id) {
                Ok(_) => {
                    self.notice = Some(format!("Deleted session {}.", id));
                    self.refresh_data()?;
                }
                Err(AppError::SessionInUse(_)) => {
                    self.notice = Some("Can't delete the session you're in.".to_string());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn new_session(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.study.new_session(&self.db)?;
        self.chat_scroll = 0;
        self.notice = None;
        self.view = View::Chat;
        self.refresh_data()
    }

    fn reset_all(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.study.reset_all(&self.db)?;
        self.confirm_reset = false;
        self.chat_scroll = 0;
        self.notice = Some("All data deleted.".to_string());
        self.refresh_data()
    }

    fn handle_key(
        &mut self,
        key: KeyCode,
        modifiers: KeyModifiers,
    ) -> Result<(), Box<dyn std::error::Error>> {
        // Keys are ignored while a slow action is waiting to run.
        if self.pending.is_some() {
            return Ok(());
        }

        if self.editing {
            match key {
                KeyCode::Esc => self.editing = false,
                KeyCode::Enter => {
                    let text = self.input.trim().to_string();
                    if !text.is_empty() {
                        self.input.clear();
                        self.notice = None;
                        self.pending = Some(PendingAction::Send(text));
                    }
                }
                KeyCode::Backspace => {
                    self.input.pop();
                }
                KeyCode::Char(c) => self.input.push(c),
                _ => {}
            }
            return Ok(());
        }

        if self.filter_mode {
            match key {
                KeyCode::Esc => {
                    self.filter_mode = false;
                    self.filter_input.clear();
                    self.apply_filter()?;
                }
                KeyCode::Enter => {
                    self.filter_mode = false;
                    self.apply_filter()?;
                }
                KeyCode::Backspace => {
                    self.filter_input.pop();
                }
                KeyCode::Char(c) => {
                    self.filter_input.push(c);
                }
                _ => {}
            }
            return Ok(());
        }

        if self.confirm_reset {
            match key {
                KeyCode::Char('y') | KeyCode::Char('Y') => self.reset_all()?,
                _ => self.confirm_reset = false,
            }
            return Ok(());
        }

        if self.view == View::Chat && self.study.in_quiz() && self.handle_quiz_key(key)? {
            return Ok(());
        }

        match key {
            KeyCode::Char('q') => self.should_quit = true,

            KeyCode::Char('r') if modifiers.contains(KeyModifiers::CONTROL) => {
                self.refresh_data()?;
            }

            KeyCode::Char('h') | KeyCode::Left => self.view = self.view.prev(),
            KeyCode::Char('l') | KeyCode::Right if self.view != View::Sessions => {
                self.view = self.view.next()
            }
            KeyCode::Tab => {
                if modifiers.contains(KeyModifiers::SHIFT) {
                    self.view = self.view.prev();
                } else {
                    self.view = self.view.next();
                }
            }
            KeyCode::BackTab => self.view = self.view.prev(),

            KeyCode::Char('i') | KeyCode::Enter if self.view == View::Chat => {
                if !self.study.in_quiz() {
                    self.editing = true;
                }
            }

            KeyCode::Char('j') | KeyCode::Down => match self.view {
                View::Chat => self.chat_scroll = self.chat_scroll.saturating_sub(1),
                View::Sessions => self.sessions.next(),
                View::Progress => self.concepts.next(),
            },
            KeyCode::Char('k') | KeyCode::Up => match self.view {
                View::Chat => self.chat_scroll = self.chat_scroll.saturating_add(1),
                View::Sessions => self.sessions.previous(),
                View::Progress => self.concepts.previous(),
            },
            KeyCode::Char('g') => match self.view {
                View::Sessions => self.sessions.first(),
                View::Progress => self.concepts.first(),
                View::Chat => {}
            },
            KeyCode::Char('G') => match self.view {
                View::Sessions => self.sessions.last(),
                View::Progress => self.concepts.last(),
                View::Chat => self.chat_scroll = 0,
            },

            KeyCode::Char('/') if self.view == View::Sessions => {
                self.filter_mode = true;
                self.filter_input.clear();
            }
            KeyCode::Esc if self.view == View::Sessions && !self.filter_input.is_empty() => {
                self.filter_input.clear();
                self.apply_filter()?;
            }
            KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right
                if self.view == View::Sessions =>
            {
                self.load_selected_session()?
            }
            KeyCode::Char('d') if self.view == View::Sessions => self.delete_selected_session()?,
            KeyCode::Char('n') if self.view != View::Progress => self.new_session()?,

            KeyCode::Enter | KeyCode::Char('a') if self.view == View::Progress => {
                self.ask_about_selected()
            }
            KeyCode::Char('s') if self.view == View::Progress => self.start_quiz()?,
            KeyCode::Char('R') if self.view == View::Progress => self.confirm_reset = true,

            _ => {}
        }
        Ok(())
    }

    /// Quiz keys on the chat view. Returns false for keys the quiz leaves to
    /// the normal bindings.
    fn handle_quiz_key(&mut self, key: KeyCode) -> Result<bool, Box<dyn std::error::Error>> {
        let Some(quiz) = self.study.quiz() else {
            return Ok(false);
        };
        let phase = quiz.phase();
        let is_last = quiz.is_last();

        match (phase, key) {
            (_, KeyCode::Esc) => {
                self.study.cancel_quiz();
                self.notice = Some("Quiz cancelled.".to_string());
            }
            (QuizPhase::ShowingQuestion, KeyCode::Char(c)) => match Letter::from_char(c) {
                Some(letter) => {
                    self.study.answer_quiz(letter)?;
                }
                None => return Ok(c != 'q'),
            },
            (QuizPhase::ShowingAnswer, KeyCode::Char('n')) if !is_last => {
                self.study.next_quiz_question()?;
                self.queue_quiz_load();
            }
            (QuizPhase::ShowingAnswer, KeyCode::Char('e')) => self.study.finish_quiz()?,
            (QuizPhase::ShowingAnswer, KeyCode::Enter) => {
                if is_last {
                    self.study.finish_quiz()?;
                } else {
                    self.study.next_quiz_question()?;
                    self.queue_quiz_load();
                }
            }
            (QuizPhase::AwaitingRating, KeyCode::Char(c @ ('1' | '3' | '5'))) => {
                let level = i32::from(c as u8 - b'0');
                self.study.rate_quiz(&self.db, level)?;
                self.notice = Some("Understanding saved.".to_string());
                self.refresh_data()?;
            }
            (_, KeyCode::Char('q')) => return Ok(false),
            (_, KeyCode::Tab) | (_, KeyCode::BackTab) => return Ok(false),
            _ => {}
        }
        Ok(true)
    }
}

pub fn run(
    db: Database,
    llm: Box<dyn LlmClient>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    // Build state before touching the terminal so errors print normally
    let mut app = App::new(
        db,
        llm,
        config.max_messages_per_session,
        config.quiz_batch_size,
    )?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Main loop
    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        if app.pending.is_some() {
            app.run_pending()?;
            continue;
        }

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                app.handle_key(key.code, key.modifiers)?;
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{well_formed_quiz, ScriptedLlm};
    use crate::llm::LlmError;
    use crate::models::Role;

    fn app_with(replies: Vec<Result<String, LlmError>>) -> App {
        let db = Database::open(":memory:").unwrap();
        db.init().unwrap();
        App::new(db, Box::new(ScriptedLlm::new(replies)), 25, 3).unwrap()
    }

    fn press(app: &mut App, key: KeyCode) {
        app.handle_key(key, KeyModifiers::NONE).unwrap();
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    mod list_tests {
        use super::*;

        #[test]
        fn next_and_previous_wrap() {
            let mut list = StatefulList::with_items(vec![1, 2, 3]);
            list.previous();
            assert_eq!(list.selected, Some(2));
            list.next();
            assert_eq!(list.selected, Some(0));
        }

        #[test]
        fn empty_list_has_no_selection() {
            let mut list: StatefulList<i32> = StatefulList::with_items(Vec::new());
            list.next();
            list.last();
            assert!(list.selected_item().is_none());
        }

        #[test]
        fn views_cycle() {
            assert_eq!(View::Chat.next(), View::Sessions);
            assert_eq!(View::Chat.prev(), View::Progress);
            assert_eq!(View::Progress.next().prev(), View::Progress);
        }
    }

    mod chat_tests {
        use super::*;

        #[test]
        fn typed_message_is_queued_then_sent() {
            let mut app = app_with(vec![Ok("A firewall filters traffic.".to_string())]);

            press(&mut app, KeyCode::Char('i'));
            type_text(&mut app, "what is a firewall? q");
            press(&mut app, KeyCode::Enter);

            assert_eq!(
                app.pending,
                Some(PendingAction::Send("what is a firewall? q".to_string()))
            );
            assert_eq!(app.pending_status().as_deref(), Some("Thinking..."));
            assert!(!app.should_quit);

            app.run_pending().unwrap();

            let transcript = app.study.transcript();
            assert_eq!(transcript.len(), 2);
            assert_eq!(transcript[1].role, Role::Assistant);
            assert_eq!(app.stats.total_concepts as usize, app.concepts.items.len());
            assert!(app.concepts.items.iter().any(|c| c.name == "firewall"));
        }

        #[test]
        fn failed_reply_shows_advisory() {
            let mut app = app_with(vec![Err(LlmError::QuotaExceeded)]);

            press(&mut app, KeyCode::Enter);
            type_text(&mut app, "hello");
            press(&mut app, KeyCode::Enter);
            app.run_pending().unwrap();

            assert_eq!(app.current_notice(), Some(LlmError::QuotaExceeded.advisory()));
        }

        #[test]
        fn ask_about_is_blocked_during_quiz() {
            let mut app = app_with(vec![]);
            app.db.save_concept("firewall", Some("Network Security")).unwrap();
            app.refresh_data().unwrap();
            app.view = View::Progress;

            press(&mut app, KeyCode::Char('s'));
            app.pending = None;
            app.view = View::Progress;
            press(&mut app, KeyCode::Enter);

            assert!(app.pending.is_none());
            assert!(app.notice.is_some());
        }
    }

    mod quiz_tests {
        use super::*;

        #[test]
        fn quiz_round_trip_through_keys() {
            let mut app = app_with(vec![Ok(well_formed_quiz('B'))]);
            app.db.save_concept("firewall", Some("Network Security")).unwrap();
            app.refresh_data().unwrap();

            app.view = View::Progress;
            press(&mut app, KeyCode::Char('s'));
            assert_eq!(app.view, View::Chat);
            assert_eq!(app.pending, Some(PendingAction::LoadQuestion));
            assert_eq!(
                app.pending_status().as_deref(),
                Some("Generating question about firewall...")
            );

            app.run_pending().unwrap();
            press(&mut app, KeyCode::Char('b'));
            assert_eq!(app.study.quiz().unwrap().phase(), QuizPhase::ShowingAnswer);

            press(&mut app, KeyCode::Enter);
            assert_eq!(app.study.quiz().unwrap().phase(), QuizPhase::AwaitingRating);

            press(&mut app, KeyCode::Char('5'));
            assert!(!app.study.in_quiz());
            let concept = app.db.get_concept_by_name("firewall").unwrap().unwrap();
            assert_eq!(concept.understanding_level, 5);
        }

        #[test]
        fn esc_cancels_quiz() {
            let mut app = app_with(vec![]);
            app.db.save_concept("firewall", None).unwrap();
            app.view = View::Progress;
            press(&mut app, KeyCode::Char('s'));
            app.pending = None;

            press(&mut app, KeyCode::Esc);

            assert!(!app.study.in_quiz());
        }
    }

    mod session_tests {
        use super::*;

        #[test]
        fn current_session_delete_shows_notice() {
            let mut app = app_with(vec![Ok("hi".to_string())]);
            app.pending = Some(PendingAction::Send("hello".to_string()));
            app.run_pending().unwrap();

            app.view = View::Sessions;
            assert_eq!(app.sessions.items.len(), 1);
            press(&mut app, KeyCode::Char('d'));

            assert_eq!(app.notice.as_deref(), Some("Can't delete the session you're in."));
            assert_eq!(app.sessions.items.len(), 1);
        }

        #[test]
        fn reset_needs_confirmation() {
            let mut app = app_with(vec![]);
            app.db.save_concept("firewall", None).unwrap();
            app.view = View::Progress;

            press(&mut app, KeyCode::Char('R'));
            assert!(app.confirm_reset);
            press(&mut app, KeyCode::Char('x'));
            assert!(!app.confirm_reset);
            assert_eq!(app.db.get_concept_count().unwrap(), 1);

            press(&mut app, KeyCode::Char('R'));
            press(&mut app, KeyCode::Char('y'));
            assert_eq!(app.db.get_concept_count().unwrap(), 0);
        }

        #[test]
        fn filter_narrows_sessions() {
            let mut app = app_with(vec![Ok("one".to_string()), Ok("two".to_string())]);
            app.pending = Some(PendingAction::Send("about dns".to_string()));
            app.run_pending().unwrap();
            app.study.new_session(&app.db).unwrap();
            app.pending = Some(PendingAction::Send("about phishing".to_string()));
            app.run_pending().unwrap();

            app.view = View::Sessions;
            press(&mut app, KeyCode::Char('/'));
            type_text(&mut app, "PHISH");
            press(&mut app, KeyCode::Enter);

            assert_eq!(app.sessions.items.len(), 1);
            assert_eq!(app.sessions.items[0].title, "about phishing");
        }
    }
}
