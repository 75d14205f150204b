//! Chat orchestration: one explicit state object per study session.
//!
//! [`StudySession`] owns everything that lives between user actions (the
//! visible transcript, the LLM history, the message budget and the running
//! quiz) and is passed by reference into every handler.

use crate::concepts::extract_concepts;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::llm::{LlmClient, LlmError, Turn};
use crate::models::{now_timestamp, Message, Role, Session};
use crate::quiz::{Letter, LoadOutcome, MessageBudget, QuizState};

pub fn limit_notice(cap: usize) -> String {
    format!(
        "You've reached the {}-message limit for this session. Start a new session to keep going.",
        cap
    )
}

pub fn explain_prompt(concept: &str) -> String {
    format!(
        "Explain {} to me. What is it, why does it matter in cybersecurity, and give me an example.",
        concept
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    LimitReached,
    QuizActive,
    EmptyMessage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Replied(String),
    Refused(Refusal),
    Failed(LlmError),
}

pub struct StudySession {
    session_id: i64,
    transcript: Vec<Message>,
    history: Vec<Turn>,
    budget: MessageBudget,
    quiz: Option<QuizState>,
    last_notice: Option<String>,
}

impl StudySession {
    /// Continue the most recent open session, or start one.
    pub fn open(db: &Database, cap: usize) -> Result<Self> {
        match db.latest_open_session()? {
            Some(session) => Self::from_stored(db, session, cap),
            None => Ok(Self::fresh(db.create_session()?, cap)),
        }
    }

    pub fn resume(db: &Database, session_id: i64, cap: usize) -> Result<Self> {
        let session = db
            .get_session(session_id)?
            .ok_or(AppError::SessionNotFound(session_id))?;
        Self::from_stored(db, session, cap)
    }

    fn from_stored(db: &Database, session: Session, cap: usize) -> Result<Self> {
        let transcript = db.get_session_messages(session.id)?;
        let history = answered_turns(&transcript);
        let replies = transcript
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count();
        // Sessions stored before usage tracking only have their replies to go on
        let used = (session.llm_calls.max(0) as usize).max(replies);

        tracing::info!(session = session.id, messages = transcript.len(), "resumed session");
        Ok(Self {
            session_id: session.id,
            transcript,
            history,
            budget: MessageBudget::with_used(used, cap),
            quiz: None,
            last_notice: None,
        })
    }

    fn fresh(session_id: i64, cap: usize) -> Self {
        tracing::info!(session = session_id, "started session");
        Self {
            session_id,
            transcript: Vec::new(),
            history: Vec::new(),
            budget: MessageBudget::new(cap),
            quiz: None,
            last_notice: None,
        }
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    #[cfg(test)]
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn budget(&self) -> MessageBudget {
        self.budget
    }

    pub fn quiz(&self) -> Option<&QuizState> {
        self.quiz.as_ref()
    }

    pub fn in_quiz(&self) -> bool {
        self.quiz.is_some()
    }

    pub fn last_notice(&self) -> Option<&str> {
        self.last_notice.as_deref()
    }

    /// End this session and switch to a new empty one.
    pub fn new_session(&mut self, db: &Database) -> Result<()> {
        db.end_session(self.session_id, None)?;
        *self = Self::fresh(db.create_session()?, self.budget.cap());
        Ok(())
    }

    pub fn switch_to(&mut self, db: &Database, session_id: i64) -> Result<()> {
        *self = Self::resume(db, session_id, self.budget.cap())?;
        Ok(())
    }

    /// One chat turn. The user message is stored before the LLM is called, so
    /// it survives a failed reply. Only a successful reply uses budget.
    pub fn send(&mut self, db: &Database, llm: &dyn LlmClient, input: &str) -> Result<TurnOutcome> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(TurnOutcome::Refused(Refusal::EmptyMessage));
        }
        if self.quiz.is_some() {
            return Ok(TurnOutcome::Refused(Refusal::QuizActive));
        }
        if self.budget.is_exhausted() {
            self.last_notice = Some(limit_notice(self.budget.cap()));
            return Ok(TurnOutcome::Refused(Refusal::LimitReached));
        }

        self.append(db, Role::User, input)?;

        let reply = match llm.run(input, &self.history) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(
                    session = self.session_id,
                    usage_limit = e.is_usage_limit(),
                    error = %e,
                    "chat turn failed"
                );
                self.last_notice = Some(e.advisory().to_string());
                return Ok(TurnOutcome::Failed(e));
            }
        };

        self.history = reply.history;
        self.budget.record();
        db.record_llm_call(self.session_id)?;
        let message_id = self.append(db, Role::Assistant, &reply.text)?;
        self.track_concepts(db, message_id, &reply.text)?;
        self.last_notice = None;

        Ok(TurnOutcome::Replied(reply.text))
    }

    pub fn ask_about(
        &mut self,
        db: &Database,
        llm: &dyn LlmClient,
        concept: &str,
    ) -> Result<TurnOutcome> {
        self.send(db, llm, &explain_prompt(concept))
    }

    fn append(&mut self, db: &Database, role: Role, content: &str) -> Result<i64> {
        let id = db.save_message(self.session_id, role, content)?;
        self.transcript.push(Message {
            id,
            session_id: self.session_id,
            role,
            content: content.to_string(),
            created_at: now_timestamp(),
        });
        Ok(id)
    }

    fn track_concepts(&self, db: &Database, message_id: i64, text: &str) -> Result<()> {
        for concept in extract_concepts(text) {
            let concept_id = db.save_concept(concept.name, Some(concept.category))?;
            db.record_concept_mention(concept_id, message_id, self.session_id)?;
        }
        Ok(())
    }

    /// Select a batch and enter the quiz. False when there is nothing to
    /// quiz on yet.
    pub fn start_quiz(&mut self, db: &Database, limit: usize) -> Result<bool> {
        if self.budget.is_exhausted() {
            self.last_notice = Some(limit_notice(self.budget.cap()));
            return Ok(false);
        }
        let concepts = db.get_concepts_for_quiz(limit)?;
        self.quiz = QuizState::new(concepts);
        match &self.quiz {
            Some(quiz) => {
                tracing::info!(session = self.session_id, concepts = quiz.concepts().len(), "quiz started");
                self.last_notice = None;
                Ok(true)
            }
            None => {
                self.last_notice = Some("No concepts to quiz on yet. Chat first!".to_string());
                Ok(false)
            }
        }
    }

    pub fn load_quiz_question(
        &mut self,
        db: &Database,
        llm: &dyn LlmClient,
    ) -> Result<LoadOutcome> {
        let quiz = self.quiz.as_mut().ok_or(AppError::NoQuiz)?;
        let outcome = quiz.load_question(llm, &mut self.budget)?;

        match &outcome {
            LoadOutcome::Ready => {
                db.record_llm_call(self.session_id)?;
                self.last_notice = None;
            }
            LoadOutcome::Skipped(failure) => {
                self.last_notice = Some(failure.advisory().to_string());
            }
            LoadOutcome::BudgetExhausted => {
                self.quiz = None;
                self.last_notice = Some(limit_notice(self.budget.cap()));
            }
        }
        Ok(outcome)
    }

    pub fn answer_quiz(&mut self, letter: Letter) -> Result<bool> {
        let quiz = self.quiz.as_mut().ok_or(AppError::NoQuiz)?;
        Ok(quiz.answer(letter)?)
    }

    pub fn next_quiz_question(&mut self) -> Result<()> {
        let quiz = self.quiz.as_mut().ok_or(AppError::NoQuiz)?;
        Ok(quiz.next_question()?)
    }

    pub fn finish_quiz(&mut self) -> Result<()> {
        let quiz = self.quiz.as_mut().ok_or(AppError::NoQuiz)?;
        Ok(quiz.finish()?)
    }

    /// Apply the rating to the whole batch and leave quiz mode.
    pub fn rate_quiz(&mut self, db: &Database, level: i32) -> Result<i32> {
        let quiz = self.quiz.as_ref().ok_or(AppError::NoQuiz)?;
        let level = quiz.rate(db, level)?;
        self.quiz = None;
        Ok(level)
    }

    pub fn cancel_quiz(&mut self) {
        if self.quiz.take().is_some() {
            tracing::info!(session = self.session_id, "quiz cancelled");
        }
    }

    pub fn delete_session(&mut self, db: &Database, session_id: i64) -> Result<bool> {
        if session_id == self.session_id {
            return Err(AppError::SessionInUse(session_id));
        }
        Ok(db.delete_session(session_id)?)
    }

    /// Wipe every table and start over with a new session.
    pub fn reset_all(&mut self, db: &Database) -> Result<()> {
        db.clear_all_data()?;
        *self = Self::fresh(db.create_session()?, self.budget.cap());
        Ok(())
    }
}

/// LLM history from a stored transcript. A user message whose reply never
/// arrived was not part of the conversation the model saw.
fn answered_turns(transcript: &[Message]) -> Vec<Turn> {
    transcript
        .iter()
        .enumerate()
        .filter(|(i, m)| match m.role {
            Role::Assistant => true,
            Role::User => transcript
                .get(i + 1)
                .map_or(false, |next| next.role == Role::Assistant),
        })
        .map(|(_, m)| Turn {
            role: m.role,
            content: m.content.clone(),
        })
        .collect()
}
