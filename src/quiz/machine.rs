use serde::Serialize;
use std::fmt;

use super::parse::{generate_quiz_question, GenerationFailure, Letter, QuizQuestion};
use crate::db::Database;
use crate::llm::LlmClient;
use crate::models::{clamp_level, Concept};

/// Per-session allowance of LLM replies. Chat replies and generated quiz
/// questions both draw from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MessageBudget {
    used: usize,
    cap: usize,
}

impl MessageBudget {
    pub fn new(cap: usize) -> Self {
        Self { used: 0, cap }
    }

    pub fn with_used(used: usize, cap: usize) -> Self {
        Self { used, cap }
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.cap
    }

    pub fn record(&mut self) {
        self.used += 1;
    }

    pub fn remaining(&self) -> usize {
        self.cap.saturating_sub(self.used)
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QuizPhase {
    AwaitingQuestion,
    ShowingQuestion,
    ShowingAnswer,
    AwaitingRating,
}

impl QuizPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizPhase::AwaitingQuestion => "awaiting question",
            QuizPhase::ShowingQuestion => "showing question",
            QuizPhase::ShowingAnswer => "showing answer",
            QuizPhase::AwaitingRating => "awaiting rating",
        }
    }
}

impl fmt::Display for QuizPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuizResult {
    pub concept_id: i64,
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Ready,
    Skipped(GenerationFailure),
    BudgetExhausted,
}

#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    #[error("cannot {action} while {phase}")]
    InvalidTransition {
        phase: QuizPhase,
        action: &'static str,
    },

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

/// In-memory quiz over a fixed batch of concepts.
///
/// `current_index` only moves forward. `results` gets one entry per
/// answered question, in batch order; skipped concepts get none.
#[derive(Debug, Clone)]
pub struct QuizState {
    concepts: Vec<Concept>,
    current_index: usize,
    phase: QuizPhase,
    question: Option<QuizQuestion>,
    user_answer: Option<Letter>,
    results: Vec<QuizResult>,
}

impl QuizState {
    pub fn new(concepts: Vec<Concept>) -> Option<Self> {
        if concepts.is_empty() {
            return None;
        }
        Some(Self {
            concepts,
            current_index: 0,
            phase: QuizPhase::AwaitingQuestion,
            question: None,
            user_answer: None,
            results: Vec::new(),
        })
    }

    pub fn phase(&self) -> QuizPhase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == QuizPhase::AwaitingQuestion
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn concepts(&self) -> &[Concept] {
        &self.concepts
    }

    pub fn current_concept(&self) -> &Concept {
        &self.concepts[self.current_index]
    }

    pub fn question(&self) -> Option<&QuizQuestion> {
        self.question.as_ref()
    }

    pub fn user_answer(&self) -> Option<Letter> {
        self.user_answer
    }

    pub fn results(&self) -> &[QuizResult] {
        &self.results
    }

    /// Correct answers and questions answered.
    pub fn score(&self) -> (usize, usize) {
        let correct = self.results.iter().filter(|r| r.correct).count();
        (correct, self.results.len())
    }

    pub fn is_last(&self) -> bool {
        self.current_index + 1 >= self.concepts.len()
    }

    /// Generate the question for the current concept. A failure skips the
    /// concept. An exhausted budget leaves the state untouched; the owner is
    /// expected to drop the quiz.
    pub fn load_question(
        &mut self,
        llm: &dyn LlmClient,
        budget: &mut MessageBudget,
    ) -> Result<LoadOutcome, QuizError> {
        self.expect_phase(QuizPhase::AwaitingQuestion, "load a question")?;

        if budget.is_exhausted() {
            tracing::info!(used = budget.used(), "message budget exhausted, aborting quiz");
            return Ok(LoadOutcome::BudgetExhausted);
        }

        let concept_name = self.current_concept().name.clone();
        match generate_quiz_question(llm, &concept_name, &[]) {
            Ok(question) => {
                budget.record();
                self.question = Some(question);
                self.phase = QuizPhase::ShowingQuestion;
                Ok(LoadOutcome::Ready)
            }
            Err(failure) => {
                tracing::warn!(concept = %concept_name, error = %failure, "skipping quiz concept");
                self.advance();
                Ok(LoadOutcome::Skipped(failure))
            }
        }
    }

    /// Record the answer for the current question.
    pub fn answer(&mut self, letter: Letter) -> Result<bool, QuizError> {
        self.expect_phase(QuizPhase::ShowingQuestion, "answer")?;

        let correct = self
            .question
            .as_ref()
            .map(|q| q.is_correct(letter))
            .unwrap_or(false);
        self.results.push(QuizResult {
            concept_id: self.current_concept().id,
            correct,
        });
        self.user_answer = Some(letter);
        self.phase = QuizPhase::ShowingAnswer;
        Ok(correct)
    }

    /// Move on after an answer; from the last question this goes to rating.
    pub fn next_question(&mut self) -> Result<(), QuizError> {
        self.expect_phase(QuizPhase::ShowingAnswer, "move to the next question")?;
        self.advance();
        Ok(())
    }

    /// End early (or finish at the last question) and go to rating.
    pub fn finish(&mut self) -> Result<(), QuizError> {
        self.expect_phase(QuizPhase::ShowingAnswer, "finish")?;
        self.clear_question();
        self.phase = QuizPhase::AwaitingRating;
        Ok(())
    }

    /// Apply one self-rating to every concept in the batch.
    pub fn rate(&self, db: &Database, level: i32) -> Result<i32, QuizError> {
        self.expect_phase(QuizPhase::AwaitingRating, "rate")?;

        let level = clamp_level(level);
        for concept in &self.concepts {
            db.update_concept_understanding(concept.id, level)?;
        }
        tracing::info!(
            level,
            concepts = self.concepts.len(),
            score = ?self.score(),
            "quiz rated"
        );
        Ok(level)
    }

    fn advance(&mut self) {
        self.clear_question();
        if self.is_last() {
            self.phase = QuizPhase::AwaitingRating;
        } else {
            self.current_index += 1;
            self.phase = QuizPhase::AwaitingQuestion;
        }
    }

    fn clear_question(&mut self) {
        self.question = None;
        self.user_answer = None;
    }

    fn expect_phase(&self, phase: QuizPhase, action: &'static str) -> Result<(), QuizError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(QuizError::InvalidTransition {
                phase: self.phase,
                action,
            })
        }
    }
}
