use crate::config::ConfigError;
use crate::llm::LlmError;
use crate::quiz::QuizError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Quiz(#[from] QuizError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session {0} not found")]
    SessionNotFound(i64),

    #[error("session {0} is the one in use; switch sessions before deleting it")]
    SessionInUse(i64),

    #[error("no quiz is running")]
    NoQuiz,
}

pub type Result<T> = std::result::Result<T, AppError>;
