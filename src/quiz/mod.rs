pub mod machine;
pub mod parse;

pub use machine::{LoadOutcome, MessageBudget, QuizError, QuizPhase, QuizResult, QuizState};
pub use parse::Letter;
