use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

use crate::llm::{LlmClient, LlmError, Turn};

pub const QUIZ_PROMPT_TEMPLATE: &str = r#"Generate a multiple choice question about "{concept}" in cybersecurity.

The question should test understanding, not just memorization. Make distractors plausible but clearly wrong to someone who understands the concept.

Format your response EXACTLY like this (include all sections):
QUESTION: [question text]
A) [option]
B) [option]
C) [option]
D) [option]
CORRECT: [A/B/C/D]
CORRECT_EXPLANATION: [why the correct answer is right - 1-2 sentences]
A_EXPLANATION: [why A is wrong OR why A is correct, depending on the answer]
B_EXPLANATION: [why B is wrong OR why B is correct, depending on the answer]
C_EXPLANATION: [why C is wrong OR why C is correct, depending on the answer]
D_EXPLANATION: [why D is wrong OR why D is correct, depending on the answer]
"#;

pub fn quiz_prompt(concept: &str) -> String {
    QUIZ_PROMPT_TEMPLATE.replace("{concept}", concept)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Letter {
    A,
    B,
    C,
    D,
}

impl Letter {
    pub const ALL: [Letter; 4] = [Letter::A, Letter::B, Letter::C, Letter::D];

    pub fn as_char(&self) -> char {
        match self {
            Letter::A => 'A',
            Letter::B => 'B',
            Letter::C => 'C',
            Letter::D => 'D',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(Letter::A),
            'B' => Some(Letter::B),
            'C' => Some(Letter::C),
            'D' => Some(Letter::D),
            _ => None,
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// One parsed multiple choice question. Options and explanations are indexed
/// by [`Letter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuizQuestion {
    pub concept_name: String,
    pub question: String,
    pub options: [String; 4],
    pub correct: Letter,
    pub correct_explanation: String,
    pub explanations: [String; 4],
}

impl QuizQuestion {
    pub fn option(&self, letter: Letter) -> &str {
        &self.options[letter.index()]
    }

    pub fn explanation(&self, letter: Letter) -> &str {
        &self.explanations[letter.index()]
    }

    pub fn is_correct(&self, letter: Letter) -> bool {
        letter == self.correct
    }

    /// Result text shown once the user has picked an answer.
    pub fn feedback(&self, answer: Letter) -> String {
        let correct = self.correct;
        if self.is_correct(answer) {
            format!(
                "✓ Correct!\n\n{}) {}\n\n{}",
                correct,
                self.option(correct),
                self.correct_explanation
            )
        } else {
            let mut out = format!("✗ Not quite\n\nYou picked: {}) {}", answer, self.option(answer));
            let wrong = self.explanation(answer);
            if !wrong.is_empty() {
                out.push_str(&format!("\n→ {}", wrong));
            }
            out.push_str(&format!(
                "\n\nCorrect: {}) {}\n→ {}",
                correct,
                self.option(correct),
                self.correct_explanation
            ));
            out
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationFailure {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("could not parse the generated question")]
    Unparsable,
}

impl GenerationFailure {
    pub fn advisory(&self) -> &'static str {
        match self {
            GenerationFailure::Llm(e) => e.advisory(),
            GenerationFailure::Unparsable => "Failed to generate question. Skipping this concept.",
        }
    }
}

pub fn generate_quiz_question(
    llm: &dyn LlmClient,
    concept_name: &str,
    history: &[Turn],
) -> Result<QuizQuestion, GenerationFailure> {
    let reply = llm.run(&quiz_prompt(concept_name), history)?;

    let mut question = parse_quiz_response(&reply.text).ok_or_else(|| {
        tracing::warn!(concept = concept_name, "unparsable quiz reply");
        GenerationFailure::Unparsable
    })?;
    question.concept_name = concept_name.to_string();
    Ok(question)
}

struct Markers {
    question: Regex,
    question_end: Regex,
    option_end: Regex,
    correct: Regex,
    correct_explanation: Regex,
    correct_explanation_end: Regex,
    explanation_end: Regex,
}

fn markers() -> &'static Markers {
    static MARKERS: OnceLock<Markers> = OnceLock::new();
    MARKERS.get_or_init(|| Markers {
        question: Regex::new(r"QUESTION:").expect("static regex"),
        question_end: Regex::new(r"\n[A-D]\)").expect("static regex"),
        option_end: Regex::new(r"\n[B-D]\)|CORRECT:").expect("static regex"),
        correct: Regex::new(r"CORRECT:\s*([A-D])").expect("static regex"),
        correct_explanation: Regex::new(r"CORRECT_EXPLANATION:").expect("static regex"),
        correct_explanation_end: Regex::new(r"\n[A-D]_EXPLANATION:").expect("static regex"),
        explanation_end: Regex::new(r"\n[B-D]_EXPLANATION:").expect("static regex"),
    })
}

/// Parse a reply in the quiz prompt format.
///
/// Returns `None` when the question, any of the four options, the correct
/// letter or the correct explanation is missing. Per-letter explanations
/// default to empty. The returned question has an empty `concept_name`.
pub fn parse_quiz_response(text: &str) -> Option<QuizQuestion> {
    let m = markers();

    let question_start = m.question.find(text)?.end();
    let question = section(text, question_start, Some(&m.question_end))?;

    let mut options: [String; 4] = Default::default();
    for letter in Letter::ALL {
        let marker = format!("{})", letter);
        let start = text.find(&marker)? + marker.len();
        options[letter.index()] = section(text, start, Some(&m.option_end))?;
    }

    let correct = m
        .correct
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|l| l.as_str().chars().next())
        .and_then(Letter::from_char)?;

    let explanation_start = m.correct_explanation.find(text)?.end();
    let correct_explanation = section(text, explanation_start, Some(&m.correct_explanation_end))?;

    let mut explanations: [String; 4] = Default::default();
    for letter in Letter::ALL {
        let marker = format!("{}_EXPLANATION:", letter);
        explanations[letter.index()] = text
            .find(&marker)
            .map(|pos| pos + marker.len())
            .and_then(|start| {
                section(text, start, Some(&m.explanation_end))
                    .or_else(|| section(text, start, None))
            })
            .unwrap_or_default();
    }

    Some(QuizQuestion {
        concept_name: String::new(),
        question,
        options,
        correct,
        correct_explanation,
        explanations,
    })
}

// Trimmed text from `start` up to the first terminator match at least one
// character past `start`. No terminator means "to end of text".
fn section(text: &str, start: usize, terminator: Option<&Regex>) -> Option<String> {
    let rest = text.get(start..)?;
    let first = rest.chars().next()?;
    let search_from = start + first.len_utf8();

    let end = match terminator {
        Some(re) => re.find_at(text, search_from)?.start(),
        None => text.len(),
    };
    Some(text[start..end].trim().to_string())
}
