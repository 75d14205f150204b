use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::concepts::UNCATEGORIZED;

pub const MIN_UNDERSTANDING: i32 = 1;
pub const MAX_UNDERSTANDING: i32 = 5;

// Fixed-width timestamps so lexical order in SQLite is chronological order.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub summary: Option<String>,
    pub message_count: i64,
    pub llm_calls: i64,
}

impl Session {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

// A session plus the title shown in session lists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session: Session,
    pub title: String,
}

impl SessionSummary {
    /// Case-insensitive title search; an empty query matches everything.
    pub fn matches(&self, query: &str) -> bool {
        query.is_empty() || self.title.to_lowercase().contains(&query.to_lowercase())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub session_id: i64,
    pub role: Role,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub first_seen_at: String,
    pub times_discussed: i64,
    pub understanding_level: i32,
    pub last_reviewed_at: Option<String>,
}

impl Concept {
    pub fn level_label(&self) -> &'static str {
        level_label(self.understanding_level)
    }

    pub fn display_category(&self) -> &str {
        self.category.as_deref().unwrap_or(UNCATEGORIZED)
    }
}

pub fn level_label(level: i32) -> &'static str {
    match level {
        2 => "Learning",
        3 => "Getting it",
        4 => "Solid",
        5 => "Mastered",
        _ => "New",
    }
}

pub fn clamp_level(level: i32) -> i32 {
    level.clamp(MIN_UNDERSTANDING, MAX_UNDERSTANDING)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptMention {
    pub id: i64,
    pub concept_id: i64,
    pub message_id: i64,
    pub session_id: i64,
    pub mentioned_at: String,
}

// Concepts sharing a category, in display order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub category: String,
    pub concepts: Vec<Concept>,
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_concept(level: i32, category: Option<&str>) -> Concept {
        Concept {
            id: 1,
            name: "firewall".to_string(),
            category: category.map(String::from),
            first_seen_at: now_timestamp(),
            times_discussed: 1,
            understanding_level: level,
            last_reviewed_at: None,
        }
    }

    mod role_tests {
        use super::*;

        #[test]
        fn round_trips_through_str() {
            for role in [Role::User, Role::Assistant] {
                assert_eq!(Role::from_str(role.as_str()), Some(role));
            }
        }

        #[test]
        fn from_str_ignores_case() {
            assert_eq!(Role::from_str("ASSISTANT"), Some(Role::Assistant));
        }

        #[test]
        fn from_str_rejects_unknown() {
            assert!(Role::from_str("system").is_none());
            assert!(Role::from_str("").is_none());
        }
    }

    mod concept_tests {
        use super::*;

        #[test]
        fn level_labels() {
            assert_eq!(make_concept(1, None).level_label(), "New");
            assert_eq!(make_concept(2, None).level_label(), "Learning");
            assert_eq!(make_concept(3, None).level_label(), "Getting it");
            assert_eq!(make_concept(4, None).level_label(), "Solid");
            assert_eq!(make_concept(5, None).level_label(), "Mastered");
        }

        #[test]
        fn out_of_range_level_reads_as_new() {
            assert_eq!(make_concept(0, None).level_label(), "New");
            assert_eq!(make_concept(42, None).level_label(), "New");
        }

        #[test]
        fn missing_category_is_uncategorized() {
            assert_eq!(make_concept(1, None).display_category(), "Uncategorized");
            assert_eq!(
                make_concept(1, Some("Malware")).display_category(),
                "Malware"
            );
        }

        #[test]
        fn clamp_level_bounds() {
            assert_eq!(clamp_level(9), 5);
            assert_eq!(clamp_level(-3), 1);
            assert_eq!(clamp_level(3), 3);
        }
    }

    mod session_summary_tests {
        use super::*;

        fn summary(title: &str) -> SessionSummary {
            SessionSummary {
                session: Session {
                    id: 1,
                    started_at: now_timestamp(),
                    ended_at: None,
                    summary: None,
                    message_count: 2,
                    llm_calls: 1,
                },
                title: title.to_string(),
            }
        }

        #[test]
        fn search_ignores_case() {
            assert!(summary("What is a Firewall?").matches("firewall"));
            assert!(!summary("What is a Firewall?").matches("phishing"));
        }

        #[test]
        fn empty_query_matches_all() {
            assert!(summary("anything").matches(""));
        }
    }

    mod timestamp_tests {
        use super::*;

        #[test]
        fn timestamps_are_fixed_width() {
            let a = now_timestamp();
            let b = now_timestamp();
            assert_eq!(a.len(), b.len());
            assert!(a.ends_with('Z'));
            assert!(a <= b);
        }
    }

    mod json_output_tests {
        use super::*;

        #[test]
        fn ok_wraps_data() {
            let output = JsonOutput::ok(42);
            assert!(output.success);
            assert_eq!(output.data, Some(42));
            assert!(output.error.is_none());
        }

        #[test]
        fn err_carries_message() {
            let output = JsonOutput::<()>::err("Session not found");
            assert!(!output.success);
            assert!(output.data.is_none());
            assert_eq!(output.error, Some("Session not found".to_string()));
        }

        #[test]
        fn serializes_to_expected_shape() {
            let output = JsonOutput::ok(vec!["a"]);
            let json = serde_json::to_string(&output).unwrap();
            assert_eq!(json, r#"{"success":true,"data":["a"],"error":null}"#);
        }
    }
}
