use chrono::{Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use std::path::Path;

use crate::concepts::UNCATEGORIZED;
use crate::models::{
    clamp_level, now_timestamp, CategoryGroup, Concept, ConceptMention, Message, Role, Session,
    SessionSummary,
};

/// Concepts not reviewed for this many days come back into rotation.
pub const REVIEW_AFTER_DAYS: i64 = 7;
pub const DEFAULT_TITLE_LEN: usize = 40;

const CONCEPT_COLUMNS: &str =
    "id, name, category, first_seen_at, times_discussed, understanding_level, last_reviewed_at";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                summary TEXT
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL,
                role TEXT NOT NULL CHECK(role IN ('user', 'assistant')),
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS concepts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                category TEXT,
                first_seen_at TEXT NOT NULL,
                times_discussed INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS concept_mentions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                concept_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                session_id INTEGER NOT NULL,
                mentioned_at TEXT NOT NULL,
                FOREIGN KEY (concept_id) REFERENCES concepts(id) ON DELETE CASCADE,
                FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE,
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id);
            CREATE INDEX IF NOT EXISTS idx_mentions_session ON concept_mentions(session_id);
            CREATE INDEX IF NOT EXISTS idx_mentions_concept ON concept_mentions(concept_id);
            "#,
        )?;

        self.migrate()?;

        // Depends on a column the migration may have just added
        self.conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_concepts_level ON concepts(understanding_level);",
        )?;

        Ok(())
    }

    // Review tracking and usage columns were added after the first release
    fn migrate(&self) -> Result<()> {
        let columns = self.table_columns("concepts")?;

        if !columns.iter().any(|c| c == "understanding_level") {
            self.conn.execute_batch(
                "ALTER TABLE concepts ADD COLUMN understanding_level INTEGER NOT NULL DEFAULT 1;",
            )?;
        }
        if !columns.iter().any(|c| c == "last_reviewed_at") {
            self.conn
                .execute_batch("ALTER TABLE concepts ADD COLUMN last_reviewed_at TEXT;")?;
        }

        // LLM calls charged against the session's message cap
        if !self.table_columns("sessions")?.iter().any(|c| c == "llm_calls") {
            self.conn.execute_batch(
                "ALTER TABLE sessions ADD COLUMN llm_calls INTEGER NOT NULL DEFAULT 0;",
            )?;
        }

        Ok(())
    }

    fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", table))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
        rows.collect()
    }

    // Session operations
    pub fn create_session(&self) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO sessions (started_at) VALUES (?1)",
            params![now_timestamp()],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(session_id = id, "session created");
        Ok(id)
    }

    pub fn get_session(&self, id: i64) -> Result<Option<Session>> {
        self.conn
            .query_row(
                r#"
                SELECT s.id, s.started_at, s.ended_at, s.summary,
                       (SELECT COUNT(*) FROM messages m WHERE m.session_id = s.id),
                       s.llm_calls
                FROM sessions s
                WHERE s.id = ?1
                "#,
                params![id],
                session_from_row,
            )
            .optional()
    }

    pub fn latest_open_session(&self) -> Result<Option<Session>> {
        self.conn
            .query_row(
                r#"
                SELECT s.id, s.started_at, s.ended_at, s.summary,
                       (SELECT COUNT(*) FROM messages m WHERE m.session_id = s.id),
                       s.llm_calls
                FROM sessions s
                WHERE s.ended_at IS NULL
                ORDER BY s.started_at DESC, s.id DESC
                LIMIT 1
                "#,
                [],
                session_from_row,
            )
            .optional()
    }

    /// Sessions that have at least one message, newest first.
    pub fn list_recent_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT s.id, s.started_at, s.ended_at, s.summary, COUNT(m.id) AS message_count,
                   s.llm_calls
            FROM sessions s
            JOIN messages m ON m.session_id = s.id
            GROUP BY s.id
            ORDER BY s.started_at DESC, s.id DESC
            LIMIT ?1
            "#,
        )?;

        let sessions = stmt
            .query_map(params![limit as i64], session_from_row)?
            .collect::<Result<Vec<_>>>()?;

        sessions
            .into_iter()
            .map(|session| {
                let title = self.session_title(session.id, DEFAULT_TITLE_LEN)?;
                Ok(SessionSummary { session, title })
            })
            .collect()
    }

    /// Title derived from the first user message.
    pub fn session_title(&self, session_id: i64, max_len: usize) -> Result<String> {
        let first: Option<String> = self
            .conn
            .query_row(
                r#"
                SELECT content FROM messages
                WHERE session_id = ?1 AND role = 'user'
                ORDER BY created_at ASC, id ASC
                LIMIT 1
                "#,
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(match first {
            Some(content) => title_from(&content, max_len),
            None => "New session".to_string(),
        })
    }

    pub fn end_session(&self, session_id: i64, summary: Option<&str>) -> Result<()> {
        self.conn.execute(
            "UPDATE sessions SET ended_at = ?1, summary = ?2 WHERE id = ?3",
            params![now_timestamp(), summary, session_id],
        )?;
        Ok(())
    }

    /// Charge one LLM call to the session; returns the new total.
    pub fn record_llm_call(&self, session_id: i64) -> Result<i64> {
        self.conn.execute(
            "UPDATE sessions SET llm_calls = llm_calls + 1 WHERE id = ?1",
            params![session_id],
        )?;
        self.conn.query_row(
            "SELECT llm_calls FROM sessions WHERE id = ?1",
            params![session_id],
            |row| row.get(0),
        )
    }

    pub fn delete_session(&self, session_id: i64) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM concept_mentions WHERE session_id = ?1",
            params![session_id],
        )?;
        tx.execute(
            "DELETE FROM messages WHERE session_id = ?1",
            params![session_id],
        )?;
        let rows = tx.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        tx.commit()?;

        if rows > 0 {
            tracing::info!(session_id, "session deleted");
        }
        Ok(rows > 0)
    }

    // Message operations
    pub fn save_message(&self, session_id: i64, role: Role, content: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO messages (session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![session_id, role.as_str(), content, now_timestamp()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_session_messages(&self, session_id: i64) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, session_id, role, content, created_at
            FROM messages
            WHERE session_id = ?1
            ORDER BY created_at ASC, id ASC
            "#,
        )?;

        let rows = stmt.query_map(params![session_id], |row| {
            let role_str: String = row.get(2)?;
            Ok(Message {
                id: row.get(0)?,
                session_id: row.get(1)?,
                role: Role::from_str(&role_str).unwrap_or(Role::User),
                content: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;

        rows.collect()
    }

    // Concept operations

    /// Insert a concept or bump its discussion count. Names compare
    /// case-insensitively; the first spelling seen is kept.
    pub fn save_concept(&self, name: &str, category: Option<&str>) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM concepts WHERE name = ?1 COLLATE NOCASE",
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE concepts SET times_discussed = times_discussed + 1 WHERE id = ?1",
                    params![id],
                )?;
                id
            }
            None => {
                tx.execute(
                    r#"
                    INSERT INTO concepts (name, category, first_seen_at, times_discussed, understanding_level)
                    VALUES (?1, ?2, ?3, 1, 1)
                    "#,
                    params![name, category, now_timestamp()],
                )?;
                tx.last_insert_rowid()
            }
        };

        tx.commit()?;
        Ok(id)
    }

    pub fn record_concept_mention(
        &self,
        concept_id: i64,
        message_id: i64,
        session_id: i64,
    ) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO concept_mentions (concept_id, message_id, session_id, mentioned_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![concept_id, message_id, session_id, now_timestamp()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_concept_mentions(&self, session_id: i64) -> Result<Vec<ConceptMention>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, concept_id, message_id, session_id, mentioned_at
            FROM concept_mentions
            WHERE session_id = ?1
            ORDER BY id ASC
            "#,
        )?;

        let rows = stmt.query_map(params![session_id], |row| {
            Ok(ConceptMention {
                id: row.get(0)?,
                concept_id: row.get(1)?,
                message_id: row.get(2)?,
                session_id: row.get(3)?,
                mentioned_at: row.get(4)?,
            })
        })?;

        rows.collect()
    }

    pub fn get_concept(&self, id: i64) -> Result<Option<Concept>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM concepts WHERE id = ?1", CONCEPT_COLUMNS),
                params![id],
                concept_from_row,
            )
            .optional()
    }

    pub fn get_concept_by_name(&self, name: &str) -> Result<Option<Concept>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM concepts WHERE name = ?1 COLLATE NOCASE",
                    CONCEPT_COLUMNS
                ),
                params![name],
                concept_from_row,
            )
            .optional()
    }

    pub fn get_all_concepts(&self) -> Result<Vec<Concept>> {
        self.query_concepts(
            &format!(
                "SELECT {} FROM concepts ORDER BY times_discussed DESC, name ASC",
                CONCEPT_COLUMNS
            ),
            params![],
        )
    }

    /// Concepts grouped by category. Groups appear in the order their first
    /// member does in `get_all_concepts`.
    pub fn get_concepts_by_category(&self) -> Result<Vec<CategoryGroup>> {
        let mut groups: Vec<CategoryGroup> = Vec::new();

        for concept in self.get_all_concepts()? {
            let category = concept
                .category
                .clone()
                .unwrap_or_else(|| UNCATEGORIZED.to_string());

            match groups.iter_mut().find(|g| g.category == category) {
                Some(group) => group.concepts.push(concept),
                None => groups.push(CategoryGroup {
                    category,
                    concepts: vec![concept],
                }),
            }
        }

        Ok(groups)
    }

    pub fn get_concept_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM concepts", [], |row| row.get(0))
    }

    /// Set a self-rated understanding level, clamped to 1..=5, and stamp the review.
    pub fn update_concept_understanding(&self, concept_id: i64, level: i32) -> Result<()> {
        self.conn.execute(
            "UPDATE concepts SET understanding_level = ?1, last_reviewed_at = ?2 WHERE id = ?3",
            params![clamp_level(level), now_timestamp(), concept_id],
        )?;
        Ok(())
    }

    /// Review queue: never reviewed first, then weakest, then stalest.
    pub fn get_concepts_needing_review(&self) -> Result<Vec<Concept>> {
        let cutoff = review_cutoff();
        self.query_concepts(
            &format!(
                r#"
                SELECT {} FROM concepts
                WHERE understanding_level < 3
                   OR last_reviewed_at IS NULL
                   OR last_reviewed_at < ?1
                ORDER BY
                    CASE WHEN last_reviewed_at IS NULL THEN 0 ELSE 1 END,
                    understanding_level ASC,
                    last_reviewed_at ASC,
                    id ASC
                "#,
                CONCEPT_COLUMNS
            ),
            params![cutoff],
        )
    }

    /// Quiz batch candidates: weakest first, then never reviewed, then stalest.
    pub fn get_concepts_for_quiz(&self, limit: usize) -> Result<Vec<Concept>> {
        let cutoff = review_cutoff();
        let limit = limit as i64;
        self.query_concepts(
            &format!(
                r#"
                SELECT {} FROM concepts
                WHERE understanding_level < 4
                   OR last_reviewed_at IS NULL
                   OR last_reviewed_at < ?1
                ORDER BY
                    understanding_level ASC,
                    CASE WHEN last_reviewed_at IS NULL THEN 0 ELSE 1 END,
                    last_reviewed_at ASC,
                    id ASC
                LIMIT ?2
                "#,
                CONCEPT_COLUMNS
            ),
            params![cutoff, limit],
        )
    }

    fn query_concepts(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Concept>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, concept_from_row)?;
        rows.collect()
    }

    pub fn clear_all_data(&self) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(
            r#"
            DELETE FROM concept_mentions;
            DELETE FROM messages;
            DELETE FROM sessions;
            DELETE FROM concepts;
            "#,
        )?;
        tx.commit()?;
        tracing::warn!("all data cleared");
        Ok(())
    }

    pub fn get_stats(&self) -> Result<Stats> {
        let total_sessions: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;

        let total_messages: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;

        let total_concepts = self.get_concept_count()?;
        let needs_review = self.get_concepts_needing_review()?.len() as i64;

        let avg_understanding: f64 = self.conn.query_row(
            "SELECT COALESCE(AVG(understanding_level), 0.0) FROM concepts",
            [],
            |row| row.get(0),
        )?;

        Ok(Stats {
            total_sessions,
            total_messages,
            total_concepts,
            needs_review,
            avg_understanding,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Stats {
    pub total_sessions: i64,
    pub total_messages: i64,
    pub total_concepts: i64,
    pub needs_review: i64,
    pub avg_understanding: f64,
}

fn review_cutoff() -> String {
    (Utc::now() - Duration::days(REVIEW_AFTER_DAYS)).to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn title_from(content: &str, max_len: usize) -> String {
    if content.chars().count() > max_len {
        let head: String = content.chars().take(max_len).collect();
        format!("{}...", head.trim())
    } else {
        content.to_string()
    }
}

fn session_from_row(row: &Row<'_>) -> Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        started_at: row.get(1)?,
        ended_at: row.get(2)?,
        summary: row.get(3)?,
        message_count: row.get(4)?,
        llm_calls: row.get(5)?,
    })
}

fn concept_from_row(row: &Row<'_>) -> Result<Concept> {
    Ok(Concept {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        first_seen_at: row.get(3)?,
        times_discussed: row.get(4)?,
        understanding_level: row.get(5)?,
        last_reviewed_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        let db = Database::open(":memory:").expect("Failed to create in-memory database");
        db.init().expect("Failed to initialize database");
        db
    }

    fn set_reviewed_at(db: &Database, concept_id: i64, when: Option<String>) {
        db.conn
            .execute(
                "UPDATE concepts SET last_reviewed_at = ?1 WHERE id = ?2",
                params![when, concept_id],
            )
            .unwrap();
    }

    fn set_level(db: &Database, concept_id: i64, level: i32) {
        db.conn
            .execute(
                "UPDATE concepts SET understanding_level = ?1 WHERE id = ?2",
                params![level, concept_id],
            )
            .unwrap();
    }

    fn days_ago(days: i64) -> String {
        (Utc::now() - Duration::days(days)).to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    mod init_tests {
        use super::*;

        #[test]
        fn init_creates_tables() {
            let db = setup_db();
            for table in ["sessions", "messages", "concepts", "concept_mentions"] {
                let count: i64 = db
                    .conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                        row.get(0)
                    })
                    .unwrap_or_else(|_| panic!("{} table should exist", table));
                assert_eq!(count, 0);
            }
        }

        #[test]
        fn init_is_idempotent() {
            let db = setup_db();
            db.save_concept("firewall", Some("Network Security")).unwrap();

            db.init().expect("Re-init should succeed");

            assert_eq!(db.get_concept_count().unwrap(), 1);
        }

        #[test]
        fn migrate_adds_review_columns_to_old_schema() {
            let db = Database::open(":memory:").unwrap();
            db.conn
                .execute_batch(
                    r#"
                    CREATE TABLE concepts (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                        category TEXT,
                        first_seen_at TEXT NOT NULL,
                        times_discussed INTEGER NOT NULL DEFAULT 1
                    );
                    INSERT INTO concepts (name, category, first_seen_at)
                    VALUES ('VPN', 'Network Security', '2024-01-01T00:00:00.000000Z');
                    "#,
                )
                .unwrap();

            db.init().unwrap();

            let concept = db.get_concept_by_name("VPN").unwrap().unwrap();
            assert_eq!(concept.understanding_level, 1);
            assert!(concept.last_reviewed_at.is_none());
        }

        #[test]
        fn migrate_adds_llm_calls_to_old_sessions() {
            let db = Database::open(":memory:").unwrap();
            db.conn
                .execute_batch(
                    r#"
                    CREATE TABLE sessions (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        started_at TEXT NOT NULL,
                        ended_at TEXT,
                        summary TEXT
                    );
                    INSERT INTO sessions (started_at) VALUES ('2024-01-01T00:00:00.000000Z');
                    "#,
                )
                .unwrap();

            db.init().unwrap();

            let session = db.get_session(1).unwrap().unwrap();
            assert_eq!(session.llm_calls, 0);
        }
    }

    mod session_tests {
        use super::*;

        #[test]
        fn create_and_get_session() {
            let db = setup_db();
            let id = db.create_session().unwrap();
            let session = db.get_session(id).unwrap().unwrap();
            assert_eq!(session.id, id);
            assert!(session.is_open());
            assert_eq!(session.message_count, 0);
        }

        #[test]
        fn get_missing_session_is_none() {
            let db = setup_db();
            assert!(db.get_session(999).unwrap().is_none());
        }

        #[test]
        fn end_session_sets_ended_and_summary() {
            let db = setup_db();
            let id = db.create_session().unwrap();
            db.end_session(id, Some("covered TLS")).unwrap();

            let session = db.get_session(id).unwrap().unwrap();
            assert!(!session.is_open());
            assert_eq!(session.summary.as_deref(), Some("covered TLS"));
        }

        #[test]
        fn llm_calls_accumulate_per_session() {
            let db = setup_db();
            let id = db.create_session().unwrap();
            let other = db.create_session().unwrap();

            assert_eq!(db.record_llm_call(id).unwrap(), 1);
            assert_eq!(db.record_llm_call(id).unwrap(), 2);

            assert_eq!(db.get_session(id).unwrap().unwrap().llm_calls, 2);
            assert_eq!(db.get_session(other).unwrap().unwrap().llm_calls, 0);
        }

        #[test]
        fn latest_open_session_skips_ended() {
            let db = setup_db();
            let first = db.create_session().unwrap();
            let second = db.create_session().unwrap();
            db.end_session(second, None).unwrap();

            let latest = db.latest_open_session().unwrap().unwrap();
            assert_eq!(latest.id, first);
        }

        #[test]
        fn recent_sessions_only_include_sessions_with_messages() {
            let db = setup_db();
            let empty = db.create_session().unwrap();
            let used = db.create_session().unwrap();
            db.save_message(used, Role::User, "What is DNS?").unwrap();
            db.save_message(used, Role::Assistant, "DNS resolves names.").unwrap();

            let recent = db.list_recent_sessions(10).unwrap();
            assert_eq!(recent.len(), 1);
            assert_eq!(recent[0].session.id, used);
            assert_eq!(recent[0].session.message_count, 2);
            assert_eq!(recent[0].title, "What is DNS?");
            assert!(recent.iter().all(|s| s.session.id != empty));
        }

        #[test]
        fn recent_sessions_respects_limit_newest_first() {
            let db = setup_db();
            let mut ids = Vec::new();
            for i in 0..3 {
                let id = db.create_session().unwrap();
                db.save_message(id, Role::User, &format!("question {}", i))
                    .unwrap();
                ids.push(id);
            }

            let recent = db.list_recent_sessions(2).unwrap();
            assert_eq!(recent.len(), 2);
            assert_eq!(recent[0].session.id, ids[2]);
            assert_eq!(recent[1].session.id, ids[1]);
        }

        #[test]
        fn session_title_truncates_long_first_message() {
            let db = setup_db();
            let id = db.create_session().unwrap();
            db.save_message(id, Role::Assistant, "hello").unwrap();
            db.save_message(
                id,
                Role::User,
                "Explain the difference between symmetric and asymmetric encryption",
            )
            .unwrap();

            let title = db.session_title(id, 40).unwrap();
            assert_eq!(title, "Explain the difference between symmetric...");
        }

        #[test]
        fn session_title_defaults_without_user_message() {
            let db = setup_db();
            let id = db.create_session().unwrap();
            assert_eq!(db.session_title(id, 40).unwrap(), "New session");
        }

        #[test]
        fn delete_session_cascades() {
            let db = setup_db();
            let id = db.create_session().unwrap();
            let msg = db.save_message(id, Role::Assistant, "Use a firewall").unwrap();
            let concept = db.save_concept("firewall", Some("Network Security")).unwrap();
            db.record_concept_mention(concept, msg, id).unwrap();

            assert!(db.delete_session(id).unwrap());

            assert!(db.get_session(id).unwrap().is_none());
            assert!(db.get_session_messages(id).unwrap().is_empty());
            assert!(db.get_concept_mentions(id).unwrap().is_empty());
            // Concepts outlive the session
            assert_eq!(db.get_concept_count().unwrap(), 1);
        }

        #[test]
        fn delete_missing_session_returns_false() {
            let db = setup_db();
            assert!(!db.delete_session(42).unwrap());
        }
    }

    mod message_tests {
        use super::*;

        #[test]
        fn messages_come_back_in_order() {
            let db = setup_db();
            let id = db.create_session().unwrap();
            db.save_message(id, Role::User, "first").unwrap();
            db.save_message(id, Role::Assistant, "second").unwrap();
            db.save_message(id, Role::User, "third").unwrap();

            let messages = db.get_session_messages(id).unwrap();
            let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
            assert_eq!(contents, ["first", "second", "third"]);
            assert_eq!(messages[1].role, Role::Assistant);
        }

        #[test]
        fn messages_are_scoped_to_session() {
            let db = setup_db();
            let a = db.create_session().unwrap();
            let b = db.create_session().unwrap();
            db.save_message(a, Role::User, "in a").unwrap();

            assert!(db.get_session_messages(b).unwrap().is_empty());
        }
    }

    mod concept_tests {
        use super::*;

        #[test]
        fn save_concept_inserts_with_defaults() {
            let db = setup_db();
            let id = db.save_concept("phishing", Some("Social Engineering")).unwrap();

            let concept = db.get_concept(id).unwrap().unwrap();
            assert_eq!(concept.name, "phishing");
            assert_eq!(concept.category.as_deref(), Some("Social Engineering"));
            assert_eq!(concept.times_discussed, 1);
            assert_eq!(concept.understanding_level, 1);
            assert!(concept.last_reviewed_at.is_none());
        }

        #[test]
        fn firewall_discussed_twice_is_one_row_with_count_two() {
            let db = setup_db();
            let session = db.create_session().unwrap();
            let m1 = db.save_message(session, Role::Assistant, "A firewall filters.").unwrap();
            let m2 = db.save_message(session, Role::Assistant, "The firewall again.").unwrap();

            let c1 = db.save_concept("firewall", Some("Network Security")).unwrap();
            db.record_concept_mention(c1, m1, session).unwrap();
            let c2 = db.save_concept("firewall", Some("Network Security")).unwrap();
            db.record_concept_mention(c2, m2, session).unwrap();

            assert_eq!(c1, c2);
            assert_eq!(db.get_concept_count().unwrap(), 1);
            let concept = db.get_concept_by_name("firewall").unwrap().unwrap();
            assert_eq!(concept.times_discussed, 2);
            assert_eq!(db.get_concept_mentions(session).unwrap().len(), 2);
        }

        #[test]
        fn concept_identity_is_case_insensitive() {
            let db = setup_db();
            let a = db.save_concept("TLS", Some("Cryptography")).unwrap();
            let b = db.save_concept("tls", Some("Cryptography")).unwrap();
            assert_eq!(a, b);

            let concept = db.get_concept_by_name("Tls").unwrap().unwrap();
            assert_eq!(concept.name, "TLS");
            assert_eq!(concept.times_discussed, 2);
        }

        #[test]
        fn update_understanding_clamps_high() {
            let db = setup_db();
            let id = db.save_concept("AES", Some("Cryptography")).unwrap();
            db.update_concept_understanding(id, 9).unwrap();

            let concept = db.get_concept(id).unwrap().unwrap();
            assert_eq!(concept.understanding_level, 5);
            assert!(concept.last_reviewed_at.is_some());
        }

        #[test]
        fn update_understanding_clamps_low() {
            let db = setup_db();
            let id = db.save_concept("AES", Some("Cryptography")).unwrap();
            db.update_concept_understanding(id, -3).unwrap();

            assert_eq!(db.get_concept(id).unwrap().unwrap().understanding_level, 1);
        }

        #[test]
        fn all_concepts_ordered_by_discussion_count() {
            let db = setup_db();
            db.save_concept("DNS", Some("Network Security")).unwrap();
            db.save_concept("malware", Some("Malware")).unwrap();
            db.save_concept("malware", Some("Malware")).unwrap();

            let all = db.get_all_concepts().unwrap();
            assert_eq!(all[0].name, "malware");
            assert_eq!(all[1].name, "DNS");
        }

        #[test]
        fn concepts_grouped_by_category_with_uncategorized_bucket() {
            let db = setup_db();
            db.save_concept("worm", Some("Malware")).unwrap();
            db.save_concept("worm", Some("Malware")).unwrap();
            db.save_concept("trojan", Some("Malware")).unwrap();
            db.save_concept("zero trust", None).unwrap();

            let groups = db.get_concepts_by_category().unwrap();
            assert_eq!(groups.len(), 2);
            assert_eq!(groups[0].category, "Malware");
            assert_eq!(groups[0].concepts.len(), 2);
            assert_eq!(groups[1].category, "Uncategorized");
            assert_eq!(groups[1].concepts[0].name, "zero trust");
        }
    }

    mod selection_tests {
        use super::*;

        #[test]
        fn needing_review_filters_strong_recent_concepts() {
            let db = setup_db();
            let strong = db.save_concept("AES", None).unwrap();
            set_level(&db, strong, 3);
            set_reviewed_at(&db, strong, Some(days_ago(1)));

            let weak = db.save_concept("RSA", None).unwrap();
            set_level(&db, weak, 2);
            set_reviewed_at(&db, weak, Some(days_ago(1)));

            let names: Vec<_> = db
                .get_concepts_needing_review()
                .unwrap()
                .into_iter()
                .map(|c| c.name)
                .collect();
            assert_eq!(names, ["RSA"]);
        }

        #[test]
        fn stale_reviews_come_back() {
            let db = setup_db();
            let id = db.save_concept("PKI", None).unwrap();
            set_level(&db, id, 5);
            set_reviewed_at(&db, id, Some(days_ago(8)));

            assert_eq!(db.get_concepts_needing_review().unwrap().len(), 1);
            assert_eq!(db.get_concepts_for_quiz(3).unwrap().len(), 1);
        }

        #[test]
        fn needing_review_orders_unreviewed_first() {
            let db = setup_db();
            let reviewed_weak = db.save_concept("MD5", None).unwrap();
            set_level(&db, reviewed_weak, 1);
            set_reviewed_at(&db, reviewed_weak, Some(days_ago(1)));

            let unreviewed = db.save_concept("SHA", None).unwrap();
            set_level(&db, unreviewed, 2);

            let names: Vec<_> = db
                .get_concepts_needing_review()
                .unwrap()
                .into_iter()
                .map(|c| c.name)
                .collect();
            assert_eq!(names, ["SHA", "MD5"]);
        }

        #[test]
        fn quiz_candidates_order_weakest_first() {
            let db = setup_db();
            let reviewed_weak = db.save_concept("MD5", None).unwrap();
            set_level(&db, reviewed_weak, 1);
            set_reviewed_at(&db, reviewed_weak, Some(days_ago(1)));

            let unreviewed = db.save_concept("SHA", None).unwrap();
            set_level(&db, unreviewed, 2);

            let names: Vec<_> = db
                .get_concepts_for_quiz(3)
                .unwrap()
                .into_iter()
                .map(|c| c.name)
                .collect();
            assert_eq!(names, ["MD5", "SHA"]);
        }

        #[test]
        fn quiz_threshold_is_four_review_threshold_is_three() {
            let db = setup_db();
            let id = db.save_concept("IDS", None).unwrap();
            set_level(&db, id, 3);
            set_reviewed_at(&db, id, Some(days_ago(1)));

            assert!(db.get_concepts_needing_review().unwrap().is_empty());
            assert_eq!(db.get_concepts_for_quiz(3).unwrap().len(), 1);
        }

        #[test]
        fn quiz_candidates_tie_break_oldest_review_first() {
            let db = setup_db();
            let newer = db.save_concept("VLAN", None).unwrap();
            set_reviewed_at(&db, newer, Some(days_ago(1)));
            let older = db.save_concept("DMZ", None).unwrap();
            set_reviewed_at(&db, older, Some(days_ago(3)));

            let names: Vec<_> = db
                .get_concepts_for_quiz(3)
                .unwrap()
                .into_iter()
                .map(|c| c.name)
                .collect();
            assert_eq!(names, ["DMZ", "VLAN"]);
        }

        #[test]
        fn quiz_candidates_respect_limit() {
            let db = setup_db();
            for name in ["IOC", "APT", "TTP", "STIX", "TAXII"] {
                db.save_concept(name, Some("Threat Intelligence")).unwrap();
            }
            assert_eq!(db.get_concepts_for_quiz(3).unwrap().len(), 3);
        }
    }

    mod reset_tests {
        use super::*;

        #[test]
        fn clear_all_data_empties_everything() {
            let db = setup_db();
            let session = db.create_session().unwrap();
            let msg = db.save_message(session, Role::Assistant, "ransomware").unwrap();
            let concept = db.save_concept("ransomware", Some("Malware")).unwrap();
            db.record_concept_mention(concept, msg, session).unwrap();

            db.clear_all_data().unwrap();

            let stats = db.get_stats().unwrap();
            assert_eq!(stats.total_sessions, 0);
            assert_eq!(stats.total_messages, 0);
            assert_eq!(stats.total_concepts, 0);
            assert_eq!(stats.needs_review, 0);
        }

        #[test]
        fn stats_average_understanding() {
            let db = setup_db();
            let a = db.save_concept("XSS", None).unwrap();
            let b = db.save_concept("CSRF", None).unwrap();
            db.update_concept_understanding(a, 5).unwrap();
            db.update_concept_understanding(b, 1).unwrap();

            let stats = db.get_stats().unwrap();
            assert_eq!(stats.total_concepts, 2);
            assert!((stats.avg_understanding - 3.0).abs() < f64::EPSILON);
        }

        #[test]
        fn stats_on_empty_database() {
            let db = setup_db();
            let stats = db.get_stats().unwrap();
            assert_eq!(stats.avg_understanding, 0.0);
        }
    }

    mod helper_tests {
        use super::*;

        #[test]
        fn title_from_short_content_is_unchanged() {
            assert_eq!(title_from("hello", 40), "hello");
        }

        #[test]
        fn title_from_handles_multibyte() {
            assert_eq!(title_from("ééééé", 3), "ééé...");
        }
    }
}
