mod chat;
mod concepts;
mod config;
mod db;
mod error;
mod llm;
mod logging;
mod models;
mod quiz;
mod tui;

use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};

use chat::{StudySession, TurnOutcome};
use config::Config;
use db::Database;
use llm::{HttpLlmClient, LlmClient};
use models::{level_label, JsonOutput};
use quiz::{Letter, LoadOutcome, QuizPhase, QuizResult};

const SESSION_LIST_LIMIT: usize = 20;

#[derive(Parser)]
#[command(name = "cyberbud")]
#[command(about = "A cybersecurity learning assistant with concept tracking and quizzes")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Send one chat message and print the reply
    Chat {
        /// Message text
        message: String,

        /// Session ID (defaults to the latest open session)
        #[arg(long, short)]
        session: Option<i64>,
    },

    /// Ask for an explanation of a concept
    Explain {
        /// Concept name
        concept: String,
    },

    /// Run a quiz on the concepts that need it most
    Quiz {
        /// Number of concepts in the batch
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Manage chat sessions
    #[command(subcommand)]
    Session(SessionCommands),

    /// List tracked concepts
    Concepts {
        /// Only show this category
        #[arg(long, short)]
        category: Option<String>,

        /// Only show concepts due for review
        #[arg(long, short)]
        review: bool,
    },

    /// Show which concepts a piece of text mentions
    Extract {
        /// Text to scan
        text: String,
    },

    /// Show learning statistics
    Stats,

    /// Delete all sessions, messages and concepts
    Reset {
        /// Skip the safety check
        #[arg(long)]
        yes: bool,
    },

    /// Launch interactive terminal UI
    Tui,
}

#[derive(Subcommand)]
enum SessionCommands {
    /// End the current session and start a new one
    New,

    /// List recent sessions
    List {
        /// Filter by title
        #[arg(long, short)]
        search: Option<String>,
    },

    /// Show a session transcript
    Show {
        /// Session ID
        id: i64,
    },

    /// Delete a session with its messages
    Delete {
        /// Session ID
        id: i64,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    logging::init(&config.log_path, logging::DEFAULT_LEVEL)?;

    let db = Database::open(&config.db_path)?;
    db.init()?;
    let cap = config.max_messages_per_session;

    match cli.command {
        Commands::Init => {
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
            } else {
                println!("Database initialized at: {}", config.db_path.display());
            }
        }

        Commands::Chat { message, session } => {
            let llm = HttpLlmClient::new(config.llm.clone())?;
            let mut study = match session {
                Some(id) => StudySession::resume(&db, id, cap)?,
                None => StudySession::open(&db, cap)?,
            };
            let outcome = study.send(&db, &llm, &message)?;
            print_turn(&study, outcome, cli.json)?;
        }

        Commands::Explain { concept } => {
            let llm = HttpLlmClient::new(config.llm.clone())?;
            let mut study = StudySession::open(&db, cap)?;
            let outcome = study.ask_about(&db, &llm, &concept)?;
            print_turn(&study, outcome, cli.json)?;
        }

        Commands::Quiz { limit } => {
            let llm = HttpLlmClient::new(config.llm.clone())?;
            let mut study = StudySession::open(&db, cap)?;
            let limit = limit.unwrap_or(config.quiz_batch_size);
            let stdin = io::stdin();
            let summary = run_quiz(
                &mut study,
                &db,
                &llm,
                limit,
                &mut stdin.lock(),
                &mut io::stdout(),
            )?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&summary))?);
            }
        }

        Commands::Session(session_cmd) => match session_cmd {
            SessionCommands::New => {
                let mut study = StudySession::open(&db, cap)?;
                study.new_session(&db)?;
                if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                            "id": study.session_id()
                        })))?
                    );
                } else {
                    println!("Started session {}.", study.session_id());
                }
            }

            SessionCommands::List { search } => {
                let query = search.unwrap_or_default();
                let sessions: Vec<_> = db
                    .list_recent_sessions(SESSION_LIST_LIMIT)?
                    .into_iter()
                    .filter(|s| s.matches(&query))
                    .collect();

                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&sessions))?);
                } else if sessions.is_empty() {
                    println!("No sessions found.");
                } else {
                    println!("{:<5} {:<12} {:<6} TITLE", "ID", "STARTED", "MSGS");
                    println!("{}", "-".repeat(70));
                    for s in sessions {
                        println!(
                            "{:<5} {:<12} {:<6} {}",
                            s.session.id,
                            format_date(&s.session.started_at),
                            s.session.message_count,
                            s.title
                        );
                    }
                }
            }

            SessionCommands::Show { id } => {
                if let Some(session) = db.get_session(id)? {
                    let messages = db.get_session_messages(id)?;
                    let mut mentioned: Vec<String> = Vec::new();
                    for mention in db.get_concept_mentions(id)? {
                        if let Some(concept) = db.get_concept(mention.concept_id)? {
                            if !mentioned.contains(&concept.name) {
                                mentioned.push(concept.name);
                            }
                        }
                    }

                    if cli.json {
                        println!(
                            "{}",
                            serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                                "session": session,
                                "messages": messages,
                                "concepts": mentioned
                            })))?
                        );
                    } else {
                        let status = if session.is_open() { "open" } else { "ended" };
                        println!(
                            "Session {} ({}, {})",
                            session.id,
                            db.session_title(id, db::DEFAULT_TITLE_LEN)?,
                            status
                        );
                        println!("Started: {}", session.started_at);
                        if let Some(ended) = &session.ended_at {
                            println!("Ended: {}", ended);
                        }
                        if !mentioned.is_empty() {
                            println!("Concepts: {}", mentioned.join(", "));
                        }
                        for msg in messages {
                            println!();
                            println!("[{}]", msg.role.as_str());
                            println!("{}", msg.content);
                        }
                    }
                } else if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string(&JsonOutput::<()>::err("Session not found"))?
                    );
                } else {
                    println!("Session not found.");
                }
            }

            SessionCommands::Delete { id } => {
                if db.delete_session(id)? {
                    if cli.json {
                        println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
                    } else {
                        println!("Session {} deleted.", id);
                    }
                } else if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string(&JsonOutput::<()>::err("Session not found"))?
                    );
                } else {
                    println!("Session not found.");
                }
            }
        },

        Commands::Concepts { category, review } => {
            if review {
                let concepts = db.get_concepts_needing_review()?;
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&concepts))?);
                } else if concepts.is_empty() {
                    println!("Nothing to review.");
                } else {
                    println!("{:<5} {:<32} {:<12} LAST REVIEWED", "ID", "NAME", "LEVEL");
                    println!("{}", "-".repeat(70));
                    for c in concepts {
                        println!(
                            "{:<5} {:<32} {:<12} {}",
                            c.id,
                            truncate(&c.name, 30),
                            c.level_label(),
                            c.last_reviewed_at
                                .as_deref()
                                .map(format_date)
                                .unwrap_or_else(|| "never".to_string())
                        );
                    }
                }
            } else {
                if let Some(wanted) = &category {
                    let known = concepts::category_names()
                        .chain(std::iter::once(concepts::UNCATEGORIZED))
                        .any(|c| c.eq_ignore_ascii_case(wanted));
                    if !known {
                        let names: Vec<&str> = concepts::category_names().collect();
                        return Err(format!(
                            "Unknown category '{}'. Use one of: {}",
                            wanted,
                            names.join(", ")
                        )
                        .into());
                    }
                }

                let groups: Vec<_> = db
                    .get_concepts_by_category()?
                    .into_iter()
                    .filter(|g| match &category {
                        Some(wanted) => g.category.eq_ignore_ascii_case(wanted),
                        None => true,
                    })
                    .collect();

                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&groups))?);
                } else if groups.is_empty() {
                    println!("No concepts found. Chat first!");
                } else {
                    for group in groups {
                        println!("{} ({})", group.category, group.concepts.len());
                        for c in group.concepts {
                            println!(
                                "  {:<32} {:<12} discussed {}x",
                                truncate(&c.name, 30),
                                c.level_label(),
                                c.times_discussed
                            );
                        }
                    }
                }
            }
        }

        Commands::Extract { text } => {
            let found = concepts::extract_concepts(&text);
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&found))?);
            } else if found.is_empty() {
                println!("No known concepts found.");
            } else {
                for c in found {
                    println!("{:<32} {}", c.name, c.category);
                }
            }
        }

        Commands::Stats => {
            let stats = db.get_stats()?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&stats))?);
            } else {
                println!("CyberBud Statistics");
                println!("{}", "=".repeat(30));
                println!("Sessions:          {}", stats.total_sessions);
                println!("Messages:          {}", stats.total_messages);
                println!("Concepts tracked:  {}", stats.total_concepts);
                println!("Needs review:      {}", stats.needs_review);
                println!("Avg understanding: {:.1}", stats.avg_understanding);
            }
        }

        Commands::Reset { yes } => {
            if !yes {
                return Err("refusing to delete all data without --yes".into());
            }
            let mut study = StudySession::open(&db, cap)?;
            study.reset_all(&db)?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
            } else {
                println!("All data deleted. Started session {}.", study.session_id());
            }
        }

        Commands::Tui => {
            let llm = HttpLlmClient::new(config.llm.clone())?;
            tui::run(db, Box::new(llm), &config)?;
        }
    }

    Ok(())
}

fn print_turn(
    study: &StudySession,
    outcome: TurnOutcome,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    match outcome {
        TurnOutcome::Replied(text) => {
            if json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "session_id": study.session_id(),
                        "reply": text,
                        "remaining": study.budget().remaining()
                    })))?
                );
            } else {
                println!("{}", text);
            }
            Ok(())
        }
        TurnOutcome::Refused(_) | TurnOutcome::Failed(_) => {
            let notice = study
                .last_notice()
                .unwrap_or("Message not sent.")
                .to_string();
            if json {
                println!("{}", serde_json::to_string(&JsonOutput::<()>::err(notice))?);
                Ok(())
            } else {
                Err(notice.into())
            }
        }
    }
}

#[derive(Debug, Default, serde::Serialize)]
struct QuizSummary {
    correct: usize,
    answered: usize,
    results: Vec<QuizResult>,
    rating: Option<i32>,
}

/// Line-based quiz. Returns early (unrated) on end of input.
fn run_quiz<R: BufRead, W: Write>(
    study: &mut StudySession,
    db: &Database,
    llm: &dyn LlmClient,
    limit: usize,
    input: &mut R,
    out: &mut W,
) -> Result<QuizSummary, Box<dyn std::error::Error>> {
    let mut summary = QuizSummary::default();

    if !study.start_quiz(db, limit)? {
        writeln!(out, "{}", study.last_notice().unwrap_or("No quiz available."))?;
        return Ok(summary);
    }

    while let Some(quiz) = study.quiz() {
        let (correct, answered) = quiz.score();
        summary.correct = correct;
        summary.answered = answered;
        summary.results = quiz.results().to_vec();

        match quiz.phase() {
            QuizPhase::AwaitingQuestion => {
                writeln!(
                    out,
                    "\nQuiz: {} ({} of {})",
                    quiz.current_concept().name,
                    quiz.current_index() + 1,
                    quiz.concepts().len()
                )?;
                writeln!(out, "Generating question about {}...", quiz.current_concept().name)?;
                match study.load_quiz_question(db, llm)? {
                    LoadOutcome::Ready => {}
                    LoadOutcome::Skipped(_) | LoadOutcome::BudgetExhausted => {
                        if let Some(notice) = study.last_notice() {
                            writeln!(out, "{}", notice)?;
                        }
                    }
                }
            }

            QuizPhase::ShowingQuestion => {
                if let Some(question) = quiz.question() {
                    writeln!(out, "\n{}\n", question.question)?;
                    for letter in Letter::ALL {
                        writeln!(out, "  {}) {}", letter, question.option(letter))?;
                    }
                }
                let letter = loop {
                    let Some(line) = prompt(input, out, "Your answer (A-D): ")? else {
                        study.cancel_quiz();
                        return Ok(summary);
                    };
                    if let Some(letter) = line.chars().next().and_then(Letter::from_char) {
                        break letter;
                    }
                };
                study.answer_quiz(letter)?;
            }

            QuizPhase::ShowingAnswer => {
                if let (Some(question), Some(answer)) = (quiz.question(), quiz.user_answer()) {
                    writeln!(out, "\n{}", question.feedback(answer))?;
                }
                if quiz.is_last() {
                    prompt(input, out, "\nPress Enter to finish: ")?;
                    study.finish_quiz()?;
                } else {
                    match prompt(input, out, "\n[n]ext question or [e]nd quiz: ")? {
                        Some(line) if line.eq_ignore_ascii_case("e") => study.finish_quiz()?,
                        Some(_) => study.next_quiz_question()?,
                        None => study.finish_quiz()?,
                    }
                }
            }

            QuizPhase::AwaitingRating => {
                writeln!(out, "\nQuiz Complete!")?;
                if answered > 0 {
                    writeln!(out, "Score: {} / {}", correct, answered)?;
                }
                let names: Vec<&str> = quiz.concepts().iter().map(|c| c.name.as_str()).collect();
                writeln!(out, "Concepts: {}", names.join(", "))?;

                let level = loop {
                    let Some(line) = prompt(
                        input,
                        out,
                        "Rate your understanding: [1] Still fuzzy  [3] Getting it  [5] Got it! ",
                    )?
                    else {
                        study.cancel_quiz();
                        return Ok(summary);
                    };
                    match line.as_str() {
                        "1" => break 1,
                        "3" => break 3,
                        "5" => break 5,
                        _ => {}
                    }
                };
                let level = study.rate_quiz(db, level)?;
                writeln!(out, "Saved: {}", level_label(level))?;
                summary.rating = Some(level);
            }
        }
    }

    Ok(summary)
}

fn prompt<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    label: &str,
) -> io::Result<Option<String>> {
    write!(out, "{}", label)?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn format_date(timestamp: &str) -> String {
    timestamp.get(..10).unwrap_or(timestamp).to_string()
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
