mod backup;
mod config;
mod db;
mod error;
mod models;
mod queries;
mod scheduler;
mod session;
mod store;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use config::Config;
use db::Database;
use error::{Error, Result};
use models::{Card, Deck, JsonOutput, ReviewOutcome};
use session::{SessionState, SharedSession, StudySession};
use store::RecordStore;

#[derive(Parser)]
#[command(name = "recall")]
#[command(about = "A spaced-repetition flashcard scheduler")]
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

    /// Manage decks
    #[command(subcommand)]
    Deck(DeckCommands),

    /// Manage cards
    #[command(subcommand)]
    Card(CardCommands),

    /// List cards due for review
    Due {
        /// Deck ID or name
        #[arg(long, short)]
        deck: Option<String>,
    },

    /// List new cards in study order
    New {
        /// Deck ID or name
        #[arg(long, short)]
        deck: Option<String>,

        /// Maximum number of cards (defaults to new_cards_per_session)
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Show card counts
    Stats {
        /// Deck ID or name
        #[arg(long, short)]
        deck: Option<String>,
    },

    /// Record a review outcome for a card
    Review {
        /// Card ID
        id: String,

        /// Review outcome: again/hard/good/easy (or 1-4)
        #[arg(long, short)]
        outcome: String,
    },

    /// Show the next interval for each possible outcome
    Preview {
        /// Card ID
        id: String,
    },

    /// Study due and new cards interactively
    Study {
        /// Deck ID or name
        #[arg(long, short)]
        deck: Option<String>,
    },

    /// Export all decks and cards to a JSON file
    Export {
        /// Output file (defaults to recall-backup-<date>.json)
        file: Option<PathBuf>,
    },

    /// Import decks and cards from a JSON backup
    Import {
        /// Backup file
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum DeckCommands {
    /// Create a deck
    Add {
        /// Deck name
        name: String,

        /// Deck description
        #[arg(long, short)]
        description: Option<String>,
    },

    /// List all decks
    List,

    /// Show deck details
    Show {
        /// Deck ID or name
        deck: String,
    },

    /// Delete a deck and all of its cards
    Delete {
        /// Deck ID or name
        deck: String,
    },
}

#[derive(Subcommand)]
enum CardCommands {
    /// Add a card to a deck
    Add {
        /// Deck ID or name
        deck: String,

        /// Question side
        front: String,

        /// Answer side
        back: String,
    },

    /// List cards
    List {
        /// Deck ID or name
        #[arg(long, short)]
        deck: Option<String>,

        /// Only cards whose front or back contains this text
        #[arg(long, short)]
        search: Option<String>,
    },

    /// Show card details
    Show {
        /// Card ID
        id: String,
    },

    /// Change the text of a card
    Edit {
        /// Card ID
        id: String,

        /// New question side
        #[arg(long, short)]
        front: Option<String>,

        /// New answer side
        #[arg(long, short)]
        back: Option<String>,
    },

    /// Delete a card
    Delete {
        /// Card ID
        id: String,
    },
}

#[derive(Serialize)]
struct DeckDetails {
    deck: Deck,
    total: usize,
    new: usize,
    due: usize,
    learned: usize,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = run(cli) {
        if json {
            if let Ok(out) = serde_json::to_string(&JsonOutput::<()>::err(e.to_string())) {
                println!("{}", out);
            }
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db_path = config.database_path();
    let mut db = Database::open(&db_path)?;

    match cli.command {
        Commands::Init => {
            db.init()?;
            let config_path = Config::path();
            if !config_path.exists() {
                config.save_to(&config_path)?;
            }
            if cli.json {
                print_json(())?;
            } else {
                println!("Database initialized at: {}", db_path.display());
            }
        }

        Commands::Deck(deck_cmd) => match deck_cmd {
            DeckCommands::Add { name, description } => {
                let deck = db.create_deck(&name, description.as_deref())?;
                if cli.json {
                    print_json(&deck)?;
                } else {
                    println!("Created deck '{}' with ID: {}", deck.name, deck.id);
                }
            }

            DeckCommands::List => {
                let decks = db.list_decks()?;
                let now = Utc::now();
                let mut rows = Vec::with_capacity(decks.len());
                for deck in decks {
                    rows.push(deck_details(&db, deck, now)?);
                }

                if cli.json {
                    print_json(&rows)?;
                } else if rows.is_empty() {
                    println!("No decks found.");
                } else {
                    println!(
                        "{:<36}  {:<30} {:>6} {:>5} {:>5}",
                        "ID", "NAME", "CARDS", "NEW", "DUE"
                    );
                    println!("{}", "-".repeat(88));
                    for row in rows {
                        println!(
                            "{:<36}  {:<30} {:>6} {:>5} {:>5}",
                            row.deck.id,
                            truncate(&row.deck.name, 30),
                            row.total,
                            row.new,
                            row.due
                        );
                    }
                }
            }

            DeckCommands::Show { deck } => {
                let deck = resolve_deck(&db, &deck)?;
                let details = deck_details(&db, deck, Utc::now())?;
                if cli.json {
                    print_json(&details)?;
                } else {
                    println!("Deck: {}", details.deck.name);
                    println!("ID: {}", details.deck.id);
                    if let Some(desc) = &details.deck.description {
                        println!("Description: {}", desc);
                    }
                    println!("Created: {}", local_time(&details.deck.created_at));
                    println!();
                    println!("Cards: {}", details.total);
                    println!("  new: {}", details.new);
                    println!("  due: {}", details.due);
                    println!("  learned: {}", details.learned);
                }
            }

            DeckCommands::Delete { deck } => {
                let deck = resolve_deck(&db, &deck)?;
                db.delete_deck(deck.id)?;
                if cli.json {
                    print_json(())?;
                } else {
                    println!("Deck '{}' deleted.", deck.name);
                }
            }
        },

        Commands::Card(card_cmd) => match card_cmd {
            CardCommands::Add { deck, front, back } => {
                let deck = resolve_deck(&db, &deck)?;
                let card = db.add_card(deck.id, &front, &back)?;
                if cli.json {
                    print_json(&card)?;
                } else {
                    println!("Added card to '{}' with ID: {}", deck.name, card.id);
                }
            }

            CardCommands::List { deck, search } => {
                let deck_id = resolve_deck_filter(&db, deck.as_deref())?;
                let cards = db.list_cards(deck_id, search.as_deref())?;
                if cli.json {
                    print_json(&cards)?;
                } else {
                    print_card_table(&cards, Utc::now());
                }
            }

            CardCommands::Show { id } => {
                let card = db.require_card(parse_id(&id, "card")?)?;
                if cli.json {
                    print_json(&card)?;
                } else {
                    let now = Utc::now();
                    println!("Front: {}", card.front);
                    println!("Back: {}", card.back);
                    println!("ID: {}", card.id);
                    println!("Deck: {}", card.deck_id);
                    println!("Status: {}", card.status(now).label());
                    println!();
                    println!("--- Schedule ---");
                    println!("Interval: {}", scheduler::format_interval(card.interval));
                    println!("Repetitions: {}", card.repetitions);
                    println!("Ease factor: {:.2}", card.ease_factor);
                    println!("Next review: {}", local_time(&card.next_review_date));
                }
            }

            CardCommands::Edit { id, front, back } => {
                let card = db.require_card(parse_id(&id, "card")?)?;
                if front.is_none() && back.is_none() {
                    return Err(Error::InvalidArgument(
                        "nothing to change, pass --front and/or --back".to_string(),
                    ));
                }
                let front = front.unwrap_or(card.front);
                let back = back.unwrap_or(card.back);
                let card = db.update_card_text(card.id, &front, &back)?;
                if cli.json {
                    print_json(&card)?;
                } else {
                    println!("Updated card {}.", card.id);
                }
            }

            CardCommands::Delete { id } => {
                let id = parse_id(&id, "card")?;
                if !db.delete_card(id)? {
                    return Err(Error::NotFound(format!("card {}", id)));
                }
                if cli.json {
                    print_json(())?;
                } else {
                    println!("Card {} deleted.", id);
                }
            }
        },

        Commands::Due { deck } => {
            let deck_id = resolve_deck_filter(&db, deck.as_deref())?;
            let now = Utc::now();
            let cards = queries::get_due(&db, deck_id, now)?;
            if cli.json {
                print_json(&cards)?;
            } else if cards.is_empty() {
                println!("Nothing due. Come back later!");
            } else {
                print_card_table(&cards, now);
            }
        }

        Commands::New { deck, limit } => {
            let deck_id = resolve_deck_filter(&db, deck.as_deref())?;
            let limit = limit.unwrap_or(config.new_cards_per_session);
            let cards = queries::get_new(&db, deck_id, limit)?;
            if cli.json {
                print_json(&cards)?;
            } else if cards.is_empty() {
                println!("No new cards.");
            } else {
                print_card_table(&cards, Utc::now());
            }
        }

        Commands::Stats { deck } => {
            let deck_id = resolve_deck_filter(&db, deck.as_deref())?;
            let counts = queries::get_counts(&db, deck_id, Utc::now())?;
            if cli.json {
                print_json(serde_json::json!({
                    "total": counts.total,
                    "new": counts.new,
                    "due": counts.due,
                    "learned": counts.learned()
                }))?;
            } else {
                println!("=== Card Statistics ===");
                println!("Total cards: {}", counts.total);
                println!("New: {}", counts.new);
                println!("Due for review: {}", counts.due);
                println!("Learned: {}", counts.learned());
            }
        }

        Commands::Review { id, outcome } => {
            let outcome = ReviewOutcome::parse(&outcome)?;
            let card = db.require_card(parse_id(&id, "card")?)?;
            let updated = scheduler::update(&card, outcome);
            db.put_card(&updated)?;

            if cli.json {
                print_json(&updated)?;
            } else {
                println!("Recorded '{}' for card {}.", outcome.as_str(), updated.id);
                println!(
                    "Next review in {} ({})",
                    scheduler::format_interval(updated.interval),
                    local_time(&updated.next_review_date)
                );
            }
        }

        Commands::Preview { id } => {
            let card = db.require_card(parse_id(&id, "card")?)?;
            let previews = scheduler::preview_all(&card);
            if cli.json {
                let map: serde_json::Map<String, serde_json::Value> = previews
                    .into_iter()
                    .map(|(outcome, label)| (outcome.as_str().to_string(), label.into()))
                    .collect();
                print_json(map)?;
            } else {
                println!("{}", card.front);
                println!();
                for (outcome, label) in previews {
                    println!("  {:<6} {}", outcome.as_str(), label);
                }
            }
        }

        Commands::Study { deck } => {
            let deck_id = resolve_deck_filter(&db, deck.as_deref())?;
            let mut session = StudySession::new(deck_id, config.new_cards_per_session);
            session.load(&db, Utc::now())?;
            let session = SharedSession::new(session);

            let stdin = io::stdin();
            if cli.json {
                study(&mut db, &session, stdin.lock(), io::sink())?;
                print_json(session.with(|s| s.summary(Utc::now()))?)?;
            } else {
                study(&mut db, &session, stdin.lock(), io::stdout())?;
            }
        }

        Commands::Export { file } => {
            let now = Utc::now();
            let path = file.unwrap_or_else(|| PathBuf::from(backup::default_file_name(now)));
            let data = backup::export_all(&db, now)?;
            backup::write_file(&path, &data)?;
            if cli.json {
                print_json(serde_json::json!({
                    "path": path,
                    "decks": data.decks.len(),
                    "cards": data.cards.len()
                }))?;
            } else {
                println!(
                    "Exported {} deck(s) and {} card(s) to {}",
                    data.decks.len(),
                    data.cards.len(),
                    path.display()
                );
            }
        }

        Commands::Import { file } => {
            let data = backup::read_file(&file)?;
            let summary = backup::import(&mut db, &data)?;
            if cli.json {
                print_json(&summary)?;
            } else {
                println!(
                    "Imported {} deck(s) ({} skipped), {} new card(s), {} updated, {} skipped.",
                    summary.decks_imported,
                    summary.decks_skipped,
                    summary.cards_imported,
                    summary.cards_updated,
                    summary.cards_skipped
                );
            }
        }
    }

    Ok(())
}

/// Runs a study session over line-based input until the queue is exhausted,
/// input ends or the user types `q`.
fn study<R: BufRead, W: Write>(
    store: &mut dyn RecordStore,
    session: &SharedSession,
    mut input: R,
    mut out: W,
) -> Result<()> {
    if session.with(|s| s.state())? == SessionState::Empty {
        writeln!(out, "Nothing to study right now.")?;
        return Ok(());
    }

    let total = session.with(|s| s.queue().len())?;
    loop {
        let current = session.with(|s| {
            s.current_card()
                .cloned()
                .map(|card| (card, s.is_answer_revealed(), s.position(), s.progress()))
        })?;
        let Some((card, revealed, position, progress)) = current else {
            break;
        };

        if !revealed {
            writeln!(out)?;
            writeln!(
                out,
                "[{}/{}] {} ({:.0}% done)",
                position + 1,
                total,
                card.front,
                progress
            )?;
            write!(out, "Press Enter to show the answer (q to quit) ")?;
            out.flush()?;

            match read_line(&mut input)? {
                Some(line) if line.eq_ignore_ascii_case("q") => break,
                Some(_) => {}
                None => break,
            }

            session.reveal_answer()?;
            writeln!(out, "{}", card.back)?;
            let choices: Vec<String> = scheduler::preview_all(&card)
                .into_iter()
                .enumerate()
                .map(|(i, (outcome, label))| {
                    format!("{}) {} ({})", i + 1, outcome.as_str(), label)
                })
                .collect();
            writeln!(out, "{}", choices.join("  "))?;
            continue;
        }

        write!(out, "> ")?;
        out.flush()?;
        let line = match read_line(&mut input)? {
            Some(line) if !line.eq_ignore_ascii_case("q") => line,
            _ => break,
        };
        match ReviewOutcome::from_str(&line) {
            Some(outcome) => {
                let result = session.submit_review(store, outcome)?;
                writeln!(
                    out,
                    "Next review in {}",
                    scheduler::format_interval(result.card.interval)
                )?;
                if result.completed {
                    break;
                }
            }
            None => writeln!(out, "Answer with again, hard, good or easy (1-4).")?,
        }
    }

    let summary = session.with(|s| s.summary(Utc::now()))?;
    writeln!(out)?;
    writeln!(out, "=== Session Summary ===")?;
    writeln!(out, "Studied: {}", summary.total_studied)?;
    writeln!(
        out,
        "Correct: {}  Incorrect: {}  Accuracy: {}%",
        summary.correct, summary.incorrect, summary.accuracy
    )?;
    writeln!(out, "New: {}  Review: {}", summary.new_cards, summary.review_cards)?;
    writeln!(out, "Time: {}", summary.duration)?;
    Ok(())
}

fn read_line<R: BufRead>(input: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn print_json<T: Serialize>(data: T) -> Result<()> {
    println!("{}", serde_json::to_string(&JsonOutput::ok(data))?);
    Ok(())
}

fn print_card_table(cards: &[Card], now: DateTime<Utc>) {
    if cards.is_empty() {
        println!("No cards found.");
        return;
    }
    println!("{:<36}  {:<30} {:<8} NEXT REVIEW", "ID", "FRONT", "STATUS");
    println!("{}", "-".repeat(96));
    for card in cards {
        println!(
            "{:<36}  {:<30} {:<8} {}",
            card.id,
            truncate(&card.front, 30),
            card.status(now).label(),
            local_time(&card.next_review_date)
        );
    }
}

fn deck_details(db: &Database, deck: Deck, now: DateTime<Utc>) -> Result<DeckDetails> {
    let counts = queries::get_counts(db, Some(deck.id), now)?;
    Ok(DeckDetails {
        deck,
        total: counts.total,
        new: counts.new,
        due: counts.due,
        learned: counts.learned(),
    })
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| Error::InvalidArgument(format!("'{}' is not a valid {} ID", raw, what)))
}

/// Accepts either a deck ID or an exact deck name.
fn resolve_deck(db: &Database, key: &str) -> Result<Deck> {
    if let Ok(id) = Uuid::parse_str(key.trim()) {
        return db.require_deck(id);
    }
    db.find_deck_by_name(key)?
        .ok_or_else(|| Error::NotFound(format!("deck '{}'", key)))
}

fn resolve_deck_filter(db: &Database, key: Option<&str>) -> Result<Option<Uuid>> {
    key.map(|k| resolve_deck(db, k).map(|d| d.id)).transpose()
}

fn local_time(dt: &DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
