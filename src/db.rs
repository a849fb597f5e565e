use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info, warn};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{validate_card_content, validate_deck_name, Card, Deck};
use crate::scheduler;
use crate::store::RecordStore;

const CARD_COLUMNS: &str = "id, deck_id, front, back, interval_days, repetitions, ease_factor, \
                            next_review_date, is_new, created_at, updated_at";

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
            CREATE TABLE IF NOT EXISTS decks (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cards (
                id TEXT PRIMARY KEY,
                deck_id TEXT NOT NULL,
                front TEXT NOT NULL,
                back TEXT NOT NULL,
                interval_days REAL NOT NULL DEFAULT 1.0 CHECK(interval_days >= 0),
                repetitions INTEGER NOT NULL DEFAULT 0,
                ease_factor REAL NOT NULL DEFAULT 2.5,
                next_review_date INTEGER NOT NULL,
                is_new INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (deck_id) REFERENCES decks(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_decks_name ON decks(name);
            CREATE INDEX IF NOT EXISTS idx_cards_deck ON cards(deck_id);
            CREATE INDEX IF NOT EXISTS idx_cards_schedule ON cards(is_new, next_review_date);
            "#,
        )?;
        Ok(())
    }

    /// Runs `f` inside a transaction, rolling back if it returns an error.
    pub fn with_transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    warn!("rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    // Deck operations
    pub fn create_deck(&self, name: &str, description: Option<&str>) -> Result<Deck> {
        let name = validate_deck_name(name)?;
        let description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(String::from);

        let deck = Deck::new(name, description);
        self.put_deck(&deck)?;
        info!("created deck '{}' ({})", deck.name, deck.id);
        Ok(deck)
    }

    pub fn put_deck(&self, deck: &Deck) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO decks (id, name, description, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                updated_at = excluded.updated_at
            "#,
            params![
                deck.id.to_string(),
                deck.name,
                deck.description,
                to_db_time(&deck.created_at),
                to_db_time(&deck.updated_at)
            ],
        )?;
        Ok(())
    }

    pub fn get_deck(&self, id: Uuid) -> Result<Option<Deck>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, created_at, updated_at FROM decks WHERE id = ?1",
        )?;

        match stmt.query_row(params![id.to_string()], deck_from_row) {
            Ok(deck) => Ok(Some(deck)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn require_deck(&self, id: Uuid) -> Result<Deck> {
        self.get_deck(id)?
            .ok_or_else(|| Error::NotFound(format!("deck {}", id)))
    }

    pub fn find_deck_by_name(&self, name: &str) -> Result<Option<Deck>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, description, created_at, updated_at
            FROM decks
            WHERE name = ?1
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )?;

        match stmt.query_row(params![name.trim()], deck_from_row) {
            Ok(deck) => Ok(Some(deck)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_decks(&self) -> Result<Vec<Deck>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, description, created_at, updated_at
            FROM decks
            ORDER BY created_at, name
            "#,
        )?;
        let rows = stmt.query_map([], deck_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Deletes a deck together with all of its cards.
    pub fn delete_deck(&self, id: Uuid) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let cards = tx.execute(
            "DELETE FROM cards WHERE deck_id = ?1",
            params![id.to_string()],
        )?;
        let decks = tx.execute("DELETE FROM decks WHERE id = ?1", params![id.to_string()])?;
        tx.commit()?;

        if decks > 0 {
            info!("deleted deck {} and {} card(s)", id, cards);
        }
        Ok(decks > 0)
    }

    // Card operations
    pub fn add_card(&self, deck_id: Uuid, front: &str, back: &str) -> Result<Card> {
        let (front, back) = validate_card_content(front, back)?;
        self.require_deck(deck_id)?;

        let card = scheduler::new_card(front, back, deck_id);
        self.upsert_card(&card)?;
        info!("added card {} to deck {}", card.id, deck_id);
        Ok(card)
    }

    /// Replaces the text of a card; scheduling state is left as is.
    pub fn update_card_text(&self, id: Uuid, front: &str, back: &str) -> Result<Card> {
        let (front, back) = validate_card_content(front, back)?;
        let existing = self
            .fetch_card(id)?
            .ok_or_else(|| Error::NotFound(format!("card {}", id)))?;

        let card = Card {
            front,
            back,
            updated_at: Utc::now(),
            ..existing
        };
        self.upsert_card(&card)?;
        Ok(card)
    }

    /// Cards of a deck (or all decks), oldest first, optionally filtered by text.
    pub fn list_cards(&self, deck_id: Option<Uuid>, search: Option<&str>) -> Result<Vec<Card>> {
        let cards = self.select_cards(
            "WHERE (?1 IS NULL OR deck_id = ?1) ORDER BY created_at ASC, id ASC",
            params![deck_id.map(|d| d.to_string())],
        )?;

        Ok(match search {
            Some(term) => cards.into_iter().filter(|c| c.matches(term)).collect(),
            None => cards,
        })
    }

    fn fetch_card(&self, id: Uuid) -> Result<Option<Card>> {
        Ok(self
            .select_cards("WHERE id = ?1", params![id.to_string()])?
            .into_iter()
            .next())
    }

    fn upsert_card(&self, card: &Card) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO cards (id, deck_id, front, back, interval_days, repetitions, ease_factor,
                               next_review_date, is_new, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                deck_id = excluded.deck_id,
                front = excluded.front,
                back = excluded.back,
                interval_days = excluded.interval_days,
                repetitions = excluded.repetitions,
                ease_factor = excluded.ease_factor,
                next_review_date = excluded.next_review_date,
                is_new = excluded.is_new,
                updated_at = excluded.updated_at
            "#,
            params![
                card.id.to_string(),
                card.deck_id.to_string(),
                card.front,
                card.back,
                card.interval,
                card.repetitions,
                card.ease_factor,
                to_db_time(&card.next_review_date),
                card.is_new,
                to_db_time(&card.created_at),
                to_db_time(&card.updated_at)
            ],
        )?;
        Ok(())
    }

    fn select_cards(&self, clause: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Card>> {
        let query = format!("SELECT {} FROM cards {}", CARD_COLUMNS, clause);
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(params, card_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl RecordStore for Database {
    fn get_card(&self, id: Uuid) -> Result<Option<Card>> {
        self.fetch_card(id)
    }

    fn put_card(&mut self, card: &Card) -> Result<()> {
        self.upsert_card(card)
    }

    fn query_cards(&self, deck_id: Option<Uuid>) -> Result<Vec<Card>> {
        self.list_cards(deck_id, None)
    }

    fn query_new(&self, deck_id: Option<Uuid>, limit: usize) -> Result<Vec<Card>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let cards = self.select_cards(
            r#"
            WHERE is_new = 1 AND (?1 IS NULL OR deck_id = ?1)
            ORDER BY created_at ASC, id ASC
            LIMIT ?2
            "#,
            params![deck_id.map(|d| d.to_string()), limit],
        )?;
        debug!("query_new returned {} card(s)", cards.len());
        Ok(cards)
    }

    fn query_due_before(
        &self,
        before: DateTime<Utc>,
        deck_id: Option<Uuid>,
    ) -> Result<Vec<Card>> {
        let cards = self.select_cards(
            r#"
            WHERE is_new = 0 AND next_review_date <= ?1 AND (?2 IS NULL OR deck_id = ?2)
            ORDER BY next_review_date ASC, id ASC
            "#,
            params![to_db_time(&before), deck_id.map(|d| d.to_string())],
        )?;
        debug!("query_due_before returned {} card(s)", cards.len());
        Ok(cards)
    }

    fn delete_card(&mut self, id: Uuid) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM cards WHERE id = ?1", params![id.to_string()])?;
        Ok(rows > 0)
    }
}

// Timestamps are stored as Unix epoch milliseconds.
fn to_db_time(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn time_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp {} out of range", millis).into(),
        )
    })
}

fn uuid_column(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn deck_from_row(row: &Row) -> rusqlite::Result<Deck> {
    Ok(Deck {
        id: uuid_column(row, 0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: time_column(row, 3)?,
        updated_at: time_column(row, 4)?,
    })
}

fn card_from_row(row: &Row) -> rusqlite::Result<Card> {
    Ok(Card {
        id: uuid_column(row, 0)?,
        deck_id: uuid_column(row, 1)?,
        front: row.get(2)?,
        back: row.get(3)?,
        interval: row.get(4)?,
        repetitions: row.get(5)?,
        ease_factor: row.get(6)?,
        next_review_date: time_column(row, 7)?,
        is_new: row.get(8)?,
        created_at: time_column(row, 9)?,
        updated_at: time_column(row, 10)?,
    })
}
