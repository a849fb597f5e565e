//! JSON export and import of every deck and card.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{validate_deck_name, Card, Deck, MAX_CARD_SIDE_LEN};
use crate::scheduler::{MAX_INTERVAL_DAYS, MIN_EASE_FACTOR};
use crate::store::RecordStore;

pub const EXPORT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub version: String,
    pub export_date: DateTime<Utc>,
    pub decks: Vec<Deck>,
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub decks_imported: usize,
    pub decks_skipped: usize,
    pub cards_imported: usize,
    pub cards_updated: usize,
    pub cards_skipped: usize,
}

pub fn export_all(db: &Database, now: DateTime<Utc>) -> Result<ExportData> {
    let decks = db.list_decks()?;
    let cards = db.list_cards(None, None)?;
    info!("exporting {} deck(s) and {} card(s)", decks.len(), cards.len());

    Ok(ExportData {
        version: EXPORT_VERSION.to_string(),
        export_date: now,
        decks,
        cards,
    })
}

/// Merges a backup into the database in a single transaction.
///
/// Decks are only ever added. An imported deck whose name is already taken is
/// folded into the existing deck. Cards are added when absent and replaced
/// when the imported copy has a strictly newer `updatedAt`.
pub fn import(db: &mut Database, data: &ExportData) -> Result<ImportSummary> {
    if data.version.trim().is_empty() {
        return Err(Error::InvalidArgument("backup has no version".to_string()));
    }

    let summary = db.with_transaction(|db| merge(db, data))?;
    info!(
        "import finished: {} deck(s), {} new card(s), {} updated, {} skipped",
        summary.decks_imported,
        summary.cards_imported,
        summary.cards_updated,
        summary.decks_skipped + summary.cards_skipped
    );
    Ok(summary)
}

fn merge(db: &mut Database, data: &ExportData) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    let mut deck_ids: HashMap<Uuid, Uuid> = HashMap::new();

    for deck in &data.decks {
        let name = match validate_deck_name(&deck.name) {
            Ok(name) => name,
            Err(e) => {
                warn!("skipping deck {}: {}", deck.id, e);
                summary.decks_skipped += 1;
                continue;
            }
        };

        if db.get_deck(deck.id)?.is_some() {
            deck_ids.insert(deck.id, deck.id);
        } else if let Some(existing) = db.find_deck_by_name(&name)? {
            deck_ids.insert(deck.id, existing.id);
        } else {
            db.put_deck(&Deck {
                name,
                ..deck.clone()
            })?;
            deck_ids.insert(deck.id, deck.id);
            summary.decks_imported += 1;
        }
    }

    for card in &data.cards {
        let deck_id = match resolve_deck(db, &deck_ids, card.deck_id)? {
            Some(id) => id,
            None => {
                warn!("skipping card {}: unknown deck {}", card.id, card.deck_id);
                summary.cards_skipped += 1;
                continue;
            }
        };
        if let Err(reason) = check_card(card) {
            warn!("skipping card {}: {}", card.id, reason);
            summary.cards_skipped += 1;
            continue;
        }

        let incoming = Card {
            deck_id,
            ..card.clone()
        };
        match db.get_card(card.id)? {
            None => {
                db.put_card(&incoming)?;
                summary.cards_imported += 1;
            }
            Some(existing) if incoming.updated_at > existing.updated_at => {
                db.put_card(&incoming)?;
                summary.cards_updated += 1;
            }
            Some(_) => {}
        }
    }

    Ok(summary)
}

fn resolve_deck(db: &Database, known: &HashMap<Uuid, Uuid>, id: Uuid) -> Result<Option<Uuid>> {
    if let Some(mapped) = known.get(&id) {
        return Ok(Some(*mapped));
    }
    Ok(db.get_deck(id)?.map(|d| d.id))
}

fn check_card(card: &Card) -> std::result::Result<(), &'static str> {
    if card.front.trim().is_empty() || card.back.trim().is_empty() {
        return Err("empty side");
    }
    let too_long = |side: &str| side.chars().count() > MAX_CARD_SIDE_LEN;
    if too_long(&card.front) || too_long(&card.back) {
        return Err("side too long");
    }
    if !card.ease_factor.is_finite() || card.ease_factor < MIN_EASE_FACTOR {
        return Err("ease factor below minimum");
    }
    if !card.interval.is_finite() || !(0.0..=MAX_INTERVAL_DAYS).contains(&card.interval) {
        return Err("interval out of range");
    }
    Ok(())
}

pub fn write_file(path: &Path, data: &ExportData) -> Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn read_file(path: &Path) -> Result<ExportData> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// File name used when no path is given, e.g. `recall-backup-2024-05-01.json`.
pub fn default_file_name(now: DateTime<Utc>) -> String {
    format!("recall-backup-{}.json", now.format("%Y-%m-%d"))
}
