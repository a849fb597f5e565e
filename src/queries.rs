//! Candidate pools for a study session.
//!
//! New cards come back oldest first (`created_at`, then id). Due cards come
//! back earliest-due first, ties broken by id. Both orders are enforced here
//! rather than trusted to the store.

use chrono::{DateTime, Utc};
use log::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Card, CardCounts};
use crate::store::RecordStore;

pub fn get_new(store: &dyn RecordStore, deck_id: Option<Uuid>, limit: usize) -> Result<Vec<Card>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut cards: Vec<Card> = store
        .query_new(deck_id, limit)?
        .into_iter()
        .filter(|c| c.is_new && deck_id.map_or(true, |d| c.deck_id == d))
        .collect();
    cards.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    cards.truncate(limit);

    debug!("{} new card(s) selected (limit {})", cards.len(), limit);
    Ok(cards)
}

pub fn get_due(
    store: &dyn RecordStore,
    deck_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<Vec<Card>> {
    let mut cards: Vec<Card> = store
        .query_due_before(now, deck_id)?
        .into_iter()
        .filter(|c| c.is_due(now) && deck_id.map_or(true, |d| c.deck_id == d))
        .collect();
    cards.sort_by(|a, b| {
        a.next_review_date
            .cmp(&b.next_review_date)
            .then(a.id.cmp(&b.id))
    });

    debug!("{} due card(s) selected", cards.len());
    Ok(cards)
}

/// Totals for a deck (or everything). A card that is both new and overdue
/// counts as new.
pub fn get_counts(
    store: &dyn RecordStore,
    deck_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<CardCounts> {
    let counts = store
        .query_cards(deck_id)?
        .iter()
        .fold(CardCounts::default(), |mut counts, card| {
            counts.total += 1;
            if card.is_new {
                counts.new += 1;
            } else if card.next_review_date <= now {
                counts.due += 1;
            }
            counts
        });
    Ok(counts)
}
