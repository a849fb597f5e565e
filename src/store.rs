#[cfg(test)]
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::Card;

/// Key-value card storage with lookups by deck, "is new" and next review date.
///
/// `query_new` returns the oldest cards first (`created_at`, then id) and
/// `query_due_before` returns graduated cards ordered by `next_review_date`,
/// then id.
pub trait RecordStore {
    fn get_card(&self, id: Uuid) -> Result<Option<Card>>;

    /// Inserts or replaces a card. The caller sets `updated_at`.
    fn put_card(&mut self, card: &Card) -> Result<()>;

    fn query_cards(&self, deck_id: Option<Uuid>) -> Result<Vec<Card>>;

    fn query_new(&self, deck_id: Option<Uuid>, limit: usize) -> Result<Vec<Card>>;

    fn query_due_before(&self, before: DateTime<Utc>, deck_id: Option<Uuid>)
        -> Result<Vec<Card>>;

    fn delete_card(&mut self, id: Uuid) -> Result<bool>;

    fn require_card(&self, id: Uuid) -> Result<Card> {
        self.get_card(id)?
            .ok_or_else(|| Error::NotFound(format!("card {}", id)))
    }
}

/// In-process store backing the scheduling and session tests.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    cards: BTreeMap<Uuid, Card>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cards(cards: impl IntoIterator<Item = Card>) -> Self {
        Self {
            cards: cards.into_iter().map(|c| (c.id, c)).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    fn in_deck(card: &Card, deck_id: Option<Uuid>) -> bool {
        deck_id.map_or(true, |d| card.deck_id == d)
    }
}

#[cfg(test)]
impl RecordStore for MemoryStore {
    fn get_card(&self, id: Uuid) -> Result<Option<Card>> {
        Ok(self.cards.get(&id).cloned())
    }

    fn put_card(&mut self, card: &Card) -> Result<()> {
        self.cards.insert(card.id, card.clone());
        Ok(())
    }

    fn query_cards(&self, deck_id: Option<Uuid>) -> Result<Vec<Card>> {
        Ok(self
            .cards
            .values()
            .filter(|c| Self::in_deck(c, deck_id))
            .cloned()
            .collect())
    }

    fn query_new(&self, deck_id: Option<Uuid>, limit: usize) -> Result<Vec<Card>> {
        let mut cards: Vec<Card> = self
            .cards
            .values()
            .filter(|c| c.is_new && Self::in_deck(c, deck_id))
            .cloned()
            .collect();
        cards.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        cards.truncate(limit);
        Ok(cards)
    }

    fn query_due_before(
        &self,
        before: DateTime<Utc>,
        deck_id: Option<Uuid>,
    ) -> Result<Vec<Card>> {
        let mut cards: Vec<Card> = self
            .cards
            .values()
            .filter(|c| !c.is_new && c.next_review_date <= before && Self::in_deck(c, deck_id))
            .cloned()
            .collect();
        cards.sort_by(|a, b| {
            a.next_review_date
                .cmp(&b.next_review_date)
                .then(a.id.cmp(&b.id))
        });
        Ok(cards)
    }

    fn delete_card(&mut self, id: Uuid) -> Result<bool> {
        Ok(self.cards.remove(&id).is_some())
    }
}
