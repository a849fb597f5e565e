//! A single study pass over the cards that are due or new "now".
//!
//! ```text
//! Loading --load--> Empty            (nothing to study)
//!         --load--> Active --submit--> Active | Completed
//! ```
//!
//! Due cards are studied before new ones. A review is written to the store
//! before the session advances, so a failed write leaves the session on the
//! same card and the caller can simply retry.

use std::sync::{Arc, Mutex, TryLockError};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Card, ReviewOutcome};
use crate::queries;
use crate::scheduler;
use crate::store::RecordStore;

pub const DEFAULT_NEW_CARD_CAP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Loading,
    Active,
    Completed,
    Empty,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub cards_studied: usize,
    pub correct: usize,
    pub new_cards: usize,
    pub review_cards: usize,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub accuracy: u32,
    pub total_studied: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub new_cards: usize,
    pub review_cards: usize,
    pub duration: String,
}

/// What happened to the card that was just reviewed.
#[derive(Debug, Clone)]
pub struct ReviewResult {
    pub card: Card,
    pub completed: bool,
}

#[derive(Debug)]
pub struct StudySession {
    deck_id: Option<Uuid>,
    new_card_cap: usize,
    state: SessionState,
    queue: Vec<Card>,
    index: usize,
    answer_revealed: bool,
    stats: SessionStats,
}

impl StudySession {
    pub fn new(deck_id: Option<Uuid>, new_card_cap: usize) -> Self {
        Self {
            deck_id,
            new_card_cap,
            state: SessionState::Loading,
            queue: Vec::new(),
            index: 0,
            answer_revealed: false,
            stats: SessionStats {
                cards_studied: 0,
                correct: 0,
                new_cards: 0,
                review_cards: 0,
                started_at: Utc::now(),
            },
        }
    }

    /// Fetches due and new cards and builds the queue.
    pub fn load(&mut self, store: &dyn RecordStore, now: DateTime<Utc>) -> Result<SessionState> {
        if self.state != SessionState::Loading {
            return Err(Error::InvalidState(format!(
                "session already loaded ({:?})",
                self.state
            )));
        }

        let due = queries::get_due(store, self.deck_id, now)?;
        let new = queries::get_new(store, self.deck_id, self.new_card_cap)?;

        self.stats.review_cards = due.len();
        self.stats.new_cards = new.len();
        self.stats.started_at = now;

        self.queue = due;
        self.queue.extend(new);
        self.index = 0;
        self.answer_revealed = false;
        self.state = if self.queue.is_empty() {
            SessionState::Empty
        } else {
            SessionState::Active
        };

        info!(
            "study session loaded: {} due, {} new",
            self.stats.review_cards, self.stats.new_cards
        );
        Ok(self.state)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn queue(&self) -> &[Card] {
        &self.queue
    }

    pub fn position(&self) -> usize {
        self.index
    }

    pub fn current_card(&self) -> Option<&Card> {
        match self.state {
            SessionState::Active => self.queue.get(self.index),
            _ => None,
        }
    }

    pub fn is_answer_revealed(&self) -> bool {
        self.answer_revealed
    }

    /// Percentage of the queue already reviewed.
    pub fn progress(&self) -> f64 {
        if self.queue.is_empty() {
            0.0
        } else {
            self.index as f64 / self.queue.len() as f64 * 100.0
        }
    }

    pub fn reveal_answer(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.answer_revealed = true;
        Ok(())
    }

    pub fn submit_review(
        &mut self,
        store: &mut dyn RecordStore,
        outcome: ReviewOutcome,
    ) -> Result<ReviewResult> {
        self.submit_review_at(store, outcome, Utc::now())
    }

    pub fn submit_review_at(
        &mut self,
        store: &mut dyn RecordStore,
        outcome: ReviewOutcome,
        now: DateTime<Utc>,
    ) -> Result<ReviewResult> {
        self.ensure_active()?;
        let current = &self.queue[self.index];
        let updated = scheduler::update_at(current, outcome, now);

        if let Err(e) = store.put_card(&updated) {
            warn!("failed to save review of card {}: {}", updated.id, e);
            return Err(e);
        }

        self.stats.cards_studied += 1;
        if outcome.is_correct() {
            self.stats.correct += 1;
        }
        self.queue[self.index] = updated.clone();
        self.index += 1;
        self.answer_revealed = false;

        let completed = self.index >= self.queue.len();
        if completed {
            self.state = SessionState::Completed;
            info!(
                "study session completed: {}/{} correct",
                self.stats.correct, self.stats.cards_studied
            );
        }

        Ok(ReviewResult {
            card: updated,
            completed,
        })
    }

    pub fn summary(&self, now: DateTime<Utc>) -> SessionSummary {
        let studied = self.stats.cards_studied;
        let accuracy = if studied > 0 {
            (self.stats.correct as f64 / studied as f64 * 100.0).round() as u32
        } else {
            0
        };

        SessionSummary {
            accuracy,
            total_studied: studied,
            correct: self.stats.correct,
            incorrect: studied - self.stats.correct,
            new_cards: self.stats.new_cards,
            review_cards: self.stats.review_cards,
            duration: format_elapsed(self.stats.started_at, now),
        }
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state {
            SessionState::Active => Ok(()),
            other => Err(Error::InvalidState(format!(
                "no active card (session is {:?})",
                other
            ))),
        }
    }
}

fn format_elapsed(start: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = now.signed_duration_since(start).num_minutes();
    if minutes < 1 {
        "less than a minute".to_string()
    } else {
        format!("{} min", minutes)
    }
}

/// A session that can be driven from several threads.
///
/// Only one review may be in flight; a submission that arrives while another
/// is still being saved is rejected instead of queued.
#[derive(Debug, Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<StudySession>>,
}

impl SharedSession {
    pub fn new(session: StudySession) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub fn submit_review(
        &self,
        store: &mut dyn RecordStore,
        outcome: ReviewOutcome,
    ) -> Result<ReviewResult> {
        let mut session = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                return Err(Error::InvalidState(
                    "another review is still being submitted".to_string(),
                ))
            }
            Err(TryLockError::Poisoned(_)) => {
                return Err(Error::InvalidState("session is poisoned".to_string()))
            }
        };
        session.submit_review(store, outcome)
    }

    pub fn reveal_answer(&self) -> Result<()> {
        self.with_mut(|s| s.reveal_answer())?
    }

    pub fn with<R>(&self, f: impl FnOnce(&StudySession) -> R) -> Result<R> {
        let session = self
            .inner
            .lock()
            .map_err(|_| Error::InvalidState("session is poisoned".to_string()))?;
        Ok(f(&session))
    }

    fn with_mut<R>(&self, f: impl FnOnce(&mut StudySession) -> R) -> Result<R> {
        let mut session = self
            .inner
            .lock()
            .map_err(|_| Error::InvalidState("session is poisoned".to_string()))?;
        Ok(f(&mut session))
    }
}
