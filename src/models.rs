use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

pub const MAX_CARD_SIDE_LEN: usize = 1000;
pub const MAX_DECK_NAME_LEN: usize = 100;

/// A single flashcard together with its scheduling state.
///
/// Serialized camelCase so exported backups keep the same field names the
/// application has always written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: Uuid,
    pub deck_id: Uuid,
    pub front: String,
    pub back: String,
    /// Days until the next review, fractional while in the learning phase.
    pub interval: f64,
    pub repetitions: u32,
    pub ease_factor: f64,
    pub next_review_date: DateTime<Utc>,
    pub is_new: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    /// Due means graduated and scheduled at or before `now`. New cards are never due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_new && self.next_review_date <= now
    }

    pub fn status(&self, now: DateTime<Utc>) -> CardStatus {
        if self.is_new {
            CardStatus::New
        } else if self.next_review_date <= now {
            CardStatus::Due
        } else {
            CardStatus::Learned
        }
    }

    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        self.front.to_lowercase().contains(&term) || self.back.to_lowercase().contains(&term)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardStatus {
    New,
    Due,
    Learned,
}

impl CardStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CardStatus::New => "New",
            CardStatus::Due => "Due",
            CardStatus::Learned => "Learned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deck {
    pub fn new(name: String, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewOutcome {
    Again,
    Hard,
    Good,
    Easy,
}

impl ReviewOutcome {
    pub const ALL: [ReviewOutcome; 4] = [
        ReviewOutcome::Again,
        ReviewOutcome::Hard,
        ReviewOutcome::Good,
        ReviewOutcome::Easy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewOutcome::Again => "again",
            ReviewOutcome::Hard => "hard",
            ReviewOutcome::Good => "good",
            ReviewOutcome::Easy => "easy",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "again" | "a" | "1" => Some(ReviewOutcome::Again),
            "hard" | "h" | "2" => Some(ReviewOutcome::Hard),
            "good" | "g" | "3" => Some(ReviewOutcome::Good),
            "easy" | "e" | "4" => Some(ReviewOutcome::Easy),
            _ => None,
        }
    }

    /// Like `from_str`, but an unknown outcome is an error rather than a silent default.
    pub fn parse(s: &str) -> Result<Self> {
        Self::from_str(s).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "unknown review outcome '{}' (use again, hard, good or easy)",
                s
            ))
        })
    }

    /// Good and Easy count as a correct answer in session statistics.
    pub fn is_correct(&self) -> bool {
        matches!(self, ReviewOutcome::Good | ReviewOutcome::Easy)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardCounts {
    pub total: usize,
    pub new: usize,
    pub due: usize,
}

impl CardCounts {
    /// Cards that have graduated and are not yet due again.
    pub fn learned(&self) -> usize {
        self.total.saturating_sub(self.new + self.due)
    }
}

/// Trims both sides and checks they are non-empty and within length limits.
pub fn validate_card_content(front: &str, back: &str) -> Result<(String, String)> {
    let front = front.trim();
    let back = back.trim();

    if front.is_empty() || back.is_empty() {
        return Err(Error::InvalidArgument(
            "both front and back must be filled in".to_string(),
        ));
    }
    if front.chars().count() > MAX_CARD_SIDE_LEN {
        return Err(Error::InvalidArgument(format!(
            "front is too long (max {} characters)",
            MAX_CARD_SIDE_LEN
        )));
    }
    if back.chars().count() > MAX_CARD_SIDE_LEN {
        return Err(Error::InvalidArgument(format!(
            "back is too long (max {} characters)",
            MAX_CARD_SIDE_LEN
        )));
    }

    Ok((front.to_string(), back.to_string()))
}

pub fn validate_deck_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidArgument("deck name is required".to_string()));
    }
    if name.chars().count() > MAX_DECK_NAME_LEN {
        return Err(Error::InvalidArgument(format!(
            "deck name is too long (max {} characters)",
            MAX_DECK_NAME_LEN
        )));
    }
    Ok(name.to_string())
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
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn make_card(is_new: bool, next_review_date: DateTime<Utc>) -> Card {
        Card {
            id: Uuid::new_v4(),
            deck_id: Uuid::new_v4(),
            front: "Capital of France".to_string(),
            back: "Paris".to_string(),
            interval: 1.0,
            repetitions: 0,
            ease_factor: 2.5,
            next_review_date,
            is_new,
            created_at: at(0),
            updated_at: at(0),
        }
    }

    mod card_tests {
        use super::*;

        #[test]
        fn new_card_is_never_due() {
            let card = make_card(true, at(-3600));
            assert!(!card.is_due(at(0)));
            assert_eq!(card.status(at(0)), CardStatus::New);
        }

        #[test]
        fn graduated_card_due_at_boundary() {
            let card = make_card(false, at(0));
            assert!(card.is_due(at(0)));
            assert_eq!(card.status(at(0)), CardStatus::Due);
        }

        #[test]
        fn graduated_card_in_future_is_learned() {
            let card = make_card(false, at(0) + Duration::days(2));
            assert!(!card.is_due(at(0)));
            assert_eq!(card.status(at(0)), CardStatus::Learned);
            assert_eq!(card.status(at(0)).label(), "Learned");
        }

        #[test]
        fn matches_front_or_back_case_insensitive() {
            let card = make_card(true, at(0));
            assert!(card.matches("france"));
            assert!(card.matches("PARIS"));
            assert!(card.matches("   "));
            assert!(!card.matches("berlin"));
        }

        #[test]
        fn serializes_camel_case() {
            let card = make_card(true, at(0));
            let json = serde_json::to_string(&card).unwrap();
            assert!(json.contains("\"deckId\""));
            assert!(json.contains("\"easeFactor\":2.5"));
            assert!(json.contains("\"nextReviewDate\""));
            assert!(json.contains("\"isNew\":true"));
        }
    }

    mod review_outcome_tests {
        use super::*;

        #[test]
        fn as_str_values() {
            assert_eq!(ReviewOutcome::Again.as_str(), "again");
            assert_eq!(ReviewOutcome::Hard.as_str(), "hard");
            assert_eq!(ReviewOutcome::Good.as_str(), "good");
            assert_eq!(ReviewOutcome::Easy.as_str(), "easy");
        }

        #[test]
        fn from_str_aliases() {
            let cases = [
                ("again", ReviewOutcome::Again),
                ("A", ReviewOutcome::Again),
                ("1", ReviewOutcome::Again),
                ("Hard", ReviewOutcome::Hard),
                ("2", ReviewOutcome::Hard),
                ("g", ReviewOutcome::Good),
                (" GOOD ", ReviewOutcome::Good),
                ("easy", ReviewOutcome::Easy),
                ("4", ReviewOutcome::Easy),
            ];
            for (input, expected) in cases {
                assert_eq!(
                    ReviewOutcome::from_str(input),
                    Some(expected),
                    "Expected {:?} for '{}'",
                    expected,
                    input
                );
            }
        }

        #[test]
        fn parse_rejects_unknown() {
            let err = ReviewOutcome::parse("perfect").unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)));
            assert!(ReviewOutcome::from_str("").is_none());
            assert!(ReviewOutcome::from_str("5").is_none());
        }

        #[test]
        fn only_good_and_easy_are_correct() {
            assert!(!ReviewOutcome::Again.is_correct());
            assert!(!ReviewOutcome::Hard.is_correct());
            assert!(ReviewOutcome::Good.is_correct());
            assert!(ReviewOutcome::Easy.is_correct());
        }

        #[test]
        fn serializes_lowercase() {
            let json = serde_json::to_string(&ReviewOutcome::Easy).unwrap();
            assert_eq!(json, "\"easy\"");
        }
    }

    mod counts_tests {
        use super::*;

        #[test]
        fn learned_is_remainder() {
            let counts = CardCounts {
                total: 10,
                new: 3,
                due: 2,
            };
            assert_eq!(counts.learned(), 5);
        }

        #[test]
        fn learned_of_empty_is_zero() {
            assert_eq!(CardCounts::default().learned(), 0);
        }
    }

    mod validation_tests {
        use super::*;

        #[test]
        fn card_content_is_trimmed() {
            let (front, back) = validate_card_content("  hola ", "\thello\n").unwrap();
            assert_eq!(front, "hola");
            assert_eq!(back, "hello");
        }

        #[test]
        fn card_content_rejects_blank_side() {
            assert!(validate_card_content("   ", "back").is_err());
            assert!(validate_card_content("front", "").is_err());
        }

        #[test]
        fn card_content_length_limit_in_chars() {
            let max = "é".repeat(MAX_CARD_SIDE_LEN);
            assert!(validate_card_content(&max, "ok").is_ok());

            let too_long = "x".repeat(MAX_CARD_SIDE_LEN + 1);
            assert!(validate_card_content(&too_long, "ok").is_err());
            assert!(validate_card_content("ok", &too_long).is_err());
        }

        #[test]
        fn deck_name_rules() {
            assert_eq!(validate_deck_name("  Spanish ").unwrap(), "Spanish");
            assert!(validate_deck_name("").is_err());
            assert!(validate_deck_name(&"d".repeat(MAX_DECK_NAME_LEN + 1)).is_err());
        }
    }

    mod json_output_tests {
        use super::*;

        #[test]
        fn serializes_ok_correctly() {
            let output = JsonOutput::ok("test");
            let json = serde_json::to_string(&output).unwrap();
            assert!(json.contains("\"success\":true"));
            assert!(json.contains("\"data\":\"test\""));
            assert!(json.contains("\"error\":null"));
        }

        #[test]
        fn serializes_err_correctly() {
            let output = JsonOutput::<()>::err("error");
            let json = serde_json::to_string(&output).unwrap();
            assert!(json.contains("\"success\":false"));
            assert!(json.contains("\"data\":null"));
            assert!(json.contains("\"error\":\"error\""));
        }
    }
}
