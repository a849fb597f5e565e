//! Review scheduling for flashcards.
//!
//! A card starts in the learning phase (`is_new`), where failed or hard
//! answers bring it back within minutes. A Good or Easy answer graduates it
//! into the review phase, which follows an SM-2 style schedule in whole days:
//!
//! - Again: back to learning, ease -0.2
//! - Hard:  interval * 1.2 (at least 1 day), ease -0.1
//! - Good:  interval * ease
//! - Easy:  interval * ease * 1.3 + 4 days, ease +0.1
//!
//! The ease factor never drops below 1.3 and review intervals are capped at
//! 100 years.

use chrono::{DateTime, Duration, Utc};
use log::debug;
use uuid::Uuid;

use crate::models::{Card, ReviewOutcome};

pub const INITIAL_INTERVAL: f64 = 1.0;
pub const INITIAL_EASE_FACTOR: f64 = 2.5;
pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const MAX_INTERVAL_DAYS: f64 = 36_500.0;

const EASE_STEP: f64 = 0.1;
const AGAIN_EASE_PENALTY: f64 = 0.2;
const HARD_MULTIPLIER: f64 = 1.2;
const EASY_MULTIPLIER: f64 = 1.3;
const EASY_BONUS_DAYS: f64 = 4.0;

// Learning phase steps
const LEARNING_AGAIN_MINUTES: f64 = 1.0;
const LEARNING_HARD_MINUTES: f64 = 10.0;
const LEARNING_GOOD_DAYS: f64 = 1.0;
const LEARNING_EASY_DAYS: f64 = 4.0;

const MINUTES_PER_DAY: f64 = 24.0 * 60.0;
const MILLIS_PER_DAY: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

/// Scheduling fields produced by a single review.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Step {
    interval: f64,
    repetitions: u32,
    ease_factor: f64,
    is_new: bool,
}

pub fn new_card(front: impl Into<String>, back: impl Into<String>, deck_id: Uuid) -> Card {
    new_card_at(front, back, deck_id, Utc::now())
}

/// A fresh card is immediately available for learning.
pub fn new_card_at(
    front: impl Into<String>,
    back: impl Into<String>,
    deck_id: Uuid,
    now: DateTime<Utc>,
) -> Card {
    Card {
        id: Uuid::new_v4(),
        deck_id,
        front: front.into(),
        back: back.into(),
        interval: INITIAL_INTERVAL,
        repetitions: 0,
        ease_factor: INITIAL_EASE_FACTOR,
        next_review_date: now,
        is_new: true,
        created_at: now,
        updated_at: now,
    }
}

pub fn update(card: &Card, outcome: ReviewOutcome) -> Card {
    update_at(card, outcome, Utc::now())
}

/// Applies a review outcome to `card` as of `now`, returning the updated card.
///
/// Only the scheduling fields and `updated_at` change; the input is untouched.
pub fn update_at(card: &Card, outcome: ReviewOutcome, now: DateTime<Utc>) -> Card {
    debug_assert!(
        card.interval.is_finite() && card.interval >= 0.0,
        "card {} has invalid interval {}",
        card.id,
        card.interval
    );
    debug_assert!(
        card.ease_factor.is_finite() && card.ease_factor >= MIN_EASE_FACTOR,
        "card {} has ease factor {} below the floor",
        card.id,
        card.ease_factor
    );

    let step = if card.is_new {
        learning_step(card, outcome)
    } else {
        review_step(card, outcome)
    };

    debug!(
        "card {} reviewed {}: interval {:.4} -> {:.4}, ease {:.2} -> {:.2}, new {} -> {}",
        card.id,
        outcome.as_str(),
        card.interval,
        step.interval,
        card.ease_factor,
        step.ease_factor,
        card.is_new,
        step.is_new
    );

    Card {
        interval: step.interval,
        repetitions: step.repetitions,
        ease_factor: step.ease_factor,
        is_new: step.is_new,
        next_review_date: now
            .checked_add_signed(interval_duration(step.interval))
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
        updated_at: now,
        ..card.clone()
    }
}

fn learning_step(card: &Card, outcome: ReviewOutcome) -> Step {
    // Ease is left alone until the card graduates.
    let ease = card.ease_factor;
    match outcome {
        ReviewOutcome::Again => Step {
            interval: LEARNING_AGAIN_MINUTES / MINUTES_PER_DAY,
            repetitions: 0,
            ease_factor: ease,
            is_new: true,
        },
        ReviewOutcome::Hard => Step {
            interval: LEARNING_HARD_MINUTES / MINUTES_PER_DAY,
            repetitions: 0,
            ease_factor: ease,
            is_new: true,
        },
        ReviewOutcome::Good => Step {
            interval: LEARNING_GOOD_DAYS,
            repetitions: 1,
            ease_factor: ease,
            is_new: false,
        },
        ReviewOutcome::Easy => Step {
            interval: LEARNING_EASY_DAYS,
            repetitions: 1,
            ease_factor: ease,
            is_new: false,
        },
    }
}

fn review_step(card: &Card, outcome: ReviewOutcome) -> Step {
    let ease = card.ease_factor;
    match outcome {
        ReviewOutcome::Again => Step {
            interval: LEARNING_AGAIN_MINUTES / MINUTES_PER_DAY,
            repetitions: 0,
            ease_factor: (ease - AGAIN_EASE_PENALTY).max(MIN_EASE_FACTOR),
            is_new: true,
        },
        ReviewOutcome::Hard => Step {
            interval: (card.interval * HARD_MULTIPLIER)
                .round()
                .clamp(1.0, MAX_INTERVAL_DAYS),
            repetitions: card.repetitions + 1,
            ease_factor: (ease - EASE_STEP).max(MIN_EASE_FACTOR),
            is_new: false,
        },
        ReviewOutcome::Good => Step {
            interval: (card.interval * ease).round().min(MAX_INTERVAL_DAYS),
            repetitions: card.repetitions + 1,
            ease_factor: ease,
            is_new: false,
        },
        ReviewOutcome::Easy => Step {
            interval: ((card.interval * ease * EASY_MULTIPLIER).round() + EASY_BONUS_DAYS)
                .min(MAX_INTERVAL_DAYS),
            repetitions: card.repetitions + 1,
            ease_factor: ease + EASE_STEP,
            is_new: false,
        },
    }
}

fn interval_duration(days: f64) -> Duration {
    Duration::milliseconds((days * MILLIS_PER_DAY).round() as i64)
}

/// The interval, in days, that `update` would assign for `outcome`.
///
/// Runs the real transition on a throwaway copy.
pub fn preview_days(card: &Card, outcome: ReviewOutcome) -> f64 {
    update_at(card, outcome, Utc::now()).interval
}

pub fn preview_interval(card: &Card, outcome: ReviewOutcome) -> String {
    format_interval(preview_days(card, outcome))
}

/// Labels for every outcome, in button order.
pub fn preview_all(card: &Card) -> Vec<(ReviewOutcome, String)> {
    ReviewOutcome::ALL
        .iter()
        .map(|&outcome| (outcome, preview_interval(card, outcome)))
        .collect()
}

/// Formats an interval in days as a human-readable label.
pub fn format_interval(days: f64) -> String {
    if days < 1.0 {
        let minutes = (days * MINUTES_PER_DAY).round() as i64;
        format!("{} min", minutes)
    } else if days < 30.0 {
        plural(days.round() as i64, "day")
    } else if days < 365.0 {
        plural((days / 30.0).round() as i64, "month")
    } else {
        plural((days / 365.0).round() as i64, "year")
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn fresh() -> Card {
        new_card_at("front", "back", Uuid::new_v4(), now())
    }

    fn graduated(interval: f64, repetitions: u32, ease_factor: f64) -> Card {
        Card {
            interval,
            repetitions,
            ease_factor,
            is_new: false,
            ..fresh()
        }
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    /// Inverse of `format_interval`, used to check labels against intervals.
    fn label_to_days(label: &str) -> f64 {
        let (n, unit) = label.split_once(' ').unwrap();
        let n: f64 = n.parse().unwrap();
        match unit.trim_end_matches('s') {
            "min" => n / MINUTES_PER_DAY,
            "day" => n,
            "month" => n * 30.0,
            "year" => n * 365.0,
            other => panic!("unexpected unit {}", other),
        }
    }

    mod new_card_tests {
        use super::*;

        #[test]
        fn new_card_defaults() {
            let card = fresh();
            assert!(card.is_new);
            assert_eq!(card.interval, 1.0);
            assert_eq!(card.repetitions, 0);
            assert_eq!(card.ease_factor, 2.5);
            assert_eq!(card.next_review_date, now());
            assert_eq!(card.created_at, now());
            assert_eq!(card.updated_at, now());
        }
    }

    mod learning_tests {
        use super::*;

        #[test]
        fn again_stays_in_learning_for_a_minute() {
            let card = update_at(&fresh(), ReviewOutcome::Again, now());
            assert!(card.is_new);
            assert_eq!(card.repetitions, 0);
            assert_close(card.interval, 1.0 / 1440.0);
            assert_eq!(card.next_review_date, now() + Duration::minutes(1));
            assert_eq!(card.ease_factor, 2.5);
        }

        #[test]
        fn hard_stays_in_learning_for_ten_minutes() {
            let card = update_at(&fresh(), ReviewOutcome::Hard, now());
            assert!(card.is_new);
            assert_eq!(card.repetitions, 0);
            assert_close(card.interval, 10.0 / 1440.0);
            assert_eq!(card.next_review_date, now() + Duration::minutes(10));
        }

        #[test]
        fn good_graduates_after_one_day() {
            let card = update_at(&fresh(), ReviewOutcome::Good, now());
            assert!(!card.is_new);
            assert_eq!(card.repetitions, 1);
            assert_eq!(card.interval, 1.0);
            assert_eq!(card.next_review_date, now() + Duration::days(1));
            assert_eq!(card.ease_factor, 2.5);
        }

        #[test]
        fn easy_graduates_after_four_days() {
            let card = update_at(&fresh(), ReviewOutcome::Easy, now());
            assert!(!card.is_new);
            assert_eq!(card.repetitions, 1);
            assert_eq!(card.interval, 4.0);
            assert_eq!(card.next_review_date, now() + Duration::days(4));
        }

        #[test]
        fn learning_ignores_previous_interval() {
            let mut card = fresh();
            card.interval = 37.0;
            card.repetitions = 5;
            let updated = update_at(&card, ReviewOutcome::Good, now());
            assert_eq!(updated.interval, 1.0);
            assert_eq!(updated.repetitions, 1);
        }
    }

    mod review_tests {
        use super::*;

        #[test]
        fn again_demotes_to_learning() {
            let card = update_at(&graduated(20.0, 4, 2.5), ReviewOutcome::Again, now());
            assert!(card.is_new);
            assert_eq!(card.repetitions, 0);
            assert_close(card.interval, 1.0 / 1440.0);
            assert_close(card.ease_factor, 2.3);
            assert_eq!(card.next_review_date, now() + Duration::minutes(1));
        }

        #[test]
        fn hard_grows_slowly_and_lowers_ease() {
            let card = update_at(&graduated(10.0, 2, 2.5), ReviewOutcome::Hard, now());
            assert!(!card.is_new);
            assert_eq!(card.interval, 12.0);
            assert_eq!(card.repetitions, 3);
            assert_close(card.ease_factor, 2.4);
            assert_eq!(card.next_review_date, now() + Duration::days(12));
        }

        #[test]
        fn hard_interval_is_at_least_one_day() {
            let card = update_at(&graduated(0.0, 1, 2.5), ReviewOutcome::Hard, now());
            assert_eq!(card.interval, 1.0);
        }

        #[test]
        fn good_multiplies_by_ease() {
            let card = update_at(&graduated(10.0, 2, 2.5), ReviewOutcome::Good, now());
            assert_eq!(card.interval, 25.0);
            assert_eq!(card.repetitions, 3);
            assert_eq!(card.ease_factor, 2.5);
        }

        #[test]
        fn easy_adds_bonus_and_raises_ease() {
            let card = update_at(&graduated(20.0, 2, 2.5), ReviewOutcome::Easy, now());
            // round(20 * 2.5 * 1.3) + 4
            assert_eq!(card.interval, 69.0);
            assert_close(card.ease_factor, 2.6);
        }

        #[test]
        fn ease_never_drops_below_floor() {
            let card = graduated(10.0, 3, MIN_EASE_FACTOR);
            assert_eq!(
                update_at(&card, ReviewOutcome::Again, now()).ease_factor,
                MIN_EASE_FACTOR
            );
            assert_eq!(
                update_at(&card, ReviewOutcome::Hard, now()).ease_factor,
                MIN_EASE_FACTOR
            );

            let near = graduated(10.0, 3, 1.4);
            assert_eq!(
                update_at(&near, ReviewOutcome::Again, now()).ease_factor,
                MIN_EASE_FACTOR
            );
        }

        #[test]
        fn easy_streak_stays_within_cap() {
            let mut card = fresh();
            let mut at = now();
            for _ in 0..40 {
                card = update_at(&card, ReviewOutcome::Easy, at);
                assert!(card.interval <= MAX_INTERVAL_DAYS);
                assert!(card.next_review_date > at);
                at = card.next_review_date;
            }
            assert_eq!(card.interval, MAX_INTERVAL_DAYS);
            assert_eq!(format_interval(card.interval), "100 years");
        }

        #[test]
        fn review_near_end_of_time_saturates() {
            let card = graduated(30.0, 3, 2.5);
            let late = DateTime::<Utc>::MAX_UTC - Duration::days(1);
            let updated = update_at(&card, ReviewOutcome::Good, late);
            assert_eq!(updated.next_review_date, DateTime::<Utc>::MAX_UTC);
            assert_eq!(updated.interval, 75.0);
        }

        #[test]
        fn update_keeps_identity_and_content() {
            let before = graduated(3.0, 2, 2.5);
            let later = now() + Duration::hours(5);
            let after = update_at(&before, ReviewOutcome::Good, later);
            assert_eq!(after.id, before.id);
            assert_eq!(after.deck_id, before.deck_id);
            assert_eq!(after.front, before.front);
            assert_eq!(after.back, before.back);
            assert_eq!(after.created_at, before.created_at);
            assert_eq!(after.updated_at, later);
        }
    }

    #[test]
    fn full_card_lifecycle() {
        let t0 = now();
        let card = fresh();

        let card = update_at(&card, ReviewOutcome::Good, t0);
        assert_eq!(card.interval, 1.0);
        assert_eq!(card.repetitions, 1);
        assert!(!card.is_new);
        assert_eq!(card.next_review_date, t0 + Duration::days(1));

        let t1 = t0 + Duration::days(1);
        let card = update_at(&card, ReviewOutcome::Good, t1);
        assert_eq!(card.interval, 3.0);
        assert_eq!(card.repetitions, 2);
        assert_eq!(card.next_review_date, t1 + Duration::days(3));

        let t2 = t1 + Duration::days(3);
        let card = update_at(&card, ReviewOutcome::Easy, t2);
        assert_eq!(card.interval, 14.0);
        assert_close(card.ease_factor, 2.6);

        let t3 = t2 + Duration::days(14);
        let card = update_at(&card, ReviewOutcome::Again, t3);
        assert_close(card.interval, 1.0 / 1440.0);
        assert_eq!(card.repetitions, 0);
        assert_close(card.ease_factor, 2.4);
        assert!(card.is_new);
    }

    mod format_tests {
        use super::*;

        #[test]
        fn minutes() {
            assert_eq!(format_interval(1.0 / 1440.0), "1 min");
            assert_eq!(format_interval(10.0 / 1440.0), "10 min");
        }

        #[test]
        fn days() {
            assert_eq!(format_interval(1.0), "1 day");
            assert_eq!(format_interval(3.0), "3 days");
            assert_eq!(format_interval(29.0), "29 days");
        }

        #[test]
        fn months() {
            assert_eq!(format_interval(30.0), "1 month");
            assert_eq!(format_interval(44.0), "1 month");
            assert_eq!(format_interval(45.0), "2 months");
            assert_eq!(format_interval(364.0), "12 months");
        }

        #[test]
        fn years() {
            assert_eq!(format_interval(365.0), "1 year");
            assert_eq!(format_interval(900.0), "2 years");
        }
    }

    mod preview_tests {
        use super::*;

        #[test]
        fn new_card_labels() {
            let labels: Vec<String> = preview_all(&fresh()).into_iter().map(|(_, l)| l).collect();
            assert_eq!(labels, vec!["1 min", "10 min", "1 day", "4 days"]);
        }

        #[test]
        fn review_card_labels() {
            let card = graduated(10.0, 2, 2.5);
            assert_eq!(preview_interval(&card, ReviewOutcome::Again), "1 min");
            assert_eq!(preview_interval(&card, ReviewOutcome::Hard), "12 days");
            assert_eq!(preview_interval(&card, ReviewOutcome::Good), "25 days");
            assert_eq!(preview_interval(&card, ReviewOutcome::Easy), "1 month");
        }

        #[test]
        fn preview_does_not_mutate() {
            let card = graduated(10.0, 2, 2.5);
            let copy = card.clone();
            let _ = preview_all(&card);
            assert_eq!(card, copy);
        }

        #[test]
        fn label_matches_applied_interval_for_short_intervals() {
            for card in [fresh(), graduated(1.0, 1, 2.5), graduated(3.0, 2, 1.3)] {
                for outcome in ReviewOutcome::ALL {
                    let applied = update_at(&card, outcome, now()).interval;
                    let label = preview_interval(&card, outcome);
                    assert_close(label_to_days(&label), applied);
                }
            }
        }
    }

    fn outcome_strategy() -> impl Strategy<Value = ReviewOutcome> {
        prop_oneof![
            Just(ReviewOutcome::Again),
            Just(ReviewOutcome::Hard),
            Just(ReviewOutcome::Good),
            Just(ReviewOutcome::Easy),
        ]
    }

    proptest! {
        #[test]
        fn ease_floor_holds(
            ease in 1.3f64..4.0,
            interval in 0.0f64..500.0,
            is_new in any::<bool>(),
            outcome in outcome_strategy(),
        ) {
            let card = Card { interval, ease_factor: ease, is_new, ..fresh() };
            let updated = update_at(&card, outcome, now());
            prop_assert!(updated.ease_factor >= MIN_EASE_FACTOR);
            prop_assert!(updated.interval >= 0.0);
        }

        #[test]
        fn learning_outcome_decides_graduation(outcome in outcome_strategy()) {
            let updated = update_at(&fresh(), outcome, now());
            prop_assert_eq!(updated.is_new, !outcome.is_correct());
        }

        #[test]
        fn again_always_resets(
            ease in 1.3f64..4.0,
            interval in 1.0f64..500.0,
            repetitions in 0u32..50,
        ) {
            let card = graduated(interval, repetitions, ease);
            let updated = update_at(&card, ReviewOutcome::Again, now());
            prop_assert!(updated.is_new);
            prop_assert_eq!(updated.repetitions, 0);
        }

        #[test]
        fn next_review_is_now_plus_interval(
            interval in 0.0f64..500.0,
            outcome in outcome_strategy(),
        ) {
            let updated = update_at(&graduated(interval, 1, 2.5), outcome, now());
            let expected = now() + interval_duration(updated.interval);
            prop_assert_eq!(updated.next_review_date, expected);
        }

        #[test]
        fn preview_label_agrees_with_update(
            ease in 1.3f64..3.0,
            interval in 0.0f64..9.0,
            is_new in any::<bool>(),
            outcome in outcome_strategy(),
        ) {
            let card = Card { interval, ease_factor: ease, is_new, ..fresh() };
            let applied = update_at(&card, outcome, now()).interval;
            let label = preview_interval(&card, outcome);
            if applied < 30.0 {
                prop_assert!((label_to_days(&label) - applied).abs() < 1e-9);
            } else {
                prop_assert_eq!(label, format_interval(applied));
            }
        }
    }
}
