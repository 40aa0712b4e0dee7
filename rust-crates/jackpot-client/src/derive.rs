//! Display figures computed from the store's state and the wall clock.
//!
//! Nothing here is stored. Every function takes `now_ms` explicitly so a
//! render tick can compute a whole [`RoundView`] against one instant.

use crate::{
    config::GameConstants,
    types::{
        GameState,
        Mist,
        Pool,
        RoundState,
    },
};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

pub fn is_round_active(pool: Option<&Pool>) -> bool {
    pool.is_some_and(|pool| pool.state == RoundState::Active)
}

/// False when no pool is loaded.
pub fn is_round_ended(pool: Option<&Pool>, now_ms: u64) -> bool {
    pool.is_some_and(|pool| now_ms >= pool.end_time || pool.state != RoundState::Active)
}

pub fn time_remaining(pool: Option<&Pool>, now_ms: u64) -> u64 {
    pool.map_or(0, |pool| pool.end_time.saturating_sub(now_ms))
}

/// `M:SS`, seconds zero padded.
pub fn format_time_remaining(remaining_ms: u64) -> String {
    let total_secs = remaining_ms / 1000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

pub fn is_last_minute(pool: Option<&Pool>, now_ms: u64, constants: &GameConstants) -> bool {
    let Some(pool) = pool else {
        return false;
    };
    pool.state == RoundState::Active
        && now_ms <= pool.end_time
        && pool.end_time - now_ms <= constants.last_minute_ms
}

/// Time left before the multiplier window opens; zero once it is open.
pub fn time_until_last_minute(pool: Option<&Pool>, now_ms: u64, constants: &GameConstants) -> u64 {
    time_remaining(pool, now_ms).saturating_sub(constants.last_minute_ms)
}

/// Percentage of all tickets held by the user, 0 for an empty pool.
pub fn win_probability(user_tickets: u64, total_tickets: u64) -> f64 {
    if total_tickets == 0 {
        return 0.0;
    }
    (user_tickets as f64 / total_tickets as f64 * 100.0).clamp(0.0, 100.0)
}

/// Tickets priced at the minimum bet; multiplier history is not visible here.
pub fn estimated_spend(user_tickets: u64, constants: &GameConstants) -> Mist {
    constants.minimum_bet.saturating_mul(user_tickets)
}

/// Everything a frame needs, computed against one instant.
#[derive(Clone, Debug, PartialEq)]
pub struct RoundView {
    pub round_number: Option<u64>,
    pub state: Option<RoundState>,
    pub total_pool: Mist,
    pub total_tickets: u64,
    pub active: bool,
    pub ended: bool,
    pub remaining_ms: u64,
    pub countdown: String,
    pub last_minute: bool,
    pub until_last_minute: String,
    pub multiplier: u64,
    pub user_tickets: u64,
    pub win_probability: f64,
    pub total_spent: Mist,
}

impl RoundView {
    pub fn compute(state: &GameState, now_ms: u64, constants: &GameConstants) -> Self {
        let pool = state.current_pool.as_ref();
        let remaining_ms = time_remaining(pool, now_ms);
        let last_minute = is_last_minute(pool, now_ms, constants);
        Self {
            round_number: pool.map(|p| p.round_number),
            state: pool.map(|p| p.state),
            total_pool: pool.map(|p| p.total_pool).unwrap_or_default(),
            total_tickets: pool.map_or(0, |p| p.total_ticket_count),
            active: is_round_active(pool),
            ended: is_round_ended(pool, now_ms),
            remaining_ms,
            countdown: format_time_remaining(remaining_ms),
            last_minute,
            until_last_minute: format_time_remaining(time_until_last_minute(
                pool, now_ms, constants,
            )),
            multiplier: if last_minute {
                constants.last_minute_multiplier
            } else {
                1
            },
            user_tickets: state.user_stats.tickets,
            win_probability: state.user_stats.win_probability,
            total_spent: state.user_stats.total_spent,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        test_helpers::pool_fixture,
        types::ObjectId,
    };
    use proptest::prelude::*;

    const NOW: u64 = 1_700_000_000_000;

    fn pool_ending_in(ms: u64) -> Pool {
        pool_fixture(ObjectId::from_u8(0x50), 5, NOW + ms)
    }

    fn countdown_secs(formatted: &str) -> u64 {
        let (mins, secs) = formatted.split_once(':').unwrap();
        mins.parse::<u64>().unwrap() * 60 + secs.parse::<u64>().unwrap()
    }

    #[test]
    fn round_view__ten_minutes_out() {
        // given
        let state = GameState {
            current_pool: Some(pool_ending_in(615_000)),
            ..GameState::default()
        };

        // when
        let view = RoundView::compute(&state, NOW, &GameConstants::default());

        // then
        assert_eq!(view.countdown, "10:15");
        assert!(view.active);
        assert!(!view.ended);
        assert!(!view.last_minute);
        assert_eq!(view.multiplier, 1);
        assert_eq!(view.until_last_minute, "9:15");
        assert_eq!(view.total_pool, Mist(120_500_000_000));
        assert_eq!(view.total_tickets, 1205);
    }

    #[test]
    fn round_view__forty_five_seconds_out_is_last_minute() {
        // given
        let state = GameState {
            current_pool: Some(pool_ending_in(45_000)),
            ..GameState::default()
        };

        // when
        let view = RoundView::compute(&state, NOW, &GameConstants::default());

        // then
        assert!(view.last_minute);
        assert!(view.active);
        assert_eq!(view.multiplier, 2);
        assert_eq!(view.until_last_minute, "0:00");
    }

    #[test]
    fn round_view__without_pool_is_inert() {
        // when
        let view = RoundView::compute(&GameState::default(), NOW, &GameConstants::default());

        // then
        assert_eq!(view.round_number, None);
        assert!(!view.active);
        assert!(!view.ended);
        assert!(!view.last_minute);
        assert_eq!(view.countdown, "0:00");
    }

    #[test]
    fn is_round_ended__past_end_or_not_active() {
        // given
        let expired = pool_ending_in(0);
        let mut drawing = pool_ending_in(300_000);
        drawing.state = RoundState::Drawing;

        // then
        assert!(is_round_ended(Some(&expired), NOW));
        assert!(is_round_ended(Some(&drawing), NOW));
        assert!(!is_round_ended(Some(&pool_ending_in(1)), NOW));
    }

    #[test]
    fn format_time_remaining__pads_seconds_and_floors_millis() {
        assert_eq!(format_time_remaining(0), "0:00");
        assert_eq!(format_time_remaining(9_999), "0:09");
        assert_eq!(format_time_remaining(61_000), "1:01");
        assert_eq!(format_time_remaining(3_600_000), "60:00");
    }

    #[test]
    fn estimated_spend__prices_tickets_at_minimum_bet() {
        assert_eq!(
            estimated_spend(15, &GameConstants::default()),
            Mist(1_500_000_000)
        );
    }

    proptest! {
        #[test]
        fn win_probability__zero_for_empty_pool(user in any::<u64>()) {
            prop_assert_eq!(win_probability(user, 0), 0.0);
        }

        #[test]
        fn win_probability__is_share_of_total(total in 1u64..1_000_000, frac in 0.0f64..=1.0) {
            let user = (total as f64 * frac) as u64;
            let p = win_probability(user, total);
            prop_assert!((0.0..=100.0).contains(&p));
            prop_assert!((p - 100.0 * user as f64 / total as f64).abs() < 1e-9);
        }

        #[test]
        fn is_last_minute__matches_window(remaining in 0u64..1_200_000) {
            let constants = GameConstants::default();
            let pool = pool_ending_in(remaining);
            prop_assert_eq!(
                is_last_minute(Some(&pool), NOW, &constants),
                remaining <= constants.last_minute_ms
            );
        }

        #[test]
        fn is_last_minute__false_once_round_leaves_active(
            remaining in 0u64..120_000,
            completed in any::<bool>(),
        ) {
            let mut pool = pool_ending_in(remaining);
            pool.state = if completed { RoundState::Completed } else { RoundState::Drawing };
            prop_assert!(!is_last_minute(Some(&pool), NOW, &GameConstants::default()));
        }

        #[test]
        fn is_last_minute__false_after_end(overdue in 1u64..1_000_000) {
            let pool = pool_fixture(ObjectId::from_u8(0x50), 5, NOW);
            prop_assert!(!is_last_minute(Some(&pool), NOW + overdue, &GameConstants::default()));
        }

        #[test]
        fn countdown__never_increases_as_time_passes(
            end in 0u64..4_000_000,
            earlier in 0u64..4_000_000,
            step in 0u64..100_000,
        ) {
            let pool = pool_fixture(ObjectId::from_u8(0x50), 5, end);
            let before = format_time_remaining(time_remaining(Some(&pool), earlier));
            let after = format_time_remaining(time_remaining(Some(&pool), earlier + step));
            prop_assert!(countdown_secs(&after) <= countdown_secs(&before));
            prop_assert_eq!(
                &before,
                &format_time_remaining(time_remaining(Some(&pool), earlier))
            );
        }
    }
}
