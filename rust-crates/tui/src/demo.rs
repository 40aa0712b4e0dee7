//! Simulated purchases for demos: a made-up buyer every one to five seconds.

use jackpot_client::{
    config::GameConstants,
    derive,
    purchase::estimate_tickets,
    types::{
        GameState,
        Mist,
    },
};
use rand::{
    Rng,
    SeedableRng,
    rngs::StdRng,
};
use std::{
    fmt,
    time::Duration,
};
use tokio::{
    sync::{
        mpsc,
        watch,
    },
    task::JoinHandle,
};

const MIN_DELAY_MS: u64 = 1_000;
const MAX_DELAY_MS: u64 = 5_000;
// bets are whole multiples of the minimum bet, up to 5 SUI
const MAX_BET_STEPS: u64 = 50;
pub const WHALE_TICKETS: u64 = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DemoPurchase {
    pub buyer: String,
    pub amount: Mist,
    pub tickets: u64,
    pub multiplier: u64,
    pub timestamp_ms: u64,
}

impl DemoPurchase {
    pub fn is_whale(&self) -> bool {
        self.tickets >= WHALE_TICKETS
    }
}

impl fmt::Display for DemoPurchase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bought {} tickets for {} SUI",
            self.buyer, self.tickets, self.amount
        )?;
        if self.multiplier > 1 {
            write!(f, " ({}X)", self.multiplier)?;
        }
        Ok(())
    }
}

pub fn next_delay<G: Rng>(rng: &mut G) -> Duration {
    Duration::from_millis(rng.random_range(MIN_DELAY_MS..=MAX_DELAY_MS))
}

pub fn simulate_purchase<G: Rng>(
    rng: &mut G,
    constants: &GameConstants,
    last_minute: bool,
    now_ms: u64,
) -> DemoPurchase {
    let steps = rng.random_range(1..=MAX_BET_STEPS);
    let amount = constants.minimum_bet.saturating_mul(steps);
    let multiplier = if last_minute {
        constants.last_minute_multiplier
    } else {
        1
    };
    DemoPurchase {
        buyer: fakeit::name::first(),
        amount,
        tickets: estimate_tickets(amount, constants.minimum_bet, multiplier),
        multiplier,
        timestamp_ms: now_ms,
    }
}

/// Emits simulated purchases until the receiver is dropped. The multiplier
/// follows the last-minute window of whatever pool the store holds.
pub fn spawn(
    state: watch::Receiver<GameState>,
    constants: GameConstants,
) -> (mpsc::UnboundedReceiver<DemoPurchase>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(demo_worker(state, constants, tx));
    (rx, handle)
}

async fn demo_worker(
    state: watch::Receiver<GameState>,
    constants: GameConstants,
    tx: mpsc::UnboundedSender<DemoPurchase>,
) {
    let mut rng = StdRng::from_os_rng();
    loop {
        tokio::time::sleep(next_delay(&mut rng)).await;
        let now = derive::now_ms();
        let last_minute = {
            let state = state.borrow();
            derive::is_last_minute(state.current_pool.as_ref(), now, &constants)
        };
        let purchase = simulate_purchase(&mut rng, &constants, last_minute, now);
        tracing::debug!(%purchase, "simulated purchase");
        if tx.send(purchase).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn next_delay__stays_between_one_and_five_seconds() {
        // given
        let mut rng = StdRng::seed_from_u64(7);

        // when
        let delays: Vec<Duration> = (0..500).map(|_| next_delay(&mut rng)).collect();

        // then
        assert!(delays.iter().all(|d| {
            *d >= Duration::from_secs(1) && *d <= Duration::from_secs(5)
        }));
    }

    #[test]
    fn simulate_purchase__last_minute_doubles_tickets() {
        // given
        let constants = GameConstants::default();

        // when
        let normal = simulate_purchase(&mut StdRng::seed_from_u64(3), &constants, false, 0);
        let doubled = simulate_purchase(&mut StdRng::seed_from_u64(3), &constants, true, 0);

        // then
        assert_eq!(normal.amount, doubled.amount);
        assert_eq!(doubled.tickets, normal.tickets * 2);
        assert_eq!(doubled.multiplier, 2);
        assert!(doubled.to_string().ends_with("(2X)"));
        assert!(!normal.buyer.is_empty());
    }

    #[test]
    fn simulate_purchase__amount_is_whole_minimum_bets() {
        // given
        let constants = GameConstants::default();
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..100 {
            // when
            let purchase = simulate_purchase(&mut rng, &constants, false, 0);

            // then
            assert_eq!(purchase.amount.0 % constants.minimum_bet.0, 0);
            assert!(purchase.tickets >= 1 && purchase.tickets <= MAX_BET_STEPS);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn spawn__emits_until_receiver_dropped() {
        // given
        let (_state_tx, state_rx) = watch::channel(GameState::default());
        let (mut rx, handle) = spawn(state_rx, GameConstants::default());

        // when
        let first = rx.recv().await;

        // then
        assert!(first.is_some());
        drop(rx);
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
