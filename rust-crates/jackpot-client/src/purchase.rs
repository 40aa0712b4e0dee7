//! Ticket purchase: validation, the `buy_tickets` call description and the
//! notifications shown for the outcome. Signing and broadcast belong to
//! whatever implements [`WalletSigner`].

use crate::{
    Error,
    Result,
    config::{
        JackpotConfig,
        functions,
    },
    rpc::SuiRpc,
    store::JackpotStore,
    types::{
        GameState,
        Mist,
        ObjectId,
    },
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    future::Future,
};

const WHALE_TICKETS: u64 = 100;

/// `buy_tickets(registry, pool, coin, clock)` where `coin` is split from gas.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasePayload {
    pub target: String,
    pub registry: ObjectId,
    pub pool: ObjectId,
    pub split_from_gas: Mist,
    pub clock: ObjectId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub digest: String,
}

pub trait WalletSigner: Send + Sync {
    fn sign_and_execute(
        &self,
        payload: &PurchasePayload,
    ) -> impl Future<Output = Result<TransactionReceipt>> + Send;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Whale,
    Info,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub text: String,
}

impl Notification {
    pub fn new(kind: NotificationKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, text)
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Checks run in the order the user would fix them.
pub fn plan_purchase(
    state: &GameState,
    config: &JackpotConfig,
    amount_sui: f64,
    balance: Mist,
) -> Result<PurchasePayload> {
    if !amount_sui.is_finite() || amount_sui <= 0.0 {
        return Err(Error::UserInput("Please enter a valid amount!".to_string()));
    }
    let minimum = config.constants.minimum_bet;
    let amount = Mist::from_sui(amount_sui);
    if amount < minimum {
        return Err(Error::UserInput(format!("Minimum bet is {minimum} SUI!")));
    }
    if amount > balance {
        return Err(Error::UserInput("Insufficient SUI balance!".to_string()));
    }
    let Some(pool_id) = state
        .registry
        .as_ref()
        .and_then(|registry| registry.current_pool_id)
    else {
        return Err(Error::UserInput(
            "Could not find active pool. Please try again.".to_string(),
        ));
    };
    let loaded = state.current_pool.as_ref().map(|pool| pool.id);
    if loaded != Some(pool_id) {
        return Err(Error::PoolOutOfSync {
            expected: pool_id.to_string(),
            actual: loaded.map_or_else(|| "nothing".to_string(), |id| id.to_string()),
        });
    }
    Ok(PurchasePayload {
        target: config.move_target(functions::BUY_TICKETS),
        registry: config.game_registry,
        pool: pool_id,
        split_from_gas: amount,
        clock: config.clock_id,
    })
}

/// Whole minimum bets in `amount`, times the multiplier in force.
pub fn estimate_tickets(amount: Mist, minimum_bet: Mist, multiplier: u64) -> u64 {
    if minimum_bet.0 == 0 {
        return 0;
    }
    (amount.0 / minimum_bet.0).saturating_mul(multiplier)
}

/// Runs the whole purchase and reports the outcome as notifications. Nothing
/// here is written to the store's `error`.
pub async fn purchase_tickets<R: SuiRpc, S: WalletSigner>(
    store: &JackpotStore<R>,
    signer: &S,
    amount_sui: f64,
    balance: Mist,
    is_last_minute: bool,
) -> Vec<Notification> {
    if store.account().is_none() {
        return vec![Notification::error("Please connect your wallet first!")];
    }
    let config = store.config();
    let payload = match plan_purchase(&store.snapshot(), config, amount_sui, balance) {
        Ok(payload) => payload,
        Err(Error::PoolOutOfSync { expected, actual }) => {
            tracing::warn!(%expected, %actual, "pool out of sync at purchase time");
            store.reconcile().await;
            return vec![Notification::error("Pool data out of sync. Refreshing...")];
        }
        Err(err) => return vec![Notification::error(err.to_string())],
    };

    tracing::info!(call = %payload.target, amount = %payload.split_from_gas, "submitting purchase");
    match signer.sign_and_execute(&payload).await {
        Ok(receipt) => {
            tracing::info!(digest = %receipt.digest, "purchase executed");
            let multiplier = if is_last_minute {
                config.constants.last_minute_multiplier
            } else {
                1
            };
            let tickets = estimate_tickets(
                payload.split_from_gas,
                config.constants.minimum_bet,
                multiplier,
            );
            let mut notifications = vec![Notification::new(
                NotificationKind::Success,
                format!(
                    "Successfully bought ~{tickets} tickets for {} SUI!",
                    payload.split_from_gas
                ),
            )];
            if tickets >= WHALE_TICKETS {
                notifications.push(Notification::new(
                    NotificationKind::Whale,
                    format!("WHALE ALERT! You bought {tickets} tickets!"),
                ));
            }
            store.fetch_current_pool(Some(payload.pool)).await;
            notifications
        }
        Err(err) => {
            tracing::error!(%err, "purchase failed");
            let err = match err {
                Error::TransactionFailure(_) => err,
                other => Error::TransactionFailure(other.to_string()),
            };
            vec![Notification::error(err.to_string())]
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        ledger::LedgerGateway,
        test_helpers::{
            FakeRpc,
            pool_fixture,
            registry_id,
            test_config,
        },
        types::{
            Address,
            Registry,
        },
    };
    use std::sync::Mutex;

    const BALANCE: Mist = Mist(50_000_000_000);

    struct FakeSigner {
        outcome: Result<TransactionReceipt>,
        seen: Mutex<Vec<PurchasePayload>>,
    }

    impl FakeSigner {
        fn new(outcome: Result<TransactionReceipt>) -> Self {
            Self {
                outcome,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl WalletSigner for FakeSigner {
        async fn sign_and_execute(&self, payload: &PurchasePayload) -> Result<TransactionReceipt> {
            self.seen.lock().unwrap().push(payload.clone());
            self.outcome.clone()
        }
    }

    fn synced_state(pool: ObjectId) -> GameState {
        GameState {
            registry: Some(Registry {
                id: registry_id(),
                current_round: 5,
                current_pool_id: Some(pool),
            }),
            current_pool: Some(pool_fixture(pool, 5, 1_000)),
            ..GameState::default()
        }
    }

    fn plan(state: &GameState, amount: f64) -> Result<PurchasePayload> {
        plan_purchase(state, &test_config(), amount, BALANCE)
    }

    fn user_message(result: Result<PurchasePayload>) -> String {
        match result {
            Err(Error::UserInput(msg)) => msg,
            other => panic!("expected user input error, got {other:?}"),
        }
    }

    #[test]
    fn plan_purchase__rejects_bad_amounts_with_user_messages() {
        // given
        let state = synced_state(ObjectId::from_u8(0x50));

        // then
        assert_eq!(user_message(plan(&state, 0.0)), "Please enter a valid amount!");
        assert_eq!(user_message(plan(&state, f64::NAN)), "Please enter a valid amount!");
        assert_eq!(user_message(plan(&state, 0.05)), "Minimum bet is 0.1 SUI!");
        assert_eq!(user_message(plan(&state, 50.5)), "Insufficient SUI balance!");
    }

    #[test]
    fn plan_purchase__requires_registry_pointer() {
        // given
        let mut state = synced_state(ObjectId::from_u8(0x50));
        state.registry.as_mut().unwrap().current_pool_id = None;

        // then
        assert_eq!(
            user_message(plan(&state, 1.0)),
            "Could not find active pool. Please try again."
        );
    }

    #[test]
    fn plan_purchase__mismatched_pool_is_out_of_sync() {
        // given
        let mut state = synced_state(ObjectId::from_u8(0x50));
        state.current_pool = Some(pool_fixture(ObjectId::from_u8(0x51), 4, 0));

        // when
        let result = plan(&state, 1.0);

        // then
        assert_eq!(
            result,
            Err(Error::PoolOutOfSync {
                expected: ObjectId::from_u8(0x50).to_string(),
                actual: ObjectId::from_u8(0x51).to_string(),
            })
        );
    }

    #[test]
    fn plan_purchase__describes_buy_tickets_call() {
        // given
        let pool = ObjectId::from_u8(0x50);
        let state = synced_state(pool);
        let config = test_config();

        // when
        let payload = plan(&state, 0.3).unwrap();

        // then
        assert_eq!(
            payload,
            PurchasePayload {
                target: config.move_target("buy_tickets"),
                registry: registry_id(),
                pool,
                split_from_gas: Mist(300_000_000),
                clock: ObjectId::from_u8(6),
            }
        );
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["split_from_gas"], 300_000_000);
        assert_eq!(json["clock"], ObjectId::from_u8(6).to_string());
    }

    #[test]
    fn plan_purchase__decimal_amounts_split_exact_mist() {
        // given
        let state = synced_state(ObjectId::from_u8(0x50));
        let minimum = test_config().constants.minimum_bet;

        // when
        let two_oh_one = plan(&state, 2.01).unwrap();
        let four_ten = plan(&state, 4.10).unwrap();

        // then
        assert_eq!(two_oh_one.split_from_gas, Mist(2_010_000_000));
        assert_eq!(four_ten.split_from_gas, Mist(4_100_000_000));
        assert_eq!(estimate_tickets(four_ten.split_from_gas, minimum, 1), 41);
    }

    #[test]
    fn estimate_tickets__counts_whole_minimum_bets() {
        let minimum = Mist(100_000_000);
        assert_eq!(estimate_tickets(Mist::from_sui(0.3), minimum, 1), 3);
        assert_eq!(estimate_tickets(Mist::from_sui(0.25), minimum, 2), 4);
        assert_eq!(estimate_tickets(Mist::from_sui(10.0), minimum, 2), 200);
    }

    fn store_with(state: GameState, account: Option<Address>) -> (FakeRpc, JackpotStore<FakeRpc>) {
        let rpc = FakeRpc::new();
        let config = test_config();
        let store = JackpotStore::new(LedgerGateway::new(rpc.clone(), &config), None, config);
        store.set_registry(state.registry);
        store.set_current_pool(state.current_pool);
        store.set_account(account);
        (rpc, store)
    }

    #[tokio::test]
    async fn purchase_tickets__success_reports_estimate_and_whale() {
        // given
        let pool = pool_fixture(ObjectId::from_u8(0x50), 5, 1_000);
        let (rpc, store) = store_with(synced_state(pool.id), Some(Address::from_u8(0xa1)));
        rpc.insert_pool(&pool);
        let signer = FakeSigner::new(Ok(TransactionReceipt {
            digest: "9xDigest".to_string(),
        }));

        // when
        let notifications = purchase_tickets(&store, &signer, 6.0, BALANCE, true).await;

        // then
        assert_eq!(
            notifications,
            vec![
                Notification::new(
                    NotificationKind::Success,
                    "Successfully bought ~120 tickets for 6 SUI!"
                ),
                Notification::new(NotificationKind::Whale, "WHALE ALERT! You bought 120 tickets!"),
            ]
        );
        assert_eq!(signer.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn purchase_tickets__signer_failure_is_not_stored() {
        // given
        let pool = ObjectId::from_u8(0x50);
        let (_rpc, store) = store_with(synced_state(pool), Some(Address::from_u8(0xa1)));
        let signer = FakeSigner::new(Err(Error::Network("rejected by wallet".to_string())));

        // when
        let notifications = purchase_tickets(&store, &signer, 1.0, BALANCE, false).await;

        // then
        assert_eq!(
            notifications,
            vec![Notification::error(
                "Transaction failed: network error: rejected by wallet"
            )]
        );
        assert_eq!(store.snapshot().error, None);
    }

    #[tokio::test]
    async fn purchase_tickets__requires_connected_account() {
        // given
        let (_rpc, store) = store_with(synced_state(ObjectId::from_u8(0x50)), None);
        let signer = FakeSigner::new(Ok(TransactionReceipt {
            digest: String::new(),
        }));

        // when
        let notifications = purchase_tickets(&store, &signer, 1.0, BALANCE, false).await;

        // then
        assert_eq!(
            notifications,
            vec![Notification::error("Please connect your wallet first!")]
        );
        assert!(signer.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn purchase_tickets__out_of_sync_reconciles_instead_of_signing() {
        // given
        let stale = pool_fixture(ObjectId::from_u8(0x50), 4, 1_000);
        let live = pool_fixture(ObjectId::from_u8(0x51), 5, 2_000);
        let mut state = synced_state(live.id);
        state.current_pool = Some(stale);
        let (rpc, store) = store_with(state, Some(Address::from_u8(0xa1)));
        rpc.insert_registry(registry_id(), 5, Some(live.id));
        rpc.insert_pool(&live);
        let signer = FakeSigner::new(Ok(TransactionReceipt {
            digest: String::new(),
        }));

        // when
        let notifications = purchase_tickets(&store, &signer, 1.0, BALANCE, false).await;

        // then
        assert_eq!(
            notifications,
            vec![Notification::error("Pool data out of sync. Refreshing...")]
        );
        assert!(signer.seen.lock().unwrap().is_empty());
        assert_eq!(store.snapshot().current_pool, Some(live));
    }
}
