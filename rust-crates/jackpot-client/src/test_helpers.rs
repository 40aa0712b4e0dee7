//! In-memory ledger double and fixtures shared by unit tests and downstream crates.

use crate::{
    Error,
    Result,
    config::{
        JackpotConfig,
        RawConfig,
    },
    rpc::{
        EventQuery,
        ObjectContent,
        Owner,
        ReturnValue,
        SuiEvent,
        SuiObject,
        SuiRpc,
        TransactionKind,
    },
    types::{
        Address,
        Mist,
        ObjectId,
        Pool,
        RoundState,
    },
};
use serde_json::{
    Value,
    json,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
};
use tokio::sync::Semaphore;

pub const PACKAGE: &str = "0xfeed";
pub const REGISTRY: &str = "0x10";
pub const HISTORY: &str = "0x11";

pub fn test_config() -> JackpotConfig {
    RawConfig {
        package_id: Some(PACKAGE.to_string()),
        game_registry: Some(REGISTRY.to_string()),
        round_history: Some(HISTORY.to_string()),
        ..RawConfig::default()
    }
    .validate()
    .expect("test configuration is valid")
}

pub fn registry_id() -> ObjectId {
    REGISTRY.parse().expect("valid registry id")
}

/// Active pool with 120.5 SUI across 1205 tickets.
pub fn pool_fixture(id: ObjectId, round_number: u64, end_time: u64) -> Pool {
    Pool {
        id,
        round_number,
        start_time: end_time.saturating_sub(600_000),
        end_time,
        total_pool: Mist(120_500_000_000),
        tickets: Vec::new(),
        total_ticket_count: 1205,
        winner: None,
        state: RoundState::Active,
        airdrop_recipients: Vec::new(),
    }
}

pub fn shared_object(id: ObjectId, type_: String, fields: Value) -> SuiObject {
    SuiObject {
        object_id: id,
        version: 3,
        owner: Some(Owner::Shared {
            initial_shared_version: 2,
        }),
        content: Some(ObjectContent::MoveObject { type_, fields }),
    }
}

pub fn registry_object(id: ObjectId, current_round: u64, current_pool_id: Value) -> SuiObject {
    shared_object(
        id,
        format!("{PACKAGE}::jackpot_contract::GameRegistry"),
        json!({
            "id": { "id": id.to_string() },
            "current_round": current_round.to_string(),
            "current_pool_id": current_pool_id,
        }),
    )
}

pub fn pool_object(pool: &Pool) -> SuiObject {
    let state = match pool.state {
        RoundState::Active => 0,
        RoundState::Drawing => 1,
        RoundState::Completed => 2,
    };
    let tickets: Vec<Value> = pool
        .tickets
        .iter()
        .map(|ticket| {
            json!({
                "type": format!("{PACKAGE}::jackpot_contract::Ticket"),
                "fields": {
                    "owner": ticket.owner.to_string(),
                    "amount": ticket.amount.0.to_string(),
                    "ticket_count": ticket.ticket_count.to_string(),
                    "multiplier": ticket.multiplier.to_string(),
                    "purchase_time": ticket.purchase_time.to_string(),
                }
            })
        })
        .collect();
    shared_object(
        pool.id,
        format!("{PACKAGE}::jackpot_contract::LotteryPool"),
        json!({
            "id": { "id": pool.id.to_string() },
            "round_number": pool.round_number.to_string(),
            "start_time": pool.start_time.to_string(),
            "end_time": pool.end_time.to_string(),
            "total_pool": pool.total_pool.0.to_string(),
            "tickets": tickets,
            "total_ticket_count": pool.total_ticket_count.to_string(),
            "winner": pool.winner.map(|w| w.to_string()),
            "state": state,
            "airdrop_recipients": pool
                .airdrop_recipients
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
        }),
    )
}

#[derive(Default)]
struct FakeRpcInner {
    objects: Mutex<HashMap<ObjectId, SuiObject>>,
    inspect: Mutex<HashMap<String, Result<Vec<ReturnValue>>>>,
    events: Mutex<Vec<SuiEvent>>,
    balances: Mutex<HashMap<Address, Mist>>,
    failure: Mutex<Option<Error>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    calls: Mutex<Vec<String>>,
}

/// Clones share the same ledger contents.
#[derive(Clone, Default)]
pub struct FakeRpc {
    inner: Arc<FakeRpcInner>,
}

impl FakeRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_object(&self, object: SuiObject) {
        self.inner
            .objects
            .lock()
            .unwrap()
            .insert(object.object_id, object);
    }

    /// Serves `object` when `id` is requested, whatever its own id says.
    pub fn insert_object_at(&self, id: ObjectId, object: SuiObject) {
        self.inner.objects.lock().unwrap().insert(id, object);
    }

    pub fn insert_registry(&self, id: ObjectId, current_round: u64, pointer: Option<ObjectId>) {
        let pointer = match pointer {
            Some(pool) => json!({ "vec": [pool.to_string()] }),
            None => json!({ "vec": [] }),
        };
        self.insert_object(registry_object(id, current_round, pointer));
    }

    pub fn insert_pool(&self, pool: &Pool) {
        self.insert_object(pool_object(pool));
    }

    pub fn remove_object(&self, id: &ObjectId) {
        self.inner.objects.lock().unwrap().remove(id);
    }

    pub fn set_inspect(&self, function: &str, result: Result<Vec<ReturnValue>>) {
        self.inner
            .inspect
            .lock()
            .unwrap()
            .insert(function.to_string(), result);
    }

    pub fn set_events(&self, events: Vec<SuiEvent>) {
        *self.inner.events.lock().unwrap() = events;
    }

    pub fn set_balance(&self, owner: Address, balance: Mist) {
        self.inner.balances.lock().unwrap().insert(owner, balance);
    }

    /// Every call fails with `failure` until cleared with `None`.
    pub fn fail_with(&self, failure: Option<Error>) {
        *self.inner.failure.lock().unwrap() = failure;
    }

    /// Object reads block until permits are added to the returned semaphore.
    pub fn hold_reads(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.inner.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.inner.calls.lock().unwrap().push(call);
    }

    fn check_failure(&self) -> Result<()> {
        match self.inner.failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl SuiRpc for FakeRpc {
    async fn get_object(&self, id: &ObjectId) -> Result<Option<SuiObject>> {
        self.record(format!("get_object {id}"));
        let gate = self.inner.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.check_failure()?;
        Ok(self.inner.objects.lock().unwrap().get(id).cloned())
    }

    async fn dev_inspect(
        &self,
        sender: &Address,
        tx: &TransactionKind,
    ) -> Result<Vec<ReturnValue>> {
        self.record(format!("dev_inspect {} {sender}", tx.function()));
        self.check_failure()?;
        self.inner
            .inspect
            .lock()
            .unwrap()
            .get(tx.function())
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn query_events(&self, query: &EventQuery) -> Result<Vec<SuiEvent>> {
        self.record(format!("query_events {}", query.module));
        self.check_failure()?;
        let events = self.inner.events.lock().unwrap().clone();
        Ok(events.into_iter().take(query.limit).collect())
    }

    async fn get_balance(&self, owner: &Address) -> Result<Mist> {
        self.record(format!("get_balance {owner}"));
        self.check_failure()?;
        Ok(self
            .inner
            .balances
            .lock()
            .unwrap()
            .get(owner)
            .copied()
            .unwrap_or_default())
    }
}
