//! The single owner of last-observed ledger state.
//!
//! A [`JackpotStore`] is a cheap handle. Clones share state, the in-flight
//! guard and the auto-refresh timer. Views read through [`JackpotStore::subscribe`]
//! and never see a read error as anything but the `error` string.

use crate::{
    Error,
    Result,
    config::JackpotConfig,
    derive,
    discovery::PoolDiscovery,
    ledger::LedgerGateway,
    reactive::{
        DependencyTracker,
        Reaction,
    },
    rpc::{
        HttpSuiRpc,
        SuiRpc,
    },
    types::{
        Address,
        GameState,
        ObjectId,
        Pool,
        Registry,
        UserStats,
    },
};
use std::{
    pin::pin,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        Weak,
        atomic::{
            AtomicBool,
            AtomicUsize,
            Ordering,
        },
    },
};
use tokio::{
    sync::{
        Notify,
        watch,
    },
    task::JoinHandle,
    time::{
        self,
        MissedTickBehavior,
    },
};


pub struct JackpotStore<R> {
    inner: Arc<Inner<R>>,
}

struct Inner<R> {
    gateway: LedgerGateway<R>,
    discovery: Option<PoolDiscovery<R>>,
    config: JackpotConfig,
    state: watch::Sender<GameState>,
    account: watch::Sender<Option<Address>>,
    registry_in_flight: AtomicBool,
    registry_settled: Notify,
    outstanding: AtomicUsize,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl<R> Clone for JackpotStore<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R> Drop for Inner<R> {
    fn drop(&mut self) {
        let task = self
            .refresh_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl JackpotStore<HttpSuiRpc> {
    /// Store over the configured node, with discovery across the public networks.
    pub fn connect(config: JackpotConfig) -> Result<Self> {
        let rpc = HttpSuiRpc::new(config.rpc_url(), config.request_timeout)?;
        tracing::info!(%rpc, network = %config.network, "connecting to ledger");
        let gateway = LedgerGateway::new(rpc, &config);
        let discovery = PoolDiscovery::for_networks(&config)?;
        Ok(Self::new(gateway, Some(discovery), config))
    }
}

impl<R: SuiRpc> JackpotStore<R> {
    pub fn new(
        gateway: LedgerGateway<R>,
        discovery: Option<PoolDiscovery<R>>,
        config: JackpotConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                gateway,
                discovery,
                config,
                state: watch::Sender::new(GameState::default()),
                account: watch::Sender::new(None),
                registry_in_flight: AtomicBool::new(false),
                registry_settled: Notify::new(),
                outstanding: AtomicUsize::new(0),
                refresh_task: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &JackpotConfig {
        &self.inner.config
    }

    pub fn gateway(&self) -> &LedgerGateway<R> {
        &self.inner.gateway
    }

    pub fn subscribe(&self) -> watch::Receiver<GameState> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> GameState {
        self.inner.state.borrow().clone()
    }

    pub fn account(&self) -> Option<Address> {
        *self.inner.account.borrow()
    }

    pub fn subscribe_account(&self) -> watch::Receiver<Option<Address>> {
        self.inner.account.subscribe()
    }

    pub fn set_account(&self, account: Option<Address>) {
        self.inner.account.send_if_modified(|current| {
            let changed = *current != account;
            *current = account;
            changed
        });
    }

    pub fn set_current_pool(&self, pool: Option<Pool>) {
        self.inner.state.send_if_modified(|state| {
            if state.current_pool == pool {
                return false;
            }
            state.current_pool = pool;
            state.pool_revision += 1;
            true
        });
    }

    pub fn set_registry(&self, registry: Option<Registry>) {
        self.inner.state.send_if_modified(|state| {
            if state.registry == registry {
                return false;
            }
            state.registry = registry;
            state.registry_revision += 1;
            true
        });
    }

    pub fn set_user_stats(&self, stats: UserStats) {
        self.update(|state| &mut state.user_stats, stats);
    }

    pub fn set_loading(&self, loading: bool) {
        self.update(|state| &mut state.is_loading, loading);
    }

    pub fn set_error(&self, error: Option<String>) {
        self.update(|state| &mut state.error, error);
    }

    /// Back to the empty state. Revisions keep counting so the next fetch
    /// is still seen as a change.
    pub fn reset(&self) {
        self.inner.state.send_if_modified(|state| {
            let fresh = GameState {
                registry_revision: state.registry_revision,
                pool_revision: state.pool_revision,
                ..GameState::default()
            };
            if *state == fresh {
                return false;
            }
            *state = fresh;
            true
        });
    }

    /// Concurrent calls collapse into the one already running.
    pub async fn fetch_registry(&self) {
        let inner = &self.inner;
        if inner.registry_in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!("registry fetch already in flight");
            return;
        }
        let _in_flight = InFlight {
            flag: &inner.registry_in_flight,
            settled: &inner.registry_settled,
        };
        let _loading = self.begin_loading();

        match inner.gateway.get_registry(&inner.config.game_registry).await {
            Ok(registry) => {
                tracing::info!(
                    round = registry.current_round,
                    pool = ?registry.current_pool_id,
                    "registry loaded"
                );
                inner.state.send_modify(|state| {
                    state.registry = Some(registry);
                    state.registry_revision += 1;
                    state.error = None;
                });
            }
            Err(err) => self.record_error("registry", err),
        }
    }

    /// Falls back to the registry pointer, then to the pinned pool.
    pub async fn fetch_current_pool(&self, pool_id: Option<ObjectId>) {
        let pool_id = pool_id
            .or_else(|| {
                self.inner
                    .state
                    .borrow()
                    .registry
                    .as_ref()
                    .and_then(|registry| registry.current_pool_id)
            })
            .or(self.inner.config.current_pool);
        let Some(pool_id) = pool_id else {
            tracing::warn!("no pool id available to fetch");
            return;
        };
        let _loading = self.begin_loading();

        match self.inner.gateway.get_pool(&pool_id).await {
            Ok(pool) if pool.id != pool_id => {
                self.record_error(
                    "pool",
                    Error::PoolOutOfSync {
                        expected: pool_id.to_string(),
                        actual: pool.id.to_string(),
                    },
                );
            }
            Ok(pool) => {
                tracing::info!(
                    %pool_id,
                    round = pool.round_number,
                    tickets = pool.total_ticket_count,
                    state = %pool.state,
                    "pool loaded"
                );
                self.adopt_pool(pool);
            }
            Err(err) => self.record_error("pool", err),
        }
    }

    /// Results for an account that is no longer connected are dropped.
    pub async fn fetch_user_stats(&self, pool_id: ObjectId, account: Address) {
        let _loading = self.begin_loading();
        let tickets = match self.inner.gateway.get_user_tickets(&pool_id, &account).await {
            Ok(tickets) => tickets,
            Err(err) => {
                self.record_error("user stats", err);
                return;
            }
        };
        if self.account() != Some(account) {
            tracing::debug!(%account, "account changed while fetching stats");
            return;
        }
        let total = self
            .inner
            .state
            .borrow()
            .current_pool
            .as_ref()
            .filter(|pool| pool.id == pool_id)
            .map_or(0, |pool| pool.total_ticket_count);
        let stats = UserStats {
            tickets,
            win_probability: derive::win_probability(tickets, total),
            total_spent: derive::estimated_spend(tickets, &self.inner.config.constants),
        };
        tracing::debug!(%account, ?stats, "user stats loaded");
        self.set_user_stats(stats);
    }

    /// The ledger's opinion of the multiplier window; `false` if it cannot be asked.
    pub async fn check_last_minute(&self, pool_id: ObjectId) -> bool {
        match self
            .inner
            .gateway
            .is_last_minute(&pool_id, &self.inner.config.clock_id)
            .await
        {
            Ok(last_minute) => last_minute,
            Err(err) => {
                tracing::warn!(%pool_id, %err, "last minute check failed");
                false
            }
        }
    }

    /// Only runs while the loaded registry has no pool pointer.
    pub async fn discover_and_load_latest_pool(&self) {
        let has_pointer = self
            .inner
            .state
            .borrow()
            .registry
            .as_ref()
            .is_some_and(|registry| registry.current_pool_id.is_some());
        if has_pointer {
            tracing::debug!("registry already points at a pool, skipping discovery");
            return;
        }
        let Some(discovery) = &self.inner.discovery else {
            self.record_error("discovery", Error::NoActivePool);
            return;
        };
        let _loading = self.begin_loading();

        match discovery
            .find_latest_pool(&self.inner.config.game_registry)
            .await
        {
            Ok(found) => {
                if found.network != self.inner.config.network {
                    tracing::warn!(
                        configured = %self.inner.config.network,
                        found = %found.network,
                        "live pool is on a different network than configured"
                    );
                }
                self.adopt_pool(found.pool);
            }
            Err(err) => self.record_error("discovery", err),
        }
    }

    /// Re-reads the registry and the pool it points at. A registry fetch
    /// already in flight is awaited rather than skipped.
    pub async fn reconcile(&self) {
        tracing::info!("reconciling pool with registry");
        self.fetch_registry().await;
        self.registry_settled().await;
        let pointer = self
            .inner
            .state
            .borrow()
            .registry
            .as_ref()
            .and_then(|registry| registry.current_pool_id);
        match pointer {
            Some(pool_id) => self.fetch_current_pool(Some(pool_id)).await,
            None => self.discover_and_load_latest_pool().await,
        }
    }

    /// Immediate registry fetch, then one per poll interval. Replaces any
    /// running timer.
    pub fn start_auto_refresh(&self) {
        let period = self.inner.config.poll_interval;
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(store) = upgrade(&weak) else {
                    break;
                };
                tokio::spawn(async move { store.fetch_registry().await });
            }
        });
        let previous = self
            .inner
            .refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            tracing::debug!("replacing auto refresh timer");
            previous.abort();
        }
        tracing::info!(?period, "auto refresh started");
    }

    /// Fetches already started run to completion.
    pub fn stop_auto_refresh(&self) {
        let task = self
            .inner
            .refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            tracing::info!("auto refresh stopped");
        }
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.inner
            .refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Drives the registry -> pool -> user stats edges until the store is dropped.
    pub fn spawn_reactions(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let mut state_rx = self.subscribe();
        let mut account_rx = self.subscribe_account();
        let mut tracker = DependencyTracker::new(self.inner.config.current_pool);

        tokio::spawn(async move {
            loop {
                let state = state_rx.borrow_and_update().clone();
                let account = *account_rx.borrow_and_update();
                let reactions = tracker.observe(&state, account);
                if !reactions.is_empty() {
                    let Some(store) = upgrade(&weak) else {
                        break;
                    };
                    for reaction in reactions {
                        store.react(reaction).await;
                    }
                }
                tokio::select! {
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    changed = account_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("reaction loop finished");
        })
    }

    async fn react(&self, reaction: Reaction) {
        tracing::debug!(?reaction, "reacting to state change");
        match reaction {
            Reaction::FetchPool(pool_id) => self.fetch_current_pool(Some(pool_id)).await,
            Reaction::DiscoverPool => self.discover_and_load_latest_pool().await,
            Reaction::FetchUserStats { pool, account } => {
                self.fetch_user_stats(pool, account).await
            }
            Reaction::ClearUserStats => self.set_user_stats(UserStats::default()),
        }
    }

    /// An identical re-read only clears the error; the revision moves on
    /// real changes.
    fn adopt_pool(&self, pool: Pool) {
        self.inner.state.send_if_modified(|state| {
            let cleared = state.error.take().is_some();
            if state.current_pool.as_ref() == Some(&pool) {
                return cleared;
            }
            state.current_pool = Some(pool);
            state.pool_revision += 1;
            true
        });
    }

    async fn registry_settled(&self) {
        let mut settled = pin!(self.inner.registry_settled.notified());
        settled.as_mut().enable();
        if self.inner.registry_in_flight.load(Ordering::Acquire) {
            settled.await;
        }
    }

    fn record_error(&self, what: &str, err: Error) {
        tracing::warn!(%err, "{what} fetch failed");
        self.set_error(Some(err.to_string()));
    }

    fn update<T: PartialEq>(&self, field: impl FnOnce(&mut GameState) -> &mut T, value: T) {
        self.inner.state.send_if_modified(|state| {
            let slot = field(state);
            if *slot == value {
                return false;
            }
            *slot = value;
            true
        });
    }

    fn begin_loading(&self) -> Loading<'_> {
        let outstanding = &self.inner.outstanding;
        self.inner.state.send_if_modified(|state| {
            outstanding.fetch_add(1, Ordering::AcqRel);
            let changed = !state.is_loading;
            state.is_loading = true;
            changed
        });
        Loading {
            state: &self.inner.state,
            outstanding,
        }
    }
}

fn upgrade<R>(weak: &Weak<Inner<R>>) -> Option<JackpotStore<R>> {
    weak.upgrade().map(|inner| JackpotStore { inner })
}

struct InFlight<'a> {
    flag: &'a AtomicBool,
    settled: &'a Notify,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.settled.notify_waiters();
    }
}

/// Clears `is_loading` when the last outstanding fetch finishes.
struct Loading<'a> {
    state: &'a watch::Sender<GameState>,
    outstanding: &'a AtomicUsize,
}

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        let outstanding = self.outstanding;
        self.state.send_if_modified(|state| {
            let last = outstanding.fetch_sub(1, Ordering::AcqRel) == 1;
            if last && state.is_loading {
                state.is_loading = false;
                return true;
            }
            false
        });
    }
}
