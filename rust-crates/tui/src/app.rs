use crate::{
    demo::{
        self,
        DemoPurchase,
    },
    signer::ExportSigner,
    ui,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use itertools::Itertools;
use jackpot_client::{
    activity::{
        ActivityFeed,
        ActivityWorker,
    },
    config::{
        JackpotConfig,
        Network,
    },
    derive::{
        self,
        RoundView,
    },
    purchase::{
        self,
        Notification,
        NotificationKind,
    },
    rpc::{
        HttpSuiRpc,
        SuiRpc,
    },
    store::JackpotStore,
    types::{
        Address,
        Mist,
        SyncStatus,
    },
};
use std::{
    collections::VecDeque,
    time::Duration,
};
use tokio::sync::mpsc;
use wallet_session::SessionStore;

const RENDER_TICK: Duration = Duration::from_secs(1);
const MAX_NOTIFICATIONS: usize = 6;
const MAX_DEMO_PURCHASES: usize = 20;
const ACTIVITY_ROWS: usize = 20;

#[derive(Debug, Default)]
pub struct AppOptions {
    pub address: Option<Address>,
    pub session_dir: Option<String>,
    pub demo: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivityLine {
    pub timestamp_ms: u64,
    pub text: String,
    pub simulated: bool,
}

/// Everything one frame renders.
#[derive(Clone, Debug)]
pub struct DashboardSnapshot {
    pub view: RoundView,
    pub round_duration_ms: u64,
    pub network: Network,
    pub sync: SyncStatus,
    pub account: Option<Address>,
    pub balance: Option<Mist>,
    pub loading: bool,
    pub error: Option<String>,
    /// Newest first.
    pub activity: Vec<ActivityLine>,
    pub activity_error: Option<String>,
    /// Newest first.
    pub notifications: Vec<Notification>,
    pub demo: bool,
}

struct AppController<R> {
    store: JackpotStore<R>,
    session: SessionStore,
    signer: ExportSigner,
    balance: Option<Mist>,
    notifications: VecDeque<Notification>,
    demo_purchases: VecDeque<DemoPurchase>,
    demo: bool,
}

impl<R: SuiRpc> AppController<R> {
    fn new(store: JackpotStore<R>, session: SessionStore, demo: bool) -> Self {
        let signer = ExportSigner::new(session.dir());
        Self {
            store,
            session,
            signer,
            balance: None,
            notifications: VecDeque::new(),
            demo_purchases: VecDeque::new(),
            demo,
        }
    }

    fn notify(&mut self, notification: Notification) {
        self.notifications.push_front(notification);
        self.notifications.truncate(MAX_NOTIFICATIONS);
    }

    async fn connect(&mut self, address: Address) {
        self.store.set_account(Some(address));
        if let Err(err) = self.session.record_connect(&address.to_string()) {
            tracing::warn!(?err, "could not persist wallet session");
        }
        self.refresh_balance().await;
        self.notify(Notification::new(
            NotificationKind::Info,
            format!("Connected {}", address.short()),
        ));
    }

    /// Reconnects the address remembered from the previous run, if the
    /// wallet was still connected when it ended.
    async fn restore_session(&mut self) {
        let record = match self.session.load() {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(?err, "wallet session unreadable");
                self.notify(Notification::error(format!("{err:#}")));
                return;
            }
        };
        let Some(raw) = record.reconnect_address() else {
            return;
        };
        match raw.parse::<Address>() {
            Ok(address) => self.connect(address).await,
            Err(err) => {
                tracing::warn!(%err, "remembered address is invalid");
            }
        }
    }

    async fn reconnect(&mut self) {
        if self.store.account().is_some() {
            return;
        }
        let remembered = self
            .session
            .load()
            .ok()
            .and_then(|record| record.address)
            .and_then(|raw| raw.parse::<Address>().ok());
        match remembered {
            Some(address) => self.connect(address).await,
            None => self.notify(Notification::error(
                "No remembered wallet. Start with --address to connect one.",
            )),
        }
    }

    fn disconnect(&mut self) {
        if self.store.account().is_none() {
            return;
        }
        self.store.set_account(None);
        self.balance = None;
        if let Err(err) = self.session.record_disconnect() {
            tracing::warn!(?err, "could not persist wallet session");
        }
        self.notify(Notification::new(
            NotificationKind::Info,
            "Wallet disconnected",
        ));
    }

    async fn refresh_balance(&mut self) {
        let Some(account) = self.store.account() else {
            self.balance = None;
            return;
        };
        match self.store.gateway().get_balance(&account).await {
            Ok(balance) => self.balance = Some(balance),
            Err(err) => {
                tracing::warn!(%account, %err, "balance read failed");
                self.balance = None;
            }
        }
    }

    async fn purchase(&mut self, amount_sui: f64) {
        self.refresh_balance().await;
        if self.store.account().is_some() && self.balance.is_none() {
            self.notify(Notification::error(
                "Could not read your SUI balance. Please try again.",
            ));
            return;
        }
        let pool_id = self
            .store
            .snapshot()
            .current_pool
            .as_ref()
            .map(|pool| pool.id);
        let last_minute = match pool_id {
            Some(pool_id) => self.store.check_last_minute(pool_id).await,
            None => false,
        };
        let outcome = purchase::purchase_tickets(
            &self.store,
            &self.signer,
            amount_sui,
            self.balance.unwrap_or_default(),
            last_minute,
        )
        .await;
        let succeeded = outcome
            .iter()
            .any(|n| n.kind == NotificationKind::Success);
        for notification in outcome.into_iter().rev() {
            self.notify(notification);
        }
        if succeeded {
            self.notify(Notification::new(
                NotificationKind::Info,
                format!(
                    "Transaction exported to {} for signing",
                    self.signer.dir().display()
                ),
            ));
            self.refresh_balance().await;
        }
    }

    fn record_demo(&mut self, purchase: DemoPurchase) {
        if purchase.is_whale() {
            self.notify(Notification::new(
                NotificationKind::Whale,
                format!(
                    "WHALE ALERT! {} bought {} tickets!",
                    purchase.buyer, purchase.tickets
                ),
            ));
        }
        self.demo_purchases.push_front(purchase);
        self.demo_purchases.truncate(MAX_DEMO_PURCHASES);
    }

    fn snapshot(&self, feed: &ActivityFeed) -> DashboardSnapshot {
        let state = self.store.snapshot();
        let config = self.store.config();
        DashboardSnapshot {
            view: RoundView::compute(&state, derive::now_ms(), &config.constants),
            round_duration_ms: config.constants.round_duration_ms,
            network: config.network,
            sync: state.sync_status(),
            account: self.store.account(),
            balance: self.balance,
            loading: state.is_loading,
            error: state.error,
            activity: merge_activity(feed, &self.demo_purchases, ACTIVITY_ROWS),
            activity_error: feed.error.clone(),
            notifications: self.notifications.iter().cloned().collect(),
            demo: self.demo,
        }
    }
}

/// Interleaves ledger events and simulated purchases, newest first.
fn merge_activity(
    feed: &ActivityFeed,
    demo: &VecDeque<DemoPurchase>,
    limit: usize,
) -> Vec<ActivityLine> {
    let live = feed.entries.iter().map(|entry| ActivityLine {
        timestamp_ms: entry.timestamp_ms,
        text: entry.event.to_string(),
        simulated: false,
    });
    let simulated = demo.iter().map(|purchase| ActivityLine {
        timestamp_ms: purchase.timestamp_ms,
        text: purchase.to_string(),
        simulated: true,
    });
    live.merge_by(simulated, |a, b| a.timestamp_ms >= b.timestamp_ms)
        .take(limit)
        .collect()
}

async fn next_demo(
    rx: &mut Option<mpsc::UnboundedReceiver<DemoPurchase>>,
) -> Option<DemoPurchase> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

pub async fn run_app(config: JackpotConfig, options: AppOptions) -> Result<()> {
    let session = SessionStore::open(options.session_dir.as_deref()).map_err(|e| eyre!(e))?;
    let activity_rpc = HttpSuiRpc::new(config.rpc_url(), config.request_timeout)?;
    let activity = ActivityWorker::spawn(activity_rpc, &config);
    let store = JackpotStore::connect(config)?;
    let reactions = store.spawn_reactions();
    store.start_auto_refresh();

    let (demo_rx, demo_handle) = if options.demo {
        let constants = store.config().constants;
        let (rx, handle) = demo::spawn(store.subscribe(), constants);
        (Some(rx), Some(handle))
    } else {
        (None, None)
    };

    let mut controller = AppController::new(store, session, options.demo);
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    tracing::info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(
        &mut controller,
        &activity,
        options.address,
        demo_rx,
        &mut ui_state,
        &mut input_events,
    )
    .await;
    ui::terminal_exit()?;

    controller.store.stop_auto_refresh();
    reactions.abort();
    if let Some(handle) = demo_handle {
        handle.abort();
    }
    activity.shutdown().await;
    res
}

async fn run_loop<R: SuiRpc>(
    controller: &mut AppController<R>,
    activity: &ActivityWorker,
    address: Option<Address>,
    mut demo_rx: Option<mpsc::UnboundedReceiver<DemoPurchase>>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    tracing::info!("Running app loop");
    ui::draw(ui_state, &controller.snapshot(&activity.feed())).wrap_err("initial draw failed")?;
    match address {
        Some(address) => controller.connect(address).await,
        None => controller.restore_session().await,
    }

    let mut state_rx = controller.store.subscribe();
    let mut feed_rx = activity.subscribe();
    let mut feed_open = true;
    let mut tick = tokio::time::interval(RENDER_TICK);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = feed_rx.changed(), if feed_open => {
                if changed.is_err() {
                    tracing::warn!("activity worker stopped");
                    feed_open = false;
                }
            }
            maybe_purchase = next_demo(&mut demo_rx) => {
                match maybe_purchase {
                    Some(purchase) => controller.record_demo(purchase),
                    None => demo_rx = None,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::Purchase(amount) => {
                        controller.notify(Notification::new(
                            NotificationKind::Info,
                            format!("Buying tickets for {amount} SUI..."),
                        ));
                        ui::draw(ui_state, &controller.snapshot(&activity.feed()))
                            .wrap_err("draw while submitting purchase failed")?;
                        controller.purchase(amount).await;
                    }
                    ui::UserEvent::Reconcile => {
                        controller.store.reconcile().await;
                        activity.fetch_now();
                        controller.refresh_balance().await;
                    }
                    ui::UserEvent::Connect => controller.reconnect().await,
                    ui::UserEvent::Disconnect => controller.disconnect(),
                }
            }
        }
        ui::draw(ui_state, &controller.snapshot(&activity.feed())).wrap_err("draw failed")?;
    }
    Ok(())
}
