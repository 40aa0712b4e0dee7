//! Recent contract events, polled in the background for the activity panel.

use crate::{
    Result,
    config::JackpotConfig,
    derive,
    rpc::{
        EventQuery,
        SuiEvent,
        SuiRpc,
        de_u64,
    },
    types::{
        Address,
        Mist,
    },
};
use serde::{
    Deserialize,
    Deserializer,
    de::DeserializeOwned,
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
    time,
};

const EVENT_PAGE_SIZE: usize = 50;
const ACTIVITY_WINDOW_MS: u64 = 60 * 60 * 1000;

fn de_mist<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Mist, D::Error> {
    de_u64(deserializer).map(Mist)
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TicketPurchased {
    pub buyer: Address,
    #[serde(deserialize_with = "de_mist")]
    pub amount: Mist,
    #[serde(deserialize_with = "de_u64")]
    pub ticket_count: u64,
    #[serde(deserialize_with = "de_u64")]
    pub multiplier: u64,
    #[serde(deserialize_with = "de_u64")]
    pub round_number: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RoundEnded {
    #[serde(deserialize_with = "de_u64")]
    pub round_number: u64,
    pub winner: Address,
    #[serde(deserialize_with = "de_mist")]
    pub prize_amount: Mist,
    #[serde(deserialize_with = "de_mist")]
    pub total_pool: Mist,
    #[serde(deserialize_with = "de_u64")]
    pub total_tickets: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct NewRoundStarted {
    #[serde(deserialize_with = "de_u64")]
    pub round_number: u64,
    #[serde(deserialize_with = "de_u64")]
    pub start_time: u64,
    #[serde(deserialize_with = "de_u64")]
    pub end_time: u64,
    #[serde(deserialize_with = "de_mist")]
    pub seed_amount: Mist,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AirdropDistributed {
    #[serde(deserialize_with = "de_u64")]
    pub round_number: u64,
    pub recipients: Vec<Address>,
    #[serde(deserialize_with = "de_mist")]
    pub amount_per_recipient: Mist,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JackpotEvent {
    TicketPurchased(TicketPurchased),
    RoundEnded(RoundEnded),
    NewRoundStarted(NewRoundStarted),
    AirdropDistributed(AirdropDistributed),
}

impl JackpotEvent {
    /// `None` for event kinds the panel does not show.
    pub fn parse(event: &SuiEvent) -> Option<Result<Self, serde_json::Error>> {
        let kind = event.type_.rsplit("::").next()?;
        let payload = &event.parsed_json;
        let parsed = match kind {
            "TicketPurchased" => decode(payload).map(JackpotEvent::TicketPurchased),
            "RoundEnded" => decode(payload).map(JackpotEvent::RoundEnded),
            "NewRoundStarted" => decode(payload).map(JackpotEvent::NewRoundStarted),
            "AirdropDistributed" => decode(payload).map(JackpotEvent::AirdropDistributed),
            _ => return None,
        };
        Some(parsed)
    }

    pub fn round_number(&self) -> u64 {
        match self {
            JackpotEvent::TicketPurchased(e) => e.round_number,
            JackpotEvent::RoundEnded(e) => e.round_number,
            JackpotEvent::NewRoundStarted(e) => e.round_number,
            JackpotEvent::AirdropDistributed(e) => e.round_number,
        }
    }
}

fn decode<T: DeserializeOwned>(payload: &serde_json::Value) -> Result<T, serde_json::Error> {
    T::deserialize(payload)
}

impl fmt::Display for JackpotEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JackpotEvent::TicketPurchased(e) => {
                write!(
                    f,
                    "{} bought {} ticket{} for {} SUI",
                    e.buyer.short(),
                    e.ticket_count,
                    if e.ticket_count == 1 { "" } else { "s" },
                    e.amount
                )?;
                if e.multiplier > 1 {
                    write!(f, " ({}X)", e.multiplier)?;
                }
                Ok(())
            }
            JackpotEvent::RoundEnded(e) => write!(
                f,
                "Round {} won by {} for {} SUI",
                e.round_number,
                e.winner.short(),
                e.prize_amount
            ),
            JackpotEvent::NewRoundStarted(e) => {
                write!(f, "Round {} started with {} SUI seed", e.round_number, e.seed_amount)
            }
            JackpotEvent::AirdropDistributed(e) => write!(
                f,
                "Airdrop of {} SUI to {} players",
                e.amount_per_recipient,
                e.recipients.len()
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivityEntry {
    pub timestamp_ms: u64,
    pub event: JackpotEvent,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActivityFeed {
    /// Newest first.
    pub entries: Vec<ActivityEntry>,
    pub updated_at: Option<u64>,
    pub error: Option<String>,
}

impl ActivityFeed {
    pub fn recent(&self, limit: usize) -> &[ActivityEntry] {
        &self.entries[..self.entries.len().min(limit)]
    }

    pub fn ticket_purchases(&self) -> impl Iterator<Item = &TicketPurchased> {
        self.entries.iter().filter_map(|entry| match &entry.event {
            JackpotEvent::TicketPurchased(purchase) => Some(purchase),
            _ => None,
        })
    }
}

/// Keeps events from the last hour, newest first. Undecodable payloads are
/// skipped with a warning.
pub fn classify_events(events: &[SuiEvent], now_ms: u64) -> Vec<ActivityEntry> {
    let since = now_ms.saturating_sub(ACTIVITY_WINDOW_MS);
    let mut entries: Vec<ActivityEntry> = events
        .iter()
        .filter_map(|event| {
            let timestamp_ms = event.timestamp_ms.filter(|ts| *ts > since)?;
            match JackpotEvent::parse(event)? {
                Ok(parsed) => Some(ActivityEntry {
                    timestamp_ms,
                    event: parsed,
                }),
                Err(err) => {
                    tracing::warn!(kind = %event.type_, %err, "skipping undecodable event");
                    None
                }
            }
        })
        .collect();
    entries.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
    entries
}

pub fn event_query(config: &JackpotConfig) -> EventQuery {
    EventQuery {
        package: config.package_id,
        module: config.module_name.clone(),
        limit: EVENT_PAGE_SIZE,
        descending: true,
    }
}

pub async fn fetch_recent_activity<R: SuiRpc>(
    rpc: &R,
    query: &EventQuery,
    now_ms: u64,
) -> Result<Vec<ActivityEntry>> {
    let events = rpc.query_events(query).await?;
    Ok(classify_events(&events, now_ms))
}

#[derive(Debug)]
pub enum ActivityCommand {
    FetchNow,
    Shutdown,
}

/// Background poller publishing [`ActivityFeed`] snapshots.
pub struct ActivityWorker {
    commands: mpsc::UnboundedSender<ActivityCommand>,
    feed: watch::Receiver<ActivityFeed>,
    task: JoinHandle<()>,
}

impl ActivityWorker {
    pub fn spawn<R: SuiRpc>(rpc: R, config: &JackpotConfig) -> Self {
        let (commands, cmd_rx) = mpsc::unbounded_channel();
        let (feed_tx, feed) = watch::channel(ActivityFeed::default());
        let task = tokio::spawn(activity_worker(
            config.activity_interval,
            rpc,
            event_query(config),
            cmd_rx,
            feed_tx,
        ));
        Self {
            commands,
            feed,
            task,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ActivityFeed> {
        self.feed.clone()
    }

    pub fn feed(&self) -> ActivityFeed {
        self.feed.borrow().clone()
    }

    pub fn fetch_now(&self) {
        if self.commands.send(ActivityCommand::FetchNow).is_err() {
            tracing::debug!("activity worker already stopped");
        }
    }

    pub async fn shutdown(self) {
        let _ = self.commands.send(ActivityCommand::Shutdown);
        if let Err(err) = self.task.await {
            tracing::warn!(?err, "activity worker ended abnormally");
        }
    }
}

async fn activity_worker<R: SuiRpc>(
    poll_interval: Duration,
    rpc: R,
    query: EventQuery,
    mut cmd_rx: mpsc::UnboundedReceiver<ActivityCommand>,
    feed_tx: watch::Sender<ActivityFeed>,
) {
    async fn refresh<R: SuiRpc>(
        rpc: &R,
        query: &EventQuery,
        feed_tx: &watch::Sender<ActivityFeed>,
    ) {
        let now = derive::now_ms();
        match fetch_recent_activity(rpc, query, now).await {
            Ok(entries) => {
                tracing::debug!(count = entries.len(), "activity refreshed");
                feed_tx.send_replace(ActivityFeed {
                    entries,
                    updated_at: Some(now),
                    error: None,
                });
            }
            Err(err) => {
                tracing::warn!(%err, "activity fetch failed");
                feed_tx.send_modify(|feed| feed.error = Some(err.to_string()));
            }
        }
    }

    let mut ticker = time::interval(poll_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => refresh(&rpc, &query, &feed_tx).await,
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    break;
                };
                match cmd {
                    ActivityCommand::FetchNow => refresh(&rpc, &query, &feed_tx).await,
                    ActivityCommand::Shutdown => break,
                }
            }
        }
    }
    tracing::debug!(package = %query.package, "activity worker stopped");
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        Error,
        test_helpers::{
            FakeRpc,
            PACKAGE,
            test_config,
        },
    };
    use serde_json::json;

    const NOW: u64 = 1_700_000_000_000;

    fn event(kind: &str, timestamp_ms: Option<u64>, payload: serde_json::Value) -> SuiEvent {
        SuiEvent {
            type_: format!("{PACKAGE}::jackpot_contract::{kind}"),
            sender: None,
            parsed_json: payload,
            timestamp_ms,
        }
    }

    fn purchase(buyer: u8, timestamp_ms: u64) -> SuiEvent {
        event(
            "TicketPurchased",
            Some(timestamp_ms),
            json!({
                "buyer": Address::from_u8(buyer).to_string(),
                "amount": "500000000",
                "ticket_count": "10",
                "multiplier": "2",
                "round_number": "5",
            }),
        )
    }

    #[test]
    fn classify_events__keeps_last_hour_newest_first() {
        // given
        let events = vec![
            purchase(1, NOW - 10_000),
            purchase(2, NOW - ACTIVITY_WINDOW_MS - 1),
            purchase(3, NOW - 1_000),
            event("TicketPurchased", None, json!({})),
        ];

        // when
        let entries = classify_events(&events, NOW);

        // then
        let buyers: Vec<Address> = entries
            .iter()
            .map(|entry| match &entry.event {
                JackpotEvent::TicketPurchased(p) => p.buyer,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(buyers, vec![Address::from_u8(3), Address::from_u8(1)]);
    }

    #[test]
    fn classify_events__skips_unknown_and_malformed() {
        // given
        let events = vec![
            event("AdminChanged", Some(NOW), json!({ "admin": "0x1" })),
            event("RoundEnded", Some(NOW), json!({ "round_number": "x" })),
            event(
                "AirdropDistributed",
                Some(NOW),
                json!({
                    "round_number": 4,
                    "recipients": ["0x1", "0x2"],
                    "amount_per_recipient": "1000000000",
                }),
            ),
        ];

        // when
        let entries = classify_events(&events, NOW);

        // then
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event.round_number(), 4);
        assert_eq!(entries[0].event.to_string(), "Airdrop of 1 SUI to 2 players");
    }

    #[test]
    fn display__ticket_purchase_mentions_multiplier() {
        // given
        let entries = classify_events(&[purchase(0xab, NOW)], NOW);

        // when
        let line = entries[0].event.to_string();

        // then
        assert!(line.ends_with("bought 10 tickets for 0.5 SUI (2X)"), "{line}");
    }

    #[tokio::test]
    async fn activity_worker__publishes_and_records_failures() {
        // given
        let rpc = FakeRpc::new();
        let now = derive::now_ms();
        rpc.set_events(vec![purchase(1, now - 5_000)]);
        let worker = ActivityWorker::spawn(rpc.clone(), &test_config());
        let mut feed = worker.subscribe();

        // when
        let first = feed
            .wait_for(|feed| feed.updated_at.is_some())
            .await
            .unwrap()
            .clone();
        rpc.fail_with(Some(Error::Network("down".to_string())));
        worker.fetch_now();
        let failed = feed
            .wait_for(|feed| feed.error.is_some())
            .await
            .unwrap()
            .clone();

        // then
        assert_eq!(first.entries.len(), 1);
        assert_eq!(failed.entries, first.entries);
        assert_eq!(failed.error.as_deref(), Some("network error: down"));
        assert_eq!(rpc.count_calls("query_events jackpot_contract"), 2);
        worker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn activity_worker__polls_on_interval() {
        // given
        let rpc = FakeRpc::new();
        let worker = ActivityWorker::spawn(rpc.clone(), &test_config());
        let mut feed = worker.subscribe();
        feed.wait_for(|feed| feed.updated_at.is_some()).await.unwrap();

        // when
        tokio::time::sleep(Duration::from_secs(11)).await;

        // then
        assert_eq!(rpc.count_calls("query_events"), 3);
        worker.shutdown().await;
    }
}
