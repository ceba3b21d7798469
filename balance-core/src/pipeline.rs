//! Reactive balance recomputation
//!
//! One actor task per pipeline keeps a balance snapshot fresh while the store
//! changes underneath it:
//! - The store's three snapshot streams feed the actor
//! - A debounce timer, reset on every notification, coalesces bursts
//! - The engine runs synchronously inside the actor, so computations never overlap
//! - Results go into a single-slot versioned cell read by any number of consumers
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   LedgerStore                         │
//! │   accounts │ active lines │ currencies  (streams)     │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ full snapshots
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              PipelineActor (Single Task)              │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │ Latest snapshot per stream                     │  │
//! │  │ Timer: reset per change, fires after quiet gap │  │
//! │  └────────────────────────────────────────────────┘  │
//! │                       │                               │
//! │                       ▼                               │
//! │           engine::compute_balances_with()             │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ BalanceCell::publish (version-guarded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │     BalancePipeline / BalanceSubscription (watch)     │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Failures never leave consumers without a value: the last good balances (or
//! an empty map) are republished with `last_error` set.

use crate::{
    config::Config,
    currency::{Currency, PrecisionTable},
    engine::{compute_balances_with, BalanceReport, IntegrityPolicy},
    error::{Error, IntegrityError, Result},
    metrics::Metrics,
    store::{LedgerStore, SnapshotStream},
    types::{Account, AccountBalance, AccountId, BalanceMap, TransactionLine, ENGINE_COLUMNS},
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, Duration, Instant, Sleep};

/// Balances as published to consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceSnapshot {
    /// Monotonic version, one per recomputation; 0 before the first
    pub version: u64,

    /// Account ID → balance
    pub balances: Arc<BalanceMap>,

    /// True until the first successful computation
    pub is_loading: bool,

    /// Best-effort result with skipped lines
    pub partial: bool,

    /// What was skipped, if partial
    pub issues: Vec<IntegrityError>,

    /// Set when this version republishes stale balances after a failure
    pub last_error: Option<String>,

    /// When `balances` were computed
    pub computed_at: Option<DateTime<Utc>>,
}

impl BalanceSnapshot {
    /// Initial value before anything has been computed
    pub fn loading() -> Self {
        Self {
            version: 0,
            balances: Arc::new(BalanceMap::new()),
            is_loading: true,
            partial: false,
            issues: Vec::new(),
            last_error: None,
            computed_at: None,
        }
    }

    /// Balance of one account
    pub fn balance(&self, account_id: &AccountId) -> Option<&AccountBalance> {
        self.balances.get(account_id)
    }

    /// True if this version carries stale data
    pub fn is_stale(&self) -> bool {
        self.last_error.is_some()
    }
}

/// Single-writer, many-reader slot holding the latest snapshot.
///
/// A snapshot is only stored if its version is strictly greater than the one
/// already held, so a result from an older trigger can never replace a newer one.
#[derive(Debug)]
pub struct BalanceCell {
    sender: watch::Sender<Arc<BalanceSnapshot>>,
}

impl BalanceCell {
    /// Cell holding [`BalanceSnapshot::loading`]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Arc::new(BalanceSnapshot::loading()));
        Self { sender }
    }

    /// Store `snapshot` if it is newer; returns whether it was stored
    pub fn publish(&self, snapshot: BalanceSnapshot) -> bool {
        let snapshot = Arc::new(snapshot);
        self.sender.send_if_modified(move |current| {
            if snapshot.version > current.version {
                *current = snapshot;
                true
            } else {
                tracing::debug!(
                    stale = snapshot.version,
                    current = current.version,
                    "discarding out-of-order snapshot"
                );
                false
            }
        })
    }

    /// Latest stored snapshot
    pub fn current(&self) -> Arc<BalanceSnapshot> {
        self.sender.borrow().clone()
    }

    /// New reader
    pub fn subscribe(&self) -> watch::Receiver<Arc<BalanceSnapshot>> {
        self.sender.subscribe()
    }
}

impl Default for BalanceCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Message sent to the pipeline actor
#[derive(Debug)]
pub enum PipelineMessage {
    /// Recompute now, skipping the debounce window
    Refresh {
        /// Published version, or why the computation failed
        response: oneshot::Sender<Result<u64>>,
    },

    /// Get the latest snapshot
    Snapshot {
        /// Latest snapshot
        response: oneshot::Sender<Arc<BalanceSnapshot>>,
    },

    /// Stop the actor and drop the store subscriptions
    Shutdown,
}

/// Latest state of one store stream
struct Feed<T> {
    name: &'static str,
    stream: SnapshotStream<T>,
    latest: Option<Vec<T>>,
    error: Option<String>,
    done: bool,
}

impl<T> Feed<T> {
    fn new(name: &'static str, stream: SnapshotStream<T>) -> Self {
        Self {
            name,
            stream,
            latest: None,
            error: None,
            done: false,
        }
    }

    /// Take one stream item; true if it should trigger a recompute
    fn accept(&mut self, item: Option<Result<Vec<T>>>) -> bool {
        match item {
            Some(Ok(snapshot)) => {
                tracing::trace!(feed = self.name, rows = snapshot.len(), "snapshot received");
                self.latest = Some(snapshot);
                self.error = None;
                true
            }
            Some(Err(e)) => {
                tracing::warn!(feed = self.name, error = %e, "snapshot read failed");
                self.error = Some(format!("{} read failed: {}", self.name, e));
                true
            }
            None => {
                tracing::warn!(feed = self.name, "store stream ended");
                self.done = true;
                false
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.latest.is_some() || self.error.is_some()
    }
}

/// Actor that recomputes balances
pub struct PipelineActor {
    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<PipelineMessage>,

    accounts: Feed<Account>,
    lines: Feed<TransactionLine>,
    currencies: Feed<Currency>,

    /// Published snapshots
    cell: Arc<BalanceCell>,

    /// Balances of the last successful computation
    last_good: Option<Arc<BalanceMap>>,

    /// Version of the last trigger
    version: u64,

    /// Quiet period before recomputing
    debounce: Duration,

    /// Integrity handling
    policy: IntegrityPolicy,

    metrics: Metrics,
}

impl std::fmt::Debug for PipelineActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineActor")
            .field("version", &self.version)
            .field("debounce", &self.debounce)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl PipelineActor {
    /// Create new actor
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mailbox: mpsc::Receiver<PipelineMessage>,
        accounts: SnapshotStream<Account>,
        lines: SnapshotStream<TransactionLine>,
        currencies: SnapshotStream<Currency>,
        cell: Arc<BalanceCell>,
        debounce: Duration,
        policy: IntegrityPolicy,
        metrics: Metrics,
    ) -> Self {
        Self {
            mailbox,
            accounts: Feed::new("accounts", accounts),
            lines: Feed::new("transaction_lines", lines),
            currencies: Feed::new("currencies", currencies),
            cell,
            last_good: None,
            version: 0,
            debounce,
            policy,
            metrics,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let timer = sleep(self.debounce);
        tokio::pin!(timer);
        let mut armed = false;

        loop {
            tokio::select! {
                // Drain store feeds before the mailbox so a refresh sees every
                // write that happened before it was sent.
                biased;

                item = self.accounts.stream.next(), if !self.accounts.done => {
                    if self.accounts.accept(item) {
                        self.on_change(timer.as_mut());
                        armed = true;
                    }
                }

                item = self.lines.stream.next(), if !self.lines.done => {
                    if self.lines.accept(item) {
                        self.on_change(timer.as_mut());
                        armed = true;
                    }
                }

                item = self.currencies.stream.next(), if !self.currencies.done => {
                    if self.currencies.accept(item) {
                        self.on_change(timer.as_mut());
                        armed = true;
                    }
                }

                msg = self.mailbox.recv() => {
                    match msg {
                        Some(PipelineMessage::Refresh { response }) => {
                            armed = false;
                            let _ = response.send(self.recompute());
                        }
                        Some(PipelineMessage::Snapshot { response }) => {
                            let _ = response.send(self.cell.current());
                        }
                        // Shutdown, or every handle and subscription dropped
                        Some(PipelineMessage::Shutdown) | None => break,
                    }
                }

                () = &mut timer, if armed => {
                    armed = false;
                    if let Err(e) = self.recompute() {
                        tracing::debug!(
                            error = %e,
                            "debounced recomputation did not publish fresh balances"
                        );
                    }
                }
            }
        }

        tracing::info!(version = self.version, "balance pipeline stopped");
    }

    fn on_change(&self, timer: Pin<&mut Sleep>) {
        self.metrics.record_notification();
        timer.reset(Instant::now() + self.debounce);
    }

    fn is_ready(&self) -> bool {
        self.accounts.is_ready() && self.lines.is_ready() && self.currencies.is_ready()
    }

    /// Aggregate the latest snapshot and publish the outcome
    fn recompute(&mut self) -> Result<u64> {
        if !self.is_ready() {
            tracing::debug!("waiting for initial snapshots");
            return Err(Error::Store("initial snapshot not yet received".to_string()));
        }

        self.version += 1;
        let version = self.version;

        let started = std::time::Instant::now();
        let outcome = self.aggregate();
        self.metrics.record_recompute(started.elapsed().as_secs_f64());

        match outcome {
            Ok(report) => {
                if report.partial {
                    self.metrics.record_partial();
                }

                let balances = Arc::new(report.balances);
                self.last_good = Some(balances.clone());

                tracing::debug!(
                    version,
                    accounts = balances.len(),
                    partial = report.partial,
                    "balances recomputed"
                );

                self.publish(BalanceSnapshot {
                    version,
                    balances,
                    is_loading: false,
                    partial: report.partial,
                    issues: report.issues,
                    last_error: None,
                    computed_at: Some(Utc::now()),
                });
                Ok(version)
            }
            Err(e) => {
                self.metrics.record_failure();
                tracing::error!(
                    version,
                    error = %e,
                    "recomputation failed, serving last known balances"
                );

                let previous = self.cell.current();
                let balances = self
                    .last_good
                    .clone()
                    .unwrap_or_else(|| Arc::new(BalanceMap::new()));

                self.publish(BalanceSnapshot {
                    version,
                    balances,
                    is_loading: self.last_good.is_none(),
                    partial: previous.partial,
                    issues: previous.issues.clone(),
                    last_error: Some(e.to_string()),
                    computed_at: previous.computed_at,
                });
                Err(e)
            }
        }
    }

    fn aggregate(&self) -> Result<BalanceReport> {
        let read_error = [&self.accounts.error, &self.lines.error, &self.currencies.error]
            .into_iter()
            .flatten()
            .next();
        if let Some(e) = read_error {
            return Err(Error::Store(e.clone()));
        }

        let (Some(accounts), Some(lines), Some(currencies)) = (
            self.accounts.latest.as_deref(),
            self.lines.latest.as_deref(),
            self.currencies.latest.as_deref(),
        ) else {
            return Err(Error::Store("incomplete snapshot".to_string()));
        };

        let precisions = PrecisionTable::from_currencies(currencies)?;
        compute_balances_with(accounts, lines, &precisions, self.policy)
    }

    fn publish(&self, snapshot: BalanceSnapshot) {
        let version = snapshot.version;
        if self.cell.publish(snapshot) {
            self.metrics.record_published(version);
        }
    }
}

/// Handle for talking to the pipeline actor
#[derive(Debug, Clone)]
pub struct BalancePipeline {
    sender: mpsc::Sender<PipelineMessage>,
    updates: watch::Receiver<Arc<BalanceSnapshot>>,
}

impl BalancePipeline {
    /// Create new handle
    pub fn new(
        sender: mpsc::Sender<PipelineMessage>,
        updates: watch::Receiver<Arc<BalanceSnapshot>>,
    ) -> Self {
        Self { sender, updates }
    }

    /// Subscribe to published snapshots.
    ///
    /// The pipeline keeps running while any handle or subscription is alive.
    pub fn subscribe(&self) -> BalanceSubscription {
        BalanceSubscription {
            receiver: self.updates.clone(),
            _keepalive: self.sender.clone(),
        }
    }

    /// Latest published snapshot, without a round trip
    pub fn current(&self) -> Arc<BalanceSnapshot> {
        self.updates.borrow().clone()
    }

    /// Recompute immediately; returns the published version
    pub async fn refresh(&self) -> Result<u64> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PipelineMessage::Refresh { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Pipeline mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Latest snapshot, as seen by the actor
    pub async fn snapshot(&self) -> Result<Arc<BalanceSnapshot>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PipelineMessage::Snapshot { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Pipeline mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PipelineMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Pipeline mailbox closed".to_string()))?;
        Ok(())
    }
}

/// A consumer's view of the pipeline
#[derive(Debug)]
pub struct BalanceSubscription {
    receiver: watch::Receiver<Arc<BalanceSnapshot>>,
    _keepalive: mpsc::Sender<PipelineMessage>,
}

impl BalanceSubscription {
    /// Latest snapshot
    pub fn current(&self) -> Arc<BalanceSnapshot> {
        self.receiver.borrow().clone()
    }

    /// Latest version
    pub fn version(&self) -> u64 {
        self.receiver.borrow().version
    }

    /// True until the first successful computation
    pub fn is_loading(&self) -> bool {
        self.receiver.borrow().is_loading
    }

    /// Wait for the next published snapshot
    pub async fn changed(&mut self) -> Result<Arc<BalanceSnapshot>> {
        self.receiver
            .changed()
            .await
            .map_err(|_| Error::Concurrency("Pipeline stopped".to_string()))?;
        Ok(self.receiver.borrow_and_update().clone())
    }

    /// Wait until a snapshot with at least `version` is published
    pub async fn wait_for_version(&mut self, version: u64) -> Result<Arc<BalanceSnapshot>> {
        let snapshot = self
            .receiver
            .wait_for(|snapshot| snapshot.version >= version)
            .await
            .map_err(|_| Error::Concurrency("Pipeline stopped".to_string()))?;
        Ok(snapshot.clone())
    }

    /// Stop receiving snapshots
    pub fn unsubscribe(self) {}
}

/// Spawn the balance pipeline over `store`
pub fn spawn_balance_pipeline<S>(store: &S, config: &Config, metrics: Metrics) -> BalancePipeline
where
    S: LedgerStore + ?Sized,
{
    let (tx, rx) = mpsc::channel(config.pipeline.mailbox_capacity.max(1));
    let cell = Arc::new(BalanceCell::new());
    let updates = cell.subscribe();

    let actor = PipelineActor::new(
        rx,
        store.observe_accounts(),
        store.observe_active_transaction_lines(ENGINE_COLUMNS),
        store.observe_currencies(),
        cell,
        config.debounce(),
        config.integrity,
        metrics,
    );

    tracing::info!(
        service = %config.service_name,
        debounce_ms = config.pipeline.debounce_ms,
        "starting balance pipeline"
    );

    tokio::spawn(async move {
        actor.run().await;
    });

    BalancePipeline::new(tx, updates)
}
