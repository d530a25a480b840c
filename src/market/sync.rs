//! Market data synchroniser.
//!
//! One watcher per observed market. It reconciles three update sources -
//! cache-first initial load, the periodic background refetch, and push
//! events - into a single observable [`MarketView`], applying updates in
//! arrival order (last write wins per field group).
//!
//! Push reconnects are bounded: after `max_push_reconnects` consecutive
//! failed sessions the watcher downgrades permanently to polling-only.
//! The periodic refetch remains the freshness floor either way.

use crate::backend::MarketFetch;
use crate::config::SyncConfig;
use crate::errors::ErrorInfo;
use crate::market::cache::SnapshotCache;
use crate::market::sse::{PushConnect, PushStream};
use crate::market::{MarketSnapshot, PushEvent};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior, Sleep};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub include_stats: bool,
    pub refetch_interval: Duration,
    pub auto_connect: bool,
    pub push_reconnect_delay: Duration,
    pub max_push_reconnects: u32,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            include_stats: false,
            refetch_interval: Duration::from_secs(30),
            auto_connect: true,
            push_reconnect_delay: Duration::from_secs(5),
            max_push_reconnects: 5,
        }
    }
}

impl WatchOptions {
    pub fn from_config(cfg: &SyncConfig) -> Self {
        Self {
            include_stats: cfg.include_stats,
            refetch_interval: Duration::from_secs(cfg.refetch_interval_secs),
            auto_connect: cfg.auto_connect,
            push_reconnect_delay: Duration::from_secs(cfg.push_reconnect_secs),
            max_push_reconnects: cfg.max_push_reconnects,
        }
    }
}

/// Observable state of one watched market.
#[derive(Debug, Clone, Default)]
pub struct MarketView {
    pub snapshot: Option<MarketSnapshot>,
    /// First (or foreground) load in progress; no snapshot should be shown.
    pub is_loading: bool,
    /// Background refetch in progress; the current snapshot stays visible.
    pub is_fetching: bool,
    pub error: Option<ErrorInfo>,
    pub last_updated: Option<DateTime<Utc>>,
}

enum WatchCmd {
    Refetch,
    Reset,
    Stop,
}

/// Handle to a spawned watcher. Dropping it tears the watcher down; no
/// state updates are delivered after teardown.
pub struct MarketWatcher {
    state_rx: watch::Receiver<MarketView>,
    cmd_tx: mpsc::UnboundedSender<WatchCmd>,
    task: JoinHandle<()>,
}

impl MarketWatcher {
    pub fn spawn(
        fetcher: Arc<dyn MarketFetch>,
        push: Arc<dyn PushConnect>,
        cache: SnapshotCache,
        market_id: impl Into<String>,
        options: WatchOptions,
    ) -> Self {
        let market_id = market_id.into();
        let (state_tx, state_rx) = watch::channel(MarketView {
            is_loading: true,
            ..MarketView::default()
        });
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let runner = Runner {
            market_id,
            options,
            fetcher,
            push,
            cache,
            state_tx,
            cmd_rx,
            view: MarketView {
                is_loading: true,
                ..MarketView::default()
            },
            push_failures: 0,
            poll_only: false,
        };
        let task = tokio::spawn(runner.run());

        Self {
            state_rx,
            cmd_tx,
            task,
        }
    }

    /// Current view snapshot.
    pub fn view(&self) -> MarketView {
        self.state_rx.borrow().clone()
    }

    /// Observe view changes.
    pub fn subscribe(&self) -> watch::Receiver<MarketView> {
        self.state_rx.clone()
    }

    /// Invalidate the cache and fetch in the foreground (loading state).
    pub fn refetch(&self) {
        let _ = self.cmd_tx.send(WatchCmd::Refetch);
    }

    /// Clear local state, invalidate the cache, close the push channel.
    pub fn reset(&self) {
        let _ = self.cmd_tx.send(WatchCmd::Reset);
    }

    /// Tear the watcher down.
    pub fn stop(&self) {
        let _ = self.cmd_tx.send(WatchCmd::Stop);
    }
}

impl Drop for MarketWatcher {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WatchCmd::Stop);
        self.task.abort();
    }
}

/// Push-channel side of the watcher loop.
enum PushPhase {
    /// Not connected and not trying: disabled, downgraded, or no snapshot
    /// yet to merge into.
    Off,
    Connected(PushStream),
    /// Waiting out the reconnect delay.
    Backoff(Pin<Box<Sleep>>),
}

enum PushSignal {
    Event(PushEvent),
    Ended,
    RetryDue,
}

async fn push_signal(phase: &mut PushPhase) -> PushSignal {
    match phase {
        PushPhase::Off => std::future::pending().await,
        PushPhase::Connected(stream) => match stream.next().await {
            Some(event) => PushSignal::Event(event),
            None => PushSignal::Ended,
        },
        PushPhase::Backoff(delay) => {
            delay.as_mut().await;
            PushSignal::RetryDue
        }
    }
}

struct Runner {
    market_id: String,
    options: WatchOptions,
    fetcher: Arc<dyn MarketFetch>,
    push: Arc<dyn PushConnect>,
    cache: SnapshotCache,
    state_tx: watch::Sender<MarketView>,
    cmd_rx: mpsc::UnboundedReceiver<WatchCmd>,
    view: MarketView,
    push_failures: u32,
    poll_only: bool,
}

impl Runner {
    async fn run(mut self) {
        self.initial_load().await;

        let mut push = PushPhase::Off;
        self.arm_push(&mut push);

        let mut refetch = interval(self.options.refetch_interval);
        refetch.set_missed_tick_behavior(MissedTickBehavior::Delay);
        refetch.tick().await; // the immediate first tick

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(WatchCmd::Refetch) => {
                        self.cache.invalidate(&self.market_id);
                        self.fetch_network(false).await;
                        self.arm_push(&mut push);
                    }
                    Some(WatchCmd::Reset) => {
                        info!(market = %self.market_id, "watcher reset");
                        self.view = MarketView::default();
                        self.publish();
                        self.cache.invalidate(&self.market_id);
                        push = PushPhase::Off;
                        self.push_failures = 0;
                    }
                    Some(WatchCmd::Stop) | None => break,
                },
                _ = refetch.tick() => {
                    self.fetch_network(true).await;
                    self.arm_push(&mut push);
                }
                signal = push_signal(&mut push) => match signal {
                    PushSignal::Event(event) => {
                        self.push_failures = 0;
                        self.on_push_event(event);
                    }
                    PushSignal::Ended => {
                        self.on_push_down(&mut push, "push stream ended");
                    }
                    PushSignal::RetryDue => {
                        match self.push.connect(&self.market_id).await {
                            Ok(stream) => {
                                info!(market = %self.market_id, "push channel connected");
                                push = PushPhase::Connected(stream);
                            }
                            Err(e) => {
                                self.on_push_down(
                                    &mut push,
                                    &format!("push connect failed: {e}"),
                                );
                            }
                        }
                    }
                },
            }
        }
        debug!(market = %self.market_id, "watcher stopped");
    }

    /// First load: serve a live cache entry without a network call,
    /// otherwise fetch - coalesced with any concurrent first observer of
    /// the same market.
    async fn initial_load(&mut self) {
        let started = Instant::now();
        self.view.is_loading = true;
        self.publish();

        let fetcher = self.fetcher.clone();
        let market_id = self.market_id.clone();
        let include_stats = self.options.include_stats;
        let result = self
            .cache
            .fetch_coalesced(&self.market_id, || async move {
                fetcher.fetch_market(&market_id, include_stats).await
            })
            .await;

        match result {
            Ok(snapshot) => {
                info!(
                    market = %self.market_id,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "market loaded"
                );
                self.view.snapshot = Some(snapshot);
                self.view.error = None;
                self.view.last_updated = Some(Utc::now());
            }
            Err(e) => {
                error!(market = %self.market_id, error = %e, "initial market load failed");
                self.view.error = Some(e.to_error_info());
            }
        }
        self.view.is_loading = false;
        self.publish();
    }

    /// Direct network fetch, bypassing the cache read. Background fetches
    /// keep the current snapshot visible instead of flipping to loading.
    async fn fetch_network(&mut self, background: bool) {
        if background {
            self.view.is_fetching = true;
        } else {
            self.view.is_loading = true;
        }
        self.publish();

        let started = Instant::now();
        match self
            .fetcher
            .fetch_market(&self.market_id, self.options.include_stats)
            .await
        {
            Ok(snapshot) => {
                self.cache.insert(&self.market_id, snapshot.clone());
                self.view.snapshot = Some(snapshot);
                self.view.error = None;
                self.view.last_updated = Some(Utc::now());
                debug!(
                    market = %self.market_id,
                    background,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "market refetched"
                );
            }
            Err(e) => {
                warn!(market = %self.market_id, background, error = %e, "market refetch failed");
                self.view.error = Some(e.to_error_info());
            }
        }
        self.view.is_loading = false;
        self.view.is_fetching = false;
        self.publish();
    }

    fn on_push_event(&mut self, event: PushEvent) {
        match event {
            PushEvent::Pool(update) => match self.view.snapshot.as_mut() {
                Some(snapshot) => {
                    snapshot.apply_pool_update(&update);
                    self.view.last_updated = Some(Utc::now());
                    self.publish();
                    debug!(market = %self.market_id, "pool update applied");
                }
                None => debug!(market = %self.market_id, "pool update before first load, dropped"),
            },
            PushEvent::Market(update) => {
                let ended = update.indicates_ended();
                match self.view.snapshot.as_mut() {
                    Some(snapshot) => {
                        snapshot.apply_market_update(&update);
                        self.view.last_updated = Some(Utc::now());
                        self.publish();
                        debug!(market = %self.market_id, status = %update.status, "market update applied");
                    }
                    None => {
                        debug!(market = %self.market_id, "market update before first load, dropped")
                    }
                }
                // Fresh observers must not see a pre-resolution snapshot.
                if ended {
                    self.cache.invalidate(&self.market_id);
                }
            }
            PushEvent::StreamError { message, code } => {
                error!(
                    market = %self.market_id,
                    code = code.as_deref().unwrap_or(""),
                    error = %message,
                    "push stream reported error"
                );
            }
        }
    }

    /// The push session is down. Schedule a bounded reconnect, or downgrade
    /// to polling-only once the budget is spent.
    fn on_push_down(&mut self, push: &mut PushPhase, reason: &str) {
        self.push_failures += 1;
        warn!(
            market = %self.market_id,
            failures = self.push_failures,
            reason,
            "push channel down"
        );

        if self.push_failures >= self.options.max_push_reconnects {
            self.poll_only = true;
            *push = PushPhase::Off;
            warn!(
                market = %self.market_id,
                "push reconnect budget exhausted, polling-only from here"
            );
        } else if self.view.snapshot.is_some() {
            *push = PushPhase::Backoff(Box::pin(sleep(self.options.push_reconnect_delay)));
        } else {
            *push = PushPhase::Off;
        }
    }

    /// Start connecting when eligible: auto-connect on, not downgraded,
    /// currently off, and a snapshot exists to merge into.
    fn arm_push(&self, push: &mut PushPhase) {
        if self.options.auto_connect
            && !self.poll_only
            && matches!(push, PushPhase::Off)
            && self.view.snapshot.is_some()
        {
            *push = PushPhase::Backoff(Box::pin(sleep(Duration::ZERO)));
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.view.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ApiError;
    use crate::market::sample_snapshot as snapshot;
    use crate::market::{MarketStatus, MarketUpdate, PoolUpdate};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedFetch {
        responses: Mutex<VecDeque<Result<MarketSnapshot, ApiError>>>,
        fallback: Option<MarketSnapshot>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedFetch {
        fn with(responses: Vec<Result<MarketSnapshot, ApiError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                fallback: Some(snapshot(100, 100, 50.0, 50.0)),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MarketFetch for ScriptedFetch {
        async fn fetch_market(
            &self,
            _market_id: &str,
            _include_stats: bool,
        ) -> Result<MarketSnapshot, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.responses.lock().unwrap().pop_front() {
                Some(result) => result,
                None => match &self.fallback {
                    Some(snap) => Ok(snap.clone()),
                    None => Err(ApiError::Api {
                        status: 500,
                        message: "scripted fetch exhausted".into(),
                        code: None,
                    }),
                },
            }
        }
    }

    /// Push connector backed by scripted channels: each connect consumes
    /// the next receiver, or fails when the script says so.
    struct ChannelPush {
        streams: Mutex<VecDeque<Option<mpsc::UnboundedReceiver<PushEvent>>>>,
        connects: AtomicUsize,
    }

    impl ChannelPush {
        fn new(streams: Vec<Option<mpsc::UnboundedReceiver<PushEvent>>>) -> Arc<Self> {
            Arc::new(Self {
                streams: Mutex::new(streams.into()),
                connects: AtomicUsize::new(0),
            })
        }

        fn never_connects() -> Arc<Self> {
            Self::new(Vec::new())
        }

        fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PushConnect for ChannelPush {
        async fn connect(
            &self,
            _market_id: &str,
        ) -> Result<PushStream, crate::market::sse::PushError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            match self.streams.lock().unwrap().pop_front().flatten() {
                Some(rx) => Ok(Box::pin(futures_util::stream::unfold(rx, |mut rx| async {
                    rx.recv().await.map(|event| (event, rx))
                }))),
                None => Err(crate::market::sse::PushError::Http(503)),
            }
        }
    }

    fn options() -> WatchOptions {
        WatchOptions {
            include_stats: false,
            refetch_interval: Duration::from_secs(300),
            auto_connect: true,
            push_reconnect_delay: Duration::from_millis(5),
            max_push_reconnects: 3,
        }
    }

    async fn wait_for(
        rx: &mut watch::Receiver<MarketView>,
        pred: impl Fn(&MarketView) -> bool,
    ) -> MarketView {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                {
                    let view = rx.borrow_and_update();
                    if pred(&view) {
                        return view.clone();
                    }
                }
                rx.changed().await.expect("watcher dropped its state");
            }
        })
        .await
        .expect("condition not reached in time")
    }

    #[tokio::test]
    async fn live_cache_entry_is_served_without_a_fetch() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        cache.insert("m1", snapshot(100, 100, 50.0, 50.0));
        let fetch = ScriptedFetch::with(Vec::new());
        let push = ChannelPush::never_connects();

        let watcher = MarketWatcher::spawn(
            fetch.clone(),
            push,
            cache,
            "m1",
            WatchOptions {
                auto_connect: false,
                ..options()
            },
        );
        let mut rx = watcher.subscribe();
        let view = wait_for(&mut rx, |v| v.snapshot.is_some()).await;

        assert_eq!(view.snapshot.unwrap().market_id, "m1");
        assert!(!view.is_loading);
        assert_eq!(fetch.calls(), 0);
    }

    #[tokio::test]
    async fn empty_cache_fetches_once_and_populates_it() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        let fetch = ScriptedFetch::with(Vec::new());
        let push = ChannelPush::never_connects();

        let watcher = MarketWatcher::spawn(
            fetch.clone(),
            push,
            cache.clone(),
            "m1",
            WatchOptions {
                auto_connect: false,
                ..options()
            },
        );
        let mut rx = watcher.subscribe();
        wait_for(&mut rx, |v| v.snapshot.is_some()).await;

        assert_eq!(fetch.calls(), 1);
        assert!(cache.get_fresh("m1").is_some());
    }

    #[tokio::test]
    async fn pool_update_merges_into_the_view() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        let fetch = ScriptedFetch::with(Vec::new());
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let push = ChannelPush::new(vec![Some(event_rx)]);

        let watcher = MarketWatcher::spawn(fetch, push, cache, "m1", options());
        let mut rx = watcher.subscribe();
        let before = wait_for(&mut rx, |v| v.snapshot.is_some()).await;

        event_tx
            .send(PushEvent::Pool(PoolUpdate {
                yes_pool: Decimal::from(150),
                no_pool: Decimal::from(100),
                total_pool: Decimal::from(250),
                yes_percent: 60.0,
                no_percent: 40.0,
                total_bets: 11,
            }))
            .unwrap();

        let view = wait_for(&mut rx, |v| {
            v.snapshot.as_ref().map(|s| s.total_bets) == Some(11)
        })
        .await;
        let snap = view.snapshot.unwrap();
        let prior = before.snapshot.unwrap();
        assert_eq!(snap.yes_pool, Decimal::from(150));
        assert_eq!(snap.yes_percent, 60.0);
        assert_eq!(snap.no_percent, 40.0);
        assert_eq!(snap.question, prior.question);
        assert_eq!(snap.status, prior.status);
        assert_eq!(snap.end_date, prior.end_date);
    }

    #[tokio::test]
    async fn push_is_not_opened_until_a_snapshot_exists() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        let fetch = Arc::new(ScriptedFetch {
            responses: Mutex::new(VecDeque::from([Err::<MarketSnapshot, _>(ApiError::Api {
                status: 500,
                message: "down".into(),
                code: None,
            })])),
            fallback: None,
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        });
        let push = ChannelPush::never_connects();

        let watcher = MarketWatcher::spawn(fetch, push.clone(), cache, "m1", options());
        let mut rx = watcher.subscribe();
        wait_for(&mut rx, |v| v.error.is_some()).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(push.connects(), 0);
    }

    #[tokio::test]
    async fn ended_market_event_invalidates_the_shared_cache() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        let fetch = ScriptedFetch::with(Vec::new());
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let push = ChannelPush::new(vec![Some(event_rx)]);

        let watcher = MarketWatcher::spawn(fetch, push, cache.clone(), "m1", options());
        let mut rx = watcher.subscribe();
        wait_for(&mut rx, |v| v.snapshot.is_some()).await;
        assert!(cache.get_fresh("m1").is_some());

        event_tx
            .send(PushEvent::Market(MarketUpdate {
                status: MarketStatus::Resolved,
                winner: Some("YES".into()),
                time_remaining: 0,
                has_ended: true,
            }))
            .unwrap();

        let view = wait_for(&mut rx, |v| {
            v.snapshot.as_ref().map(|s| s.status) == Some(MarketStatus::Resolved)
        })
        .await;
        assert_eq!(view.snapshot.unwrap().winner.as_deref(), Some("YES"));
        assert!(cache.get_fresh("m1").is_none());
    }

    #[tokio::test]
    async fn manual_refetch_invalidates_and_forces_network() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        cache.insert("m1", snapshot(100, 100, 50.0, 50.0));
        let mut fresher = snapshot(300, 100, 75.0, 25.0);
        fresher.total_bets = 42;
        let fetch = ScriptedFetch::with(vec![Ok(fresher)]);
        let push = ChannelPush::never_connects();

        let watcher = MarketWatcher::spawn(
            fetch.clone(),
            push,
            cache,
            "m1",
            WatchOptions {
                auto_connect: false,
                ..options()
            },
        );
        let mut rx = watcher.subscribe();
        wait_for(&mut rx, |v| v.snapshot.is_some()).await;
        assert_eq!(fetch.calls(), 0); // served from cache

        watcher.refetch();
        let view = wait_for(&mut rx, |v| {
            v.snapshot.as_ref().map(|s| s.total_bets) == Some(42)
        })
        .await;

        assert_eq!(fetch.calls(), 1);
        assert!(!view.is_loading);
    }

    #[tokio::test]
    async fn background_refetch_runs_on_the_interval() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        let fetch = ScriptedFetch::with(Vec::new());
        let push = ChannelPush::never_connects();

        let watcher = MarketWatcher::spawn(
            fetch.clone(),
            push,
            cache,
            "m1",
            WatchOptions {
                auto_connect: false,
                refetch_interval: Duration::from_millis(20),
                ..options()
            },
        );
        let mut rx = watcher.subscribe();
        wait_for(&mut rx, |v| v.snapshot.is_some()).await;

        tokio::time::sleep(Duration::from_millis(70)).await;
        // initial load plus at least two interval refetches
        assert!(fetch.calls() >= 3, "calls = {}", fetch.calls());
        assert!(!watcher.view().is_loading);
    }

    #[tokio::test]
    async fn reset_clears_view_cache_and_push() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        let fetch = ScriptedFetch::with(Vec::new());
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        let push = ChannelPush::new(vec![Some(event_rx)]);

        let watcher = MarketWatcher::spawn(fetch, push, cache.clone(), "m1", options());
        let mut rx = watcher.subscribe();
        wait_for(&mut rx, |v| v.snapshot.is_some()).await;

        watcher.reset();
        let view = wait_for(&mut rx, |v| v.snapshot.is_none() && !v.is_loading).await;

        assert!(view.error.is_none());
        assert!(cache.get_fresh("m1").is_none());
    }

    #[tokio::test]
    async fn bounded_reconnect_then_polling_only() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        let fetch = ScriptedFetch::with(Vec::new());
        let push = ChannelPush::never_connects();

        let watcher = MarketWatcher::spawn(fetch, push.clone(), cache, "m1", options());
        let mut rx = watcher.subscribe();
        wait_for(&mut rx, |v| v.snapshot.is_some()).await;

        // reconnect delay 5ms, budget 3: all attempts spent quickly
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(push.connects(), 3);

        // downgraded for good - no further attempts
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(push.connects(), 3);
        drop(watcher);
    }

    #[tokio::test]
    async fn no_updates_after_teardown() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        let fetch = ScriptedFetch::with(Vec::new());
        let push = ChannelPush::never_connects();

        let watcher = MarketWatcher::spawn(
            fetch,
            push,
            cache,
            "m1",
            WatchOptions {
                auto_connect: false,
                ..options()
            },
        );
        let mut rx = watcher.subscribe();
        wait_for(&mut rx, |v| v.snapshot.is_some()).await;

        watcher.stop();
        // the state channel closes once the task exits
        tokio::time::timeout(Duration::from_secs(1), async {
            while rx.changed().await.is_ok() {}
        })
        .await
        .expect("state channel never closed");
    }
}
