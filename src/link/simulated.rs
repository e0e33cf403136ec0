//! Fake link for the `simulated` connection mode.
//!
//! Connects after a fixed delay, then reports random latency and packet
//! error rate on a timer. Samples in this mode always come from the
//! synthetic source; nothing here touches the buffer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::session::SessionEvent;
use crate::config::SimulatedLinkConfig;
use crate::shared::Shared;
use crate::types::{ConnectionMode, ConnectionState, LinkStatus};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

struct SimulatedInner {
    state: Shared<ConnectionState>,
    config: SimulatedLinkConfig,
    events: broadcast::Sender<SessionEvent>,
    rng: Mutex<StdRng>,
    timers: Mutex<Option<CancellationToken>>,
    generation: AtomicU64,
}

#[derive(Clone)]
pub struct SimulatedLink {
    inner: Arc<SimulatedInner>,
}

impl SimulatedLink {
    pub fn new(
        state: Shared<ConnectionState>,
        config: SimulatedLinkConfig,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self::with_rng(state, config, events, StdRng::from_entropy())
    }

    pub fn with_rng(
        state: Shared<ConnectionState>,
        config: SimulatedLinkConfig,
        events: broadcast::Sender<SessionEvent>,
        rng: StdRng,
    ) -> Self {
        Self {
            inner: Arc::new(SimulatedInner {
                state,
                config,
                events,
                rng: Mutex::new(rng),
                timers: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    fn emit_status(&self, status: LinkStatus) {
        let _ = self.inner.events.send(SessionEvent::StatusChanged { status });
    }

    /// Start connecting. Ignored while connecting or connected.
    pub fn connect(&self) {
        let generation = {
            let mut st = self.inner.state.write();
            if st.mode != ConnectionMode::Simulated || st.status != LinkStatus::Disconnected {
                return;
            }
            st.status = LinkStatus::Connecting;
            self.inner.generation.load(Ordering::SeqCst)
        };
        self.emit_status(LinkStatus::Connecting);

        let token = CancellationToken::new();
        if let Some(old) = lock(&self.inner.timers).replace(token.clone()) {
            old.cancel();
        }

        let link = self.clone();
        let connect_delay = Duration::from_millis(self.inner.config.connect_delay_ms);
        let period = Duration::from_millis(self.inner.config.metrics_interval_ms.max(1));
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(connect_delay) => {}
            }
            if !link.finish_connect(generation) {
                return;
            }

            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => link.refresh_metrics(),
                }
            }
            debug!("[SimulatedLink] Metrics timer stopped");
        });
    }

    fn finish_connect(&self, generation: u64) -> bool {
        {
            let mut st = self.inner.state.write();
            if self.inner.generation.load(Ordering::SeqCst) != generation
                || st.status != LinkStatus::Connecting
            {
                return false;
            }
            st.status = LinkStatus::Connected;
        }
        info!("✅ Simulated link connected");
        self.emit_status(LinkStatus::Connected);
        self.refresh_metrics();
        true
    }

    /// Draw fresh latency (whole ms) and PER (two decimals).
    fn refresh_metrics(&self) {
        let cfg = &self.inner.config;
        let (latency, per) = {
            let mut rng = lock(&self.inner.rng);
            let latency = if cfg.latency_max_ms > cfg.latency_min_ms {
                rng.gen_range(cfg.latency_min_ms..cfg.latency_max_ms)
            } else {
                cfg.latency_min_ms
            };
            let per = if cfg.per_max > 0.0 { rng.gen_range(0.0..cfg.per_max) } else { 0.0 };
            (latency.round(), (per * 100.0).round() / 100.0)
        };
        let mut st = self.inner.state.write();
        if st.mode == ConnectionMode::Simulated && st.is_connected() {
            st.latency_ms = Some(latency);
            st.packet_error_rate = Some(per);
        }
    }

    /// Stop timers and return to disconnected. Idempotent.
    pub fn disconnect(&self) {
        if let Some(token) = lock(&self.inner.timers).take() {
            token.cancel();
        }
        let was = {
            let mut st = self.inner.state.write();
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            let was = st.status;
            st.force_disconnected();
            was
        };
        if was != LinkStatus::Disconnected {
            info!("🔌 Simulated link disconnected");
        }
        self.emit_status(LinkStatus::Disconnected);
    }

    /// Refresh the reported metrics. No-op unless connected.
    pub fn ping(&self) -> Option<f64> {
        self.refresh_metrics();
        let st = self.inner.state.read();
        if st.is_connected() {
            st.latency_ms
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link() -> (SimulatedLink, Shared<ConnectionState>) {
        let state = Shared::new("connection", ConnectionState::new(ConnectionMode::Simulated));
        let (tx, _) = broadcast::channel(16);
        let link = SimulatedLink::with_rng(
            state.clone(),
            SimulatedLinkConfig::default(),
            tx,
            StdRng::seed_from_u64(3),
        );
        (link, state)
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connects_after_delay_with_metrics() {
        let (link, state) = link();
        link.connect();
        assert_eq!(state.read().status, LinkStatus::Connecting);

        advance(799).await;
        assert_eq!(state.read().status, LinkStatus::Connecting);

        advance(2).await;
        let st = state.snapshot();
        assert_eq!(st.status, LinkStatus::Connected);
        let latency = st.latency_ms.unwrap();
        assert!((10.0..=80.0).contains(&latency));
        assert_eq!(latency.fract(), 0.0);
        let per = st.packet_error_rate.unwrap();
        assert!((0.0..=0.5).contains(&per));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_before_connect_cancels() {
        let (link, state) = link();
        link.connect();
        advance(400).await;
        link.disconnect();
        advance(1_000).await;
        let st = state.snapshot();
        assert_eq!(st.status, LinkStatus::Disconnected);
        assert!(st.latency_ms.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_stop_after_disconnect() {
        let (link, state) = link();
        link.connect();
        advance(900).await;
        assert!(state.read().is_connected());
        link.disconnect();
        advance(5_000).await;
        assert!(state.read().latency_ms.is_none());
        assert!(state.read().packet_error_rate.is_none());
    }

    #[tokio::test]
    async fn test_ping_when_disconnected_is_noop() {
        let (link, state) = link();
        assert!(link.ping().is_none());
        assert!(state.read().latency_ms.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_connect_ignored() {
        let (link, state) = link();
        link.connect();
        link.connect();
        advance(900).await;
        assert_eq!(state.read().status, LinkStatus::Connected);
    }
}
