//! Local parameter-sequence playback and device-side sequence commands.
//!
//! Playback advances on a 200 ms tick: each step holds its parameters for
//! `duration` seconds, then the next step is applied. Playback stops after
//! the last step.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::params::ParamsControl;
use crate::config::defaults::SEQUENCE_TICK_MS;
use crate::link::{CommandOutcome, LinkError, PeripheralLinkSession, SessionEvent};
use crate::shared::Shared;
use crate::types::{ConnectionMode, PeripheralCommand, Sequence};

pub const SYNC_REFUSED_NOTICE: &str = "Connect to a peripheral before syncing sequences.";
pub const PLAY_REFUSED_NOTICE: &str = "Connect to a peripheral before playing sequences.";
pub const STOP_REFUSED_NOTICE: &str = "Connect to a peripheral before stopping sequences.";

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlaybackState {
    pub sequence_id: Option<String>,
    pub step_index: usize,
    /// Seconds spent in the current step.
    pub elapsed: f64,
    pub playing: bool,
}

struct PlayerInner {
    params: ParamsControl,
    session: PeripheralLinkSession,
    state: Shared<PlaybackState>,
    sequence: Mutex<Option<Sequence>>,
    ticker: Mutex<Option<CancellationToken>>,
    synced: Shared<HashMap<String, DateTime<Utc>>>,
}

#[derive(Clone)]
pub struct SequencePlayer {
    inner: Arc<PlayerInner>,
}

impl SequencePlayer {
    pub fn new(params: ParamsControl, session: PeripheralLinkSession) -> Self {
        Self {
            inner: Arc::new(PlayerInner {
                params,
                session,
                state: Shared::new("playback", PlaybackState::default()),
                sequence: Mutex::new(None),
                ticker: Mutex::new(None),
                synced: Shared::new("sequence_sync", HashMap::new()),
            }),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.state.snapshot()
    }

    pub fn synced_at(&self, sequence_id: &str) -> Option<DateTime<Utc>> {
        self.inner.synced.read().get(sequence_id).copied()
    }

    /// Start from the first step, or resume when `sequence` is the paused
    /// one. Returns false for an empty sequence.
    pub fn play(&self, sequence: Sequence) -> bool {
        if sequence.steps.is_empty() {
            return false;
        }
        {
            let mut st = self.inner.state.write();
            if st.sequence_id.as_deref() == Some(sequence.id.as_str()) && !st.playing {
                st.playing = true;
                debug!(id = %sequence.id, "Sequence resumed");
                return true;
            }
        }

        self.stop();
        let first = sequence.steps[0].params();
        info!(id = %sequence.id, name = %sequence.name, steps = sequence.steps.len(), "▶️ Sequence playback started");
        *self.inner.state.write() = PlaybackState {
            sequence_id: Some(sequence.id.clone()),
            step_index: 0,
            elapsed: 0.0,
            playing: true,
        };
        *lock(&self.inner.sequence) = Some(sequence);
        self.inner.params.replace(first);
        self.spawn_ticker();
        true
    }

    fn spawn_ticker(&self) {
        let token = CancellationToken::new();
        if let Some(old) = lock(&self.inner.ticker).replace(token.clone()) {
            old.cancel();
        }
        let player = self.clone();
        let period = Duration::from_millis(SEQUENCE_TICK_MS);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => player.advance(period.as_secs_f64()),
                }
            }
        });
    }

    /// Move playback forward by `dt` seconds.
    pub fn advance(&self, dt: f64) {
        let next = {
            let sequence = lock(&self.inner.sequence);
            let Some(sequence) = sequence.as_ref() else {
                return;
            };
            let mut st = self.inner.state.write();
            if !st.playing {
                return;
            }
            let Some(step) = sequence.steps.get(st.step_index) else {
                return;
            };
            st.elapsed += dt;
            // Tolerate float drift from repeated 0.2 s increments
            if st.elapsed + 1e-9 < step.duration {
                return;
            }
            st.step_index += 1;
            st.elapsed = 0.0;
            sequence.steps.get(st.step_index).map(|s| s.params())
        };
        match next {
            Some(params) => self.inner.params.replace(params),
            None => {
                info!("⏹️ Sequence playback finished");
                self.stop();
            }
        }
    }

    pub fn pause(&self) {
        if lock(&self.inner.ticker).is_none() {
            return;
        }
        self.inner.state.write().playing = false;
    }

    pub fn stop(&self) {
        if let Some(token) = lock(&self.inner.ticker).take() {
            token.cancel();
        }
        *lock(&self.inner.sequence) = None;
        *self.inner.state.write() = PlaybackState::default();
    }

    // ========================================================================
    // Device commands
    // ========================================================================

    fn require_peripheral(&self, notice: &str) -> Result<(), LinkError> {
        let st = self.inner.session.state();
        if st.mode == ConnectionMode::Peripheral && st.is_connected() {
            return Ok(());
        }
        info!("[SequencePlayer] {}", notice);
        let _ = self
            .inner
            .session
            .event_sender()
            .send(SessionEvent::Notice { message: notice.to_string() });
        Err(LinkError::NotConnected)
    }

    /// Store `sequence` on the device and remember when it was accepted.
    pub async fn sync_to_device(&self, sequence: &Sequence) -> Result<CommandOutcome, LinkError> {
        self.require_peripheral(SYNC_REFUSED_NOTICE)?;
        let outcome = self
            .inner
            .session
            .send_command(PeripheralCommand::SequenceSave { sequence: sequence.clone() })
            .await;
        if outcome == CommandOutcome::Sent {
            self.inner.synced.write().insert(sequence.id.clone(), Utc::now());
        }
        Ok(outcome)
    }

    pub async fn play_on_device(&self, sequence_id: &str) -> Result<CommandOutcome, LinkError> {
        self.require_peripheral(PLAY_REFUSED_NOTICE)?;
        Ok(self
            .inner
            .session
            .send_command(PeripheralCommand::SequencePlay { id: sequence_id.to_string() })
            .await)
    }

    pub async fn stop_on_device(&self) -> Result<CommandOutcome, LinkError> {
        self.require_peripheral(STOP_REFUSED_NOTICE)?;
        Ok(self.inner.session.send_command(PeripheralCommand::SequenceStop).await)
    }
}
