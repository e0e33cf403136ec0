//! Signal parameter edits and their outbound commands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::link::{CommandOutcome, PeripheralLinkSession};
use crate::shared::Shared;
use crate::types::{ParamKey, PeripheralCommand, SignalParams};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SentParams {
    pub params: SignalParams,
    pub at: DateTime<Utc>,
}

/// Partial update; absent fields are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct ParamsUpdate {
    #[serde(alias = "freq")]
    pub frequency: Option<f64>,
    #[serde(alias = "amp")]
    pub amplitude: Option<f64>,
    pub noise: Option<f64>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParamsView {
    pub current: SignalParams,
    pub last_sent: Option<SentParams>,
    /// Current values differ from the last ones sent.
    pub dirty: bool,
}

#[derive(Clone)]
pub struct ParamsControl {
    params: Shared<SignalParams>,
    last_sent: Shared<Option<SentParams>>,
    session: PeripheralLinkSession,
}

impl ParamsControl {
    pub fn new(params: Shared<SignalParams>, session: PeripheralLinkSession) -> Self {
        Self {
            params,
            last_sent: Shared::new("last_sent", None),
            session,
        }
    }

    pub fn current(&self) -> SignalParams {
        *self.params.read()
    }

    /// Set one value, clamped to its range.
    pub fn set(&self, key: ParamKey, value: f64) -> SignalParams {
        self.params.update(|p| {
            p.set(key, value);
            *p
        })
    }

    pub fn apply(&self, update: ParamsUpdate) -> SignalParams {
        self.params.update(|p| {
            if let Some(v) = update.frequency {
                p.set(ParamKey::Frequency, v);
            }
            if let Some(v) = update.amplitude {
                p.set(ParamKey::Amplitude, v);
            }
            if let Some(v) = update.noise {
                p.set(ParamKey::Noise, v);
            }
            if let Some(enabled) = update.enabled {
                p.enabled = enabled;
            }
            *p
        })
    }

    /// Replace every value at once (sequence steps).
    pub fn replace(&self, params: SignalParams) {
        *self.params.write() = params.clamped();
    }

    /// Record the current values as sent and push them to the device.
    /// The record is kept even when no peripheral is connected.
    pub async fn send(&self) -> CommandOutcome {
        let params = self.current();
        *self.last_sent.write() = Some(SentParams { params, at: Utc::now() });
        info!(freq = params.frequency, amp = params.amplitude, noise = params.noise, "📤 Parameters sent");
        self.session.send_command(PeripheralCommand::Params { params }).await
    }

    /// Silence the output locally and on the device.
    pub async fn stop(&self) -> CommandOutcome {
        self.params.update(|p| {
            p.enabled = false;
            p.amplitude = 0.0;
        });
        self.session.send_command(PeripheralCommand::Stop).await
    }

    pub fn view(&self) -> ParamsView {
        let current = self.current();
        let last_sent = *self.last_sent.read();
        ParamsView {
            current,
            last_sent,
            dirty: last_sent.map_or(true, |s| s.params != current),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LatencyConfig, PeripheralConfig};
    use crate::link::LoopbackTransport;
    use crate::types::{ConnectionMode, ConnectionState};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn control() -> (ParamsControl, PeripheralLinkSession, LoopbackTransport) {
        let peripheral = PeripheralConfig::default();
        let device = LoopbackTransport::new(&peripheral);
        let (tx, _rx) = mpsc::channel(8);
        let session = PeripheralLinkSession::new(
            Arc::new(device.clone()),
            Shared::new("connection", ConnectionState::new(ConnectionMode::Peripheral)),
            peripheral,
            LatencyConfig::default(),
            tx,
        );
        let control = ParamsControl::new(Shared::new("params", SignalParams::default()), session.clone());
        (control, session, device)
    }

    #[test]
    fn test_set_clamps_frequency() {
        let (c, _, _) = control();
        assert_eq!(c.set(ParamKey::Frequency, 20.0).frequency, 12.0);
        assert_eq!(c.set(ParamKey::Frequency, 5.4).frequency, 5.0);
        assert_eq!(c.set(ParamKey::Amplitude, -3.0).amplitude, 0.0);
    }

    #[test]
    fn test_partial_update_leaves_other_fields() {
        let (c, _, _) = control();
        let p = c.apply(ParamsUpdate { noise: Some(150.0), ..ParamsUpdate::default() });
        assert_eq!(p.noise, 100.0);
        assert_eq!(p.frequency, 5.0);
        assert!(p.enabled);
    }

    #[tokio::test]
    async fn test_send_records_last_sent_without_link() {
        let (c, _, _) = control();
        assert!(c.view().dirty);
        assert_eq!(c.send().await, CommandOutcome::Skipped);
        let view = c.view();
        assert!(!view.dirty);
        assert_eq!(view.last_sent.map(|s| s.params), Some(SignalParams::default()));

        c.set(ParamKey::Amplitude, 10.0);
        assert!(c.view().dirty);
    }

    #[tokio::test]
    async fn test_send_and_stop_reach_device() {
        let (c, session, device) = control();
        session.connect().await;
        c.set(ParamKey::Frequency, 7.0);
        assert_eq!(c.send().await, CommandOutcome::Sent);
        assert_eq!(device.device_params().frequency, 7.0);

        assert_eq!(c.stop().await, CommandOutcome::Sent);
        assert!(!c.current().enabled);
        assert_eq!(c.current().amplitude, 0.0);
        assert!(!device.device_params().enabled);
    }
}
