//! Connection mode switching and dispatch across the link backends.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use crate::config::LatencyConfig;
use crate::link::{
    latency, ConnectOutcome, LinkError, PeripheralLinkSession, SessionEvent, SimulatedLink, StubLink,
};
use crate::shared::Shared;
use crate::types::{ConnectionMode, ConnectionState, LatencyWarning, LinkStatus};

/// Backend for the active mode.
#[derive(Clone)]
pub enum LinkBackend {
    Simulated(SimulatedLink),
    Peripheral(PeripheralLinkSession),
    Stub(StubLink),
}

/// Result of a connect/disconnect toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleOutcome {
    /// Simulated connect started; it completes in the background.
    Connecting,
    Connected { streaming: bool },
    Disconnected,
    /// A connect is already in flight.
    Ignored,
    Refused { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeView {
    pub active: bool,
    pub samples: Vec<f64>,
    pub average_ms: Option<f64>,
}

/// Serializable connection summary for the status chrome.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionView {
    pub mode: ConnectionMode,
    pub status: LinkStatus,
    pub latency_ms: Option<f64>,
    pub packet_error_rate: Option<f64>,
    pub warning: LatencyWarning,
    pub streaming: bool,
    pub device: Option<String>,
    pub transport: String,
    pub transport_available: bool,
    pub latency_test: ProbeView,
}

#[derive(Clone)]
pub struct ConnectionController {
    state: Shared<ConnectionState>,
    session: PeripheralLinkSession,
    simulated: SimulatedLink,
    stub: StubLink,
    latency: LatencyConfig,
}

impl ConnectionController {
    pub fn new(
        state: Shared<ConnectionState>,
        session: PeripheralLinkSession,
        simulated: SimulatedLink,
        stub: StubLink,
        latency: LatencyConfig,
    ) -> Self {
        Self { state, session, simulated, stub, latency }
    }

    pub fn mode(&self) -> ConnectionMode {
        self.state.read().mode
    }

    pub fn session(&self) -> &PeripheralLinkSession {
        &self.session
    }

    pub fn backend(&self) -> LinkBackend {
        match self.mode() {
            ConnectionMode::Simulated => LinkBackend::Simulated(self.simulated.clone()),
            ConnectionMode::Peripheral => LinkBackend::Peripheral(self.session.clone()),
            ConnectionMode::CableStub => LinkBackend::Stub(self.stub.clone()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.subscribe()
    }

    pub fn is_streaming(&self) -> bool {
        self.session.is_streaming()
    }

    /// Tear down the current backend and start clean in `mode`.
    pub async fn set_mode(&self, mode: ConnectionMode) {
        let previous = self.mode();
        self.session.stop_latency_test();
        match self.backend() {
            LinkBackend::Simulated(link) => link.disconnect(),
            LinkBackend::Peripheral(session) => session.disconnect().await,
            LinkBackend::Stub(stub) => stub.disconnect(),
        }
        self.state.update(|st| {
            st.mode = mode;
            st.force_disconnected();
        });
        if previous != mode {
            info!(from = %previous, to = %mode, "🔀 Connection mode changed");
        }
    }

    /// Connect when disconnected, disconnect when connected.
    pub async fn connect_toggle(&self) -> ToggleOutcome {
        let status = self.state.read().status;
        match status {
            LinkStatus::Connecting => ToggleOutcome::Ignored,
            LinkStatus::Connected => {
                self.disconnect().await;
                ToggleOutcome::Disconnected
            }
            LinkStatus::Disconnected => self.connect().await,
        }
    }

    async fn connect(&self) -> ToggleOutcome {
        match self.backend() {
            LinkBackend::Simulated(link) => {
                link.connect();
                ToggleOutcome::Connecting
            }
            LinkBackend::Peripheral(session) => match session.connect().await {
                ConnectOutcome::Connected { streaming } => ToggleOutcome::Connected { streaming },
                ConnectOutcome::AlreadyActive => ToggleOutcome::Ignored,
                ConnectOutcome::Unavailable => ToggleOutcome::Refused {
                    reason: LinkError::Unavailable.to_string(),
                },
                ConnectOutcome::WrongMode | ConnectOutcome::Superseded => ToggleOutcome::Disconnected,
                ConnectOutcome::Failed(reason) => ToggleOutcome::Refused { reason },
            },
            LinkBackend::Stub(stub) => {
                stub.connect();
                ToggleOutcome::Refused {
                    reason: crate::link::stub::CONNECT_NOTICE.to_string(),
                }
            }
        }
    }

    pub async fn disconnect(&self) {
        self.session.stop_latency_test();
        match self.backend() {
            LinkBackend::Simulated(link) => link.disconnect(),
            LinkBackend::Peripheral(session) => session.disconnect().await,
            LinkBackend::Stub(stub) => stub.disconnect(),
        }
    }

    /// One-shot ping in the active mode. Returns the latency when known.
    pub async fn ping(&self) -> Option<f64> {
        match self.backend() {
            LinkBackend::Simulated(link) => link.ping(),
            LinkBackend::Peripheral(session) => session.ping().await,
            LinkBackend::Stub(stub) => {
                stub.ping();
                None
            }
        }
    }

    pub fn start_latency_test(&self) -> Result<(), LinkError> {
        self.session.start_latency_test()
    }

    pub fn stop_latency_test(&self) {
        self.session.stop_latency_test();
    }

    /// Peripheral mode carries probe timeouts; other modes classify the
    /// reported latency directly.
    pub fn latency_warning(&self) -> LatencyWarning {
        if self.mode() == ConnectionMode::Peripheral {
            return self.session.current_warning();
        }
        let st = self.state.read();
        latency::classify(st.latency_ms, st.is_connected(), &self.latency)
    }

    pub fn view(&self) -> ConnectionView {
        let st = self.state.snapshot();
        ConnectionView {
            mode: st.mode,
            status: st.status,
            latency_ms: st.latency_ms,
            packet_error_rate: st.packet_error_rate,
            warning: self.latency_warning(),
            streaming: st.is_streaming(),
            device: st.handles.as_ref().map(|h| h.device.name.clone()),
            transport: self.session.transport_name().to_string(),
            transport_available: self.session.is_available(),
            latency_test: ProbeView {
                active: st.latency_probe.active,
                average_ms: st.latency_probe.average(),
                samples: st.latency_probe.samples.into_iter().collect(),
            },
        }
    }
}
