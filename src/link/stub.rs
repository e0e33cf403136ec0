//! Wired transport placeholder for the `cable-stub` mode.

use tokio::sync::broadcast;
use tracing::info;

use super::session::SessionEvent;
use crate::shared::Shared;
use crate::types::ConnectionState;

pub const CONNECT_NOTICE: &str = "USB Cable mode is a stub. Connect logic is not implemented yet.";
pub const PING_NOTICE: &str = "USB Cable mode is a stub. Ping is not available.";

/// Never connects; every action leaves the state disconnected with a
/// clean metrics baseline.
#[derive(Clone)]
pub struct StubLink {
    state: Shared<ConnectionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl StubLink {
    pub fn new(state: Shared<ConnectionState>, events: broadcast::Sender<SessionEvent>) -> Self {
        Self { state, events }
    }

    fn notice(&self, message: &str) {
        info!("[StubLink] {}", message);
        let _ = self.events.send(SessionEvent::Notice { message: message.to_string() });
    }

    pub fn connect(&self) {
        self.notice(CONNECT_NOTICE);
        self.disconnect();
    }

    pub fn ping(&self) {
        self.notice(PING_NOTICE);
    }

    pub fn disconnect(&self) {
        self.state.write().force_disconnected();
    }
}
