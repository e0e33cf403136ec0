//! Link backends: the peripheral session and its transports, the simulated
//! link and the cable stub.

pub mod accounting;
pub mod codec;
pub mod latency;
pub mod loopback;
pub mod session;
pub mod simulated;
pub mod stub;
pub mod transport;

#[cfg(feature = "ble")]
pub mod btle;

pub use loopback::LoopbackTransport;
pub use session::{CommandOutcome, ConnectOutcome, LinkError, PeripheralLinkSession, SessionEvent};
pub use simulated::SimulatedLink;
pub use stub::StubLink;
pub use transport::{DeviceFilter, LinkEvent, PeripheralTransport, TransportError, UnavailableTransport};

#[cfg(feature = "ble")]
pub use btle::BtleTransport;
