//! Sample provider abstraction for the acquisition driver.
//!
//! The driver asks one provider per frame for new samples: the synthetic
//! oscillator when no peripheral is streaming, the peripheral feed when one
//! is. Both push into the same output vector so the driver does not care
//! where samples came from.

use rand::Rng;
use tokio::sync::mpsc;
use tracing::trace;

use super::synthetic::SyntheticSampleSource;
use crate::types::SignalParams;

/// Trait abstracting where frame samples come from.
pub trait SampleProvider: Send {
    /// Append this frame's samples to `out`.
    fn pull(&mut self, delta_secs: f64, params: &SignalParams, out: &mut Vec<f64>);

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;
}

impl<R: Rng + Send> SampleProvider for SyntheticSampleSource<R> {
    fn pull(&mut self, delta_secs: f64, params: &SignalParams, out: &mut Vec<f64>) {
        out.push(self.next_sample(delta_secs, params).sample);
    }

    fn source_name(&self) -> &str {
        "synthetic"
    }
}

/// Receiving end of the peripheral's inbound telemetry channel.
///
/// Samples are pushed by the link session as notifications arrive; the
/// feed drains whatever has queued since the previous frame.
#[derive(Debug)]
pub struct PeripheralFeed {
    rx: mpsc::Receiver<f64>,
}

impl PeripheralFeed {
    pub fn new(rx: mpsc::Receiver<f64>) -> Self {
        Self { rx }
    }

    /// Drop everything queued. Returns how many samples were discarded.
    pub fn discard(&mut self) -> usize {
        let mut n = 0;
        while self.rx.try_recv().is_ok() {
            n += 1;
        }
        if n > 0 {
            trace!(discarded = n, "Discarded queued peripheral samples");
        }
        n
    }
}

impl SampleProvider for PeripheralFeed {
    fn pull(&mut self, _delta_secs: f64, _params: &SignalParams, out: &mut Vec<f64>) {
        while let Ok(sample) = self.rx.try_recv() {
            out.push(sample);
        }
    }

    fn source_name(&self) -> &str {
        "peripheral"
    }
}
