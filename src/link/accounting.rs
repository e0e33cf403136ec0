//! Sequence-number packet-loss accounting.
//!
//! A sequence at or below the last one seen is treated as a stream restart.
//! This cannot tell a rebooted device counter from a large loss followed by
//! an old retransmit; it is a known approximation.

use crate::types::PacketStats;

/// Fold one sequence number into `stats` and return the new packet error
/// rate in percent, rounded to two decimals.
pub fn update_from_sequence(stats: &mut PacketStats, seq: i64) -> f64 {
    if let Some(last) = stats.last_seq {
        if seq <= last {
            *stats = PacketStats {
                last_seq: Some(seq),
                received: 1,
                dropped: 0,
            };
            return 0.0;
        }
        // Device-supplied values; widen so extreme gaps cannot overflow
        let gap = i128::from(seq) - i128::from(last) - 1;
        if gap > 0 {
            let gap = u64::try_from(gap).unwrap_or(u64::MAX);
            stats.dropped = stats.dropped.saturating_add(gap);
        }
    }

    stats.received = stats.received.saturating_add(1);
    stats.last_seq = Some(seq);
    packet_error_rate(stats)
}

/// `dropped / (received + dropped) * 100`, two decimals.
pub fn packet_error_rate(stats: &PacketStats) -> f64 {
    let total = stats.received.saturating_add(stats.dropped);
    if total == 0 {
        return 0.0;
    }
    let per = stats.dropped as f64 / total as f64 * 100.0;
    (per * 100.0).round() / 100.0
}
