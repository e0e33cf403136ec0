//! Telemetry decoding and command encoding for the peripheral wire format.
//!
//! Inbound notifications are JSON objects when the payload text starts with
//! `{`. Anything else is treated as a raw little-endian sample: `f32` when at
//! least four bytes carry a finite value, else `i16` when at least two bytes
//! are present. Shorter payloads are undecodable and dropped.

use serde_json::{Map, Value};

use crate::types::{PeripheralCommand, TelemetryPacket};

/// Decode one notification. `None` means undecodable: drop it silently.
pub fn decode_telemetry(bytes: &[u8]) -> Option<TelemetryPacket> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(map)) => Some(packet_from_object(&map)),
            _ => None,
        };
    }

    if let Some(raw) = bytes.get(..4) {
        let value = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        if value.is_finite() {
            return Some(TelemetryPacket::scalar(f64::from(value)));
        }
    }

    if let Some(raw) = bytes.get(..2) {
        let value = i16::from_le_bytes([raw[0], raw[1]]);
        return Some(TelemetryPacket::scalar(f64::from(value)));
    }

    None
}

fn finite(map: &Map<String, Value>, key: &str) -> Option<f64> {
    map.get(key).and_then(Value::as_f64).filter(|v| v.is_finite())
}

fn sequence_number(map: &Map<String, Value>) -> Option<i64> {
    let pick = |key: &str| {
        let value = map.get(key)?;
        value.as_i64().or_else(|| {
            value
                .as_f64()
                .filter(|v| v.is_finite() && v.fract() == 0.0)
                .map(|v| v as i64)
        })
    };
    pick("seq").or_else(|| pick("sequence"))
}

/// Field-by-field extraction so a malformed field never rejects the packet.
fn packet_from_object(map: &Map<String, Value>) -> TelemetryPacket {
    let samples = map
        .get("samples")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_f64)
                .filter(|v| v.is_finite())
                .collect()
        })
        .unwrap_or_default();

    TelemetryPacket {
        sample: finite(map, "sample"),
        samples,
        seq: sequence_number(map),
        kind: map.get("type").and_then(Value::as_str).map(str::to_owned),
        pong: map.get("pong").and_then(Value::as_bool),
        ts: finite(map, "ts"),
        latency: finite(map, "latency"),
        per: finite(map, "per"),
    }
}

/// UTF-8 JSON bytes of a command envelope.
pub fn encode_command(command: &PeripheralCommand) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Sequence, SequenceStep, SignalParams};

    #[test]
    fn test_json_object_with_samples_and_seq() {
        let p = decode_telemetry(br#"{"samples":[1.5,-2,"x",null],"seq":7}"#).unwrap();
        assert_eq!(p.samples, vec![1.5, -2.0]);
        assert_eq!(p.seq, Some(7));
        assert!(p.sample.is_none());
        assert!(!p.is_pong());
    }

    #[test]
    fn test_sequence_alias_and_pong_forms() {
        let p = decode_telemetry(br#" {"type":"pong","sequence":3,"ts":1000} "#).unwrap();
        assert_eq!(p.seq, Some(3));
        assert!(p.is_pong());
        assert_eq!(p.ts, Some(1000.0));

        let p = decode_telemetry(br#"{"pong":true}"#).unwrap();
        assert!(p.is_pong());
        let p = decode_telemetry(br#"{"pong":false,"type":"data"}"#).unwrap();
        assert!(!p.is_pong());
    }

    #[test]
    fn test_device_reported_metrics() {
        let p = decode_telemetry(br#"{"sample":4.25,"latency":42,"per":1.5}"#).unwrap();
        assert_eq!(p.sample, Some(4.25));
        assert_eq!(p.latency, Some(42.0));
        assert_eq!(p.per, Some(1.5));
    }

    #[test]
    fn test_invalid_json_is_dropped() {
        assert!(decode_telemetry(b"{not json").is_none());
    }

    #[test]
    fn test_float32_fallback() {
        let bytes = 12.5_f32.to_le_bytes();
        assert_eq!(decode_telemetry(&bytes).unwrap().sample, Some(12.5));
    }

    #[test]
    fn test_non_finite_float_falls_back_to_int16() {
        let mut bytes = f32::NAN.to_le_bytes().to_vec();
        let expected = f64::from(i16::from_le_bytes([bytes[0], bytes[1]]));
        let p = decode_telemetry(&bytes).unwrap();
        assert_eq!(p.sample, Some(expected));

        bytes.truncate(2);
        bytes.copy_from_slice(&(-300_i16).to_le_bytes());
        assert_eq!(decode_telemetry(&bytes).unwrap().sample, Some(-300.0));
    }

    #[test]
    fn test_short_payload_undecodable() {
        assert!(decode_telemetry(&[0x01]).is_none());
        assert!(decode_telemetry(&[]).is_none());
    }

    #[test]
    fn test_command_envelopes() {
        let ping = encode_command(&PeripheralCommand::Ping { ts: 1_700, seq: 2 }).unwrap();
        let v: Value = serde_json::from_slice(&ping).unwrap();
        assert_eq!(v["type"], "ping");
        assert_eq!(v["ts"], 1_700);
        assert_eq!(v["seq"], 2);

        let stop: Value = serde_json::from_slice(&encode_command(&PeripheralCommand::Stop).unwrap()).unwrap();
        assert_eq!(stop, serde_json::json!({"type": "stop"}));

        let params = encode_command(&PeripheralCommand::Params { params: SignalParams::default() }).unwrap();
        let v: Value = serde_json::from_slice(&params).unwrap();
        assert_eq!(v["type"], "params");
        assert_eq!(v["params"]["freq"], 5.0);

        let seq = Sequence {
            id: "seq-1".into(),
            name: "Ramp".into(),
            steps: vec![SequenceStep { duration: 10.0, freq: 5.0, amp: 40.0, noise: 10.0 }],
        };
        let v: Value =
            serde_json::from_slice(&encode_command(&PeripheralCommand::SequenceSave { sequence: seq }).unwrap()).unwrap();
        assert_eq!(v["type"], "sequence-save");
        assert_eq!(v["sequence"]["steps"][0]["duration"], 10.0);

        let v: Value = serde_json::from_slice(
            &encode_command(&PeripheralCommand::SequencePlay { id: "seq-1".into() }).unwrap(),
        )
        .unwrap();
        assert_eq!(v, serde_json::json!({"type": "sequence-play", "id": "seq-1"}));
    }
}
