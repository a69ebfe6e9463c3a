use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

use super::{GatewayError, GatewayEvent};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `t=<unix ts>,v1=<hex hmac>[,v1=...]`
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

struct ParsedHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

fn parse_header(header: &str) -> Result<ParsedHeader<'_>, GatewayError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let mut it = part.trim().splitn(2, '=');
        match (it.next(), it.next()) {
            (Some("t"), Some(value)) => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    GatewayError::InvalidSignature("timestamp is not an integer".into())
                })?);
            }
            (Some("v1"), Some(value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| GatewayError::InvalidSignature("missing timestamp".into()))?;
    if signatures.is_empty() {
        return Err(GatewayError::InvalidSignature("missing v1 signature".into()));
    }

    Ok(ParsedHeader {
        timestamp,
        signatures,
    })
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Hex signature the processor would send for `payload` at `timestamp`
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    match mac_for(secret, timestamp, payload) {
        Ok(mac) => hex::encode(mac.finalize().into_bytes()),
        Err(_) => String::new(),
    }
}

/// Checks the signature header against the raw payload
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance: Duration,
    now: i64,
) -> Result<(), GatewayError> {
    if secret.is_empty() {
        return Err(GatewayError::InvalidSignature(
            "webhook signing secret not configured".into(),
        ));
    }

    let parsed = parse_header(header)?;

    if now.abs_diff(parsed.timestamp) > tolerance.as_secs() {
        return Err(GatewayError::InvalidSignature(
            "timestamp outside the tolerance zone".into(),
        ));
    }

    let matched = parsed.signatures.iter().any(|candidate| {
        let Ok(expected) = hex::decode(candidate) else {
            return false;
        };
        match mac_for(secret, parsed.timestamp, payload) {
            Ok(mac) => mac.verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    });

    if matched {
        Ok(())
    } else {
        Err(GatewayError::InvalidSignature(
            "no signature matches the payload".into(),
        ))
    }
}

/// Verifies and parses a signed gateway event
pub fn construct_event(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance: Duration,
) -> Result<GatewayEvent, GatewayError> {
    verify_signature(
        payload,
        header,
        secret,
        tolerance,
        chrono::Utc::now().timestamp(),
    )?;
    GatewayEvent::from_json(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SECRET: &str = "whsec_test_secret";
    const PAYLOAD: &[u8] = br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#;

    fn header_for(ts: i64, payload: &[u8]) -> String {
        format!("t={},v1={}", ts, compute_signature(SECRET, ts, payload))
    }

    #[test]
    fn accepts_valid_signature() {
        let now = 1_700_000_000;
        let header = header_for(now, PAYLOAD);
        assert!(verify_signature(PAYLOAD, &header, SECRET, Duration::from_secs(300), now).is_ok());
    }

    #[test]
    fn accepts_any_matching_v1_entry() {
        let now = 1_700_000_000;
        let good = compute_signature(SECRET, now, PAYLOAD);
        let header = format!("t={now},v1=deadbeef,v0=abc,v1={good}");
        assert!(verify_signature(PAYLOAD, &header, SECRET, Duration::from_secs(300), now).is_ok());
    }

    #[test]
    fn rejects_tampered_payload() {
        let now = 1_700_000_000;
        let header = header_for(now, PAYLOAD);
        let tampered = br#"{"id":"evt_1","type":"payment_intent.canceled","data":{"object":{"id":"pi_1"}}}"#;
        assert_matches!(
            verify_signature(tampered, &header, SECRET, Duration::from_secs(300), now),
            Err(GatewayError::InvalidSignature(_))
        );
    }

    #[test]
    fn rejects_stale_timestamp() {
        let signed_at = 1_700_000_000;
        let header = header_for(signed_at, PAYLOAD);
        assert_matches!(
            verify_signature(
                PAYLOAD,
                &header,
                SECRET,
                Duration::from_secs(300),
                signed_at + 301
            ),
            Err(GatewayError::InvalidSignature(_))
        );
    }

    #[test]
    fn rejects_extreme_timestamps() {
        let tolerance = Duration::from_secs(300);
        for ts in [i64::MIN, i64::MAX] {
            let header = format!("t={ts},v1=00");
            assert_matches!(
                verify_signature(b"{}", &header, SECRET, tolerance, 1_700_000_000),
                Err(GatewayError::InvalidSignature(_)),
                "timestamp {ts} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_malformed_headers() {
        let tolerance = Duration::from_secs(300);
        for header in ["", "v1=abc", "t=abc,v1=abc", "t=1700000000"] {
            assert_matches!(
                verify_signature(PAYLOAD, header, SECRET, tolerance, 1_700_000_000),
                Err(GatewayError::InvalidSignature(_)),
                "header {header:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_when_secret_missing() {
        let now = 1_700_000_000;
        let header = header_for(now, PAYLOAD);
        assert_matches!(
            verify_signature(PAYLOAD, &header, "", Duration::from_secs(300), now),
            Err(GatewayError::InvalidSignature(_))
        );
    }

    #[test]
    fn construct_event_parses_after_verification() {
        let now = chrono::Utc::now().timestamp();
        let header = header_for(now, PAYLOAD);
        let event = construct_event(PAYLOAD, &header, SECRET, Duration::from_secs(300)).unwrap();
        assert_eq!(event.id, "evt_1");
        assert_eq!(event.charge.id, "pi_1");
    }
}
