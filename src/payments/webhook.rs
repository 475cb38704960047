//! Stripe webhook signatures and the event payloads the platform reacts to.
//!
//! The `stripe-signature` header looks like `t=<unix seconds>,v1=<hex>[,v1=<hex>...]`. Each `v1`
//! value is an HMAC-SHA256 over `"<t>.<raw body>"` keyed by the endpoint secret.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use super::error::SignatureError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Checks `header` against `body`. `now` is unix seconds.
pub fn verify_signature(
    header: &str,
    body: &[u8],
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if candidates.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }
    if (now - timestamp).abs() > tolerance_secs {
        return Err(SignatureError::TimestampOutOfTolerance);
    }

    let matches = candidates.into_iter().any(|candidate| {
        let Ok(expected) = hex::decode(candidate) else {
            return false;
        };
        signed_payload_mac(secret, timestamp, body)
            .is_some_and(|mac| mac.verify_slice(&expected).is_ok())
    });

    if matches {
        Ok(())
    } else {
        Err(SignatureError::NoMatch)
    }
}

fn signed_payload_mac(secret: &str, timestamp: i64, body: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Some(mac)
}

/// Builds a header the way Stripe does. Integration tests sign their deliveries with it.
pub fn sign_payload(secret: &str, timestamp: i64, body: &[u8]) -> Option<String> {
    let mac = signed_payload_mac(secret, timestamp, body)?;
    Some(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct CompletedSession {
    pub id: String,
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CompletedSession {
    pub fn user_id(&self) -> Option<uuid::Uuid> {
        self.metadata.get("userId")?.parse().ok()
    }

    /// Course ids from the comma separated `courseIds` metadata entry.
    pub fn course_ids(&self) -> Vec<uuid::Uuid> {
        self.metadata
            .get("courseIds")
            .map(|ids| {
                ids.split(',')
                    .filter_map(|id| id.trim().parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ChargeObject {
    pub payment_intent: Option<String>,
}

/// The events the platform reacts to.
#[derive(Debug)]
pub enum WebhookEvent {
    CheckoutCompleted(CompletedSession),
    PaymentSucceeded(PaymentIntentObject),
    PaymentFailed(PaymentIntentObject),
    ChargeRefunded(ChargeObject),
    Other(String),
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> serde_json::Result<(String, Self)> {
        let event: StripeEvent = serde_json::from_slice(body)?;
        let object = event.data.object;
        let parsed = match event.kind.as_str() {
            "checkout.session.completed" => Self::CheckoutCompleted(serde_json::from_value(object)?),
            "payment_intent.succeeded" => Self::PaymentSucceeded(serde_json::from_value(object)?),
            "payment_intent.payment_failed" => Self::PaymentFailed(serde_json::from_value(object)?),
            "charge.refunded" => Self::ChargeRefunded(serde_json::from_value(object)?),
            _ => Self::Other(event.kind),
        };
        Ok((event.id, parsed))
    }
}
