//! Stripe-specific types for webhook handling.
//!
//! These types represent Stripe API objects as they arrive in webhook
//! payloads and API responses. They parse the provider's JSON accurately
//! and are converted to port types before leaving this module.

use std::collections::HashMap;

use serde::Deserialize;

// ════════════════════════════════════════════════════════════════════════════════
// Signature Parsing
// ════════════════════════════════════════════════════════════════════════════════

/// Error parsing the Stripe-Signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureParseError {
    /// Header is empty or missing.
    MissingHeader,
    /// Missing timestamp component (t=...).
    MissingTimestamp,
    /// Missing v1 signature component.
    MissingV1Signature,
    /// Invalid timestamp format.
    InvalidTimestamp,
    /// Invalid signature format (not valid hex).
    InvalidSignatureFormat,
}

impl std::fmt::Display for SignatureParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingHeader => write!(f, "Missing Stripe-Signature header"),
            Self::MissingTimestamp => write!(f, "Missing timestamp (t=) in signature"),
            Self::MissingV1Signature => write!(f, "Missing v1 signature in header"),
            Self::InvalidTimestamp => write!(f, "Invalid timestamp format"),
            Self::InvalidSignatureFormat => write!(f, "Invalid signature format (not valid hex)"),
        }
    }
}

impl std::error::Error for SignatureParseError {}

/// Parsed Stripe-Signature header components.
///
/// The header format is: `t=timestamp,v1=signature[,v0=legacy_signature]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp when Stripe generated the signature.
    pub timestamp: i64,

    /// Primary v1 signature (HMAC-SHA256, hex-encoded in the header).
    pub v1_signature: Vec<u8>,

    /// Legacy v0 signature (deprecated, may be absent).
    pub v0_signature: Option<Vec<u8>>,
}

impl SignatureHeader {
    /// Parse a Stripe-Signature header into components.
    ///
    /// Unknown `key=value` pairs are ignored for forward compatibility.
    pub fn parse(header: &str) -> Result<Self, SignatureParseError> {
        if header.is_empty() {
            return Err(SignatureParseError::MissingHeader);
        }

        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<Vec<u8>> = None;
        let mut v0_signature: Option<Vec<u8>> = None;

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or(SignatureParseError::MissingTimestamp)?;

            match key.trim() {
                "t" => {
                    timestamp = Some(
                        value
                            .trim()
                            .parse()
                            .map_err(|_| SignatureParseError::InvalidTimestamp)?,
                    );
                }
                "v1" => {
                    v1_signature = Some(
                        hex::decode(value.trim())
                            .map_err(|_| SignatureParseError::InvalidSignatureFormat)?,
                    );
                }
                "v0" => {
                    v0_signature = Some(
                        hex::decode(value.trim())
                            .map_err(|_| SignatureParseError::InvalidSignatureFormat)?,
                    );
                }
                _ => {}
            }
        }

        Ok(Self {
            timestamp: timestamp.ok_or(SignatureParseError::MissingTimestamp)?,
            v1_signature: v1_signature.ok_or(SignatureParseError::MissingV1Signature)?,
            v0_signature,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Event Envelope
// ════════════════════════════════════════════════════════════════════════════════

/// Top-level Stripe webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeWebhookEvent {
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp the event was created.
    pub created: i64,

    pub data: StripeEventData,

    #[serde(default)]
    pub livemode: bool,
}

/// The `data` wrapper around the affected API object.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

// ════════════════════════════════════════════════════════════════════════════════
// API Objects
// ════════════════════════════════════════════════════════════════════════════════

/// Checkout session as delivered in `checkout.session.completed`.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,

    /// Customer id; present for subscription-mode sessions.
    pub customer: Option<String>,

    /// Subscription id created by the completed session.
    pub subscription: Option<String>,

    /// Hosted checkout URL (API responses only; absent in webhooks).
    #[serde(default)]
    pub url: Option<String>,

    /// Metadata set at session creation, echoed back verbatim.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Subscription object as delivered in `customer.subscription.*` events.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: String,
    pub status: String,

    /// End of the current billing period (Unix seconds).
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

/// Invoice object as delivered in `invoice.*` events.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    pub customer: String,

    #[serde(default)]
    pub subscription: Option<String>,
}

/// Customer object from the customers API.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeCustomer {
    pub id: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub created: i64,
}

/// Price object from the prices API.
#[derive(Debug, Clone, Deserialize)]
pub struct StripePrice {
    pub id: String,
}

/// Computes a Stripe-Signature header for a payload.
///
/// Mirrors Stripe's v1 scheme (`HMAC-SHA256(secret, "{t}.{payload}")`).
/// Used to build fixtures for tests and local webhook tooling.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(payload);
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}

/// Billing portal session from the billing_portal API.
#[derive(Debug, Clone, Deserialize)]
pub struct StripePortalSession {
    pub id: String,
    pub url: String,
}
