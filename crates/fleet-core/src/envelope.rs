//! Signed command envelopes.
//!
//! Commands are authenticated with HMAC-SHA256 over a canonical JSON
//! rendering of the payload, keyed by a shared secret. Payloads are
//! authenticated, not encrypted.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Wire envelope around a command payload: `{"sig": "...", "payload": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub sig: String,
    pub payload: Value,
}

impl CommandEnvelope {
    /// Sign `payload` with `secret` and wrap it for publication.
    pub fn seal(payload: Value, secret: &str) -> Self {
        let sig = sign(&payload, secret);
        Self { sig, payload }
    }

    /// Check the envelope signature against `secret`.
    pub fn verify(&self, secret: &str) -> bool {
        verify(&self.payload, &self.sig, secret)
    }
}

/// Command carried inside a verified envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandPayload {
    pub cmd: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// Why an inbound frame was dropped. Logged locally only; nothing is ever
/// published back, so a sender cannot probe which check failed.
#[derive(Debug, thiserror::Error)]
pub enum Reject {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("signature mismatch")]
    BadSignature,
}

/// Decode and authenticate a raw command frame.
pub fn open(frame: &[u8], secret: &str) -> Result<CommandPayload, Reject> {
    let envelope: CommandEnvelope = serde_json::from_slice(frame)?;
    if !envelope.verify(secret) {
        return Err(Reject::BadSignature);
    }
    Ok(serde_json::from_value(envelope.payload)?)
}

/// Lowercase-hex HMAC-SHA256 of the canonical form of `payload`.
pub fn sign(payload: &Value, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(&canonical_bytes(payload));
    hex::encode(mac.finalize().into_bytes())
}

/// Recompute the MAC and compare in constant time. Signatures that are not
/// valid hex can never match.
pub fn verify(payload: &Value, signature: &str, secret: &str) -> bool {
    let Ok(raw) = hex::decode(signature) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(&canonical_bytes(payload));
    mac.verify_slice(&raw).is_ok()
}

/// Canonical byte form of a payload: every object's keys sorted
/// lexicographically, compact separators, no insignificant whitespace.
/// Signatures depend only on this form, never on key insertion order.
pub fn canonical_bytes(payload: &Value) -> Vec<u8> {
    sorted(payload).to_string().into_bytes()
}

/// Rebuild `value` inserting object keys in sorted order at every level.
/// Rendering the rebuilt value then yields sorted keys whether the backing
/// map type keeps insertion order or sorts on its own.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by_key(|(key, _)| key.as_str());
            let mut out = Map::new();
            for (key, val) in entries {
                out.insert(key.clone(), sorted(val));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        scalar => scalar.clone(),
    }
}
