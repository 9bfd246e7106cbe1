//! Classification of partial envelopes
//!
//! A partial value only qualifies once it is an array with at least two
//! elements. Element 0 is read as [`Meta`]; element 1 is read as a payload
//! and is reported only when it carries both a recognized `type` and a
//! non-null `response`. Anything less classifies as incomplete.

use crate::models::{Meta, ResponseKind};
use serde::Deserialize;
use serde_json::Value;

/// What a partial envelope can tell so far
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    /// Element 0, once the envelope has both elements
    pub meta: Option<Meta>,
    /// Element 1, once it has both `type` and `response`
    pub payload: Option<Payload>,
}

impl Classification {
    /// Whether there is nothing to reconcile yet
    pub fn is_incomplete(&self) -> bool {
        self.payload.is_none()
    }

    /// Kind of the classified payload
    pub fn kind(&self) -> Option<ResponseKind> {
        self.payload.as_ref().map(|p| p.kind)
    }
}

/// A payload with a known kind and a present response
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    /// Value of the `type` discriminator
    pub kind: ResponseKind,
    /// Value of the `response` field, possibly partial
    pub response: Value,
    /// The whole payload element as received
    pub raw: Value,
}

#[derive(Deserialize)]
struct RawPayload {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    response: Option<Value>,
}

/// Classify a partial envelope.
///
/// Never fails: missing or ill-typed fields just leave the corresponding
/// part of the classification empty.
pub fn classify(value: Option<&Value>) -> Classification {
    let Some(items) = value.and_then(Value::as_array).filter(|items| items.len() >= 2) else {
        return Classification::default();
    };

    let meta = Meta::deserialize(&items[0]).ok();
    let payload = decode_payload(&items[1]);

    Classification { meta, payload }
}

fn decode_payload(value: &Value) -> Option<Payload> {
    let raw = RawPayload::deserialize(value).ok()?;
    let kind = ResponseKind::from_wire(raw.kind.as_deref()?)?;
    let response = raw.response?;

    Some(Payload {
        kind,
        response,
        raw: value.clone(),
    })
}
