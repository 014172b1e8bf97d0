//! Codec for metadata blobs stored in a single string column.
//!
//! Transaction and alert rows carry auxiliary diagnostic metadata persisted
//! as one JSON-encoded string (or NULL). Both directions are total: a
//! malformed blob must never break the primary read/write path, so failures
//! are logged and resolved to `None` instead of surfacing to the caller.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// A single metadata field value.
///
/// Untagged so the wire form is plain JSON scalars / string arrays. Variant
/// order matters for deserialization: more specific shapes first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    StringList(Vec<String>),
}

/// A metadata record: string keys to loosely-typed values, insertion order
/// preserved so encode/decode round-trips compare equal field-for-field.
pub type MetadataRecord = IndexMap<String, MetadataValue>;

/// Origin channel for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Online,
    Mobile,
    Atm,
    Branch,
}

/// Typed view over transaction metadata. Unknown keys are kept in `extra`
/// rather than dropped.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(flatten)]
    pub extra: MetadataRecord,
}

/// Typed view over alert metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_factors: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: MetadataRecord,
}

/// Serialize a metadata record to its storage form.
///
/// `None` stays `None`. Serialization failure is absorbed: logged as a
/// warning, resolved to `None`.
pub fn encode(record: Option<&MetadataRecord>) -> Option<String> {
    let record = record?;
    match serde_json::to_string(record) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!(error = %e, "failed to encode metadata, dropping");
            None
        }
    }
}

/// Parse a metadata record from its storage form.
///
/// `None` or empty input yields `None`; malformed JSON is logged and
/// resolved to `None`, never an error.
pub fn decode(raw: Option<&str>) -> Option<MetadataRecord> {
    let raw = raw.filter(|s| !s.is_empty())?;
    match serde_json::from_str(raw) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(error = %e, "failed to decode metadata, treating as absent");
            None
        }
    }
}

/// Decode a metadata record from a loosely-typed JSON value.
///
/// Double-decode protection: a value that is already a structured object
/// converts directly; a string goes through the normal parse; anything
/// else (including null) is treated as absent.
pub fn decode_value(value: &Value) -> Option<MetadataRecord> {
    match value {
        Value::Object(_) => match serde_json::from_value(value.clone()) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "metadata object has unsupported field types");
                None
            }
        },
        Value::String(s) => decode(Some(s)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> MetadataRecord {
        let mut m = MetadataRecord::new();
        m.insert("channel".into(), MetadataValue::String("atm".into()));
        m.insert("amount".into(), MetadataValue::Number(250.into()));
        m.insert("flagged".into(), MetadataValue::Bool(true));
        m.insert("reviewedBy".into(), MetadataValue::Null);
        m.insert(
            "riskFactors".into(),
            MetadataValue::StringList(vec!["velocity".into(), "geo".into()]),
        );
        m
    }

    #[test]
    fn round_trips_well_formed_records() {
        let record = sample();
        let encoded = encode(Some(&record)).expect("should encode");
        let decoded = decode(Some(&encoded)).expect("should decode");
        assert_eq!(decoded, record);
    }

    #[test]
    fn none_passes_through_both_directions() {
        assert_eq!(encode(None), None);
        assert_eq!(decode(None), None);
        assert_eq!(decode(encode(None).as_deref()), None);
    }

    #[test]
    fn empty_string_decodes_to_none() {
        assert_eq!(decode(Some("")), None);
    }

    #[test]
    fn malformed_input_decodes_to_none() {
        assert_eq!(decode(Some("not json{")), None);
        assert_eq!(decode(Some("[1, 2, 3]")), None); // array, not a record
    }

    #[test]
    fn decode_value_accepts_structured_objects() {
        let decoded = decode_value(&json!({"location": "Lagos", "score": 7}))
            .expect("object should decode directly");
        assert_eq!(
            decoded.get("location"),
            Some(&MetadataValue::String("Lagos".into()))
        );
    }

    #[test]
    fn decode_value_parses_strings_and_ignores_the_rest() {
        let decoded = decode_value(&json!("{\"a\":1}")).expect("string should parse");
        assert_eq!(decoded.get("a"), Some(&MetadataValue::Number(1.into())));
        assert_eq!(decode_value(&json!(null)), None);
        assert_eq!(decode_value(&json!(42)), None);
    }

    #[test]
    fn typed_transaction_metadata_round_trips() {
        let meta = TransactionMetadata {
            channel: Some(Channel::Mobile),
            location: Some("Abuja".into()),
            device_id: Some("dev-91".into()),
            ..Default::default()
        };
        let raw = serde_json::to_string(&meta).unwrap();
        let back: TransactionMetadata = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn typed_alert_metadata_keeps_unknown_keys() {
        let raw = r#"{"amount": 120.5, "riskFactors": ["velocity"], "custom": "x"}"#;
        let meta: AlertMetadata = serde_json::from_str(raw).unwrap();
        assert_eq!(meta.amount, Some(120.5));
        assert_eq!(
            meta.extra.get("custom"),
            Some(&MetadataValue::String("x".into()))
        );
    }
}
