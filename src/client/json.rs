//! JSON decoding helpers for API responses.

use anyhow::Result;

/// Deserialize a JSON value, annotating failures with the serde path.
///
/// A bare serde error for a deep analytics payload reads like
/// "invalid type: null, expected u64 at line 1 column 843"; routing the
/// deserializer through `serde_path_to_error` turns that into
/// "at 'recentTransactions[3].riskScore': ...", which is what actually
/// gets someone to the offending field.
pub fn from_value_with_path<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
) -> Result<T> {
    match serde_path_to_error::deserialize(value) {
        Ok(parsed) => Ok(parsed),
        Err(err) => {
            let path = err.path().to_string();
            let inner = err.into_inner();
            if path.is_empty() || path == "." {
                Err(anyhow::anyhow!("{inner}"))
            } else {
                Err(anyhow::anyhow!("at '{path}': {inner}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Outer {
        #[allow(dead_code)]
        items: Vec<Inner>,
    }

    #[derive(Debug, Deserialize)]
    struct Inner {
        #[allow(dead_code)]
        score: f64,
    }

    #[test]
    fn failure_carries_the_field_path() {
        let value = json!({ "items": [{ "score": 0.4 }, { "score": null }] });
        let err = from_value_with_path::<Outer>(value).unwrap_err().to_string();
        assert!(err.contains("items[1].score"), "got: {err}");
    }

    #[test]
    fn success_passes_through() {
        let value = json!({ "items": [{ "score": 1.0 }] });
        let parsed: Outer = from_value_with_path(value).unwrap();
        assert_eq!(parsed.items.len(), 1);
    }
}
