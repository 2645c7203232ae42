// src/deutils.rs
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Accepts a JSON number, a numeric string or null (as 0.0).
/// The price API sends null for components it has not published yet.
pub fn deserialize_numeric_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let v = Value::deserialize(deserializer)?;
    if v.is_null() {
        return Ok(0.0);
    }
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|n: &f64| n.is_finite())
        .ok_or_else(|| D::Error::custom(format!("expected a number, got {}", v)))
}

/// Treats an explicit null the same as a missing field.
pub fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Rounds to two decimals. Only used where a value leaves the process
/// (readings, logs); accumulators keep full precision.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        #[serde(default, deserialize_with = "deserialize_numeric_f64")]
        n: f64,
        #[serde(default, deserialize_with = "deserialize_null_default")]
        list: Vec<u8>,
    }

    #[test]
    fn test_numeric_forms() {
        let p: Payload = serde_json::from_str(r#"{"n": 1.25}"#).unwrap();
        assert_eq!(p.n, 1.25);
        let p: Payload = serde_json::from_str(r#"{"n": "0.5"}"#).unwrap();
        assert_eq!(p.n, 0.5);
        let p: Payload = serde_json::from_str(r#"{"n": null}"#).unwrap();
        assert_eq!(p.n, 0.0);
        let p: Payload = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(p.n, 0.0);
        assert!(serde_json::from_str::<Payload>(r#"{"n": "cheap"}"#).is_err());
    }

    #[test]
    fn test_null_list() {
        let p: Payload = serde_json::from_str(r#"{"list": null}"#).unwrap();
        assert!(p.list.is_empty());
        let p: Payload = serde_json::from_str(r#"{"list": [1, 2]}"#).unwrap();
        assert_eq!(p.list, vec![1, 2]);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.234), 1.23);
        assert_eq!(round2(-0.456), -0.46);
        assert_eq!(round2(2.0), 2.0);
    }
}
