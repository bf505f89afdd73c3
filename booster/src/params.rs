use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{EngineErr, Result};

/// Hyperparameters handed to the engine.
///
/// Keys are forwarded verbatim, only the few keys a caller actually reads are
/// ever type checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(Map<String, Value>);

impl Params {
    /// Creates an empty set of parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder flavored version of `set`.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Sets `key` to `value`, overwriting any previous value.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copies every entry of `other` into `self`, `other` wins on conflicts.
    pub fn merge(&mut self, other: Params) {
        self.0.extend(other.0);
    }

    /// Reads `key` as a string.
    ///
    /// # Errors
    /// Returns `EngineErr::InvalidParam` if the key is present but isn't a string.
    pub fn get_str(&self, key: &'static str) -> Result<Option<&str>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(invalid_type(key, "a string", other)),
        }
    }

    /// Reads `key` as an unsigned integer.
    ///
    /// # Errors
    /// Returns `EngineErr::InvalidParam` if the key is present but isn't a non negative integer.
    pub fn get_u64(&self, key: &'static str) -> Result<Option<u64>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_u64()
                .map(Some)
                .ok_or_else(|| invalid_type(key, "a non negative integer", value)),
        }
    }

    /// Reads `key` as a float, integers are widened.
    ///
    /// # Errors
    /// Returns `EngineErr::InvalidParam` if the key is present but isn't a number.
    pub fn get_f64(&self, key: &'static str) -> Result<Option<f64>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| invalid_type(key, "a number", value)),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

fn invalid_type(key: &'static str, expected: &str, got: &Value) -> EngineErr {
    EngineErr::InvalidParam {
        key,
        msg: format!("expected {expected}, got {got}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_getters() {
        let params = Params::new()
            .with("objective", "binary")
            .with("num_class", 3)
            .with("alpha", 0.5);

        assert_eq!(params.get_str("objective").unwrap(), Some("binary"));
        assert_eq!(params.get_u64("num_class").unwrap(), Some(3));
        assert_eq!(params.get_f64("alpha").unwrap(), Some(0.5));
        assert_eq!(params.get_f64("num_class").unwrap(), Some(3.0));
        assert_eq!(params.get_str("missing").unwrap(), None);
    }

    #[test]
    fn wrong_type_is_rejected() {
        let params = Params::new().with("num_class", "three").with("alpha", -1);
        assert!(matches!(
            params.get_u64("num_class"),
            Err(EngineErr::InvalidParam { key: "num_class", .. })
        ));
        assert!(params.get_u64("alpha").is_err());
    }

    #[test]
    fn merge_overwrites() {
        let mut params = Params::new().with("machines", "stale").with("lr", 0.1);
        params.merge(Params::new().with("machines", "a:1,b:2"));

        assert_eq!(params.get_str("machines").unwrap(), Some("a:1,b:2"));
        assert_eq!(params.get_f64("lr").unwrap(), Some(0.1));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn unknown_keys_pass_through_serde() {
        let params = Params::new().with("min_child_samples", 7).with("verbose", -1);
        let json = serde_json::to_string(&params).unwrap();
        let back: Params = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }
}
