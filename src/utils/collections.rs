//! Constructors for the crate's standard map types.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::types::PortValueMap;

/// Fresh empty port-value map.
#[must_use]
pub fn new_value_map() -> PortValueMap {
    FxHashMap::default()
}

/// Port-value map built from `(port id, value)` pairs.
pub fn value_map<I, K>(pairs: I) -> PortValueMap
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
