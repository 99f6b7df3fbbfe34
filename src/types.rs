//! Core types for the dataloom dataflow engine.
//!
//! This module defines the fundamental vocabulary shared by every other
//! module: the [`DataType`] descriptor attached to ports and the
//! [`PortValueMap`] that carries values between nodes.
//!
//! For the executable surface (nodes, contexts, results) see
//! [`crate::node`]; for graph wiring see [`crate::connection`] and
//! [`crate::executor`].

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;

/// Name of the universal type that is compatible with every other type.
pub const ANY_TYPE: &str = "any";

/// Map from port id to the value flowing through that port.
pub type PortValueMap = FxHashMap<String, Value>;

/// Validator predicate attached to a [`DataType`].
///
/// Returns `true` when the candidate value is acceptable for the type.
pub type ValueValidator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Typed contract for a value flowing between nodes.
///
/// A `DataType` is a name plus an optional validator predicate. Two types
/// are [`compatible_with`](Self::compatible_with) each other when their
/// names match or either side is the universal `"any"` type.
///
/// # Examples
///
/// ```
/// use dataloom::types::DataType;
/// use serde_json::json;
///
/// let number = DataType::number();
/// assert!(number.accepts(&json!(42)));
/// assert!(!number.accepts(&json!("forty-two")));
/// assert!(number.compatible_with(&DataType::any()));
/// assert!(!number.compatible_with(&DataType::string()));
/// ```
#[derive(Clone)]
pub struct DataType {
    name: String,
    validator: Option<ValueValidator>,
}

impl DataType {
    /// Create a named type with no validator.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            validator: None,
        }
    }

    /// The universal type; compatible with everything, accepts everything.
    #[must_use]
    pub fn any() -> Self {
        Self::new(ANY_TYPE)
    }

    /// A `"string"` type validating that values are JSON strings.
    #[must_use]
    pub fn string() -> Self {
        Self::new("string").with_validator(|v: &Value| v.is_string())
    }

    /// A `"number"` type validating that values are JSON numbers.
    #[must_use]
    pub fn number() -> Self {
        Self::new("number").with_validator(|v: &Value| v.is_number())
    }

    /// A `"boolean"` type validating that values are JSON booleans.
    #[must_use]
    pub fn boolean() -> Self {
        Self::new("boolean").with_validator(|v: &Value| v.is_boolean())
    }

    /// An `"object"` type validating that values are JSON objects.
    #[must_use]
    pub fn object() -> Self {
        Self::new("object").with_validator(|v: &Value| v.is_object())
    }

    /// Attach a validator predicate to this type.
    #[must_use]
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// The type's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if this is the universal `"any"` type.
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.name == ANY_TYPE
    }

    /// Returns `true` when the type carries a validator predicate.
    #[must_use]
    pub fn has_validator(&self) -> bool {
        self.validator.is_some()
    }

    /// Check a candidate value against the validator, if one is attached.
    ///
    /// Types without a validator accept every value.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match &self.validator {
            Some(validator) => validator(value),
            None => true,
        }
    }

    /// Connection compatibility: names match, or either side is `"any"`.
    #[must_use]
    pub fn compatible_with(&self, other: &DataType) -> bool {
        self.is_any() || other.is_any() || self.name == other.name
    }
}

impl fmt::Debug for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataType")
            .field("name", &self.name)
            .field("validator", &self.validator.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl PartialEq for DataType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for DataType {}

impl From<&str> for DataType {
    fn from(name: &str) -> Self {
        DataType::new(name)
    }
}
