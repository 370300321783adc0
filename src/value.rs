//! Value types that observations can carry.
//!
//! Collectors report field values as untyped JSON; netrecon reimplements
//! them as a closed tagged union so equality, tolerance comparison and
//! schema-conflict detection are exhaustive and statically checked.

use serde::{Deserialize, Serialize};

/// Possible values an observed field can hold.
///
/// # Examples
///
/// ```
/// use netrecon::FieldValue;
///
/// let ip = FieldValue::String("10.0.0.5".to_string());
/// let port_count = FieldValue::Int(48);
/// let up = FieldValue::Bool(true);
///
/// assert!(ip.is_string());
/// assert!(port_count.is_numeric());
/// assert!(up.is_bool());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Structured(serde_json::Value),
}

/// The coarse kind of a field value, used for schema-conflict detection
/// and catalog conformance checks. `Int` and `Float` share the `Number`
/// kind so collectors reporting `48` and `48.0` never schema-conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Bool,
    Number,
    String,
    Structured,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Number => write!(f, "number"),
            Self::String => write!(f, "string"),
            Self::Structured => write!(f, "structured"),
        }
    }
}

impl FieldValue {
    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub const fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Reads any numeric value as a float; `Int` widens losslessly enough
    /// for tolerance comparison.
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Structured(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the coarse kind of this value.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) | Self::Float(_) => ValueKind::Number,
            Self::String(_) => ValueKind::String,
            Self::Structured(_) => ValueKind::Structured,
        }
    }

    /// Compares two values under the detector's tolerance rules.
    ///
    /// Strings, bools and structured values compare exactly. Numeric
    /// values compare within `epsilon` (absolute difference); two `Int`s
    /// still compare exactly. Values of different kinds never agree.
    #[must_use]
    pub fn agrees_with(&self, other: &Self, epsilon: f64) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                match (self.as_float(), other.as_float()) {
                    (Some(a), Some(b)) => (a - b).abs() <= epsilon,
                    _ => false,
                }
            }
            (a, b) => a == b,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Structured(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Structured(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_kinds() {
        assert_eq!(FieldValue::Bool(true).kind(), ValueKind::Bool);
        assert_eq!(FieldValue::Int(42).kind(), ValueKind::Number);
        assert_eq!(FieldValue::Float(1.5).kind(), ValueKind::Number);
        assert_eq!(FieldValue::String("x".into()).kind(), ValueKind::String);
        assert_eq!(
            FieldValue::Structured(serde_json::json!({"a": 1})).kind(),
            ValueKind::Structured
        );
    }

    #[test]
    fn test_value_accessors() {
        let val = FieldValue::Int(42);
        assert!(val.is_numeric());
        assert_eq!(val.as_int(), Some(42));
        assert_eq!(val.as_float(), Some(42.0));
        assert!(val.as_str().is_none());

        let val = FieldValue::String("hello".to_string());
        assert_eq!(val.as_str(), Some("hello"));
        assert!(val.as_float().is_none());
    }

    #[test]
    fn test_exact_string_agreement() {
        let a = FieldValue::String("10.0.0.5".into());
        let b = FieldValue::String("10.0.0.5".into());
        let c = FieldValue::String("10.0.0.6".into());
        assert!(a.agrees_with(&b, 0.0));
        assert!(!a.agrees_with(&c, 0.0));
    }

    #[test]
    fn test_numeric_epsilon_agreement() {
        let a = FieldValue::Float(100.0);
        let b = FieldValue::Float(100.000_000_000_4);
        assert!(a.agrees_with(&b, 1e-9));
        assert!(!a.agrees_with(&FieldValue::Float(100.1), 1e-9));
    }

    #[test]
    fn test_int_float_cross_agreement() {
        let a = FieldValue::Int(48);
        let b = FieldValue::Float(48.0);
        assert!(a.agrees_with(&b, 1e-9));
        assert!(!a.agrees_with(&FieldValue::Float(48.5), 1e-9));
    }

    #[test]
    fn test_ints_compare_exactly() {
        // Epsilon never blurs pure integer comparison.
        let a = FieldValue::Int(1);
        let b = FieldValue::Int(2);
        assert!(!a.agrees_with(&b, 10.0));
    }

    #[test]
    fn test_kind_mismatch_never_agrees() {
        let a = FieldValue::String("48".into());
        let b = FieldValue::Int(48);
        assert!(!a.agrees_with(&b, 1e-9));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(format!("{}", FieldValue::Bool(true)), "true");
        assert_eq!(format!("{}", FieldValue::Int(42)), "42");
        assert_eq!(format!("{}", FieldValue::String("hi".into())), "\"hi\"");
    }

    #[test]
    fn test_value_serialization() {
        let val = FieldValue::String("eth0".into());
        let json = serde_json::to_string(&val).unwrap();
        let deserialized: FieldValue = serde_json::from_str(&json).unwrap();
        assert_eq!(val, deserialized);
    }

    #[test]
    fn test_value_from_conversions() {
        let _: FieldValue = true.into();
        let _: FieldValue = 42i32.into();
        let _: FieldValue = 42i64.into();
        let _: FieldValue = 3.5f64.into();
        let _: FieldValue = "hello".into();
        let _: FieldValue = String::from("hello").into();
        let _: FieldValue = serde_json::json!({"vlan": 10}).into();
    }
}
