//! Coerced attribute values exposed by [`crate::Member`].

use serde::{Deserialize, Serialize};

/// Value of a directory attribute after coercion.
///
/// A single all-digit value becomes [`AttributeValue::Integer`], any other single value stays
/// [`AttributeValue::Text`], and multi-valued attributes keep every value in server order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Single value made only of ASCII digits that fits in an `i64`.
    ///
    /// Longer digit strings stay [`AttributeValue::Text`] rather than losing precision.
    Integer(i64),
    /// Any other single value.
    Text(String),
    /// Two or more values.
    Values(Vec<String>),
}

impl AttributeValue {
    /// Coerces the raw values of one attribute. Returns `None` when there are no values.
    #[must_use]
    pub fn from_values(values: &[String]) -> Option<Self> {
        match values {
            [] => None,
            [single] => Some(Self::from_single(single)),
            many => Some(Self::Values(many.to_vec())),
        }
    }

    fn from_single(value: &str) -> Self {
        if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(number) = value.parse::<i64>() {
                return Self::Integer(number);
            }
        }
        Self::Text(value.to_string())
    }

    /// Truthiness used by the boolean member predicates.
    ///
    /// Zero, empty text and an empty list are false; any other value, `FALSE` included, is
    /// true.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Integer(number) => *number != 0,
            Self::Text(text) => !text.is_empty(),
            Self::Values(values) => !values.is_empty(),
        }
    }
}
