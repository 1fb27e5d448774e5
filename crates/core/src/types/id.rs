//! Newtype IDs for type-safe catalog references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing product and variant IDs.
//!
//! Storefront JSON is inconsistent about identifier encoding: the cart and
//! product endpoints emit numbers, while IDs read back from markup attributes
//! (`data-variant-id="123"`) are strings. The generated `Deserialize` accepts
//! both.

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around `u64` with:
/// - `Serialize` as a plain number
/// - `Deserialize` from a number or a numeric string
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`
/// - Conversion methods: `new()`, `as_u64()`
/// - `From<u64>`, `Into<u64>` and `FromStr` implementations
///
/// # Example
///
/// ```rust
/// # use cart_upsell_core::define_id;
/// define_id!(LineId);
/// define_id!(ImageId);
///
/// let line_id = LineId::new(1);
/// let image_id: ImageId = "1".parse().unwrap();
///
/// // These are different types, so this won't compile:
/// // let _: LineId = image_id;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ::serde::Serialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Create a new ID from a u64 value.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the underlying u64 value.
            #[must_use]
            pub const fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::core::num::ParseIntError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                s.trim().parse::<u64>().map(Self)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> ::core::result::Result<Self, D::Error>
            where
                D: ::serde::Deserializer<'de>,
            {
                $crate::types::id::deserialize_numeric_id(deserializer).map(Self)
            }
        }
    };
}

define_id!(ProductId);
define_id!(VariantId);

/// Either encoding of a storefront identifier.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

/// Deserialize an identifier encoded as a JSON number or numeric string.
///
/// Used by `define_id!`; not meant to be called directly.
///
/// # Errors
///
/// Returns a deserialization error for negative numbers, floats, and
/// strings that are not base-10 integers.
#[doc(hidden)]
pub fn deserialize_numeric_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match <RawId as serde::Deserialize>::deserialize(deserializer)? {
        RawId::Number(n) => Ok(n),
        RawId::Text(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid identifier: {s:?}"))),
    }
}

/// Read an identifier out of an untyped JSON value.
///
/// Returns `None` for `null`, missing, zero, or non-numeric values. Zero is
/// treated as absent because storefront payloads use it for "no product".
#[must_use]
pub fn id_from_value(value: Option<&serde_json::Value>) -> Option<u64> {
    let id = match value? {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    (id != 0).then_some(id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_deserializes_from_number_and_string() {
        let from_number: VariantId = serde_json::from_value(json!(39_000_000_001_u64)).unwrap();
        let from_string: VariantId = serde_json::from_value(json!("39000000001")).unwrap();
        assert_eq!(from_number, from_string);
        assert_eq!(from_number.as_u64(), 39_000_000_001);
    }

    #[test]
    fn test_id_rejects_garbage() {
        assert!(serde_json::from_value::<ProductId>(json!("abc")).is_err());
        assert!(serde_json::from_value::<ProductId>(json!(-4)).is_err());
        assert!(serde_json::from_value::<ProductId>(json!(1.5)).is_err());
    }

    #[test]
    fn test_id_serializes_as_number() {
        let id = ProductId::new(42);
        assert_eq!(serde_json::to_value(id).unwrap(), json!(42));
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_id_from_str() {
        let id: VariantId = " 17 ".parse().unwrap();
        assert_eq!(id, VariantId::new(17));
        assert!("".parse::<VariantId>().is_err());
    }

    #[test]
    fn test_id_from_value() {
        assert_eq!(id_from_value(Some(&json!(5))), Some(5));
        assert_eq!(id_from_value(Some(&json!("6"))), Some(6));
        assert_eq!(id_from_value(Some(&json!(0))), None);
        assert_eq!(id_from_value(Some(&json!(null))), None);
        assert_eq!(id_from_value(Some(&json!({"id": 1}))), None);
        assert_eq!(id_from_value(None), None);
    }
}
