//! Handle types and boundary normalization

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors converting a boundary value into a handle
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandleError {
    #[error("handle must be an integer, got {0}")]
    NotAnInteger(String),

    #[error("handle {0} does not fit in a 64-bit signed integer")]
    OutOfRange(String),
}

/// A handle as it arrives at the call boundary
///
/// Callers hand over handles as whatever integer width their platform picked;
/// both forms normalize to one wide representation before storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawHandle {
    Int(i32),
    Long(i64),
}

impl RawHandle {
    /// Canonical wide-integer value
    pub fn wide(self) -> i64 {
        match self {
            Self::Int(v) => i64::from(v),
            Self::Long(v) => v,
        }
    }
}

impl From<i32> for RawHandle {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for RawHandle {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl TryFrom<&serde_json::Value> for RawHandle {
    type Error = HandleError;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        let serde_json::Value::Number(n) = value else {
            return Err(HandleError::NotAnInteger(value.to_string()));
        };

        if let Some(v) = n.as_i64() {
            return Ok(match i32::try_from(v) {
                Ok(small) => Self::Int(small),
                Err(_) => Self::Long(v),
            });
        }

        if n.is_u64() {
            return Err(HandleError::OutOfRange(n.to_string()));
        }

        Err(HandleError::NotAnInteger(n.to_string()))
    }
}

/// The pair of handles identifying a headless registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackHandleSet {
    /// Resolves to the entry point to run in the execution context
    pub registration_handle: i64,
    /// Identifies the logical client that receives dispatched events
    pub client_handle: i64,
}

impl CallbackHandleSet {
    pub fn new(registration_handle: i64, client_handle: i64) -> Self {
        Self {
            registration_handle,
            client_handle,
        }
    }

    /// Build from boundary handles of any supported width
    pub fn from_raw(registration: impl Into<RawHandle>, client: impl Into<RawHandle>) -> Self {
        Self::new(registration.into().wide(), client.into().wide())
    }
}

impl std::fmt::Display for CallbackHandleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "registration={} client={}",
            self.registration_handle, self.client_handle
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mixed_widths_normalize_to_same_set() {
        let narrow = CallbackHandleSet::from_raw(42i32, 7i32);
        let wide = CallbackHandleSet::from_raw(42i64, 7i64);
        assert_eq!(narrow, wide);
    }

    #[test]
    fn test_large_handle_keeps_full_width() {
        let big = i64::from(i32::MAX) + 10;
        let set = CallbackHandleSet::from_raw(big, 1i32);
        assert_eq!(set.registration_handle, big);
    }

    #[test]
    fn test_json_small_integer_is_int() {
        assert_eq!(RawHandle::try_from(&json!(12)).unwrap(), RawHandle::Int(12));
    }

    #[test]
    fn test_json_large_integer_is_long() {
        let v = 9_000_000_000i64;
        assert_eq!(RawHandle::try_from(&json!(v)).unwrap(), RawHandle::Long(v));
    }

    #[test]
    fn test_json_rejects_non_integers() {
        assert!(matches!(
            RawHandle::try_from(&json!("12")),
            Err(HandleError::NotAnInteger(_))
        ));
        assert!(matches!(
            RawHandle::try_from(&json!(1.5)),
            Err(HandleError::NotAnInteger(_))
        ));
    }

    #[test]
    fn test_json_rejects_u64_overflow() {
        assert!(matches!(
            RawHandle::try_from(&json!(u64::MAX)),
            Err(HandleError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_serialized_keys_are_camel_case() {
        let json = serde_json::to_string(&CallbackHandleSet::new(1, 2)).unwrap();
        assert_eq!(json, r#"{"registrationHandle":1,"clientHandle":2}"#);
    }
}
