//! Strongly-typed identifiers.
//!
//! All IDs are validated at construction time and implement common traits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to define a strongly-typed ID newtype wrapper.
///
/// Generates: struct, `from_string()`, `as_str()`, Display, Serialize, Deserialize.
/// Optionally generates `new()` (UUID v4) and `Default` if `uuid` flag is passed.
macro_rules! define_id {
    ($name:ident, uuid) => {
        define_id!($name);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn from_string(s: String) -> Result<Self, &'static str> {
                if s.trim().is_empty() {
                    return Err(concat!(stringify!($name), " cannot be empty"));
                }
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::types::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_string(s.to_string()).map_err(crate::types::Error::validation)
            }
        }
    };
}

define_id!(ToolId, uuid);
define_id!(LoanId, uuid);
define_id!(UserId);
define_id!(CategoryId);

#[cfg(test)]
impl ToolId {
    pub(crate) fn must(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
impl UserId {
    pub(crate) fn must(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ids_rejected() {
        assert!(UserId::from_string(String::new()).is_err());
        assert!(ToolId::from_string("  ".to_string()).is_err());
        assert_eq!(UserId::from_string("3".to_string()).unwrap().as_str(), "3");
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        assert_ne!(LoanId::new(), LoanId::new());
    }

    #[test]
    fn test_serde_is_transparent() {
        let id: ToolId = "9".parse().unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"9\"");
    }
}
