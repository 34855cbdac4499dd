//! Row actions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::BulkOpError;

/// The row-level operation to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    /// Create a new entity.
    Create,
    /// Update an existing entity.
    Update,
    /// Delete an existing entity.
    Delete,
}

impl Action {
    /// The upper-case wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = BulkOpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(BulkOpError::InvalidModel(format!("unknown action '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("create".parse::<Action>().unwrap(), Action::Create);
        assert_eq!(" Update ".parse::<Action>().unwrap(), Action::Update);
        assert!("upsert".parse::<Action>().is_err());
    }

    #[test]
    fn test_serde_uses_upper_case() {
        assert_eq!(serde_json::to_string(&Action::Delete).unwrap(), "\"DELETE\"");
        let action: Action = serde_json::from_str("\"CREATE\"").unwrap();
        assert_eq!(action, Action::Create);
    }
}
