//! Access types granted by access rules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of access an access rule grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessType {
    /// Persisting a new entity.
    Create,
    /// Reading an entity (queries and loaded instances).
    Read,
    /// Modifying an existing entity.
    Update,
    /// Removing an entity.
    Delete,
}

impl AccessType {
    /// All access types, in declaration order.
    pub const ALL: [AccessType; 4] = [
        AccessType::Create,
        AccessType::Read,
        AccessType::Update,
        AccessType::Delete,
    ];

    /// The keyword used for this access type in GRANT statements.
    pub fn keyword(&self) -> &'static str {
        match self {
            AccessType::Create => "CREATE",
            AccessType::Read => "READ",
            AccessType::Update => "UPDATE",
            AccessType::Delete => "DELETE",
        }
    }

    /// Parse a GRANT keyword (case-insensitive).
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        AccessType::ALL
            .into_iter()
            .find(|access_type| access_type.keyword().eq_ignore_ascii_case(keyword))
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_round_trip() {
        for access_type in AccessType::ALL {
            assert_eq!(
                AccessType::from_keyword(access_type.keyword()),
                Some(access_type)
            );
        }
        assert_eq!(AccessType::from_keyword("read"), Some(AccessType::Read));
        assert_eq!(AccessType::from_keyword("ACCESS"), None);
    }
}
