//! Identifiers shared across the workspace.

use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Canonical document identifier: the 1-based position in
/// `DocumentIndex::documents`.
pub type DocId = usize;

/// Opaque identity of one analysis session's index.
///
/// Probes remember the identity of the index they were trained on so that
/// scoring a different index can be flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexId(Ulid);

impl IndexId {
    /// Mint a fresh identity.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for IndexId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key of one topic level (one complete partition of the documents).
///
/// Automatic levels are keyed by their topic count; externally supplied
/// partitions are keyed by a caller-chosen name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelKey {
    /// Level produced by cutting the dendrogram into this many topics
    Count(usize),
    /// Custom level supplied by the caller
    Name(String),
}

impl LevelKey {
    /// Topic count for automatic levels.
    pub fn as_count(&self) -> Option<usize> {
        match self {
            LevelKey::Count(k) => Some(*k),
            LevelKey::Name(_) => None,
        }
    }
}

impl From<usize> for LevelKey {
    fn from(k: usize) -> Self {
        LevelKey::Count(k)
    }
}

impl From<&str> for LevelKey {
    fn from(name: &str) -> Self {
        LevelKey::Name(name.to_string())
    }
}

impl From<String> for LevelKey {
    fn from(name: String) -> Self {
        LevelKey::Name(name)
    }
}

impl fmt::Display for LevelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelKey::Count(k) => write!(f, "{}", k),
            LevelKey::Name(name) => write!(f, "{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_ids_are_unique() {
        assert_ne!(IndexId::new(), IndexId::new());
    }

    #[test]
    fn test_level_key_conversions() {
        assert_eq!(LevelKey::from(4usize), LevelKey::Count(4));
        assert_eq!(LevelKey::from("labels"), LevelKey::Name("labels".into()));
        assert_eq!(LevelKey::Count(12).as_count(), Some(12));
        assert_eq!(LevelKey::Name("x".into()).as_count(), None);
    }

    #[test]
    fn test_level_key_ordering() {
        let mut keys = vec![
            LevelKey::Name("b".into()),
            LevelKey::Count(8),
            LevelKey::Name("a".into()),
            LevelKey::Count(2),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                LevelKey::Count(2),
                LevelKey::Count(8),
                LevelKey::Name("a".into()),
                LevelKey::Name("b".into()),
            ]
        );
    }

    #[test]
    fn test_level_key_serialization() {
        let json = serde_json::to_string(&LevelKey::Count(3)).unwrap();
        assert_eq!(json, r#"{"count":3}"#);
        let decoded: LevelKey = serde_json::from_str(r#"{"name":"custom"}"#).unwrap();
        assert_eq!(decoded, LevelKey::Name("custom".into()));
    }
}
