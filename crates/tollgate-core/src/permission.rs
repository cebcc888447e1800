//! # Capability Sets
//!
//! A capability is a `<resource>:<action>` label such as `resources:read`.
//! Authorization requires exact membership; there is no wildcard or
//! hierarchy.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The capability labels granted to one principal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(BTreeSet<String>);

impl Permissions {
    /// An empty capability set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `label` is present, by exact match.
    pub fn include(&self, label: &str) -> bool {
        self.0.contains(label)
    }

    /// Add a label. Returns `false` if it was already present.
    pub fn insert(&mut self, label: impl Into<String>) -> bool {
        self.0.insert(label.into())
    }

    /// Iterate the labels in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_is_exact() {
        let perms: Permissions = ["resources:read"].into_iter().collect();
        assert!(perms.include("resources:read"));
        assert!(!perms.include("resources:write"));
        assert!(!perms.include("resources"));
        assert!(!perms.include("RESOURCES:READ"));
    }

    #[test]
    fn insert_deduplicates() {
        let mut perms = Permissions::new();
        assert!(perms.insert("a:b"));
        assert!(!perms.insert("a:b"));
        assert_eq!(perms.len(), 1);
    }

    #[test]
    fn serializes_as_sorted_array() {
        let perms: Permissions = ["b:write", "a:read"].into_iter().collect();
        assert_eq!(
            serde_json::to_value(&perms).unwrap(),
            serde_json::json!(["a:read", "b:write"])
        );
    }
}
