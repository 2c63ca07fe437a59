//! Server tags used to match clients with compatible shuffle servers

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Tag every shuffle server carries, identifying its protocol version.
pub const SHUFFLE_SERVER_VERSION: &str = "ss_v1";

/// An ordered set of tags.
///
/// Matching is by set inclusion: a server is eligible for a request when its
/// tags are a superset of the request's required tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeSet<String>);

impl TagSet {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Tag set containing only the server version tag
    #[must_use]
    pub fn server_version() -> Self {
        std::iter::once(SHUFFLE_SERVER_VERSION).collect()
    }

    /// Parse a comma-separated list, ignoring blanks and surrounding whitespace
    #[must_use]
    pub fn parse_csv(raw: &str) -> Self {
        raw.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }

    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        self.0.insert(tag.into())
    }

    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    #[must_use]
    pub fn is_superset_of(&self, other: &Self) -> bool {
        self.0.is_superset(&other.0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Comma-separated form, as accepted by [`TagSet::parse_csv`]
    #[must_use]
    pub fn to_csv(&self) -> String {
        self.0.iter().cloned().collect::<Vec<_>>().join(",")
    }
}

impl<S: Into<String>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl std::fmt::Display for TagSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.to_csv())
    }
}
