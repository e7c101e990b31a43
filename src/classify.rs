//! Entity key classification by naming convention.
//!
//! The simulator names hosts `host-*` (or any `host` prefix), host groups
//! `group-<prefix>`, and writes cluster-wide rows as `TOTAL`. Anything else is
//! left unclassified and stays out of the aggregate.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityGrouping {
    #[serde(rename = "host")]
    Host,
    #[serde(rename = "group")]
    Group,
    #[serde(rename = "TOTAL")]
    Total,
}

impl EntityGrouping {
    /// Rendering order: individual hosts, then groups, then the grand total.
    pub const ALL: [Self; 3] = [Self::Host, Self::Group, Self::Total];

    /// Key prefix recognized for this grouping; also the artifact file stem.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Group => "group",
            Self::Total => "TOTAL",
        }
    }

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Host => 0,
            Self::Group => 1,
            Self::Total => 2,
        }
    }
}

impl fmt::Display for EntityGrouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Classify an entity key. Case-sensitive; `None` means unclassified.
#[must_use]
pub fn classify_key(entity_key: &str) -> Option<EntityGrouping> {
    EntityGrouping::ALL
        .into_iter()
        .find(|grouping| entity_key.starts_with(grouping.prefix()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_prefixes() {
        assert_eq!(classify_key("host-1"), Some(EntityGrouping::Host));
        assert_eq!(classify_key("host"), Some(EntityGrouping::Host));
        assert_eq!(classify_key("hostA"), Some(EntityGrouping::Host));
        assert_eq!(classify_key("group-compute"), Some(EntityGrouping::Group));
        assert_eq!(classify_key("TOTAL"), Some(EntityGrouping::Total));
        assert_eq!(classify_key("TOTAL-eu"), Some(EntityGrouping::Total));
    }

    #[test]
    fn classification_is_case_sensitive() {
        assert_eq!(classify_key("Host-1"), None);
        assert_eq!(classify_key("total"), None);
        assert_eq!(classify_key("GROUP-a"), None);
    }

    #[test]
    fn unknown_schemes_are_unclassified() {
        assert_eq!(classify_key("machine-7"), None);
        assert_eq!(classify_key(""), None);
        assert_eq!(classify_key("-host"), None);
    }

    #[test]
    fn prefixes_double_as_file_stems() {
        let stems: Vec<_> = EntityGrouping::ALL.iter().map(|g| g.prefix()).collect();
        assert_eq!(stems, ["host", "group", "TOTAL"]);
        for (i, grouping) in EntityGrouping::ALL.into_iter().enumerate() {
            assert_eq!(grouping.index(), i);
        }
    }
}
