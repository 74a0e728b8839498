//! Subscription Targets
//!
//! An asset identifier names one tradable outcome token on the venue. The
//! venue issues them as arbitrary-precision decimal strings, so they are kept
//! as validated text and never parsed into a numeric type.

use std::fmt;

use serde::Serialize;

/// Errors raised while building subscription targets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssetIdError {
    /// The identifier was empty after trimming.
    #[error("asset id cannot be empty")]
    Empty,
    /// The identifier contained a non-digit character.
    #[error("asset id must be a decimal string: {0}")]
    NotDecimal(String),
    /// A subscription needs at least one target.
    #[error("at least one asset id is required")]
    NoTargets,
}

/// One subscription target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Validate and wrap an asset identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is empty or is not made of ASCII digits.
    pub fn parse(value: impl AsRef<str>) -> Result<Self, AssetIdError> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(AssetIdError::Empty);
        }
        if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AssetIdError::NotDecimal(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines (asset ids are ~78 digits long).
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(20)]
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-empty, duplicate-free set of subscription targets.
///
/// Insertion order is preserved so the subscribe frame lists assets in the
/// order they were configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSet(Vec<AssetId>);

impl AssetSet {
    /// Build a set, dropping duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`AssetIdError::NoTargets`] when `ids` is empty.
    pub fn new(ids: impl IntoIterator<Item = AssetId>) -> Result<Self, AssetIdError> {
        let mut unique: Vec<AssetId> = Vec::new();
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        if unique.is_empty() {
            return Err(AssetIdError::NoTargets);
        }
        Ok(Self(unique))
    }

    /// Parse a set from raw strings.
    ///
    /// # Errors
    ///
    /// Returns the first invalid id, or [`AssetIdError::NoTargets`] if none were given.
    pub fn parse<I, S>(raw: I) -> Result<Self, AssetIdError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids = raw
            .into_iter()
            .map(AssetId::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(ids)
    }

    /// Number of targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the targets.
    pub fn iter(&self) -> impl Iterator<Item = &AssetId> {
        self.0.iter()
    }

    /// Owned identifier strings, in configured order.
    #[must_use]
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(|id| id.as_str().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASSET: &str =
        "109681959945973300464568698402968596289258214226684818748321941747028805721376";

    #[test]
    fn parse_accepts_long_decimal_ids() {
        let id = AssetId::parse(ASSET).unwrap();
        assert_eq!(id.as_str(), ASSET);
        assert_eq!(id.short().len(), 20);
    }

    #[test]
    fn parse_trims_whitespace() {
        let id = AssetId::parse("  42 ").unwrap();
        assert_eq!(id.as_str(), "42");
    }

    #[test]
    fn parse_rejects_empty_and_non_decimal() {
        assert_eq!(AssetId::parse("   "), Err(AssetIdError::Empty));
        assert!(matches!(
            AssetId::parse("0xabc"),
            Err(AssetIdError::NotDecimal(_))
        ));
    }

    #[test]
    fn set_requires_at_least_one_target() {
        let empty: Vec<&str> = vec![];
        assert_eq!(AssetSet::parse(empty), Err(AssetIdError::NoTargets));
    }

    #[test]
    fn set_drops_duplicates_and_keeps_order() {
        let set = AssetSet::parse(["3", "1", "3", "2"]).unwrap();
        assert_eq!(set.to_strings(), vec!["3", "1", "2"]);
        assert_eq!(set.len(), 3);
        assert!(!set.is_empty());
    }
}
