//! Cache key derivation.
//!
//! Keys have the shape `prefix:identifier[:suffix]`. The suffix lets several
//! independent views of the same entity (`full`, `user`, `username`, ...)
//! live side by side without colliding.

use std::fmt;

/// A derived cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `identifier` under `prefix`, optionally qualified
    /// by `suffix`. An empty suffix is treated as absent.
    pub fn new(prefix: &str, identifier: &str, suffix: Option<&str>) -> Self {
        match suffix.filter(|s| !s.is_empty()) {
            Some(suffix) => Self(format!("{}:{}:{}", prefix, identifier, suffix)),
            None => Self(format!("{}:{}", prefix, identifier)),
        }
    }

    /// Glob pattern matching every key under `prefix`.
    pub fn prefix_pattern(prefix: &str) -> String {
        format!("{}:*", prefix)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plain_key() {
        let key = CacheKey::new("user", "license:abc", None);
        assert_eq!(key.as_str(), "user:license:abc");
    }

    #[test]
    fn test_suffixed_key() {
        let key = CacheKey::new("character", "12", Some("full"));
        assert_eq!(key.to_string(), "character:12:full");
    }

    #[test]
    fn test_empty_suffix_ignored() {
        assert_eq!(
            CacheKey::new("character", "12", Some("")),
            CacheKey::new("character", "12", None)
        );
    }

    #[test]
    fn test_prefix_pattern() {
        assert_eq!(CacheKey::prefix_pattern("penalty"), "penalty:*");
    }

    proptest! {
        /// Suffixed and unsuffixed views of one identifier never collide.
        #[test]
        fn prop_suffix_views_are_distinct(
            id in "[a-z0-9]{1,12}",
            suffix in "[a-z]{1,8}",
        ) {
            let base = CacheKey::new("character", &id, None);
            let view = CacheKey::new("character", &id, Some(&suffix));
            prop_assert_ne!(base.clone(), view.clone());
            prop_assert!(view.as_str().starts_with(base.as_str()));
        }
    }
}
