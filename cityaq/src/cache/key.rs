//! Normalized request fingerprints.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// Filler words dropped from keys so that alternative spellings of a city
/// name ("Accra Metropolitan", "Accra") share one entry. Order matters:
/// `autonomouscityof` must go before `cityof`.
const FILLER: &[&str] = &["autonomouscityof", "cityof", "metropolitan", "municipality"];

fn non_alphanumeric() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("[^a-z0-9]+").unwrap_or_else(|_| unreachable!()))
}

/// A normalized cache key: lowercase ASCII letters and digits only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Normalize a raw request description into a key.
    pub fn normalize(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        let mut key = non_alphanumeric().replace_all(&lower, "").into_owned();
        for word in FILLER {
            key = key.replace(word, "");
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
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
