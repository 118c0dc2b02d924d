//! Glob key patterns.
//!
//! `*` is the only wildcard and matches any run of characters, including
//! none. Everything else is literal. Patterns compile to an anchored regex,
//! and the `regex` crate guarantees linear-time matching, so user supplied
//! patterns cannot cause catastrophic backtracking.

use std::fmt;

use regex::Regex;

use crate::cache::CacheError;

const WILDCARD: char = '*';

#[derive(Debug, Clone)]
enum Matcher {
    Literal,
    Glob(Regex),
}

/// A compiled key pattern such as `user:*` or `dashboard:stats`.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    source: String,
    matcher: Matcher,
}

impl KeyPattern {
    /// Compile a glob pattern.
    pub fn compile(pattern: &str) -> Result<Self, CacheError> {
        if pattern.is_empty() {
            return Err(CacheError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "pattern is empty".to_string(),
            });
        }

        if !pattern.contains(WILDCARD) {
            return Ok(Self {
                source: pattern.to_string(),
                matcher: Matcher::Literal,
            });
        }

        let body = pattern
            .split(WILDCARD)
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{}$", body)).map_err(|e| CacheError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source: pattern.to_string(),
            matcher: Matcher::Glob(regex),
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True when the pattern contains no wildcard and names exactly one key.
    pub fn is_literal(&self) -> bool {
        matches!(self.matcher, Matcher::Literal)
    }

    pub fn matches(&self, key: &str) -> bool {
        match &self.matcher {
            Matcher::Literal => self.source == key,
            Matcher::Glob(regex) => regex.is_match(key),
        }
    }

    /// Render for Redis `SCAN MATCH`, escaping Redis glob metacharacters
    /// other than `*`.
    pub fn to_redis_glob(&self) -> String {
        let mut out = String::with_capacity(self.source.len());
        for c in self.source.chars() {
            if matches!(c, '?' | '[' | ']' | '\\') {
                out.push('\\');
            }
            out.push(c);
        }
        out
    }
}

impl PartialEq for KeyPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for KeyPattern {}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_literal_pattern() {
        let p = KeyPattern::compile("dashboard:stats").unwrap();
        assert!(p.is_literal());
        assert!(p.matches("dashboard:stats"));
        assert!(!p.matches("dashboard:stats:extra"));
        assert!(!p.matches("dashboard"));
    }

    #[test]
    fn test_trailing_wildcard() {
        let p = KeyPattern::compile("user:*").unwrap();
        assert!(!p.is_literal());
        assert!(p.matches("user:42"));
        assert!(p.matches("user:42:profile"));
        assert!(p.matches("user:"));
        assert!(!p.matches("users:42"));
        assert!(!p.matches("team:user:42"));
    }

    #[test]
    fn test_inner_wildcard() {
        let p = KeyPattern::compile("user:*:profile").unwrap();
        assert!(p.matches("user:42:profile"));
        assert!(p.matches("user:a:b:profile"));
        assert!(!p.matches("user:42:settings"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let p = KeyPattern::compile("report.v1(*)").unwrap();
        assert!(p.matches("report.v1(2024)"));
        assert!(!p.matches("reportXv1(2024)"));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(matches!(
            KeyPattern::compile(""),
            Err(CacheError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_redis_glob_escaping() {
        let p = KeyPattern::compile("q:[a]?*").unwrap();
        assert_eq!(p.to_redis_glob(), "q:\\[a\\]\\?*");
        assert_eq!(KeyPattern::compile("user:*").unwrap().to_redis_glob(), "user:*");
    }

    proptest! {
        #[test]
        fn property_literal_matches_only_itself(key in "[a-z:0-9._]{1,24}", other in "[a-z:0-9._]{1,24}") {
            let p = KeyPattern::compile(&key).unwrap();
            prop_assert!(p.matches(&key));
            prop_assert_eq!(p.matches(&other), key == other);
        }

        #[test]
        fn property_prefix_wildcard_matches_extensions(prefix in "[a-z:.]{1,12}", suffix in "[a-z0-9:.()]{0,12}") {
            let p = KeyPattern::compile(&format!("{}*", prefix)).unwrap();
            let key = format!("{}{}", prefix, suffix);
            prop_assert!(p.matches(&key));
        }

        #[test]
        fn property_wildcard_never_matches_shorter_prefix(prefix in "[a-z]{2,12}") {
            let p = KeyPattern::compile(&format!("{}*", prefix)).unwrap();
            prop_assert!(!p.matches(&prefix[..prefix.len() - 1]));
        }
    }
}
