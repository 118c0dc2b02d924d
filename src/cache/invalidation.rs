//! Pattern-based invalidation rules.

use crate::cache::{CacheError, KeyPattern};
use crate::config::InvalidationSettings;

/// Writing or deleting a key that matches `source` invalidates every key
/// matching one of `dependents`.
#[derive(Debug, Clone)]
pub struct InvalidationRule {
    source: KeyPattern,
    dependents: Vec<KeyPattern>,
}

impl InvalidationRule {
    pub fn new<S: AsRef<str>>(source: &str, dependents: &[S]) -> Result<Self, CacheError> {
        Ok(Self {
            source: KeyPattern::compile(source)?,
            dependents: dependents
                .iter()
                .map(|d| KeyPattern::compile(d.as_ref()))
                .collect::<Result<_, _>>()?,
        })
    }

    pub fn source(&self) -> &KeyPattern {
        &self.source
    }

    pub fn dependents(&self) -> &[KeyPattern] {
        &self.dependents
    }
}

/// Immutable set of rules, fixed at startup.
#[derive(Debug, Clone)]
pub struct InvalidationRegistry {
    rules: Vec<InvalidationRule>,
    max_depth: usize,
}

impl Default for InvalidationRegistry {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            max_depth: 1,
        }
    }
}

impl InvalidationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &InvalidationSettings) -> Result<Self, CacheError> {
        let rules = settings
            .rules
            .iter()
            .map(|r| InvalidationRule::new(&r.source, r.dependents.as_slice()))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            rules,
            max_depth: settings.max_depth.max(1),
        })
    }

    pub fn with_rule<S: AsRef<str>>(mut self, source: &str, dependents: &[S]) -> Result<Self, CacheError> {
        self.rules.push(InvalidationRule::new(source, dependents)?);
        Ok(self)
    }

    /// How many hops a cascade may follow. `1` means only direct dependents
    /// are removed.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn rules(&self) -> &[InvalidationRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Dependent patterns of every rule whose source matches `key`, in
    /// registration order.
    pub fn dependents_of<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a KeyPattern> + 'a {
        self.rules
            .iter()
            .filter(move |rule| rule.source.matches(key))
            .flat_map(|rule| rule.dependents.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InvalidationRuleConfig;

    #[test]
    fn test_dependents_of() {
        let registry = InvalidationRegistry::new()
            .with_rule("user:*", &["dashboard:stats", "team:*:members"])
            .unwrap()
            .with_rule("user:admin", &["audit:*"])
            .unwrap();

        let deps: Vec<_> = registry.dependents_of("user:42").map(|p| p.as_str()).collect();
        assert_eq!(deps, vec!["dashboard:stats", "team:*:members"]);

        let deps: Vec<_> = registry.dependents_of("user:admin").map(|p| p.as_str()).collect();
        assert_eq!(deps, vec!["dashboard:stats", "team:*:members", "audit:*"]);

        assert_eq!(registry.dependents_of("order:1").count(), 0);
    }

    #[test]
    fn test_from_settings() {
        let settings = InvalidationSettings {
            max_depth: 3,
            rules: vec![InvalidationRuleConfig {
                source: "product:*".to_string(),
                dependents: vec!["catalog:*".to_string()],
            }],
        };
        let registry = InvalidationRegistry::from_settings(&settings).unwrap();
        assert_eq!(registry.max_depth(), 3);
        assert_eq!(registry.rules().len(), 1);
        assert!(registry.rules()[0].dependents()[0].matches("catalog:page:1"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let result = InvalidationRegistry::new().with_rule("", &["a"]);
        assert!(matches!(result, Err(CacheError::InvalidPattern { .. })));
    }

    #[test]
    fn test_depth_floor() {
        let registry = InvalidationRegistry::new().with_max_depth(0);
        assert_eq!(registry.max_depth(), 1);
    }
}
