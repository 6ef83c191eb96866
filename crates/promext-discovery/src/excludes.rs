//! Attribute exclusion rules applied to discovered targets.

use promext_core::Target;

/// Attribute keys dropped from every target before it is reported.
///
/// A rule is either an exact key (`instance.url`) or a prefix ending in
/// `*` (`instance.*`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeExcludes {
    rules: Vec<String>,
}

impl AttributeExcludes {
    pub fn new<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rules: rules
                .into_iter()
                .map(Into::into)
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn is_excluded(&self, key: &str) -> bool {
        self.rules.iter().any(|rule| match rule.strip_suffix('*') {
            Some(prefix) => key.starts_with(prefix),
            None => key == rule,
        })
    }

    /// Remove excluded attributes from `targets` in place.
    pub fn apply(&self, targets: &mut [Target]) {
        if self.is_empty() {
            return;
        }
        for target in targets {
            target.attributes.retain(|key, _| !self.is_excluded(key));
        }
    }
}
