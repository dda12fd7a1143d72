use crate::constants::UNSAFE_PATTERNS;

/// Case-insensitive substring deny-list for Lua fragments.
///
/// This is advisory only. It matches text, not semantics, so aliases
/// (`local x = os; x.execute(...)`), string concatenation and indirect calls
/// all get through. Do not treat it as a sandbox.
#[derive(Debug, Clone)]
pub struct SafetyFilter {
    patterns: Vec<String>,
}

impl Default for SafetyFilter {
    fn default() -> Self {
        Self::new(UNSAFE_PATTERNS.iter().copied())
    }
}

impl SafetyFilter {
    /// Build a filter from an explicit set of forbidden patterns
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| p.as_ref().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { patterns }
    }

    /// Default deny-list plus caller-supplied patterns
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = Self::default();
        filter.patterns.extend(
            extra
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .filter(|p| !p.is_empty()),
        );
        filter
    }

    /// Return the first forbidden pattern found in `code`, if any
    pub fn first_match(&self, code: &str) -> Option<&str> {
        let lower_code = code.to_lowercase();
        self.patterns
            .iter()
            .find(|pattern| lower_code.contains(pattern.as_str()))
            .map(String::as_str)
    }

    pub fn is_unsafe(&self, code: &str) -> bool {
        self.first_match(code).is_some()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}
