//! Name pattern matching for scoping Kubernetes resources.
//!
//! Expressions are comma-separated terms:
//!
//! - `*` matches everything (other inclusion terms are then ignored)
//! - `!<pattern>` excludes names matching the pattern
//! - `<pattern>` includes names matching the pattern
//!
//! A pattern without regex metacharacters is matched literally. Every pattern
//! must match the whole name. Exclusions always win over inclusions.

use std::collections::BTreeSet;
use std::fmt;

use regex::Regex;

const REGEX_METACHARACTERS: &[char] = &[
    '.', '*', '+', '?', '^', '$', '{', '}', '[', ']', '|', '\\', '(', ')',
];

/// Pattern compilation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid regex pattern '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },
}

/// Compiled inclusion/exclusion matcher.
#[derive(Debug, Clone, Default)]
pub struct PatternMatcher {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    match_all: bool,
}

impl PatternMatcher {
    /// Parse an expression.
    ///
    /// `None` or a blank expression yields match-all when `default_match_all`
    /// is set and match-nothing otherwise. An expression holding only
    /// exclusions implicitly matches everything else.
    pub fn from_string(
        expression: Option<&str>,
        default_match_all: bool,
    ) -> Result<Self, PatternError> {
        let stripped = expression.map(str::trim).unwrap_or_default();
        if stripped.is_empty() {
            return Ok(Self {
                match_all: default_match_all,
                ..Default::default()
            });
        }

        let terms: Vec<&str> = split_terms(stripped).collect();
        let wildcard = terms.contains(&"*");

        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for term in terms {
            if term == "*" {
                continue;
            }
            if let Some(inner) = term.strip_prefix('!') {
                if !inner.is_empty() {
                    exclude.push(compile_pattern(inner)?);
                }
            } else if !wildcard {
                include.push(compile_pattern(term)?);
            }
        }

        let match_all = wildcard || (include.is_empty() && !exclude.is_empty());
        Ok(Self {
            include,
            exclude,
            match_all,
        })
    }

    /// Build from pre-split terms. Unlike [`Self::from_string`], a `*` term
    /// has no special meaning here.
    pub fn from_terms<S: AsRef<str>>(terms: &[S]) -> Result<Self, PatternError> {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for term in terms {
            let term = term.as_ref();
            if let Some(inner) = term.strip_prefix('!') {
                if !inner.is_empty() {
                    exclude.push(compile_pattern(inner)?);
                }
            } else {
                include.push(compile_pattern(term)?);
            }
        }
        let match_all = include.is_empty() && !exclude.is_empty();
        Ok(Self {
            include,
            exclude,
            match_all,
        })
    }

    /// Whether `value` is in scope.
    pub fn matches(&self, value: &str) -> bool {
        if self.exclude.iter().any(|re| re.is_match(value)) {
            return false;
        }
        if self.match_all {
            return true;
        }
        self.include.iter().any(|re| re.is_match(value))
    }

    /// Matching subset of `values`.
    pub fn filter<'a, S: AsRef<str>>(&self, values: &'a [S]) -> BTreeSet<&'a str> {
        values
            .iter()
            .map(AsRef::as_ref)
            .filter(|v| self.matches(v))
            .collect()
    }

    /// True when the matcher can match nothing.
    pub fn is_empty(&self) -> bool {
        !self.match_all && self.include.is_empty()
    }

    pub fn is_match_all(&self) -> bool {
        self.match_all
    }

    /// Compile every term of `expression` and collect the failures.
    pub fn validate(expression: &str) -> Vec<String> {
        split_terms(expression)
            .filter(|term| *term != "*")
            .map(|term| term.strip_prefix('!').unwrap_or(term))
            .filter(|inner| !inner.is_empty())
            .filter_map(|inner| compile_pattern(inner).err())
            .map(|e| e.to_string())
            .collect()
    }
}

impl fmt::Display for PatternMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.include.iter().map(|re| re.as_str().to_string()).collect();
        if self.match_all && parts.is_empty() {
            parts.push("*".to_string());
        }
        parts.extend(self.exclude.iter().map(|re| format!("!{}", re.as_str())));
        write!(f, "PatternMatcher({})", parts.join(", "))
    }
}

fn split_terms(expression: &str) -> impl Iterator<Item = &str> {
    expression.split(',').map(str::trim).filter(|t| !t.is_empty())
}

/// Compile one term, anchored for a full-string match.
fn compile_pattern(pattern: &str) -> Result<Regex, PatternError> {
    let body = if pattern.contains(REGEX_METACHARACTERS) {
        let body = pattern.strip_prefix('^').unwrap_or(pattern);
        match body.strip_suffix('$') {
            Some(rest) if !rest.ends_with('\\') => rest.to_string(),
            _ => body.to_string(),
        }
    } else {
        regex::escape(pattern)
    };

    let anchored = format!("^(?:{body})$");
    Regex::new(&anchored).map_err(|e| PatternError::InvalidRegex {
        pattern: anchored.clone(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn matcher(expr: &str) -> PatternMatcher {
        PatternMatcher::from_string(Some(expr), false).unwrap()
    }

    #[test]
    fn test_empty_expression_uses_default() {
        let none = PatternMatcher::from_string(None, false).unwrap();
        assert!(none.is_empty());
        assert!(!none.matches("anything"));

        let all = PatternMatcher::from_string(Some("  "), true).unwrap();
        assert!(!all.is_empty());
        assert!(all.matches("anything"));
    }

    #[test]
    fn test_wildcard() {
        let m = matcher("*");
        assert!(m.is_match_all());
        assert!(m.matches("kube-system"));
        assert!(m.matches(""));
    }

    #[test]
    fn test_literal_requires_full_match() {
        let m = matcher("default");
        assert!(m.matches("default"));
        assert!(!m.matches("default-ns"));
        assert!(!m.matches("my-default"));
    }

    #[test]
    fn test_regex_anchored() {
        let m = matcher("kube-.*");
        assert!(m.matches("kube-system"));
        assert!(!m.matches("mykube-system"));

        let dotted = matcher("my.namespace");
        assert!(dotted.matches("myXnamespace"));
        assert!(!dotted.matches("myXXnamespace"));
    }

    #[test]
    fn test_alternation_is_anchored_as_a_whole() {
        let m = matcher("default|test");
        assert!(m.matches("default"));
        assert!(m.matches("test"));
        assert!(!m.matches("default-extra"));
    }

    #[test]
    fn test_explicit_anchors_are_kept_single() {
        let m = matcher("^kube-.*$");
        assert!(m.matches("kube-dns"));
        assert!(!m.matches("x-kube-dns"));
    }

    #[test]
    fn test_inclusion_with_exclusion() {
        let m = matcher("openshift-.*,!openshift-operators");
        assert!(m.matches("openshift-monitoring"));
        assert!(!m.matches("openshift-operators"));
        assert!(!m.matches("default"));
    }

    #[test]
    fn test_exclusion_only_matches_rest() {
        let m = matcher("!kube-system,!kube-public");
        assert!(m.is_match_all());
        assert!(!m.is_empty());
        assert!(m.matches("default"));
        assert!(!m.matches("kube-system"));
        assert!(!m.matches("kube-public"));
    }

    #[test]
    fn test_wildcard_ignores_other_inclusions() {
        let m = matcher("default,*,!kube-.*");
        assert!(m.matches("prod"));
        assert!(!m.matches("kube-system"));
    }

    #[test]
    fn test_empty_exclusion_ignored() {
        let m = matcher("default,!");
        assert!(m.matches("default"));
        assert!(!m.matches("other"));
    }

    #[test]
    fn test_whitespace_trimmed() {
        let m = matcher("  default  ,  test-ns  ");
        assert!(m.matches("default"));
        assert!(m.matches("test-ns"));
    }

    #[test]
    fn test_from_terms() {
        let m = PatternMatcher::from_terms(&["default", "!kube-system"]).unwrap();
        assert!(m.matches("default"));
        assert!(!m.matches("kube-system"));
        assert!(!m.matches("other"));
    }

    #[test]
    fn test_filter() {
        let values = ["default", "kube-system", "test-ns", "test-app", "prod"];
        let found = matcher("default,test-.*").filter(&values);
        assert_eq!(found, BTreeSet::from(["default", "test-ns", "test-app"]));

        let nothing = PatternMatcher::from_string(None, false).unwrap();
        assert!(nothing.filter(&values).is_empty());
    }

    #[test]
    fn test_validate() {
        assert!(PatternMatcher::validate("default,kube-.*").is_empty());
        assert!(PatternMatcher::validate("*").is_empty());
        assert!(PatternMatcher::validate("").is_empty());

        let errors = PatternMatcher::validate("[invalid");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Invalid regex"));

        let errors = PatternMatcher::validate("ok,![bad,(worse");
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_from_string_rejects_invalid() {
        let err = PatternMatcher::from_string(Some("[invalid"), false).unwrap_err();
        assert!(err.to_string().contains("Invalid regex"));
    }

    #[test]
    fn test_display() {
        assert!(matcher("*").to_string().contains('*'));
        let shown = matcher("default,!kube-system").to_string();
        assert!(shown.contains("default"));
        assert!(shown.contains("kube"));
    }

    proptest! {
        #[test]
        fn prop_literal_matches_itself(name in "[a-z0-9-]{1,20}") {
            let m = matcher(&name);
            prop_assert!(m.matches(&name));
            let longer = format!("{name}x");
            prop_assert!(!m.matches(&longer));
        }

        #[test]
        fn prop_wildcard_matches_everything(value in ".*") {
            prop_assert!(matcher("*").matches(&value));
        }
    }
}
