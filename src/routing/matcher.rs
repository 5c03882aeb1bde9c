//! Route prefix patterns.
//!
//! # Responsibilities
//! - Parse `/segment/*` style patterns into a comparable base path
//! - Match request paths on whole segments
//! - Strip the matched base before handing the request to a surface
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - `/api/*` matches `/api` and `/api/...` but never `/apiary`
//! - `/*` is the catch-all and has the lowest possible priority
//! - No regex to guarantee O(n) matching

use std::fmt;

use crate::routing::router::RouteError;

/// A parsed path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePrefix {
    pattern: String,
    base: String,
}

impl RoutePrefix {
    /// Parse a pattern such as `/api/*`, `/api` or `/*`.
    pub fn parse(pattern: &str) -> Result<Self, RouteError> {
        let invalid = |reason: &'static str| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        if !pattern.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }

        let base = pattern
            .strip_suffix("/*")
            .unwrap_or(pattern)
            .trim_end_matches('/');

        if base.contains('*') {
            return Err(invalid("'*' is only allowed as the final segment"));
        }
        if base.contains("//") {
            return Err(invalid("empty path segment"));
        }

        Ok(Self {
            pattern: pattern.to_string(),
            base: base.to_string(),
        })
    }

    /// Pattern as registered.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Base path without the wildcard; empty for the catch-all.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn is_catch_all(&self) -> bool {
        self.base.is_empty()
    }

    /// Specificity used for ordering; longer wins.
    pub fn specificity(&self) -> usize {
        self.base.len()
    }

    /// Whether `path` falls under this prefix.
    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.base.as_str()) {
            Some(rest) => self.is_catch_all() || rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Remainder of `path` below the base, always starting with `/`.
    ///
    /// Returns `None` when the path does not match.
    pub fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        if !self.matches(path) {
            return None;
        }
        let rest = &path[self.base.len()..];
        Some(if rest.is_empty() { "/" } else { rest })
    }
}

impl fmt::Display for RoutePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wildcard_and_bare_forms() {
        assert_eq!(RoutePrefix::parse("/api/*").unwrap().base(), "/api");
        assert_eq!(RoutePrefix::parse("/api").unwrap().base(), "/api");
        assert_eq!(RoutePrefix::parse("/api/").unwrap().base(), "/api");
        assert!(RoutePrefix::parse("/*").unwrap().is_catch_all());
    }

    #[test]
    fn rejects_malformed_patterns() {
        assert!(RoutePrefix::parse("api/*").is_err());
        assert!(RoutePrefix::parse("/a*/b").is_err());
        assert!(RoutePrefix::parse("/a//b/*").is_err());
    }

    #[test]
    fn matches_whole_segments() {
        let prefix = RoutePrefix::parse("/api/*").unwrap();
        assert!(prefix.matches("/api"));
        assert!(prefix.matches("/api/"));
        assert!(prefix.matches("/api/v1/clusters"));
        assert!(!prefix.matches("/apiary"));
        assert!(!prefix.matches("/agent/status"));
    }

    #[test]
    fn path_matching_is_case_sensitive() {
        let prefix = RoutePrefix::parse("/cert/*").unwrap();
        assert!(!prefix.matches("/CERT/ca"));
    }

    #[test]
    fn catch_all_matches_everything() {
        let prefix = RoutePrefix::parse("/*").unwrap();
        assert!(prefix.matches("/"));
        assert!(prefix.matches("/index.html"));
        assert_eq!(prefix.strip("/js/app.js"), Some("/js/app.js"));
    }

    #[test]
    fn strip_leaves_rooted_remainder() {
        let prefix = RoutePrefix::parse("/agent/*").unwrap();
        assert_eq!(prefix.strip("/agent/status"), Some("/status"));
        assert_eq!(prefix.strip("/agent"), Some("/"));
        assert_eq!(prefix.strip("/other"), None);
    }
}
