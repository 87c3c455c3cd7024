//! Route pattern parsing.
//!
//! # Responsibilities
//! - Parse `"<METHOD> <path>"` and method-agnostic `"<path>"` patterns
//! - Validate wildcard segments
//! - Decide whether a pattern is an exact axum path or a prefix
//!
//! # Design Decisions
//! - `{name}` matches one segment, `{name...}` the remainder of the path
//! - A trailing `/` is a subtree match: `/static/` also serves `/static/a/b`
//! - `{$}` after a trailing `/` restricts the match to that exact path
//! - Patterns are compared after normalisation (method upper-cased, whitespace trimmed)

use std::fmt;

use axum::http::Method;
use thiserror::Error;

/// Errors produced while parsing a route pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,

    #[error("invalid method {0:?}")]
    InvalidMethod(String),

    #[error("path {0:?} must start with '/'")]
    InvalidPath(String),

    #[error("malformed wildcard segment {0:?}")]
    InvalidWildcard(String),

    #[error("wildcard {0:?} must be the last segment")]
    WildcardNotLast(String),

    #[error("wildcard name {0:?} appears more than once")]
    DuplicateWildcard(String),
}

/// A parsed dispatch key: optional method plus path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    method: Option<Method>,
    path: String,
}

/// Where the router resolves a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    /// A single axum path (`{name}` segments allowed).
    Exact(String),
    /// Every path at or below `prefix`, which ends in `/`. The part after
    /// the prefix is captured under `remainder` when it is named.
    Prefix {
        prefix: String,
        remainder: Option<String>,
    },
}

/// How the end of a pattern's path matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tail {
    /// Exact path match.
    Exact,
    /// Trailing `/`: the path itself and everything below it.
    Subtree,
    /// Trailing `{name...}`.
    Remainder,
    /// Trailing `/{$}`: only the slash-terminated path itself.
    ExactSlash,
}

impl Pattern {
    /// Parse a pattern such as `"GET /users/{id}"` or `"/health"`.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PatternError::Empty);
        }

        let (method, path) = match raw.split_once(char::is_whitespace) {
            Some((method, path)) => (Some(parse_method(method)?), path.trim()),
            None => (None, raw),
        };

        if !path.starts_with('/') || path.contains(char::is_whitespace) {
            return Err(PatternError::InvalidPath(path.to_string()));
        }
        validate_segments(path)?;

        Ok(Self {
            method,
            path: path.to_string(),
        })
    }

    /// The method this pattern is restricted to, `None` for any method.
    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the pattern also matches every path below it.
    pub fn is_subtree(&self) -> bool {
        self.tail() == Tail::Subtree
    }

    /// The same pattern with a `/` appended, used to register `/foo` and `/foo/`
    /// together. `None` when the path already ends in `/`, `{$}` or `{name...}`.
    pub fn with_trailing_slash(&self) -> Option<Self> {
        if self.tail() != Tail::Exact {
            return None;
        }
        Some(Self {
            method: self.method.clone(),
            path: format!("{}/", self.path),
        })
    }

    /// How the router dispatches this pattern.
    pub(crate) fn target(&self) -> Target {
        match self.tail() {
            Tail::Exact => Target::Exact(self.path.clone()),
            Tail::ExactSlash => Target::Exact(self.path.trim_end_matches("{$}").to_string()),
            Tail::Subtree => Target::Prefix {
                prefix: self.path.clone(),
                remainder: None,
            },
            Tail::Remainder => {
                let (base, last) = self
                    .path
                    .rsplit_once('/')
                    .unwrap_or(("", self.path.as_str()));
                let name = last
                    .trim_start_matches('{')
                    .trim_end_matches('}')
                    .trim_end_matches("...");
                Target::Prefix {
                    prefix: format!("{base}/"),
                    remainder: Some(name.to_string()),
                }
            }
        }
    }

    fn tail(&self) -> Tail {
        if self.path.ends_with("/{$}") {
            Tail::ExactSlash
        } else if self.path.ends_with("...}") {
            Tail::Remainder
        } else if self.path.ends_with('/') {
            Tail::Subtree
        } else {
            Tail::Exact
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.method {
            Some(method) => write!(f, "{} {}", method, self.path),
            None => f.write_str(&self.path),
        }
    }
}

impl std::str::FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_method(token: &str) -> Result<Method, PatternError> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(PatternError::InvalidMethod(token.to_string()));
    }
    Method::from_bytes(token.to_ascii_uppercase().as_bytes())
        .map_err(|_| PatternError::InvalidMethod(token.to_string()))
}

fn validate_segments(path: &str) -> Result<(), PatternError> {
    let segments: Vec<&str> = path[1..].split('/').collect();
    let mut names: Vec<&str> = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();

        if !segment.contains('{') && !segment.contains('}') {
            continue;
        }
        if !segment.starts_with('{') || !segment.ends_with('}') {
            return Err(PatternError::InvalidWildcard(segment.to_string()));
        }

        let inner = &segment[1..segment.len() - 1];
        if inner == "$" {
            // `{$}` only makes sense right after a trailing slash.
            if !last {
                return Err(PatternError::WildcardNotLast(segment.to_string()));
            }
            continue;
        }

        let (name, remainder) = match inner.strip_suffix("...") {
            Some(name) => (name, true),
            None => (inner, false),
        };
        if name.is_empty()
            || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(PatternError::InvalidWildcard(segment.to_string()));
        }
        if remainder && !last {
            return Err(PatternError::WildcardNotLast(segment.to_string()));
        }
        if names.contains(&name) {
            return Err(PatternError::DuplicateWildcard(name.to_string()));
        }
        names.push(name);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method_and_path() {
        let p = Pattern::parse("GET /hello").unwrap();
        assert_eq!(p.method(), Some(&Method::GET));
        assert_eq!(p.path(), "/hello");
        assert_eq!(p.to_string(), "GET /hello");
    }

    #[test]
    fn test_parse_method_agnostic() {
        let p = Pattern::parse("/health").unwrap();
        assert_eq!(p.method(), None);
        assert_eq!(p.to_string(), "/health");
    }

    #[test]
    fn test_parse_normalises() {
        let a = Pattern::parse("  get   /x ").unwrap();
        let b = Pattern::parse("GET /x").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Pattern::parse("   "), Err(PatternError::Empty));
        assert_eq!(
            Pattern::parse("GET hello"),
            Err(PatternError::InvalidPath("hello".into()))
        );
        assert_eq!(
            Pattern::parse("G3T /x"),
            Err(PatternError::InvalidMethod("G3T".into()))
        );
        assert_eq!(
            Pattern::parse("/files/{path...}/raw"),
            Err(PatternError::WildcardNotLast("{path...}".into()))
        );
        assert_eq!(
            Pattern::parse("/a/{id}/b/{id}"),
            Err(PatternError::DuplicateWildcard("id".into()))
        );
        assert_eq!(
            Pattern::parse("/a/x{id}"),
            Err(PatternError::InvalidWildcard("x{id}".into()))
        );
        assert_eq!(
            Pattern::parse("/a/{}"),
            Err(PatternError::InvalidWildcard("{}".into()))
        );
    }

    #[test]
    fn test_trailing_slash_variant() {
        let p = Pattern::parse("GET /foo").unwrap();
        let slash = p.with_trailing_slash().unwrap();
        assert_eq!(slash.to_string(), "GET /foo/");
        assert!(slash.with_trailing_slash().is_none());
        assert!(Pattern::parse("/files/{path...}")
            .unwrap()
            .with_trailing_slash()
            .is_none());
        assert_eq!(
            Pattern::parse("/users/{id}")
                .unwrap()
                .with_trailing_slash()
                .unwrap()
                .path(),
            "/users/{id}/"
        );
    }

    #[test]
    fn test_targets() {
        assert_eq!(
            Pattern::parse("GET /users/{id}").unwrap().target(),
            Target::Exact("/users/{id}".into())
        );

        let subtree = Pattern::parse("GET /static/").unwrap();
        assert!(subtree.is_subtree());
        assert_eq!(
            subtree.target(),
            Target::Prefix {
                prefix: "/static/".into(),
                remainder: None
            }
        );

        assert_eq!(
            Pattern::parse("/files/{path...}").unwrap().target(),
            Target::Prefix {
                prefix: "/files/".into(),
                remainder: Some("path".into())
            }
        );

        let exact_slash = Pattern::parse("/dir/{$}").unwrap();
        assert!(!exact_slash.is_subtree());
        assert_eq!(exact_slash.target(), Target::Exact("/dir/".into()));
    }
}
