//! Scope paths: the unit of exclusive locking
//!
//! A [`ScopePath`] is a normalized, `/`-separated workspace prefix. Two scopes
//! conflict when one is a prefix of the other (equal paths included).

use crate::error::ValidationError;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Normalized filesystem-style scope
///
/// # Examples
/// - `/repo//srv/` → `/repo/srv`
/// - `repo/./srv` → `/repo/srv`
/// - `""` and `/` → root, which conflicts with everything
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopePath(Vec<String>);

impl ScopePath {
    /// Parse and normalize; `..` segments are rejected
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let mut segments = Vec::new();
        for segment in raw.trim().split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    return Err(ValidationError::new(
                        "scopePath",
                        format!("'{raw}' contains a parent-directory segment"),
                    )
                    .with_hint("scope paths must not contain '..'"));
                }
                s => segments.push(s.to_string()),
            }
        }
        Ok(Self(segments))
    }

    /// Root scope
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Path segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Check if this is the root scope
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Check if this path is a prefix of another (or equal to it)
    #[inline]
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        self.0.len() <= other.0.len() && self.0 == other.0[..self.0.len()]
    }

    /// Check if two scopes may not be held concurrently
    #[inline]
    #[must_use]
    pub fn conflicts_with(&self, other: &Self) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }

    /// Check if this scope lies within `ancestor`
    #[inline]
    #[must_use]
    pub fn is_within(&self, ancestor: &Self) -> bool {
        ancestor.is_prefix_of(self)
    }
}

impl Display for ScopePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for ScopePath {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn p(s: &str) -> ScopePath {
        s.parse().unwrap()
    }

    #[test]
    fn normalization() {
        assert_eq!(p("/repo//srv/").to_string(), "/repo/srv");
        assert_eq!(p("repo/./srv"), p("/repo/srv"));
        assert!(p("").is_root());
        assert!(p("/").is_root());
    }

    #[test]
    fn parent_segments_rejected() {
        let err = ScopePath::parse("/repo/../etc").unwrap_err();
        assert_eq!(err.field, "scopePath");
    }

    #[test]
    fn conflict_rule() {
        assert!(p("/repo").conflicts_with(&p("/repo/pkg")));
        assert!(p("/repo/pkg").conflicts_with(&p("/repo")));
        assert!(p("/repo").conflicts_with(&p("/repo/")));
        assert!(!p("/repo/a").conflicts_with(&p("/repo/ab")));
        assert!(!p("/repo/a").conflicts_with(&p("/repo/b")));
        assert!(p("").conflicts_with(&p("/anything/at/all")));
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-c]{1,2}"
    }

    proptest! {
        #[test]
        fn conflict_is_symmetric(
            a in prop::collection::vec(segment(), 0..4),
            b in prop::collection::vec(segment(), 0..4),
        ) {
            let a = ScopePath::parse(&a.join("/")).unwrap();
            let b = ScopePath::parse(&b.join("/")).unwrap();
            prop_assert_eq!(a.conflicts_with(&b), b.conflicts_with(&a));
        }

        #[test]
        fn display_reparses_to_same_scope(parts in prop::collection::vec(segment(), 0..5)) {
            let scope = ScopePath::parse(&parts.join("//")).unwrap();
            prop_assert_eq!(ScopePath::parse(&scope.to_string()).unwrap(), scope);
        }
    }
}
