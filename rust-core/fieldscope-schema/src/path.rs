// SPDX-License-Identifier: PMPL-1.0-or-later
//! Dotted field paths.
//!
//! A [`FieldPath`] is a non-empty sequence of segments leading from a
//! resolution root (the index root, or an enclosing object scope) to a field.
//! Segments never contain the `.` separator; a path string with an empty
//! segment (`"a..b"`, `".a"`) is rejected at parse time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SchemaError;

/// Separator between path segments in the string form of a [`FieldPath`].
pub const SEPARATOR: char = '.';

/// An ordered, non-empty sequence of field name segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse a dot-separated path such as `"author.address.city"`.
    pub fn parse(raw: &str) -> Result<Self, SchemaError> {
        if raw.is_empty() {
            return Err(SchemaError::invalid_path(raw, "path is empty"));
        }
        Self::from_segments(raw.split(SEPARATOR)).map_err(|_| {
            SchemaError::invalid_path(raw, "path contains an empty segment")
        })
    }

    /// Build a path from individual segments.
    ///
    /// Every segment must be non-empty and must not contain the separator.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(SchemaError::invalid_path("", "path has no segments"));
        }
        for segment in &segments {
            validate_segment(segment).map_err(|reason| {
                SchemaError::invalid_path(segments.join("."), reason)
            })?;
        }
        Ok(Self { segments })
    }

    /// Single-segment path. Fails if the name is not a valid segment.
    pub fn single(name: &str) -> Result<Self, SchemaError> {
        validate_segment(name).map_err(|reason| SchemaError::invalid_path(name, reason))?;
        Ok(Self {
            segments: vec![name.to_string()],
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments (always at least one).
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false; present for API symmetry with collections.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The final segment, i.e. the field's own name.
    pub fn last(&self) -> &str {
        // Invariant: `segments` is never empty.
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// The enclosing path, or `None` for a top-level field.
    pub fn parent(&self) -> Option<FieldPath> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Append a relative path to this one.
    pub fn join(&self, relative: &FieldPath) -> FieldPath {
        let mut segments = self.segments.clone();
        segments.extend(relative.segments.iter().cloned());
        Self { segments }
    }

    /// Resolve a relative path against an optional root (`None` = index root).
    pub fn join_under(root: Option<&FieldPath>, relative: &FieldPath) -> FieldPath {
        match root {
            Some(root) => root.join(relative),
            None => relative.clone(),
        }
    }

    /// Append a single, already validated child segment.
    pub(crate) fn child(&self, segment: &str) -> FieldPath {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self { segments }
    }

    pub(crate) fn from_validated(segment: &str) -> FieldPath {
        Self {
            segments: vec![segment.to_string()],
        }
    }

    /// True if `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// True if this path is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &FieldPath) -> bool {
        other.segments.len() > self.segments.len() && other.starts_with(self)
    }

    /// Remove `prefix` from the front of this path.
    ///
    /// Returns `None` when `prefix` is not a strict ancestor, since the
    /// remainder would be empty or undefined.
    pub fn strip_prefix(&self, prefix: &FieldPath) -> Option<FieldPath> {
        if !prefix.is_ancestor_of(self) {
            return None;
        }
        Some(Self {
            segments: self.segments[prefix.segments.len()..].to_vec(),
        })
    }

    /// All non-empty prefixes, shortest first. The last item is the path itself.
    pub fn prefixes(&self) -> impl Iterator<Item = FieldPath> + '_ {
        (1..=self.segments.len()).map(move |n| Self {
            segments: self.segments[..n].to_vec(),
        })
    }
}

/// Check that a single segment is usable as a field name.
pub fn validate_segment(segment: &str) -> Result<(), &'static str> {
    if segment.is_empty() {
        return Err("segment is empty");
    }
    if segment.contains(SEPARATOR) {
        return Err("segment contains the path separator");
    }
    Ok(())
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl FromStr for FieldPath {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for FieldPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        FieldPath::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn path(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let p = path("nested.flattened.field");
        assert_eq!(p.len(), 3);
        assert_eq!(p.last(), "field");
        assert_eq!(p.to_string(), "nested.flattened.field");
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse("a..b").is_err());
        assert!(FieldPath::parse(".a").is_err());
        assert!(FieldPath::parse("a.").is_err());
    }

    #[test]
    fn test_from_segments_rejects_separator() {
        assert!(FieldPath::from_segments(["a", "b.c"]).is_err());
        assert!(FieldPath::from_segments(Vec::<String>::new()).is_err());
        assert!(FieldPath::single("a.b").is_err());
    }

    #[test]
    fn test_parent_and_prefixes() {
        let p = path("a.b.c");
        assert_eq!(p.parent(), Some(path("a.b")));
        assert_eq!(path("a").parent(), None);
        let prefixes: Vec<String> = p.prefixes().map(|p| p.to_string()).collect();
        assert_eq!(prefixes, vec!["a", "a.b", "a.b.c"]);
    }

    #[test]
    fn test_strip_prefix_requires_strict_ancestor() {
        let p = path("a.b.c");
        assert_eq!(p.strip_prefix(&path("a")), Some(path("b.c")));
        assert_eq!(p.strip_prefix(&path("a.b.c")), None);
        assert_eq!(p.strip_prefix(&path("x")), None);
        // Segment-wise, not string-wise.
        assert!(!path("ab.c").starts_with(&path("a")));
    }

    #[test]
    fn test_join_under_root() {
        let rel = path("c");
        assert_eq!(FieldPath::join_under(None, &rel), path("c"));
        assert_eq!(FieldPath::join_under(Some(&path("a.b")), &rel), path("a.b.c"));
    }

    #[test]
    fn test_serde_as_string() {
        let p = path("a.b");
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"a.b\"");
        let parsed: FieldPath = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, p);
        assert!(serde_json::from_str::<FieldPath>("\"a..b\"").is_err());
    }

    proptest! {
        #[test]
        fn test_display_parse_roundtrip(segments in prop::collection::vec("[a-z_][a-z0-9_]{0,8}", 1..6)) {
            let p = FieldPath::from_segments(segments.clone()).unwrap();
            let reparsed = FieldPath::parse(&p.to_string()).unwrap();
            prop_assert_eq!(reparsed.segments(), segments.as_slice());
        }

        #[test]
        fn test_parse_never_panics(raw in ".{0,40}") {
            let _ = FieldPath::parse(&raw);
        }
    }
}
