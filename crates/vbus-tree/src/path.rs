//! Path grammar for the node tree.
//!
//! A path is an ordered list of segments addressing a node, attribute, or
//! method from the tree root. The textual form joins segments with `.`, the
//! bus convention. `/` is accepted as an alternative separator when parsing
//! so that HTTP-style paths (`status/hour`) address the same entity.
//!
//! Valid segments:
//! - Must be non-empty
//! - Must not contain `.` or `/`
//! - Must not contain whitespace or control characters
//! - Must not be the wildcard `*`

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TreeError};

/// Separator used when rendering paths.
pub const SEPARATOR: char = '.';

/// Wildcard segment reserved for subscriptions; never a valid name.
pub const WILDCARD: &str = "*";

/// Validate a single segment name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use vbus_tree::path::validate_segment;
///
/// assert!(validate_segment("hour").is_ok());
/// assert!(validate_segment("").is_err());
/// assert!(validate_segment("a.b").is_err());
/// ```
pub fn validate_segment(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TreeError::invalid(name, "segment must not be empty"));
    }
    if name == WILDCARD {
        return Err(TreeError::invalid(name, "wildcard is not a valid name"));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| *c == '.' || *c == '/' || c.is_whitespace() || c.is_control())
    {
        return Err(TreeError::invalid(
            name,
            format!("contains forbidden character: {ch:?}"),
        ));
    }
    Ok(())
}

/// An ordered sequence of validated segment names.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// The root path (no segments).
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a textual path. The empty string is the root.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Ok(Self::root());
        }
        let mut segments = Vec::new();
        for segment in raw.split(['.', '/']) {
            validate_segment(segment).map_err(|e| match e {
                TreeError::InvalidPath { reason, .. } => TreeError::invalid(raw, reason),
                other => other,
            })?;
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    /// Build a path from already separated segments, validating each.
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut path = Self::root();
        for segment in segments {
            path = path.join(segment)?;
        }
        Ok(path)
    }

    /// Append a segment, returning the child path.
    pub fn join(&self, segment: impl Into<String>) -> Result<Self> {
        let segment = segment.into();
        validate_segment(&segment)?;
        let mut segments = self.segments.clone();
        segments.push(segment);
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The last segment, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The enclosing path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        self.split_last().map(|(parent, _)| parent)
    }

    /// Split into `(parent, name)`, or `None` for the root.
    pub fn split_last(&self) -> Option<(Self, String)> {
        let (last, rest) = self.segments.split_last()?;
        Some((
            Self {
                segments: rest.to_vec(),
            },
            last.clone(),
        ))
    }

    /// Returns `true` if `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                write!(f, "{SEPARATOR}")?;
            }
            f.write_str(segment)?;
            first = false;
        }
        Ok(())
    }
}

impl std::str::FromStr for Path {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Path {
    type Error = TreeError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Path {
    type Error = TreeError;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_dotted_and_slashed() {
        let dotted = Path::parse("status.hour").unwrap();
        let slashed = Path::parse("status/hour").unwrap();
        assert_eq!(dotted, slashed);
        assert_eq!(dotted.segments(), ["status", "hour"]);
        assert_eq!(dotted.to_string(), "status.hour");
    }

    #[test]
    fn empty_string_is_root() {
        let root = Path::parse("").unwrap();
        assert!(root.is_root());
        assert_eq!(root.name(), None);
        assert!(root.parent().is_none());
        assert_eq!(root.to_string(), "");
    }

    #[test]
    fn reject_empty_segments() {
        assert!(Path::parse(".status").is_err());
        assert!(Path::parse("status.").is_err());
        assert!(Path::parse("status..hour").is_err());
        assert!(Path::parse("status//hour").is_err());
    }

    #[test]
    fn reject_wildcard_and_whitespace() {
        assert!(Path::parse("status.*").is_err());
        assert!(Path::parse("has space").is_err());
        assert!(Path::parse("tab\there").is_err());
    }

    #[test]
    fn invalid_path_error_reports_full_path() {
        match Path::parse("a..b") {
            Err(TreeError::InvalidPath { path, .. }) => assert_eq!(path, "a..b"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn split_and_join() {
        let path = Path::parse("system.info.status").unwrap();
        let (parent, name) = path.split_last().unwrap();
        assert_eq!(parent.to_string(), "system.info");
        assert_eq!(name, "status");
        assert_eq!(parent.join(name).unwrap(), path);
        assert!(path.starts_with(&parent));
        assert!(!parent.starts_with(&path));
    }

    #[test]
    fn join_rejects_separator() {
        assert!(Path::root().join("a.b").is_err());
        assert!(Path::from_segments(["a", "b/c"]).is_err());
    }

    #[test]
    fn serde_uses_text_form() {
        let path = Path::parse("status.hour").unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"status.hour\"");
        let back: Path = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
        assert!(serde_json::from_str::<Path>("\"bad..path\"").is_err());
    }

    proptest! {
        #[test]
        fn display_then_parse_is_identity(segs in proptest::collection::vec("[a-zA-Z0-9_-]{1,8}", 0..6)) {
            let path = Path::from_segments(segs.clone()).unwrap();
            let reparsed = Path::parse(&path.to_string()).unwrap();
            prop_assert_eq!(reparsed.segments(), segs.as_slice());
        }

        #[test]
        fn segments_never_contain_separators(raw in "[a-z./ ]{0,16}") {
            if let Ok(path) = Path::parse(&raw) {
                for seg in path.segments() {
                    prop_assert!(!seg.is_empty());
                    prop_assert!(!seg.contains('.') && !seg.contains('/') && !seg.contains(' '));
                }
            }
        }
    }
}
