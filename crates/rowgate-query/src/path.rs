//! Aliases and property paths.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::ParseError;

/// An identification variable.
///
/// Compared case-insensitively; the original spelling is kept for printing.
#[derive(Debug, Clone, Eq)]
pub struct Alias(String);

impl Alias {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this alias names `name`, ignoring case.
    pub fn matches(&self, name: &str) -> bool {
        self.0.eq_ignore_ascii_case(name)
    }
}

impl PartialEq for Alias {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Hash for Alias {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Alias {
    fn from(name: &str) -> Self {
        Alias::new(name)
    }
}

/// A root alias followed by zero or more property names: `c.owner.name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    root: Alias,
    segments: Vec<String>,
}

impl Path {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: Alias::new(root),
            segments: Vec::new(),
        }
    }

    pub fn from_parts<I, S>(root: Alias, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            root,
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn root_alias(&self) -> &Alias {
        &self.root
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn has_subpath(&self) -> bool {
        !self.segments.is_empty()
    }

    pub fn last_segment(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// This path extended by one property.
    pub fn append(&self, segment: impl Into<String>) -> Path {
        let mut path = self.clone();
        path.segments.push(segment.into());
        path
    }

    /// The root and the first `len` segments.
    pub fn prefix(&self, len: usize) -> Path {
        Path {
            root: self.root.clone(),
            segments: self.segments[..len.min(self.segments.len())].to_vec(),
        }
    }

    /// This path without its last segment.
    pub fn parent(&self) -> Option<Path> {
        if self.segments.is_empty() {
            None
        } else {
            Some(self.prefix(self.segments.len() - 1))
        }
    }

    /// Substitute the root alias by `replacement`: replacing `c` in `c.owner`
    /// by `x.contact` gives `x.contact.owner`.
    pub fn replace_root(&self, replacement: &Path) -> Path {
        let mut segments = replacement.segments.clone();
        segments.extend(self.segments.iter().cloned());
        Path {
            root: replacement.root.clone(),
            segments,
        }
    }

    /// Whether `other` is this path or one of its prefixes.
    pub fn starts_with(&self, other: &Path) -> bool {
        self.root == other.root
            && self.segments.len() >= other.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }

    pub fn set_root(&mut self, root: Alias) {
        self.root = root;
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for segment in &self.segments {
            write!(f, ".{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut offset = 0;
        let mut parts = Vec::new();
        for part in s.split('.') {
            let valid = part
                .chars()
                .next()
                .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
                && part
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '$');
            if !valid {
                return Err(ParseError::at(s, offset, format!("invalid path '{s}'")));
            }
            parts.push(part);
            offset += part.len() + 1;
        }
        let (root, segments) = parts
            .split_first()
            .ok_or_else(|| ParseError::at(s, 0, "empty path"))?;
        Ok(Path::from_parts(Alias::new(*root), segments.iter().copied()))
    }
}
