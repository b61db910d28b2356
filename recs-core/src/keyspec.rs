//! KeySpec parsing
//!
//! A KeySpec is a compact path into a nested JSON record:
//!
//! - `foo/bar` descends into nested objects
//! - `#N` selects an array element
//! - a leading `@` enables fuzzy key matching
//! - `\/` is a literal slash inside a key name
//!
//! Segments are not interpreted here; index vs. key resolution happens in
//! [`crate::resolve`].

use smallvec::SmallVec;
use std::fmt;

/// Inline capacity for segments; most paths are shallow.
pub type Segments = SmallVec<[String; 4]>;

/// A parsed key specification
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeySpec {
    segments: Segments,
    fuzzy: bool,
}

impl KeySpec {
    /// Parse a KeySpec string. Parsing never fails.
    pub fn parse(spec: &str) -> Self {
        let (fuzzy, raw) = match spec.strip_prefix('@') {
            Some(rest) => (true, rest),
            None => (false, spec),
        };

        let mut segments = Segments::new();
        let mut current = String::new();
        let mut last_char: Option<char> = None;

        for ch in raw.chars() {
            if ch == '/' {
                if last_char != Some('\\') {
                    segments.push(std::mem::take(&mut current));
                    last_char = None;
                    continue;
                }
                // Escaped slash: drop the backslash, keep the slash.
                current.pop();
            }
            current.push(ch);
            last_char = Some(ch);
        }

        if !current.is_empty() {
            segments.push(current);
        }

        Self { segments, fuzzy }
    }

    /// Build a KeySpec from already-split segments.
    pub fn from_segments<I, S>(segments: I, fuzzy: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
            fuzzy,
        }
    }

    /// Parsed segments in left-to-right order
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether fuzzy key matching is enabled
    pub fn is_fuzzy(&self) -> bool {
        self.fuzzy
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True when the spec addresses the whole record
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl From<&str> for KeySpec {
    fn from(spec: &str) -> Self {
        Self::parse(spec)
    }
}

impl fmt::Display for KeySpec {
    /// Renders the spec back into its string form, escaping slashes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fuzzy {
            f.write_str("@")?;
        }
        for (idx, segment) in self.segments.iter().enumerate() {
            if idx > 0 {
                f.write_str("/")?;
            }
            f.write_str(&segment.replace('/', "\\/"))?;
        }
        Ok(())
    }
}
