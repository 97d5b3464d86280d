//! Path parsing.
//!
//! A path is `segment(.segment)*` where every segment may carry one or more
//! `[n]` index suffixes, so `a.b[0].c` and `a.b.0.c` address the same
//! location. All-digit segments parse as indexes either way.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::str::FromStr;

use crate::error::{PathError, Result};

/// One step into a value tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Mapping key
    Key(String),
    /// Sequence position (also accepted as a mapping key)
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => f.write_str(key),
            Segment::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A parsed path that remembers where each segment sits in its source text.
///
/// Equality and hashing only look at the segments, so `a[0]` equals `a.0`.
#[derive(Debug, Clone)]
pub struct Path {
    raw: String,
    segments: Vec<Segment>,
    spans: Vec<Range<usize>>,
}

/// The index segment that directly follows a prefix inside a longer path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildIndex {
    pub index: usize,
    span: Range<usize>,
}

impl Path {
    /// The empty path, addressing the root itself.
    pub fn root() -> Self {
        Self {
            raw: String::new(),
            segments: Vec::new(),
            spans: Vec::new(),
        }
    }

    /// Parse a path string.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Ok(Self::root());
        }

        let mut segments = Vec::new();
        let mut spans = Vec::new();
        let mut offset = 0;
        for part in raw.split('.') {
            parse_part(raw, part, offset, &mut segments, &mut spans)?;
            offset += part.len() + 1;
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
            spans,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// If this path continues `prefix` with an index segment, return that index.
    ///
    /// `list.2.name` and `list[2].name` both yield index 2 for prefix `list`.
    pub fn index_after(&self, prefix: &Path) -> Option<ChildIndex> {
        let at = prefix.len();
        if self.segments.len() <= at || !self.segments.starts_with(&prefix.segments) {
            return None;
        }
        match self.segments[at] {
            Segment::Index(index) => Some(ChildIndex {
                index,
                span: self.spans[at].clone(),
            }),
            Segment::Key(_) => None,
        }
    }

    /// Rewrite the source text with a different index at `child`, keeping the
    /// caller's spelling (dots or brackets) and any suffix.
    pub fn with_index(&self, child: &ChildIndex, index: usize) -> String {
        format!(
            "{}{}{}",
            &self.raw[..child.span.start],
            index,
            &self.raw[child.span.end..]
        )
    }
}

fn parse_part(
    raw: &str,
    part: &str,
    offset: usize,
    segments: &mut Vec<Segment>,
    spans: &mut Vec<Range<usize>>,
) -> Result<()> {
    let key_end = part.find('[').unwrap_or(part.len());
    let key = &part[..key_end];
    if key.is_empty() {
        return Err(PathError::malformed(raw, "empty segment"));
    }
    if key.contains(']') {
        return Err(PathError::malformed(raw, "unmatched ']'"));
    }
    segments.push(key_segment(raw, key)?);
    spans.push(offset..offset + key_end);

    let mut rest = &part[key_end..];
    let mut pos = offset + key_end;
    while !rest.is_empty() {
        let Some(inner) = rest.strip_prefix('[') else {
            return Err(PathError::malformed(
                raw,
                format!("unexpected '{rest}' after index"),
            ));
        };
        let close = inner
            .find(']')
            .ok_or_else(|| PathError::malformed(raw, "unclosed '['"))?;
        segments.push(Segment::Index(parse_index(raw, &inner[..close])?));
        spans.push(pos + 1..pos + 1 + close);
        rest = &inner[close + 1..];
        pos += close + 2;
    }
    Ok(())
}

fn key_segment(raw: &str, key: &str) -> Result<Segment> {
    if key.bytes().all(|b| b.is_ascii_digit()) {
        Ok(Segment::Index(parse_index(raw, key)?))
    } else {
        Ok(Segment::Key(key.to_string()))
    }
}

fn parse_index(raw: &str, digits: &str) -> Result<usize> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PathError::malformed(
            raw,
            format!("index '{digits}' is not a non-negative integer"),
        ));
    }
    digits
        .parse()
        .map_err(|_| PathError::malformed(raw, format!("index '{digits}' is out of range")))
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for Path {}

impl Hash for Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
