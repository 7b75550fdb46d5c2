//! Source file spans and locations

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A unique identifier for a source file
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct FileId(pub u32);

impl FileId {
    /// Create a new file id
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

/// A byte offset span in a source file
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Start byte offset (inclusive)
    pub start: u32,
    /// End byte offset (exclusive)
    pub end: u32,
}

impl Span {
    /// Create a new span
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Empty span at a single offset
    pub fn point(offset: u32) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    /// The smallest span covering both `self` and `other`
    pub fn to(self, other: Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// The span as a usize range
    pub fn range(&self) -> Range<usize> {
        self.start as usize..self.end as usize
    }

    /// Length in bytes
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    /// Whether the span covers no bytes
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A span with associated file
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct FileSpan {
    /// The file the span belongs to
    pub file: FileId,
    /// The span within the file
    pub span: Span,
}

impl FileSpan {
    /// Create a new file span
    pub fn new(file: FileId, span: Span) -> Self {
        Self { file, span }
    }

    /// The span as a usize range
    pub fn range(&self) -> Range<usize> {
        self.span.range()
    }
}
