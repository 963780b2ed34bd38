//! Source positions carried on method-body elements.
//!
//! Positions survive from the Java front end into dex debug info; the merge
//! optimizer only ever compares them for equality and tests for the unknown
//! sentinel, so a line/column pair is all we keep.

use std::fmt;

/// A 1-based line/column position. `UNKNOWN` (line 0) marks elements that
/// lost their position, typically compiler-synthesized code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

impl SourcePosition {
    pub const UNKNOWN: SourcePosition = SourcePosition { line: 0, column: 0 };

    pub fn new(line: u32, column: u32) -> Self {
        SourcePosition { line, column }
    }

    #[inline]
    pub fn is_unknown(self) -> bool {
        self.line == 0
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            write!(f, "<unknown>")
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sentinel() {
        assert!(SourcePosition::UNKNOWN.is_unknown());
        assert!(!SourcePosition::new(1, 1).is_unknown());
        assert_eq!(format!("{}", SourcePosition::new(12, 4)), "12:4");
        assert_eq!(format!("{}", SourcePosition::UNKNOWN), "<unknown>");
    }
}
