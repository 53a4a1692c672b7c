//! Error types for the query language.

use thiserror::Error;

/// A syntax error with its location in the source text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at line {line}, column {column}")]
pub struct ParseError {
    pub message: String,
    /// Byte offset into the source.
    pub position: usize,
    /// 1-based line.
    pub line: usize,
    /// 1-based column, in characters.
    pub column: usize,
}

impl ParseError {
    /// Build an error at `position` in `source`.
    pub fn at(source: &str, position: usize, message: impl Into<String>) -> Self {
        let position = position.min(source.len());
        let before = source.get(..position).unwrap_or(source);
        let line = before.matches('\n').count() + 1;
        let column = match before.rfind('\n') {
            Some(newline) => before[newline + 1..].chars().count() + 1,
            None => before.chars().count() + 1,
        };
        Self {
            message: message.into(),
            position,
            line,
            column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_and_column() {
        let source = "SELECT c\nFROM Contact c\nWHERE ?";
        let position = source.find('?').unwrap();
        let error = ParseError::at(source, position, "unexpected token");
        assert_eq!(error.line, 3);
        assert_eq!(error.column, 7);
        assert_eq!(error.to_string(), "unexpected token at line 3, column 7");
    }
}
