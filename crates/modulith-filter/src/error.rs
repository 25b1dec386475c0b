//! Filter parse errors.
//!
//! Every malformed filter string is reported through [`FilterError`], which
//! distinguishes the four failure classes callers are expected to handle
//! differently: an empty query, trailing garbage after a complete expression,
//! premature end of input, and plain syntax errors.  Parse errors always
//! propagate to the caller; the parser never silently recovers.

/// Errors raised while parsing a filter expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    /// The filter string was empty (or all whitespace).
    #[error("empty filter expression")]
    Empty,

    /// A complete expression was parsed but input remained.
    #[error("extraneous trailing characters at `{remainder}`")]
    TrailingCharacters {
        /// The unconsumed tail of the filter string.
        remainder: String,
    },

    /// The filter string ended in the middle of an expression.
    #[error("filter ended abruptly")]
    UnexpectedEnd,

    /// Malformed syntax: a bad operator, missing attribute, missing value,
    /// or misplaced parenthesis.
    #[error("{reason} at position {pos}")]
    Syntax {
        /// Byte offset into the filter string where parsing failed.
        pos: usize,
        /// What the parser expected to find.
        reason: String,
    },
}

/// Convenience alias for filter parsing results.
pub type Result<T> = std::result::Result<T, FilterError>;
