use crate::pos::LinePos;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxError {
    /// The parser reported an edit with both or neither of its result fields.
    #[error("Malformed edit result: {0}")]
    MalformedEditResult(String),
    #[error("Position {0} is outside the document")]
    PositionOutOfRange(LinePos),
}
