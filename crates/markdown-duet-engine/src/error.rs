use markdown_duet_syntax::SyntaxError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Position {offset} is outside the document (size {size})")]
    PositionOutOfRange { offset: usize, size: usize },

    #[error("No builder or writer for node type {0}")]
    UnknownNodeType(String),

    #[error("Table index for the table at {0} is stale")]
    StaleTableGeometry(usize),

    #[error(transparent)]
    MalformedEditResult(#[from] SyntaxError),

    #[error("Cannot replace {from}..{to}: {reason}")]
    InvalidReplace {
        from: usize,
        to: usize,
        reason: String,
    },

    #[error("Invalid widget rule {name}: {source}")]
    InvalidWidgetRule { name: String, source: regex::Error },
}

/// Refusals from table editing commands.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("Selection is not inside a table")]
    NotInTable,

    #[error("Cell at row {row}, column {col} is merged across the edited rows or columns")]
    MergedCell { row: usize, col: usize },

    #[error("The header row cannot be removed or preceded by a row")]
    HeaderRow,

    #[error("Cannot remove every column of a table")]
    WholeTable,

    #[error(transparent)]
    Engine(#[from] EngineError),
}
