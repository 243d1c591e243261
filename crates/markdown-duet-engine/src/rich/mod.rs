//! The rich document model.

pub mod line_doc;
pub mod mark;
pub mod node;
pub mod resolve;
pub mod transaction;

pub use line_doc::LineDocument;
pub use mark::{CodePart, Mark, MarkKind, SyntaxMark};
pub use node::{
    BackgroundKind, CellAlign, CellAttrs, HeadingType, LineBackground, NodeKey, NodeKind, Offset,
    RawHtml, RichNode,
};
pub use resolve::ResolvedPos;
pub use transaction::{DocTransaction, Transaction};
