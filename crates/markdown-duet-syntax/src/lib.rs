//! # markdown-duet-syntax
//!
//! The markdown side of markdown-duet: a syntax tree whose every node knows
//! its exact `(line, column)` span in the source, and a parser adapter that
//! reports what each edit changed.
//!
//! ## Pieces
//!
//! - [`pos`]: [`LinePos`] / [`SourcePos`] coordinates and byte offset
//!   conversion.
//! - [`node`]: the [`MarkdownTree`] arena. Nodes are linked through
//!   [`NodeId`] indices (`parent`, `first_child`, `next`, ...) and walked
//!   depth-first with entering/leaving events.
//! - [`parser`]: the [`MarkdownParser`] interface and [`CmarkParser`], which
//!   keeps the text in an `xi-rope` buffer and reparses it with
//!   pulldown-cmark after each edit.
//! - [`edit`]: [`EditResult`], the added-or-removed answer to an edit.
//!
//! ## Quick start
//!
//! ```
//! use markdown_duet_syntax::{CmarkParser, EditResult, LinePos, MarkdownParser, MdKind};
//!
//! let mut parser = CmarkParser::new("# Hi\n\nsome text\n");
//! let heading = parser.find_first_node_at_line(1).unwrap();
//! assert!(matches!(parser.tree().node(heading).kind, MdKind::Heading { level: 1, .. }));
//!
//! let result = parser.edit_markdown(LinePos::new(3, 1), LinePos::new(3, 1), "more ");
//! assert!(matches!(result, EditResult::Added { .. }));
//! ```

pub mod edit;
pub mod error;
pub mod node;
pub mod parser;
pub mod pos;

pub use edit::{EditResult, RawEditResult, RemovedNodeRange};
pub use error::SyntaxError;
pub use node::{
    Align, CodeBlockData, LinkData, ListData, MarkdownNode, MarkdownTree, MdKind, NodeId,
    WalkEvent, Walker,
};
pub use parser::{CmarkParser, MarkdownParser, parse, split_lines};
pub use pos::{LineIndex, LinePos, SourcePos};
