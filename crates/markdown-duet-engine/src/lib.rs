//! # markdown-duet-engine
//!
//! The editing core behind a dual-mode markdown editor: the same document is
//! edited either as markdown source (one `line` block per source line) or as
//! a rich tree of typed blocks and marked text.
//!
//! - [`rich`]: the rich document model with position addressing and the
//!   [`Transaction`] interface edits go through.
//! - [`convert`]: [`Convertor`] turns a markdown syntax tree into a rich tree
//!   and writes rich trees back out as markdown.
//! - [`position`]: cursor positions between markdown `(line, column)` and
//!   line-document offsets.
//! - [`table`]: cell geometry of rich tables and the table editing commands
//!   built on it.
//! - [`annotate`]: incremental syntax highlighting of the line document
//!   driven by the parser's edit results.

pub mod annotate;
pub mod convert;
pub mod error;
pub mod position;
pub mod rich;
pub mod table;

pub use annotate::{PendingBackgrounds, annotate, annotate_document, annotate_raw};
pub use convert::{Convertor, HtmlFallback, MarkdownStyle, PreserveHtml, WidgetRules};
pub use error::{EngineError, TableError};
pub use position::{PositionMapper, map_markdown_pos_to_rich_offset, map_rich_offset_to_markdown_pos};
pub use rich::{DocTransaction, LineDocument, Mark, MarkKind, NodeKind, Offset, RichNode, Transaction};
pub use table::{TableIndexCache, TableOffsetIndex};
