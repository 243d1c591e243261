//! Rich tree → markdown text.
//!
//! The writer keeps the pending block separation in `closed` and only emits
//! it when the next block starts writing, so blank lines never pile up at the
//! end of the output and nested prefixes (`> `, list indentation) are applied
//! to separator lines too.

use std::sync::OnceLock;

use regex::Regex;

use super::MarkdownStyle;
use super::html::{close_tag, open_tag};
use crate::error::EngineError;
use crate::rich::{CellAlign, HeadingType, Mark, MarkKind, NodeKind, RichNode};
use crate::table::{span_prefix, table_rows};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closed {
    List,
    Block,
}

pub(crate) struct ToMarkdownState<'a> {
    out: String,
    /// Prefix written at the start of every line.
    delim: String,
    closed: Option<Closed>,
    in_tight_list: bool,
    in_table_cell: bool,
    at_block_start: bool,
    style: &'a MarkdownStyle,
}

impl<'a> ToMarkdownState<'a> {
    pub(crate) fn new(style: &'a MarkdownStyle) -> Self {
        Self {
            out: String::new(),
            delim: String::new(),
            closed: None,
            in_tight_list: false,
            in_table_cell: false,
            at_block_start: false,
            style,
        }
    }

    pub(crate) fn finish(self) -> String {
        self.out
    }

    fn at_blank(&self) -> bool {
        self.out.is_empty() || self.out.ends_with('\n')
    }

    /// Emits the separation owed to the last closed block: a line break and
    /// `size - 1` blank lines.
    fn flush_close(&mut self, size: usize) {
        if self.closed.is_none() {
            return;
        }
        if !self.at_blank() {
            self.out.push('\n');
        }
        if size > 1 {
            let blank = self.delim.trim_end().to_string();
            for _ in 1..size {
                self.out.push_str(&blank);
                self.out.push('\n');
            }
        }
        self.closed = None;
    }

    fn ensure_new_line(&mut self) {
        if !self.at_blank() {
            self.out.push('\n');
        }
    }

    fn close_block(&mut self, closed: Closed) {
        self.closed = Some(closed);
    }

    fn write(&mut self, content: &str) {
        self.flush_close(2);
        if !self.delim.is_empty() && self.at_blank() {
            self.out.push_str(&self.delim);
        }
        self.out.push_str(content);
    }

    /// Writes `text` line by line, prefixing each line, escaping when asked.
    fn text(&mut self, text: &str, escape: bool) {
        let lines: Vec<&str> = text.split('\n').collect();
        for (i, line) in lines.iter().enumerate() {
            self.write("");
            if escape {
                let start = self.at_block_start || i > 0;
                self.out.push_str(&escape_text(line, start, self.in_table_cell));
            } else {
                self.out.push_str(line);
            }
            if i + 1 < lines.len() {
                self.out.push('\n');
            }
        }
    }

    fn wrap_block(
        &mut self,
        delim: &str,
        first_delim: Option<&str>,
        closed: Closed,
        f: impl FnOnce(&mut Self),
    ) {
        let old = self.delim.clone();
        self.write(first_delim.unwrap_or(delim));
        self.delim.push_str(delim);
        f(self);
        self.delim = old;
        self.close_block(closed);
    }

    pub(crate) fn render_content(&mut self, parent: &RichNode) {
        for child in parent.content() {
            self.render(child);
        }
    }

    fn render(&mut self, node: &RichNode) {
        match node.kind() {
            NodeKind::Doc => self.render_content(node),
            NodeKind::Line { .. } | NodeKind::Paragraph => {
                self.render_inline(node, true);
                self.close_block(Closed::Block);
            }
            NodeKind::Heading {
                level,
                heading_type: HeadingType::Atx,
            } => {
                self.write(&format!("{} ", "#".repeat(usize::from(*level))));
                self.render_inline(node, false);
                self.close_block(Closed::Block);
            }
            NodeKind::Heading {
                level,
                heading_type: HeadingType::Setext,
            } => {
                self.render_inline(node, true);
                let text = node.text_content();
                let width = text.lines().last().map_or(0, |l| l.chars().count()).max(3);
                let underline = if *level == 1 { "=" } else { "-" };
                self.ensure_new_line();
                self.write(&underline.repeat(width));
                self.close_block(Closed::Block);
            }
            NodeKind::BlockQuote => {
                self.wrap_block("> ", None, Closed::Block, |s| s.render_content(node));
            }
            NodeKind::CodeBlock {
                language,
                fence_char,
                fence_length,
            } => {
                let content = node.text_content();
                let fence = code_fence(&content, *fence_char, *fence_length);
                self.write(&format!("{fence}{language}\n"));
                if !content.is_empty() {
                    self.text(&content, false);
                }
                self.ensure_new_line();
                self.write(&fence);
                self.close_block(Closed::Block);
            }
            NodeKind::BulletList { tight, bullet } => {
                let bullet = match bullet {
                    '-' | '*' | '+' => *bullet,
                    _ => self.style.bullet_char,
                };
                let marker = format!("{bullet} ");
                self.render_list(node, *tight, "  ", |_| marker.clone());
            }
            NodeKind::OrderedList {
                tight,
                order,
                delimiter,
            } => {
                let delimiter = if *delimiter == ')' { ')' } else { '.' };
                let last = order + node.child_count().saturating_sub(1) as u64;
                let width = last.to_string().len();
                let space = " ".repeat(width + 2);
                let order = *order;
                self.render_list(node, *tight, &space, |i| {
                    format!("{:>width$}{delimiter} ", order + i as u64)
                });
            }
            NodeKind::ListItem { task, checked } => {
                if *task {
                    self.write(if *checked { "[x] " } else { "[ ] " });
                }
                self.render_content(node);
            }
            NodeKind::Table => self.render_table(node),
            NodeKind::ThematicBreak => {
                let rule = self.style.thematic_break.clone();
                self.write(&rule);
                self.close_block(Closed::Block);
            }
            NodeKind::FrontMatter => self.render_fenced("---", "---", node),
            NodeKind::CustomBlock { info } => {
                self.render_fenced(&format!("$${info}"), "$$", node);
            }
            NodeKind::HtmlBlock { html } | NodeKind::HtmlComment { html } => {
                self.text(html, false);
                self.close_block(Closed::Block);
            }
            NodeKind::TableHead
            | NodeKind::TableBody
            | NodeKind::TableRow
            | NodeKind::TableHeadCell(_)
            | NodeKind::TableBodyCell(_) => {
                log::warn!("{} outside a table; writing its text", node.kind().name());
                self.text(&node.text_content(), true);
                self.close_block(Closed::Block);
            }
            NodeKind::Unknown { type_name } => {
                log::warn!("{}", EngineError::UnknownNodeType(type_name.clone()));
                self.text(&node.text_content(), false);
                self.close_block(Closed::Block);
            }
            kind if kind.is_inline() => {
                // Stray inline content: give it a paragraph of its own.
                let para = RichNode::new(NodeKind::Paragraph, vec![node.clone()]);
                self.render(&para);
            }
            _ => self.render_content(node),
        }
    }

    fn render_fenced(&mut self, open: &str, close: &str, node: &RichNode) {
        self.write(&format!("{open}\n"));
        let content = node.text_content();
        if !content.is_empty() {
            self.text(&content, false);
        }
        self.ensure_new_line();
        self.write(close);
        self.close_block(Closed::Block);
    }

    fn render_list(
        &mut self,
        node: &RichNode,
        tight: bool,
        delim: &str,
        marker: impl Fn(usize) -> String,
    ) {
        if self.closed == Some(Closed::List) {
            self.flush_close(2);
        } else if self.in_tight_list {
            self.flush_close(1);
        }
        let prev_tight = self.in_tight_list;
        self.in_tight_list = tight;
        for (i, item) in node.content().iter().enumerate() {
            if i > 0 && tight {
                self.flush_close(1);
            }
            let first = marker(i);
            self.wrap_block(delim, Some(&first), Closed::List, |s| s.render(item));
        }
        self.in_tight_list = prev_tight;
    }

    fn render_table(&mut self, table: &RichNode) {
        let rows = table_rows(table);
        let mut lines = Vec::with_capacity(rows.len() + 1);
        for (i, (_, row)) in rows.iter().enumerate() {
            let mut line = String::from("|");
            for cell in row.content() {
                let attrs = cell.kind().cell_attrs().unwrap_or_default();
                let text = self.cell_text(cell);
                line.push_str(&format!(" {}{text} |", span_prefix(&attrs)));
            }
            lines.push(line);
            if i == 0 {
                lines.push(delimiter_row(row));
            }
        }
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                self.ensure_new_line();
            }
            self.write(line);
        }
        self.close_block(Closed::Block);
    }

    fn cell_text(&self, cell: &RichNode) -> String {
        let mut sub = ToMarkdownState::new(self.style);
        sub.in_table_cell = true;
        sub.render_inline(cell, false);
        sub.out.replace('\n', " ")
    }

    /// Writes the inline content of a text block, opening and closing marks
    /// as the runs change.
    fn render_inline(&mut self, parent: &RichNode, from_block_start: bool) {
        self.at_block_start = from_block_start;
        let children = parent.content();
        let mut active: Vec<Mark> = Vec::new();
        let mut trailing = String::new();

        for index in 0..=children.len() {
            let mut node = children.get(index);
            let mut marks = node.map_or_else(Vec::new, |n| writable_marks(n.marks()));
            // A break right before a mark ends would end up outside of it.
            if let Some(n) = node
                && n.kind() == &NodeKind::HardBreak
            {
                let next = children.get(index + 1);
                marks.retain(|m| {
                    next.is_some_and(|next| {
                        m.is_in_set(next.marks())
                            && next.text_str().is_none_or(|t| t.contains(|c: char| !c.is_whitespace()))
                    })
                });
            }

            let mut leading = std::mem::take(&mut trailing);
            let mut text = node.and_then(RichNode::text_str).map(str::to_string);

            if let Some(t) = text.clone()
                && marks.iter().any(|m| expels_whitespace(m) && !m.is_in_set(&active))
            {
                let rest = t.trim_start();
                let lead = &t[..t.len() - rest.len()];
                if !lead.is_empty() {
                    leading.push_str(lead);
                    if rest.is_empty() {
                        node = None;
                        text = None;
                        marks = active.clone();
                    } else {
                        text = Some(rest.to_string());
                    }
                }
            }
            if let Some(t) = text.clone()
                && marks.iter().any(|m| {
                    expels_whitespace(m)
                        && children
                            .get(index + 1)
                            .is_none_or(|next| !m.is_in_set(next.marks()))
                })
            {
                let rest = t.trim_end();
                let trail = &t[rest.len()..];
                if !trail.is_empty() {
                    trailing = trail.to_string();
                    if rest.is_empty() {
                        node = None;
                        text = None;
                        marks = active.clone();
                    } else {
                        text = Some(rest.to_string());
                    }
                }
            }

            let inner_code = marks
                .last()
                .filter(|m| m.kind == MarkKind::Code && m.html.is_none())
                .cloned();
            let len = marks.len() - usize::from(inner_code.is_some());
            let mut marks: Vec<Mark> = marks[..len].to_vec();
            reorder_mixable(&mut marks, &active);

            let mut keep = 0;
            while keep < active.len().min(len) && marks[keep] == active[keep] {
                keep += 1;
            }
            while keep < active.len() {
                if let Some(mark) = active.pop() {
                    let close = self.mark_string(&mark, false);
                    self.text(&close, false);
                }
            }
            if !leading.is_empty() {
                self.text(&leading, true);
            }

            let Some(node) = node else {
                continue;
            };
            while active.len() < len {
                let add = marks[active.len()].clone();
                let open = self.mark_string(&add, true);
                active.push(add);
                self.text(&open, false);
                self.at_block_start = false;
            }
            match (&inner_code, &text) {
                (Some(_), Some(t)) => {
                    let (open, close) = code_ticks(t);
                    self.text(&format!("{open}{t}{close}"), false);
                }
                (None, Some(t)) => self.text(t, true),
                _ => self.render_inline_node(node, &children[index + 1..]),
            }
            self.at_block_start = false;
        }
        self.at_block_start = false;
    }

    fn render_inline_node(&mut self, node: &RichNode, following: &[RichNode]) {
        match node.kind() {
            NodeKind::HardBreak => {
                if following.iter().all(|n| n.kind() == &NodeKind::HardBreak) {
                    return;
                }
                match node.html() {
                    Some(raw) => self.write(&open_tag(raw)),
                    None if self.in_table_cell => self.write("<br>"),
                    None => self.write("\\\n"),
                }
            }
            NodeKind::Image {
                image_url,
                alt_text,
                title,
            } => {
                if let Some(raw) = node.html() {
                    self.write(&open_tag(raw));
                    return;
                }
                let alt = escape_text(alt_text, false, self.in_table_cell);
                let url = escape_url(image_url);
                let title = title
                    .as_deref()
                    .map(|t| format!(" \"{}\"", t.replace('"', "\\\"")))
                    .unwrap_or_default();
                self.write(&format!("![{alt}]({url}{title})"));
            }
            NodeKind::HtmlInline { html } => self.text(html, false),
            NodeKind::Widget { .. } => self.text(&node.text_content(), false),
            NodeKind::Text { text } => self.text(text, true),
            _ => {
                log::warn!("{} inside inline content; writing its text", node.kind().name());
                self.text(&node.text_content(), false);
            }
        }
    }

    fn mark_string(&self, mark: &Mark, open: bool) -> String {
        if let Some(raw) = &mark.html {
            return if open { open_tag(raw) } else { close_tag(raw) };
        }
        match &mark.kind {
            MarkKind::Emph => "*".to_string(),
            MarkKind::Strong => "**".to_string(),
            MarkKind::Strike => "~~".to_string(),
            MarkKind::Link { url, title } => {
                if open {
                    return "[".to_string();
                }
                let title = title
                    .as_deref()
                    .map(|t| format!(" \"{}\"", t.replace('"', "\\\"")))
                    .unwrap_or_default();
                format!("]({}{title})", escape_url(url))
            }
            MarkKind::Span => (if open { "<span>" } else { "</span>" }).to_string(),
            MarkKind::Code => "`".to_string(),
            MarkKind::Syntax(_) => String::new(),
        }
    }
}

/// Marks that produce markdown; highlighting marks are dropped.
fn writable_marks(marks: &[Mark]) -> Vec<Mark> {
    marks.iter().filter(|m| !m.kind.is_syntax()).cloned().collect()
}

fn is_mixable(mark: &Mark) -> bool {
    mark.html.is_none() && matches!(mark.kind, MarkKind::Emph | MarkKind::Strong | MarkKind::Strike)
}

fn expels_whitespace(mark: &Mark) -> bool {
    is_mixable(mark)
}

/// Reorders leading mixable marks to follow the order they were opened in,
/// so runs that share them don't close and reopen delimiters.
fn reorder_mixable(marks: &mut Vec<Mark>, active: &[Mark]) {
    let len = marks.len();
    'outer: for i in 0..len {
        if !is_mixable(&marks[i]) {
            break;
        }
        for (j, other) in active.iter().enumerate() {
            if !is_mixable(other) {
                break;
            }
            if marks[i] == *other {
                if i > j {
                    let mark = marks.remove(i);
                    marks.insert(j, mark);
                } else if j > i {
                    let mark = marks.remove(i);
                    marks.insert(j - 1, mark);
                }
                continue 'outer;
            }
        }
    }
}

fn longest_run(text: &str, ch: char) -> usize {
    let (mut best, mut run) = (0, 0);
    for c in text.chars() {
        if c == ch {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best
}

/// Opening and closing delimiters for a code span: one backtick more than
/// the longest run inside, padded with a space when the content has any.
pub(crate) fn code_ticks(text: &str) -> (String, String) {
    let longest = longest_run(text, '`');
    let ticks = "`".repeat(longest + 1);
    if longest > 0 {
        (format!("{ticks} "), format!(" {ticks}"))
    } else {
        (ticks.clone(), ticks)
    }
}

/// Fence long enough that no line of `content` can close it.
fn code_fence(content: &str, fence_char: char, fence_length: usize) -> String {
    let fence_char = if fence_char == '~' { '~' } else { '`' };
    let inner = content
        .lines()
        .map(|line| {
            let line = line.trim_start();
            line.chars().take_while(|c| *c == fence_char).count()
        })
        .max()
        .unwrap_or(0);
    let len = fence_length.max(3).max(if inner >= 3 { inner + 1 } else { 0 });
    fence_char.to_string().repeat(len)
}

fn delimiter_row(head: &RichNode) -> String {
    let mut line = String::from("|");
    for cell in head.content() {
        let attrs = cell.kind().cell_attrs().unwrap_or_default();
        let marker = match attrs.align {
            CellAlign::None => "---",
            CellAlign::Left => ":---",
            CellAlign::Center => ":---:",
            CellAlign::Right => "---:",
        };
        for _ in 0..attrs.colspan.max(1) {
            line.push_str(&format!(" {marker} |"));
        }
    }
    line
}

fn escape_url(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    for c in url.chars() {
        if matches!(c, '(' | ')' | '"') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn entity_regex() -> &'static Regex {
    static ENTITY: OnceLock<Regex> = OnceLock::new();
    ENTITY.get_or_init(|| {
        Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z][A-Za-z0-9]*);")
            .expect("Invalid entity regex")
    })
}

fn line_start_regexes() -> &'static [(Regex, &'static str); 3] {
    static LINE_START: OnceLock<[(Regex, &'static str); 3]> = OnceLock::new();
    LINE_START.get_or_init(|| {
        [
            (
                Regex::new(r"^(\+ |[-*>])").expect("Invalid block marker regex"),
                r"\$0",
            ),
            (
                Regex::new(r"^(\s*)(#{1,6})(\s|$)").expect("Invalid heading marker regex"),
                r"${1}\${2}${3}",
            ),
            (
                Regex::new(r"^(\s*\d+)([.)])(\s|$)").expect("Invalid ordered marker regex"),
                r"${1}\${2}${3}",
            ),
        ]
    })
}

/// Escapes characters that markdown would read as syntax.
pub(crate) fn escape_text(text: &str, start_of_line: bool, in_table_cell: bool) -> String {
    let chars: Vec<char> = text.chars().collect();
    let is_word = |c: Option<&char>| c.is_some_and(|c| c.is_alphanumeric() || *c == '_');
    let mut out = String::with_capacity(text.len());
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '`' | '*' | '\\' | '~' | '[' | ']' => {
                out.push('\\');
                out.push(c);
            }
            '_' if i > 0 && is_word(chars.get(i - 1)) && is_word(chars.get(i + 1)) => out.push(c),
            '_' => out.push_str("\\_"),
            '|' if in_table_cell => out.push_str("\\|"),
            '<' if chars
                .get(i + 1)
                .is_some_and(|n| n.is_ascii_alphabetic() || matches!(n, '/' | '!' | '?')) =>
            {
                out.push_str("\\<")
            }
            _ => out.push(c),
        }
    }
    let mut out = entity_regex().replace_all(&out, r"\$0").into_owned();
    if start_of_line {
        for (regex, replacement) in line_start_regexes() {
            out = regex.replace(&out, *replacement).into_owned();
        }
    }
    out
}
