//! Inline widgets: `$$widgetN text$$`.
//!
//! A configured rule `N` turns every plain-text match of its pattern into
//! widget syntax. In the rich tree a widget is an inline node whose text is
//! the complete markdown form, so it is two positions wider than its source.

use std::borrow::Cow;
use std::sync::OnceLock;

use markdown_duet_config::WidgetRuleConfig;
use regex::Regex;

use crate::error::EngineError;
use crate::rich::{Mark, NodeKind, RichNode};

fn widget_syntax() -> &'static Regex {
    static WIDGET: OnceLock<Regex> = OnceLock::new();
    WIDGET.get_or_init(|| Regex::new(r"\$\$(widget\d+) (.+?)\$\$").expect("Invalid widget regex"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece<'a> {
    Text(&'a str),
    Widget { info: &'a str, source: &'a str },
}

/// Splits text into plain runs and widget syntax.
pub fn split_widgets(text: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut last = 0;
    for caps in widget_syntax().captures_iter(text) {
        let (Some(whole), Some(info)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            pieces.push(Piece::Text(&text[last..whole.start()]));
        }
        pieces.push(Piece::Widget {
            info: info.as_str(),
            source: whole.as_str(),
        });
        last = whole.end();
    }
    if last < text.len() {
        pieces.push(Piece::Text(&text[last..]));
    }
    pieces
}

pub fn widget_markdown(info: &str, text: &str) -> String {
    format!("$${info} {text}$$")
}

pub fn widget_node(info: &str, source: &str, marks: Vec<Mark>) -> RichNode {
    RichNode::new(
        NodeKind::Widget {
            info: info.to_string(),
        },
        vec![RichNode::text(source, Vec::new())],
    )
    .with_marks(marks)
}

#[derive(Debug, Clone)]
struct WidgetRule {
    name: String,
    pattern: Regex,
}

#[derive(Debug, Clone, Default)]
pub struct WidgetRules {
    rules: Vec<WidgetRule>,
}

impl WidgetRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(rules: &[WidgetRuleConfig]) -> Result<Self, EngineError> {
        let mut out = Self::new();
        for rule in rules {
            out.add(&rule.name, &rule.pattern)?;
        }
        Ok(out)
    }

    /// Adds rule `widget{len}`.
    pub fn add(&mut self, name: &str, pattern: &str) -> Result<(), EngineError> {
        let pattern = Regex::new(pattern).map_err(|source| EngineError::InvalidWidgetRule {
            name: name.to_string(),
            source,
        })?;
        self.rules.push(WidgetRule {
            name: name.to_string(),
            pattern,
        });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| rule.name.as_str())
    }

    /// Wraps rule matches in plain text into widget syntax. Existing widget
    /// syntax is left alone.
    pub fn wrap<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if self.rules.is_empty() {
            return Cow::Borrowed(text);
        }
        let mut out = String::with_capacity(text.len());
        for piece in split_widgets(text) {
            match piece {
                Piece::Widget { source, .. } => out.push_str(source),
                Piece::Text(plain) => out.push_str(&self.wrap_plain(plain)),
            }
        }
        Cow::Owned(out)
    }

    fn wrap_plain(&self, text: &str) -> String {
        let mut current = text.to_string();
        for (index, rule) in self.rules.iter().enumerate() {
            let info = format!("widget{index}");
            let mut next = String::with_capacity(current.len());
            for piece in split_widgets(&current) {
                match piece {
                    Piece::Widget { source, .. } => next.push_str(source),
                    Piece::Text(plain) => {
                        let replaced = rule
                            .pattern
                            .replace_all(plain, |caps: &regex::Captures| {
                                widget_markdown(&info, &caps[0])
                            });
                        next.push_str(&replaced);
                    }
                }
            }
            current = next;
        }
        current
    }
}
