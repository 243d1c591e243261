//! Raw HTML tags that survive a round trip through the rich model.

use std::sync::OnceLock;

use regex::Regex;

use crate::rich::{MarkKind, NodeKind, RawHtml, RichNode};

/// Converts raw HTML that has no rich counterpart.
pub trait HtmlFallback {
    fn inline(&self, html: &str) -> RichNode;
    fn block(&self, html: &str) -> RichNode;
}

/// Keeps unknown HTML as opaque `htmlInline` / `htmlBlock` leaves.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreserveHtml;

impl HtmlFallback for PreserveHtml {
    fn inline(&self, html: &str) -> RichNode {
        RichNode::leaf(NodeKind::HtmlInline {
            html: html.to_string(),
        })
    }

    fn block(&self, html: &str) -> RichNode {
        RichNode::leaf(NodeKind::HtmlBlock {
            html: html.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtmlTag {
    Open { raw: RawHtml, self_closing: bool },
    Close(String),
}

fn open_tag_regex() -> &'static Regex {
    static OPEN: OnceLock<Regex> = OnceLock::new();
    OPEN.get_or_init(|| {
        Regex::new(
            r#"^<([A-Za-z][A-Za-z0-9-]*)((?:\s+[A-Za-z_:][-A-Za-z0-9_:.]*(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'=<>`]+))?)*)\s*(/?)>$"#,
        )
        .expect("Invalid open tag regex")
    })
}

fn close_tag_regex() -> &'static Regex {
    static CLOSE: OnceLock<Regex> = OnceLock::new();
    CLOSE.get_or_init(|| {
        Regex::new(r"^</([A-Za-z][A-Za-z0-9-]*)\s*>$").expect("Invalid close tag regex")
    })
}

fn attr_regex() -> &'static Regex {
    static ATTR: OnceLock<Regex> = OnceLock::new();
    ATTR.get_or_init(|| {
        Regex::new(
            r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#,
        )
        .expect("Invalid attribute regex")
    })
}

/// Parses a single HTML tag. Anything else (text, several tags, comments)
/// is `None`.
pub fn parse_tag(html: &str) -> Option<HtmlTag> {
    let html = html.trim();
    if let Some(caps) = close_tag_regex().captures(html) {
        return Some(HtmlTag::Close(caps[1].to_ascii_lowercase()));
    }
    let caps = open_tag_regex().captures(html)?;
    let attrs = attr_regex()
        .captures_iter(caps.get(2).map_or("", |m| m.as_str()))
        .map(|attr| {
            let value = attr
                .get(2)
                .or_else(|| attr.get(3))
                .or_else(|| attr.get(4))
                .map_or("", |m| m.as_str());
            (
                attr[1].to_ascii_lowercase(),
                html_escape::decode_html_entities(value).into_owned(),
            )
        })
        .collect();
    Some(HtmlTag::Open {
        raw: RawHtml::new(caps[1].to_ascii_lowercase(), attrs),
        self_closing: caps.get(3).is_some_and(|m| !m.as_str().is_empty()),
    })
}

pub fn open_tag(raw: &RawHtml) -> String {
    let mut out = format!("<{}", raw.tag);
    for (name, value) in &raw.attrs {
        out.push_str(&format!(
            " {name}=\"{}\"",
            html_escape::encode_double_quoted_attribute(value)
        ));
    }
    out.push('>');
    out
}

pub fn close_tag(raw: &RawHtml) -> String {
    format!("</{}>", raw.tag)
}

pub fn is_comment(html: &str) -> bool {
    html.trim_start().starts_with("<!--")
}

/// Mark for an allow-listed formatting tag.
pub fn mark_for_tag(raw: &RawHtml) -> Option<MarkKind> {
    let kind = match raw.tag.as_str() {
        "b" | "strong" => MarkKind::Strong,
        "i" | "em" => MarkKind::Emph,
        "s" | "del" | "strike" => MarkKind::Strike,
        "code" => MarkKind::Code,
        "span" => MarkKind::Span,
        "a" => MarkKind::Link {
            url: raw.attr("href").unwrap_or_default().to_string(),
            title: raw.attr("title").map(str::to_string),
        },
        _ => return None,
    };
    Some(kind)
}

/// Node for an allow-listed void tag.
pub fn node_for_tag(raw: &RawHtml) -> Option<RichNode> {
    let kind = match raw.tag.as_str() {
        "br" => NodeKind::HardBreak,
        "img" => NodeKind::Image {
            image_url: raw.attr("src").unwrap_or_default().to_string(),
            alt_text: raw.attr("alt").unwrap_or_default().to_string(),
            title: raw.attr("title").map(str::to_string),
        },
        _ => return None,
    };
    Some(RichNode::leaf(kind).with_html(Some(raw.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_open_tag_with_attributes() {
        let tag = parse_tag(r#"<a href="x.html?a=1&amp;b=2" title='T' data-x=y>"#).unwrap();
        let HtmlTag::Open { raw, self_closing } = tag else {
            panic!("expected an open tag");
        };
        assert!(!self_closing);
        assert_eq!(raw.tag, "a");
        assert_eq!(raw.attr("href"), Some("x.html?a=1&b=2"));
        assert_eq!(raw.attr("title"), Some("T"));
        assert_eq!(raw.attr("data-x"), Some("y"));
        assert_eq!(
            open_tag(&raw),
            r#"<a href="x.html?a=1&amp;b=2" title="T" data-x="y">"#
        );
    }

    #[test]
    fn parses_close_and_void_tags() {
        assert_eq!(parse_tag("</B>"), Some(HtmlTag::Close("b".into())));
        let Some(HtmlTag::Open { raw, self_closing }) = parse_tag("<br/>") else {
            panic!("expected br");
        };
        assert!(self_closing);
        assert_eq!(node_for_tag(&raw).unwrap().kind(), &NodeKind::HardBreak);
    }

    #[test]
    fn rejects_non_tags() {
        assert_eq!(parse_tag("<!-- hi -->"), None);
        assert_eq!(parse_tag("<b>x</b>"), None);
        assert!(is_comment("<!-- hi -->"));
    }

    #[test]
    fn only_allow_listed_tags_become_marks() {
        let raw = |tag: &str| RawHtml::new(tag, vec![]);
        assert_eq!(mark_for_tag(&raw("em")), Some(MarkKind::Emph));
        assert_eq!(mark_for_tag(&raw("del")), Some(MarkKind::Strike));
        assert_eq!(mark_for_tag(&raw("div")), None);
        assert!(node_for_tag(&raw("div")).is_none());
    }
}
