//! `$$info` … `$$` custom blocks.
//!
//! CommonMark has no syntax for these, so they are found with a line scan
//! before the document reaches pulldown-cmark. Their lines are blanked out
//! (byte offsets preserved) so the parser sees empty lines in their place.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CustomBlockSpan {
    /// Byte range from the opener to the end of the closing `$$`.
    pub range: Range<usize>,
    pub info: String,
    /// Lines between the fences, each followed by `\n`.
    pub literal: String,
}

struct Fence {
    ch: u8,
    len: usize,
}

fn fence_of(line: &str) -> Option<Fence> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = &line.as_bytes()[indent..];
    let ch = *rest.first()?;
    if ch != b'`' && ch != b'~' {
        return None;
    }
    let len = rest.iter().take_while(|b| **b == ch).count();
    (len >= 3).then_some(Fence { ch, len })
}

fn opener_info(line: &str) -> Option<&str> {
    let info = line.strip_prefix("$$")?.trim_end();
    let mut chars = info.chars();
    let first = chars.next()?;
    let valid = first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(info)
}

fn is_closer(line: &str) -> bool {
    line.trim_end() == "$$"
}

/// Finds custom blocks and returns the masked text alongside them.
pub(crate) fn scan(text: &str) -> (String, Vec<CustomBlockSpan>) {
    let mut lines = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let body = line.trim_end_matches(['\n', '\r']);
        lines.push((offset, body));
        offset += line.len();
    }

    let mut blocks = Vec::new();
    let mut open_fence: Option<Fence> = None;
    let mut i = 0;
    while i < lines.len() {
        let (start, body) = lines[i];
        if let Some(fence) = &open_fence {
            if fence_of(body).is_some_and(|f| f.ch == fence.ch && f.len >= fence.len) {
                open_fence = None;
            }
            i += 1;
            continue;
        }
        if let Some(fence) = fence_of(body) {
            open_fence = Some(fence);
            i += 1;
            continue;
        }
        let Some(info) = opener_info(body) else {
            i += 1;
            continue;
        };
        let Some(close) = (i + 1..lines.len()).find(|j| is_closer(lines[*j].1)) else {
            i += 1;
            continue;
        };
        let literal: String = lines[i + 1..close]
            .iter()
            .map(|(_, l)| format!("{l}\n"))
            .collect();
        let (close_start, close_body) = lines[close];
        blocks.push(CustomBlockSpan {
            range: start..close_start + close_body.trim_end().len(),
            info: info.to_string(),
            literal,
        });
        i = close + 1;
    }

    if blocks.is_empty() {
        return (text.to_string(), blocks);
    }
    let mut masked = text.as_bytes().to_vec();
    for block in &blocks {
        for b in &mut masked[block.range.clone()] {
            if *b != b'\n' && *b != b'\r' {
                *b = b' ';
            }
        }
    }
    // Only whole UTF-8 sequences were replaced by ASCII spaces.
    let masked = String::from_utf8(masked).unwrap_or_else(|_| text.to_string());
    (masked, blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn finds_block_and_masks_lines() {
        let text = "a\n\n$$uml\nx → y\n$$\nb\n";
        let (masked, blocks) = scan(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].info, "uml");
        assert_eq!(blocks[0].literal, "x → y\n");
        assert_eq!(&text[blocks[0].range.clone()], "$$uml\nx → y\n$$");
        assert_eq!(masked.len(), text.len());
        assert!(masked.starts_with("a\n\n     \n"));
        assert!(masked.ends_with("\n  \nb\n"));
    }

    #[test]
    fn ignores_blocks_inside_fenced_code() {
        let text = "```\n$$uml\n$$\n```\n";
        let (masked, blocks) = scan(text);
        assert!(blocks.is_empty());
        assert_eq!(masked, text);
    }

    #[test]
    fn unterminated_opener_is_plain_text() {
        let (_, blocks) = scan("$$uml\nno close\n");
        assert!(blocks.is_empty());
    }

    #[test]
    fn widget_line_is_not_an_opener() {
        let (_, blocks) = scan("$$widget0 @tim$$\n$$\n");
        assert!(blocks.is_empty());
    }
}
