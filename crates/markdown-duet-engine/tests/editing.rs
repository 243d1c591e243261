//! Edit flows across the parser, the line document and the rich tree.

use std::collections::BTreeSet;

use markdown_duet_config::{Config, WidgetRuleConfig};
use markdown_duet_engine::rich::{BackgroundKind, LineBackground};
use markdown_duet_engine::table::{Side, add_row};
use markdown_duet_engine::{
    Convertor, DocTransaction, LineDocument, NodeKind, PendingBackgrounds, PositionMapper,
    RichNode, TableIndexCache, Transaction, annotate, annotate_document,
    map_markdown_pos_to_rich_offset, map_rich_offset_to_markdown_pos,
};
use markdown_duet_syntax::{
    CmarkParser, EditResult, LinePos, MarkdownParser, RemovedNodeRange, parse,
};
use pretty_assertions::assert_eq;

fn painted_lines(doc: &RichNode) -> Vec<usize> {
    doc.content()
        .iter()
        .enumerate()
        .filter(|(_, line)| matches!(line.kind(), NodeKind::Line { background: Some(_) }))
        .map(|(i, _)| i + 1)
        .collect()
}

#[test]
fn deleting_a_code_block_clears_its_lines() {
    let before = "Intro\n\n```\ncode\n```\n\nAfter\n\n```\nkept\n```\n";
    let mut parser = CmarkParser::new(before);
    let mut tx = DocTransaction::new(LineDocument::build(before));
    annotate_document(&mut tx, parser.tree(), parser.line_texts());
    assert_eq!(painted_lines(tx.doc()), vec![3, 4, 5, 9, 10, 11]);

    let result = parser.edit_markdown(LinePos::new(3, 1), LinePos::new(6, 1), "");
    assert_eq!(
        result.removed_range().map(|r| r.line_range),
        Some([3, 5]),
        "{result:?}"
    );

    // The editor keeps the line blocks around until it has applied the text
    // change; only their backgrounds are checked here.
    let mut pending = PendingBackgrounds::new();
    let changed = annotate(
        &mut tx,
        parser.tree(),
        parser.line_texts(),
        &result,
        &mut pending,
    );
    assert_eq!(changed, BTreeSet::from([3, 4, 5]));
    assert_eq!(painted_lines(tx.doc()), vec![9, 10, 11]);
}

#[test]
fn removed_range_reported_by_an_external_parser() {
    let text = "a\n\nb\n";
    let mut tx = DocTransaction::new(LineDocument::build(text));
    let background = LineBackground {
        kind: BackgroundKind::CustomBlock,
        code_start: true,
        code_end: true,
    };
    let pos = PositionMapper::new(tx.doc()).block_start(3);
    tx.set_node_markup(
        pos,
        NodeKind::Line {
            background: Some(background),
        },
    )
    .unwrap();

    let result = EditResult::Removed(RemovedNodeRange {
        line_range: [3, 3],
        id_range: None,
    });
    let tree = parse(text);
    let lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    let mut pending = PendingBackgrounds::new();
    annotate(&mut tx, &tree, &lines, &result, &mut pending);
    assert!(painted_lines(tx.doc()).is_empty());
}

#[test]
fn added_blocks_convert_to_rich() {
    let mut parser = CmarkParser::new("# Title\n\ntext\n");
    let result = parser.edit_markdown(LinePos::new(3, 1), LinePos::new(3, 5), "**bold** and *em*");
    let [id] = result.added_nodes() else {
        panic!("expected one added block, got {result:?}");
    };
    let convertor = Convertor::default();
    let node = convertor.to_rich_model(parser.tree(), *id);
    assert_eq!(node.kind(), &NodeKind::Paragraph);
    assert_eq!(convertor.to_markdown_text(&node), "**bold** and *em*");
}

#[test]
fn widget_offsets_follow_configured_rules() {
    let config = Config {
        widgets: vec![WidgetRuleConfig {
            name: "mention".to_string(),
            pattern: r"@\w+".to_string(),
        }],
        ..Config::default()
    };
    let convertor = Convertor::from_config(&config).unwrap();
    let tree = parse("ping @ann and @bob\n");
    let markdown = convertor.to_markdown_text(&convertor.to_rich_model(&tree, tree.root()));
    assert_eq!(markdown, "ping $$widget0 @ann$$ and $$widget0 @bob$$");

    let doc = LineDocument::build(&markdown);
    let widget = "$$widget0 @ann$$".len();
    for (col, widgets) in [(1, 0), (6, 0), (7 + widget, 1), (1 + markdown.len(), 2)] {
        let pos = LinePos::new(1, col);
        let (offset, _) = map_markdown_pos_to_rich_offset(&doc, pos, pos);
        assert_eq!(offset, col + 2 * widgets, "column {col}");
        let (back, _) = map_rich_offset_to_markdown_pos(&doc, offset, offset);
        assert_eq!(back, pos);
    }
}

#[test]
fn table_geometry_and_row_insertion() {
    let md = "| a | b | c | d |\n| --- | --- | --- | --- |\n| 1 | 2 | 3 | 4 |\n| 5 | 6 | 7 | 8 |\n";
    let tree = parse(md);
    let convertor = Convertor::default();
    let doc = convertor.to_rich_model(&tree, tree.root());

    // table 0, head 1, row 2, first cell 3, its text 4
    let mut cache = TableIndexCache::new();
    let index = cache.create(&doc, 4).unwrap();
    assert_eq!(index.row_count(), 3);
    assert!(index.rows().iter().all(|row| row.len() == 4));
    let offsets: Vec<usize> = index.rows().iter().flatten().map(|c| c.offset).collect();
    assert!(offsets.windows(2).all(|w| w[0] < w[1]), "{offsets:?}");

    let mut tx = DocTransaction::new(doc);
    tx.set_selection(4, 4);
    add_row(&mut tx, &mut cache, Side::After).unwrap();
    assert_eq!(
        convertor.to_markdown_text(tx.doc()),
        "| a | b | c | d |\n| --- | --- | --- | --- |\n|  |  |  |  |\n| 1 | 2 | 3 | 4 |\n| 5 | 6 | 7 | 8 |"
    );
    assert_eq!(cache.create(tx.doc(), 4).unwrap().row_count(), 4);
}
