use criterion::{Criterion, black_box, criterion_group, criterion_main};
use markdown_duet_engine::{Convertor, LineDocument, PositionMapper};
use markdown_duet_syntax::{LinePos, parse};
mod common;

fn bench_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("conversion");
    group.sample_size(20);

    let content = common::generate_markdown_content(100);
    let tree = parse(&content);
    let convertor = Convertor::default();

    group.bench_function("to_rich_model", |b| {
        b.iter(|| {
            let doc = convertor.to_rich_model(black_box(&tree), tree.root());
            black_box(doc);
        });
    });

    let doc = convertor.to_rich_model(&tree, tree.root());
    group.bench_function("to_markdown_text", |b| {
        b.iter(|| {
            let text = convertor.to_markdown_text(black_box(&doc));
            black_box(text);
        });
    });

    group.finish();
}

fn bench_position_mapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("position_mapping");

    let line = common::generate_widget_line(50);
    let text = std::iter::repeat_n(line.as_str(), 200)
        .collect::<Vec<_>>()
        .join("\n");
    let doc = LineDocument::build(&text);

    group.bench_function("round_trip_last_line", |b| {
        b.iter(|| {
            let mapper = PositionMapper::new(&doc);
            let pos = LinePos::new(200, 400);
            let (offset, _) = mapper.line_pos_to_rich_offset(pos, pos);
            black_box(mapper.rich_offset_to_line_pos(offset));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_conversion, bench_position_mapping);
criterion_main!(benches);
