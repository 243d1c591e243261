// Benchmark helper functions - Rust's dead code analysis doesn't understand
// that these are used by benchmark files in the same directory
// See: https://users.rust-lang.org/t/cargo-rustc-benches-awarnings/110111/2
#[allow(dead_code)]
pub fn generate_markdown_content(size: usize) -> String {
    let base = "# Title\n\n## Section\n\nParagraph with **bold**, *em* and `code`.\n\n- Bullet point\n  - Nested item\n- Another item\n\n| a | b |\n| :--- | ---: |\n| 1 | 2 |\n\n```rust\nfn example() {\n    println!(\"Hello\");\n}\n```\n\n";
    base.repeat(size)
}

#[allow(dead_code)]
pub fn generate_widget_line(widgets: usize) -> String {
    (0..widgets)
        .map(|i| format!("word $$widget0 @user{i}$$"))
        .collect::<Vec<_>>()
        .join(" ")
}
