use anyhow::{Context, Result, bail};
use markdown_duet_config::Config;
use markdown_duet_engine::rich::NodeKind;
use markdown_duet_engine::{Convertor, LineDocument, PositionMapper, RichNode, TableIndexCache};
use markdown_duet_syntax::{LinePos, parse};
use std::path::{Path, PathBuf};
use std::{env, fs, process};

const USAGE: &str = "\
Usage: markdown-duet-cli <command> <file> [args]

Commands:
  roundtrip FILE        write FILE through the rich model and back
  tree FILE             print the rich tree of FILE
  pos FILE LINE COL     map a markdown position to a line-document offset and back
  tables FILE           print the cell geometry of every table in FILE";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Roundtrip(PathBuf),
    Tree(PathBuf),
    Pos { file: PathBuf, line: usize, col: usize },
    Tables(PathBuf),
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let [command, file, rest @ ..] = args else {
            bail!("missing command or file");
        };
        let file = PathBuf::from(file);
        let command = match (command.as_str(), rest) {
            ("roundtrip", []) => Command::Roundtrip(file),
            ("tree", []) => Command::Tree(file),
            ("tables", []) => Command::Tables(file),
            ("pos", [line, col]) => Command::Pos {
                file,
                line: line.parse().with_context(|| format!("invalid line '{line}'"))?,
                col: col.parse().with_context(|| format!("invalid column '{col}'"))?,
            },
            (other, _) => bail!("unknown command or wrong arguments: '{other}'"),
        };
        Ok(command)
    }
}

fn read_markdown(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read '{}'", path.display()))
}

fn load_convertor() -> Result<Convertor> {
    let config = match Config::load() {
        Ok(Some(config)) => config,
        Ok(None) => {
            log::debug!("no config at {}, using defaults", Config::config_path().display());
            Config::default()
        }
        Err(e) => bail!("failed to load config file: {e}"),
    };
    Ok(Convertor::from_config(&config)?)
}

fn rich_document(convertor: &Convertor, text: &str) -> RichNode {
    let tree = parse(text);
    convertor.to_rich_model(&tree, tree.root())
}

fn describe_position(doc: &RichNode, line: usize, col: usize) -> String {
    let mapper = PositionMapper::new(doc);
    let pos = LinePos::new(line, col);
    let (offset, _) = mapper.line_pos_to_rich_offset(pos, pos);
    let back = mapper.rich_offset_to_line_pos(offset);
    format!("{pos} -> {offset} -> {back}")
}

fn describe_tables(doc: &RichNode) -> Vec<String> {
    let mut cache = TableIndexCache::new();
    let mut out = Vec::new();
    for (at, block) in doc.children_with_offsets() {
        if block.kind() != &NodeKind::Table {
            continue;
        }
        let Some(index) = cache.create(doc, at + 1) else {
            continue;
        };
        out.push(format!(
            "table at {}: {} rows ({} head) x {} columns, cells {}..{}",
            index.table_start(),
            index.row_count(),
            index.head_rows(),
            index.col_count(),
            index.start_offset(),
            index.end_offset()
        ));
        for (row, cells) in index.rows().iter().enumerate() {
            let cells: Vec<String> = cells
                .iter()
                .map(|cell| match cell.span_origin {
                    Some((r, c)) => format!("^{r}:{c}"),
                    None => format!("{}+{}", cell.offset, cell.node_size),
                })
                .collect();
            out.push(format!("  row {row}: {}", cells.join(" ")));
        }
    }
    out
}

fn run(command: Command) -> Result<()> {
    let convertor = load_convertor()?;
    match command {
        Command::Roundtrip(file) => {
            let doc = rich_document(&convertor, &read_markdown(&file)?);
            println!("{}", convertor.to_markdown_text(&doc));
        }
        Command::Tree(file) => {
            let doc = rich_document(&convertor, &read_markdown(&file)?);
            print!("{}", doc.dump());
        }
        Command::Pos { file, line, col } => {
            let doc = LineDocument::build(&read_markdown(&file)?);
            println!("{}", describe_position(&doc, line, col));
        }
        Command::Tables(file) => {
            let doc = rich_document(&convertor, &read_markdown(&file)?);
            let tables = describe_tables(&doc);
            if tables.is_empty() {
                log::info!("no tables in '{}'", file.display());
            }
            for line in tables {
                println!("{line}");
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("{USAGE}");
            process::exit(1);
        }
    };
    run(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_position_command() {
        assert_eq!(
            Command::parse(&args(&["pos", "a.md", "3", "7"])).unwrap(),
            Command::Pos {
                file: PathBuf::from("a.md"),
                line: 3,
                col: 7
            }
        );
    }

    #[test]
    fn rejects_unknown_commands_and_bad_numbers() {
        assert!(Command::parse(&args(&["render", "a.md"])).is_err());
        assert!(Command::parse(&args(&["pos", "a.md", "x", "1"])).is_err());
        assert!(Command::parse(&args(&["tree"])).is_err());
    }

    #[test]
    fn position_round_trips_through_the_line_document() {
        let doc = LineDocument::build("ab\ncd");
        assert_eq!(describe_position(&doc, 2, 2), "2:2 -> 6 -> 2:2");
    }

    #[test]
    fn describes_each_table() {
        let doc = rich_document(&Convertor::default(), "| a | b |\n| --- | --- |\n| 1 | 2 |\n");
        let tables = describe_tables(&doc);
        assert_eq!(tables.len(), 3);
        assert!(tables[0].starts_with("table at 0: 2 rows (1 head) x 2 columns"), "{}", tables[0]);
    }
}
