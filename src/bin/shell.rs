//! Interactive shell for a tephra database.
//!
//! Reads whitespace-separated commands from standard input, one per line,
//! and prints results to standard output. Logs go to standard error so the
//! output stream stays scriptable.

use std::io::{self, BufRead};

use clap::{Parser, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

use tephra::{Config, Database, Error, Key, Result, SearchMode, Value};

/// tephra interactive shell
#[derive(Parser, Debug)]
#[command(name = "tephra-shell")]
#[command(about = "Interactive shell for a tephra key-value database")]
#[command(version)]
struct Args {
    /// Database name; data lives under <dir>/<name>
    #[arg(default_value = "default")]
    name: String,

    /// Base data directory
    #[arg(long, default_value = "data")]
    dir: String,

    /// Memtable capacity in entries
    #[arg(long, default_value_t = 4096)]
    memtable_max_entries: usize,

    /// Bloom filter bits per entry
    #[arg(long, default_value_t = 10)]
    bloom_bits_per_entry: usize,

    /// Page cache capacity in pages
    #[arg(long, default_value_t = 1024)]
    cache_pages_max: usize,

    /// Scan page count above which cached pages are demoted
    #[arg(long, default_value_t = 64)]
    cache_flood_threshold_pages: usize,

    /// Point-lookup read path
    #[arg(long, value_enum, default_value = "tree")]
    search_mode: Mode,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Mode {
    Tree,
    Binary,
}

impl From<Mode> for SearchMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Tree => SearchMode::Tree,
            Mode::Binary => SearchMode::Binary,
        }
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::new(&args.dir)
        .memtable_max_entries(args.memtable_max_entries)
        .bloom_bits_per_entry(args.bloom_bits_per_entry)
        .cache_pages_max(args.cache_pages_max)
        .cache_flood_threshold_pages(args.cache_flood_threshold_pages)
        .search_mode(args.search_mode.into());

    let mut db = Database::new(&args.name, config);
    if let Err(err) = db.open() {
        eprintln!("ERROR: {err}");
        std::process::exit(1);
    }

    repl(&mut db);

    if let Err(err) = db.close() {
        eprintln!("ERROR: {err}");
        std::process::exit(1);
    }
}

fn repl(db: &mut Database) {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [] => {}
            ["exit"] => break,
            ["help"] => print_help(),
            ["stats"] => println!("{}", db.stats()),
            ["put", key, value] => report(put(db, key, value)),
            ["get", key] => match parse_int(key) {
                Ok(key) => match db.get(key) {
                    Ok(Some(value)) => println!("{key} => {value}"),
                    Ok(None) => println!("NOT FOUND"),
                    Err(err) => println!("ERROR: {err}"),
                },
                Err(err) => println!("ERROR: {err}"),
            },
            ["scan", lo, hi] => match scan(db, lo, hi) {
                Ok(pairs) if pairs.is_empty() => println!("[]"),
                Ok(pairs) => {
                    let items: Vec<String> = pairs
                        .iter()
                        .map(|(key, value)| format!("({key},{value})"))
                        .collect();
                    println!("[ {} ]", items.join(", "));
                }
                Err(err) => println!("ERROR: {err}"),
            },
            ["delete", key] => report(parse_int(key).and_then(|key| db.delete(key))),
            _ => println!("ERROR: unknown or malformed command (try 'help')"),
        }
    }
}

fn put(db: &mut Database, key: &str, value: &str) -> Result<()> {
    let key = parse_int(key)?;
    let value = parse_int(value)?;
    db.put(key, value)
}

fn scan(db: &Database, lo: &str, hi: &str) -> Result<Vec<(Key, Value)>> {
    let lo = parse_int(lo)?;
    let hi = parse_int(hi)?;
    db.scan(lo, hi)
}

fn report(result: Result<()>) {
    match result {
        Ok(()) => println!("OK"),
        Err(err) => println!("ERROR: {err}"),
    }
}

fn parse_int(text: &str) -> Result<Key> {
    text.parse()
        .map_err(|_| Error::InvalidInput(format!("'{text}' is not an integer")))
}

fn print_help() {
    println!("Commands:");
    println!("  put <key> <value>   insert or replace a pair");
    println!("  get <key>           look up a key");
    println!("  scan <lo> <hi>      list pairs with lo <= key <= hi");
    println!("  delete <key>        logically delete a key");
    println!("  stats               print database statistics");
    println!("  help                show this message");
    println!("  exit                flush and quit");
}
