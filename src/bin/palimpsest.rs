//! Palimpsest CLI: read-only access to a text store.
//!
//! Usage:
//!   palimpsest query '<json request>' [--db path]
//!   palimpsest check '<json request>'
//!   palimpsest schema
//!   palimpsest stats [--db path]
//!   palimpsest verify [--db path]
//!
//! Requests may also be piped on stdin when the argument is omitted.

use clap::{Parser, Subcommand};
use palimpsest::{default_db_path, Palimpsest, QuerySurface, StoreConfig};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "palimpsest",
    version,
    about = "Read-only access to a hierarchical text-segmentation store"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Maximum rows returned by list requests
    #[arg(long, global = true, default_value_t = 500)]
    max_rows: usize,
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one JSON query request
    Query {
        /// The request, e.g. '{"op": "stats"}'. Read from stdin if omitted.
        request: Option<String>,
    },
    /// Validate a JSON query request without running it
    Check {
        request: Option<String>,
    },
    /// Print the JSON Schema of query requests
    Schema,
    /// Print row counts per table
    Stats,
    /// Audit every stored invariant
    Verify,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}

fn read_request(arg: Option<String>) -> Result<String, String> {
    match arg {
        Some(raw) => Ok(raw),
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .map_err(|e| format!("Failed to read request from stdin: {}", e))?;
            Ok(raw)
        }
    }
}

fn open_surface(db: Option<PathBuf>, max_rows: usize) -> Result<QuerySurface, String> {
    let config = StoreConfig::file(db.unwrap_or_else(default_db_path)).with_max_rows(max_rows);
    let store = Palimpsest::open(&config).map_err(|e| format!("Failed to open store: {}", e))?;
    Ok(QuerySurface::with_config(Arc::new(store), config.query))
}

fn print_json<T: serde::Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_query(surface: &QuerySurface, raw: &str) -> i32 {
    match surface.execute_json(raw) {
        Ok(response) => print_json(&response),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_check(surface: &QuerySurface, raw: &str) -> i32 {
    match surface.check(raw) {
        Ok(request) => print_json(&request),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_verify(store: &Palimpsest) -> i32 {
    let issues = store.snapshot().verify_integrity();
    if issues.is_empty() {
        println!("OK: no integrity issues");
        return 0;
    }
    for issue in &issues {
        println!("{}", issue);
    }
    eprintln!("Error: {} integrity issue(s)", issues.len());
    1
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match cli.command {
        Commands::Schema => print_json(&QuerySurface::schema()),
        Commands::Check { request } => {
            // Parsing only, no store is opened
            let surface = QuerySurface::new(Arc::new(Palimpsest::new()));
            match read_request(request) {
                Ok(raw) => cmd_check(&surface, &raw),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    1
                }
            }
        }
        Commands::Query { request } => {
            match read_request(request).and_then(|raw| Ok((raw, open_surface(cli.db, cli.max_rows)?))) {
                Ok((raw, surface)) => cmd_query(&surface, &raw),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    1
                }
            }
        }
        Commands::Stats => match open_surface(cli.db, cli.max_rows) {
            Ok(surface) => cmd_query(&surface, r#"{"op": "stats"}"#),
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Commands::Verify => {
            let config = StoreConfig::file(cli.db.unwrap_or_else(default_db_path));
            match Palimpsest::open(&config) {
                Ok(store) => cmd_verify(&store),
                Err(e) => {
                    eprintln!("Error: Failed to open store: {}", e);
                    1
                }
            }
        }
    };
    std::process::exit(code);
}
