//! rowset CLI: inspect result sets through the batch fetch path
//!
//! # Usage
//!
//! ```bash
//! # Print a JSON fixture, 2 rows per fetch cycle
//! rowset show rows.json --batch 2
//!
//! # Run a query against a database
//! rowset query "SELECT id, name FROM users" --database-url sqlite://app.db
//!
//! # Type tag → representation table
//! rowset kinds
//! ```

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use rowset::config::Config;
use rowset::engine::any;
use rowset::engine::memory::Fixture;
use rowset::extract::{accepts, Target};
use rowset::prelude::*;
use rowset::repr::{REPR_TABLE, TEXT_MARGIN};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rowset")]
#[command(version)]
#[command(about = "Typed result sets over batch-bound cursors", long_about = None)]
#[command(after_help = "EXAMPLES:
    rowset show fixtures/people.json --batch 2
    rowset query 'SELECT 1 AS one, 2.5 AS two' --database-url sqlite::memory:
    rowset kinds")]
struct Cli {
    /// Config file (default: <config dir>/rowset/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a JSON fixture through the fetch path
    Show {
        /// Fixture file: {"columns": [{"name", "type", "width"?}], "rows": [[...]]}
        fixture: PathBuf,

        /// Rows per fetch cycle
        #[arg(short, long)]
        batch: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Execute SQL and print the result
    Query {
        /// The SQL statement
        sql: String,

        /// Database connection URL
        #[arg(long, env = "ROWSET_DATABASE_URL")]
        database_url: Option<String>,

        /// Rows per fetch cycle
        #[arg(short, long)]
        batch: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Show the type tag reference
    Kinds,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    init_tracing(&config, cli.verbose);

    match cli.command {
        Commands::Show {
            fixture,
            batch,
            format,
        } => {
            let text = std::fs::read_to_string(&fixture)
                .with_context(|| format!("reading {}", fixture.display()))?;
            let mem = MemoryEnv::new();
            let cursor = MemoryCursor::from_fixture(&mem, Fixture::from_json(&text)?)?;
            print_rows(cursor, &mem, batch.unwrap_or(config.fetch.batch_size), format)
        }
        Commands::Query {
            sql,
            database_url,
            batch,
            format,
        } => {
            let url = database_url
                .or(config.database.url.clone())
                .context("no database URL. Use --database-url or set ROWSET_DATABASE_URL")?;
            let mem = MemoryEnv::new();
            let cursor = any::load(&mem, &url, &sql)?;
            print_rows(cursor, &mem, batch.unwrap_or(config.fetch.batch_size), format)
        }
        Commands::Kinds => {
            show_kinds();
            Ok(())
        }
    }
}

fn init_tracing(config: &Config, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("rowset=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_rows(cursor: MemoryCursor, mem: &MemoryEnv, batch: usize, format: OutputFormat) -> Result<()> {
    let env: Rc<dyn Environment> = Rc::new(mem.clone());
    let mut rows = RowSet::new(cursor, &env, batch)?;
    let names: Vec<String> = rows.columns().iter().map(|c| c.name().to_string()).collect();

    let mut values: Vec<Vec<Value>> = Vec::new();
    while let Some(batch) = rows.fetch()? {
        for row in batch.iter() {
            let rendered = (0..row.len())
                .map(|i| render(row.column(i), row.index()))
                .collect::<FetchResult<Vec<_>>>()?;
            values.push(rendered);
        }
    }

    match format {
        OutputFormat::Json => {
            let objects: Vec<Value> = values
                .into_iter()
                .map(|row| Value::Object(names.iter().cloned().zip(row).collect()))
                .collect();
            println!("{}", serde_json::to_string_pretty(&objects)?);
        }
        OutputFormat::Table => print_table(&names, &values),
    }
    Ok(())
}

/// JSON value for one cell, chosen by the column's representation.
fn render(column: &BoundColumn, row: usize) -> FetchResult<Value> {
    if column.is_null(row) {
        return Ok(Value::Null);
    }
    let value = match column.repr() {
        Repr::Signed => Value::from(column.get_i64(row)?),
        Repr::Unsigned => Value::from(column.get_u64(row)?),
        Repr::Float => {
            let v = column.get_f64(row)?;
            serde_json::Number::from_f64(v)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(v.to_string()))
        }
        Repr::Decimal | Repr::Temporal | Repr::Text => Value::String(column.get_string(row)?),
        Repr::Lob => Value::String(hex(&column.get_blob(row)?)),
        Repr::Raw => {
            let bytes = column.get_blob(row)?;
            match String::from_utf8(bytes) {
                Ok(s) => Value::String(s),
                Err(e) => Value::String(hex(e.as_bytes())),
            }
        }
    };
    Ok(value)
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

fn val_to_string(val: &Value) -> String {
    match val {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn print_table(names: &[String], rows: &[Vec<Value>]) {
    if rows.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    let mut widths: Vec<usize> = names.iter().map(|n| n.len()).collect();
    for row in rows {
        for (w, val) in widths.iter_mut().zip(row) {
            *w = (*w).max(val_to_string(val).chars().count());
        }
    }

    let header: Vec<String> = names
        .iter()
        .zip(&widths)
        .map(|(n, w)| format!("{:width$}", n, width = *w))
        .collect();
    println!("{}", header.join(" │ ").white().bold());

    let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    println!("{}", sep.join("─┼─").dimmed());

    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(val, w)| {
                let text = format!("{:width$}", val_to_string(val), width = *w);
                if val.is_null() {
                    text.dimmed().to_string()
                } else {
                    text
                }
            })
            .collect();
        println!("{}", cells.join(" │ "));
    }

    println!();
    println!("{} row(s) returned", rows.len().to_string().cyan());
}

fn show_kinds() {
    println!("{}", "Type tag reference".cyan().bold());
    println!();
    println!(
        "{:14} {:>4} {:9} {:10} {:12} {}",
        "Type".white().bold(),
        "Tag".white().bold(),
        "Kind".white().bold(),
        "Wire".white().bold(),
        "Element".white().bold(),
        "Readable as".white().bold()
    );
    println!("{}", "─".repeat(100).dimmed());

    for (tag, repr) in REPR_TABLE {
        let element = match repr {
            Repr::Text | Repr::Raw => format!("width+{}", TEXT_MARGIN),
            _ if repr.zero_fill() => format!("{} (zeroed)", repr.element_width(0)),
            _ => repr.element_width(0).to_string(),
        };
        let targets: Vec<&str> = Target::ALL
            .iter()
            .filter(|t| accepts(*repr, **t))
            .map(|t| t.name())
            .collect();
        println!(
            "{:14} {:>4} {:9} {:10} {:12} {}",
            tag.name().cyan().bold(),
            tag.0,
            repr.name().yellow(),
            repr.wire_tag(*tag).name(),
            element,
            targets.join(", ").dimmed()
        );
    }
    println!();
    println!(
        "{}",
        "Any other tag is read as raw, requested as AFC.".dimmed()
    );
}
