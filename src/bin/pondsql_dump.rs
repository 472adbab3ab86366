use clap::{Parser, ValueEnum};
use pondsql::dump::{dump, DumpOptions};
use pondsql::{Handle, KvConfig, StorageConfig};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StoreFormat {
    Json,
    Kv,
}

#[derive(Debug, Parser)]
#[command(name = "pondsql_dump")]
#[command(about = "Export a pondsql database as a SQL script", long_about = None)]
struct Args {
    /// Database file (json) or directory (kv)
    path: PathBuf,

    /// Storage format of PATH
    #[arg(short = 'f', long, value_enum, default_value = "json")]
    format: StoreFormat,

    /// Export only schema (CREATE statements)
    #[arg(long)]
    schema_only: bool,

    /// Export only data (INSERT statements)
    #[arg(long)]
    data_only: bool,

    /// Output file (default: stdout)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.schema_only && args.data_only {
        eprintln!("Error: --schema-only and --data-only cannot be used together");
        std::process::exit(1);
    }
    if !args.path.exists() {
        eprintln!("Error: {} does not exist", args.path.display());
        std::process::exit(1);
    }

    let config = match args.format {
        StoreFormat::Json => StorageConfig::Json { path: args.path },
        StoreFormat::Kv => StorageConfig::KeyValue(KvConfig::new(args.path)),
    };
    let handle = Handle::open(&config)?;

    let mut output: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout()),
    };

    let options = DumpOptions {
        schema_only: args.schema_only,
        data_only: args.data_only,
    };
    dump(handle.storage(), &mut output, options)?;
    output.flush()?;
    Ok(())
}
