use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Cell, Table as ComfyTable};
use config::{Config, Environment, File};
use pondsql::dump::{dump, DumpOptions};
use pondsql::{Handle, KvConfig, Payload, StorageConfig};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StorageKind {
    Memory,
    Json,
    Kv,
    Shared,
}

/// pondsql interactive shell
#[derive(Parser, Debug)]
#[command(name = "pondsql")]
#[command(about = "Embeddable SQL engine shell", long_about = None)]
struct Args {
    /// Storage backend
    #[arg(short = 's', long, value_enum)]
    storage: Option<StorageKind>,

    /// Database file (json) or directory (kv)
    #[arg(short = 'p', long)]
    path: Option<PathBuf>,

    /// Namespace name for the shared backend
    #[arg(short = 'n', long)]
    namespace: Option<String>,

    /// Run the SQL script in FILE and exit
    #[arg(short = 'e', long, value_name = "FILE")]
    execute: Option<PathBuf>,
}

/// Shell configuration
#[derive(Debug, Deserialize)]
struct ShellConfig {
    #[serde(default = "default_storage")]
    storage: StorageKind,
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default = "default_namespace")]
    namespace: String,
}

const fn default_storage() -> StorageKind {
    StorageKind::Memory
}

fn default_namespace() -> String {
    "default".to_string()
}

impl ShellConfig {
    /// Load configuration with priority: CLI args > ENV > config file > defaults
    fn load(args: &Args) -> Self {
        let mut builder = Config::builder();

        let path = "./pondsql.toml";
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path));
            tracing::info!(path, "loaded config");
        }

        // PONDSQL_STORAGE, PONDSQL_PATH, PONDSQL_NAMESPACE
        builder = builder.add_source(Environment::with_prefix("PONDSQL"));

        let base = builder
            .build()
            .and_then(|c| c.try_deserialize::<Self>())
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring invalid configuration");
                Self {
                    storage: default_storage(),
                    path: None,
                    namespace: default_namespace(),
                }
            });

        Self {
            storage: args.storage.unwrap_or(base.storage),
            path: args.path.clone().or(base.path),
            namespace: args.namespace.clone().unwrap_or(base.namespace),
        }
    }

    fn storage_config(&self) -> StorageConfig {
        match self.storage {
            StorageKind::Memory => StorageConfig::Memory,
            StorageKind::Json => StorageConfig::Json {
                path: self.path.clone().unwrap_or_else(|| PathBuf::from("pondsql.json")),
            },
            StorageKind::Kv => StorageConfig::KeyValue(match &self.path {
                Some(path) => KvConfig::new(path),
                None => KvConfig::default(),
            }),
            StorageKind::Shared => StorageConfig::SharedNamespace {
                name: self.namespace.clone(),
            },
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pondsql=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let args = Args::parse();
    let config = ShellConfig::load(&args);
    let mut handle = Handle::open(&config.storage_config())?;

    if let Some(script) = &args.execute {
        let sql = std::fs::read_to_string(script)?;
        for payload in handle.query(&sql)? {
            print_payload(&payload);
        }
        return Ok(());
    }

    repl(&mut handle)
}

fn repl(handle: &mut Handle) -> Result<(), Box<dyn std::error::Error>> {
    let mut rl = DefaultEditor::new()?;
    let history_file = dirs::home_dir().map(|mut p| {
        p.push(".pondsql_history");
        p
    });
    if let Some(path) = &history_file {
        // A missing history file is fine
        let _ = rl.load_history(path);
    }

    println!("pondsql {}", env!("CARGO_PKG_VERSION"));
    println!("Enter SQL terminated by ';', or .help for meta commands.\n");

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() { "pondsql> " } else { "    ...> " };
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if buffer.is_empty() && line.starts_with('.') {
                    let _ = rl.add_history_entry(line);
                    if !meta_command(handle, line) {
                        break;
                    }
                    continue;
                }

                if !buffer.is_empty() {
                    buffer.push('\n');
                }
                buffer.push_str(line);
                if !buffer.trim_end().ends_with(';') {
                    continue;
                }

                let _ = rl.add_history_entry(buffer.as_str());
                match handle.query(&buffer) {
                    Ok(payloads) => payloads.iter().for_each(print_payload),
                    Err(e) => eprintln!("Error: {e}"),
                }
                buffer.clear();
            }
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {err:?}");
                break;
            }
        }
    }

    if let Some(path) = &history_file {
        let _ = rl.save_history(path);
    }
    Ok(())
}

/// Returns false when the shell should exit
fn meta_command(handle: &mut Handle, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let argument = parts.next();

    let sql = match (command, argument) {
        (".quit" | ".exit", _) => return false,
        (".tables", _) => "SHOW TABLES".to_string(),
        (".columns", Some(table)) => format!("SHOW COLUMNS FROM {table}"),
        (".dump", target) => {
            if let Err(e) = dump_to(handle, target) {
                eprintln!("Error: {e}");
            }
            return true;
        }
        (".help", _) => {
            println!("Meta commands:");
            println!("  .tables          List tables");
            println!("  .columns TABLE   Describe a table");
            println!("  .dump [FILE]     Write the database as SQL to FILE or stdout");
            println!("  .quit            Exit");
            return true;
        }
        _ => {
            println!("Unknown meta command: {line}. Use .help for help.");
            return true;
        }
    };

    match handle.query(&sql) {
        Ok(payloads) => payloads.iter().for_each(print_payload),
        Err(e) => eprintln!("Error: {e}"),
    }
    true
}

fn dump_to(handle: &Handle, target: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    match target {
        Some(path) => {
            let mut file = std::fs::File::create(path)?;
            dump(handle.storage(), &mut file, DumpOptions::default())?;
            println!("Wrote {path}");
        }
        None => dump(handle.storage(), &mut std::io::stdout(), DumpOptions::default())?,
    }
    Ok(())
}

fn print_payload(payload: &Payload) {
    match payload {
        Payload::Select { labels, rows } => {
            if rows.is_empty() {
                println!("(0 rows)");
                return;
            }
            let mut table = ComfyTable::new();
            table.load_preset(UTF8_FULL);
            table.set_header(labels.iter().map(Cell::new));
            for row in rows {
                table.add_row(row.iter().map(Cell::new));
            }
            println!("{table}\n({} rows)", rows.len());
        }
        Payload::Create { rows } => println!("CREATE TABLE ({rows} rows)"),
        Payload::Insert { rows } => println!("INSERT {rows}"),
        Payload::Update { rows } => println!("UPDATE {rows}"),
        Payload::Delete { rows } => println!("DELETE {rows}"),
        Payload::DropTable { count } => println!("DROP TABLE ({count} tables)"),
        Payload::AlterTable => println!("ALTER TABLE"),
        Payload::CreateIndex => println!("CREATE INDEX"),
        Payload::DropIndex => println!("DROP INDEX"),
        Payload::StartTransaction => println!("START TRANSACTION"),
        Payload::Commit => println!("COMMIT"),
        Payload::Rollback => println!("ROLLBACK"),
        Payload::ShowVariable { name, value } => println!("{name}: {value}"),
        Payload::ShowColumns { columns } => {
            let mut table = ComfyTable::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["column", "type"]);
            for (name, data_type) in columns {
                table.add_row(vec![Cell::new(name), Cell::new(data_type)]);
            }
            println!("{table}");
        }
    }
}
