//! pgvault CLI - typed, transparently-encrypted data access over PostgreSQL.

use clap::{Parser, Subcommand};
use pgvault::{
    parse_tables, Config, DatabaseSession, EncryptionKey, SessionConfig, SqlType, StorageRegistry,
    ValueType, VaultError,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "pgvault")]
#[command(about = "Typed, transparently-encrypted data access over PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "pgvault.yaml")]
    config: PathBuf,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a schema file and report tables, columns and value types
    Describe {
        /// Schema file to parse (defaults to the configured schema_file)
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Report a single table
        #[arg(long)]
        table: Option<String>,
    },

    /// Initialize the configured storage (idempotent)
    ///
    /// Set PGVAULT_PASSPHRASE to derive an encryption key; without it the
    /// store runs unencrypted.
    Init,

    /// Test the database connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), VaultError> {
    let cli = Cli::parse();

    // Handle describe with an explicit schema path separately: it is pure
    // parsing and needs no configuration file
    if let Commands::Describe {
        schema: Some(path),
        table,
    } = &cli.command
    {
        let schema_text = std::fs::read_to_string(path)?;
        describe(&schema_text, table.as_deref());
        return Ok(());
    }

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| VaultError::Config(e.to_string()))?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Describe { table, .. } => {
            let schema_text = config.schema_text()?;
            describe(&schema_text, table.as_deref());
        }

        Commands::Init => {
            let schema_text = config.schema_text()?;
            let key = std::env::var("PGVAULT_PASSPHRASE")
                .ok()
                .map(|p| EncryptionKey::from_passphrase(&p));
            if key.is_none() {
                info!("PGVAULT_PASSPHRASE not set; store will not be encrypted");
            }

            let registry = Arc::new(StorageRegistry::new(config.connection.clone()));
            let session = DatabaseSession::new(registry.clone());
            session
                .configure(SessionConfig {
                    storage: config.store.storage.clone(),
                    schema_text,
                    key,
                })
                .await?;

            let tables = session.table_names().await;
            println!(
                "Storage {} initialized with {} tables",
                config.store.storage,
                tables.len()
            );
            for name in tables {
                println!("  {}", name);
            }
            registry.close_all().await;
        }

        Commands::HealthCheck => {
            let registry = Arc::new(StorageRegistry::new(config.connection.clone()));
            registry.open(&config.store.storage).await?;
            registry.close_all().await;
            println!("Connection OK");
        }
    }

    Ok(())
}

/// Print the parsed schema report.
fn describe(schema_text: &str, only_table: Option<&str>) {
    let tables = parse_tables(schema_text);
    let mut shown = 0usize;

    for table in &tables {
        if let Some(only) = only_table {
            if !table.name.eq_ignore_ascii_case(only) {
                continue;
            }
        }
        shown += 1;

        println!("table {}", table.name);
        for column in &table.columns {
            let mut notes = Vec::new();
            if column.primary_key {
                notes.push("primary key");
            } else if column.required() {
                notes.push("required");
            }
            if column.sql_type == SqlType::Text {
                notes.push("encryptable");
            }
            let notes = if notes.is_empty() {
                String::new()
            } else {
                format!("  [{}]", notes.join(", "))
            };
            println!(
                "  {:<20} {}{}",
                column.name,
                describe_value_type(&column.value_type),
                notes
            );
        }
        if table.embedding_column().is_some() {
            println!("  (vector search available)");
        }
        println!();
    }

    if shown == 0 {
        match only_table {
            Some(name) => println!("table {} not found in schema", name),
            None => println!("no tables found in schema"),
        }
    }
}

fn describe_value_type(value_type: &ValueType) -> String {
    match value_type {
        ValueType::Integer => "integer".to_string(),
        ValueType::Text => "text".to_string(),
        ValueType::Boolean => "boolean".to_string(),
        ValueType::Timestamp => "timestamp".to_string(),
        ValueType::FloatVector(Some(dim)) => format!("vector({})", dim),
        ValueType::FloatVector(None) => "vector".to_string(),
        ValueType::Json => "json".to_string(),
        ValueType::Enum(literals) => format!("enum({})", literals.join(", ")),
        ValueType::Unknown(raw) => format!("unknown({})", raw),
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
