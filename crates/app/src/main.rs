use std::fmt;

use practice_core::config::EngineConfig;
use services::{Clock, Engine};
use storage::repository::Storage;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod catalog;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingCatalog,
    UnknownArg(String),
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingCatalog => write!(f, "import requires a catalog path"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  practice-engine serve         [--db <sqlite_url>] [--config <path>]");
    eprintln!("  practice-engine import <file> [--db <sqlite_url>] [--config <path>]");
    eprintln!("  practice-engine rebuild-graph [--force] [--db <sqlite_url>] [--config <path>]");
    eprintln!();
    eprintln!("serve reads one JSON request per line on stdin and answers on stdout.");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:practice.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PRACTICE_DB_URL, PRACTICE_CONFIG, LOG_LEVEL or RUST_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Serve,
    Import { path: String },
    RebuildGraph { force: bool },
}

#[derive(Debug)]
struct Args {
    command: Command,
    db_url: String,
    config_path: Option<String>,
}

impl Args {
    fn parse(argv: impl IntoIterator<Item = String>) -> Result<Option<Self>, ArgsError> {
        let mut args = argv.into_iter().peekable();
        let mut command = match args.peek().map(String::as_str) {
            None => Command::Serve,
            Some("--help" | "-h") => return Ok(None),
            Some(first) if first.starts_with("--") => Command::Serve,
            Some("serve") => {
                args.next();
                Command::Serve
            }
            Some("import") => {
                args.next();
                let path = args.next().ok_or(ArgsError::MissingCatalog)?;
                Command::Import { path }
            }
            Some("rebuild-graph") => {
                args.next();
                Command::RebuildGraph { force: false }
            }
            Some(other) => return Err(ArgsError::UnknownArg(other.to_string())),
        };

        let mut db_url = std::env::var("PRACTICE_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://practice.sqlite3".into(), normalize_sqlite_url);
        let mut config_path = std::env::var("PRACTICE_CONFIG").ok();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--config" => config_path = Some(require_value(&mut args, "--config")?),
                "--force" => match &mut command {
                    Command::RebuildGraph { force } => *force = true,
                    _ => return Err(ArgsError::UnknownArg(arg)),
                },
                "--help" | "-h" => return Ok(None),
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Some(Self {
            command,
            db_url,
            config_path,
        }))
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

/// Logs go to stderr so stdout stays reserved for responses.
fn init_tracing() {
    let filter = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn serve(engine: &Engine) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    info!("serving requests on stdin");
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = engine.handle_json(&line).await;
        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    info!("stdin closed, shutting down");
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let parsed = match Args::parse(std::env::args().skip(1)) {
        Ok(Some(args)) => args,
        Ok(None) => {
            print_usage();
            return Ok(());
        }
        Err(e) => {
            eprintln!("{e}");
            print_usage();
            return Err(e.into());
        }
    };

    let config = match &parsed.config_path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let storage = Storage::sqlite(&parsed.db_url).await?;
    let engine = Engine::new(&storage, &config, Clock::default())?;

    match parsed.command {
        Command::Serve => serve(&engine).await,
        Command::Import { path } => {
            let content = std::fs::read_to_string(&path)?;
            let entries = catalog::parse_catalog(&content)?;
            let summary = catalog::import_catalog(storage.problems.as_ref(), entries).await?;
            let outcome = engine.tags().rebuild(true).await?;
            info!(
                inserted = summary.inserted,
                updated = summary.updated,
                tags = outcome.tag_count,
                "imported catalog"
            );
            Ok(())
        }
        Command::RebuildGraph { force } => {
            let outcome = engine.tags().rebuild(force).await?;
            if !outcome.rebuilt {
                eprintln!("tag graph already present; pass --force to rebuild");
            }
            Ok(())
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| (*a).to_string()).collect()
    }

    #[test]
    fn defaults_to_serve() {
        let args = Args::parse(argv(&["--db", "sqlite::memory:"])).unwrap().unwrap();
        assert_eq!(args.command, Command::Serve);
        assert_eq!(args.db_url, "sqlite::memory:");
    }

    #[test]
    fn parses_subcommands() {
        let args = Args::parse(argv(&["rebuild-graph", "--force"])).unwrap().unwrap();
        assert_eq!(args.command, Command::RebuildGraph { force: true });

        let args = Args::parse(argv(&["import", "catalog.json", "--config", "engine.toml"]))
            .unwrap()
            .unwrap();
        assert_eq!(
            args.command,
            Command::Import {
                path: "catalog.json".into()
            }
        );
        assert_eq!(args.config_path.as_deref(), Some("engine.toml"));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(matches!(
            Args::parse(argv(&["serve", "--force"])),
            Err(ArgsError::UnknownArg(_))
        ));
        assert!(matches!(
            Args::parse(argv(&["import"])),
            Err(ArgsError::MissingCatalog)
        ));
        assert!(matches!(
            Args::parse(argv(&["--db"])),
            Err(ArgsError::MissingValue { flag: "--db" })
        ));
        assert!(Args::parse(argv(&["--help"])).unwrap().is_none());
    }
}
