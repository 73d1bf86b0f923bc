use clap::Parser;
use std::path::PathBuf;

pub const DB_PATH_ENV: &str = "TELEMETRY_DB_PATH";
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

/// Command line for the ingest service.
#[derive(Debug, Parser)]
#[command(name = "telemetry-ingestor", about = "Latest-reading-per-device telemetry API")]
pub struct Args {
    /// Path of the SQLite database file. Overrides $TELEMETRY_DB_PATH.
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Address the HTTP server binds to.
    #[arg(long, env = "HTTP_ADDR", default_value = DEFAULT_HTTP_ADDR)]
    pub http_addr: String,
}

/// Settings resolved once at startup and handed to whatever needs them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub http_addr: String,
}

impl Config {
    pub fn from_args(args: Args) -> Self {
        let env = std::env::var(DB_PATH_ENV).ok();
        Self {
            db_path: resolve_db_path(args.db_path, env),
            http_addr: args.http_addr,
        }
    }
}

/// Explicit path, then the environment, then `data/telemetry.db`.
/// Empty values count as unset.
pub fn resolve_db_path(explicit: Option<PathBuf>, env: Option<String>) -> PathBuf {
    explicit
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| env.filter(|s| !s.is_empty()).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data").join("telemetry.db")
}
