// Runtime configuration shared by the CLI and the server
//
// Every flag has an environment fallback so the server can be configured
// from a container definition without arguments.

use crate::reports::DEFAULT_YEAR;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args, Debug, Clone)]
pub struct Config {
    /// SQLite database holding the Sakila tables
    #[arg(long = "db", env = "SAKILA_DB", default_value = "sakila.db", global = true)]
    pub db_path: PathBuf,

    /// Year used by the quarter comparison report
    #[arg(long = "year", env = "SAKILA_YEAR", default_value_t = DEFAULT_YEAR, global = true)]
    pub default_year: i32,

    /// Upper bound on a single report's data access
    #[arg(
        long = "query-timeout-secs",
        env = "SAKILA_QUERY_TIMEOUT_SECS",
        default_value_t = 30,
        global = true
    )]
    pub query_timeout_secs: u64,

    /// Log filter (tracing EnvFilter syntax)
    #[arg(long = "log-level", env = "RUST_LOG", default_value = "info", global = true)]
    pub log_level: String,
}

impl Config {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: PathBuf::from("sakila.db"),
            default_year: DEFAULT_YEAR,
            query_timeout_secs: 30,
            log_level: "info".to_string(),
        }
    }
}
