// Sakila Reports - Core Library
// Exposes the report engine for use in the CLI, the web server, and tests

pub mod config;
pub mod dataset;   // In-memory ReportSource
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod render;
pub mod reports;

// Only compile the web layer when the server feature is enabled
#[cfg(feature = "server")]
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use dataset::Dataset;
pub use db::{
    import_csv_dir, load_csv, open_read_only, ping, setup_database, ImportSummary,
};
pub use error::{ReportError, ReportResult};
pub use model::{Category, Customer, Film, FilmCategory, Inventory, Payment, Rental};
pub use reports::{
    run_report, CustomerSpend, FilmRentalRow, HighSpenders, LapsedCustomer, Quarter,
    QuarterWindow, Report, ReportKind, ReportSource, StoreStats, DEFAULT_YEAR,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
