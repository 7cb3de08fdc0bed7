use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use sakila_reports::render::render_text;
use sakila_reports::{
    import_csv_dir, logging, open_read_only, run_report, Config, ReportKind, ReportSource,
    VERSION,
};

#[derive(Parser, Debug)]
#[command(name = "sakila-reports")]
#[command(version = VERSION)]
#[command(about = "Business reports over the Sakila DVD rental database")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a Sakila CSV export (one file per table) into the database
    Import {
        /// Directory containing category.csv, film.csv, ... payment.csv
        dir: PathBuf,
    },

    /// Run one report
    Report {
        /// top_films_by_category | high_spending_customers | above_avg_films | q1_not_q2
        kind: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print headline counts
    Stats {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.config.log_level);

    match &cli.command {
        Command::Import { dir } => run_import(&cli.config, dir),
        Command::Report { kind, json } => run_report_command(&cli.config, kind, *json),
        Command::Stats { json } => run_stats(&cli.config, *json),
    }
}

fn run_import(config: &Config, dir: &Path) -> Result<()> {
    tracing::info!(db = %config.db_path.display(), source = %dir.display(), "importing CSV export");

    let mut conn = Connection::open(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;
    let summary = import_csv_dir(&mut conn, dir)?;

    println!("Imported {} rows into {}", summary.total(), config.db_path.display());
    println!("  categories:      {}", summary.categories);
    println!("  films:           {}", summary.films);
    println!("  film categories: {}", summary.film_categories);
    println!("  inventory:       {}", summary.inventory);
    println!("  customers:       {}", summary.customers);
    println!("  rentals:         {}", summary.rentals);
    println!("  payments:        {}", summary.payments);

    Ok(())
}

fn open(config: &Config) -> Result<Connection> {
    if !config.db_path.exists() {
        anyhow::bail!(
            "Database not found at {} (run `sakila-reports import <dir>` first)",
            config.db_path.display()
        );
    }
    let conn = open_read_only(&config.db_path, config.query_timeout())
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;
    Ok(conn)
}

fn run_report_command(config: &Config, kind: &str, json: bool) -> Result<()> {
    let kind: ReportKind = kind.parse()?;
    let conn = open(config)?;
    let report = run_report(&conn, kind, config.default_year)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", kind.title());
        println!("{}", render_text(&report));
    }

    Ok(())
}

fn run_stats(config: &Config, json: bool) -> Result<()> {
    let conn = open(config)?;
    let stats = conn.stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Films:      {}", stats.total_films);
        println!("Categories: {}", stats.total_categories);
        println!("Customers:  {}", stats.total_customers);
        println!("Rentals:    {}", stats.total_rentals);
        println!("Revenue:    ${:.2}", stats.total_revenue);
    }

    Ok(())
}
