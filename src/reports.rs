// Reporting Query Engine - the four business questions
//
// Each report is a pure read over the rental dataset. `ReportSource` is
// the data-access seam: SQLite (db.rs) and the in-memory Dataset
// (dataset.rs) both implement it, so callers pass whichever handle they
// hold and nothing else is shared between invocations.

use crate::error::{ReportError, ReportResult};
use chrono::{Datelike, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Year used by the reference deployment for the quarter comparison
pub const DEFAULT_YEAR: i32 = 2005;

// ============================================================================
// RESULT ROWS
// ============================================================================

/// (film, category, rental count) - output of the two film reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilmRentalRow {
    pub film_id: i64,
    pub title: String,
    pub category: String,
    pub rental_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSpend {
    pub customer_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_spend: Decimal,
}

/// Customers above the per-customer average, plus that average.
///
/// `average` is `None` only when nobody has paid anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighSpenders {
    #[serde(with = "rust_decimal::serde::float_option")]
    pub average: Option<Decimal>,
    pub customers: Vec<CustomerSpend>,
}

impl HighSpenders {
    /// Average rounded to cents, for display
    pub fn average_display(&self) -> Option<Decimal> {
        self.average.map(|avg| avg.round_dp(2))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LapsedCustomer {
    pub customer_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    /// Rentals in the active quarter
    pub rental_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_films: i64,
    pub total_customers: i64,
    pub total_rentals: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_revenue: Decimal,
    pub total_categories: i64,
}

// ============================================================================
// QUARTER WINDOW
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub fn number(self) -> u32 {
        match self {
            Quarter::Q1 => 1,
            Quarter::Q2 => 2,
            Quarter::Q3 => 3,
            Quarter::Q4 => 4,
        }
    }

    pub fn from_month(month: u32) -> Option<Quarter> {
        match month {
            1..=3 => Some(Quarter::Q1),
            4..=6 => Some(Quarter::Q2),
            7..=9 => Some(Quarter::Q3),
            10..=12 => Some(Quarter::Q4),
            _ => None,
        }
    }

    pub fn of(ts: &NaiveDateTime) -> Quarter {
        // chrono months are always 1..=12
        Quarter::from_month(ts.month()).unwrap_or(Quarter::Q4)
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}", self.number())
    }
}

/// "Rented in `active`, never in `inactive`, during `year`"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarterWindow {
    pub year: i32,
    pub active: Quarter,
    pub inactive: Quarter,
}

impl QuarterWindow {
    /// Q1 active, Q2 inactive
    pub fn first_half(year: i32) -> Self {
        QuarterWindow {
            year,
            active: Quarter::Q1,
            inactive: Quarter::Q2,
        }
    }

    pub fn validate(&self) -> ReportResult<()> {
        if !(1..=9999).contains(&self.year) {
            return Err(ReportError::invalid(format!(
                "year must be between 1 and 9999, got {}",
                self.year
            )));
        }
        if self.active == self.inactive {
            return Err(ReportError::invalid(format!(
                "active and inactive quarters must differ, both are {}",
                self.active
            )));
        }
        Ok(())
    }

    pub fn contains(&self, ts: &NaiveDateTime, quarter: Quarter) -> bool {
        ts.year() == self.year && Quarter::of(ts) == quarter
    }
}

// ============================================================================
// DATA-ACCESS SEAM
// ============================================================================

pub trait ReportSource {
    /// Film(s) with the most rentals in each category; ties are all kept.
    ///
    /// Ordered by category name, rental count descending, then title.
    fn top_films_by_category(&self) -> ReportResult<Vec<FilmRentalRow>>;

    /// Customers whose total spend is strictly above the mean of the
    /// per-customer totals. Ordered by total spend descending.
    fn high_spending_customers(&self) -> ReportResult<HighSpenders>;

    /// (film, category) pairs where the film's rental count is strictly
    /// above the average count of films in that category.
    fn films_above_category_average(&self) -> ReportResult<Vec<FilmRentalRow>>;

    /// Customers who rented in `window.active` but not in
    /// `window.inactive`. Ordered by last name, first name.
    fn lapsed_customers(&self, window: &QuarterWindow) -> ReportResult<Vec<LapsedCustomer>>;

    /// Headline counts for the stats endpoint
    fn stats(&self) -> ReportResult<StoreStats>;
}

// ============================================================================
// REPORT DISPATCH
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    TopFilmsByCategory,
    HighSpendingCustomers,
    AboveAvgFilms,
    Q1NotQ2,
}

impl ReportKind {
    pub const ALL: [ReportKind; 4] = [
        ReportKind::TopFilmsByCategory,
        ReportKind::HighSpendingCustomers,
        ReportKind::AboveAvgFilms,
        ReportKind::Q1NotQ2,
    ];

    /// Stable key used in URLs and on the command line
    pub fn key(self) -> &'static str {
        match self {
            ReportKind::TopFilmsByCategory => "top_films_by_category",
            ReportKind::HighSpendingCustomers => "high_spending_customers",
            ReportKind::AboveAvgFilms => "above_avg_films",
            ReportKind::Q1NotQ2 => "q1_not_q2",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ReportKind::TopFilmsByCategory => "Most rented film per category",
            ReportKind::HighSpendingCustomers => "Customers spending above average",
            ReportKind::AboveAvgFilms => "Films rented more than their category average",
            ReportKind::Q1NotQ2 => "Customers active in Q1 but not in Q2",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ReportKind::TopFilmsByCategory => {
                "The most popular film of each category by total rentals. Ties are all listed."
            }
            ReportKind::HighSpendingCustomers => {
                "Customers whose total payments exceed the average total per customer."
            }
            ReportKind::AboveAvgFilms => {
                "Films whose rental count beats the average of the films in the same category."
            }
            ReportKind::Q1NotQ2 => {
                "Customers who rented in the first quarter and did not come back in the second."
            }
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ReportKind {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportKind::ALL
            .into_iter()
            .find(|kind| kind.key() == s)
            .ok_or_else(|| ReportError::invalid(format!("unknown report: {:?}", s)))
    }
}

/// One computed report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "report", content = "result", rename_all = "snake_case")]
pub enum Report {
    TopFilmsByCategory(Vec<FilmRentalRow>),
    HighSpendingCustomers(HighSpenders),
    AboveAvgFilms(Vec<FilmRentalRow>),
    Q1NotQ2 {
        window: QuarterWindow,
        customers: Vec<LapsedCustomer>,
    },
}

impl Report {
    pub fn kind(&self) -> ReportKind {
        match self {
            Report::TopFilmsByCategory(_) => ReportKind::TopFilmsByCategory,
            Report::HighSpendingCustomers(_) => ReportKind::HighSpendingCustomers,
            Report::AboveAvgFilms(_) => ReportKind::AboveAvgFilms,
            Report::Q1NotQ2 { .. } => ReportKind::Q1NotQ2,
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            Report::TopFilmsByCategory(rows) | Report::AboveAvgFilms(rows) => rows.len(),
            Report::HighSpendingCustomers(spenders) => spenders.customers.len(),
            Report::Q1NotQ2 { customers, .. } => customers.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }
}

/// Run one report against any source. `year` only matters for the
/// quarter comparison.
pub fn run_report<S: ReportSource + ?Sized>(
    source: &S,
    kind: ReportKind,
    year: i32,
) -> ReportResult<Report> {
    tracing::debug!(report = %kind, year, "running report");

    let report = match kind {
        ReportKind::TopFilmsByCategory => Report::TopFilmsByCategory(source.top_films_by_category()?),
        ReportKind::HighSpendingCustomers => {
            Report::HighSpendingCustomers(source.high_spending_customers()?)
        }
        ReportKind::AboveAvgFilms => Report::AboveAvgFilms(source.films_above_category_average()?),
        ReportKind::Q1NotQ2 => {
            let window = QuarterWindow::first_half(year);
            window.validate()?;
            Report::Q1NotQ2 {
                window,
                customers: source.lapsed_customers(&window)?,
            }
        }
    };

    tracing::info!(report = %kind, rows = report.row_count(), "report complete");
    Ok(report)
}
