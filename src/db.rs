use crate::error::ReportResult;
use crate::model::{
    format_timestamp, parse_timestamp, Category, Customer, Film, FilmCategory, Inventory, Payment,
    Rental,
};
use crate::reports::{
    CustomerSpend, FilmRentalRow, HighSpenders, LapsedCustomer, QuarterWindow, ReportSource,
    StoreStats,
};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rusqlite::{params, Connection, OpenFlags, Row};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;

/// Money column → integer cents, so sums stay exact
const CENTS: &str = "CAST(ROUND(amount * 100) AS INTEGER)";

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode so report readers never block the importer
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Reporting subset of the Sakila schema
    // ==========================================================================
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS category (
            category_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS film (
            film_id INTEGER PRIMARY KEY,
            title TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS film_category (
            film_id INTEGER NOT NULL REFERENCES film(film_id),
            category_id INTEGER NOT NULL REFERENCES category(category_id),
            PRIMARY KEY (film_id, category_id)
        );

        CREATE TABLE IF NOT EXISTS inventory (
            inventory_id INTEGER PRIMARY KEY,
            film_id INTEGER NOT NULL REFERENCES film(film_id),
            store_id INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS customer (
            customer_id INTEGER PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT
        );

        CREATE TABLE IF NOT EXISTS rental (
            rental_id INTEGER PRIMARY KEY,
            rental_date TEXT NOT NULL,
            inventory_id INTEGER NOT NULL REFERENCES inventory(inventory_id),
            customer_id INTEGER NOT NULL REFERENCES customer(customer_id),
            return_date TEXT
        );

        CREATE TABLE IF NOT EXISTS payment (
            payment_id INTEGER PRIMARY KEY,
            customer_id INTEGER NOT NULL REFERENCES customer(customer_id),
            rental_id INTEGER REFERENCES rental(rental_id),
            amount NUMERIC NOT NULL CHECK (amount >= 0),
            payment_date TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_inventory_film ON inventory(film_id);
        CREATE INDEX IF NOT EXISTS idx_rental_inventory ON rental(inventory_id);
        CREATE INDEX IF NOT EXISTS idx_rental_customer ON rental(customer_id);
        CREATE INDEX IF NOT EXISTS idx_rental_date ON rental(rental_date);
        CREATE INDEX IF NOT EXISTS idx_payment_customer ON payment(customer_id);
        CREATE INDEX IF NOT EXISTS idx_film_category_category ON film_category(category_id);",
    )?;

    Ok(())
}

/// Open an existing database for reporting only.
///
/// Each request gets its own handle; dropping it releases the file.
pub fn open_read_only(path: &Path, busy_timeout: Duration) -> ReportResult<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI,
    )?;
    conn.busy_timeout(busy_timeout)?;
    Ok(conn)
}

/// Liveness probe for the health endpoint
pub fn ping(conn: &Connection) -> ReportResult<()> {
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
    Ok(())
}

// ============================================================================
// Inserts (importer and tests)
// ============================================================================

pub fn insert_categories(conn: &Connection, rows: &[Category]) -> Result<usize> {
    let mut stmt = conn.prepare("INSERT INTO category (category_id, name) VALUES (?1, ?2)")?;
    for c in rows {
        stmt.execute(params![c.category_id, c.name])?;
    }
    Ok(rows.len())
}

pub fn insert_films(conn: &Connection, rows: &[Film]) -> Result<usize> {
    let mut stmt = conn.prepare("INSERT INTO film (film_id, title) VALUES (?1, ?2)")?;
    for f in rows {
        stmt.execute(params![f.film_id, f.title])?;
    }
    Ok(rows.len())
}

pub fn insert_film_categories(conn: &Connection, rows: &[FilmCategory]) -> Result<usize> {
    let mut stmt =
        conn.prepare("INSERT INTO film_category (film_id, category_id) VALUES (?1, ?2)")?;
    for fc in rows {
        stmt.execute(params![fc.film_id, fc.category_id])?;
    }
    Ok(rows.len())
}

pub fn insert_inventory(conn: &Connection, rows: &[Inventory]) -> Result<usize> {
    let mut stmt = conn
        .prepare("INSERT INTO inventory (inventory_id, film_id, store_id) VALUES (?1, ?2, ?3)")?;
    for i in rows {
        stmt.execute(params![i.inventory_id, i.film_id, i.store_id])?;
    }
    Ok(rows.len())
}

pub fn insert_customers(conn: &Connection, rows: &[Customer]) -> Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO customer (customer_id, first_name, last_name, email) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for c in rows {
        stmt.execute(params![c.customer_id, c.first_name, c.last_name, c.email])?;
    }
    Ok(rows.len())
}

pub fn insert_rentals(conn: &Connection, rows: &[Rental]) -> Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO rental (rental_id, rental_date, inventory_id, customer_id, return_date)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for r in rows {
        stmt.execute(params![
            r.rental_id,
            format_timestamp(&r.rental_date),
            r.inventory_id,
            r.customer_id,
            r.return_date.as_ref().map(format_timestamp),
        ])?;
    }
    Ok(rows.len())
}

pub fn insert_payments(conn: &Connection, rows: &[Payment]) -> Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO payment (payment_id, customer_id, rental_id, amount, payment_date)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for p in rows {
        // Stored as text so SQLite's NUMERIC affinity parses the exact literal
        stmt.execute(params![
            p.payment_id,
            p.customer_id,
            p.rental_id,
            p.amount.round_dp(2).to_string(),
            format_timestamp(&p.payment_date),
        ])?;
    }
    Ok(rows.len())
}

// ============================================================================
// CSV import
// ============================================================================

/// Rows loaded per table by `import_csv_dir`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub categories: usize,
    pub films: usize,
    pub film_categories: usize,
    pub inventory: usize,
    pub customers: usize,
    pub rentals: usize,
    pub payments: usize,
}

impl ImportSummary {
    pub fn total(&self) -> usize {
        self.categories
            + self.films
            + self.film_categories
            + self.inventory
            + self.customers
            + self.rentals
            + self.payments
    }
}

pub fn load_csv<T: DeserializeOwned>(csv_path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;

    let mut rows = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        // +2: header line, 1-based numbering
        let row: T = result.with_context(|| {
            format!("Failed to deserialize {} line {}", csv_path.display(), line + 2)
        })?;
        rows.push(row);
    }

    Ok(rows)
}

/// Load a Sakila CSV export (one file per table) into `conn`.
///
/// Everything happens in one transaction; a bad file leaves the
/// database untouched.
pub fn import_csv_dir(conn: &mut Connection, dir: &Path) -> Result<ImportSummary> {
    setup_database(conn)?;

    let categories: Vec<Category> = load_csv(&dir.join("category.csv"))?;
    let films: Vec<Film> = load_csv(&dir.join("film.csv"))?;
    let film_categories: Vec<FilmCategory> = load_csv(&dir.join("film_category.csv"))?;
    let inventory: Vec<Inventory> = load_csv(&dir.join("inventory.csv"))?;
    let customers: Vec<Customer> = load_csv(&dir.join("customer.csv"))?;
    let rentals: Vec<Rental> = load_csv(&dir.join("rental.csv"))?;
    let payments: Vec<Payment> = load_csv(&dir.join("payment.csv"))?;

    let tx = conn.transaction()?;
    let summary = ImportSummary {
        categories: insert_categories(&tx, &categories).context("Failed to insert categories")?,
        films: insert_films(&tx, &films).context("Failed to insert films")?,
        film_categories: insert_film_categories(&tx, &film_categories)
            .context("Failed to insert film categories")?,
        inventory: insert_inventory(&tx, &inventory).context("Failed to insert inventory")?,
        customers: insert_customers(&tx, &customers).context("Failed to insert customers")?,
        rentals: insert_rentals(&tx, &rentals).context("Failed to insert rentals")?,
        payments: insert_payments(&tx, &payments).context("Failed to insert payments")?,
    };
    tx.commit()?;

    tracing::info!(
        categories = summary.categories,
        films = summary.films,
        film_categories = summary.film_categories,
        inventory = summary.inventory,
        customers = summary.customers,
        rentals = summary.rentals,
        payments = summary.payments,
        "import complete"
    );

    Ok(summary)
}

// ============================================================================
// Table reads (feed the in-memory Dataset)
// ============================================================================

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<chrono::NaiveDateTime> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp {:?}", raw).into(),
        )
    })
}

fn cents_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let cents: i64 = row.get(idx)?;
    Ok(Decimal::new(cents, 2))
}

pub fn get_categories(conn: &Connection) -> ReportResult<Vec<Category>> {
    let mut stmt = conn.prepare("SELECT category_id, name FROM category ORDER BY category_id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Category {
                category_id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_films(conn: &Connection) -> ReportResult<Vec<Film>> {
    let mut stmt = conn.prepare("SELECT film_id, title FROM film ORDER BY film_id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Film {
                film_id: row.get(0)?,
                title: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_film_categories(conn: &Connection) -> ReportResult<Vec<FilmCategory>> {
    let mut stmt = conn.prepare(
        "SELECT film_id, category_id FROM film_category ORDER BY film_id, category_id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(FilmCategory {
                film_id: row.get(0)?,
                category_id: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_inventory(conn: &Connection) -> ReportResult<Vec<Inventory>> {
    let mut stmt = conn
        .prepare("SELECT inventory_id, film_id, store_id FROM inventory ORDER BY inventory_id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Inventory {
                inventory_id: row.get(0)?,
                film_id: row.get(1)?,
                store_id: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_customers(conn: &Connection) -> ReportResult<Vec<Customer>> {
    let mut stmt = conn.prepare(
        "SELECT customer_id, first_name, last_name, email FROM customer ORDER BY customer_id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Customer {
                customer_id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                email: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_rentals(conn: &Connection) -> ReportResult<Vec<Rental>> {
    let mut stmt = conn.prepare(
        "SELECT rental_id, rental_date, inventory_id, customer_id, return_date
         FROM rental
         ORDER BY rental_id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let return_date: Option<String> = row.get(4)?;
            Ok(Rental {
                rental_id: row.get(0)?,
                rental_date: timestamp_column(row, 1)?,
                inventory_id: row.get(2)?,
                customer_id: row.get(3)?,
                return_date: return_date.as_deref().and_then(parse_timestamp),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_payments(conn: &Connection) -> ReportResult<Vec<Payment>> {
    let sql = format!(
        "SELECT payment_id, customer_id, rental_id, {CENTS}, payment_date
         FROM payment
         ORDER BY payment_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Payment {
                payment_id: row.get(0)?,
                customer_id: row.get(1)?,
                rental_id: row.get(2)?,
                amount: cents_column(row, 3)?,
                payment_date: timestamp_column(row, 4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============================================================================
// Reports over SQLite
// ============================================================================

fn film_rental_row(row: &Row<'_>) -> rusqlite::Result<FilmRentalRow> {
    Ok(FilmRentalRow {
        film_id: row.get(0)?,
        title: row.get(1)?,
        category: row.get(2)?,
        rental_count: row.get(3)?,
    })
}

impl ReportSource for Connection {
    fn top_films_by_category(&self) -> ReportResult<Vec<FilmRentalRow>> {
        let mut stmt = self.prepare(
            "WITH film_counts AS (
                SELECT f.film_id, f.title, c.category_id, c.name AS category_name,
                       COUNT(r.rental_id) AS rental_count
                FROM film f
                JOIN inventory i ON i.film_id = f.film_id
                JOIN rental r ON r.inventory_id = i.inventory_id
                JOIN film_category fc ON fc.film_id = f.film_id
                JOIN category c ON c.category_id = fc.category_id
                GROUP BY f.film_id, f.title, c.category_id, c.name
            ),
            category_max AS (
                SELECT category_id, MAX(rental_count) AS max_rentals
                FROM film_counts
                GROUP BY category_id
            )
            SELECT fc.film_id, fc.title, fc.category_name, fc.rental_count
            FROM film_counts fc
            JOIN category_max m
              ON m.category_id = fc.category_id AND m.max_rentals = fc.rental_count
            ORDER BY fc.category_name, fc.rental_count DESC, fc.title, fc.film_id",
        )?;

        let rows = stmt
            .query_map([], film_rental_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn high_spending_customers(&self) -> ReportResult<HighSpenders> {
        // Average and filter must see the same rows
        let tx = self.unchecked_transaction()?;

        let totals = format!(
            "SELECT c.customer_id, SUM({CENTS}) AS total_cents
             FROM customer c
             JOIN payment p ON p.customer_id = c.customer_id
             GROUP BY c.customer_id"
        );

        let (customer_count, grand_total_cents): (i64, Option<i64>) = tx.query_row(
            &format!("SELECT COUNT(*), SUM(total_cents) FROM ({totals})"),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        if customer_count == 0 {
            return Ok(HighSpenders {
                average: None,
                customers: Vec::new(),
            });
        }
        let grand_total_cents = grand_total_cents.unwrap_or(0);
        let average = Decimal::new(grand_total_cents, 2) / Decimal::from(customer_count);

        // total > grand_total / n  <=>  total * n > grand_total (integers, exact)
        let mut stmt = tx.prepare(&format!(
            "SELECT c.customer_id, c.first_name, c.last_name, c.email, t.total_cents
             FROM customer c
             JOIN ({totals}) t ON t.customer_id = c.customer_id
             WHERE t.total_cents * ?1 > ?2
             ORDER BY t.total_cents DESC, c.customer_id"
        ))?;

        let customers = stmt
            .query_map(params![customer_count, grand_total_cents], |row| {
                Ok(CustomerSpend {
                    customer_id: row.get(0)?,
                    first_name: row.get(1)?,
                    last_name: row.get(2)?,
                    email: row.get(3)?,
                    total_spend: cents_column(row, 4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        drop(stmt);
        tx.finish()?;

        Ok(HighSpenders {
            average: Some(average),
            customers,
        })
    }

    fn films_above_category_average(&self) -> ReportResult<Vec<FilmRentalRow>> {
        let mut stmt = self.prepare(
            "WITH film_counts AS (
                SELECT f.film_id, COUNT(r.rental_id) AS rental_count
                FROM film f
                JOIN inventory i ON i.film_id = f.film_id
                JOIN rental r ON r.inventory_id = i.inventory_id
                GROUP BY f.film_id
            ),
            category_stats AS (
                SELECT fc.category_id,
                       COUNT(*) AS film_count,
                       SUM(cnt.rental_count) AS rental_sum
                FROM film_category fc
                JOIN film_counts cnt ON cnt.film_id = fc.film_id
                GROUP BY fc.category_id
            )
            SELECT f.film_id, f.title, c.name, cnt.rental_count
            FROM film f
            JOIN film_counts cnt ON cnt.film_id = f.film_id
            JOIN film_category fc ON fc.film_id = f.film_id
            JOIN category c ON c.category_id = fc.category_id
            JOIN category_stats s ON s.category_id = fc.category_id
            WHERE cnt.rental_count * s.film_count > s.rental_sum
            ORDER BY c.name, cnt.rental_count DESC, f.title, f.film_id",
        )?;

        let rows = stmt
            .query_map([], film_rental_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn lapsed_customers(&self, window: &QuarterWindow) -> ReportResult<Vec<LapsedCustomer>> {
        window.validate()?;

        let mut stmt = self.prepare(
            "WITH period AS (
                SELECT r.customer_id,
                       (CAST(strftime('%m', r.rental_date) AS INTEGER) + 2) / 3 AS quarter
                FROM rental r
                WHERE CAST(strftime('%Y', r.rental_date) AS INTEGER) = ?1
            )
            SELECT c.customer_id, c.first_name, c.last_name, c.email, COUNT(*) AS rental_count
            FROM customer c
            JOIN period p ON p.customer_id = c.customer_id
            WHERE p.quarter = ?2
              AND c.customer_id NOT IN (SELECT customer_id FROM period WHERE quarter = ?3)
            GROUP BY c.customer_id, c.first_name, c.last_name, c.email
            ORDER BY c.last_name, c.first_name, c.customer_id",
        )?;

        let rows = stmt
            .query_map(
                params![window.year, window.active.number(), window.inactive.number()],
                |row| {
                    Ok(LapsedCustomer {
                        customer_id: row.get(0)?,
                        first_name: row.get(1)?,
                        last_name: row.get(2)?,
                        email: row.get(3)?,
                        rental_count: row.get(4)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn stats(&self) -> ReportResult<StoreStats> {
        let stats = self.query_row(
            &format!(
                "SELECT
                    (SELECT COUNT(*) FROM film),
                    (SELECT COUNT(*) FROM customer),
                    (SELECT COUNT(*) FROM rental),
                    (SELECT COALESCE(SUM({CENTS}), 0) FROM payment),
                    (SELECT COUNT(*) FROM category)"
            ),
            [],
            |row| {
                Ok(StoreStats {
                    total_films: row.get(0)?,
                    total_customers: row.get(1)?,
                    total_rentals: row.get(2)?,
                    total_revenue: cents_column(row, 3)?,
                    total_categories: row.get(4)?,
                })
            },
        )?;
        Ok(stats)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::reports::{Quarter, QuarterWindow};
    use chrono::{NaiveDate, NaiveDateTime};
    use std::io::Write;

    pub(crate) fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    /// Builder for small rental worlds, written straight into SQLite
    pub(crate) struct Fixture {
        pub conn: Connection,
        next_inventory: i64,
        next_rental: i64,
        next_payment: i64,
    }

    impl Fixture {
        pub fn new() -> Self {
            let conn = Connection::open_in_memory().unwrap();
            setup_database(&conn).unwrap();
            Fixture {
                conn,
                next_inventory: 1,
                next_rental: 1,
                next_payment: 1,
            }
        }

        pub fn category(&mut self, id: i64, name: &str) -> &mut Self {
            insert_categories(
                &self.conn,
                &[Category {
                    category_id: id,
                    name: name.to_string(),
                }],
            )
            .unwrap();
            self
        }

        pub fn film(&mut self, id: i64, title: &str, categories: &[i64]) -> &mut Self {
            insert_films(
                &self.conn,
                &[Film {
                    film_id: id,
                    title: title.to_string(),
                }],
            )
            .unwrap();
            let memberships: Vec<FilmCategory> = categories
                .iter()
                .map(|&category_id| FilmCategory {
                    film_id: id,
                    category_id,
                })
                .collect();
            insert_film_categories(&self.conn, &memberships).unwrap();
            self
        }

        pub fn customer(&mut self, id: i64, first: &str, last: &str, email: Option<&str>) -> &mut Self {
            insert_customers(
                &self.conn,
                &[Customer {
                    customer_id: id,
                    first_name: first.to_string(),
                    last_name: last.to_string(),
                    email: email.map(str::to_string),
                }],
            )
            .unwrap();
            self
        }

        /// `count` rentals of one fresh inventory copy of `film_id`
        pub fn rentals(&mut self, film_id: i64, customer_id: i64, at: NaiveDateTime, count: usize) -> &mut Self {
            let inventory_id = self.next_inventory;
            self.next_inventory += 1;
            insert_inventory(
                &self.conn,
                &[Inventory {
                    inventory_id,
                    film_id,
                    store_id: 1,
                }],
            )
            .unwrap();

            let rentals: Vec<Rental> = (0..count)
                .map(|_| {
                    let rental_id = self.next_rental;
                    self.next_rental += 1;
                    Rental {
                        rental_id,
                        rental_date: at,
                        inventory_id,
                        customer_id,
                        return_date: None,
                    }
                })
                .collect();
            insert_rentals(&self.conn, &rentals).unwrap();
            self
        }

        pub fn payment(&mut self, customer_id: i64, amount: &str) -> &mut Self {
            let payment_id = self.next_payment;
            self.next_payment += 1;
            insert_payments(
                &self.conn,
                &[Payment {
                    payment_id,
                    customer_id,
                    rental_id: None,
                    amount: amount.parse().unwrap(),
                    payment_date: ts(2005, 6, 1),
                }],
            )
            .unwrap();
            self
        }
    }

    fn row(title: &str, category: &str, count: i64) -> (String, String, i64) {
        (title.to_string(), category.to_string(), count)
    }

    fn triples(rows: &[FilmRentalRow]) -> Vec<(String, String, i64)> {
        rows.iter()
            .map(|r| (r.title.clone(), r.category.clone(), r.rental_count))
            .collect()
    }

    #[test]
    fn test_setup_database_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();
        ping(&conn).unwrap();
    }

    #[test]
    fn test_top_films_keeps_ties() {
        let mut fx = Fixture::new();
        fx.category(1, "Action")
            .category(2, "Comedy")
            .customer(1, "Ann", "Lee", None)
            .film(1, "F1", &[1])
            .film(2, "F2", &[1])
            .film(3, "F3", &[2])
            .rentals(1, 1, ts(2005, 5, 1), 5)
            .rentals(2, 1, ts(2005, 5, 1), 5)
            .rentals(3, 1, ts(2005, 5, 1), 2);

        let rows = fx.conn.top_films_by_category().unwrap();
        assert_eq!(
            triples(&rows),
            vec![row("F1", "Action", 5), row("F2", "Action", 5), row("F3", "Comedy", 2)]
        );
    }

    #[test]
    fn test_top_films_skips_unrented_categories_and_films() {
        let mut fx = Fixture::new();
        fx.category(1, "Drama")
            .category(2, "Horror")
            .customer(1, "Ann", "Lee", None)
            .film(1, "Rented", &[1])
            .film(2, "Shelf", &[1])
            .film(3, "Nobody", &[2])
            .rentals(1, 1, ts(2005, 5, 1), 1);

        let rows = fx.conn.top_films_by_category().unwrap();
        assert_eq!(triples(&rows), vec![row("Rented", "Drama", 1)]);
    }

    #[test]
    fn test_top_films_counts_across_copies() {
        let mut fx = Fixture::new();
        fx.category(1, "Sci-Fi")
            .customer(1, "Ann", "Lee", None)
            .film(1, "Two Copies", &[1])
            .film(2, "One Copy", &[1])
            .rentals(1, 1, ts(2005, 5, 1), 2)
            .rentals(1, 1, ts(2005, 5, 2), 2)
            .rentals(2, 1, ts(2005, 5, 1), 3);

        let rows = fx.conn.top_films_by_category().unwrap();
        assert_eq!(triples(&rows), vec![row("Two Copies", "Sci-Fi", 4)]);
    }

    #[test]
    fn test_high_spenders_example() {
        let mut fx = Fixture::new();
        fx.customer(1, "Cara", "One", Some("c1@example.com"))
            .customer(2, "Cody", "Two", None)
            .customer(3, "Cleo", "Three", None)
            .payment(1, "60.00")
            .payment(1, "40.00")
            .payment(2, "50.00")
            .payment(3, "10.00");

        let result = fx.conn.high_spending_customers().unwrap();
        assert_eq!(result.average_display(), Some(Decimal::new(5333, 2)));
        assert_eq!(result.customers.len(), 1);
        assert_eq!(result.customers[0].customer_id, 1);
        assert_eq!(result.customers[0].total_spend, Decimal::new(10000, 2));
        assert_eq!(result.customers[0].email.as_deref(), Some("c1@example.com"));
    }

    #[test]
    fn test_high_spenders_excludes_exact_average() {
        // totals 0.10, 0.20, 0.30 -> average exactly 0.20
        let mut fx = Fixture::new();
        fx.customer(1, "A", "A", None)
            .customer(2, "B", "B", None)
            .customer(3, "C", "C", None)
            .payment(1, "0.10")
            .payment(2, "0.10")
            .payment(2, "0.10")
            .payment(3, "0.30");

        let result = fx.conn.high_spending_customers().unwrap();
        assert_eq!(result.average, Some(Decimal::new(20, 2)));
        let ids: Vec<i64> = result.customers.iter().map(|c| c.customer_id).collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn test_high_spenders_averages_per_customer_not_per_payment() {
        // per-payment mean is 20 (would let customer 1 in), per-customer mean is 70
        let mut fx = Fixture::new();
        fx.customer(1, "Many", "Small", None)
            .customer(2, "One", "Big", None)
            .payment(1, "10.00")
            .payment(1, "10.00")
            .payment(1, "10.00")
            .payment(1, "10.00")
            .payment(1, "10.00")
            .payment(2, "50.00")
            .payment(2, "40.00");

        let result = fx.conn.high_spending_customers().unwrap();
        assert_eq!(result.average, Some(Decimal::new(7000, 2)));
        assert_eq!(result.customers.len(), 1);
        assert_eq!(result.customers[0].customer_id, 2);
    }

    #[test]
    fn test_high_spenders_without_payments() {
        let mut fx = Fixture::new();
        fx.customer(1, "No", "Money", None);

        let result = fx.conn.high_spending_customers().unwrap();
        assert_eq!(result.average, None);
        assert!(result.customers.is_empty());
    }

    #[test]
    fn test_films_above_category_average() {
        let mut fx = Fixture::new();
        fx.category(1, "Action")
            .category(2, "Solo")
            .customer(1, "Ann", "Lee", None)
            .film(1, "Hit", &[1])
            .film(2, "Ok", &[1])
            .film(3, "Flop", &[1])
            .film(4, "Alone", &[2])
            .rentals(1, 1, ts(2005, 5, 1), 6)
            .rentals(2, 1, ts(2005, 5, 1), 3)
            .rentals(3, 1, ts(2005, 5, 1), 1)
            .rentals(4, 1, ts(2005, 5, 1), 9);

        // Action average = 10 / 3; only Hit beats it. Solo has one film.
        let rows = fx.conn.films_above_category_average().unwrap();
        assert_eq!(triples(&rows), vec![row("Hit", "Action", 6)]);
    }

    #[test]
    fn test_films_above_average_multi_category_film() {
        let mut fx = Fixture::new();
        fx.category(1, "Action")
            .category(2, "Comedy")
            .customer(1, "Ann", "Lee", None)
            .film(1, "Crossover", &[1, 2])
            .film(2, "Brawl", &[1])
            .film(3, "Laughs", &[2])
            .rentals(1, 1, ts(2005, 5, 1), 4)
            .rentals(2, 1, ts(2005, 5, 1), 2)
            .rentals(3, 1, ts(2005, 5, 1), 8);

        // Action avg 3 -> Crossover qualifies; Comedy avg 6 -> Laughs qualifies
        let rows = fx.conn.films_above_category_average().unwrap();
        assert_eq!(
            triples(&rows),
            vec![row("Crossover", "Action", 4), row("Laughs", "Comedy", 8)]
        );
    }

    #[test]
    fn test_lapsed_customers() {
        let mut fx = Fixture::new();
        fx.category(1, "Action")
            .film(1, "F1", &[1])
            .customer(1, "Quinn", "Early", None)
            .customer(2, "Bo", "Both", None)
            .customer(3, "Lou", "Late", None)
            .customer(4, "Abe", "Early", Some("abe@example.com"))
            .customer(5, "Old", "Year", None)
            .rentals(1, 1, ts(2005, 1, 10), 2)
            .rentals(1, 1, ts(2005, 3, 31), 1)
            .rentals(1, 2, ts(2005, 2, 10), 1)
            .rentals(1, 2, ts(2005, 5, 10), 1)
            .rentals(1, 3, ts(2005, 4, 1), 1)
            .rentals(1, 4, ts(2005, 1, 1), 1)
            .rentals(1, 5, ts(2006, 1, 1), 1)
            .rentals(1, 5, ts(2005, 7, 1), 1);

        let rows = fx
            .conn
            .lapsed_customers(&QuarterWindow::first_half(2005))
            .unwrap();
        let got: Vec<(i64, i64)> = rows.iter().map(|c| (c.customer_id, c.rental_count)).collect();
        // ordered by last name then first name: Early/Abe, Early/Quinn
        assert_eq!(got, vec![(4, 1), (1, 3)]);
        assert_eq!(rows[0].email.as_deref(), Some("abe@example.com"));

        let other_year = fx
            .conn
            .lapsed_customers(&QuarterWindow::first_half(2006))
            .unwrap();
        assert_eq!(other_year.len(), 1);
        assert_eq!(other_year[0].customer_id, 5);

        let q3_not_q1 = QuarterWindow {
            year: 2005,
            active: Quarter::Q3,
            inactive: Quarter::Q1,
        };
        let rows = fx.conn.lapsed_customers(&q3_not_q1).unwrap();
        assert_eq!(rows.iter().map(|c| c.customer_id).collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn test_lapsed_customers_rejects_bad_year() {
        let fx = Fixture::new();
        let err = fx
            .conn
            .lapsed_customers(&QuarterWindow::first_half(0))
            .unwrap_err();
        assert!(err.is_invalid_parameter());
    }

    #[test]
    fn test_stats() {
        let mut fx = Fixture::new();
        fx.category(1, "Action")
            .category(2, "Comedy")
            .film(1, "F1", &[1])
            .customer(1, "Ann", "Lee", None)
            .rentals(1, 1, ts(2005, 5, 1), 3)
            .payment(1, "2.99")
            .payment(1, "0.99");

        let stats = fx.conn.stats().unwrap();
        assert_eq!(stats.total_films, 1);
        assert_eq!(stats.total_customers, 1);
        assert_eq!(stats.total_rentals, 3);
        assert_eq!(stats.total_categories, 2);
        assert_eq!(stats.total_revenue, Decimal::new(398, 2));
    }

    #[test]
    fn test_reports_are_repeatable() {
        let mut fx = Fixture::new();
        fx.category(1, "Action")
            .film(1, "F1", &[1])
            .film(2, "F2", &[1])
            .customer(1, "Ann", "Lee", None)
            .customer(2, "Bob", "Ray", None)
            .rentals(1, 1, ts(2005, 2, 1), 2)
            .rentals(2, 2, ts(2005, 2, 1), 1)
            .payment(1, "9.99")
            .payment(2, "1.99");

        let window = QuarterWindow::first_half(2005);
        assert_eq!(fx.conn.top_films_by_category().unwrap(), fx.conn.top_films_by_category().unwrap());
        assert_eq!(fx.conn.high_spending_customers().unwrap(), fx.conn.high_spending_customers().unwrap());
        assert_eq!(
            fx.conn.films_above_category_average().unwrap(),
            fx.conn.films_above_category_average().unwrap()
        );
        assert_eq!(
            fx.conn.lapsed_customers(&window).unwrap(),
            fx.conn.lapsed_customers(&window).unwrap()
        );
    }

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    pub(crate) fn write_sample_export(dir: &Path) {
        write_file(dir, "category.csv", "category_id,name,last_update\n1,Action,2006-02-15 09:46:27\n2,Comedy,2006-02-15 09:46:27\n");
        write_file(dir, "film.csv", "film_id,title,release_year\n1,ACADEMY DINOSAUR,2006\n2,ACE GOLDFINGER,2006\n3,ADAPTATION HOLES,2006\n");
        write_file(dir, "film_category.csv", "film_id,category_id\n1,1\n2,1\n3,2\n");
        write_file(dir, "inventory.csv", "inventory_id,film_id,store_id\n1,1,1\n2,2,1\n3,3,2\n");
        write_file(
            dir,
            "customer.csv",
            "customer_id,store_id,first_name,last_name,email\n1,1,MARY,SMITH,mary.smith@sakilacustomer.org\n2,1,PATRICIA,JOHNSON,\n",
        );
        write_file(
            dir,
            "rental.csv",
            "rental_id,rental_date,inventory_id,customer_id,return_date,staff_id\n\
             1,2005-02-24 22:53:30,1,1,2005-02-26 22:04:30,1\n\
             2,2005-02-25 10:00:00,1,2,,1\n\
             3,2005-05-25 10:00:00,2,2,2005-05-28 10:00:00,1\n\
             4,2005-03-01 10:00:00,3,1,,2\n",
        );
        write_file(
            dir,
            "payment.csv",
            "payment_id,customer_id,staff_id,rental_id,amount,payment_date\n\
             1,1,1,1,2.99,2005-02-24 22:53:30\n\
             2,2,1,2,0.99,2005-02-25 10:00:00\n\
             3,2,1,,4.99,2005-05-25 10:00:00\n\
             4,1,2,4,5.99,2005-03-01 10:00:00\n",
        );
    }

    #[test]
    fn test_import_csv_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_sample_export(dir.path());

        let mut conn = Connection::open_in_memory().unwrap();
        let summary = import_csv_dir(&mut conn, dir.path()).unwrap();

        assert_eq!(summary.categories, 2);
        assert_eq!(summary.films, 3);
        assert_eq!(summary.rentals, 4);
        assert_eq!(summary.payments, 4);
        assert_eq!(summary.total(), 2 + 3 + 3 + 3 + 2 + 4 + 4);

        let stats = conn.stats().unwrap();
        assert_eq!(stats.total_revenue, Decimal::new(1496, 2));

        let customers = get_customers(&conn).unwrap();
        assert_eq!(customers[1].email, None);

        let lapsed = conn.lapsed_customers(&QuarterWindow::first_half(2005)).unwrap();
        assert_eq!(lapsed.iter().map(|c| c.customer_id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(lapsed[0].rental_count, 2);
    }

    #[test]
    fn test_import_missing_file_names_it() {
        let dir = tempfile::tempdir().unwrap();
        write_sample_export(dir.path());
        std::fs::remove_file(dir.path().join("payment.csv")).unwrap();

        let mut conn = Connection::open_in_memory().unwrap();
        let err = import_csv_dir(&mut conn, dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("payment.csv"));
        assert_eq!(verify_empty(&conn), 0);
    }

    fn verify_empty(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM film", [], |row| row.get(0)).unwrap()
    }

    #[test]
    fn test_open_read_only_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sakila.db");
        let writer = Connection::open(&path).unwrap();
        setup_database(&writer).unwrap();

        let conn = open_read_only(&path, Duration::from_secs(1)).unwrap();
        ping(&conn).unwrap();
        assert!(conn
            .execute("INSERT INTO category (category_id, name) VALUES (1, 'x')", [])
            .is_err());
    }
}
