// In-memory rental dataset
//
// Same four reports as the SQL implementation, computed with maps over
// plain vectors. Useful when the data is already loaded, and as the
// brute-force reference the SQL queries are checked against.

use crate::db;
use crate::error::ReportResult;
use crate::model::{Category, Customer, Film, FilmCategory, Inventory, Payment, Rental};
use crate::reports::{
    CustomerSpend, FilmRentalRow, HighSpenders, LapsedCustomer, QuarterWindow, ReportSource,
    StoreStats,
};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub films: Vec<Film>,
    pub categories: Vec<Category>,
    pub film_categories: Vec<FilmCategory>,
    pub inventory: Vec<Inventory>,
    pub customers: Vec<Customer>,
    pub rentals: Vec<Rental>,
    pub payments: Vec<Payment>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every reporting table from SQLite
    pub fn from_connection(conn: &Connection) -> ReportResult<Self> {
        let tx = conn.unchecked_transaction()?;
        let dataset = Dataset {
            films: db::get_films(&tx)?,
            categories: db::get_categories(&tx)?,
            film_categories: db::get_film_categories(&tx)?,
            inventory: db::get_inventory(&tx)?,
            customers: db::get_customers(&tx)?,
            rentals: db::get_rentals(&tx)?,
            payments: db::get_payments(&tx)?,
        };
        tx.finish()?;
        Ok(dataset)
    }

    fn films_by_id(&self) -> HashMap<i64, &Film> {
        self.films.iter().map(|f| (f.film_id, f)).collect()
    }

    fn categories_by_id(&self) -> HashMap<i64, &Category> {
        self.categories.iter().map(|c| (c.category_id, c)).collect()
    }

    fn customers_by_id(&self) -> HashMap<i64, &Customer> {
        self.customers.iter().map(|c| (c.customer_id, c)).collect()
    }

    /// Rentals per film, through inventory. Films never rented are absent.
    fn rental_counts_by_film(&self) -> HashMap<i64, i64> {
        let films = self.films_by_id();
        let film_of_copy: HashMap<i64, i64> = self
            .inventory
            .iter()
            .filter(|i| films.contains_key(&i.film_id))
            .map(|i| (i.inventory_id, i.film_id))
            .collect();

        let mut counts = HashMap::new();
        for rental in &self.rentals {
            if let Some(film_id) = film_of_copy.get(&rental.inventory_id) {
                *counts.entry(*film_id).or_insert(0) += 1;
            }
        }
        counts
    }

    /// (film, category) pairs for films with at least one rental,
    /// skipping memberships that point at unknown categories.
    fn rented_memberships(&self) -> Vec<(i64, i64, i64)> {
        let counts = self.rental_counts_by_film();
        let categories = self.categories_by_id();
        self.film_categories
            .iter()
            .filter(|fc| categories.contains_key(&fc.category_id))
            .filter_map(|fc| {
                counts
                    .get(&fc.film_id)
                    .map(|&count| (fc.film_id, fc.category_id, count))
            })
            .collect()
    }

    /// Resolve titles and category names, then sort for output
    fn film_rows(&self, memberships: impl Iterator<Item = (i64, i64, i64)>) -> Vec<FilmRentalRow> {
        let films = self.films_by_id();
        let categories = self.categories_by_id();

        let mut rows: Vec<FilmRentalRow> = memberships
            .filter_map(|(film_id, category_id, rental_count)| {
                let film = films.get(&film_id)?;
                let category = categories.get(&category_id)?;
                Some(FilmRentalRow {
                    film_id,
                    title: film.title.clone(),
                    category: category.name.clone(),
                    rental_count,
                })
            })
            .collect();
        rows.sort_by(film_order);
        rows
    }

    /// Total paid per existing customer, only customers with payments
    fn totals_by_customer(&self) -> BTreeMap<i64, Decimal> {
        let customers = self.customers_by_id();
        let mut totals = BTreeMap::new();
        for payment in &self.payments {
            if customers.contains_key(&payment.customer_id) {
                *totals.entry(payment.customer_id).or_insert(Decimal::ZERO) += payment.amount;
            }
        }
        totals
    }
}

fn film_order(a: &FilmRentalRow, b: &FilmRentalRow) -> Ordering {
    a.category
        .cmp(&b.category)
        .then(b.rental_count.cmp(&a.rental_count))
        .then_with(|| a.title.cmp(&b.title))
        .then(a.film_id.cmp(&b.film_id))
}

impl ReportSource for Dataset {
    fn top_films_by_category(&self) -> ReportResult<Vec<FilmRentalRow>> {
        let memberships = self.rented_memberships();

        let mut best: HashMap<i64, i64> = HashMap::new();
        for &(_, category_id, count) in &memberships {
            let max = best.entry(category_id).or_insert(count);
            if count > *max {
                *max = count;
            }
        }

        let winners = memberships
            .into_iter()
            .filter(|(_, category_id, count)| best.get(category_id) == Some(count));
        Ok(self.film_rows(winners))
    }

    fn high_spending_customers(&self) -> ReportResult<HighSpenders> {
        let totals = self.totals_by_customer();
        if totals.is_empty() {
            return Ok(HighSpenders {
                average: None,
                customers: Vec::new(),
            });
        }

        let grand_total: Decimal = totals.values().copied().sum();
        let average = grand_total / Decimal::from(totals.len() as i64);

        let customers = self.customers_by_id();
        let mut above: Vec<CustomerSpend> = totals
            .iter()
            .filter(|(_, total)| **total > average)
            .filter_map(|(id, total)| {
                customers.get(id).map(|c| CustomerSpend {
                    customer_id: c.customer_id,
                    first_name: c.first_name.clone(),
                    last_name: c.last_name.clone(),
                    email: c.email.clone(),
                    total_spend: *total,
                })
            })
            .collect();
        above.sort_by(|a, b| {
            b.total_spend
                .cmp(&a.total_spend)
                .then(a.customer_id.cmp(&b.customer_id))
        });

        Ok(HighSpenders {
            average: Some(average),
            customers: above,
        })
    }

    fn films_above_category_average(&self) -> ReportResult<Vec<FilmRentalRow>> {
        let memberships = self.rented_memberships();

        // category -> (films, rentals)
        let mut stats: HashMap<i64, (i64, i64)> = HashMap::new();
        for &(_, category_id, count) in &memberships {
            let entry = stats.entry(category_id).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += count;
        }

        // count > rentals / films, kept in integers
        let above = memberships.into_iter().filter(|(_, category_id, count)| {
            let (films, rentals) = stats[category_id];
            count * films > rentals
        });
        Ok(self.film_rows(above))
    }

    fn lapsed_customers(&self, window: &QuarterWindow) -> ReportResult<Vec<LapsedCustomer>> {
        window.validate()?;

        let mut active: HashMap<i64, i64> = HashMap::new();
        let mut inactive: HashSet<i64> = HashSet::new();
        for rental in &self.rentals {
            if window.contains(&rental.rental_date, window.active) {
                *active.entry(rental.customer_id).or_insert(0) += 1;
            } else if window.contains(&rental.rental_date, window.inactive) {
                inactive.insert(rental.customer_id);
            }
        }

        let customers = self.customers_by_id();
        let mut lapsed: Vec<LapsedCustomer> = active
            .into_iter()
            .filter(|(id, _)| !inactive.contains(id))
            .filter_map(|(id, rental_count)| {
                customers.get(&id).map(|c| LapsedCustomer {
                    customer_id: c.customer_id,
                    first_name: c.first_name.clone(),
                    last_name: c.last_name.clone(),
                    email: c.email.clone(),
                    rental_count,
                })
            })
            .collect();
        lapsed.sort_by(|a, b| {
            a.last_name
                .cmp(&b.last_name)
                .then_with(|| a.first_name.cmp(&b.first_name))
                .then(a.customer_id.cmp(&b.customer_id))
        });
        Ok(lapsed)
    }

    fn stats(&self) -> ReportResult<StoreStats> {
        Ok(StoreStats {
            total_films: self.films.len() as i64,
            total_customers: self.customers.len() as i64,
            total_rentals: self.rentals.len() as i64,
            total_revenue: self.payments.iter().map(|p| p.amount).sum(),
            total_categories: self.categories.len() as i64,
        })
    }
}
