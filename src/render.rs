// Report rendering - HTML page for the web UI, tables for the terminal
//
// The HTML page has one section per report. Only the selected report
// carries results; the others show their description and a run button.

use crate::reports::{FilmRentalRow, Report, ReportKind};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};
use rust_decimal::Decimal;
use std::fmt::Write;

/// What the page should show under the selected section
#[derive(Debug)]
pub enum Selection<'a> {
    Nothing,
    Report(&'a Report),
    Failed { kind: ReportKind, message: &'a str },
}

impl Selection<'_> {
    fn kind(&self) -> Option<ReportKind> {
        match self {
            Selection::Nothing => None,
            Selection::Report(report) => Some(report.kind()),
            Selection::Failed { kind, .. } => Some(*kind),
        }
    }
}

/// Escape HTML special characters.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn money(amount: Decimal) -> String {
    format!("${:.2}", amount.round_dp(2))
}

fn email_or_na(email: &Option<String>) -> &str {
    email.as_deref().unwrap_or("N/A")
}

// ============================================================================
// HTML
// ============================================================================

const STYLE: &str = "
body { font-family: 'Segoe UI', Tahoma, sans-serif; background: #f4f5fb; padding: 20px; }
.container { max-width: 1200px; margin: 0 auto; background: white; padding: 32px; border-radius: 12px; }
header { text-align: center; border-bottom: 3px solid #667eea; margin-bottom: 24px; }
.query-box { background: #f8f9fa; border: 2px solid #e9ecef; padding: 20px; margin: 20px 0; border-radius: 10px; }
.query-description { color: #6c757d; margin-bottom: 12px; }
button { background: #667eea; color: white; border: none; padding: 10px 24px; border-radius: 6px; cursor: pointer; }
table { border-collapse: collapse; width: 100%; margin-top: 16px; background: white; }
th, td { padding: 10px; text-align: left; border-bottom: 1px solid #e9ecef; }
th { background: #667eea; color: white; text-transform: uppercase; font-size: 0.85em; }
.metric { background: #eef0fc; padding: 12px 16px; border-left: 4px solid #667eea; margin: 12px 0; font-weight: 600; }
.no-results { text-align: center; padding: 24px; color: #95a5a6; }
.error { color: #b3261e; background: #fdecea; padding: 12px 16px; border-radius: 6px; }
";

/// Render the full report page
pub fn render_page(selection: &Selection<'_>, year: i32) -> String {
    let mut html = String::new();
    html.push_str("<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\"/>\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
    html.push_str("<title>Sakila DVD Rental - Reports</title>\n");
    let _ = write!(html, "<style>{}</style>\n</head>\n<body>\n<div class=\"container\">\n", STYLE);
    html.push_str("<header><h1>Sakila DVD Rental</h1><p>Business reports</p></header>\n");

    for kind in ReportKind::ALL {
        render_section(&mut html, kind, selection, year);
    }

    html.push_str("</div>\n</body>\n</html>\n");
    html
}

fn render_section(html: &mut String, kind: ReportKind, selection: &Selection<'_>, year: i32) {
    html.push_str("<div class=\"query-box\">\n");
    let _ = writeln!(html, "<h2>{}</h2>", html_escape(kind.title()));
    let _ = writeln!(
        html,
        "<p class=\"query-description\">{}</p>",
        html_escape(kind.description())
    );
    let _ = write!(
        html,
        "<form method=\"get\" action=\"/\"><input type=\"hidden\" name=\"query\" value=\"{}\"/>",
        kind.key()
    );
    if kind == ReportKind::Q1NotQ2 {
        let _ = write!(
            html,
            "<input type=\"number\" name=\"year\" value=\"{}\" min=\"1\" max=\"9999\"/> ",
            year
        );
    }
    html.push_str("<button type=\"submit\">Run report</button></form>\n");

    if selection.kind() == Some(kind) {
        match selection {
            Selection::Report(report) => render_results(html, report),
            Selection::Failed { message, .. } => {
                let _ = writeln!(html, "<p class=\"error\">{}</p>", html_escape(message));
            }
            Selection::Nothing => {}
        }
    }

    html.push_str("</div>\n");
}

fn render_results(html: &mut String, report: &Report) {
    match report {
        Report::TopFilmsByCategory(rows) => {
            film_table(html, rows, "Total rentals");
            metric(html, "Winning rows", rows.len());
        }
        Report::AboveAvgFilms(rows) => {
            film_table(html, rows, "Rentals");
            metric(html, "Standout films", rows.len());
        }
        Report::HighSpendingCustomers(spenders) => {
            if let Some(avg) = spenders.average_display() {
                metric(html, "Average spend per customer", money(avg));
            }
            if spenders.customers.is_empty() {
                no_results(html);
                return;
            }
            table_head(html, &["ID", "First name", "Last name", "Email", "Total spend"]);
            for c in &spenders.customers {
                let _ = writeln!(
                    html,
                    "<tr><td>{}</td><td>{}</td><td>{}</td><td><em>{}</em></td><td><strong>{}</strong></td></tr>",
                    c.customer_id,
                    html_escape(&c.first_name),
                    html_escape(&c.last_name),
                    html_escape(email_or_na(&c.email)),
                    money(c.total_spend),
                );
            }
            html.push_str("</tbody></table>\n");
            metric(html, "Customers above average", spenders.customers.len());
        }
        Report::Q1NotQ2 { window, customers } => {
            if customers.is_empty() {
                no_results(html);
                return;
            }
            let count_header = format!("{} {} rentals", window.active, window.year);
            table_head(html, &["ID", "First name", "Last name", "Email", count_header.as_str()]);
            for c in customers {
                let _ = writeln!(
                    html,
                    "<tr><td>{}</td><td>{}</td><td>{}</td><td><em>{}</em></td><td>{}</td></tr>",
                    c.customer_id,
                    html_escape(&c.first_name),
                    html_escape(&c.last_name),
                    html_escape(email_or_na(&c.email)),
                    c.rental_count,
                );
            }
            html.push_str("</tbody></table>\n");
            metric(html, "Customers to win back", customers.len());
        }
    }
}

fn film_table(html: &mut String, rows: &[FilmRentalRow], count_header: &str) {
    if rows.is_empty() {
        no_results(html);
        return;
    }
    table_head(html, &["Film", "Category", count_header]);
    for r in rows {
        let _ = writeln!(
            html,
            "<tr><td><strong>{}</strong></td><td>{}</td><td>{}</td></tr>",
            html_escape(&r.title),
            html_escape(&r.category),
            r.rental_count
        );
    }
    html.push_str("</tbody></table>\n");
}

fn table_head(html: &mut String, headers: &[&str]) {
    html.push_str("<table>\n<thead><tr>");
    for h in headers {
        let _ = write!(html, "<th>{}</th>", html_escape(h));
    }
    html.push_str("</tr></thead>\n<tbody>\n");
}

fn metric(html: &mut String, label: &str, value: impl std::fmt::Display) {
    let _ = writeln!(
        html,
        "<div class=\"metric\">{}: <span>{}</span></div>",
        html_escape(label),
        value
    );
}

fn no_results(html: &mut String) {
    html.push_str("<p class=\"no-results\">No results</p>\n");
}

// ============================================================================
// Terminal
// ============================================================================

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(headers.iter().map(Cell::new));
    table
}

/// Render a report as a terminal table (plus the average line for the
/// spend report)
pub fn render_text(report: &Report) -> String {
    match report {
        Report::TopFilmsByCategory(rows) | Report::AboveAvgFilms(rows) => {
            let mut table = new_table(&["Film", "Category", "Rentals"]);
            for r in rows {
                table.add_row(vec![
                    Cell::new(&r.title),
                    Cell::new(&r.category),
                    Cell::new(r.rental_count),
                ]);
            }
            format!("{}\n{} rows", table, rows.len())
        }
        Report::HighSpendingCustomers(spenders) => {
            let mut table = new_table(&["ID", "First name", "Last name", "Email", "Total spend"]);
            for c in &spenders.customers {
                table.add_row(vec![
                    Cell::new(c.customer_id),
                    Cell::new(&c.first_name),
                    Cell::new(&c.last_name),
                    Cell::new(email_or_na(&c.email)),
                    Cell::new(money(c.total_spend)),
                ]);
            }
            let average = spenders
                .average_display()
                .map(money)
                .unwrap_or_else(|| "n/a".to_string());
            format!(
                "Average spend per customer: {}\n{}\n{} rows",
                average,
                table,
                spenders.customers.len()
            )
        }
        Report::Q1NotQ2 { window, customers } => {
            let count_header = format!("{} rentals", window.active);
            let mut table = new_table(&["ID", "First name", "Last name", "Email", count_header.as_str()]);
            for c in customers {
                table.add_row(vec![
                    Cell::new(c.customer_id),
                    Cell::new(&c.first_name),
                    Cell::new(&c.last_name),
                    Cell::new(email_or_na(&c.email)),
                    Cell::new(c.rental_count),
                ]);
            }
            format!(
                "Active in {} {}, not in {}\n{}\n{} rows",
                window.active,
                window.year,
                window.inactive,
                table,
                customers.len()
            )
        }
    }
}
