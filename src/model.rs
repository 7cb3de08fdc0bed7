// Sakila entities used by the reports
//
// Plain records. Relationships are the foreign-key ids only; every
// report spells out its own joins.

use chrono::{DateTime, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Storage format for timestamps (SQLite TEXT column)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Film {
    pub film_id: i64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub category_id: i64,
    pub name: String,
}

/// Film ↔ Category membership
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilmCategory {
    pub film_id: i64,
    pub category_id: i64,
}

/// One physical copy of a film at a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub inventory_id: i64,
    pub film_id: i64,
    pub store_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: i64,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// One checkout event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rental {
    pub rental_id: i64,
    #[serde(with = "timestamp")]
    pub rental_date: NaiveDateTime,
    pub inventory_id: i64,
    pub customer_id: i64,
    #[serde(default, with = "timestamp::option")]
    pub return_date: Option<NaiveDateTime>,
}

/// One payment event. `rental_id` is nullable in the source data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: i64,
    pub customer_id: i64,
    #[serde(default)]
    pub rental_id: Option<i64>,
    pub amount: Decimal,
    #[serde(with = "timestamp")]
    pub payment_date: NaiveDateTime,
}

/// Parse a timestamp as written by Sakila dumps.
///
/// Accepts `2005-05-24 22:53:30`, the `T`-separated form, optional
/// fractional seconds, and RFC 3339 with an offset (the offset is
/// dropped; reports work on the wall-clock date).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_local());
    }

    // Postgres text output: "2005-05-24 22:53:30+00"
    DateTime::parse_from_str(&format!("{}00", raw), "%Y-%m-%d %H:%M:%S%.f%z")
        .ok()
        .map(|ts| ts.naive_local())
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub mod timestamp {
    use super::{format_timestamp, parse_timestamp};
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {:?}", raw)))
    }

    pub mod option {
        use super::super::{format_timestamp, parse_timestamp};
        use chrono::NaiveDateTime;
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            ts: &Option<NaiveDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => serializer.serialize_some(&format_timestamp(ts)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDateTime>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                None => Ok(None),
                Some(raw) if raw.trim().is_empty() => Ok(None),
                Some(raw) => parse_timestamp(&raw)
                    .map(Some)
                    .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {:?}", raw))),
            }
        }
    }
}
