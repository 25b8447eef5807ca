use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::{JstDateTime, EXCHANGE_TZ};

// Nikkei 225 futures quote for the contract month the page is keyed on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuturePriceInfo {
    pub price: Option<i32>,
    pub price_time: Option<JstDateTime>,
    pub diff: Option<i32>,
    pub diff_rate: Option<f64>,
    pub hv: Option<f64>,
    /// First day of the contract month.
    pub contract_month: NaiveDate,
    pub updated_at: JstDateTime,
}

/// The part of the most recently stored futures row that decides whether a
/// freshly fetched page carries anything new.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestFuturePrice {
    pub updated_at: JstDateTime,
    pub price_time: Option<JstDateTime>,
}

#[derive(Debug, FromRow)]
pub(crate) struct LatestFuturePriceRow {
    pub updated_at: DateTime<Utc>,
    pub price_time: Option<DateTime<Utc>>,
}

impl From<LatestFuturePriceRow> for LatestFuturePrice {
    fn from(row: LatestFuturePriceRow) -> Self {
        Self {
            updated_at: row.updated_at.with_timezone(&EXCHANGE_TZ),
            price_time: row.price_time.map(|t| t.with_timezone(&EXCHANGE_TZ)),
        }
    }
}
