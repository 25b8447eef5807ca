use chrono::NaiveDate;
use serde::Serialize;

use super::JstDateTime;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum OptionType {
    #[serde(rename = "CALL")]
    Call,
    #[serde(rename = "PUT")]
    Put,
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionType::Call => write!(f, "CALL"),
            OptionType::Put => write!(f, "PUT"),
        }
    }
}

/// One leg (call or put) of one strike in one snapshot.
///
/// `(option_type, target_price, last_trading_day, updated_at)` identifies a
/// row; the database rejects a second insert of the same key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionPrice {
    pub option_type: OptionType,
    pub target_price: i32,
    pub is_atm: bool,
    pub price: Option<i32>,
    pub price_time: Option<JstDateTime>,
    pub diff: Option<i32>,
    pub diff_rate: Option<f64>,
    pub iv: Option<f64>,
    pub bid: Option<i32>,
    pub bid_volume: Option<i32>,
    pub bid_iv: Option<f64>,
    pub ask: Option<i32>,
    pub ask_volume: Option<i32>,
    pub ask_iv: Option<f64>,
    pub volume: Option<i32>,
    pub positions: Option<i32>,
    /// Settlement price.
    pub quotation: Option<i32>,
    /// Settlement date.
    pub quotation_date: NaiveDate,
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub last_trading_day: NaiveDate,
    pub updated_at: JstDateTime,
}

impl OptionPrice {
    pub fn unique_key(&self) -> (OptionType, i32, NaiveDate, JstDateTime) {
        (self.option_type, self.target_price, self.last_trading_day, self.updated_at)
    }
}
