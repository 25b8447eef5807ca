use serde::Serialize;

use super::JstDateTime;

// Nikkei 225 index level as shown at the top of the options page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpotPriceInfo {
    pub price: Option<f64>,
    pub price_time: Option<JstDateTime>,
    pub diff: Option<f64>,
    pub diff_rate: Option<f64>,
    pub hv: Option<f64>,
    pub updated_at: JstDateTime,
}
