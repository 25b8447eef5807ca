use serde::Serialize;

use super::{FuturePriceInfo, JstDateTime, OptionPrice, SpotPriceInfo};

/// Everything parsed from one fetch of one options page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionChainSnapshot {
    pub spot_price_info: SpotPriceInfo,
    pub future_price_info: FuturePriceInfo,
    pub call_options: Vec<OptionPrice>,
    pub put_options: Vec<OptionPrice>,
    pub updated_at: JstDateTime,
}

impl OptionChainSnapshot {
    pub fn atm_call(&self) -> Option<&OptionPrice> {
        self.call_options.iter().find(|o| o.is_atm)
    }

    pub fn atm_put(&self) -> Option<&OptionPrice> {
        self.put_options.iter().find(|o| o.is_atm)
    }
}

/// The site publishes one options page per expiry; the importer always reads
/// the nearest three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpiryBucket {
    NearbyMonth,
    NextMonth,
    MonthAfter,
}

impl ExpiryBucket {
    pub const ALL: [ExpiryBucket; 3] = [
        ExpiryBucket::NearbyMonth,
        ExpiryBucket::NextMonth,
        ExpiryBucket::MonthAfter,
    ];

    /// Suffix appended to the base URL to reach this bucket's page.
    pub fn path_suffix(&self) -> &'static str {
        match self {
            ExpiryBucket::NearbyMonth => "",
            ExpiryBucket::NextMonth => "1",
            ExpiryBucket::MonthAfter => "2",
        }
    }
}

impl std::fmt::Display for ExpiryBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpiryBucket::NearbyMonth => write!(f, "nearby_month"),
            ExpiryBucket::NextMonth => write!(f, "next_month"),
            ExpiryBucket::MonthAfter => write!(f, "month_after"),
        }
    }
}
