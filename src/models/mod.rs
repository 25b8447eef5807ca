mod future_price_info;
mod option_price;
mod snapshot;
mod spot_price_info;

use chrono::DateTime;
use chrono_tz::Tz;

/// Exchange-local wall clock. Every timestamp the site publishes is JST.
pub const EXCHANGE_TZ: Tz = chrono_tz::Asia::Tokyo;

pub type JstDateTime = DateTime<Tz>;

pub use future_price_info::{FuturePriceInfo, LatestFuturePrice};
pub(crate) use future_price_info::LatestFuturePriceRow;
pub use option_price::{OptionPrice, OptionType};
pub use snapshot::{ExpiryBucket, OptionChainSnapshot};
pub use spot_price_info::SpotPriceInfo;
