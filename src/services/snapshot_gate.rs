use crate::models::{LatestFuturePrice, OptionChainSnapshot};

/// Decides whether a freshly parsed page is worth storing.
///
/// The site bumps its refresh time even when nothing traded, so a newer
/// `updated_at` alone is not enough: the futures quote must also carry an
/// observation time different from the stored one. With nothing stored (or
/// nothing comparable stored) every page is new.
pub fn is_new_snapshot(latest: Option<&LatestFuturePrice>, snapshot: &OptionChainSnapshot) -> bool {
    let Some(latest) = latest else {
        return true;
    };
    let Some(last_price_time) = latest.price_time else {
        return true;
    };

    match snapshot.future_price_info.price_time {
        Some(price_time) => snapshot.updated_at > latest.updated_at && price_time != last_price_time,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FuturePriceInfo, JstDateTime, SpotPriceInfo, EXCHANGE_TZ};
    use chrono::{NaiveDate, TimeZone};

    fn jst(d: u32, hh: u32, mm: u32) -> JstDateTime {
        EXCHANGE_TZ.with_ymd_and_hms(2023, 6, d, hh, mm, 0).unwrap()
    }

    fn snapshot(updated_at: JstDateTime, future_price_time: Option<JstDateTime>) -> OptionChainSnapshot {
        OptionChainSnapshot {
            spot_price_info: SpotPriceInfo {
                price: Some(31148.01),
                price_time: Some(updated_at),
                diff: None,
                diff_rate: None,
                hv: None,
                updated_at,
            },
            future_price_info: FuturePriceInfo {
                price: Some(27500),
                price_time: future_price_time,
                diff: None,
                diff_rate: None,
                hv: None,
                contract_month: NaiveDate::from_ymd_opt(2023, 9, 1).unwrap(),
                updated_at,
            },
            call_options: vec![],
            put_options: vec![],
            updated_at,
        }
    }

    fn latest(updated_at: JstDateTime, price_time: Option<JstDateTime>) -> LatestFuturePrice {
        LatestFuturePrice { updated_at, price_time }
    }

    #[test]
    fn test_empty_store_accepts_anything() {
        assert!(is_new_snapshot(None, &snapshot(jst(1, 15, 0), None)));
    }

    #[test]
    fn test_stored_row_without_price_time_accepts_anything() {
        let stored = latest(jst(1, 15, 0), None);
        assert!(is_new_snapshot(Some(&stored), &snapshot(jst(1, 14, 0), None)));
    }

    #[test]
    fn test_newer_refresh_with_new_trade_is_new() {
        let stored = latest(jst(1, 14, 0), Some(jst(1, 13, 55)));
        assert!(is_new_snapshot(Some(&stored), &snapshot(jst(1, 15, 0), Some(jst(1, 14, 55)))));
    }

    #[test]
    fn test_newer_refresh_with_same_trade_is_not_new() {
        let stored = latest(jst(1, 14, 0), Some(jst(1, 13, 55)));
        assert!(!is_new_snapshot(Some(&stored), &snapshot(jst(1, 15, 0), Some(jst(1, 13, 55)))));
    }

    #[test]
    fn test_newer_refresh_without_futures_time_is_not_new() {
        let stored = latest(jst(1, 14, 0), Some(jst(1, 13, 55)));
        assert!(!is_new_snapshot(Some(&stored), &snapshot(jst(1, 15, 0), None)));
    }

    #[test]
    fn test_same_or_older_refresh_is_not_new() {
        let stored = latest(jst(1, 15, 0), Some(jst(1, 14, 55)));
        assert!(!is_new_snapshot(Some(&stored), &snapshot(jst(1, 15, 0), Some(jst(1, 14, 58)))));
        assert!(!is_new_snapshot(Some(&stored), &snapshot(jst(1, 9, 0), Some(jst(1, 8, 59)))));
    }
}
