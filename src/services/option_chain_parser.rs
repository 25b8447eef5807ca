//! Option Chain Page Parser
//!
//! Turns one Nikkei 225 options page into an [`OptionChainSnapshot`].
//!
//! The page is loosely structured: most values live in free-text table cells
//! such as `27,500 (14:55)` or `1,530 (12) 1,500 (8)`, so fields are located
//! with CSS selectors and then pulled apart with regular expressions.
//!
//! # Page landmarks
//!
//! - `.update-time dd`: site refresh time, `YYYY/MM/DD HH:MM` (JST)
//! - `#priceInfo tr`: spot row (label contains `日経平均株価`) and futures row
//!   (label contains `先物`, plus the contract month as `YY年MM月`)
//! - `.price-info-header`: second row, first header carries the settlement
//!   date as `M/D`
//! - `.date-table.last-tradingday dd`: last trading day, `YYYY/MM/DD`
//! - `.price-info-scroll .row-num`: one row per strike; call cells in reverse
//!   display order, the strike cell, put cells in display order
//! - `.price-info-scroll .greek`: greeks for the matching strike row, call
//!   first then put
//!
//! # Timestamps
//!
//! Cells only carry `HH:MM`. The date comes from the refresh time, and a
//! result later than the refresh time means the trade happened the day
//! before. The settlement date has no year and the contract month has a
//! two-digit year; both are resolved against the refresh time.
//!
//! Any missing landmark or malformed required cell fails the whole page.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::errors::AppError;
use crate::models::{
    FuturePriceInfo, JstDateTime, OptionChainSnapshot, OptionPrice, OptionType, SpotPriceInfo,
    EXCHANGE_TZ,
};

const SPOT_LABEL: &str = "日経平均株価";
const FUTURE_LABEL: &str = "先物";
const ATM_MARKER: &str = "ATM";

/// Cells per side of a strike row.
const LEG_CELLS: usize = 8;
/// Index of the strike cell; call cells precede it, put cells follow.
const TARGET_CELL: usize = LEG_CELLS;
const GREEKS_PER_LEG: usize = 4;

static REGEX_PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\d.]+)[^\d]*(\d+:\d+)?").expect("valid price pattern"));
static REGEX_DIFF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([+\-\d.]+)\s*([+\-\d.]+)%").expect("valid diff pattern"));
static REGEX_ORDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\d\-]+)\s*\(([\d\-]+)\)\s*([\d\-]+)\s*\(([\d\-]+)\)").expect("valid order pattern")
});
static REGEX_ORDER_IV: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:-|([\d.]+)%)\s*(?:-|([\d.]+)%)").expect("valid order iv pattern")
});
static REGEX_CONTRACT_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)年(\d+)月").expect("valid contract month pattern"));
static REGEX_MONTH_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)/(\d+)").expect("valid month/day pattern"));
static REGEX_STRIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+)").expect("valid strike pattern"));

/// Values shared by every option leg on the page.
struct PageContext {
    updated_at: JstDateTime,
    quotation_date: NaiveDate,
    last_trading_day: NaiveDate,
}

pub fn parse_option_chain_html(html: &str) -> Result<OptionChainSnapshot, AppError> {
    let document = Html::parse_document(html);

    let updated_at = parse_updated_at(&document)?;

    let price_rows = price_info_rows(&document)?;
    let spot_row = find_labelled_row(&price_rows, SPOT_LABEL)
        .ok_or_else(|| AppError::parse("spot price row not found in #priceInfo"))?;
    let future_row = find_labelled_row(&price_rows, FUTURE_LABEL)
        .ok_or_else(|| AppError::parse("futures price row not found in #priceInfo"))?;

    let spot_price_info = parse_spot_row(spot_row, updated_at)?;
    let future_price_info = parse_future_row(future_row, updated_at)?;

    let context = PageContext {
        updated_at,
        quotation_date: parse_settlement_date(&document, updated_at)?,
        last_trading_day: parse_last_trading_day(&document)?,
    };

    let (call_options, put_options) = parse_option_rows(&document, &context)?;

    debug!(
        "parsed option chain updated at {}: {} strikes, last trading day {}",
        updated_at,
        call_options.len(),
        context.last_trading_day
    );

    Ok(OptionChainSnapshot {
        spot_price_info,
        future_price_info,
        call_options,
        put_options,
        updated_at,
    })
}

fn selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css).map_err(|e| AppError::parse(format!("invalid selector {}: {}", css, e)))
}

/// Text of an element with each text node trimmed and joined by one space, so
/// numbers split across inline elements never run together.
fn cell_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn numeric_cell_text(element: ElementRef<'_>) -> String {
    cell_text(element).replace(',', "")
}

fn first_text(document: &Html, css: &str) -> Result<String, AppError> {
    let sel = selector(css)?;
    document
        .select(&sel)
        .next()
        .map(cell_text)
        .ok_or_else(|| AppError::parse(format!("{} not found", css)))
}

fn localize(naive: NaiveDateTime) -> Result<JstDateTime, AppError> {
    EXCHANGE_TZ
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| AppError::parse(format!("{} is not a valid JST time", naive)))
}

fn start_of_day(date: NaiveDate) -> Result<JstDateTime, AppError> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| AppError::parse(format!("no midnight on {}", date)))?;
    localize(midnight)
}

fn parse_updated_at(document: &Html) -> Result<JstDateTime, AppError> {
    let text = first_text(document, ".update-time dd")?;
    let naive = NaiveDateTime::parse_from_str(text.trim(), "%Y/%m/%d %H:%M")
        .map_err(|e| AppError::parse(format!("invalid update time {:?}: {}", text, e)))?;
    localize(naive)
}

fn parse_last_trading_day(document: &Html) -> Result<NaiveDate, AppError> {
    let text = first_text(document, ".date-table.last-tradingday dd")?;
    NaiveDate::parse_from_str(text.trim(), "%Y/%m/%d")
        .map_err(|e| AppError::parse(format!("invalid last trading day {:?}: {}", text, e)))
}

/// Settlement date is shown as `M/D`. It is assumed to fall in the refresh
/// time's year unless that would put it after the refresh.
fn parse_settlement_date(document: &Html, updated_at: JstDateTime) -> Result<NaiveDate, AppError> {
    let row_sel = selector(".price-info-header tr")?;
    let th_sel = selector("th")?;

    let text = document
        .select(&row_sel)
        .nth(1)
        .and_then(|row| row.select(&th_sel).next())
        .map(cell_text)
        .ok_or_else(|| AppError::parse("settlement date header not found"))?;

    let caps = REGEX_MONTH_DAY
        .captures(&text)
        .ok_or_else(|| AppError::parse(format!("no settlement date in {:?}", text)))?;
    let month: u32 = parse_required(&caps[1], "settlement month")?;
    let day: u32 = parse_required(&caps[2], "settlement day")?;

    resolve_settlement_date(month, day, updated_at)
}

fn resolve_settlement_date(month: u32, day: u32, updated_at: JstDateTime) -> Result<NaiveDate, AppError> {
    let year = updated_at.year();
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| AppError::parse(format!("invalid settlement date {}/{}", month, day)))?;

    if start_of_day(date)? > updated_at {
        return NaiveDate::from_ymd_opt(year - 1, month, day)
            .ok_or_else(|| AppError::parse(format!("invalid settlement date {}/{}", month, day)));
    }
    Ok(date)
}

/// Contract month labels carry a two-digit year. A month whose first day is
/// already behind the refresh time belongs to the following year.
fn resolve_contract_month(label: &str, updated_at: JstDateTime) -> Result<NaiveDate, AppError> {
    let caps = REGEX_CONTRACT_MONTH
        .captures(label)
        .ok_or_else(|| AppError::parse(format!("no contract month in futures label {:?}", label)))?;
    let label_year: i32 = parse_required(&caps[1], "contract year")?;
    let month: u32 = parse_required(&caps[2], "contract month")?;

    let year = if label_year < 100 {
        updated_at.year() - updated_at.year() % 100 + label_year
    } else {
        label_year
    };

    let first_day = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| AppError::parse(format!("invalid contract month {:?}", label)))?;

    if start_of_day(first_day)? < updated_at {
        return NaiveDate::from_ymd_opt(year + 1, month, 1)
            .ok_or_else(|| AppError::parse(format!("invalid contract month {:?}", label)));
    }
    Ok(first_day)
}

/// Combines an `HH:MM` cell time with the refresh date. A time later than the
/// refresh clock was observed before midnight of the previous day.
fn resolve_observation_time(hhmm: &str, updated_at: JstDateTime) -> Result<JstDateTime, AppError> {
    let time = NaiveTime::parse_from_str(hhmm, "%H:%M")
        .map_err(|e| AppError::parse(format!("invalid observation time {:?}: {}", hhmm, e)))?;
    let observed = localize(updated_at.date_naive().and_time(time))?;

    if observed > updated_at {
        Ok(observed - Duration::days(1))
    } else {
        Ok(observed)
    }
}

/// Splits a price cell into the raw price and its observation time. A cell
/// without a number (`-`) has neither.
fn parse_price_cell<'a>(
    text: &'a str,
    updated_at: JstDateTime,
) -> Result<(Option<&'a str>, Option<JstDateTime>), AppError> {
    let Some(caps) = REGEX_PRICE.captures(text) else {
        return Ok((None, None));
    };

    let price = caps.get(1).map(|m| m.as_str());
    let price_time = caps
        .get(2)
        .map(|m| resolve_observation_time(m.as_str(), updated_at))
        .transpose()?;

    Ok((price, price_time))
}

fn parse_required<T: FromStr>(raw: &str, field: &str) -> Result<T, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::parse(format!("invalid {}: {:?}", field, raw)))
}

/// `-` (or an empty cell) means the site has no value.
pub fn parse_optional<T: FromStr>(raw: &str, field: &str) -> Result<Option<T>, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return Ok(None);
    }
    parse_required(trimmed, field).map(Some)
}

pub fn parse_optional_percent(raw: &str, field: &str) -> Result<Option<f64>, AppError> {
    parse_optional(raw.trim().trim_end_matches('%'), field)
}

fn price_info_rows(document: &Html) -> Result<Vec<Vec<String>>, AppError> {
    let row_sel = selector("#priceInfo tr")?;
    let td_sel = selector("td")?;

    Ok(document
        .select(&row_sel)
        .map(|row| row.select(&td_sel).map(numeric_cell_text).collect::<Vec<_>>())
        .filter(|cells| !cells.is_empty())
        .collect())
}

fn find_labelled_row<'a>(rows: &'a [Vec<String>], label: &str) -> Option<&'a [String]> {
    rows.iter()
        .find(|cells| cells[0].contains(label))
        .map(Vec::as_slice)
}

fn cell<'a>(cells: &'a [String], index: usize, row: &str) -> Result<&'a str, AppError> {
    cells
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| AppError::parse(format!("{} row has no cell {}", row, index)))
}

fn parse_spot_row(cells: &[String], updated_at: JstDateTime) -> Result<SpotPriceInfo, AppError> {
    let (price, price_time) = parse_price_cell(cell(cells, 1, "spot")?, updated_at)?;

    Ok(SpotPriceInfo {
        price: price.map(|p| parse_required(p, "spot price")).transpose()?,
        price_time,
        diff: parse_optional(cell(cells, 2, "spot")?, "spot diff")?,
        diff_rate: parse_optional_percent(cell(cells, 3, "spot")?, "spot diff rate")?,
        hv: parse_optional_percent(cell(cells, 4, "spot")?, "spot hv")?,
        updated_at,
    })
}

fn parse_future_row(cells: &[String], updated_at: JstDateTime) -> Result<FuturePriceInfo, AppError> {
    let (price, price_time) = parse_price_cell(cell(cells, 1, "futures")?, updated_at)?;

    Ok(FuturePriceInfo {
        price: price.map(|p| parse_required(p, "futures price")).transpose()?,
        price_time,
        diff: parse_optional(cell(cells, 2, "futures")?, "futures diff")?,
        diff_rate: parse_optional_percent(cell(cells, 3, "futures")?, "futures diff rate")?,
        hv: parse_optional_percent(cell(cells, 4, "futures")?, "futures hv")?,
        contract_month: resolve_contract_month(cell(cells, 0, "futures")?, updated_at)?,
        updated_at,
    })
}

fn parse_option_rows(
    document: &Html,
    context: &PageContext,
) -> Result<(Vec<OptionPrice>, Vec<OptionPrice>), AppError> {
    let row_sel = selector(".price-info-scroll .row-num")?;
    let greek_sel = selector(".price-info-scroll .greek")?;
    let table_sel = selector("table")?;
    let td_sel = selector("td")?;

    let rows: Vec<Vec<String>> = document
        .select(&row_sel)
        .map(|row| row.select(&td_sel).map(numeric_cell_text).collect())
        .collect();

    // Greek cells sit in a nested table; the wrapping cell would repeat them all
    let greeks: Vec<Vec<String>> = document
        .select(&greek_sel)
        .map(|block| {
            block
                .select(&table_sel)
                .flat_map(|table| table.select(&td_sel))
                .map(numeric_cell_text)
                .collect()
        })
        .collect();

    let mut call_options = Vec::with_capacity(rows.len());
    let mut put_options = Vec::with_capacity(rows.len());

    for (i, row) in rows.iter().enumerate() {
        let row_greeks = greeks
            .get(i)
            .ok_or_else(|| AppError::parse(format!("no greeks for option row {}", i)))?;
        let (call, put) = parse_strike_row(row, row_greeks, context)
            .map_err(|e| AppError::parse(format!("option row {}: {}", i, e)))?;
        call_options.push(call);
        put_options.push(put);
    }

    Ok((call_options, put_options))
}

fn parse_strike_row(
    row: &[String],
    greeks: &[String],
    context: &PageContext,
) -> Result<(OptionPrice, OptionPrice), AppError> {
    if row.len() < 2 * LEG_CELLS + 1 {
        return Err(AppError::parse(format!("expected at least {} cells, found {}", 2 * LEG_CELLS + 1, row.len())));
    }
    if greeks.len() < GREEKS_PER_LEG {
        return Err(AppError::parse(format!("expected at least {} greeks, found {}", GREEKS_PER_LEG, greeks.len())));
    }

    let target_info = &row[TARGET_CELL];
    let target_price: i32 = REGEX_STRIKE
        .captures(target_info)
        .ok_or_else(|| AppError::parse(format!("no strike in {:?}", target_info)))
        .and_then(|caps| parse_required(&caps[1], "strike"))?;
    let is_atm = target_info
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .contains(ATM_MARKER);

    let call_cells: Vec<&str> = row[..LEG_CELLS].iter().rev().map(String::as_str).collect();
    let put_cells: Vec<&str> = row[row.len() - LEG_CELLS..].iter().map(String::as_str).collect();

    let call = parse_option_leg(
        OptionType::Call,
        target_price,
        is_atm,
        &call_cells,
        &greeks[..GREEKS_PER_LEG],
        context,
    )?;
    let put = parse_option_leg(
        OptionType::Put,
        target_price,
        is_atm,
        &put_cells,
        &greeks[greeks.len() - GREEKS_PER_LEG..],
        context,
    )?;

    Ok((call, put))
}

/// `cells` are in leg order: price, diff, iv, ask/bid, ask/bid iv, volume,
/// open positions, settlement price.
fn parse_option_leg(
    option_type: OptionType,
    target_price: i32,
    is_atm: bool,
    cells: &[&str],
    greeks: &[String],
    context: &PageContext,
) -> Result<OptionPrice, AppError> {
    let &[price_cell, diff_cell, iv_cell, order_cell, order_iv_cell, volume, positions, quotation] = cells
    else {
        return Err(AppError::parse(format!("{} leg needs {} cells", option_type, LEG_CELLS)));
    };
    let [delta, gamma, theta, vega] = greeks else {
        return Err(AppError::parse(format!("{} leg needs {} greeks", option_type, GREEKS_PER_LEG)));
    };

    let (price, price_time) = parse_price_cell(price_cell, context.updated_at)?;

    let (diff, diff_rate) = match REGEX_DIFF.captures(diff_cell) {
        Some(caps) => (
            parse_optional(&caps[1], "option diff")?,
            parse_optional(&caps[2], "option diff rate")?,
        ),
        None => (None, None),
    };

    // Leftmost quote is assigned to ask, as the page has always been read
    let (ask, ask_volume, bid, bid_volume) = match REGEX_ORDER.captures(order_cell) {
        Some(caps) => (
            parse_optional(&caps[1], "ask")?,
            parse_optional(&caps[2], "ask volume")?,
            parse_optional(&caps[3], "bid")?,
            parse_optional(&caps[4], "bid volume")?,
        ),
        None => (None, None, None, None),
    };

    let order_iv = REGEX_ORDER_IV
        .captures(order_iv_cell)
        .ok_or_else(|| AppError::parse(format!("unexpected ask/bid iv cell {:?}", order_iv_cell)))?;
    let ask_iv = order_iv
        .get(1)
        .map(|m| parse_required(m.as_str(), "ask iv"))
        .transpose()?;
    let bid_iv = order_iv
        .get(2)
        .map(|m| parse_required(m.as_str(), "bid iv"))
        .transpose()?;

    Ok(OptionPrice {
        option_type,
        target_price,
        is_atm,
        price: price.map(|p| parse_required(p, "option price")).transpose()?,
        price_time,
        diff,
        diff_rate,
        iv: parse_optional_percent(iv_cell, "iv")?,
        bid,
        bid_volume,
        bid_iv,
        ask,
        ask_volume,
        ask_iv,
        volume: parse_optional(volume, "volume")?,
        positions: parse_optional(positions, "positions")?,
        quotation: parse_optional(quotation, "settlement price")?,
        quotation_date: context.quotation_date,
        delta: parse_optional(delta, "delta")?,
        gamma: parse_optional(gamma, "gamma")?,
        theta: parse_optional(theta, "theta")?,
        vega: parse_optional(vega, "vega")?,
        last_trading_day: context.last_trading_day,
        updated_at: context.updated_at,
    })
}
