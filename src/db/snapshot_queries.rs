use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use tracing::error;

use crate::models::{
    FuturePriceInfo, JstDateTime, LatestFuturePrice, LatestFuturePriceRow, OptionPrice,
    SpotPriceInfo,
};

/// The newest stored futures row, by site refresh time.
pub async fn fetch_latest_future_price(
    pool: &PgPool,
) -> Result<Option<LatestFuturePrice>, sqlx::Error> {
    let row = sqlx::query_as::<_, LatestFuturePriceRow>(
        r#"
        SELECT updated_at, price_time
        FROM future_price_info
        ORDER BY updated_at DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(LatestFuturePrice::from))
}

pub async fn future_price_exists(
    conn: &mut PgConnection,
    updated_at: JstDateTime,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM future_price_info WHERE updated_at = $1)",
    )
    .bind(updated_at.with_timezone(&Utc))
    .fetch_one(conn)
    .await
}

pub async fn insert_spot_price(
    conn: &mut PgConnection,
    spot: &SpotPriceInfo,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO spot_price_info (price, price_time, diff, diff_rate, hv, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(spot.price)
    .bind(spot.price_time.map(|t| t.with_timezone(&Utc)))
    .bind(spot.diff)
    .bind(spot.diff_rate)
    .bind(spot.hv)
    .bind(spot.updated_at.with_timezone(&Utc))
    .execute(conn)
    .await
    .map_err(|e| {
        error!("Failed to insert spot price for {}: {}", spot.updated_at, e);
        e
    })?;

    Ok(())
}

pub async fn insert_future_price(
    conn: &mut PgConnection,
    future: &FuturePriceInfo,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO future_price_info
            (price, price_time, diff, diff_rate, hv, contract_month, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(future.price)
    .bind(future.price_time.map(|t| t.with_timezone(&Utc)))
    .bind(future.diff)
    .bind(future.diff_rate)
    .bind(future.hv)
    .bind(future.contract_month)
    .bind(future.updated_at.with_timezone(&Utc))
    .execute(conn)
    .await
    .map_err(|e| {
        error!("Failed to insert futures price for {}: {}", future.updated_at, e);
        e
    })?;

    Ok(())
}

/// Inserts every leg, letting `unique_idx_option` drop exact repeats.
/// Returns the number of rows actually written.
pub async fn insert_option_prices(
    conn: &mut PgConnection,
    options: &[OptionPrice],
) -> Result<u64, sqlx::Error> {
    let mut inserted = 0;

    for (i, o) in options.iter().enumerate() {
        let result = sqlx::query(
            r#"
            INSERT INTO "option" (
                type, target_price, is_atm, price, price_time, diff, diff_rate, iv,
                bid, bid_volume, bid_iv, ask, ask_volume, ask_iv,
                volume, positions, quotation, quotation_date,
                delta, gamma, theta, vega, last_trading_day, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8,
                $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18,
                $19, $20, $21, $22, $23, $24
            )
            ON CONFLICT ON CONSTRAINT unique_idx_option DO NOTHING
            "#,
        )
        .bind(o.option_type)
        .bind(o.target_price)
        .bind(o.is_atm)
        .bind(o.price)
        .bind(o.price_time.map(|t| t.with_timezone(&Utc)))
        .bind(o.diff)
        .bind(o.diff_rate)
        .bind(o.iv)
        .bind(o.bid)
        .bind(o.bid_volume)
        .bind(o.bid_iv)
        .bind(o.ask)
        .bind(o.ask_volume)
        .bind(o.ask_iv)
        .bind(o.volume)
        .bind(o.positions)
        .bind(o.quotation)
        .bind(o.quotation_date)
        .bind(o.delta)
        .bind(o.gamma)
        .bind(o.theta)
        .bind(o.vega)
        .bind(o.last_trading_day)
        .bind(o.updated_at.with_timezone(&Utc))
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            error!(
                "Failed to insert option {} ({} {} {}): {}",
                i, o.option_type, o.target_price, o.last_trading_day, e
            );
            e
        })?;

        inserted += result.rows_affected();
    }

    Ok(inserted)
}
