use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    AdjustStock, Page, SetMinimum, StockFilters, StockLevel, StockTransfer, UpsertStock,
};

const LEVEL_SELECT: &str = r#"
    SELECT s.medication_id, m.name AS medication_name,
           s.service_id, h.name AS service_name, h.location AS service_location,
           s.available_quantity, s.minimum_quantity, s.updated_at
    FROM medication_stock s
    JOIN medications m ON m.id = s.medication_id
    JOIN hospital_services h ON h.id = s.service_id
"#;

fn pair_not_found(medication_id: Uuid, service_id: Uuid) -> AppError {
    AppError::NotFound(format!(
        "No stock row for medication {} at service {}",
        medication_id, service_id
    ))
}

// ── Reads ─────────────────────────────────────────────────────────────────────

pub async fn fetch_levels(pool: &PgPool, filters: &StockFilters) -> AppResult<Vec<StockLevel>> {
    let sql = format!(
        "{} WHERE ($1::bool IS NOT TRUE OR s.available_quantity < s.minimum_quantity) \
         ORDER BY m.name, h.name",
        LEVEL_SELECT
    );
    let levels = sqlx::query_as::<_, StockLevel>(&sql)
        .bind(filters.below_minimum)
        .fetch_all(pool)
        .await?;
    Ok(levels)
}

pub async fn fetch_levels_for_service(pool: &PgPool, service_id: Uuid) -> AppResult<Vec<StockLevel>> {
    let sql = format!("{} WHERE s.service_id = $1 ORDER BY m.name", LEVEL_SELECT);
    let levels = sqlx::query_as::<_, StockLevel>(&sql)
        .bind(service_id)
        .fetch_all(pool)
        .await?;
    Ok(levels)
}

pub async fn fetch_level(pool: &PgPool, medication_id: Uuid, service_id: Uuid) -> AppResult<StockLevel> {
    let sql = format!(
        "{} WHERE s.medication_id = $1 AND s.service_id = $2",
        LEVEL_SELECT
    );
    sqlx::query_as::<_, StockLevel>(&sql)
        .bind(medication_id)
        .bind(service_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| pair_not_found(medication_id, service_id))
}

/// The deficit set: every pair whose available quantity is under its minimum.
pub async fn fetch_below_minimum(pool: &PgPool) -> AppResult<Vec<StockLevel>> {
    fetch_levels(
        pool,
        &StockFilters {
            below_minimum: Some(true),
        },
    )
    .await
}

/// Services other than `excluding` holding more than their minimum of the
/// medication, largest stock first.
pub async fn fetch_surplus_holders(
    pool: &PgPool,
    medication_id: Uuid,
    excluding_service_id: Uuid,
) -> AppResult<Vec<StockLevel>> {
    let sql = format!(
        "{} WHERE s.medication_id = $1 AND s.service_id <> $2 \
           AND s.available_quantity > s.minimum_quantity \
         ORDER BY s.available_quantity DESC, s.service_id",
        LEVEL_SELECT
    );
    let holders = sqlx::query_as::<_, StockLevel>(&sql)
        .bind(medication_id)
        .bind(excluding_service_id)
        .fetch_all(pool)
        .await?;
    Ok(holders)
}

pub async fn fetch_current_quantity(
    pool: &PgPool,
    medication_id: Uuid,
    service_id: Uuid,
) -> AppResult<i32> {
    let row: Option<(i32,)> = sqlx::query_as(
        "SELECT available_quantity FROM medication_stock WHERE medication_id = $1 AND service_id = $2",
    )
    .bind(medication_id)
    .bind(service_id)
    .fetch_optional(pool)
    .await?;

    row.map(|(qty,)| qty)
        .ok_or_else(|| pair_not_found(medication_id, service_id))
}

pub async fn fetch_transfers(pool: &PgPool, page: &Page) -> AppResult<Vec<StockTransfer>> {
    let transfers = sqlx::query_as::<_, StockTransfer>(
        r#"
        SELECT id, medication_id, from_service_id, to_service_id, quantity, created_at
        FROM stock_transfers
        ORDER BY created_at DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;
    Ok(transfers)
}

// ── Writes ────────────────────────────────────────────────────────────────────

pub async fn upsert_level(pool: &PgPool, payload: &UpsertStock) -> AppResult<StockLevel> {
    sqlx::query(
        r#"
        INSERT INTO medication_stock (medication_id, service_id, available_quantity, minimum_quantity)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (medication_id, service_id) DO UPDATE
        SET available_quantity = EXCLUDED.available_quantity,
            minimum_quantity   = EXCLUDED.minimum_quantity,
            updated_at         = NOW()
        "#,
    )
    .bind(payload.medication_id)
    .bind(payload.service_id)
    .bind(payload.available_quantity)
    .bind(payload.minimum_quantity)
    .execute(pool)
    .await?;

    fetch_level(pool, payload.medication_id, payload.service_id).await
}

pub async fn add_stock(pool: &PgPool, payload: &AdjustStock) -> AppResult<StockLevel> {
    let result = sqlx::query(
        r#"
        UPDATE medication_stock
        SET available_quantity = available_quantity + $3, updated_at = NOW()
        WHERE medication_id = $1 AND service_id = $2
        "#,
    )
    .bind(payload.medication_id)
    .bind(payload.service_id)
    .bind(payload.quantity)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(pair_not_found(payload.medication_id, payload.service_id));
    }
    fetch_level(pool, payload.medication_id, payload.service_id).await
}

pub async fn remove_stock(pool: &PgPool, payload: &AdjustStock) -> AppResult<StockLevel> {
    let result = sqlx::query(
        r#"
        UPDATE medication_stock
        SET available_quantity = available_quantity - $3, updated_at = NOW()
        WHERE medication_id = $1 AND service_id = $2 AND available_quantity >= $3
        "#,
    )
    .bind(payload.medication_id)
    .bind(payload.service_id)
    .bind(payload.quantity)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        // Distinguish a missing pair from a short one.
        let available = fetch_current_quantity(pool, payload.medication_id, payload.service_id).await?;
        return Err(AppError::InsufficientStock(format!(
            "requested {} but only {} available",
            payload.quantity, available
        )));
    }
    fetch_level(pool, payload.medication_id, payload.service_id).await
}

pub async fn set_minimum(pool: &PgPool, payload: &SetMinimum) -> AppResult<StockLevel> {
    if payload.minimum_quantity < 0 {
        return Err(AppError::BadRequest("minimum_quantity must be >= 0".to_string()));
    }

    let result = sqlx::query(
        r#"
        UPDATE medication_stock
        SET minimum_quantity = $3, updated_at = NOW()
        WHERE medication_id = $1 AND service_id = $2
        "#,
    )
    .bind(payload.medication_id)
    .bind(payload.service_id)
    .bind(payload.minimum_quantity)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(pair_not_found(payload.medication_id, payload.service_id));
    }
    fetch_level(pool, payload.medication_id, payload.service_id).await
}

/// Moves up to `quantity` units of a medication between two services.
///
/// Debit, credit and ledger row commit together. Both stock rows are locked in
/// service-id order so concurrent transfers over the same pair cannot deadlock
/// or spend the same surplus twice. The amount is capped at the target's
/// deficit as seen under the lock; `None` means the target is already at its
/// minimum and nothing moved.
pub async fn transfer(
    pool: &PgPool,
    medication_id: Uuid,
    from_service_id: Uuid,
    to_service_id: Uuid,
    quantity: i32,
) -> AppResult<Option<StockTransfer>> {
    if quantity <= 0 {
        return Err(AppError::BadRequest("transfer quantity must be > 0".to_string()));
    }
    if from_service_id == to_service_id {
        return Err(AppError::BadRequest(
            "cannot transfer stock to the same service".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let locked: Vec<(Uuid, i32, i32)> = sqlx::query_as(
        r#"
        SELECT service_id, available_quantity, minimum_quantity
        FROM medication_stock
        WHERE medication_id = $1 AND service_id = ANY($2)
        ORDER BY service_id
        FOR UPDATE
        "#,
    )
    .bind(medication_id)
    .bind(vec![from_service_id, to_service_id])
    .fetch_all(&mut *tx)
    .await?;

    let source = locked
        .iter()
        .find(|(service_id, _, _)| *service_id == from_service_id)
        .ok_or_else(|| pair_not_found(medication_id, from_service_id))?;
    let target = locked
        .iter()
        .find(|(service_id, _, _)| *service_id == to_service_id)
        .ok_or_else(|| pair_not_found(medication_id, to_service_id))?;

    let quantity = quantity.min(target.2 - target.1);
    if quantity <= 0 {
        return Ok(None);
    }

    let surplus = source.1 - source.2;
    if quantity > surplus {
        return Err(AppError::InsufficientStock(format!(
            "service {} holds only {} surplus units of medication {}",
            from_service_id,
            surplus.max(0),
            medication_id
        )));
    }

    sqlx::query(
        r#"
        UPDATE medication_stock
        SET available_quantity = available_quantity - $3, updated_at = NOW()
        WHERE medication_id = $1 AND service_id = $2
        "#,
    )
    .bind(medication_id)
    .bind(from_service_id)
    .bind(quantity)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE medication_stock
        SET available_quantity = available_quantity + $3, updated_at = NOW()
        WHERE medication_id = $1 AND service_id = $2
        "#,
    )
    .bind(medication_id)
    .bind(to_service_id)
    .bind(quantity)
    .execute(&mut *tx)
    .await?;

    let record = sqlx::query_as::<_, StockTransfer>(
        r#"
        INSERT INTO stock_transfers (medication_id, from_service_id, to_service_id, quantity)
        VALUES ($1, $2, $3, $4)
        RETURNING id, medication_id, from_service_id, to_service_id, quantity, created_at
        "#,
    )
    .bind(medication_id)
    .bind(from_service_id)
    .bind(to_service_id)
    .bind(quantity)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(record))
}
