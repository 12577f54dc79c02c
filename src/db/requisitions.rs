use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::config::StockCreditPolicy;
use crate::error::{AppError, AppResult};
use crate::models::{
    CreateRequisition, Requisition, RequisitionDetail, RequisitionFilters, RequisitionLine,
    RequisitionOrigin, RequisitionState, Staff,
};

const REQUISITION_COLUMNS: &str = "id, state, origin, requester_id, approver_id, \
    receiving_service_id, source_service_id, supplier_id, completed, stock_credited, \
    created_at, expected_delivery_at, delivered_at, updated_at";

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Requisition {} not found", id))
}

// ── Reads ─────────────────────────────────────────────────────────────────────

async fn fetch_lines(pool: &PgPool, ids: &[Uuid]) -> AppResult<Vec<RequisitionLine>> {
    let lines = sqlx::query_as::<_, RequisitionLine>(
        r#"
        SELECT l.requisition_id, l.medication_id, m.name AS medication_name, l.quantity
        FROM requisition_lines l
        JOIN medications m ON m.id = l.medication_id
        WHERE l.requisition_id = ANY($1)
        ORDER BY m.name
        "#,
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;
    Ok(lines)
}

async fn with_lines(pool: &PgPool, headers: Vec<Requisition>) -> AppResult<Vec<RequisitionDetail>> {
    let ids: Vec<Uuid> = headers.iter().map(|r| r.id).collect();
    let mut grouped: HashMap<Uuid, Vec<RequisitionLine>> = HashMap::new();
    for line in fetch_lines(pool, &ids).await? {
        grouped.entry(line.requisition_id).or_default().push(line);
    }

    Ok(headers
        .into_iter()
        .map(|requisition| {
            let lines = grouped.remove(&requisition.id).unwrap_or_default();
            RequisitionDetail { requisition, lines }
        })
        .collect())
}

pub async fn fetch_requisitions(
    pool: &PgPool,
    filters: &RequisitionFilters,
) -> AppResult<Vec<RequisitionDetail>> {
    let limit = filters.limit.unwrap_or(100).clamp(1, 1_000);
    let offset = filters.offset.unwrap_or(0).max(0);

    let sql = format!(
        "SELECT {} FROM requisitions \
         WHERE ($1::requisition_state IS NULL OR state = $1) \
         ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        REQUISITION_COLUMNS
    );
    let headers = sqlx::query_as::<_, Requisition>(&sql)
        .bind(filters.state)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    with_lines(pool, headers).await
}

pub async fn fetch_pending_approval(pool: &PgPool) -> AppResult<Vec<RequisitionDetail>> {
    fetch_requisitions(
        pool,
        &RequisitionFilters {
            state: Some(RequisitionState::Pending),
            limit: Some(1_000),
            offset: None,
        },
    )
    .await
}

pub async fn fetch_for_service(pool: &PgPool, service_id: Uuid) -> AppResult<Vec<RequisitionDetail>> {
    let sql = format!(
        "SELECT {} FROM requisitions WHERE receiving_service_id = $1 ORDER BY created_at DESC",
        REQUISITION_COLUMNS
    );
    let headers = sqlx::query_as::<_, Requisition>(&sql)
        .bind(service_id)
        .fetch_all(pool)
        .await?;

    with_lines(pool, headers).await
}

pub async fn fetch_requisition(pool: &PgPool, id: Uuid) -> AppResult<RequisitionDetail> {
    let sql = format!("SELECT {} FROM requisitions WHERE id = $1", REQUISITION_COLUMNS);
    let header = sqlx::query_as::<_, Requisition>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| not_found(id))?;

    let lines = fetch_lines(pool, &[id]).await?;
    Ok(RequisitionDetail {
        requisition: header,
        lines,
    })
}

async fn fetch_staff(conn: &mut PgConnection, id: Uuid) -> AppResult<Staff> {
    sqlx::query_as::<_, Staff>(
        "SELECT id, name, service_id, is_administrator, created_at, updated_at FROM staff WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Staff member {} not found", id)))
}

// ── Manual filing ─────────────────────────────────────────────────────────────

pub async fn insert_manual(pool: &PgPool, payload: &CreateRequisition) -> AppResult<RequisitionDetail> {
    payload.validate()?;

    let mut tx = pool.begin().await?;
    fetch_staff(&mut *tx, payload.requester_id).await?;

    let sql = format!(
        "INSERT INTO requisitions \
           (origin, requester_id, receiving_service_id, source_service_id, supplier_id, expected_delivery_at) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
        REQUISITION_COLUMNS
    );
    let header = sqlx::query_as::<_, Requisition>(&sql)
        .bind(RequisitionOrigin::Manual)
        .bind(payload.requester_id)
        .bind(payload.receiving_service_id)
        .bind(payload.source_service_id)
        .bind(payload.supplier_id)
        .bind(payload.expected_delivery_at)
        .fetch_one(&mut *tx)
        .await?;

    let medication_ids: Vec<Uuid> = payload.lines.iter().map(|l| l.medication_id).collect();
    let quantities: Vec<i32> = payload.lines.iter().map(|l| l.quantity).collect();

    sqlx::query(
        r#"
        INSERT INTO requisition_lines (requisition_id, medication_id, quantity)
        SELECT $1::uuid, * FROM UNNEST($2::uuid[], $3::int[])
        "#,
    )
    .bind(header.id)
    .bind(&medication_ids)
    .bind(&quantities)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(id = %header.id, lines = payload.lines.len(), "Created manual requisition");
    fetch_requisition(pool, header.id).await
}

// ── Automatic filing ──────────────────────────────────────────────────────────

/// Serializes filings for one medication until the surrounding transaction ends.
pub async fn lock_medication_filing(conn: &mut PgConnection, medication_id: Uuid) -> AppResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(medication_id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// True when a not-yet-complete requisition created since `since` has a line
/// for the medication.
pub async fn pending_exists(
    conn: &mut PgConnection,
    medication_id: Uuid,
    since: DateTime<Utc>,
) -> AppResult<bool> {
    let (exists,): (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM requisitions r
            JOIN requisition_lines l ON l.requisition_id = r.id
            WHERE l.medication_id = $1
              AND r.completed = FALSE
              AND r.created_at >= $2
        )
        "#,
    )
    .bind(medication_id)
    .bind(since)
    .fetch_one(&mut *conn)
    .await?;
    Ok(exists)
}

pub async fn insert_automatic(
    conn: &mut PgConnection,
    medication_id: Uuid,
    service_id: Uuid,
    quantity: i32,
    expected_delivery_at: DateTime<Utc>,
) -> AppResult<Requisition> {
    let sql = format!(
        "INSERT INTO requisitions (origin, receiving_service_id, expected_delivery_at) \
         VALUES ($1, $2, $3) RETURNING {}",
        REQUISITION_COLUMNS
    );
    let header = sqlx::query_as::<_, Requisition>(&sql)
        .bind(RequisitionOrigin::Automatic)
        .bind(service_id)
        .bind(expected_delivery_at)
        .fetch_one(&mut *conn)
        .await?;

    sqlx::query(
        "INSERT INTO requisition_lines (requisition_id, medication_id, quantity) VALUES ($1, $2, $3)",
    )
    .bind(header.id)
    .bind(medication_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    Ok(header)
}

// ── State machine ─────────────────────────────────────────────────────────────

/// Applies the requisition's lines to stock: debits `debit_source` when set,
/// then credits the receiving service.
async fn credit_stock(
    conn: &mut PgConnection,
    requisition: &Requisition,
    debit_source: Option<Uuid>,
) -> AppResult<()> {
    let lines: Vec<(Uuid, i32)> = sqlx::query_as(
        "SELECT medication_id, quantity FROM requisition_lines WHERE requisition_id = $1",
    )
    .bind(requisition.id)
    .fetch_all(&mut *conn)
    .await?;

    for (medication_id, quantity) in lines {
        if let Some(source) = debit_source {
            let debited = sqlx::query(
                r#"
                UPDATE medication_stock
                SET available_quantity = available_quantity - $3, updated_at = NOW()
                WHERE medication_id = $1 AND service_id = $2 AND available_quantity >= $3
                "#,
            )
            .bind(medication_id)
            .bind(source)
            .bind(quantity)
            .execute(&mut *conn)
            .await?;

            if debited.rows_affected() == 0 {
                return Err(AppError::InsufficientStock(format!(
                    "service {} cannot supply {} units of medication {}",
                    source, quantity, medication_id
                )));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO medication_stock (medication_id, service_id, available_quantity, minimum_quantity)
            VALUES ($1, $2, $3, 0)
            ON CONFLICT (medication_id, service_id) DO UPDATE
            SET available_quantity = medication_stock.available_quantity + EXCLUDED.available_quantity,
                updated_at = NOW()
            "#,
        )
        .bind(medication_id)
        .bind(requisition.receiving_service_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub async fn transition(
    pool: &PgPool,
    id: Uuid,
    next: RequisitionState,
    actor_id: Uuid,
    policy: StockCreditPolicy,
) -> AppResult<RequisitionDetail> {
    let mut tx = pool.begin().await?;

    let actor = fetch_staff(&mut *tx, actor_id).await?;

    let sql = format!(
        "SELECT {} FROM requisitions WHERE id = $1 FOR UPDATE",
        REQUISITION_COLUMNS
    );
    let current = sqlx::query_as::<_, Requisition>(&sql)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| not_found(id))?;

    let plan = current.plan_transition(next, &actor, policy, Utc::now())?;
    if plan.credit_stock {
        credit_stock(&mut *tx, &current, plan.debit_source).await?;
    }

    sqlx::query(
        r#"
        UPDATE requisitions
        SET state          = $2,
            approver_id    = $3,
            completed      = $4,
            delivered_at   = $5,
            stock_credited = stock_credited OR $6,
            updated_at     = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(plan.next)
    .bind(plan.approver_id)
    .bind(plan.completed)
    .bind(plan.delivered_at)
    .bind(plan.credit_stock)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        id = %id,
        from = %current.state,
        to = %next,
        actor = %actor.id,
        stock_credited = plan.credit_stock,
        "Requisition state changed"
    );

    fetch_requisition(pool, id).await
}

pub async fn delete_requisition(pool: &PgPool, id: Uuid) -> AppResult<()> {
    let result = sqlx::query(
        "DELETE FROM requisitions WHERE id = $1 AND state IN ('pending', 'cancelled')",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        // Either missing or in a state that must be kept for the audit trail.
        let detail = fetch_requisition(pool, id).await?;
        return Err(AppError::Conflict(format!(
            "requisition {} is {} and can no longer be deleted",
            id, detail.requisition.state
        )));
    }
    Ok(())
}
