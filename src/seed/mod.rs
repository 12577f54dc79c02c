use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::error::AppResult;

static SERVICE_NAMES: &[&str] = &[
    "Emergency",
    "Intensive Care",
    "Cardiology",
    "Oncology",
    "Pediatrics",
    "Maternity",
    "Orthopedics",
    "Neurology",
    "Surgery",
    "Radiology",
    "Central Pharmacy",
    "Palliative Care",
];

static WINGS: &[&str] = &["North Wing", "South Wing", "East Wing", "West Wing", "Annex"];

static ACTIVE_INGREDIENTS: &[&str] = &[
    "Paracetamol", "Ibuprofen", "Amoxicillin", "Heparin", "Insulin", "Morphine",
    "Omeprazole", "Metformin", "Salbutamol", "Furosemide", "Ceftriaxone",
    "Diazepam", "Enoxaparin", "Ondansetron", "Dexamethasone", "Tramadol",
];

static FORMS: &[(&str, &str)] = &[
    ("500 mg tablet", "tablet"),
    ("250 mg capsule", "capsule"),
    ("10 mg/ml injection", "injectable"),
    ("100 ml infusion", "infusion"),
    ("2% cream", "topical"),
    ("5 mg/5 ml syrup", "oral solution"),
];

#[derive(Debug, Serialize)]
pub struct SeedSummary {
    pub services: usize,
    pub medications: usize,
    pub stock_levels: usize,
    pub below_minimum: usize,
    pub administrator_id: Uuid,
}

/// Seed demo services, medications, a stock row for every pair and one
/// administrator. Roughly a fifth of the stock rows start below minimum.
pub async fn seed_hospital(
    pool: &PgPool,
    service_count: usize,
    medication_count: usize,
) -> AppResult<SeedSummary> {
    info!(service_count, medication_count, "Seeding hospital data...");

    // StdRng is Send, so it can live across await points.
    let mut rng = StdRng::from_entropy();
    let suffix: u32 = rng.gen_range(1000..10_000);

    let mut names = Vec::with_capacity(service_count);
    let mut locations = Vec::with_capacity(service_count);
    let mut open_24h = Vec::with_capacity(service_count);
    for i in 0..service_count {
        let base = SERVICE_NAMES[i % SERVICE_NAMES.len()];
        names.push(format!("{} {}-{}", base, suffix, i + 1));
        locations.push(WINGS.choose(&mut rng).unwrap_or(&"Main Building").to_string());
        open_24h.push(base == "Emergency" || base == "Intensive Care" || rng.gen_bool(0.2));
    }

    let service_ids: Vec<Uuid> = sqlx::query_scalar(
        r#"
        INSERT INTO hospital_services (name, location, open_24h)
        SELECT * FROM UNNEST($1::text[], $2::text[], $3::bool[])
        RETURNING id
        "#,
    )
    .bind(&names)
    .bind(&locations)
    .bind(&open_24h)
    .fetch_all(pool)
    .await?;

    let mut med_names = Vec::with_capacity(medication_count);
    let mut kinds = Vec::with_capacity(medication_count);
    let mut batches = Vec::with_capacity(medication_count);
    let mut expiries = Vec::with_capacity(medication_count);
    let today = Utc::now().date_naive();
    for i in 0..medication_count {
        let ingredient = ACTIVE_INGREDIENTS.choose(&mut rng).unwrap_or(&"Paracetamol");
        let (form, kind) = FORMS.choose(&mut rng).unwrap_or(&FORMS[0]);
        med_names.push(format!("{} {} #{}-{:04}", ingredient, form, suffix, i + 1));
        kinds.push(kind.to_string());
        batches.push(format!("LOT-{:06}", rng.gen_range(0..1_000_000)));
        expiries.push(today + Duration::days(rng.gen_range(30..=900)));
    }

    let medication_ids: Vec<Uuid> = sqlx::query_scalar(
        r#"
        INSERT INTO medications (name, kind, batch, expires_on)
        SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[], $4::date[])
        ON CONFLICT (name) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(&med_names)
    .bind(&kinds)
    .bind(&batches)
    .bind(&expiries)
    .fetch_all(pool)
    .await?;

    let pairs = medication_ids.len() * service_ids.len();
    let mut stock_meds = Vec::with_capacity(pairs);
    let mut stock_services = Vec::with_capacity(pairs);
    let mut available = Vec::with_capacity(pairs);
    let mut minimum = Vec::with_capacity(pairs);
    let mut below_minimum = 0;
    for medication_id in &medication_ids {
        for service_id in &service_ids {
            let min: i32 = rng.gen_range(5..=40);
            let qty: i32 = if rng.gen_bool(0.2) {
                below_minimum += 1;
                rng.gen_range(0..min)
            } else {
                rng.gen_range(min..=min * 4)
            };
            stock_meds.push(*medication_id);
            stock_services.push(*service_id);
            available.push(qty);
            minimum.push(min);
        }
    }

    sqlx::query(
        r#"
        INSERT INTO medication_stock (medication_id, service_id, available_quantity, minimum_quantity)
        SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::int[], $4::int[])
        ON CONFLICT (medication_id, service_id) DO NOTHING
        "#,
    )
    .bind(&stock_meds)
    .bind(&stock_services)
    .bind(&available)
    .bind(&minimum)
    .execute(pool)
    .await?;

    let administrator_id: Uuid = sqlx::query_scalar(
        "INSERT INTO staff (name, service_id, is_administrator) VALUES ($1, $2, TRUE) RETURNING id",
    )
    .bind(format!("Pharmacy Administrator {}", suffix))
    .bind(service_ids.first().copied())
    .fetch_one(pool)
    .await?;

    info!(
        services = service_ids.len(),
        medications = medication_ids.len(),
        stock_levels = pairs,
        below_minimum,
        "Seeding complete"
    );

    Ok(SeedSummary {
        services: service_ids.len(),
        medications: medication_ids.len(),
        stock_levels: pairs,
        below_minimum,
        administrator_id,
    })
}
