use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::assign;
use crate::classify::Classifier;
use crate::error::KpiError;
use crate::models::{AppUser, AssignmentRecord, Category, Operator, SummaryRow};
use crate::perf::{self, Window};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let operators = vec![
        (
            Uuid::parse_str("7a1e9c30-51d2-4f5b-9f0a-6c2b8a1d4e73")?,
            "Alice Chen",
            "#2f9e44",
        ),
        (
            Uuid::parse_str("b4f08d12-8c6e-4a91-b3d7-0e5f2c9a6814")?,
            "Marcus Webb",
            "#1971c2",
        ),
        (
            Uuid::parse_str("e93c5b7f-2a04-48d6-8e1b-f7a90c3d5b26")?,
            "Priya Nair",
            "#f08c00",
        ),
    ];

    for (id, name, color) in &operators {
        sqlx::query(
            r#"
            INSERT INTO operator_kpi.operators (id, name, color, active)
            VALUES ($1, $2, $3, TRUE)
            ON CONFLICT (name) DO UPDATE SET color = EXCLUDED.color
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(color)
        .execute(pool)
        .await?;
    }

    let users = vec![
        ("ops@depot.example", "admin", true),
        ("lead@depot.example", "staff", true),
        ("floor@depot.example", "staff", false),
    ];

    for (email, role, can_view_kpi) in users {
        sqlx::query(
            r#"
            INSERT INTO operator_kpi.app_users (id, email, role, can_view_kpi)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE
            SET role = EXCLUDED.role, can_view_kpi = EXCLUDED.can_view_kpi
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(role)
        .bind(can_view_kpi)
        .execute(pool)
        .await?;
    }

    let shipments = vec![
        (
            "seed-001",
            "INCOMING Pallet 4",
            "completed",
            "high",
            Some("2026-02-02T08:30:00Z"),
            false,
            vec!["Alice Chen"],
        ),
        (
            "seed-002",
            "OUTGOING Truck 12",
            "completed",
            "medium",
            Some("2026-02-03T14:05:00Z"),
            true,
            vec!["Alice Chen", "Marcus Webb"],
        ),
        (
            "seed-003",
            "PICKING Wave 7",
            "completed",
            "low",
            Some("2026-02-04T09:10:00Z"),
            false,
            vec!["Priya Nair"],
        ),
        (
            "seed-004",
            "INVENTORY Count Aisle 3",
            "in_progress",
            "medium",
            None,
            false,
            vec!["Marcus Webb"],
        ),
    ];

    for (source_key, title, status, intensity, completed_at, is_delivery, names) in shipments {
        let completed_at: Option<DateTime<Utc>> = match completed_at {
            Some(raw) => Some(raw.parse().context("invalid seed timestamp")?),
            None => None,
        };
        let scheduled_at = completed_at.unwrap_or_else(Utc::now);

        let shipment_id: Option<Uuid> = sqlx::query(
            r#"
            INSERT INTO operator_kpi.shipments
            (id, title, scheduled_at, status, completed_at, intensity, is_delivery, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(title)
        .bind(scheduled_at)
        .bind(status)
        .bind(completed_at)
        .bind(intensity)
        .bind(is_delivery)
        .bind(source_key)
        .fetch_optional(pool)
        .await?
        .map(|row| row.get("id"));

        if let Some(shipment_id) = shipment_id {
            for (operator_id, name, _) in &operators {
                if names.contains(name) {
                    sqlx::query(
                        r#"
                        INSERT INTO operator_kpi.shipment_operators (shipment_id, operator_id)
                        VALUES ($1, $2)
                        ON CONFLICT DO NOTHING
                        "#,
                    )
                    .bind(shipment_id)
                    .bind(operator_id)
                    .execute(pool)
                    .await?;
                }
            }
        }
    }

    Ok(())
}

pub async fn fetch_operators(pool: &PgPool) -> anyhow::Result<Vec<Operator>> {
    let rows = sqlx::query(
        "SELECT id, name, color, active FROM operator_kpi.operators ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Operator {
            id: row.get("id"),
            name: row.get("name"),
            color: row.get("color"),
            active: row.get("active"),
        })
        .collect())
}

pub async fn fetch_categories(pool: &PgPool) -> anyhow::Result<Vec<Category>> {
    let rows = sqlx::query(
        "SELECT id, name, color, active, sort_order \
         FROM operator_kpi.task_categories ORDER BY sort_order, name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Category {
            id: row.get("id"),
            name: row.get("name"),
            color: row.get("color"),
            active: row.get("active"),
            sort_order: row.get("sort_order"),
        })
        .collect())
}

pub async fn fetch_app_user(pool: &PgPool, email: &str) -> anyhow::Result<Option<AppUser>> {
    let row = sqlx::query(
        "SELECT email, role, can_view_kpi FROM operator_kpi.app_users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| AppUser {
        email: row.get("email"),
        role: row.get("role"),
        can_view_kpi: row.get("can_view_kpi"),
    }))
}

pub async fn operator_id_by_name(pool: &PgPool, name: &str) -> anyhow::Result<Option<Uuid>> {
    let row = sqlx::query("SELECT id FROM operator_kpi.operators WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| row.get("id")))
}

/// Eligible (operator, shipment) pairs: completed, timestamped, not archived,
/// optionally bounded by completion time. A completed shipment with no
/// completion timestamp is a data-quality gap and never shows up here.
pub async fn fetch_completed_assignments(
    pool: &PgPool,
    window: &Window,
) -> anyhow::Result<Vec<AssignmentRecord>> {
    let mut query = String::from(
        "SELECT s.id AS shipment_id, s.title, s.intensity, s.is_delivery, s.completed_at, \
         o.id AS operator_id, o.name AS operator_name \
         FROM operator_kpi.shipments s \
         JOIN operator_kpi.shipment_operators so ON so.shipment_id = s.id \
         JOIN operator_kpi.operators o ON o.id = so.operator_id \
         WHERE s.status = 'completed' AND s.completed_at IS NOT NULL AND NOT s.archived",
    );

    let mut param = 0;
    if window.start.is_some() {
        param += 1;
        query.push_str(&format!(" AND s.completed_at >= ${param}"));
    }
    if window.end.is_some() {
        param += 1;
        query.push_str(&format!(" AND s.completed_at <= ${param}"));
    }

    let mut rows = sqlx::query(&query);
    if let Some(start) = window.start {
        rows = rows.bind(start);
    }
    if let Some(end) = window.end {
        rows = rows.bind(end);
    }

    let records = rows.fetch_all(pool).await?;
    let mut assignments = Vec::with_capacity(records.len());

    for row in records {
        assignments.push(AssignmentRecord {
            shipment_id: row.get("shipment_id"),
            operator_id: row.get("operator_id"),
            operator_name: row.get("operator_name"),
            title: row.get("title"),
            intensity: row.get("intensity"),
            is_delivery: row.get("is_delivery"),
            completed_at: row.get("completed_at"),
        });
    }

    Ok(assignments)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        title: String,
        operators: String,
        intensity: Option<String>,
        is_delivery: bool,
        status: String,
        scheduled_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        source_key: Option<String>,
    }

    let directory = fetch_operators(pool).await?;
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
        let intensity = match row.intensity.as_deref() {
            None | Some("") => "medium".to_string(),
            Some(label) => label.to_string(),
        };

        let shipment_id: Option<Uuid> = sqlx::query(
            r#"
            INSERT INTO operator_kpi.shipments
            (id, title, scheduled_at, status, completed_at, intensity, is_delivery, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.title)
        .bind(row.scheduled_at)
        .bind(&row.status)
        .bind(row.completed_at)
        .bind(&intensity)
        .bind(row.is_delivery)
        .bind(&source_key)
        .fetch_optional(pool)
        .await?
        .map(|row| row.get("id"));

        let Some(shipment_id) = shipment_id else {
            continue;
        };
        inserted += 1;

        let names: Vec<String> = row
            .operators
            .split(';')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();

        for resolution in assign::resolve_names(&names, &directory) {
            match resolution.operator_id {
                Some(operator_id) => {
                    sqlx::query(
                        r#"
                        INSERT INTO operator_kpi.shipment_operators (shipment_id, operator_id)
                        VALUES ($1, $2)
                        ON CONFLICT DO NOTHING
                        "#,
                    )
                    .bind(shipment_id)
                    .bind(operator_id)
                    .execute(pool)
                    .await?;
                }
                None => {
                    warn!(
                        name = %resolution.name,
                        source_key = %source_key,
                        "operator name did not resolve; assignment dropped"
                    );
                }
            }
        }
    }

    Ok(inserted)
}

/// Marks a shipment completed, stamps the completion time, and synchronously
/// refreshes the all-time summary cache before returning.
pub async fn complete_shipment(pool: &PgPool, shipment_id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE operator_kpi.shipments
        SET status = 'completed', completed_at = NOW()
        WHERE id = $1 AND status <> 'completed' AND NOT archived
        "#,
    )
    .bind(shipment_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }

    refresh_performance_summary(pool).await?;
    Ok(true)
}

/// Full recomputation of the all-time rollup, swapped in inside one
/// transaction so dashboard readers see either the old rows or the new ones,
/// never an empty table.
pub async fn refresh_performance_summary(pool: &PgPool) -> anyhow::Result<usize> {
    let categories = fetch_categories(pool).await?;
    let classifier = Classifier::new(&categories);
    let records = fetch_completed_assignments(pool, &Window::all_time()).await?;
    let performances = perf::aggregate(&records, &Window::all_time(), None, &classifier);

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM operator_kpi.performance_summary")
        .execute(&mut *tx)
        .await?;

    for entry in &performances {
        sqlx::query(
            r#"
            INSERT INTO operator_kpi.performance_summary
            (operator_id, operator_name, total_tasks, total_score, high_count, medium_count,
             low_count, active_days, first_completion, last_completion, rank, refreshed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
            "#,
        )
        .bind(entry.operator_id)
        .bind(&entry.operator_name)
        .bind(entry.total_tasks)
        .bind(entry.total_score)
        .bind(entry.high_count)
        .bind(entry.medium_count)
        .bind(entry.low_count)
        .bind(entry.active_days)
        .bind(entry.first_completion)
        .bind(entry.last_completion)
        .bind(entry.rank)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(operators = performances.len(), "performance summary refreshed");
    Ok(performances.len())
}

pub async fn fetch_summary(pool: &PgPool) -> anyhow::Result<Vec<SummaryRow>> {
    let rows = sqlx::query(
        "SELECT operator_name, total_tasks, total_score, high_count, medium_count, low_count, \
         active_days, rank, refreshed_at \
         FROM operator_kpi.performance_summary ORDER BY rank",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| SummaryRow {
            operator_name: row.get("operator_name"),
            total_tasks: row.get("total_tasks"),
            total_score: row.get("total_score"),
            high_count: row.get("high_count"),
            medium_count: row.get("medium_count"),
            low_count: row.get("low_count"),
            active_days: row.get("active_days"),
            rank: row.get("rank"),
            refreshed_at: row.get("refreshed_at"),
        })
        .collect())
}

pub async fn add_category(
    pool: &PgPool,
    name: &str,
    color: &str,
    sort_order: i32,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO operator_kpi.task_categories (id, name, color, active, sort_order)
        VALUES ($1, $2, $3, TRUE, $4)
        ON CONFLICT (name) DO UPDATE
        SET color = EXCLUDED.color, sort_order = EXCLUDED.sort_order, active = TRUE
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(color)
    .bind(sort_order)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn deactivate_category(pool: &PgPool, name: &str) -> anyhow::Result<bool> {
    let result = sqlx::query(
        "UPDATE operator_kpi.task_categories SET active = FALSE WHERE name = $1",
    )
    .bind(name)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Deleting a category is refused while any live shipment's title still
/// classifies into it; deactivation is the safe alternative. A deactivated
/// category never classifies anything, so it is always deletable.
pub async fn delete_category(pool: &PgPool, name: &str) -> anyhow::Result<()> {
    let categories = fetch_categories(pool).await?;
    let classifier = Classifier::new(&categories);

    let titles: Vec<String> =
        sqlx::query("SELECT title FROM operator_kpi.shipments WHERE NOT archived")
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(|row| row.get("title"))
            .collect();

    let blocking = titles
        .iter()
        .filter(|title| classifier.classify(title) == name)
        .count() as i64;

    if blocking > 0 {
        return Err(KpiError::CategoryInUse {
            name: name.to_string(),
            count: blocking,
        }
        .into());
    }

    sqlx::query("DELETE FROM operator_kpi.task_categories WHERE name = $1")
        .bind(name)
        .execute(pool)
        .await?;
    Ok(())
}
