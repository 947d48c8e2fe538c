use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Operator {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub active: bool,
    pub sort_order: i32,
}

/// One (shipment, operator) pair eligible for scoring: the shipment is
/// completed, carries a completion timestamp, and is not archived.
#[derive(Debug, Clone)]
pub struct AssignmentRecord {
    pub shipment_id: Uuid,
    pub operator_id: Uuid,
    pub operator_name: String,
    pub title: String,
    pub intensity: Option<String>,
    pub is_delivery: bool,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryBreakdown {
    pub category: String,
    pub task_count: i64,
    pub category_score: i64,
    pub avg_score_per_task: f64,
    pub first_completion: DateTime<Utc>,
    pub last_completion: DateTime<Utc>,
    pub has_delivery: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperatorPerformance {
    pub operator_id: Uuid,
    pub operator_name: String,
    pub total_tasks: i64,
    pub total_score: i64,
    pub high_count: i64,
    pub medium_count: i64,
    pub low_count: i64,
    pub active_days: i64,
    pub first_completion: DateTime<Utc>,
    pub last_completion: DateTime<Utc>,
    pub avg_score_per_task: f64,
    pub rank: i64,
    pub categories: Vec<CategoryBreakdown>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryStat {
    pub category: String,
    pub total_tasks: i64,
    pub total_score: i64,
    pub operator_count: i64,
    pub avg_tasks_per_operator: f64,
    pub avg_score_per_task: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissingCategoryReport {
    pub operator_name: String,
    pub missing: Vec<String>,
    pub completed: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SummaryRow {
    pub operator_name: String,
    pub total_tasks: i64,
    pub total_score: i64,
    pub high_count: i64,
    pub medium_count: i64,
    pub low_count: i64,
    pub active_days: i64,
    pub rank: i64,
    pub refreshed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AppUser {
    pub email: String,
    pub role: String,
    pub can_view_kpi: bool,
}
