use thiserror::Error;

/// Rejections callers are expected to branch on, as opposed to plumbing
/// failures that travel as `anyhow::Error`.
#[derive(Debug, Error)]
pub enum KpiError {
    #[error("permission denied: {email} has no KPI access")]
    PermissionDenied { email: String },

    #[error("category \"{name}\" is still in use by {count} shipments; deactivate it instead")]
    CategoryInUse { name: String, count: i64 },
}
