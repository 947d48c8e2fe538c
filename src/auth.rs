use crate::error::KpiError;
use crate::models::AppUser;

/// Proof that the caller passed the KPI access check. Every aggregation entry
/// point takes one of these, so the role check lives here and nowhere else.
#[derive(Debug, Clone)]
pub struct KpiViewer {
    pub email: String,
}

/// Admins and users granted the explicit KPI-view permission may read
/// performance data; everyone else gets a hard rejection, never partial data.
pub fn authorize(user: Option<AppUser>, email: &str) -> Result<KpiViewer, KpiError> {
    match user {
        Some(user) if user.role == "admin" || user.can_view_kpi => {
            Ok(KpiViewer { email: user.email })
        }
        _ => Err(KpiError::PermissionDenied {
            email: email.to_string(),
        }),
    }
}

/// Proof of administrator rights, required by taxonomy-mutating commands.
#[derive(Debug, Clone)]
pub struct Admin {
    pub email: String,
}

pub fn authorize_admin(user: Option<AppUser>, email: &str) -> Result<Admin, KpiError> {
    match user {
        Some(user) if user.role == "admin" => Ok(Admin { email: user.email }),
        _ => Err(KpiError::PermissionDenied {
            email: email.to_string(),
        }),
    }
}
