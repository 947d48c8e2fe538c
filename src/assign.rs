use uuid::Uuid;

use crate::models::Operator;

#[derive(Debug, Clone)]
pub struct NameResolution {
    pub name: String,
    pub operator_id: Option<Uuid>,
}

/// Expands a shipment's operator-name list into one row per name, looked up
/// against the directory by exact name match. Output length always equals
/// input length; a name that matches no operator carries `None` and it is the
/// caller's job to drop (and log) it before storage. Duplicate names are not
/// collapsed here.
pub fn resolve_names(names: &[String], directory: &[Operator]) -> Vec<NameResolution> {
    names
        .iter()
        .map(|name| NameResolution {
            name: name.clone(),
            operator_id: directory
                .iter()
                .find(|op| op.name == *name)
                .map(|op| op.id),
        })
        .collect()
}
