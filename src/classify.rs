use crate::models::Category;

/// Catch-all bucket for titles no configured prefix matches.
pub const CATCH_ALL: &str = "OTHER";

/// Prefix matcher over a snapshot of the active category set.
///
/// Categories are tried in (sort_order ascending, name length descending)
/// order so that a longer, more specific name wins a sort_order tie.
/// Matching is case-insensitive and anchored at the start of the title.
pub struct Classifier {
    // (display name, lowercased prefix), in match priority order
    prefixes: Vec<(String, String)>,
}

impl Classifier {
    pub fn new(categories: &[Category]) -> Self {
        let mut active: Vec<&Category> = categories.iter().filter(|c| c.active).collect();
        active.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then(b.name.len().cmp(&a.name.len()))
                .then(a.name.cmp(&b.name))
        });

        Classifier {
            prefixes: active
                .into_iter()
                .map(|c| (c.name.clone(), c.name.to_lowercase()))
                .collect(),
        }
    }

    pub fn classify(&self, title: &str) -> &str {
        let title = title.trim().to_lowercase();
        if title.is_empty() {
            return CATCH_ALL;
        }

        for (name, prefix) in &self.prefixes {
            if title.starts_with(prefix.as_str()) {
                return name;
            }
        }

        CATCH_ALL
    }
}
