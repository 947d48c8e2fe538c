use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::classify::{Classifier, CATCH_ALL};
use crate::models::{
    AssignmentRecord, Category, CategoryBreakdown, CategoryStat, MissingCategoryReport, Operator,
    OperatorPerformance,
};

/// Point value of an intensity label. Total over any input: an absent or
/// unrecognized label contributes nothing.
pub fn score(intensity: Option<&str>) -> i64 {
    match intensity.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("high") => 3,
        Some("medium") => 2,
        Some("low") => 1,
        _ => 0,
    }
}

/// Optional completion-timestamp range, both bounds inclusive.
#[derive(Debug, Clone, Copy, Default)]
pub struct Window {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl Window {
    pub fn all_time() -> Self {
        Window::default()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| at >= start) && self.end.map_or(true, |end| at <= end)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Window/filter the eligible pairs and collapse them to one row per
/// (operator, shipment). Everything downstream sums over this set, so a
/// shipment can never count twice for the same operator no matter how many
/// join paths produced it.
fn distinct_assignments<'a>(
    records: &'a [AssignmentRecord],
    window: &Window,
    operator_filter: Option<Uuid>,
) -> Vec<&'a AssignmentRecord> {
    let mut seen: HashSet<(Uuid, Uuid)> = HashSet::new();
    records
        .iter()
        .filter(|r| window.contains(r.completed_at))
        .filter(|r| operator_filter.map_or(true, |id| r.operator_id == id))
        .filter(|r| seen.insert((r.operator_id, r.shipment_id)))
        .collect()
}

struct CategoryAcc {
    task_count: i64,
    score: i64,
    first: DateTime<Utc>,
    last: DateTime<Utc>,
    has_delivery: bool,
}

/// Per-operator totals, tier counts, rank, and category breakdown for the
/// given window. Operators with no eligible assignment in the window are
/// omitted entirely.
pub fn aggregate(
    records: &[AssignmentRecord],
    window: &Window,
    operator_filter: Option<Uuid>,
    classifier: &Classifier,
) -> Vec<OperatorPerformance> {
    let rows = distinct_assignments(records, window, operator_filter);

    let mut by_operator: BTreeMap<Uuid, Vec<&AssignmentRecord>> = BTreeMap::new();
    for row in rows {
        by_operator.entry(row.operator_id).or_default().push(row);
    }

    let mut results: Vec<OperatorPerformance> = Vec::with_capacity(by_operator.len());

    for (operator_id, rows) in by_operator {
        let mut total_score = 0i64;
        let mut high_count = 0i64;
        let mut medium_count = 0i64;
        let mut low_count = 0i64;
        let mut days: HashSet<NaiveDate> = HashSet::new();
        let mut first = rows[0].completed_at;
        let mut last = rows[0].completed_at;
        let mut categories: HashMap<String, CategoryAcc> = HashMap::new();

        for row in &rows {
            let points = score(row.intensity.as_deref());
            total_score += points;
            match points {
                3 => high_count += 1,
                2 => medium_count += 1,
                1 => low_count += 1,
                _ => {}
            }
            days.insert(row.completed_at.date_naive());
            first = first.min(row.completed_at);
            last = last.max(row.completed_at);

            let category = classifier.classify(&row.title).to_string();
            let acc = categories.entry(category).or_insert(CategoryAcc {
                task_count: 0,
                score: 0,
                first: row.completed_at,
                last: row.completed_at,
                has_delivery: false,
            });
            acc.task_count += 1;
            acc.score += points;
            acc.first = acc.first.min(row.completed_at);
            acc.last = acc.last.max(row.completed_at);
            acc.has_delivery |= row.is_delivery;
        }

        let mut breakdown: Vec<CategoryBreakdown> = categories
            .into_iter()
            .map(|(category, acc)| CategoryBreakdown {
                category,
                task_count: acc.task_count,
                category_score: acc.score,
                avg_score_per_task: round2(acc.score as f64 / acc.task_count as f64),
                first_completion: acc.first,
                last_completion: acc.last,
                has_delivery: acc.has_delivery,
            })
            .collect();
        breakdown.sort_by(|a, b| {
            b.category_score
                .cmp(&a.category_score)
                .then_with(|| a.category.cmp(&b.category))
        });

        let total_tasks = rows.len() as i64;
        results.push(OperatorPerformance {
            operator_id,
            operator_name: rows[0].operator_name.clone(),
            total_tasks,
            total_score,
            high_count,
            medium_count,
            low_count,
            active_days: days.len() as i64,
            first_completion: first,
            last_completion: last,
            avg_score_per_task: if total_tasks == 0 {
                0.0
            } else {
                round2(total_score as f64 / total_tasks as f64)
            },
            rank: 0,
            categories: breakdown,
        });
    }

    // Row-number ranking: ties still get distinct sequential ranks.
    results.sort_by(|a, b| {
        b.total_score
            .cmp(&a.total_score)
            .then_with(|| b.total_tasks.cmp(&a.total_tasks))
            .then_with(|| a.operator_name.cmp(&b.operator_name))
    });
    for (index, perf) in results.iter_mut().enumerate() {
        perf.rank = index as i64 + 1;
    }

    results
}

/// Cross-operator rollup per category: distinct shipments, score over those
/// shipments, and how that work spreads across operators.
pub fn category_statistics(
    records: &[AssignmentRecord],
    classifier: &Classifier,
) -> Vec<CategoryStat> {
    struct StatAcc {
        shipments: HashSet<Uuid>,
        operators: HashSet<Uuid>,
        assignments: i64,
        total_score: i64,
    }

    let rows = distinct_assignments(records, &Window::all_time(), None);
    let mut by_category: HashMap<String, StatAcc> = HashMap::new();

    for row in rows {
        let acc = by_category
            .entry(classifier.classify(&row.title).to_string())
            .or_insert(StatAcc {
                shipments: HashSet::new(),
                operators: HashSet::new(),
                assignments: 0,
                total_score: 0,
            });
        if acc.shipments.insert(row.shipment_id) {
            acc.total_score += score(row.intensity.as_deref());
        }
        acc.operators.insert(row.operator_id);
        acc.assignments += 1;
    }

    let mut stats: Vec<CategoryStat> = by_category
        .into_iter()
        .map(|(category, acc)| {
            let total_tasks = acc.shipments.len() as i64;
            let operator_count = acc.operators.len() as i64;
            CategoryStat {
                category,
                total_tasks,
                total_score: acc.total_score,
                operator_count,
                avg_tasks_per_operator: if operator_count == 0 {
                    0.0
                } else {
                    round2(acc.assignments as f64 / operator_count as f64)
                },
                avg_score_per_task: if total_tasks == 0 {
                    0.0
                } else {
                    round2(acc.total_score as f64 / total_tasks as f64)
                },
            }
        })
        .collect();

    stats.sort_by(|a, b| {
        b.total_score
            .cmp(&a.total_score)
            .then_with(|| a.category.cmp(&b.category))
    });
    stats
}

/// Workload balance: which active categories each active operator has never
/// completed a task in. The catch-all bucket is not a real category and is
/// excluded from the required set. Only operators with at least one gap are
/// returned.
pub fn missing_categories(
    records: &[AssignmentRecord],
    operators: &[Operator],
    categories: &[Category],
    classifier: &Classifier,
) -> Vec<MissingCategoryReport> {
    let mut required: Vec<&str> = categories
        .iter()
        .filter(|c| c.active && c.name != CATCH_ALL)
        .map(|c| c.name.as_str())
        .collect();
    required.sort();

    let mut completed_by_operator: HashMap<Uuid, HashSet<&str>> = HashMap::new();
    for row in distinct_assignments(records, &Window::all_time(), None) {
        completed_by_operator
            .entry(row.operator_id)
            .or_default()
            .insert(classifier.classify(&row.title));
    }

    let empty = HashSet::new();
    let mut reports: Vec<MissingCategoryReport> = Vec::new();

    for operator in operators.iter().filter(|op| op.active) {
        let done = completed_by_operator.get(&operator.id).unwrap_or(&empty);
        let missing: Vec<String> = required
            .iter()
            .filter(|name| !done.contains(**name))
            .map(|name| name.to_string())
            .collect();
        if missing.is_empty() {
            continue;
        }

        let mut completed: Vec<String> = required
            .iter()
            .filter(|name| done.contains(**name))
            .map(|name| name.to_string())
            .collect();
        completed.sort();

        reports.push(MissingCategoryReport {
            operator_name: operator.name.clone(),
            missing,
            completed,
        });
    }

    reports.sort_by(|a, b| {
        b.missing
            .len()
            .cmp(&a.missing.len())
            .then_with(|| a.operator_name.cmp(&b.operator_name))
    });
    reports
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str) -> DateTime<Utc> {
        format!("{date}T10:00:00Z").parse().unwrap()
    }

    fn category(name: &str, active: bool, sort_order: i32) -> Category {
        Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            color: "#888888".to_string(),
            active,
            sort_order,
        }
    }

    fn operator(id: Uuid, name: &str, active: bool) -> Operator {
        Operator {
            id,
            name: name.to_string(),
            color: "#888888".to_string(),
            active,
        }
    }

    fn record(
        operator_id: Uuid,
        operator_name: &str,
        shipment_id: Uuid,
        title: &str,
        intensity: &str,
        completed: &str,
    ) -> AssignmentRecord {
        AssignmentRecord {
            shipment_id,
            operator_id,
            operator_name: operator_name.to_string(),
            title: title.to_string(),
            intensity: Some(intensity.to_string()),
            is_delivery: false,
            completed_at: at(completed),
        }
    }

    fn default_classifier() -> Classifier {
        Classifier::new(&[
            category("INCOMING", true, 10),
            category("OUTGOING", true, 20),
            category("PICKING", true, 30),
        ])
    }

    #[test]
    fn scoring_rule_tiers() {
        assert_eq!(score(Some("high")), 3);
        assert_eq!(score(Some("Medium")), 2);
        assert_eq!(score(Some("low")), 1);
        assert_eq!(score(Some("extreme")), 0);
        assert_eq!(score(None), 0);
    }

    #[test]
    fn alice_two_incoming_shipments() {
        // Scenario: two solo completed shipments, one high and one low.
        let alice = Uuid::new_v4();
        let records = vec![
            record(
                alice,
                "Alice",
                Uuid::new_v4(),
                "INCOMING Pallet 1",
                "high",
                "2024-01-01",
            ),
            record(
                alice,
                "Alice",
                Uuid::new_v4(),
                "INCOMING Pallet 2",
                "low",
                "2024-01-02",
            ),
        ];

        let results = aggregate(&records, &Window::all_time(), None, &default_classifier());
        assert_eq!(results.len(), 1);
        let perf = &results[0];
        assert_eq!(perf.total_tasks, 2);
        assert_eq!(perf.total_score, 4);
        assert_eq!(perf.high_count, 1);
        assert_eq!(perf.medium_count, 0);
        assert_eq!(perf.low_count, 1);
        assert_eq!(perf.active_days, 2);
        assert_eq!(perf.rank, 1);
        assert_eq!(perf.avg_score_per_task, 2.0);
        assert_eq!(perf.categories.len(), 1);
        assert_eq!(perf.categories[0].category, "INCOMING");
        assert_eq!(perf.categories[0].task_count, 2);
        assert_eq!(perf.categories[0].category_score, 4);
    }

    #[test]
    fn unlabeled_title_lands_in_catch_all_bucket() {
        let op = Uuid::new_v4();
        let records = vec![record(
            op,
            "Alice",
            Uuid::new_v4(),
            "Unlabeled Task",
            "medium",
            "2024-01-05",
        )];
        let results = aggregate(&records, &Window::all_time(), None, &default_classifier());
        assert_eq!(results[0].categories[0].category, CATCH_ALL);
    }

    #[test]
    fn window_excludes_earlier_completion() {
        let alice = Uuid::new_v4();
        let records = vec![
            record(
                alice,
                "Alice",
                Uuid::new_v4(),
                "INCOMING Pallet 1",
                "high",
                "2024-01-01",
            ),
            record(
                alice,
                "Alice",
                Uuid::new_v4(),
                "INCOMING Pallet 2",
                "low",
                "2024-01-02",
            ),
        ];
        let window = Window {
            start: Some(at("2024-01-02")),
            end: Some(at("2024-01-03")),
        };

        let results = aggregate(&records, &window, None, &default_classifier());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].total_tasks, 1);
        assert_eq!(results[0].total_score, 1);
    }

    #[test]
    fn operator_without_eligible_work_is_omitted() {
        let alice = Uuid::new_v4();
        let records = vec![record(
            alice,
            "Alice",
            Uuid::new_v4(),
            "PICKING wave 3",
            "medium",
            "2024-01-01",
        )];
        let window = Window {
            start: Some(at("2024-02-01")),
            end: None,
        };
        assert!(aggregate(&records, &window, None, &default_classifier()).is_empty());
    }

    #[test]
    fn shared_shipment_counts_once_per_operator() {
        let shipment = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        // Duplicate (operator, shipment) rows simulate a multiplying join.
        let mut records = Vec::new();
        for (id, name) in [(a, "A"), (b, "B"), (c, "C")] {
            records.push(record(id, name, shipment, "OUTGOING truck 7", "high", "2024-03-01"));
            records.push(record(id, name, shipment, "OUTGOING truck 7", "high", "2024-03-01"));
        }

        let results = aggregate(&records, &Window::all_time(), None, &default_classifier());
        assert_eq!(results.len(), 3);
        for perf in &results {
            assert_eq!(perf.total_tasks, 1);
            assert_eq!(perf.total_score, 3);
        }
    }

    #[test]
    fn score_equals_weighted_tier_counts() {
        let op = Uuid::new_v4();
        let records = vec![
            record(op, "A", Uuid::new_v4(), "INCOMING 1", "high", "2024-01-01"),
            record(op, "A", Uuid::new_v4(), "INCOMING 2", "high", "2024-01-02"),
            record(op, "A", Uuid::new_v4(), "PICKING 1", "medium", "2024-01-03"),
            record(op, "A", Uuid::new_v4(), "OUTGOING 1", "low", "2024-01-04"),
        ];
        let results = aggregate(&records, &Window::all_time(), None, &default_classifier());
        let perf = &results[0];
        assert_eq!(
            perf.total_score,
            3 * perf.high_count + 2 * perf.medium_count + perf.low_count
        );
    }

    #[test]
    fn category_counts_partition_total_tasks() {
        let op = Uuid::new_v4();
        let records = vec![
            record(op, "A", Uuid::new_v4(), "INCOMING 1", "high", "2024-01-01"),
            record(op, "A", Uuid::new_v4(), "PICKING 1", "medium", "2024-01-02"),
            record(op, "A", Uuid::new_v4(), "mystery box", "low", "2024-01-03"),
        ];
        let results = aggregate(&records, &Window::all_time(), None, &default_classifier());
        let perf = &results[0];
        let category_sum: i64 = perf.categories.iter().map(|c| c.task_count).sum();
        assert_eq!(category_sum, perf.total_tasks);
    }

    #[test]
    fn ranks_are_a_gapless_permutation() {
        let records: Vec<AssignmentRecord> = (0..5)
            .flat_map(|i| {
                let op = Uuid::new_v4();
                (0..=i)
                    .map(move |_| {
                        record(
                            op,
                            "op",
                            Uuid::new_v4(),
                            "INCOMING x",
                            "medium",
                            "2024-01-01",
                        )
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        let results = aggregate(&records, &Window::all_time(), None, &default_classifier());
        let mut ranks: Vec<i64> = results.iter().map(|p| p.rank).collect();
        ranks.sort();
        assert_eq!(ranks, (1..=results.len() as i64).collect::<Vec<_>>());
    }

    #[test]
    fn tied_operators_get_distinct_sequential_ranks() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let records = vec![
            record(a, "Avery", Uuid::new_v4(), "INCOMING 1", "high", "2024-01-01"),
            record(b, "Blake", Uuid::new_v4(), "INCOMING 2", "high", "2024-01-01"),
        ];
        let results = aggregate(&records, &Window::all_time(), None, &default_classifier());
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[1].rank, 2);
    }

    #[test]
    fn aggregate_is_deterministic() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let shipment = Uuid::new_v4();
        let records = vec![
            record(a, "Avery", shipment, "INCOMING 1", "high", "2024-01-01"),
            record(b, "Blake", shipment, "INCOMING 1", "high", "2024-01-01"),
            record(a, "Avery", Uuid::new_v4(), "PICKING 9", "low", "2024-01-04"),
        ];
        let window = Window::all_time();
        let first = aggregate(&records, &window, None, &default_classifier());
        let second = aggregate(&records, &window, None, &default_classifier());
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn operator_filter_limits_result() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let records = vec![
            record(a, "Avery", Uuid::new_v4(), "INCOMING 1", "high", "2024-01-01"),
            record(b, "Blake", Uuid::new_v4(), "INCOMING 2", "high", "2024-01-01"),
        ];
        let results = aggregate(&records, &Window::all_time(), Some(a), &default_classifier());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].operator_id, a);
    }

    #[test]
    fn unknown_intensity_scores_zero_and_no_tier() {
        let op = Uuid::new_v4();
        let mut rec = record(op, "A", Uuid::new_v4(), "INCOMING 1", "high", "2024-01-01");
        rec.intensity = None;
        let results = aggregate(&[rec], &Window::all_time(), None, &default_classifier());
        let perf = &results[0];
        assert_eq!(perf.total_tasks, 1);
        assert_eq!(perf.total_score, 0);
        assert_eq!(perf.high_count + perf.medium_count + perf.low_count, 0);
    }

    #[test]
    fn category_breakdown_never_splits_on_delivery_flag() {
        let op = Uuid::new_v4();
        let mut first = record(op, "A", Uuid::new_v4(), "INCOMING 1", "high", "2024-01-01");
        first.is_delivery = true;
        let second = record(op, "A", Uuid::new_v4(), "INCOMING 2", "low", "2024-01-02");

        let results = aggregate(
            &[first, second],
            &Window::all_time(),
            None,
            &default_classifier(),
        );
        let perf = &results[0];
        assert_eq!(perf.categories.len(), 1);
        assert_eq!(perf.categories[0].task_count, 2);
        assert!(perf.categories[0].has_delivery);
    }

    #[test]
    fn category_statistics_counts_distinct_shipments() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let shared = Uuid::new_v4();
        let records = vec![
            record(a, "Avery", shared, "INCOMING big", "high", "2024-01-01"),
            record(b, "Blake", shared, "INCOMING big", "high", "2024-01-01"),
            record(a, "Avery", Uuid::new_v4(), "INCOMING small", "low", "2024-01-02"),
        ];

        let stats = category_statistics(&records, &default_classifier());
        assert_eq!(stats.len(), 1);
        let incoming = &stats[0];
        assert_eq!(incoming.category, "INCOMING");
        assert_eq!(incoming.total_tasks, 2);
        assert_eq!(incoming.total_score, 4);
        assert_eq!(incoming.operator_count, 2);
        assert_eq!(incoming.avg_tasks_per_operator, 1.5);
        assert_eq!(incoming.avg_score_per_task, 2.0);
    }

    #[test]
    fn missing_categories_flags_gaps() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let operators = vec![operator(a, "Avery", true), operator(b, "Blake", true)];
        let categories = vec![
            category("INCOMING", true, 10),
            category("OUTGOING", true, 20),
        ];
        let classifier = Classifier::new(&categories);
        let records = vec![
            record(a, "Avery", Uuid::new_v4(), "INCOMING 1", "high", "2024-01-01"),
            record(a, "Avery", Uuid::new_v4(), "OUTGOING 1", "low", "2024-01-02"),
            record(b, "Blake", Uuid::new_v4(), "INCOMING 2", "low", "2024-01-03"),
        ];

        let reports = missing_categories(&records, &operators, &categories, &classifier);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].operator_name, "Blake");
        assert_eq!(reports[0].missing, vec!["OUTGOING".to_string()]);
        assert_eq!(reports[0].completed, vec!["INCOMING".to_string()]);
    }

    #[test]
    fn deactivated_category_leaves_required_set() {
        let a = Uuid::new_v4();
        let operators = vec![operator(a, "Avery", true)];
        let categories = vec![
            category("INCOMING", false, 10),
            category("OUTGOING", true, 20),
        ];
        let classifier = Classifier::new(&categories);
        let records = vec![record(
            a,
            "Avery",
            Uuid::new_v4(),
            "OUTGOING dock 1",
            "medium",
            "2024-01-01",
        )];

        // OUTGOING done, INCOMING no longer required: no gaps reported.
        assert!(missing_categories(&records, &operators, &categories, &classifier).is_empty());
    }

    #[test]
    fn inactive_operator_not_reported() {
        let a = Uuid::new_v4();
        let operators = vec![operator(a, "Avery", false)];
        let categories = vec![category("INCOMING", true, 10)];
        let classifier = Classifier::new(&categories);

        assert!(missing_categories(&[], &operators, &categories, &classifier).is_empty());
    }

    #[test]
    fn operator_with_no_history_misses_everything() {
        let a = Uuid::new_v4();
        let operators = vec![operator(a, "Avery", true)];
        let categories = vec![
            category("INCOMING", true, 10),
            category("OUTGOING", true, 20),
        ];
        let classifier = Classifier::new(&categories);

        let reports = missing_categories(&[], &operators, &categories, &classifier);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].missing.len(), 2);
        assert!(reports[0].completed.is_empty());
    }
}
