use std::fmt::Write;

use crate::models::{CategoryStat, MissingCategoryReport, OperatorPerformance};
use crate::perf::Window;

fn window_label(window: &Window) -> String {
    match (window.start, window.end) {
        (Some(start), Some(end)) => format!("{} to {}", start.date_naive(), end.date_naive()),
        (Some(start), None) => format!("since {}", start.date_naive()),
        (None, Some(end)) => format!("through {}", end.date_naive()),
        (None, None) => "all time".to_string(),
    }
}

pub fn build_report(
    window: &Window,
    performances: &[OperatorPerformance],
    stats: &[CategoryStat],
    gaps: &[MissingCategoryReport],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Operator Performance Report");
    let _ = writeln!(output, "Window: {}", window_label(window));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Operator Ranking");

    if performances.is_empty() {
        let _ = writeln!(output, "No completed shipments in this window.");
    } else {
        for perf in performances {
            let _ = writeln!(
                output,
                "{}. {} — {} tasks, score {} (avg {:.2}), {} active days",
                perf.rank,
                perf.operator_name,
                perf.total_tasks,
                perf.total_score,
                perf.avg_score_per_task,
                perf.active_days
            );
            for breakdown in &perf.categories {
                let _ = writeln!(
                    output,
                    "   - {}: {} tasks, score {}{}",
                    breakdown.category,
                    breakdown.task_count,
                    breakdown.category_score,
                    if breakdown.has_delivery {
                        " (incl. deliveries)"
                    } else {
                        ""
                    }
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Category Mix");

    if stats.is_empty() {
        let _ = writeln!(output, "No category activity in this window.");
    } else {
        for stat in stats {
            let _ = writeln!(
                output,
                "- {}: {} tasks, score {}, {} operators (avg {:.2} tasks/operator)",
                stat.category,
                stat.total_tasks,
                stat.total_score,
                stat.operator_count,
                stat.avg_tasks_per_operator
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Workload Gaps");

    if gaps.is_empty() {
        let _ = writeln!(output, "Every active operator has covered every active category.");
    } else {
        for gap in gaps {
            let _ = writeln!(
                output,
                "- {} is missing {} ({} covered)",
                gap.operator_name,
                gap.missing.join(", "),
                if gap.completed.is_empty() {
                    "none".to_string()
                } else {
                    gap.completed.join(", ")
                }
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    fn at(raw: &str) -> DateTime<Utc> {
        raw.parse().unwrap()
    }

    #[test]
    fn report_lists_ranked_operators_and_gaps() {
        let performances = vec![OperatorPerformance {
            operator_id: Uuid::new_v4(),
            operator_name: "Alice Chen".to_string(),
            total_tasks: 2,
            total_score: 4,
            high_count: 1,
            medium_count: 0,
            low_count: 1,
            active_days: 2,
            first_completion: at("2024-01-01T08:00:00Z"),
            last_completion: at("2024-01-02T08:00:00Z"),
            avg_score_per_task: 2.0,
            rank: 1,
            categories: vec![],
        }];
        let gaps = vec![MissingCategoryReport {
            operator_name: "Marcus Webb".to_string(),
            missing: vec!["PICKING".to_string()],
            completed: vec!["INCOMING".to_string()],
        }];

        let report = build_report(&Window::all_time(), &performances, &[], &gaps);
        assert!(report.contains("Window: all time"));
        assert!(report.contains("1. Alice Chen — 2 tasks, score 4"));
        assert!(report.contains("Marcus Webb is missing PICKING"));
    }

    #[test]
    fn empty_window_report_says_so() {
        let window = Window {
            start: Some(at("2024-01-02T00:00:00Z")),
            end: None,
        };
        let report = build_report(&window, &[], &[], &[]);
        assert!(report.contains("since 2024-01-02"));
        assert!(report.contains("No completed shipments in this window."));
    }
}
