use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

mod assign;
mod auth;
mod classify;
mod db;
mod error;
mod models;
mod perf;
mod report;

use classify::Classifier;
use perf::Window;

#[derive(Parser)]
#[command(name = "operator-kpi")]
#[command(about = "Operator performance tracking for the warehouse shipment console", long_about = None)]
struct Cli {
    /// Email of the calling user (falls back to KPI_USER)
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import shipments from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Mark a shipment completed and refresh the summary cache
    Complete {
        #[arg(long)]
        shipment: Uuid,
    },
    /// Rank operators by score, optionally windowed or filtered
    Performance {
        #[arg(long)]
        operator: Option<String>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Per-category totals across all operators
    CategoryStats {
        #[arg(long)]
        json: bool,
    },
    /// Active operators missing active categories
    Balance,
    /// Recompute the cached all-time performance summary
    Refresh,
    /// Show the cached all-time performance summary
    Summary,
    /// Manage task categories
    Category {
        #[command(subcommand)]
        command: CategoryCommands,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum CategoryCommands {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "#888888")]
        color: String,
        #[arg(long, default_value_t = 100)]
        sort_order: i32,
    },
    List,
    Deactivate {
        #[arg(long)]
        name: String,
    },
    Delete {
        #[arg(long)]
        name: String,
    },
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

// Bounds are inclusive, so the end of a day is its last second.
fn window_from(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Window {
    Window {
        start: start.map(day_start),
        end: end.map(|d| day_start(d) + Duration::seconds(86_399)),
    }
}

fn caller_email(user: Option<String>) -> anyhow::Result<String> {
    user.or_else(|| std::env::var("KPI_USER").ok())
        .context("identify the caller with --user or the KPI_USER environment variable")
}

async fn authorize_viewer(pool: &PgPool, user: Option<String>) -> anyhow::Result<auth::KpiViewer> {
    let email = caller_email(user)?;
    let record = db::fetch_app_user(pool, &email).await?;
    Ok(auth::authorize(record, &email)?)
}

async fn authorize_admin(pool: &PgPool, user: Option<String>) -> anyhow::Result<auth::Admin> {
    let email = caller_email(user)?;
    let record = db::fetch_app_user(pool, &email).await?;
    Ok(auth::authorize_admin(record, &email)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} shipments from {}.", csv.display());
        }
        Commands::Complete { shipment } => {
            if db::complete_shipment(&pool, shipment).await? {
                println!("Shipment {shipment} completed; summary refreshed.");
            } else {
                println!("Shipment {shipment} was not updated (already completed, archived, or unknown).");
            }
        }
        Commands::Performance {
            operator,
            start,
            end,
            limit,
            json,
        } => {
            authorize_viewer(&pool, cli.user).await?;
            let window = window_from(start, end);
            let operator_filter = match operator {
                Some(name) => Some(
                    db::operator_id_by_name(&pool, &name)
                        .await?
                        .with_context(|| format!("no operator named {name}"))?,
                ),
                None => None,
            };

            let categories = db::fetch_categories(&pool).await?;
            let classifier = Classifier::new(&categories);
            let records = db::fetch_completed_assignments(&pool, &window).await?;
            let results = perf::aggregate(&records, &window, operator_filter, &classifier);

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
                return Ok(());
            }

            if results.is_empty() {
                println!("No completed shipments for this window.");
                return Ok(());
            }

            println!("Operator ranking:");
            for perf in results.iter().take(limit) {
                println!(
                    "{}. {} — {} tasks, score {} (avg {:.2}), H/M/L {}/{}/{}, {} active days",
                    perf.rank,
                    perf.operator_name,
                    perf.total_tasks,
                    perf.total_score,
                    perf.avg_score_per_task,
                    perf.high_count,
                    perf.medium_count,
                    perf.low_count,
                    perf.active_days
                );
                for breakdown in &perf.categories {
                    println!(
                        "   - {}: {} tasks, score {} (avg {:.2})",
                        breakdown.category,
                        breakdown.task_count,
                        breakdown.category_score,
                        breakdown.avg_score_per_task
                    );
                }
            }
        }
        Commands::CategoryStats { json } => {
            authorize_viewer(&pool, cli.user).await?;
            let categories = db::fetch_categories(&pool).await?;
            let classifier = Classifier::new(&categories);
            let records = db::fetch_completed_assignments(&pool, &Window::all_time()).await?;
            let stats = perf::category_statistics(&records, &classifier);

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
                return Ok(());
            }

            if stats.is_empty() {
                println!("No completed shipments yet.");
                return Ok(());
            }

            for stat in &stats {
                println!(
                    "- {}: {} tasks, score {}, {} operators, avg {:.2} tasks/operator, avg {:.2} score/task",
                    stat.category,
                    stat.total_tasks,
                    stat.total_score,
                    stat.operator_count,
                    stat.avg_tasks_per_operator,
                    stat.avg_score_per_task
                );
            }
        }
        Commands::Balance => {
            authorize_viewer(&pool, cli.user).await?;
            let categories = db::fetch_categories(&pool).await?;
            let classifier = Classifier::new(&categories);
            let operators = db::fetch_operators(&pool).await?;
            let records = db::fetch_completed_assignments(&pool, &Window::all_time()).await?;
            let reports = perf::missing_categories(&records, &operators, &categories, &classifier);

            if reports.is_empty() {
                println!("Every active operator has covered every active category.");
                return Ok(());
            }

            for gap in &reports {
                println!(
                    "- {} is missing {} categories: {}",
                    gap.operator_name,
                    gap.missing.len(),
                    gap.missing.join(", ")
                );
            }
        }
        Commands::Refresh => {
            authorize_viewer(&pool, cli.user).await?;
            let operators = db::refresh_performance_summary(&pool).await?;
            println!("Summary refreshed for {operators} operators.");
        }
        Commands::Summary => {
            authorize_viewer(&pool, cli.user).await?;
            let rows = db::fetch_summary(&pool).await?;
            if rows.is_empty() {
                println!("Summary cache is empty; run refresh first.");
                return Ok(());
            }
            for row in &rows {
                println!(
                    "{}. {} — {} tasks, score {}, H/M/L {}/{}/{}, {} active days (as of {})",
                    row.rank,
                    row.operator_name,
                    row.total_tasks,
                    row.total_score,
                    row.high_count,
                    row.medium_count,
                    row.low_count,
                    row.active_days,
                    row.refreshed_at
                );
            }
        }
        Commands::Category { command } => {
            authorize_admin(&pool, cli.user).await?;
            match command {
                CategoryCommands::Add {
                    name,
                    color,
                    sort_order,
                } => {
                    db::add_category(&pool, &name, &color, sort_order).await?;
                    println!("Category {name} saved.");
                }
                CategoryCommands::List => {
                    for category in db::fetch_categories(&pool).await? {
                        println!(
                            "- {} (sort {}, {})",
                            category.name,
                            category.sort_order,
                            if category.active { "active" } else { "inactive" }
                        );
                    }
                }
                CategoryCommands::Deactivate { name } => {
                    if db::deactivate_category(&pool, &name).await? {
                        println!("Category {name} deactivated.");
                    } else {
                        println!("No category named {name}.");
                    }
                }
                CategoryCommands::Delete { name } => {
                    db::delete_category(&pool, &name).await?;
                    println!("Category {name} deleted.");
                }
            }
        }
        Commands::Report { start, end, out } => {
            authorize_viewer(&pool, cli.user).await?;
            let window = window_from(start, end);
            let categories = db::fetch_categories(&pool).await?;
            let classifier = Classifier::new(&categories);
            let operators = db::fetch_operators(&pool).await?;

            let windowed = db::fetch_completed_assignments(&pool, &window).await?;
            let all_time = db::fetch_completed_assignments(&pool, &Window::all_time()).await?;

            let performances = perf::aggregate(&windowed, &window, None, &classifier);
            let stats = perf::category_statistics(&windowed, &classifier);
            let gaps = perf::missing_categories(&all_time, &operators, &categories, &classifier);

            let report = report::build_report(&window, &performances, &stats, &gaps);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
