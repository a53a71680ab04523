use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod analytics;
mod db;
mod models;
mod report;

use models::Metrics;

#[derive(Parser)]
#[command(name = "lead-pipeline")]
#[command(about = "Lead pipeline analytics for the Taskive studio CRM", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import leads from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Compute pipeline metrics and print a summary
    #[command(group(
        ArgGroup::new("scope")
            .args(["industry", "country"])
            .multiple(false)
    ))]
    Metrics {
        #[arg(long)]
        industry: Option<String>,
        #[arg(long)]
        country: Option<String>,
        /// Print the full metrics structure as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    #[command(group(
        ArgGroup::new("scope")
            .args(["industry", "country"])
            .multiple(false)
    ))]
    Report {
        #[arg(long)]
        industry: Option<String>,
        #[arg(long)]
        country: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

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
            println!("Inserted {inserted} leads from {}.", csv.display());
        }
        Commands::Metrics {
            industry,
            country,
            json,
        } => {
            let metrics =
                compute_scoped_metrics(&pool, industry.as_deref(), country.as_deref()).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&metrics)?);
                return Ok(());
            }

            print_summary(
                scope_label(industry.as_deref(), country.as_deref()),
                &metrics,
            );
        }
        Commands::Report {
            industry,
            country,
            out,
        } => {
            let metrics =
                compute_scoped_metrics(&pool, industry.as_deref(), country.as_deref()).await?;
            let report = report::build_report(
                scope_label(industry.as_deref(), country.as_deref()).as_deref(),
                &metrics,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn compute_scoped_metrics(
    pool: &PgPool,
    industry: Option<&str>,
    country: Option<&str>,
) -> anyhow::Result<Metrics> {
    let leads = db::fetch_leads(pool, industry, country).await?;
    let financials = db::fetch_financials(pool, industry, country).await?;
    let history = db::fetch_history(pool, industry, country).await?;
    Ok(analytics::compute_metrics(&leads, &financials, &history))
}

fn scope_label(industry: Option<&str>, country: Option<&str>) -> Option<String> {
    industry
        .map(|value| format!("industry {value}"))
        .or_else(|| country.map(|value| format!("country {value}")))
}

fn print_summary(scope: Option<String>, metrics: &Metrics) {
    match scope {
        Some(scope) => println!("Pipeline summary for {scope}:"),
        None => println!("Pipeline summary:"),
    }
    println!("- {} consultations on record", metrics.total_consultations);

    for stage in &metrics.conversion_funnel {
        println!(
            "- {}: {} leads ({}%)",
            stage.status, stage.count, stage.percentage
        );
    }

    let revenue = &metrics.revenue;
    println!(
        "- Revenue: signed {:.2}, paid {:.2}, outstanding {:.2}",
        revenue.total_signed, revenue.total_paid, revenue.total_outstanding
    );
    println!(
        "- Average deal size {} at a {}% win rate",
        revenue.average_deal_size, revenue.win_rate
    );

    if let Some(latest) = metrics.leads_trend.last() {
        println!(
            "- Latest intake month {}: {} new, {} converted",
            latest.month, latest.new_leads, latest.converted
        );
    }
}
