use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Africa::Casablanca;
use tracing::info;
use tracing_subscriber::prelude::*;

use vaccibot::config::Config;
use vaccibot::db::Database;
use vaccibot::language::Language;
use vaccibot::pipeline::broadcast::{BroadcastClient, MessageStyle};
use vaccibot::pipeline::coverage::{self, CoverageQuery};
use vaccibot::pipeline::reminders::ReminderPipeline;
use vaccibot::schedule;
use vaccibot::scheduler;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args.get(1).map(String::as_str).unwrap_or("vaccibot.json");
    let config = match Config::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("vaccibot.log"))
        .expect("Failed to open log file");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("Starting vaccibot (config: {config_path})");

    std::fs::create_dir_all(&config.data_dir).ok();
    let db = Arc::new(Database::load_or_new(&config.database_path));
    schedule::seed_reference(&db);

    let command = args.get(2).map(String::as_str).unwrap_or("serve");
    match command {
        "remind" => {
            let pipeline = ReminderPipeline::new(Arc::clone(&db), &config);
            let today = Utc::now().with_timezone(&Casablanca).date_naive();
            let outcomes = pipeline.run(today).await;
            println!("Processed {} reminder(s)", outcomes.len());
        }
        "remind-child" => {
            let Some(child_id) = args.get(3).and_then(|s| s.parse::<i64>().ok()) else {
                eprintln!("Usage: vaccibot <config> remind-child <child_id>");
                std::process::exit(2);
            };
            let pipeline = ReminderPipeline::new(Arc::clone(&db), &config);
            let today = Utc::now().with_timezone(&Casablanca).date_naive();
            let outcomes = pipeline.run_for_child(child_id, today).await;
            println!("Processed {} reminder(s) for child {child_id}", outcomes.len());
        }
        "coverage" => {
            let vaccine = expect_vaccine(&db, args.get(3));
            let query = CoverageQuery { use_cache: true, ..Default::default() };
            let report = coverage::coverage(&db, &vaccine, &query);
            print_json(&report);
        }
        "supply" => {
            let vaccine = expect_vaccine(&db, args.get(3));
            let report = coverage::supply(&db, &vaccine);
            print_json(&report);
        }
        "refresh-coverage" => {
            let refreshed = scheduler::refresh_coverage_cache(&db);
            println!("Refreshed {refreshed} coverage snapshot(s)");
        }
        "broadcast" | "broadcast-preview" => {
            let vaccine = expect_vaccine(&db, args.get(3));
            let style = args
                .get(4)
                .and_then(|s| MessageStyle::parse(s))
                .unwrap_or(MessageStyle::Summary);
            let language = Language::parse(args.get(5).map(String::as_str));

            let Some(ref token) = config.telegram_bot_token else {
                eprintln!("telegram_bot_token is not configured");
                std::process::exit(2);
            };
            let client = BroadcastClient::new(token, config.broadcast_delay_ms);
            let report = coverage::coverage(&db, &vaccine, &CoverageQuery::default());

            if command == "broadcast-preview" {
                for preview in client.preview(&db, &vaccine, style, language, &report.regions) {
                    let marker = if preview.sendable { "->" } else { "--" };
                    println!("{marker} [{}] {}\n{}\n", preview.region_id, preview.region_name, preview.text);
                }
            } else {
                let results = client.broadcast(&db, &vaccine, style, language, &report.regions).await;
                for result in &results {
                    match (&result.sent, &result.detail) {
                        (true, _) => println!("sent     {}", result.region_name),
                        (false, Some(reason)) => println!("skipped  {} ({reason})", result.region_name),
                        (false, None) => println!("skipped  {}", result.region_name),
                    }
                }
            }
        }
        "serve" => {
            let pipeline = Arc::new(ReminderPipeline::new(Arc::clone(&db), &config));
            info!("Running background jobs (scan every {} min)", config.scan_interval_minutes);
            scheduler::run(db, pipeline, config.scan_interval_minutes).await;
        }
        other => {
            eprintln!("Unknown command '{other}'");
            eprintln!("Commands: remind | remind-child <id> | coverage <vaccine> | supply <vaccine> | refresh-coverage | broadcast <vaccine> [style] [lang] | broadcast-preview <vaccine> [style] [lang] | serve");
            std::process::exit(2);
        }
    }
}

fn expect_vaccine(db: &Database, arg: Option<&String>) -> String {
    let Some(vaccine) = arg else {
        eprintln!("Missing vaccine name");
        std::process::exit(2);
    };
    if !db.vaccine_exists(vaccine) {
        eprintln!("Unknown vaccine '{vaccine}'. Known: {}", db.distinct_vaccines().join(", "));
        std::process::exit(2);
    }
    vaccine.clone()
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to render report: {e}"),
    }
}
