// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Garsync CLI
//!
//! Selective Garmin-to-Strava sync: authorize once with `setup`, then run
//! the sync service with `run`, and inspect state with `status`/`history`.

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use garsync::config::Config;
use garsync::db::Database;
use garsync::models::ActivityStatus;
use garsync::services::gear::{apply_gear_rules, parse_gear_rules};
use garsync::services::{GarminClient, StravaClient, SyncEngine, TokenManager};

#[derive(Parser)]
#[command(name = "garsync", about = "Selective Garmin-to-Strava activity sync", version)]
struct Cli {
    /// Log level (debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the Garmin session and authorize with Strava
    Setup {
        /// Authorization code from the Strava redirect URL
        #[arg(long)]
        code: Option<String>,
    },
    /// Run the sync service
    Run {
        /// Run once and exit (no scheduler)
        #[arg(long)]
        once: bool,
    },
    /// Show sync status and statistics
    Status,
    /// Show recent activity history
    History {
        /// Number of activities to show
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Clear a failed activity record so the next run re-attempts it
    Retry {
        /// Garmin activity ID
        activity_id: String,
    },
    /// Assign gear on recent Strava activities based on configured rules
    Gear,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = Config::from_env();

    match cli.command {
        Commands::Setup { code } => cmd_setup(config, code.as_deref()).await?,
        Commands::Run { once } => cmd_run(config, once).await?,
        Commands::Status => cmd_status(config).await?,
        Commands::History { limit } => cmd_history(config, limit).await?,
        Commands::Retry { activity_id } => cmd_retry(config, &activity_id).await?,
        Commands::Gear => cmd_gear(config).await?,
    }

    Ok(())
}

/// Initialize tracing with an env-filter on top of the CLI log level.
fn init_logging(level: &str) {
    let directive = format!("garsync={level}")
        .parse()
        .unwrap_or_else(|_| "garsync=info".parse().expect("valid directive"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(directive)
                .add_directive("warn".parse().expect("valid directive")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Validate config, printing errors and exiting if it is unusable.
fn require_valid_config(config: &Config) {
    let errors = config.validate();
    if !errors.is_empty() {
        eprintln!("Configuration errors:");
        for error in &errors {
            eprintln!("  - {error}");
        }
        eprintln!("\nSet STRAVA_CLIENT_ID and STRAVA_CLIENT_SECRET environment variables.");
        std::process::exit(1);
    }
}

async fn cmd_setup(config: Config, code: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    require_valid_config(&config);

    let db = Database::connect(&config.db_path).await?;
    println!("Database: {}", config.db_path.display());

    // Garmin: we only resume saved sessions, never log in interactively.
    println!("\n=== Garmin Connect ===");
    let garmin = GarminClient::new(config.garmin_session_dir.clone());
    match garmin.verify_session().await {
        Ok(true) => println!("Garmin: session valid"),
        Ok(false) => println!(
            "Garmin: saved session is no longer valid.\n\
             Re-authenticate with garth into {}",
            config.garmin_session_dir.display()
        ),
        Err(e) => println!(
            "Garmin: {e}\n\
             Authenticate with garth into {} and re-run setup.",
            config.garmin_session_dir.display()
        ),
    }

    // Strava
    println!("\n=== Strava ===");
    let client = StravaClient::new(
        config.strava_client_id.clone(),
        config.strava_client_secret.clone(),
    );
    let tokens = TokenManager::new(db.clone(), client.clone());

    let existing = db.get_strava_token().await?;
    if existing.is_some_and(|t| !t.expires_within(5 * 60)) {
        println!("Strava: already authenticated (token valid)");
    } else if let Some(code) = code {
        let token = tokens.authorize_with_code(code).await?;
        println!(
            "Strava: authentication successful! (athlete_id: {})",
            token.athlete_id.map_or_else(|| "unknown".to_string(), |id| id.to_string())
        );
    } else {
        println!("Strava: authorization needed. Visit:\n");
        println!("  {}\n", client.authorization_url("http://localhost:8000/callback"));
        println!(
            "After approving, copy the 'code' parameter from the redirect URL\n\
             and re-run: garsync setup --code <code>"
        );
        return Ok(());
    }

    println!("\n=== Setup Complete ===");
    println!("You can now run 'garsync run' to start syncing.");
    Ok(())
}

async fn cmd_run(config: Config, once: bool) -> Result<(), Box<dyn std::error::Error>> {
    require_valid_config(&config);

    let engine = SyncEngine::create(config).await?;

    if once {
        println!("Running single sync cycle...");
        let outcome = engine.run_once().await?;
        print_run_summary(&outcome.run);
        if outcome.run.error.is_some() {
            std::process::exit(1);
        }
    } else {
        println!("Starting sync service (schedule: :00, :15, :30, :45)");
        println!("Press Ctrl+C to stop");
        engine.run_forever().await?;
    }

    Ok(())
}

async fn cmd_status(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::connect(&config.db_path).await?;

    println!("=== Garsync Status ===\n");
    println!("Database: {}", config.db_path.display());
    println!("Blocked types: {}", config.blocked_activity_types.join(", "));
    println!("Schedule: quarter-hour (:00, :15, :30, :45)");

    let totals = db.stats().await?;
    println!("\n--- Activity Statistics ---");
    println!("Total sync runs: {}", totals.total_runs);
    println!("Transferred: {}", totals.transferred);
    println!("Skipped: {}", totals.skipped);
    println!("Failed: {}", totals.failed);
    println!("Duplicates: {}", totals.duplicate);

    if let Some(run) = db.last_sync_run().await? {
        println!("\n--- Last Sync Run ---");
        println!("Started: {}", run.started_at);
        println!(
            "Completed: {}",
            run.completed_at
                .map_or_else(|| "In progress".to_string(), |t| t.to_string())
        );
        println!("Checked: {}", run.activities_checked);
        println!("Transferred: {}", run.activities_transferred);
        println!("Skipped: {}", run.activities_skipped);
        println!("Failed: {}", run.activities_failed);
        if let Some(error) = &run.error {
            println!("Error: {error}");
        }
    }

    let failed = db.failed_activities().await?;
    if !failed.is_empty() {
        println!("\n--- Failed Activities ({}) ---", failed.len());
        for activity in failed.iter().take(5) {
            println!(
                "  {}: {}",
                activity.garmin_activity_id,
                activity.error_message.as_deref().unwrap_or("unknown error")
            );
        }
        if failed.len() > 5 {
            println!("  ... and {} more", failed.len() - 5);
        }
    }

    Ok(())
}

async fn cmd_history(config: Config, limit: u32) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::connect(&config.db_path).await?;
    let activities = db.recent_activities(limit).await?;

    if activities.is_empty() {
        println!("No activities processed yet.");
        return Ok(());
    }

    println!("=== Recent Activities (last {}) ===\n", activities.len());

    for activity in &activities {
        let status_icon = match activity.status {
            ActivityStatus::Transferred => "✓",
            ActivityStatus::Skipped => "○",
            ActivityStatus::Failed => "✗",
            ActivityStatus::Duplicate => "=",
        };

        let name = if activity.activity_name.is_empty() {
            "Unnamed"
        } else {
            activity.activity_name.as_str()
        };
        println!(
            "{status_icon} [{:11}] {} ({}) - {}",
            activity.status.as_str(),
            activity.garmin_activity_id,
            activity.activity_type,
            name
        );

        match activity.status {
            ActivityStatus::Skipped => {
                if let Some(reason) = &activity.skip_reason {
                    println!("    Reason: {reason}");
                }
            }
            ActivityStatus::Failed => {
                if let Some(error) = &activity.error_message {
                    println!("    Error: {error}");
                }
            }
            _ => {
                if let Some(strava_id) = &activity.strava_activity_id {
                    println!("    Strava ID: {strava_id}");
                }
            }
        }
    }

    Ok(())
}

async fn cmd_retry(config: Config, activity_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::connect(&config.db_path).await?;

    if db.delete_failed_activity(activity_id).await? {
        println!("Cleared failed record for activity {activity_id}; the next run will re-attempt it.");
    } else {
        eprintln!("No failed record found for activity {activity_id}.");
        std::process::exit(1);
    }

    Ok(())
}

async fn cmd_gear(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    require_valid_config(&config);

    let rules = parse_gear_rules(&config.gear_rules);
    if rules.is_empty() {
        println!("No gear rules configured. Set GARSYNC_GEAR_RULES (e.g. trainer:b3513943).");
        return Ok(());
    }

    let db = Database::connect(&config.db_path).await?;
    let client = StravaClient::new(
        config.strava_client_id.clone(),
        config.strava_client_secret.clone(),
    );
    let tokens = TokenManager::new(db, client.clone());
    let token = tokens.ensure_valid_token().await?;

    let after = (Utc::now() - chrono::Duration::days(30)).timestamp();
    let result = apply_gear_rules(&client, &token.access_token, &rules, after, 50).await;

    println!(
        "Gear pass complete: checked={}, updated={}, already_correct={}, errors={}",
        result.checked, result.updated, result.already_correct, result.errors
    );

    Ok(())
}

/// Print summary of a sync run.
fn print_run_summary(run: &garsync::models::SyncRun) {
    println!(
        "Run complete: checked={}, transferred={}, skipped={}, failed={}",
        run.activities_checked,
        run.activities_transferred,
        run.activities_skipped,
        run.activities_failed
    );
    if let Some(error) = &run.error {
        eprintln!("Error: {error}");
    }
}
