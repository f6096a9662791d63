mod capacity;
mod catalog;
mod config;
mod domain;
mod error;
mod fatigue;
mod formulas;
mod leaderboard;
mod ranking;
mod records;
mod scoring;
mod server;
mod session;
mod sync;
mod watcher;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;

use crate::capacity::{JsonFileStore, MemoryRecordStore, RecordStore};
use crate::catalog::ExerciseCatalog;
use crate::config::EngineSettings;
use crate::domain::UserProfile;
use crate::ranking::{MemoryRankingStore, RankingStore, RestRankingStore};
use crate::server::AppState;
use crate::session::TrainingSession;
use crate::watcher::{DEFAULT_DEBOUNCE, watch_settings};

/// Strength training engine: muscle fatigue, personal records and rankings.
#[derive(Parser, Debug)]
#[command(name = "liftmodel")]
#[command(about = "Muscle fatigue tracking, 1RM estimation and strength leaderboards")]
#[command(version)]
struct Args {
    /// Path to the user's record file.
    #[arg(long, value_name = "FILE", env = "LIFTMODEL_DATA", default_value = "liftmodel.json")]
    data: PathBuf,

    /// Path to the settings file. Watched for changes while running.
    #[arg(
        long,
        value_name = "FILE",
        env = "LIFTMODEL_SETTINGS",
        default_value = "liftmodel-settings.json"
    )]
    settings: PathBuf,

    /// Port number for the web server.
    #[arg(long, value_name = "PORT", env = "LIFTMODEL_PORT", default_value = "8080")]
    port: u16,

    /// Identity of the local user in the shared ranking.
    #[arg(long, env = "LIFTMODEL_USER_ID", default_value = "local")]
    user_id: String,

    /// Display name shown on leaderboards.
    #[arg(long, env = "LIFTMODEL_USERNAME", default_value = "lifter")]
    username: String,

    /// Base URL of the shared ranking store. Rankings stay local if unset.
    #[arg(long, env = "LIFTMODEL_RANKING_URL")]
    ranking_url: Option<String>,

    /// API key for the shared ranking store.
    #[arg(long, env = "LIFTMODEL_RANKING_KEY", hide_env_values = true)]
    ranking_key: Option<String>,

    /// Keep the record in memory only; nothing is written to disk.
    #[arg(long, env = "LIFTMODEL_IN_MEMORY")]
    in_memory: bool,

    /// Directory of frontend files to serve.
    #[arg(long, value_name = "DIR", env = "LIFTMODEL_STATIC")]
    static_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let settings = EngineSettings::load(&args.settings)
        .with_context(|| format!("Failed to load settings from {}", args.settings.display()))?;

    let ranking: Arc<dyn RankingStore> = match &args.ranking_url {
        Some(url) => Arc::new(
            RestRankingStore::new(url, args.ranking_key.clone())
                .context("Failed to create ranking store client")?,
        ),
        None => {
            log::warn!("No ranking URL configured, leaderboard is local only");
            Arc::new(MemoryRankingStore::new())
        }
    };

    let catalog = ExerciseCatalog::builtin();
    let profile = UserProfile {
        user_id: args.user_id.clone(),
        username: args.username.clone(),
        ..UserProfile::default()
    };
    let backend: Arc<dyn RecordStore> = if args.in_memory {
        log::warn!("Running with an in-memory record, nothing will be saved");
        Arc::new(MemoryRecordStore::new())
    } else {
        Arc::new(JsonFileStore::new(&args.data))
    };
    let session = Arc::new(
        TrainingSession::open(
            backend,
            ranking,
            catalog.clone(),
            profile,
            &settings,
        )
        .await
        .with_context(|| format!("Failed to open record {}", args.data.display()))?,
    );

    println!("Record file: {}", args.data.display());
    println!("Settings: {}", args.settings.display());
    print_summary(&session).await;

    // Catch up on recovery since the last run, then keep it current.
    if let Err(e) = session.on_focus(Utc::now()).await {
        log::warn!("Startup recovery failed: {}", e);
    }
    session.start_recovery_ticker(settings.recovery_interval());

    let watcher_session = session.clone();
    let settings_path = args.settings.clone();
    tokio::spawn(async move {
        let result = watch_settings(&settings_path, DEFAULT_DEBOUNCE, move |settings| {
            let session = watcher_session.clone();
            async move { session.apply_tuning(settings.tuning).await }
        })
        .await;
        if let Err(e) = result {
            log::error!("Settings watcher error: {}", e);
        }
    });

    let static_dir = args.static_dir.clone().or_else(find_static_dir);
    if let Some(dir) = &static_dir {
        println!("Static files: {}", dir.display());
    }

    let state = Arc::new(AppState {
        session: session.clone(),
        catalog,
    });
    server::run_server(state, args.port, static_dir, shutdown_signal()).await?;

    session.shutdown().await;
    log::info!("Shut down cleanly");
    Ok(())
}

async fn print_summary(session: &TrainingSession) {
    let profile = session.profile().await;
    let score = session.score().await;

    println!();
    println!("=== {} ({}) ===", profile.username, profile.user_id);
    println!("Total: {:.0} lbs", score.total_score);
    println!(
        "  Bench {:.0} / Squat {:.0} / Deadlift {:.0}",
        score.bench_press_pr, score.squat_pr, score.deadlift_pr
    );
    match score.wilks_score {
        Some(wilks) => println!("Wilks: {:.2}", wilks),
        None => println!("Wilks: set bodyweight and gender to compute"),
    }
    println!();
}

/// Finds a `static` directory next to the working directory or executable.
fn find_static_dir() -> Option<PathBuf> {
    let cwd_static = PathBuf::from("static");
    if cwd_static.is_dir() {
        return Some(cwd_static);
    }

    let exe_path = std::env::current_exe().ok()?;
    let exe_static = exe_path.parent()?.join("static");
    exe_static.is_dir().then_some(exe_static)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested");
}
