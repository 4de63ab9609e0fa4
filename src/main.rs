use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;

use legacy_prefs_lib::config::{resolve_state_dir, MigrationConfig};
use legacy_prefs_lib::policy::{JsonPolicySource, PolicySource};
use legacy_prefs_lib::{
    AppError, FileStateStore, JsonProfileSink, MigrationError, MigrationOutcome, Migrator,
    Platform, UserId,
};

#[derive(Debug, Parser)]
#[command(
    name = "legacy-prefs",
    about = "Migrate legacy single-profile preferences into the profile store",
    version
)]
struct Cli {
    /// Directory backing the key-value state store.
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
    /// JSON file of administrator policy values.
    #[arg(long, global = true)]
    policy: Option<PathBuf>,
    /// JSON migration config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct Target {
    /// User whose legacy preferences to read (multi-user platforms only).
    #[arg(long)]
    user: Option<String>,
    /// Platform to migrate for; defaults to the running one.
    #[arg(long)]
    platform: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the migrated preferences without committing.
    Load {
        #[command(flatten)]
        target: Target,
    },
    /// Migrate the preferences into FILE and record completion.
    Migrate {
        #[command(flatten)]
        target: Target,
        /// Destination for the migrated preferences.
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() {
    legacy_prefs_lib::init_logging();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            report_error(err);
            process::exit(1);
        }
    }
}

/// Failures go to stderr as one JSON `AppError`, causes nested.
fn report_error(err: anyhow::Error) {
    let report = AppError::from(err);
    match serde_json::to_string(&report) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!("Error: {report}"),
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config = match &cli.config {
        Some(path) => MigrationConfig::load(path).context("load migration config")?,
        None => MigrationConfig::default(),
    };
    let policy: Option<Box<dyn PolicySource>> = match &cli.policy {
        Some(path) => Some(Box::new(
            JsonPolicySource::load(path).context("load policy file")?,
        )),
        None => None,
    };
    let state_dir = resolve_state_dir(cli.state_dir).context("determine state directory")?;
    let store = Arc::new(FileStateStore::new(state_dir));

    match cli.command {
        Commands::Load { target } => {
            let (migrator, user) = build(&target, store, policy, config)?;
            handle_load(&migrator, user.as_ref())
        }
        Commands::Migrate { target, out } => {
            let (migrator, user) = build(&target, store, policy, config)?;
            handle_migrate(&migrator, user.as_ref(), out)
        }
    }
}

fn build(
    target: &Target,
    store: Arc<FileStateStore>,
    policy: Option<Box<dyn PolicySource>>,
    config: MigrationConfig,
) -> Result<(Migrator, Option<UserId>)> {
    let platform = match &target.platform {
        Some(raw) => raw.parse::<Platform>().context("parse --platform")?,
        None => Platform::current(),
    };
    let user = target.user.clone().map(UserId::from);
    Ok((Migrator::for_platform(platform, store, policy, config), user))
}

fn handle_load(migrator: &Migrator, user: Option<&UserId>) -> Result<i32> {
    match migrator.load(user) {
        Ok(loaded) => {
            // The token is dropped unused: this command never commits.
            let serialized = loaded.prefs.to_json_pretty()?;
            println!("{serialized}");
            Ok(0)
        }
        Err(MigrationError::AlreadyMigrated) => {
            println!("Legacy preferences were already migrated.");
            Ok(0)
        }
        Err(err) => Err(AppError::from(err)).context("load legacy preferences"),
    }
}

fn handle_migrate(migrator: &Migrator, user: Option<&UserId>, out: PathBuf) -> Result<i32> {
    let sink = JsonProfileSink::new(out);
    let outcome = migrator
        .migrate(user, &sink)
        .context("migrate legacy preferences")?;
    let payload = json!({
        "outcome": outcome,
        "platform": migrator.platform(),
    });
    let serialized = serde_json::to_string_pretty(&payload).context("serialize outcome")?;
    println!("{serialized}");
    Ok(match outcome {
        MigrationOutcome::Migrated | MigrationOutcome::AlreadyMigrated => 0,
        MigrationOutcome::MigratedCommitPending => 1,
    })
}
