use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use project_sync::error::{SyncError, SyncResult};
use project_sync::github::GraphqlClient;
use project_sync::logging::{init_logging, LoggingConfig};
use project_sync::manifest::load_project_configs;
use project_sync::milestone::{IssueEvent, MilestoneOutcome, MilestoneStatusUpdater, Trigger};
use project_sync::orchestrator::Orchestrator;
use project_sync::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "project-sync")]
#[command(version)]
#[command(about = "Reconcile GitHub Projects v2 boards with declarative project documents")]
struct Cli {
    /// Only log warnings and errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(long, short, global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// TOML settings file; environment variables take precedence
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync every project document in the configs directory
    Sync {
        /// Directory holding *.yml / *.yaml project documents
        #[arg(long, default_value = ".github/projects")]
        config_dir: PathBuf,

        /// Print the run summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Ensure the PROJECT_NAME project exists, link GITHUB_REPOSITORY and add its issues and pull requests
    Backfill,
    /// Move a milestoned issue into the configured status
    MilestoneStatus {
        /// Webhook event payload (defaults to GITHUB_EVENT_PATH)
        #[arg(long, value_name = "PATH")]
        event: Option<PathBuf>,
    },
    /// Load and validate project documents without contacting GitHub
    Validate {
        /// Directory holding *.yml / *.yaml project documents
        #[arg(long, default_value = ".github/projects")]
        config_dir: PathBuf,
    },
}

/// Process exit codes
mod exit_codes {
    use std::process::ExitCode;

    /// Everything succeeded, or there was nothing to do
    pub fn success() -> ExitCode {
        ExitCode::SUCCESS
    }

    /// A project failed or a fatal error occurred
    pub fn failed() -> ExitCode {
        ExitCode::from(1)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load(cli.settings.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {}", err);
            return exit_codes::failed();
        }
    };

    init_logging(LoggingConfig::from_flags(
        cli.verbose,
        cli.quiet,
        settings.debug_project_sync,
    ));

    let result = match cli.command {
        Commands::Sync { config_dir, json } => run_sync(settings, &config_dir, json).await,
        Commands::Backfill => run_backfill(settings).await,
        Commands::MilestoneStatus { event } => run_milestone_status(settings, event).await,
        Commands::Validate { config_dir } => run_validate(&settings, &config_dir),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "project-sync failed");
            eprintln!("error: {}", err);
            exit_codes::failed()
        }
    }
}

async fn run_sync(settings: Settings, config_dir: &Path, json: bool) -> SyncResult<ExitCode> {
    let client = GraphqlClient::from_settings(&settings)?;
    let report = load_project_configs(config_dir, settings.default_owner().as_deref())?;
    if report.configs.is_empty() {
        tracing::warn!(dir = %config_dir.display(), "no valid project documents found");
    }

    let orchestrator = Orchestrator::new(client, settings);
    let summary = orchestrator.run(&report.configs).await;

    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(err) => tracing::error!(error = %err, "failed to serialize summary"),
        }
    } else {
        for result in &summary.results {
            match &result.error {
                None => println!("ok      {}", result.name),
                Some(err) => println!("FAILED  {}: {}", result.name, err),
            }
        }
        println!(
            "{} project(s): {} succeeded, {} failed",
            summary.total, summary.succeeded, summary.failed
        );
    }

    Ok(if summary.all_successful() {
        exit_codes::success()
    } else {
        exit_codes::failed()
    })
}

async fn run_backfill(settings: Settings) -> SyncResult<ExitCode> {
    let client = GraphqlClient::from_settings(&settings)?;
    let orchestrator = Orchestrator::new(client, settings);
    let report = orchestrator.backfill().await?;

    println!(
        "project #{} {}: {} existing, {} added, {} field value(s) set",
        report.project.number,
        report.project.title,
        report.items.existing,
        report.items.added,
        report.items.values_set
    );
    Ok(exit_codes::success())
}

async fn run_milestone_status(settings: Settings, event: Option<PathBuf>) -> SyncResult<ExitCode> {
    let path = event.or_else(|| settings.github_event_path.clone()).ok_or_else(|| {
        SyncError::Settings(
            "--event or GITHUB_EVENT_PATH is required".to_string(),
        )
    })?;
    let event = IssueEvent::from_path(&path)?;
    let updater = MilestoneStatusUpdater::new(&settings);

    // No-ops are decided before a token is needed
    let target = match updater.evaluate(&event)? {
        Trigger::Skip(reason) => {
            tracing::info!(%reason, "nothing to do");
            println!("no-op: {}", reason);
            return Ok(exit_codes::success());
        }
        Trigger::Apply(target) => target,
    };

    let client = GraphqlClient::from_settings(&settings)?;
    if let MilestoneOutcome::StatusSet {
        project_number,
        issue_number,
        option,
        added,
        ..
    } = updater.apply(&client, &target).await?
    {
        println!(
            "issue #{} set to '{}' on project #{}{}",
            issue_number,
            option,
            project_number,
            if added { " (added to project)" } else { "" }
        );
    }
    Ok(exit_codes::success())
}

fn run_validate(settings: &Settings, config_dir: &Path) -> SyncResult<ExitCode> {
    let report = load_project_configs(config_dir, settings.default_owner().as_deref())?;

    for config in &report.configs {
        println!(
            "valid    {} ({}: {} field(s), {} view(s), {} automation rule(s))",
            config.source_file.display(),
            config.name,
            config.fields.len(),
            config.views.len(),
            config.automation.len()
        );
    }
    for err in &report.skipped {
        println!("invalid  {}", err);
    }

    Ok(if report.skipped.is_empty() {
        exit_codes::success()
    } else {
        exit_codes::failed()
    })
}
