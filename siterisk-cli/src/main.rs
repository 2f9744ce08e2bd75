//! Siterisk CLI - risk scoring for data-center assessments

// Global invariants enforced:
// - Deterministic output ordering
// - Identical input yields byte-for-byte identical output
// - Every command except `config` authenticates before touching the store

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use siterisk_core::auth::{provider_for, Principal};
use siterisk_core::config::{self, ResolvedConfig};
use siterisk_core::reconcile::apply_section_fixes;
use siterisk_core::report::{
    render_config_text, render_json, render_progress_text, render_recommendations_text,
    render_reconcile_text, render_record_text, render_summary_text, render_validation_text,
};
use siterisk_core::validate::validate_stored_score;
use siterisk_core::{import_assessment, AssessmentStore, Questionnaire, RiskEngine, SqliteStore};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "siterisk")]
#[command(about = "Risk scoring for data-center assessment questionnaires")]
#[command(version = env!("SITERISK_VERSION"))]
struct Cli {
    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Path to config file (default: auto-discover)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides config file)
    #[arg(long, global = true, env = "SITERISK_DB")]
    db: Option<PathBuf>,

    /// Access token for token auth mode
    #[arg(long, global = true, env = "SITERISK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and load a questionnaire catalog
    Init {
        /// Catalog JSON file (default: built-in data-center catalog)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Import an assessment file (`{ facility, answers[] }`)
    Import {
        file: PathBuf,

        /// Recalculate and store the facility's score after importing
        #[arg(long)]
        score: bool,
    },
    /// Compute a facility's risk score
    Score {
        facility: String,

        /// Persist the record and the facility's progress
        #[arg(long)]
        store: bool,
    },
    /// Recalculate and store the score of every facility
    ScoreAll,
    /// Show a facility's required-question completion
    Progress { facility: String },
    /// Show prioritized recommendations for a facility
    Recommend { facility: String },
    /// Compare a facility's stored score with a fresh computation
    Validate { facility: String },
    /// Move questions whose section disagrees with their id range
    ReconcileSections {
        /// Report the fixes without writing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Inspect the configuration
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file without touching the database
    Validate,
    /// Show the resolved configuration (merged defaults + config file)
    Show,
}

#[derive(Clone, Copy, PartialEq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "siterisk=debug,siterisk_core=debug"
    } else {
        "siterisk=info,siterisk_core=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn emit(format: OutputFormat, text: String, json: String) {
    match format {
        OutputFormat::Text => print!("{}", text),
        OutputFormat::Json => println!("{}", json),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_root = std::env::current_dir()?;

    if let Commands::Config { action } = &cli.command {
        return handle_config(action, &project_root, cli.config.as_deref(), cli.format);
    }

    let mut resolved = config::load_and_resolve(&project_root, cli.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(p) = &resolved.config_path {
        debug!(path = %p.display(), "using config");
    }
    if let Some(db) = cli.db.clone() {
        resolved.database = db;
    }

    let principal = authenticate(&resolved, cli.token.as_deref())?;
    debug!(user = %principal.user, "authenticated");

    let store = SqliteStore::open(&resolved.database)
        .with_context(|| format!("failed to open database: {}", resolved.database.display()))?;
    let ResolvedConfig { policy, .. } = resolved;
    let mut engine = RiskEngine::new(store, policy);
    let format = cli.format;

    match cli.command {
        Commands::Init { catalog } => {
            let questionnaire = match &catalog {
                Some(path) => Questionnaire::load(path)?,
                None => Questionnaire::builtin().context("failed to load built-in catalog")?,
            };
            engine
                .store_mut()
                .load_catalog(&questionnaire)
                .context("failed to load catalog into database")?;
            info!(
                sections = questionnaire.sections().len(),
                questions = questionnaire.questions().count(),
                "catalog loaded"
            );
            if format == OutputFormat::Text {
                println!(
                    "Loaded {} sections and {} questions",
                    questionnaire.sections().len(),
                    questionnaire.questions().count()
                );
            }
        }
        Commands::Import { file, score } => {
            let summary = import_assessment(engine.store_mut(), &file, Utc::now())?;
            let mut text = format!(
                "Imported {} answers for {}\n",
                summary.answers_written, summary.facility_id
            );
            if !summary.unknown_questions.is_empty() {
                let ids: Vec<String> = summary
                    .unknown_questions
                    .iter()
                    .map(|id| id.to_string())
                    .collect();
                text.push_str(&format!("Unknown questions: {}\n", ids.join(", ")));
            }
            if score {
                let record = engine.recalculate_and_store(&summary.facility_id)?;
                text.push('\n');
                text.push_str(&render_record_text(&record));
            }
            emit(format, text, render_json(&summary));
        }
        Commands::Score { facility, store } => {
            let record = if store {
                engine.recalculate_and_store(&facility)?
            } else {
                engine.compute_risk_score(&facility)?
            };
            emit(format, render_record_text(&record), render_json(&record));
        }
        Commands::ScoreAll => {
            let total = engine.store().facilities()?.len() as u64;
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            let records = engine.score_all(|record| {
                pb.set_message(record.facility_id.clone());
                pb.inc(1);
            })?;
            pb.finish_and_clear();
            emit(format, render_summary_text(&records), render_json(&records));
        }
        Commands::Progress { facility } => {
            let progress = engine.compute_progress(&facility)?;
            emit(
                format,
                render_progress_text(&facility, &progress),
                render_json(&progress),
            );
        }
        Commands::Recommend { facility } => {
            let recs = engine.compute_recommendations(&facility)?;
            emit(format, render_recommendations_text(&recs), render_json(&recs));
        }
        Commands::Validate { facility } => {
            let validation = validate_stored_score(&engine, &facility)?;
            emit(
                format,
                render_validation_text(&validation),
                render_json(&validation),
            );
            if !validation.matches {
                std::process::exit(1);
            }
        }
        Commands::ReconcileSections { dry_run } => {
            let summary = apply_section_fixes(engine.store_mut(), dry_run)?;
            emit(format, render_reconcile_text(&summary), render_json(&summary));
        }
        Commands::Config { .. } => unreachable!("handled before opening the store"),
    }

    Ok(())
}

fn authenticate(resolved: &ResolvedConfig, token: Option<&str>) -> anyhow::Result<Principal> {
    let provider = provider_for(resolved.auth_mode, &resolved.auth_tokens);
    provider
        .authenticate(token)
        .with_context(|| format!("authentication failed ({} mode)", provider.mode().as_str()))
}

fn handle_config(
    action: &ConfigAction,
    project_root: &std::path::Path,
    config_path: Option<&std::path::Path>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Validate => match config::load_and_resolve(project_root, config_path) {
            Ok(config) => {
                if let Some(ref p) = config.config_path {
                    println!("Config valid: {}", p.display());
                } else {
                    println!("No config file found. Using defaults.");
                }
            }
            Err(e) => {
                eprintln!("Config validation failed: {:#}", e);
                std::process::exit(1);
            }
        },
        ConfigAction::Show => {
            let resolved = config::load_and_resolve(project_root, config_path)
                .context("failed to load configuration")?;
            let summary = resolved.summary();
            emit(format, render_config_text(&summary), render_json(&summary));
        }
    }
    Ok(())
}
