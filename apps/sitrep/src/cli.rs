//! # CLI Commands
//!
//! One function per subcommand, all taking plain arguments so integration
//! tests can drive them without spawning the binary.

use std::error::Error;
use std::fs;
use std::path::Path;

use sitrep_core::engine::{BuildTrigger, Engine};
use sitrep_core::storage::Store;
use sitrep_core::{EntryKind, Timestamp};

use crate::collect::{gather_signals, CommandTrigger};
use crate::config::ProjectConfig;

pub type CliResult<T = ()> = Result<T, Box<dyn Error + Send + Sync>>;

// =============================================================================
// ENGINE WIRING
// =============================================================================

/// Open the engine for a project root, creating the data directory and
/// database on first use.
pub fn open_engine(root: &Path, config: &ProjectConfig) -> CliResult<Engine> {
    let db_path = ProjectConfig::db_path(root);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    tracing::debug!(db = %db_path.display(), "opening store");
    let store = Store::open(db_path, config.retention)?;
    Ok(Engine::new(
        store,
        config.weight_table(),
        config.recent_error_limit,
    ))
}

// =============================================================================
// COMMANDS
// =============================================================================

/// `sitrep init`: write the default config and create the database.
pub fn cmd_init(root: &Path, force: bool) -> CliResult {
    let config_path = ProjectConfig::path(root);
    if config_path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        )
        .into());
    }

    let config = ProjectConfig::default();
    config.save(root)?;
    open_engine(root, &config)?;
    println!("initialized sitrep in {}", root.display());
    Ok(())
}

/// `sitrep status`: collect signals and print the aggregated report.
pub async fn cmd_status(root: &Path, json: bool) -> CliResult {
    let config = ProjectConfig::load(root)?;
    let engine = open_engine(root, &config)?;

    let signals = gather_signals(root, &config).await;
    let report = engine.status(&signals, Timestamp::now())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{}: {:.1}% ({:?}){}",
        config.project_name,
        report.readiness.overall_percentage,
        report.readiness.health,
        if report.readiness.no_data { " [no data]" } else { "" },
    );
    if let Some(phase) = &report.current_phase {
        println!("phase: {phase}");
    }
    for score in &report.readiness.component_breakdown {
        match score.percentage {
            Some(pct) => println!(
                "  {:<20} {:>5.1}%  (w{})  {}",
                score.signal.name, pct, score.weight, score.signal.detail
            ),
            None => println!(
                "  {:<20}     --  (w{})  {}",
                score.signal.name, score.weight, score.signal.detail
            ),
        }
    }
    if !report.recent_errors.is_empty() {
        println!("recent errors:");
        for summary in &report.recent_errors {
            println!(
                "  [{}x{}] {}",
                summary.occurrence_count,
                if summary.has_solution { ", has fix" } else { "" },
                summary.message
            );
        }
    }
    println!("next steps:");
    for step in &report.next_steps {
        println!("  - {step}");
    }
    for note in &report.degraded {
        println!("degraded: {note}");
    }
    Ok(())
}

/// `sitrep fix`: record a fix, optionally verifying it with a build.
pub async fn cmd_fix(root: &Path, error: &str, solution: &str, verify: bool) -> CliResult {
    let config = ProjectConfig::load(root)?;
    let engine = open_engine(root, &config)?;

    let trigger = if verify {
        let trigger = CommandTrigger::from_config(&config, root);
        if trigger.is_none() {
            return Err("no verify_command configured".into());
        }
        trigger
    } else {
        None
    };

    let error = error.to_string();
    let solution = solution.to_string();
    // The verification build can run for minutes; keep it off the runtime.
    let report = tokio::task::spawn_blocking(move || {
        engine.apply_fix(
            &error,
            &solution,
            trigger.as_ref().map(|t| t as &dyn BuildTrigger),
            Timestamp::now(),
        )
    })
    .await??;

    println!(
        "recorded fix for {} (seen {}x): {:?} / {:?}",
        report.fingerprint, report.occurrence_count, report.outcome, report.verification
    );
    Ok(())
}

/// `sitrep solution`: look up ranked solutions for an error message.
pub fn cmd_solution(root: &Path, error: &str) -> CliResult {
    let config = ProjectConfig::load(root)?;
    let engine = open_engine(root, &config)?;

    let (fingerprint, solutions) = engine.lookup_solutions(error)?;
    if solutions.is_empty() {
        println!("no recorded solutions for {fingerprint}");
        return Ok(());
    }
    println!("{} solution(s) for {fingerprint}:", solutions.len());
    for solution in &solutions {
        println!(
            "  [{:?} @ {}] {}",
            solution.outcome, solution.applied_at, solution.description
        );
    }
    Ok(())
}

/// `sitrep note`: append a development note.
pub fn cmd_note(root: &Path, text: &str) -> CliResult {
    let config = ProjectConfig::load(root)?;
    let engine = open_engine(root, &config)?;

    let outcome = engine
        .store()
        .append_context(EntryKind::Note, text, Timestamp::now())?;
    println!("noted (#{})", outcome.seq);
    Ok(())
}

/// `sitrep phase`: record a phase transition.
pub fn cmd_phase(root: &Path, name: &str) -> CliResult {
    let config = ProjectConfig::load(root)?;
    let engine = open_engine(root, &config)?;

    engine
        .store()
        .append_context(EntryKind::PhaseChange, name, Timestamp::now())?;
    println!("phase set to '{name}'");
    Ok(())
}

/// `sitrep log`: print recent context entries.
pub fn cmd_log(root: &Path, limit: usize, kind: Option<&str>) -> CliResult {
    let config = ProjectConfig::load(root)?;
    let engine = open_engine(root, &config)?;

    let filter = kind.map(str::parse::<EntryKind>).transpose()?;
    let entries = engine.store().recent_context(limit, filter);
    if entries.is_empty() {
        println!("no context recorded");
        return Ok(());
    }
    for entry in &entries {
        let phase = entry.phase_at_time.as_deref().unwrap_or("-");
        println!(
            "[{} {:?} phase={phase}] {}",
            entry.timestamp, entry.kind, entry.payload
        );
    }
    Ok(())
}

/// `sitrep errors`: print the most recently seen errors.
pub fn cmd_errors(root: &Path, limit: usize) -> CliResult {
    let config = ProjectConfig::load(root)?;
    let engine = open_engine(root, &config)?;

    let records = engine.store().recent_errors(limit)?;
    if records.is_empty() {
        println!("no errors recorded");
        return Ok(());
    }
    for record in &records {
        println!(
            "[{}x, {} solution(s)] {} {}",
            record.occurrence_count,
            record.linked_solutions.len(),
            record.fingerprint,
            record.raw_message
        );
    }
    Ok(())
}
