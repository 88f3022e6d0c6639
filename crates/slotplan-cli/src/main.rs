//! slotplan CLI - Academic slot planning
//!
//! Command-line interface for checking and querying slot plans stored as
//! JSON snapshots.

mod report;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use slotplan_core::{
    normalize_date, EngineConfig, EngineError, Persistence, SlotRef, TeacherId,
};
use slotplan_engine::{prerequisites, JsonFileStore, PrerequisiteClosure, SchedulingStore};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::report::{ExitCode, Finding, JsonReport, OutputFormat, TextReport};

#[derive(Parser)]
#[command(name = "slotplan")]
#[command(author, version, about = "Academic slot planning engine", long_about = None)]
struct Cli {
    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Engine configuration file (TOML)
    #[arg(long, env = "SLOTPLAN_CONFIG", global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a snapshot and report repairs, cycles and prerequisite problems
    Check {
        /// Snapshot file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },

    /// List prerequisite violations per cohort
    Violations {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the calendar days of a slot
    SlotDays {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Slot id or start date
        #[arg(long)]
        slot: String,
    },

    /// Print the active teaching days of a slot
    TeachingDays {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Slot id or start date
        #[arg(long)]
        slot: String,

        /// Restrict to one course offering
        #[arg(long)]
        course: Option<u32>,
    },

    /// Show a teacher's availability per slot
    Availability {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long)]
        teacher: TeacherId,
    },

    /// Assign every teacher a random subset of courses
    Randomize {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long, default_value_t = 1)]
        min: usize,

        #[arg(long, default_value_t = 3)]
        max: usize,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        /// Output file (overwrites FILE if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        })
    });
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: EngineConfig =
        toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))?;
    if let Err(message) = config.validate() {
        bail!("invalid config {}: {}", path.display(), message);
    }
    debug!(path = %path.display(), "config loaded");
    Ok(config)
}

fn open_store(file: &Path, config: &EngineConfig) -> Result<SchedulingStore> {
    SchedulingStore::load(&JsonFileStore::new(file), config.clone())
        .with_context(|| format!("failed to load {}", file.display()))
}

fn parse_slot(value: &str) -> Result<SlotRef> {
    if let Ok(id) = value.parse::<u32>() {
        return Ok(SlotRef::Id(id));
    }
    normalize_date(value)
        .map(SlotRef::Start)
        .with_context(|| format!("'{}' is neither a slot id nor a date", value))
}

fn resolve_slot(store: &SchedulingStore, value: &str) -> Result<u32> {
    let slot = parse_slot(value)?;
    store
        .get_slot(slot)
        .map(|s| s.id)
        .with_context(|| format!("no slot matches '{}'", value))
}

fn emit(findings: &[Finding], format: OutputFormat, strict: bool) -> Result<ExitCode> {
    match format {
        OutputFormat::Text => {
            TextReport::new(std::io::stdout().lock(), strict).write(findings)?;
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&JsonReport::new(findings, strict))?;
            println!("{}", json);
        }
    }
    Ok(report::exit_code(findings, strict))
}

fn cmd_check(file: &Path, config: &EngineConfig, format: OutputFormat, strict: bool) -> Result<ExitCode> {
    let snapshot = JsonFileStore::new(file)
        .load()
        .with_context(|| format!("failed to read {}", file.display()))?;

    let mut store = SchedulingStore::new(config.clone());
    let repairs = match store.import(snapshot) {
        Ok(repairs) => repairs,
        Err(EngineError::Conflict(conflict)) => {
            return emit(&[Finding::conflict(&conflict)], format, strict);
        }
        Err(other) => return emit(&[Finding::invalid_input(other.to_string())], format, strict),
    };

    let snapshot = store.snapshot();
    let mut findings = vec![Finding::summary(format!(
        "{} course run(s) across {} slot(s), {} teacher(s), {} cohort(s)",
        snapshot.course_runs.len(),
        snapshot.slots.len(),
        snapshot.teachers.len(),
        snapshot.cohorts.len()
    ))];
    findings.extend(report::repair_findings(snapshot, &repairs));

    for course in &snapshot.courses {
        if let PrerequisiteClosure::Cyclic { cycle, .. } = store.all_prerequisites(course.id) {
            findings.push(Finding::cycle(snapshot, course.id, &cycle));
        }
    }
    let violations = store.find_prerequisite_violations();
    findings.extend(violations.iter().map(|v| report::violation_finding(snapshot, v)));
    if !violations.is_empty() {
        let affected = prerequisites::cohorts_with_violations(&violations).len();
        findings.push(Finding::summary(format!(
            "{} cohort(s) with prerequisite problems",
            affected
        )));
    }

    emit(&findings, format, strict)
}

fn cmd_violations(file: &Path, config: &EngineConfig, format: OutputFormat) -> Result<ExitCode> {
    let store = open_store(file, config)?;
    let violations = store.find_prerequisite_violations();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&violations)?),
        OutputFormat::Text if violations.is_empty() => println!("No prerequisite violations"),
        OutputFormat::Text => {
            for violation in &violations {
                println!("{}", report::violation_finding(store.snapshot(), violation).message);
            }
        }
    }
    Ok(ExitCode::Success)
}

fn cmd_slot_days(file: &Path, config: &EngineConfig, slot: &str) -> Result<ExitCode> {
    let store = open_store(file, config)?;
    let slot_id = resolve_slot(&store, slot)?;
    for day in store.slot_days(SlotRef::Id(slot_id)) {
        println!("{}", day);
    }
    Ok(ExitCode::Success)
}

fn cmd_teaching_days(file: &Path, config: &EngineConfig, slot: &str, course: Option<u32>) -> Result<ExitCode> {
    let store = open_store(file, config)?;
    let slot_id = resolve_slot(&store, slot)?;
    let exam = store.exam_date(slot_id).map(|e| (e.date, e.locked));

    for day in store.teaching_days(slot_id, course) {
        match exam {
            Some((date, locked)) if date == day => {
                println!("{} exam{}", day, if locked { " (locked)" } else { "" });
            }
            _ => println!("{}", day),
        }
    }
    Ok(ExitCode::Success)
}

fn cmd_availability(file: &Path, config: &EngineConfig, teacher: TeacherId) -> Result<ExitCode> {
    let store = open_store(file, config)?;
    let name = store
        .get_teacher(teacher)
        .map(|t| t.name.clone())
        .with_context(|| format!("teacher {} not found", teacher))?;

    println!("{}", name);
    for slot in store.snapshot().slots_by_start() {
        let fraction = store.unavailable_fraction(teacher, SlotRef::Id(slot.id));
        let status = if store.is_unavailable(teacher, SlotRef::Id(slot.id)) {
            "unavailable"
        } else if fraction > 0.0 {
            "partial"
        } else {
            "available"
        };
        println!(
            "  slot {} {}..{}  {:<11} {:>3.0}%",
            slot.id,
            slot.start,
            slot.end,
            status,
            fraction * 100.0
        );
    }
    Ok(ExitCode::Success)
}

fn cmd_randomize(
    file: &Path,
    config: &EngineConfig,
    min: usize,
    max: usize,
    seed: Option<u64>,
    output: Option<&Path>,
) -> Result<ExitCode> {
    let mut store = open_store(file, config)?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    store.randomize_teacher_courses(min, max, &mut rng)?;

    let target = output.unwrap_or(file);
    store.persist(&JsonFileStore::new(target))?;
    info!(path = %target.display(), "randomized snapshot written");
    println!(
        "Assigned courses to {} teacher(s) -> {}",
        store.teachers().len(),
        target.display()
    );
    Ok(ExitCode::Success)
}

fn main() -> Result<std::process::ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    let code = match cli.command {
        Some(Commands::Check { file, format, strict }) => cmd_check(&file, &config, format, strict)?,
        Some(Commands::Violations { file, format }) => cmd_violations(&file, &config, format)?,
        Some(Commands::SlotDays { file, slot }) => cmd_slot_days(&file, &config, &slot)?,
        Some(Commands::TeachingDays { file, slot, course }) => {
            cmd_teaching_days(&file, &config, &slot, course)?
        }
        Some(Commands::Availability { file, teacher }) => cmd_availability(&file, &config, teacher)?,
        Some(Commands::Randomize {
            file,
            min,
            max,
            seed,
            output,
        }) => cmd_randomize(&file, &config, min, max, seed, output.as_deref())?,
        None => {
            println!("slotplan - Academic slot planning engine");
            println!("Run with --help for usage information");
            ExitCode::Success
        }
    };

    Ok(code.into())
}
