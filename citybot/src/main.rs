//! Vision-driven city-building game bot.
//!
//! `citybot init` writes a starter config, `citybot run` drives one game
//! instance until interrupted (or for `--cycles N`), and `citybot status`
//! prints the persisted progress of an instance.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use citybot::core::build_queue::BuildKind;
use citybot::core::ledger::InstanceLedger;
use citybot::cycle::{CycleOptions, run_cycles, run_tutorial};
use citybot::device::Device;
use citybot::exit_codes;
use citybot::io::config::{CitybotConfig, load_config, write_config};
use citybot::io::ledger_store::{DEFAULT_LEDGER_FILE, LedgerStore};
use citybot::io::transport::AdbTransport;
use citybot::io::vision::HostedDetector;
use citybot::logging;
use citybot::machine::GameStateMachine;
use citybot::machine::tutorial::TutorialHandler;
use citybot::startup::{StartupOptions, run_startup_tasks};
use citybot::tasks::TaskManager;

const DEFAULT_CONFIG_FILE: &str = "citybot.toml";
const DEFAULT_INSTANCE: &str = "instance1";

#[derive(Parser)]
#[command(
    name = "citybot",
    version,
    about = "Vision-driven automation for a city-building strategy game"
)]
struct Cli {
    /// Path to the TOML configuration.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Path to the instance ledger file.
    #[arg(long, global = true, default_value = DEFAULT_LEDGER_FILE)]
    state: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a starter config file.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Drive one instance: tutorial, startup tasks, then the main loop.
    Run(RunArgs),
    /// Print the saved progress of an instance.
    Status {
        #[arg(long, default_value = DEFAULT_INSTANCE)]
        instance: String,
    },
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    #[arg(long, default_value = DEFAULT_INSTANCE)]
    instance: String,
    /// Number of main-loop cycles; 0 runs until Ctrl-C.
    #[arg(long, default_value_t = 0)]
    cycles: u64,
    /// Treat the tutorial as already completed.
    #[arg(long)]
    skip_tutorial: bool,
    #[arg(long)]
    skip_tree_clearing: bool,
    #[arg(long)]
    skip_second_builder: bool,
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Run(args) => {
            logging::init();
            cmd_run(&cli.config, &cli.state, &args)
        }
        Command::Status { instance } => cmd_status(&cli.state, &instance),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if !force && config_path.exists() {
        println!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
        return Ok(exit_codes::OK);
    }
    write_config(config_path, &CitybotConfig::starter())
        .with_context(|| format!("write {}", config_path.display()))?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(config_path: &Path, state_path: &Path, args: &RunArgs) -> Result<i32> {
    let cfg = load_config(config_path)?;
    cfg.validate_for_run()
        .with_context(|| format!("validate {}", config_path.display()))?;
    let instance = cfg.instance(&args.instance)?;
    let store = LedgerStore::new(state_path);

    let mut ledger = store.load_or_create(&args.instance, &instance.device_id)?;
    if args.skip_tutorial && !ledger.tutorial_completed {
        info!("tutorial skipped by flag");
        ledger.complete_tutorial();
    }

    let transport = AdbTransport::from_config(&cfg.adb);
    let gameplay = HostedDetector::new(&cfg.vision, &cfg.vision.gameplay_model_id, transport.clone())?;
    let tutorial = HostedDetector::new(&cfg.vision, &cfg.vision.tutorial_model_id, transport.clone())?;
    let device = Device::new(&instance.device_id, &gameplay, &transport);

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("install Ctrl-C handler")?;

    let mut machine = GameStateMachine::new(
        ledger,
        TutorialHandler::new(&instance.preferred_civilization),
    );
    info!(
        instance = %args.instance,
        device = %instance.device_id,
        tutorial_completed = machine.ledger().tutorial_completed,
        "starting"
    );

    if !machine.ledger().tutorial_completed {
        let tutorial_device = device.with_detector(&tutorial);
        let outcome = run_tutorial(
            &mut machine,
            &tutorial_device,
            &store,
            cfg.cycle.tutorial_max_iterations,
            cfg.refresh_interval(),
            &shutdown,
        )?;
        if shutdown.load(Ordering::SeqCst) {
            return Ok(exit_codes::OK);
        }
        if !outcome.completed {
            eprintln!(
                "tutorial not completed after {} iterations",
                outcome.iterations
            );
            return Ok(exit_codes::TUTORIAL_INCOMPLETE);
        }
    }

    let startup = StartupOptions {
        skip_tree_clearing: args.skip_tree_clearing,
        skip_second_builder: args.skip_second_builder,
        tree_clearing_max_attempts: cfg.cycle.tree_clearing_max_attempts,
    };
    let report = run_startup_tasks(
        &device,
        machine.ledger_mut(),
        &store,
        &startup,
        &shutdown,
    );
    store
        .save(machine.ledger())
        .with_context(|| format!("save ledger to {}", store.path().display()))?;
    if shutdown.load(Ordering::SeqCst) {
        return Ok(exit_codes::OK);
    }
    if !report.succeeded() {
        eprintln!(
            "startup tasks incomplete (tree clearing: {}, second builder: {})",
            report.tree_clearing_completed, report.second_builder_added
        );
        return Ok(exit_codes::STARTUP_FAILED);
    }

    let mut tasks = TaskManager::with_default_tasks(&cfg.tasks);
    let options = CycleOptions {
        max_cycles: args.cycles,
        refresh_interval: cfg.refresh_interval(),
    };
    let outcome = run_cycles(
        &mut machine,
        &mut tasks,
        &device,
        &store,
        &options,
        &shutdown,
        |_| {},
    )?;
    println!(
        "ran {} cycles ({} with an action); {} build tasks remaining",
        outcome.cycles_run,
        outcome.actions,
        machine.ledger().tasks_remaining()
    );
    Ok(exit_codes::OK)
}

fn cmd_status(state_path: &Path, instance: &str) -> Result<i32> {
    let store = LedgerStore::new(state_path);
    match store.load(instance)? {
        Some(ledger) => print!("{}", render_status(&ledger)),
        None => println!("no progress recorded for {instance}"),
    }
    Ok(exit_codes::OK)
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// Human-readable progress summary with one line per build task.
fn render_status(ledger: &InstanceLedger) -> String {
    let mut out = String::new();
    let total = ledger.building_tasks.len();
    let done = ledger.building_tasks.iter().filter(|t| t.completed).count();

    // Writing to a String cannot fail.
    let _ = writeln!(out, "instance: {} (device {})", ledger.id, ledger.device_id);
    let _ = writeln!(out, "tutorial completed: {}", yes_no(ledger.tutorial_completed));
    let _ = writeln!(
        out,
        "tree clearing: {} ({} trees visited)",
        yes_no(ledger.tree_clearing_completed),
        ledger.tree_clearing_index
    );
    let _ = writeln!(out, "second builder: {}", yes_no(ledger.second_builder_added));
    let _ = writeln!(out, "city hall level: {}", ledger.city_hall_level);
    let _ = writeln!(out, "build queue: {done}/{total} completed");
    for (idx, task) in ledger.building_tasks.iter().enumerate() {
        let marker = if task.completed {
            "x"
        } else if idx == ledger.current_task_index {
            ">"
        } else {
            " "
        };
        let kind = match task.kind {
            BuildKind::BuildNew => "build",
            BuildKind::Upgrade => "upgrade",
        };
        let _ = write!(out, "  [{marker}] {idx:>2} {kind} {}", task.building);
        if task.skipped_attempts > 0 {
            let _ = write!(out, " (skipped {}x", task.skipped_attempts);
            if let Some(at) = task.last_skipped {
                let _ = write!(out, ", last {}", at.to_rfc3339());
            }
            out.push(')');
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["citybot", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn parse_run_flags() {
        let cli = Cli::parse_from([
            "citybot",
            "--state",
            "s.json",
            "run",
            "--instance",
            "instance2",
            "--cycles",
            "5",
            "--skip-tree-clearing",
        ]);
        assert_eq!(cli.state, PathBuf::from("s.json"));
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.instance, "instance2");
        assert_eq!(args.cycles, 5);
        assert!(args.skip_tree_clearing);
        assert!(!args.skip_tutorial);
        assert!(!args.skip_second_builder);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["citybot", "status", "--config", "other.toml"]);
        assert_eq!(cli.config, PathBuf::from("other.toml"));
        assert!(matches!(cli.command, Command::Status { ref instance } if instance == DEFAULT_INSTANCE));
    }

    #[test]
    fn status_marks_cursor_and_skips() {
        let mut ledger = InstanceLedger::new("instance1", "emulator-5554");
        ledger.complete_current_task();
        ledger.building_tasks[3].skipped_attempts = 2;
        let at: DateTime<Utc> = "2024-05-01T12:00:00Z".parse().expect("timestamp");
        ledger.building_tasks[3].last_skipped = Some(at);

        let text = render_status(&ledger);
        assert!(text.contains("instance: instance1 (device emulator-5554)"));
        assert!(text.contains("build queue: 1/18 completed"));
        assert!(text.contains("  [x]  0 upgrade cityhall\n"));
        assert!(text.contains("  [>]  1 upgrade barracks\n"));
        assert!(text.contains("  [ ]  3 upgrade farm (skipped 2x, last 2024-05-01T12:00:00+00:00)\n"));
        assert!(text.contains("  [ ]  7 build lumber_mill\n"));
    }
}
