//! Unattended station scheduler for a screen-driven game agent.
//!
//! Reads `.gachabot/config.toml` (ring, roster, perception settings) and
//! drives the scheduler loop. `run` uses the dry-run backend: movements are
//! logged and screen readings come from a fixed table.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use gachabot::exit_codes;
use gachabot::io::clock::{Shutdown, SystemClock};
use gachabot::io::config::{
    BotConfig, DEFAULT_CONFIG_PATH, RosterEntryConfig, load_config, write_config,
};
use gachabot::io::dry_run::{DryRunMovement, DryRunSession, DryRunVision};
use gachabot::io::notify::{NotificationWorker, sink_from_config};
use gachabot::logging;
use gachabot::looping::{LoopStop, run_loop};
use gachabot::navigator::Navigator;
use gachabot::perception::PerceptionVerifier;
use gachabot::recovery::RecoveryHandler;
use gachabot::roster::build_roster;
use gachabot::scheduler::{Scheduler, TickContext, TickOutcome};
use gachabot::station::StationContext;

/// Amount reported by the dry-run screen for resources without a valid range.
const DRY_RUN_AMOUNT: u64 = 500;

#[derive(Parser)]
#[command(
    name = "gachabot",
    version,
    about = "Unattended station scheduler for a screen-driven game agent"
)]
struct Cli {
    /// Config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the sample config if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Load and validate the config, then print the roster.
    Validate,
    /// Print the turn operations between two viewpoints.
    Route { from: String, to: String },
    /// Drive the scheduler loop against the dry-run backend.
    Run {
        /// Stop after this many ticks (busy or idle).
        #[arg(long)]
        max_ticks: Option<u64>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Validate => cmd_validate(&cli.config),
        Command::Route { from, to } => cmd_route(&cli.config, &from, &to),
        Command::Run { max_ticks } => cmd_run(&cli.config, max_ticks),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        eprintln!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::EXISTS);
    }
    write_config(path, &BotConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_validate(path: &Path) -> Result<i32> {
    let cfg = load_config(path)?;
    build_roster(&cfg, Utc::now()).context("build roster")?;

    let ring: Vec<&str> = cfg.ring.iter().map(|waypoint| waypoint.name.as_str()).collect();
    println!("ring: {} (home {})", ring.join(" -> "), cfg.home);
    for (idx, entry) in cfg.roster.iter().enumerate() {
        println!("{:>2}. {}", idx + 1, describe(entry));
    }
    Ok(exit_codes::OK)
}

fn describe(entry: &RosterEntryConfig) -> String {
    match entry {
        RosterEntryConfig::Station(station) => {
            let mut line = format!("{} every {}s", station.name, station.interval_secs);
            if let Some(gate) = &station.gate {
                line.push_str(&format!(", gated on {} >= {}", gate.counter, gate.threshold));
            }
            line
        }
        RosterEntryConfig::Group(group) => {
            let mut line = format!("{} round-robin x{}", group.prefix, group.count);
            if let Some(secs) = group.refill_interval_secs {
                line.push_str(&format!(", refill every {secs}s"));
            }
            line
        }
        RosterEntryConfig::Phased(phased) => {
            let phases: Vec<&str> = phased.phases.iter().map(|phase| phase.name.as_str()).collect();
            format!("{} phases {}", phased.name, phases.join(" -> "))
        }
    }
}

fn cmd_route(path: &Path, from: &str, to: &str) -> Result<i32> {
    let cfg = load_config(path)?;
    let route = cfg.build_ring()?.route(from, to)?;
    println!("{from} -> {to}: {:?}", route.direction);
    for leg in &route.legs {
        for turn in &leg.turns {
            println!("  turn {:?} {:+} (to {})", turn.axis, turn.degrees, leg.waypoint);
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_run(path: &Path, max_ticks: Option<u64>) -> Result<i32> {
    let cfg = load_config(path)?;
    let shutdown = Shutdown::new(cfg.stop_file.as_ref().map(PathBuf::from))
        .with_pause_file(cfg.pause_file.as_ref().map(PathBuf::from));

    let mut navigator = Navigator::new(cfg.build_ring()?, &cfg.home)?;
    let mut movement = DryRunMovement::new(shutdown.clone());
    let mut session = DryRunSession::new(shutdown.clone());
    let mut vision = DryRunVision::new(dry_run_amounts(&cfg), DRY_RUN_AMOUNT);
    let verifier = PerceptionVerifier::new(cfg.perception.clone());
    let clock = SystemClock;
    let worker = NotificationWorker::spawn(sink_from_config(&cfg.notify)?, cfg.notify.completions)?;

    let roster = build_roster(&cfg, Utc::now()).context("build roster")?;
    let mut scheduler = Scheduler::new(
        roster,
        RecoveryHandler::new(cfg.recovery.clone(), cfg.home.clone()),
    );
    let mut ctx = TickContext {
        station: StationContext {
            navigator: &mut navigator,
            movement: &mut movement,
            vision: &mut vision,
            verifier: &verifier,
            clock: &clock,
        },
        session: &mut session,
        notifier: &worker,
    };

    let outcome = run_loop(
        &mut scheduler,
        &mut ctx,
        &shutdown,
        cfg.idle(),
        max_ticks,
        |tick| match tick {
            TickOutcome::Completed(stats) => debug!(station = %stats.station, "tick completed"),
            other => debug!(?other, "tick"),
        },
    );
    drop(ctx);
    worker.finish();

    info!(
        ticks = outcome.ticks,
        idle_ticks = outcome.idle_ticks,
        paused_ticks = outcome.paused_ticks,
        issued = movement.issued(),
        "loop stopped"
    );
    for (name, totals) in scheduler.totals() {
        println!(
            "{name}: {} completions, {:.0}s, {:?}",
            totals.total_completions,
            totals.total_time.as_secs_f64(),
            totals.resources
        );
    }
    Ok(match outcome.stop {
        LoopStop::MaxTicks => exit_codes::OK,
        LoopStop::Shutdown => exit_codes::SHUTDOWN,
    })
}

/// Midpoint of each valid range, so dry-run reads always pass range checks.
fn dry_run_amounts(cfg: &BotConfig) -> BTreeMap<String, u64> {
    cfg.perception
        .valid_ranges
        .iter()
        .map(|(name, range)| (name.clone(), range.min + range.max.saturating_sub(range.min) / 2))
        .collect()
}
