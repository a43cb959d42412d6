use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{ArgAction, Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rover_swarm::{
    CommPolicy, ObstacleMap, ReportStore, RunReport, SimConfig, Simulation, default_map,
    save_report,
};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod map;

use map::{MapCommand, run_map};

/// Keeps the start-position stream apart from the channel stream for one seed.
const START_SEED_SALT: u64 = 0x5eed_57a7;

#[derive(Parser)]
#[command(
    name = "rover-swarm",
    version,
    about = "Rover swarm simulator: obstacle sharing under competing communication policies",
    long_about = None
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one or more simulation cycles
    Run {
        /// Obstacle map JSON (defaults to the built-in map)
        #[arg(long)]
        map: Option<PathBuf>,
        /// Simulation config JSON; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,
        /// Number of rovers
        #[arg(short = 'n', long)]
        rovers: Option<usize>,
        /// Communication policy (label or short alias such as intcom)
        #[arg(short, long, value_enum)]
        policy: Option<CommPolicy>,
        /// Probability that a message is lost in transit
        #[arg(long)]
        loss_rate: Option<f64>,
        /// RNG seed; cycle k uses seed + k
        #[arg(long)]
        seed: Option<u64>,
        /// Number of simulation cycles
        #[arg(short, long, default_value_t = 1)]
        cycles: u32,
        /// Upper bound on simulated seconds per cycle
        #[arg(long)]
        max_time: Option<f64>,
        /// Clamp merged obstacles back to four corners
        #[arg(long, action = ArgAction::SetTrue, default_value_t = false)]
        quad_clamp: bool,
        /// Skip writing the JSON report
        #[arg(long = "no-report", action = ArgAction::SetFalse, default_value_t = true)]
        report: bool,
    },
    /// List the available communication policies
    Policies,
    /// Obstacle map operations
    Map {
        #[command(subcommand)]
        command: MapCommand,
    },
}

pub fn run() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = dispatch(cli.command) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("warning: failed to install logger: {}", err);
    }
}

fn dispatch(command: Command) -> Result<(), String> {
    match command {
        Command::Run {
            map,
            config,
            rovers,
            policy,
            loss_rate,
            seed,
            cycles,
            max_time,
            quad_clamp,
            report,
        } => {
            let mut sim_config = match config {
                Some(path) => SimConfig::load(&path).map_err(|e| e.to_string())?,
                None => SimConfig::default(),
            };
            if let Some(rovers) = rovers {
                sim_config.rover_count = rovers;
            }
            if let Some(policy) = policy {
                sim_config.policy = policy;
            }
            if let Some(loss_rate) = loss_rate {
                sim_config.loss_rate = loss_rate;
            }
            if seed.is_some() {
                sim_config.seed = seed;
            }
            if let Some(max_time) = max_time {
                sim_config.max_sim_time = max_time;
            }
            sim_config.clamp_merges_to_quad |= quad_clamp;

            let world = load_map(map.as_deref(), &sim_config)?;
            run_cycles(sim_config, &world, cycles, report)
        }
        Command::Policies => {
            run_policies();
            Ok(())
        }
        Command::Map { command } => run_map(command),
    }
}

/// The given map file, or the built-in map sized and targeted by `config`.
pub(crate) fn load_map(path: Option<&Path>, config: &SimConfig) -> Result<ObstacleMap, String> {
    match path {
        Some(path) => ObstacleMap::load(path).map_err(|e| e.to_string()),
        None => Ok(ObstacleMap {
            width: config.world_width,
            height: config.world_height,
            target: config.target,
            ..default_map()
        }),
    }
}

fn run_cycles(
    config: SimConfig,
    world: &ObstacleMap,
    cycles: u32,
    write_report: bool,
) -> Result<(), String> {
    config.validate().map_err(|e| e.to_string())?;
    world.validate().map_err(|e| e.to_string())?;
    if cycles == 0 {
        return Err("at least one cycle is required".into());
    }

    let mut store = ReportStore::new(config.clone());
    for cycle in 0..cycles {
        let mut cycle_config = config.clone();
        cycle_config.seed = config.seed.map(|seed| seed.wrapping_add(cycle as u64));

        let mut rng = match cycle_config.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ START_SEED_SALT),
            None => StdRng::from_entropy(),
        };
        let starts = world
            .starts_for(config.rover_count, config.initial_clearance, &mut rng)
            .map_err(|e| e.to_string())?;

        let started_at = Instant::now();
        let mut sim = Simulation::new(cycle_config, world, &starts).map_err(|e| e.to_string())?;
        sim.run();
        let report = sim.report(cycle, started_at);
        print_run(&report);
        store.push(report);
    }

    if cycles > 1 {
        let (useful, wasted) = store.comm_totals();
        println!(
            "all cycles: {} useful / {} not useful communications",
            useful, wasted
        );
    }

    if write_report {
        let path = save_report(&store).map_err(|e| format!("failed to write report: {}", e))?;
        println!("report written to {}", path.display());
    }
    Ok(())
}

fn print_run(report: &RunReport) {
    let seed = report
        .seed
        .map(|s| s.to_string())
        .unwrap_or_else(|| "random".to_string());
    println!(
        "cycle {} (policy {}, seed {})",
        report.cycle + 1,
        report.policy,
        seed
    );
    println!(
        "  {:<6} {:>12} {:>9} {:>9} {:>7} {:>11} {:>6}",
        "rover", "start", "time[s]", "moved[m]", "useful", "not-useful", "known"
    );
    for rover in &report.rovers {
        let time = rover
            .elapsed_time_to_target
            .map(|t| format!("{:.1}", t))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<6} {:>12} {:>9} {:>9.1} {:>7} {:>11} {:>6}",
            rover.id,
            format!("({:.0}, {:.0})", rover.start.x, rover.start.y),
            time,
            rover.moved_distance_m,
            rover.useful_comms,
            rover.not_useful_comms,
            rover.known_obstacles
        );
    }

    if report.all_reached {
        println!("  all rovers reached the target after {:.1}s", report.sim_time);
    } else {
        println!(
            "  stopped at {:.1}s with rovers still underway",
            report.sim_time
        );
    }
    if let Some(mean) = report.mean_time_to_target() {
        println!("  mean time to target: {:.1}s", mean);
    }
    println!("  useful communications: {}", report.useful_comms);
    println!("  not useful communications: {}", report.not_useful_comms);
    println!(
        "  messages: {} sent, {} delivered, {} lost, {} in flight",
        report.channel.sent, report.channel.delivered, report.channel.lost, report.channel.in_flight
    );
    println!("  elapsed real time: {:.2}s", report.wall_clock_secs);
}

fn run_policies() {
    for policy in CommPolicy::ALL {
        let gate = if policy.uses_gate() { " (gated)" } else { "" };
        println!(
            "{:<20} {:<8} {}{}",
            policy.label(),
            policy.alias(),
            policy.summary(),
            gate
        );
    }
}
