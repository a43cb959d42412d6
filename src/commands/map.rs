use std::path::PathBuf;

use clap::{ArgAction, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rover_swarm::{SimConfig, generate_start_positions};
use rover_swarm::modules::geometry::{centroid, polygon_area};

use super::load_map;

#[derive(Subcommand)]
pub enum MapCommand {
    /// Describe a map (defaults to the built-in map)
    Show {
        #[arg(long)]
        map: Option<PathBuf>,
        /// Print the map JSON instead of a summary
        #[arg(long, action = ArgAction::SetTrue, default_value_t = false)]
        json: bool,
    },
    /// Generate random start positions clear of every obstacle
    Starts {
        #[arg(long)]
        map: Option<PathBuf>,
        /// Number of positions
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
        /// Minimum distance from any obstacle
        #[arg(long, default_value_t = 30.0)]
        clearance: f64,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Write a map JSON file, optionally with generated start positions baked in
    Export {
        /// Destination file
        #[arg(long)]
        out: PathBuf,
        /// Source map (defaults to the built-in map)
        #[arg(long)]
        map: Option<PathBuf>,
        /// Generate this many start positions into the file
        #[arg(long)]
        starts: Option<usize>,
        #[arg(long, default_value_t = 30.0)]
        clearance: f64,
        #[arg(long)]
        seed: Option<u64>,
    },
}

pub fn run_map(command: MapCommand) -> Result<(), String> {
    let config = SimConfig::default();
    match command {
        MapCommand::Show { map, json } => {
            let world = load_map(map.as_deref(), &config)?;
            world.validate().map_err(|e| e.to_string())?;
            if json {
                let text = serde_json::to_string_pretty(&world).map_err(|e| e.to_string())?;
                println!("{}", text);
                return Ok(());
            }

            println!(
                "world {}x{}, target ({:.0}, {:.0}), {} obstacles",
                world.width,
                world.height,
                world.target.x,
                world.target.y,
                world.obstacles.len()
            );
            for (index, obstacle) in world.obstacles.iter().enumerate() {
                let center = centroid(obstacle);
                println!(
                    "  #{:<3} {} corners, area {:.0}, centre ({:.0}, {:.0})",
                    index,
                    obstacle.len(),
                    polygon_area(obstacle),
                    center.x,
                    center.y
                );
            }
            if !world.start_positions.is_empty() {
                println!("  {} fixed start positions", world.start_positions.len());
            }
            Ok(())
        }
        MapCommand::Starts {
            map,
            count,
            clearance,
            seed,
        } => {
            let world = load_map(map.as_deref(), &config)?;
            world.validate().map_err(|e| e.to_string())?;
            let mut rng = seeded(seed);
            let starts = generate_start_positions(&world, count, clearance, &mut rng)
                .map_err(|e| e.to_string())?;
            for (index, start) in starts.iter().enumerate() {
                println!("{:>3}: ({:.0}, {:.0})", index + 1, start.x, start.y);
            }
            Ok(())
        }
        MapCommand::Export {
            out,
            map,
            starts,
            clearance,
            seed,
        } => {
            let mut world = load_map(map.as_deref(), &config)?;
            world.validate().map_err(|e| e.to_string())?;
            if let Some(count) = starts {
                let mut rng = seeded(seed);
                world.start_positions = generate_start_positions(&world, count, clearance, &mut rng)
                    .map_err(|e| e.to_string())?;
            }
            world.validate().map_err(|e| e.to_string())?;
            world
                .save(&out)
                .map_err(|e| format!("failed to write {}: {}", out.display(), e))?;
            println!("map written to {}", out.display());
            Ok(())
        }
    }
}

fn seeded(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
