use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::Context;
use clap::Parser;
use nbody::{
    BatchRequest, Coords, SimulationConfig, Universe,
    config::{Dimensions, Preset},
    presets::{self, Scenario},
    run_sim_loop,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Headless Barnes-Hut N-body simulation
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML format)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Simulate in two or three dimensions (overrides config file)
    #[arg(short, long, value_enum)]
    dimensions: Option<Dimensions>,

    /// Initial distribution of bodies (overrides config file)
    #[arg(short, long, value_enum)]
    preset: Option<Preset>,

    /// Number of bodies to generate (overrides config file)
    #[arg(short = 'n', long, value_name = "COUNT")]
    bodies: Option<usize>,

    /// Ticks to simulate (overrides config file)
    #[arg(short, long, value_name = "COUNT")]
    ticks: Option<u64>,

    /// Random seed for body generation
    #[arg(short, long, value_name = "SEED")]
    seed: Option<u64>,

    /// Write the effective configuration to FILE and exit
    #[arg(long, value_name = "FILE")]
    write_config: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut SimulationConfig) {
        if let Some(dimensions) = self.dimensions {
            config.scenario.dimensions = dimensions;
        }
        if let Some(preset) = self.preset {
            config.scenario.preset = preset;
        }
        if let Some(bodies) = self.bodies {
            config.scenario.body_count = bodies;
        }
        if let Some(ticks) = self.ticks {
            config.run.ticks = ticks;
        }
        if let Some(seed) = self.seed {
            config.scenario.seed = seed;
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    if let Some(path) = &args.write_config {
        config.save(path)?;
        log::info!("wrote configuration to {}", path.display());
        return Ok(());
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.scenario.seed);
    let g = config.physics.gravitational_constant;
    match presets::build(&config.scenario, g, &mut rng)? {
        Scenario::Two(bodies) => run(&config, bodies),
        Scenario::Three(bodies) => run(&config, bodies),
    }
}

fn run<P: Coords>(config: &SimulationConfig, bodies: Vec<nbody::Body<P>>) -> anyhow::Result<()> {
    let universe = Universe::new(config.physics, bodies)?;
    log::info!(
        "{:?} {:?}: {} bodies on {} threads, dt = {}, theta = {}",
        config.scenario.preset,
        config.scenario.dimensions,
        universe.len(),
        universe.num_threads(),
        config.physics.time_step,
        config.physics.theta,
    );

    let exchange = Arc::new(BatchRequest::new());
    let token = Arc::new(AtomicBool::new(false));
    let max_ticks = config.run.ticks;

    let handle = {
        let exchange = exchange.clone();
        let token = token.clone();
        thread::Builder::new()
            .name("nbody-sim".to_owned())
            .spawn(move || run_sim_loop(universe, exchange, token, Some(max_ticks)))
            .context("failed to spawn the simulation thread")?
    };

    let interval = Duration::from_millis(config.run.report_interval_ms);
    while !handle.is_finished() {
        thread::sleep(interval);
        let frame = exchange.sample();
        let stats = &frame.stats;
        log::info!(
            "tick {}: {} bodies, center of mass {:?}, variance {:?}, ln|F| {:.3} ± {:.3}",
            frame.generation,
            stats.count,
            stats.center_of_mass,
            stats.variance,
            stats.mean_log_force,
            stats.variance_log_force.sqrt(),
        );
    }

    token.store(true, Ordering::Relaxed);
    let (universe, summary) = handle
        .join()
        .map_err(|_| anyhow::anyhow!("simulation thread panicked"))?;

    log::info!(
        "finished after {} ({} relinks, {} root reinserts, {} branches)",
        universe.elapsed(),
        summary.relinks,
        summary.root_reinserts,
        universe.tree().branch_count(),
    );
    if log::log_enabled!(log::Level::Debug) {
        universe.tree().verify().context("tree is inconsistent")?;
    }
    Ok(())
}
