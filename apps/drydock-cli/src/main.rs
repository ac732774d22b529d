use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use drydock_common::Transform;
use drydock_kernel::{
    ComponentSlot, ContainmentType, Entity, EntityKind, EntitySpec, OptionBits, Station,
    StationIndex, World, WorldEvent, Zone, COMPONENT_ACTIVE,
};
use drydock_sched::{ManualScheduler, Scheduler, WorkerPool};
use drydock_tasks::{DestroyConfig, DestroyShipTask, DeviceStore, TaskContext};
use glam::{Quat, Vec3};
use tracing_subscriber::EnvFilter;

const DEMO_ZONE: &str = "space_tatooine";

#[derive(Parser)]
#[command(name = "drydock-cli", about = "CLI tool for drydock ship destruction sequences")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Print the effective sequence config as JSON
    Config {
        /// JSON config file; unset fields keep their defaults
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Destroy a demo ship and report what the sequence did
    Run {
        /// JSON config file; unset fields keep their defaults
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// RNG seed, overrides the config file
        #[arg(short, long)]
        seed: Option<u64>,
        /// Number of occupants aboard the ship
        #[arg(short, long, default_value = "2")]
        occupants: usize,
        /// Spawn the ship without an owner
        #[arg(long)]
        no_owner: bool,
        /// Persistence level of the ship (0 = ephemeral)
        #[arg(short, long, default_value = "1")]
        persistence: u8,
        /// Run on a worker pool in wall-clock time instead of virtual time
        #[arg(long)]
        realtime: bool,
        /// Worker threads for --realtime
        #[arg(long, default_value = "4")]
        workers: usize,
        /// Print the world event log as JSON lines
        #[arg(long)]
        json: bool,
    },
}

struct Demo {
    world: Arc<World>,
    ship: Arc<Entity>,
    crew: Vec<Arc<Entity>>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Info => {
            println!("drydock-cli v{}", env!("CARGO_PKG_VERSION"));
            let defaults = DestroyConfig::default();
            println!(
                "sequence: relocate after {}ms, transfers after {}ms + [0, {})ms",
                defaults.relocate_delay_ms, defaults.transfer_delay_ms, defaults.transfer_jitter_ms
            );
        }
        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Run {
            config,
            seed,
            occupants,
            no_owner,
            persistence,
            realtime,
            workers,
            json,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(seed) = seed {
                config.seed = Some(seed);
            }
            let demo = build_demo(occupants, !no_owner, persistence)?;
            println!(
                "Destroying ship {} ({} occupants, owner={}, persistence={persistence})",
                demo.ship.id(),
                demo.crew.len(),
                !no_owner
            );

            if realtime {
                run_realtime(&demo, config, workers)?;
            } else {
                run_virtual(&demo, config);
            }
            report(&demo, json)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<DestroyConfig> {
    let Some(path) = path else {
        return Ok(DestroyConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn build_demo(occupants: usize, owned: bool, persistence: u8) -> anyhow::Result<Demo> {
    let world = World::new();
    let stations = StationIndex::new(vec![
        Station::new("Mos Eisley Orbital", "neutral", Vec3::new(-1200.0, 300.0, 80.0)),
        Station::new("Kuat Relay", "neutral", Vec3::new(4000.0, -2500.0, 0.0)),
        Station::new("Imperial Picket", "imperial", Vec3::new(100.0, 100.0, 100.0)),
    ]);
    world.add_zone(Zone::new(DEMO_ZONE).with_lookup(Arc::new(stations)));
    world.add_zone(Zone::new("tatooine"));

    let mut ship_spec = EntitySpec::new(EntityKind::Ship)
        .in_zone(DEMO_ZONE)
        .persistence(persistence)
        .with_options(OptionBits::WINGS_OPEN)
        .with_component(ComponentSlot::Booster, COMPONENT_ACTIVE)
        .with_transform(Transform {
            position: Vec3::new(150.0, 20.0, -40.0),
            rotation: Quat::from_rotation_y(0.6),
        });
    if owned {
        let owner = world.spawn(EntitySpec::new(EntityKind::Creature).in_zone(DEMO_ZONE))?;
        let device = world.spawn(
            EntitySpec::new(EntityKind::ShipControlDevice)
                .persistence(1)
                .stored_at("tatooine", Vec3::new(3528.0, 5.0, -4804.0)),
        )?;
        ship_spec = ship_spec.owned_by(owner.id()).controlled_by(device.id());
    }
    let ship = world.spawn(ship_spec)?;

    let turret = world.spawn(
        EntitySpec::new(EntityKind::Fixture)
            .in_zone(DEMO_ZONE)
            .parented_to(ship.id(), ContainmentType::Contained)
            .with_transform(Transform {
                position: Vec3::new(0.0, 2.0, -3.0),
                rotation: Quat::from_rotation_x(-0.4),
            }),
    )?;

    let mut crew = Vec::with_capacity(occupants);
    for index in 0..occupants {
        // Every other occupant mans the turret.
        let (parent, containment) = if index % 2 == 0 {
            (ship.id(), ContainmentType::Onboard)
        } else {
            (turret.id(), ContainmentType::Slotted)
        };
        let member = world.spawn(
            EntitySpec::new(EntityKind::Creature)
                .in_zone(DEMO_ZONE)
                .parented_to(parent, containment)
                .with_transform(Transform::at(Vec3::new(index as f32, 1.0, 0.0))),
        )?;
        world.board(&ship, &member);
        crew.push(member);
    }

    world.drain_events();
    world.drain_broadcasts();
    Ok(Demo { world, ship, crew })
}

fn run_virtual(demo: &Demo, config: DestroyConfig) {
    let sched = Arc::new(ManualScheduler::new());
    let scheduler: Arc<dyn Scheduler> = sched.clone();
    let ctx = TaskContext::new(scheduler, Arc::new(DeviceStore), config);
    DestroyShipTask::start(demo.world.weak(demo.ship.id()), ctx);

    let ran = sched.run_until_idle();
    println!("Ran {ran} tasks, virtual clock at {}ms", sched.now().as_millis());
}

fn run_realtime(demo: &Demo, config: DestroyConfig, workers: usize) -> anyhow::Result<()> {
    let horizon = Duration::from_millis(
        config
            .relocate_delay_ms
            .saturating_add(config.transfer_delay_ms)
            .saturating_add(config.transfer_jitter_ms),
    );
    let mut pool = WorkerPool::new(workers).context("starting worker pool")?;
    let scheduler: Arc<dyn Scheduler> = Arc::new(pool.handle());
    let ctx = TaskContext::new(scheduler, Arc::new(DeviceStore), config);
    DestroyShipTask::start(demo.world.weak(demo.ship.id()), ctx);

    println!("Waiting up to {}ms for the sequence", horizon.as_millis());
    let finished = pool.wait_idle(horizon.saturating_add(Duration::from_secs(2)));
    if !finished {
        tracing::warn!(outstanding = pool.outstanding(), "sequence still running, shutting down");
    }
    pool.shutdown();
    Ok(())
}

fn report(demo: &Demo, json: bool) -> anyhow::Result<()> {
    let events = demo.world.events();
    if json {
        for event in &events {
            println!("{}", serde_json::to_string(event)?);
        }
    }

    let broadcasts = demo.world.broadcasts();
    println!("Broadcasts: {}", broadcasts.len());
    for b in &broadcasts {
        println!("  {} reliable={}", b.message.kind(), b.reliable);
    }

    match demo.world.get_object(demo.ship.id()) {
        Some(ship) => {
            let state = ship.lock();
            println!(
                "Ship live at {:?}, destroying={}",
                state.position(),
                state.has_option(OptionBits::DESTROYING)
            );
        }
        None => println!(
            "Ship gone from world, persisted={}",
            demo.world.is_persisted(demo.ship.id())
        ),
    }

    let switched = events
        .iter()
        .filter(|e| matches!(e, WorldEvent::ZoneSwitched { .. }))
        .count();
    println!("Occupants transferred: {switched}/{}", demo.crew.len());
    Ok(())
}
