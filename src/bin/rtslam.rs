//! rtslam demo
//!
//! Builds a map with one constant-velocity robot carrying two sensors, adds
//! some landmarks, runs one motion + predict cycle per robot and prints the
//! resulting map.

use clap::{Parser, ValueEnum};
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rtslam::filter::EkfPredictor;
use rtslam::motion::ConstantVelocity;
use rtslam::{Map, MapConfig, MotionModel, RobotId, SlamResult};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Fill {
    /// Leave the state at zero
    Zero,
    /// x(i) = i, P(i, j) = i + 100 j
    Sequential,
    /// x(i) = i, P(i, i) = i
    Diagonal,
    /// Uniform in [-1, 1)
    Random,
}

#[derive(Debug, Parser)]
#[command(name = "rtslam", about = "Run one SLAM cycle on a demo map")]
struct Args {
    /// JSON map configuration; defaults are used if omitted
    #[arg(long)]
    config: Option<String>,

    /// State vector capacity, overrides the configuration
    #[arg(long)]
    max_size: Option<usize>,

    /// Number of landmarks to initialize
    #[arg(long, default_value_t = 2)]
    landmarks: usize,

    /// Initial contents of the state
    #[arg(long, value_enum, default_value_t = Fill::Diagonal)]
    fill: Fill,

    /// Seed for the random fill
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

/// Robot "SUBMARINE" with sensors "FLEA" and "MARLIN", the latter estimated
fn init_slam(config: MapConfig, model: &ConstantVelocity) -> SlamResult<Map> {
    let mut map = Map::new(config)?;
    let pose_size = map.config().sensor_pose_size;

    if map.unused_states(model.size()) {
        let rob = map.create_robot("SUBMARINE", model.size())?;
        map.create_sensor(rob, "FLEA", false)?;
        if map.unused_states(pose_size) {
            map.create_sensor(rob, "MARLIN", true)?;
        }
    }
    Ok(map)
}

fn init_some_landmarks(map: &mut Map, n: usize) -> SlamResult<()> {
    let size = map.config().landmark_size;
    for i in 0..n {
        if !map.unused_states(size) {
            info!("map full after {} landmarks", i);
            break;
        }
        map.create_landmark(format!("L{}", i))?;
    }
    Ok(())
}

fn main() -> SlamResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => MapConfig::from_file(path)?,
        None => MapConfig::default(),
    };
    if let Some(max_size) = args.max_size {
        config.max_size = max_size;
    }

    println!("\n% ######    WELCOME TO RTSLAM    ######\n");

    let model = ConstantVelocity::default();
    let mut map = init_slam(config, &model)?;
    init_some_landmarks(&mut map, args.landmarks)?;

    match args.fill {
        Fill::Zero => {}
        Fill::Sequential => map.arena_mut().fill_sequential(),
        Fill::Diagonal => map.arena_mut().fill_diagonal(),
        Fill::Random => map.arena_mut().fill_random(&mut StdRng::seed_from_u64(args.seed)),
    }
    map.check_consistency()?;

    let filter = EkfPredictor::new();
    // speed up by 1 m/s along x
    let control = DVector::from_vec(vec![1.0, 0.0, 0.0]);
    let robots: Vec<RobotId> = map.robots().map(|r| r.id()).collect();
    for rob in robots {
        let slot = match map.robot(rob) {
            Some(r) => r.slot(),
            None => continue,
        };
        println!("x  = {}", map.arena().slot_mean(slot).transpose());
        map.step_robot(rob, &model, &control, &filter)?;
        println!("x  = {}", map.arena().slot_mean(slot).transpose());
        info!(robot = %rob, used = map.used_indices().len(), "predicted");
    }

    println!("{}", map);
    println!("\nTHAT'S ALL, WHAT'S WRONG?");
    Ok(())
}
