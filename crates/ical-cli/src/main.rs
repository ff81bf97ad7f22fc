use std::{error::Error, fs, path::Path, path::PathBuf};

use clap::Parser;
use ical_core::config::save_cameras;
use ical_core::{CameraConfig, Rig};
use ical_pipeline::observer::{load_recording, ReplayCollector};
use ical_pipeline::session::{CalibrationSession, SessionConfig};
use ical_pipeline::RunOutcome;
use log::{info, warn};
use serde::Serialize;

/// Calibrate cameras from recorded target observations.
#[derive(Debug, Parser)]
#[command(author, version, about = "Camera/target calibration session")]
struct Args {
    /// Camera description file (YAML).
    #[arg(long)]
    cameras: PathBuf,

    /// Target description file (YAML).
    #[arg(long)]
    targets: PathBuf,

    /// Recorded observations (JSON).
    #[arg(long)]
    observations: PathBuf,

    /// Optional JSON session configuration. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Accept the calibration if the final cost per observation does not exceed this.
    #[arg(long, default_value_t = 1e-3)]
    allowable_cost: f64,

    /// Write the calibrated cameras here, in the camera description format.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Fail on unreadable description files instead of continuing without them.
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Serialize)]
struct CliReport {
    accepted: bool,
    outcome: RunOutcome,
    cameras: Vec<CameraConfig>,
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn Error>> {
    let data = fs::read_to_string(path)?;
    let value = serde_json::from_str(&data)?;
    Ok(value)
}

fn load_rig(args: &Args) -> Result<Rig, Box<dyn Error>> {
    if args.strict {
        return Ok(Rig::load(&args.cameras, &args.targets)?);
    }
    let (rig, errors) = Rig::load_lenient(&args.cameras, &args.targets);
    if !errors.is_empty() {
        warn!("continuing with {} unreadable description file(s)", errors.len());
    }
    Ok(rig)
}

fn calibrate_from_files(args: &Args) -> Result<CliReport, Box<dyn Error>> {
    let rig = load_rig(args)?;
    let recording = load_recording(&args.observations)?;
    let config = match &args.config {
        Some(path) => load_json_file::<SessionConfig>(path)?,
        None => SessionConfig::default(),
    };

    let camera_names: Vec<String> = rig.cameras.iter().map(|c| c.name.clone()).collect();
    let mut session = CalibrationSession::new(rig);
    session.config = config;
    for name in &camera_names {
        session.set_collector(
            name.as_str(),
            Box::new(ReplayCollector::from_recording(&recording, name)),
        );
    }

    session.start()?;
    for scene in recording.scenes() {
        session.advance_scene(scene)?;
        let report = session.collect_observations()?;
        for (camera, err) in report.rejected() {
            warn!("scene {scene}: camera {camera} rejected: {err}");
        }
    }
    info!("collected {} observations", session.total_observations());

    let outcome = session.run(args.allowable_cost)?;
    let cameras = session.save()?;
    if let Some(path) = &args.output {
        save_cameras(path, &session.rig().cameras)?;
        info!("wrote calibrated cameras to {}", path.display());
    }

    Ok(CliReport {
        accepted: outcome.is_accepted(),
        outcome,
        cameras,
    })
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match try_main() {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

fn try_main() -> Result<bool, Box<dyn Error>> {
    let args = Args::parse();
    let report = calibrate_from_files(&args)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.accepted)
}
