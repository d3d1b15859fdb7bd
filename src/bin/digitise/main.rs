//! Captures points with the tracker, then registers them against a helmet
//! template.

mod prompt;

use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use opm_digitise::{
    acceptance::DEFAULT_LIMIT,
    args::{
        CaptureCommand, DigitiseArgs,
        DigitiseCommand::{Capture, InitConfig, Layout, Ports, Register},
        LayoutCommand, RegisterCommand,
    },
    config::DigitiseConfig,
    coregistration::{fit_device_to_head, fit_fiducials, to_template_space, LabelledFit},
    point_set::PointSet,
    receiver_session::ReceiverSession,
    runner::SchemeRunner,
    sensor_layout::{convert_depths, read_depths, ProbeGeometry, SensorLayout},
    simulated_tracker::SimulatedTracker,
    template::HelmetTemplate,
    tracker_link::{SerialLink, TrackerLink},
};
use prompt::PromptObserver;
use serde::Serialize;
use std::{error::Error, fs, process::ExitCode};

// Example:
// cargo run --bin digitise -- --config scheme.ron capture --port /dev/ttyUSB0 --out points.csv
// cargo run --bin digitise -- register --template helmet.ron --points points.csv --out aligned.csv

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = DigitiseArgs::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: DigitiseArgs) -> Result<(), Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => DigitiseConfig::from_path(path)?,
        None => DigitiseConfig::standard(),
    };

    match args.command {
        Ports => list_ports(),
        Capture(cmd) => capture(&config, cmd),
        Register(cmd) => register(cmd),
        Layout(cmd) => layout(cmd),
        InitConfig(cmd) => {
            config.to_path(&cmd.outfile)?;
            info!("Wrote config to {}", cmd.outfile.display());
            Ok(())
        }
    }
}

fn list_ports() -> Result<(), Box<dyn Error>> {
    let available_ports = SerialLink::available_ports()?;
    println!("Available devices:");
    for port in available_ports {
        println!("\t{}", port.display());
    }
    Ok(())
}

fn capture(config: &DigitiseConfig, cmd: CaptureCommand) -> Result<(), Box<dyn Error>> {
    // Validate the tasks before touching the tracker.
    let scheme = config.scheme()?;
    if scheme.is_empty() {
        warn!("The scheme has no tasks, nothing to digitise");
        return Ok(());
    }

    let link: Box<dyn TrackerLink> = if cmd.simulate {
        info!("Using a simulated tracker");
        Box::new(SimulatedTracker::new().with_random_presses(
            scheme.total_points() * 3,
            DEFAULT_LIMIT,
            0.1,
        ))
    } else {
        let port = cmd.port.as_deref().ok_or("no serial port given")?;
        let session = &config.session;
        Box::new(SerialLink::open(port, session.baud_rate, session.read_timeout())?)
    };

    let mut session = ReceiverSession::new(link, config.session.clone())?;
    session.prepare_for_digitisation()?;

    let mut runner = SchemeRunner::new(session);
    let mut observer = PromptObserver::new(runner.stop_flag(), !cmd.simulate);

    match runner.run(&scheme, &mut observer) {
        Ok(outcome) => {
            if outcome.aborted {
                warn!(
                    "Stopped after {} of {} tasks",
                    outcome.completed_tasks,
                    scheme.len()
                );
            }
            outcome.points.to_path(&cmd.outfile)?;
            info!(
                "Wrote {} points to {}",
                outcome.points.len(),
                cmd.outfile.display()
            );
            Ok(())
        }
        Err(e) => {
            if !e.points.is_empty() {
                e.points.to_path(&cmd.outfile)?;
                warn!(
                    "Saved the {} points captured before the failure to {}",
                    e.points.len(),
                    cmd.outfile.display()
                );
            }
            Err(e.into())
        }
    }
}

fn print_residuals(title: &str, fit: &LabelledFit) {
    println!("{}", title);
    for (label, residual) in fit.residuals() {
        println!("\t{:<10} {:>8.4} {}", label, residual, fit.unit);
    }
    println!("\t{:<10} {:>8.4} {}", "rms", fit.transform.rms_residual(), fit.unit);
}

fn register(cmd: RegisterCommand) -> Result<(), Box<dyn Error>> {
    let template = HelmetTemplate::from_path(&cmd.template)?;
    let points = PointSet::from_path(&cmd.points)?;

    let fit = fit_fiducials(&points, cmd.unit, &template)?;
    print_residuals("Fiducial residuals:", &fit);

    to_template_space(&points, cmd.unit, &fit).to_path(&cmd.outfile)?;
    info!("Wrote points in template space to {}", cmd.outfile.display());
    Ok(())
}

/// What `layout` writes out.
#[derive(Serialize)]
struct LayoutFile {
    layout: SensorLayout,
    device_to_head: Option<LabelledFit>,
}

fn layout(cmd: LayoutCommand) -> Result<(), Box<dyn Error>> {
    let template = HelmetTemplate::from_path(&cmd.template)?;
    let mut depths = read_depths(&cmd.depths)?;
    convert_depths(&mut depths, cmd.depth_unit, template.unit());

    let layout = SensorLayout::project(&template, &depths, &ProbeGeometry::default())?;
    info!("Projected {} sensors", layout.len());

    let device_to_head = match &cmd.points {
        Some(path) => {
            let points = PointSet::from_path(path)?;
            let fit = fit_device_to_head(&layout, &points, cmd.unit)?;
            print_residuals("Sensor residuals:", &fit);
            Some(fit)
        }
        None => None,
    };

    let file = LayoutFile {
        layout,
        device_to_head,
    };
    let text = ron::ser::to_string_pretty(&file, ron::ser::PrettyConfig::default())?;
    fs::write(&cmd.outfile, text)?;
    info!("Wrote layout to {}", cmd.outfile.display());
    Ok(())
}
