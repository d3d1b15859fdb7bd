//! Streams the stylus position relative to the head reference, for checking
//! the tracker setup before a session.

use clap::Parser;
use env_logger::Env;
use log::{debug, error, info, warn};
use opm_digitise::{
    args::MonitorArgs,
    config::DigitiseConfig,
    receiver_session::{ReceiverSession, SessionConfig, SessionError},
    tracker_link::SerialLink,
};
use std::{error::Error, process::ExitCode};

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = MonitorArgs::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: MonitorArgs) -> Result<(), Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => DigitiseConfig::from_path(path)?.session,
        None => SessionConfig::default(),
    };

    let link = SerialLink::open(&args.port, config.baud_rate, config.read_timeout())?;
    let mut session = ReceiverSession::new(link, config)?;
    session.prepare_for_digitisation()?;
    info!("Press the stylus button to see its position, Ctrl-C to quit");

    let mut taken = 0;
    while args.samples.map_or(true, |n| taken < n) {
        match session.sample() {
            Ok(sample) => {
                let p = sample.position;
                info!(
                    "stylus ({:>8.2}, {:>8.2}, {:>8.2}), receivers {:.2} apart",
                    p.x, p.y, p.z, sample.receiver_distance
                );
                taken += 1;
            }
            Err(SessionError::Timeout) => debug!("Waiting for a press"),
            Err(e) if e.is_recoverable() => warn!("Skipping sample: {}", e),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
