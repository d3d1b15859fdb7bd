//! Commandline argument parser using clap for the digitise and monitor tools

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::units::Unit;

/// Arguments of the digitise tool
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct DigitiseArgs {
    /// RON config with session settings and the digitisation tasks. Without
    /// one, the fiducials and 60 head points are captured with default
    /// settings
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    /// Which step to perform
    pub command: DigitiseCommand,
}

/// The steps of a digitisation session, in the order they are usually run
#[derive(Debug, Subcommand, Clone)]
pub enum DigitiseCommand {
    /// List the serial devices on this machine
    Ports,

    /// Capture points with the tracker and write them to a table
    Capture(CaptureCommand),

    /// Fit the digitised fiducials onto a helmet template
    Register(RegisterCommand),

    /// Build a depth-adjusted sensor layout from caliper measurements
    Layout(LayoutCommand),

    /// Write the default config to a file, as a starting point
    InitConfig(InitConfigCommand),
}

/// Arguments of `capture`
#[derive(Debug, Args, Clone)]
pub struct CaptureCommand {
    /// Serial device the tracker is connected to
    #[arg(short, long, required_unless_present = "simulate")]
    pub port: Option<String>,

    /// Filename for the point table to be written to
    #[arg(short = 'o', long = "out")]
    pub outfile: PathBuf,

    /// Use a simulated tracker with random presses instead of a serial port
    #[arg(long)]
    pub simulate: bool,
}

/// Arguments of `register`
#[derive(Debug, Args, Clone)]
pub struct RegisterCommand {
    /// Helmet template, in RON
    #[arg(short, long)]
    pub template: PathBuf,

    /// Point table written by `capture`
    #[arg(short = 'i', long = "points")]
    pub points: PathBuf,

    /// Unit of the point table
    #[arg(short, long, default_value = "cm")]
    pub unit: Unit,

    /// Filename for the points in template space to be written to
    #[arg(short = 'o', long = "out")]
    pub outfile: PathBuf,
}

/// Arguments of `layout`
#[derive(Debug, Args, Clone)]
pub struct LayoutCommand {
    /// Helmet template, in RON
    #[arg(short, long)]
    pub template: PathBuf,

    /// Table of `sensor,depth` caliper measurements
    #[arg(short, long)]
    pub depths: PathBuf,

    /// Unit of the depth measurements
    #[arg(long, default_value = "mm")]
    pub depth_unit: Unit,

    /// Point table with digitised OPM sensors. When given, the device to
    /// head transform is fitted as well
    #[arg(short = 'i', long = "points")]
    pub points: Option<PathBuf>,

    /// Unit of the point table
    #[arg(short, long, default_value = "cm")]
    pub unit: Unit,

    /// Filename for the layout to be written to, in RON
    #[arg(short = 'o', long = "out")]
    pub outfile: PathBuf,
}

/// Arguments of `init-config`
#[derive(Debug, Args, Clone)]
pub struct InitConfigCommand {
    /// Filename for the config to be written to
    #[arg(short = 'o', long = "out")]
    pub outfile: PathBuf,
}

/// Arguments of the live monitor
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct MonitorArgs {
    /// Serial device the tracker is connected to
    #[arg(short, long)]
    pub port: String,

    /// RON config; only its session settings are used
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Stop after this many samples
    #[arg(short = 'n', long)]
    pub samples: Option<usize>,
}
