//! Sensor positions adjusted for how deep each sensor sits in its sleeve.
//!
//! Each helmet slot holds a sleeve of fixed length. A sensor pushed further
//! in sits closer to the scalp, so its template position is moved along the
//! slot's outward normal by `-(sleeve_length - (depth + offset))`. Depths come
//! from caliper measurements, usually recorded in millimetres as a two column
//! `sensor,depth` table.

use log::{debug, warn};
use nom::{
    bytes::complete::{tag, take_till1},
    combinator::{all_consuming, map},
    sequence::separated_pair,
    Finish, IResult,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs::File,
    io::{self, BufRead, BufReader, Read},
    path::Path,
};
use thiserror::Error;

use crate::{
    point_set::number_field,
    template::{HelmetTemplate, TemplateError},
    units::Unit,
    Mat3, Vec3,
};

const DEPTH_HEADER: &str = "sensor,depth";

/// How far a normal may be from unit length before it is reported.
const NORMAL_TOLERANCE: f64 = 1e-6;

/// Physical dimensions of the sensor holder, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeGeometry {
    /// Length of the sleeve the sensor slides into.
    pub sleeve_length: f64,
    /// Distance from the measured edge to the sensitive point.
    pub offset: f64,
}

impl Default for ProbeGeometry {
    fn default() -> Self {
        Self {
            sleeve_length: 0.075,
            offset: 0.040,
        }
    }
}

impl ProbeGeometry {
    /// The same geometry, expressed in `unit`.
    pub fn in_unit(&self, unit: Unit) -> Self {
        let k = Unit::M.factor_to(unit);
        Self {
            sleeve_length: self.sleeve_length * k,
            offset: self.offset * k,
        }
    }

    /// Signed distance to move a sensor measured at `depth` along its
    /// outward normal. All three lengths share a unit.
    pub fn shift(&self, depth: f64) -> f64 {
        -(self.sleeve_length - (depth + self.offset))
    }
}

/// One caliper reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthMeasurement {
    /// Template label of the slot.
    pub label: String,
    /// Depth as measured with the caliper.
    pub depth: f64,
}

impl DepthMeasurement {
    /// A measurement for the slot called `label`.
    pub fn new(label: &str, depth: f64) -> Self {
        Self {
            label: label.to_owned(),
            depth,
        }
    }
}

/// Errors from projecting a layout or reading a depth table.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// Wraps the template's lookup failures.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// A slot was measured twice.
    #[error("sensor {0:?} has more than one depth measurement")]
    DuplicateMeasurement(String),

    /// Reading the depth table failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A row is not `sensor,depth` with a finite depth.
    #[error("line {line}: cannot parse {content:?}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// The offending line.
        content: String,
    },
}

/// Projected sensor positions and their outward unit normals, in the
/// template's unit and order of the measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorLayout {
    /// Slot labels, one per measurement.
    pub labels: Vec<String>,
    /// Adjusted positions.
    pub chan_pos: Vec<Vec3>,
    /// Unit outward normals. Zero for a slot with a zero normal.
    pub chan_ori: Vec<Vec3>,
    /// Same unit as the template.
    pub unit: Unit,
}

impl SensorLayout {
    /// Move every measured slot of `template` along its normal.
    ///
    /// `measurements` are in the template's unit. `geometry` is in metres and
    /// is converted here. A label missing from the template fails the whole
    /// projection.
    pub fn project(
        template: &HelmetTemplate,
        measurements: &[DepthMeasurement],
        geometry: &ProbeGeometry,
    ) -> Result<Self, LayoutError> {
        let geometry = geometry.in_unit(template.unit());
        let mut seen = HashSet::with_capacity(measurements.len());
        let mut labels = Vec::with_capacity(measurements.len());
        let mut chan_pos = Vec::with_capacity(measurements.len());
        let mut chan_ori = Vec::with_capacity(measurements.len());

        for m in measurements {
            if !seen.insert(m.label.as_str()) {
                return Err(LayoutError::DuplicateMeasurement(m.label.clone()));
            }
            let pos = template.channel_position(&m.label)?;
            let normal = template.channel_orientation(&m.label)?.normal();

            let norm = normal.norm();
            let (new_pos, unit_normal) = if norm == 0.0 {
                warn!("{} has a zero normal, leaving it at its template position", m.label);
                (pos, Vec3::zeros())
            } else {
                if (norm - 1.0).abs() > NORMAL_TOLERANCE {
                    warn!("{} normal has length {}, normalising", m.label, norm);
                }
                let n = normal / norm;
                (pos + n * geometry.shift(m.depth), n)
            };

            debug!("{}: depth {} moves {:?} to {:?}", m.label, m.depth, pos, new_pos);
            labels.push(m.label.clone());
            chan_pos.push(new_pos);
            chan_ori.push(unit_normal);
        }

        Ok(Self {
            labels,
            chan_pos,
            chan_ori,
            unit: template.unit(),
        })
    }

    /// Number of projected sensors.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True when no sensor was projected.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Adjusted position of `label`, if it was measured.
    pub fn position(&self, label: &str) -> Option<Vec3> {
        self.labels
            .iter()
            .position(|l| l == label)
            .map(|i| self.chan_pos[i])
    }

    /// Orientation frames for every sensor, rows `[e_x, e_y, normal]`.
    pub fn frames(&self) -> Vec<Mat3> {
        self.chan_ori.iter().map(normal_to_frame).collect()
    }
}

/// Completes a unit normal into an orthonormal frame whose rows are
/// `[e_x, e_y, normal]`. `e_x` is the world x axis made orthogonal to the
/// normal, or the world y axis when the normal lies close to the x axis.
pub fn normal_to_frame(normal: &Vec3) -> Mat3 {
    if normal.norm() == 0.0 {
        return Mat3::zeros();
    }
    let o = normal.normalize();
    let seed = if o.x.abs() > 0.9 {
        Vec3::y()
    } else {
        Vec3::x()
    };
    let e_x = (seed - o * seed.dot(&o)).normalize();
    let e_y = o.cross(&e_x);
    Mat3::from_rows(&[e_x.transpose(), e_y.transpose(), o.transpose()])
}

/// Read a depth table from the path provided.
pub fn read_depths(path: impl AsRef<Path>) -> Result<Vec<DepthMeasurement>, LayoutError> {
    read_depths_from(File::open(path)?)
}

/// Read a `sensor,depth` table. The header row is optional; blank lines are
/// skipped. Depths are returned as written.
pub fn read_depths_from(reader: impl Read) -> Result<Vec<DepthMeasurement>, LayoutError> {
    let mut out = Vec::new();
    for (i, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || (i == 0 && trimmed == DEPTH_HEADER) {
            continue;
        }
        let measurement = match all_consuming(depth_row)(trimmed).finish() {
            Ok((_, m)) => m,
            Err(_) => {
                return Err(LayoutError::Parse {
                    line: i + 1,
                    content: line.clone(),
                })
            }
        };
        out.push(measurement);
    }
    Ok(out)
}

fn depth_row(s: &str) -> IResult<&str, DepthMeasurement> {
    map(
        separated_pair(
            map(take_till1(|c| c == ','), str::trim),
            tag(","),
            number_field,
        ),
        |(label, depth)| DepthMeasurement::new(label, depth),
    )(s)
}

/// Convert every depth from `from` into `to`.
pub fn convert_depths(measurements: &mut [DepthMeasurement], from: Unit, to: Unit) {
    let k = from.factor_to(to);
    for m in measurements {
        m.depth *= k;
    }
}
