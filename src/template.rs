//! Reference layout of a sensor helmet: where each sensor slot sits, which
//! way it points, and where the helmet's own fiducials are.
//!
//! A template is loaded once, from a RON file, and passed by reference to
//! whatever needs it. It is never modified after loading.
//!
//! ```text
//! (
//!     label: ["FL1", "FL2"],
//!     chan_pos: [(0.0, 0.0, 0.1), (0.0, 0.1, 0.0)],
//!     chan_ori: [Normal((0.0, 0.0, 1.0)), Frame(((1.0, 0.0, 0.0), (0.0, 0.0, 1.0), (0.0, 1.0, 0.0)))],
//!     fid_label: ["nasion", "lpa", "rpa"],
//!     fid_pos: [(0.1, 0.0, 0.0), (0.0, 0.08, 0.0), (0.0, -0.08, 0.0)],
//!     unit: "m",
//! )
//! ```

use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::File,
    io::{self, Read},
    path::Path,
};
use thiserror::Error;

use crate::{units::Unit, Vec3};

/// Which way a sensor slot points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ChannelOrientation {
    /// The outward normal of the slot.
    Normal([f64; 3]),
    /// A full orientation frame, one axis per row. The third row is the
    /// outward normal.
    Frame([[f64; 3]; 3]),
}

impl ChannelOrientation {
    /// The outward normal, as stored (not normalised).
    pub fn normal(&self) -> Vec3 {
        match self {
            ChannelOrientation::Normal(n) => Vec3::from(*n),
            ChannelOrientation::Frame(rows) => Vec3::from(rows[2]),
        }
    }
}

/// Errors from building, loading or querying a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// No sensor slot with this label.
    #[error("label {0:?} not found in the helmet template")]
    UnknownLabel(String),

    /// No fiducial with this label.
    #[error("fiducial {0:?} not found in the helmet template")]
    UnknownFiducial(String),

    /// Parallel lists of different lengths.
    #[error("template has {expected} labels but {found} entries in {field}")]
    LengthMismatch {
        /// The list that is out of step.
        field: &'static str,
        /// Number of labels.
        expected: usize,
        /// Entries found in the list.
        found: usize,
    },

    /// Labels must be unique.
    #[error("label {0:?} appears more than once in the template")]
    DuplicateLabel(String),

    /// Reading or writing the file failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Returned when serialising the template fails.
    #[error("ron error: {0}")]
    Ron(#[from] ron::Error),

    /// Returned when deserialising the template fails.
    #[error("ron error: {0}")]
    RonSpanned(#[from] ron::de::SpannedError),
}

/// The template as laid out on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TemplateFile {
    label: Vec<String>,
    chan_pos: Vec<[f64; 3]>,
    chan_ori: Vec<ChannelOrientation>,
    fid_label: Vec<String>,
    fid_pos: Vec<[f64; 3]>,
    unit: Unit,
}

/// Read-only helmet layout with label lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TemplateFile", into = "TemplateFile")]
pub struct HelmetTemplate {
    labels: Vec<String>,
    index: HashMap<String, usize>,
    chan_pos: Vec<Vec3>,
    chan_ori: Vec<ChannelOrientation>,
    fid_label: Vec<String>,
    fid_pos: Vec<Vec3>,
    unit: Unit,
}

impl HelmetTemplate {
    /// Checks that the parallel lists line up and that labels are unique.
    pub fn new(
        labels: Vec<String>,
        chan_pos: Vec<Vec3>,
        chan_ori: Vec<ChannelOrientation>,
        fid_label: Vec<String>,
        fid_pos: Vec<Vec3>,
        unit: Unit,
    ) -> Result<Self, TemplateError> {
        let check = |field, expected, found| {
            if expected == found {
                Ok(())
            } else {
                Err(TemplateError::LengthMismatch {
                    field,
                    expected,
                    found,
                })
            }
        };
        check("chan_pos", labels.len(), chan_pos.len())?;
        check("chan_ori", labels.len(), chan_ori.len())?;
        check("fid_pos", fid_label.len(), fid_pos.len())?;

        let mut index = HashMap::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            if index.insert(label.clone(), i).is_some() {
                return Err(TemplateError::DuplicateLabel(label.clone()));
            }
        }

        Ok(Self {
            labels,
            index,
            chan_pos,
            chan_ori,
            fid_label,
            fid_pos,
            unit,
        })
    }

    /// Read a template from the path provided.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        Self::from_reader(File::open(path)?)
    }

    /// Read a template from the [Read]able object provided.
    pub fn from_reader(mut reader: impl Read) -> Result<Self, TemplateError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        let file: TemplateFile = ron::from_str(&text)?;
        HelmetTemplate::try_from(file)
    }

    /// Write the template out to the path provided.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), TemplateError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Unit of every position in the template.
    pub fn unit(&self) -> Unit {
        self.unit
    }

    /// Sensor slot labels, in template order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of sensor slots.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True when the template has no slots.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Position of the slot called `label` in the template's lists.
    pub fn index_of(&self, label: &str) -> Result<usize, TemplateError> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| TemplateError::UnknownLabel(label.to_owned()))
    }

    /// Position of the slot called `label`.
    pub fn channel_position(&self, label: &str) -> Result<Vec3, TemplateError> {
        Ok(self.chan_pos[self.index_of(label)?])
    }

    /// Orientation of the slot called `label`, as stored.
    pub fn channel_orientation(&self, label: &str) -> Result<ChannelOrientation, TemplateError> {
        Ok(self.chan_ori[self.index_of(label)?])
    }

    /// Positions of the slots in `labels`, in the same order. Fails on the
    /// first unknown label rather than returning fewer positions.
    pub fn channel_positions<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<Vec3>, TemplateError> {
        labels
            .iter()
            .map(|l| self.channel_position(l.as_ref()))
            .collect()
    }

    /// Orientations of the slots in `labels`, in the same order.
    pub fn channel_orientations<S: AsRef<str>>(
        &self,
        labels: &[S],
    ) -> Result<Vec<ChannelOrientation>, TemplateError> {
        labels
            .iter()
            .map(|l| self.channel_orientation(l.as_ref()))
            .collect()
    }

    /// Outward normals of the slots in `labels`, as stored. A frame
    /// orientation contributes its third row.
    pub fn channel_normals<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<Vec3>, TemplateError> {
        Ok(self
            .channel_orientations(labels)?
            .iter()
            .map(ChannelOrientation::normal)
            .collect())
    }

    /// Every slot position, in template order.
    pub fn all_positions(&self) -> &[Vec3] {
        &self.chan_pos
    }

    /// Position of the helmet fiducial called `label`.
    pub fn fiducial(&self, label: &str) -> Result<Vec3, TemplateError> {
        self.fid_label
            .iter()
            .position(|l| l == label)
            .map(|i| self.fid_pos[i])
            .ok_or_else(|| TemplateError::UnknownFiducial(label.to_owned()))
    }

    /// Fiducial labels and positions, in template order.
    pub fn fiducials(&self) -> impl Iterator<Item = (&str, Vec3)> {
        self.fid_label
            .iter()
            .map(String::as_str)
            .zip(self.fid_pos.iter().copied())
    }
}

impl TryFrom<TemplateFile> for HelmetTemplate {
    type Error = TemplateError;

    fn try_from(file: TemplateFile) -> Result<Self, Self::Error> {
        HelmetTemplate::new(
            file.label,
            file.chan_pos.into_iter().map(Vec3::from).collect(),
            file.chan_ori,
            file.fid_label,
            file.fid_pos.into_iter().map(Vec3::from).collect(),
            file.unit,
        )
    }
}

impl From<HelmetTemplate> for TemplateFile {
    fn from(t: HelmetTemplate) -> Self {
        TemplateFile {
            label: t.labels,
            chan_pos: t.chan_pos.iter().map(|p| [p.x, p.y, p.z]).collect(),
            chan_ori: t.chan_ori,
            fid_label: t.fid_label,
            fid_pos: t.fid_pos.iter().map(|p| [p.x, p.y, p.z]).collect(),
            unit: t.unit,
        }
    }
}
