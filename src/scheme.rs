//! What to digitise, and in which order.
//!
//! A [`DigitisationScheme`] is an ordered list of [`DigitisationTask`]s built
//! up front. Tasks are validated as they are added, so a bad scheme is caught
//! before the tracker is ever touched.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

use crate::acceptance::DEFAULT_LIMIT;

/// Limit used for head surface points, which are spread further from the
/// head reference than sensors and landmarks.
pub const HEAD_SURFACE_LIMIT: f64 = 50.0;

/// The kinds of points this tool knows how to treat differently. Anything
/// else falls into [`Category::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Optically pumped magnetometer sensor slots.
    Opm,
    /// EEG electrodes.
    Eeg,
    /// Anatomical or mechanical landmarks.
    Fiducial,
    /// Head surface samples.
    Head,
    /// Anything else. Uses the default acceptance limit.
    Other,
}

impl Category {
    /// Maps a free-form category name onto a [`Category`].
    pub fn classify(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "opm" => Category::Opm,
            "eeg" => Category::Eeg,
            "fiducial" | "fiducials" => Category::Fiducial,
            "head" => Category::Head,
            _ => Category::Other,
        }
    }

    /// The acceptance limit used when a task doesn't set its own.
    pub fn default_limit(self) -> f64 {
        match self {
            Category::Head => HEAD_SURFACE_LIMIT,
            _ => DEFAULT_LIMIT,
        }
    }
}

/// How a task collects its points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMode {
    /// One point per label, with accept/undo control.
    Single,
    /// A fixed number of points, all kept.
    Continuous,
}

impl FromStr for TaskMode {
    type Err = SchemeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(TaskMode::Single),
            "continuous" => Ok(TaskMode::Continuous),
            _ => Err(SchemeError::InvalidMode(s.to_owned())),
        }
    }
}

impl fmt::Display for TaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskMode::Single => write!(f, "single"),
            TaskMode::Continuous => write!(f, "continuous"),
        }
    }
}

/// A task definition that couldn't be added to a scheme.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemeError {
    /// The mode is neither `single` nor `continuous`.
    #[error("digitisation mode {0:?} is not implemented, use single or continuous")]
    InvalidMode(String),

    /// A category or label is empty, padded with spaces, or holds a comma or
    /// line break, so it could not be saved and read back unchanged.
    #[error("{0:?} is not a usable category or label")]
    InvalidName(String),

    /// A single-mode task was given no labels.
    #[error("single digitisation of {category:?} needs at least one label")]
    MissingLabels {
        /// The task's category.
        category: String,
    },

    /// A continuous task was not told how many points to take.
    #[error("continuous digitisation of {category:?} needs n_points")]
    MissingPointCount {
        /// The task's category.
        category: String,
    },

    /// A continuous task was asked for zero points.
    #[error("continuous digitisation of {category:?} needs at least one point")]
    ZeroPoints {
        /// The task's category.
        category: String,
    },

    /// The acceptance limit is not a positive, finite distance.
    #[error("acceptance limit {limit} for {category:?} must be positive")]
    InvalidLimit {
        /// The task's category.
        category: String,
        /// The rejected limit.
        limit: f64,
    },
}

/// What a task captures: the labels in order, or how many unlabelled points.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskTarget {
    /// One point per label.
    Labels(Vec<String>),
    /// `n` points, each labelled with the category.
    Count(usize),
}

fn is_usable_name(name: &str) -> bool {
    !name.is_empty() && name.trim() == name && !name.contains([',', '\n', '\r'])
}

/// One validated entry of a scheme. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct DigitisationTask {
    category: String,
    kind: Category,
    target: TaskTarget,
    limit: f64,
}

impl DigitisationTask {
    /// Validates the combination of mode, labels and point count the same way
    /// [`DigitisationScheme::add`] does.
    pub fn new(
        category: &str,
        labels: &[&str],
        mode: TaskMode,
        n_points: Option<usize>,
    ) -> Result<Self, SchemeError> {
        for &name in std::iter::once(&category).chain(labels) {
            if !is_usable_name(name) {
                return Err(SchemeError::InvalidName(name.to_owned()));
            }
        }
        let target = match mode {
            TaskMode::Single if labels.is_empty() => {
                return Err(SchemeError::MissingLabels {
                    category: category.to_owned(),
                })
            }
            TaskMode::Single => TaskTarget::Labels(labels.iter().map(|&l| l.to_owned()).collect()),
            TaskMode::Continuous => match n_points {
                None => {
                    return Err(SchemeError::MissingPointCount {
                        category: category.to_owned(),
                    })
                }
                Some(0) => {
                    return Err(SchemeError::ZeroPoints {
                        category: category.to_owned(),
                    })
                }
                Some(n) => TaskTarget::Count(n),
            },
        };
        let kind = Category::classify(category);
        Ok(Self {
            category: category.to_owned(),
            kind,
            target,
            limit: kind.default_limit(),
        })
    }

    /// Replace the category's default acceptance limit.
    pub fn with_limit(mut self, limit: f64) -> Result<Self, SchemeError> {
        if !(limit.is_finite() && limit > 0.0) {
            return Err(SchemeError::InvalidLimit {
                category: self.category,
                limit,
            });
        }
        self.limit = limit;
        Ok(self)
    }

    /// The category name as given, e.g. `"fiducials"`.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// The classified category.
    pub fn kind(&self) -> Category {
        self.kind
    }

    /// Single for labelled tasks, continuous for counted ones.
    pub fn mode(&self) -> TaskMode {
        match self.target {
            TaskTarget::Labels(_) => TaskMode::Single,
            TaskTarget::Count(_) => TaskMode::Continuous,
        }
    }

    /// Labels or point count.
    pub fn target(&self) -> &TaskTarget {
        &self.target
    }

    /// Number of points the task produces.
    pub fn len(&self) -> usize {
        match &self.target {
            TaskTarget::Labels(labels) => labels.len(),
            TaskTarget::Count(n) => *n,
        }
    }

    /// Always false for a validated task.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum receiver distance for an accepted press.
    pub fn limit(&self) -> f64 {
        self.limit
    }
}

/// A task as written in a configuration file, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Category name, classified with [`Category::classify`].
    pub category: String,
    /// `"single"` or `"continuous"`.
    pub mode: String,
    /// Labels of a single task.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Point count of a continuous task.
    #[serde(default)]
    pub n_points: Option<usize>,
    /// Overrides the category's default acceptance limit.
    #[serde(default)]
    pub limit: Option<f64>,
}

/// An ordered list of tasks, consumed front to back by the
/// [`SchemeRunner`](crate::runner::SchemeRunner).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DigitisationScheme {
    tasks: Vec<DigitisationTask>,
}

impl DigitisationScheme {
    /// An empty scheme.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and appends a task.
    ///
    /// `dig_type` is `"single"` (one point per label) or `"continuous"`
    /// (`n_points` points labelled with the category).
    pub fn add(
        &mut self,
        category: &str,
        labels: &[&str],
        dig_type: &str,
        n_points: Option<usize>,
    ) -> Result<&mut Self, SchemeError> {
        let mode = dig_type.parse()?;
        self.push(DigitisationTask::new(category, labels, mode, n_points)?);
        Ok(self)
    }

    /// Appends a single-mode task.
    pub fn add_single(&mut self, category: &str, labels: &[&str]) -> Result<&mut Self, SchemeError> {
        self.push(DigitisationTask::new(category, labels, TaskMode::Single, None)?);
        Ok(self)
    }

    /// Appends a continuous task.
    pub fn add_continuous(&mut self, category: &str, n_points: usize) -> Result<&mut Self, SchemeError> {
        self.push(DigitisationTask::new(
            category,
            &[],
            TaskMode::Continuous,
            Some(n_points),
        )?);
        Ok(self)
    }

    /// Appends an already validated task.
    pub fn push(&mut self, task: DigitisationTask) -> &mut Self {
        self.tasks.push(task);
        self
    }

    /// Builds a scheme from configuration file entries. The first bad entry
    /// fails the whole scheme.
    pub fn from_descriptors(descriptors: &[TaskDescriptor]) -> Result<Self, SchemeError> {
        let mut scheme = Self::new();
        for d in descriptors {
            let labels: Vec<&str> = d.labels.iter().map(String::as_str).collect();
            let mut task = DigitisationTask::new(&d.category, &labels, d.mode.parse()?, d.n_points)?;
            if let Some(limit) = d.limit {
                task = task.with_limit(limit)?;
            }
            scheme.push(task);
        }
        Ok(scheme)
    }

    /// Tasks in run order.
    pub fn tasks(&self) -> &[DigitisationTask] {
        &self.tasks
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True when no task has been added.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Total number of points a full run produces.
    pub fn total_points(&self) -> usize {
        self.tasks.iter().map(DigitisationTask::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_ordered_scheme() {
        let mut scheme = DigitisationScheme::new();
        scheme
            .add("fiducials", &["lpa", "rpa", "nasion"], "single", None)
            .unwrap()
            .add("OPM", &["FL52", "FL61"], "single", None)
            .unwrap()
            .add("head", &[], "continuous", Some(60))
            .unwrap();

        let categories: Vec<_> = scheme.tasks().iter().map(|t| t.kind()).collect();
        assert_eq!(
            categories,
            [Category::Fiducial, Category::Opm, Category::Head]
        );
        assert_eq!(scheme.total_points(), 65);
        assert_eq!(scheme.tasks()[2].mode(), TaskMode::Continuous);
    }

    #[test]
    fn rejects_unknown_mode() {
        let mut scheme = DigitisationScheme::new();

        let err = scheme.add("head", &[], "sweep", Some(3)).unwrap_err();

        assert_eq!(err, SchemeError::InvalidMode("sweep".to_owned()));
        assert!(scheme.is_empty());
    }

    #[test]
    fn continuous_needs_point_count() {
        let mut scheme = DigitisationScheme::new();

        assert!(matches!(
            scheme.add("head", &[], "continuous", None),
            Err(SchemeError::MissingPointCount { .. })
        ));
        assert!(matches!(
            scheme.add_continuous("head", 0),
            Err(SchemeError::ZeroPoints { .. })
        ));
    }

    #[test]
    fn single_needs_labels() {
        let mut scheme = DigitisationScheme::new();

        assert!(matches!(
            scheme.add_single("EEG", &[]),
            Err(SchemeError::MissingLabels { .. })
        ));
    }

    #[test]
    fn rejects_names_that_would_not_read_back() {
        let mut scheme = DigitisationScheme::new();

        for labels in [&["lpa", ""][..], &[" rpa"][..], &["nasion "][..], &["FL1,FL2"][..]] {
            assert!(matches!(
                scheme.add_single("fiducials", labels),
                Err(SchemeError::InvalidName(_))
            ));
        }
        assert_eq!(
            scheme.add_continuous("", 10).unwrap_err(),
            SchemeError::InvalidName(String::new())
        );
        assert!(scheme.is_empty());
    }

    #[test]
    fn head_category_gets_wider_limit() {
        let head = DigitisationTask::new("head", &["vertex"], TaskMode::Single, None).unwrap();
        let opm = DigitisationTask::new("OPM", &["FL1"], TaskMode::Single, None).unwrap();

        assert_eq!(head.limit(), HEAD_SURFACE_LIMIT);
        assert_eq!(opm.limit(), DEFAULT_LIMIT);
    }

    #[test]
    fn classify_falls_back_to_other() {
        assert_eq!(Category::classify("Fiducials"), Category::Fiducial);
        assert_eq!(Category::classify("eeg"), Category::Eeg);
        assert_eq!(Category::classify("helmet"), Category::Other);
    }

    #[test]
    fn descriptors_from_ron() {
        let text = r#"[
            (category: "fiducials", mode: "single", labels: ["lpa", "rpa", "nasion"]),
            (category: "head", mode: "continuous", n_points: Some(5), limit: Some(40.0)),
        ]"#;
        let descriptors: Vec<TaskDescriptor> = ron::from_str(text).unwrap();

        let scheme = DigitisationScheme::from_descriptors(&descriptors).unwrap();

        assert_eq!(scheme.len(), 2);
        assert_eq!(
            scheme.tasks()[0].target(),
            &TaskTarget::Labels(vec!["lpa".into(), "rpa".into(), "nasion".into()])
        );
        assert_eq!(scheme.tasks()[1].limit(), 40.0);
    }

    #[test]
    fn bad_descriptor_limit_is_rejected() {
        let descriptors = [TaskDescriptor {
            category: "OPM".into(),
            mode: "single".into(),
            labels: vec!["FL1".into()],
            n_points: None,
            limit: Some(-1.0),
        }];

        assert!(matches!(
            DigitisationScheme::from_descriptors(&descriptors),
            Err(SchemeError::InvalidLimit { .. })
        ));
    }
}
