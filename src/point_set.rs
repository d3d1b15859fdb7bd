//! The growing list of digitised points, and the row table it is saved as.
//!
//! The file format is a plain comma separated table with a header row:
//!
//! ```text
//! category,label,x,y,z
//! fiducials,lpa,-7.12,0.4,1.93
//! head,head,3.5,8.25,10.0
//! ```
//!
//! Rows appear in capture order.

use nalgebra::Matrix3xX;
use nom::{
    bytes::complete::{tag, take_till1},
    character::complete::space0,
    combinator::{all_consuming, map, verify},
    number::complete::double,
    sequence::{delimited, terminated, tuple},
    Finish, IResult,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Read, Write},
    path::Path,
};
use thiserror::Error;

use crate::{scheme::Category, Vec3};

const HEADER: &str = "category,label,x,y,z";

/// A single captured point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitisedPoint {
    /// Category name, as given in the task.
    pub category: String,
    /// Label of the point; for continuous tasks this repeats the category.
    pub label: String,
    /// Position in the head reference frame.
    pub position: Vec3,
}

impl DigitisedPoint {
    /// Builds a point from its parts.
    pub fn new(category: &str, label: &str, position: Vec3) -> Self {
        Self {
            category: category.to_owned(),
            label: label.to_owned(),
            position,
        }
    }

    /// The classified category.
    pub fn kind(&self) -> Category {
        Category::classify(&self.category)
    }
}

/// Errors from reading or writing a point table.
#[derive(Debug, Error)]
pub enum PointFileError {
    /// Reading or writing the file failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A row didn't have the expected five fields.
    #[error("line {line}: cannot parse {content:?}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// The offending line.
        content: String,
    },

    /// A category or label that would not read back the same: empty,
    /// padded with spaces, or holding a comma or line break.
    #[error("{0:?} cannot be written as a table field")]
    UnwritableField(String),
}

/// Ordered, append-only collection of digitised points. Only the scheme
/// runner grows or shrinks it while a session is running.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointSet {
    points: Vec<DigitisedPoint>,
}

impl PointSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, point: DigitisedPoint) {
        self.points.push(point);
    }

    pub(crate) fn pop(&mut self) -> Option<DigitisedPoint> {
        self.points.pop()
    }

    /// Number of kept points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when no point has been kept.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points in capture order.
    pub fn iter(&self) -> impl Iterator<Item = &DigitisedPoint> {
        self.points.iter()
    }

    /// Points in capture order, as a slice.
    pub fn as_slice(&self) -> &[DigitisedPoint] {
        &self.points
    }

    /// Points of one category, in capture order.
    pub fn in_category(&self, kind: Category) -> impl Iterator<Item = &DigitisedPoint> {
        self.points.iter().filter(move |p| p.kind() == kind)
    }

    /// The most recently captured point with `label`.
    pub fn find(&self, label: &str) -> Option<&DigitisedPoint> {
        self.points.iter().rev().find(|p| p.label == label)
    }

    /// All positions as the columns of a 3xN matrix.
    pub fn positions(&self) -> Matrix3xX<f64> {
        Matrix3xX::from_columns(&self.points.iter().map(|p| p.position).collect::<Vec<_>>())
    }

    /// A copy with every position passed through `f`; categories, labels and
    /// order are kept.
    pub fn map_positions(&self, f: impl Fn(&Vec3) -> Vec3) -> Self {
        self.points
            .iter()
            .map(|p| DigitisedPoint {
                position: f(&p.position),
                ..p.clone()
            })
            .collect()
    }

    /// Write the table out to the path provided.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), PointFileError> {
        let mut handle = BufWriter::new(File::create(path)?);
        self.to_writer(&mut handle)?;
        handle.flush()?;
        Ok(())
    }

    /// Write the table out to the [Write]able object provided.
    pub fn to_writer(&self, out: &mut impl Write) -> Result<(), PointFileError> {
        writeln!(out, "{}", HEADER)?;
        for p in &self.points {
            for field in [&p.category, &p.label] {
                if field.is_empty() || field.trim() != field || field.contains([',', '\n', '\r']) {
                    return Err(PointFileError::UnwritableField(field.clone()));
                }
            }
            writeln!(
                out,
                "{},{},{},{},{}",
                p.category, p.label, p.position.x, p.position.y, p.position.z
            )?;
        }
        Ok(())
    }

    /// Read a table from the path provided.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PointFileError> {
        Self::from_reader(File::open(path)?)
    }

    /// Read a table from the [Read]able object provided. The header row is
    /// optional; blank lines are skipped.
    pub fn from_reader(reader: impl Read) -> Result<Self, PointFileError> {
        let mut points = Vec::new();
        for (i, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || (i == 0 && trimmed == HEADER) {
                continue;
            }
            let point = match all_consuming(parse_row)(trimmed).finish() {
                Ok((_, point)) => point,
                Err(_) => {
                    return Err(PointFileError::Parse {
                        line: i + 1,
                        content: line.clone(),
                    })
                }
            };
            points.push(point);
        }
        Ok(Self { points })
    }
}

impl FromIterator<DigitisedPoint> for PointSet {
    fn from_iter<I: IntoIterator<Item = DigitisedPoint>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

fn text_field(s: &str) -> IResult<&str, String> {
    map(take_till1(|c| c == ','), |f: &str| f.trim().to_owned())(s)
}

/// A space padded decimal. `nan` and `inf` are refused.
pub(crate) fn number_field(s: &str) -> IResult<&str, f64> {
    verify(delimited(space0, double, space0), |v: &f64| v.is_finite())(s)
}

fn parse_row(s: &str) -> IResult<&str, DigitisedPoint> {
    map(
        tuple((
            terminated(text_field, tag(",")),
            terminated(text_field, tag(",")),
            terminated(number_field, tag(",")),
            terminated(number_field, tag(",")),
            number_field,
        )),
        |(category, label, x, y, z)| DigitisedPoint {
            category,
            label,
            position: Vec3::new(x, y, z),
        },
    )(s)
}
