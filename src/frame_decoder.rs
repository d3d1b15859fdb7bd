//! Decoding of the fixed-width ASCII records the tracker emits, one per
//! active receiver per sample.
//!
//! A record looks like this (columns are byte offsets):
//!
//! ```text
//!  0  2 3      10     17     24     31     38      46
//!  01   12.34  -5.67  30.10  90.00 -12.50   3.25
//! ```
//!
//! - `0..2` header: station number, integer
//! - `2` status byte, ignored
//! - `3..10`, `10..17`, `17..24` x, y, z
//! - `24..31`, `31..38`, `38..46` azimuth, elevation, roll, in degrees
//!
//! Fields are space padded and may abut when a value fills its whole column,
//! so they are sliced by width rather than split on whitespace.

use nom::{
    bytes::complete::{take, take_while_m_n},
    combinator::{map_res, verify},
    error::{Error, ErrorKind},
    sequence::tuple,
    Finish, IResult,
};
use std::{fmt, str::FromStr};
use thiserror::Error;

use crate::Vec3;

/// Width of the header column.
const HEADER_WIDTH: usize = 2;
/// Width of x, y, z, azimuth and elevation.
const FIELD_WIDTH: usize = 7;
/// The roll column is one character wider than the others.
const ROLL_WIDTH: usize = 8;

/// Length of a record without its line terminator.
pub const RECORD_WIDTH: usize = HEADER_WIDTH + 1 + 5 * FIELD_WIDTH + ROLL_WIDTH;

/// One receiver's decoded frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReading {
    /// Station number reported in the header.
    pub header: i32,
    /// Position, in whatever unit the tracker is currently reporting.
    pub x: f64,
    /// y position.
    pub y: f64,
    /// z position.
    pub z: f64,
    /// Orientation in degrees.
    pub azimuth: f64,
    /// Elevation in degrees.
    pub elevation: f64,
    /// Roll in degrees.
    pub roll: f64,
}

impl RawReading {
    /// The receiver position as a vector.
    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

/// Returned when a record cannot be sliced into its seven numeric fields.
/// This is a per-sample failure: the caller should read the next record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed tracker record {record:?}: {kind:?} near {near:?}")]
pub struct FrameError {
    /// The record as received, line terminator removed.
    pub record: String,
    /// What the parser was doing when it gave up.
    pub kind: ErrorKind,
    /// The unparsed remainder at the failure point.
    pub near: String,
}

fn fixed<'a, T: FromStr>(width: usize) -> impl FnMut(&'a str) -> IResult<&'a str, T> {
    map_res(take(width), |field: &str| field.trim().parse::<T>())
}

/// A numeric column. `NaN` and `inf` parse as `f64` but are never valid.
fn coordinate<'a>(width: usize) -> impl FnMut(&'a str) -> IResult<&'a str, f64> {
    verify(fixed::<f64>(width), |v: &f64| v.is_finite())
}

fn parse_record(s: &str) -> IResult<&str, RawReading> {
    let (rest, (header, _status, x, y, z, azimuth, elevation)) = tuple((
        fixed::<i32>(HEADER_WIDTH),
        take(1usize),
        coordinate(FIELD_WIDTH),
        coordinate(FIELD_WIDTH),
        coordinate(FIELD_WIDTH),
        coordinate(FIELD_WIDTH),
        coordinate(FIELD_WIDTH),
    ))(s)?;

    // The tracker sometimes trims trailing padding, so roll may be short.
    let (rest, roll) = verify(
        map_res(take_while_m_n(1, ROLL_WIDTH, |_| true), |field: &str| {
            field.trim().parse::<f64>()
        }),
        |v: &f64| v.is_finite(),
    )(rest)?;

    Ok((
        rest,
        RawReading {
            header,
            x,
            y,
            z,
            azimuth,
            elevation,
            roll,
        },
    ))
}

impl FromStr for RawReading {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let record = s.trim_end_matches(['\r', '\n']);
        match parse_record(record).finish() {
            Ok((_trailing, reading)) => Ok(reading),
            Err(Error { input, code }) => Err(FrameError {
                record: record.to_owned(),
                kind: code,
                near: input.to_owned(),
            }),
        }
    }
}

/// Writes the reading back out in the same fixed widths it is decoded from,
/// with two decimals, which is the precision the tracker reports.
impl fmt::Display for RawReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02} {:>7.2}{:>7.2}{:>7.2}{:>7.2}{:>7.2}{:>8.2}",
            self.header, self.x, self.y, self.z, self.azimuth, self.elevation, self.roll
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_padded_record() {
        let s = "01   12.34  -5.67  30.10  90.00 -12.50    3.25\r\n";

        let reading: RawReading = s.parse().unwrap();

        assert_eq!(
            reading,
            RawReading {
                header: 1,
                x: 12.34,
                y: -5.67,
                z: 30.10,
                azimuth: 90.0,
                elevation: -12.5,
                roll: 3.25,
            }
        );
    }

    #[test]
    fn decodes_abutting_fields() {
        let s = "02 -123.45-100.00  -0.01-179.99 -89.99 -179.99";

        let reading: RawReading = s.parse().unwrap();

        assert_eq!(reading.header, 2);
        assert_eq!(reading.x, -123.45);
        assert_eq!(reading.y, -100.0);
        assert_eq!(reading.z, -0.01);
        assert_eq!(reading.azimuth, -179.99);
        assert_eq!(reading.elevation, -89.99);
        assert_eq!(reading.roll, -179.99);
    }

    #[test]
    fn tolerates_trimmed_roll_column() {
        let s = "01    1.00   2.00   3.00   0.00   0.00  4.5";

        let reading: RawReading = s.parse().unwrap();

        assert_eq!(reading.roll, 4.5);
    }

    #[test]
    fn rejects_garbage_field() {
        let s = "01    1.00   2.0x   3.00   0.00   0.00   0.00";

        let err = s.parse::<RawReading>().unwrap_err();

        assert_eq!(err.record, s);
        assert!(err.near.starts_with("   2.0x"));
    }

    #[test]
    fn rejects_non_finite_fields() {
        let nan = "01     NaN   0.00   0.00   0.00   0.00   0.00";
        let err = nan.parse::<RawReading>().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Verify);
        assert!(err.near.starts_with("    NaN"));

        assert!("01    1.00    inf   0.00   0.00   0.00   0.00"
            .parse::<RawReading>()
            .is_err());
        assert!("01    1.00   2.00   3.00   0.00   0.00   -inf"
            .parse::<RawReading>()
            .is_err());
    }

    #[test]
    fn rejects_truncated_record() {
        assert!("01    1.00   2.00".parse::<RawReading>().is_err());
        assert!("".parse::<RawReading>().is_err());
    }

    #[test]
    fn encoded_width_matches_layout() {
        let reading = RawReading {
            header: 1,
            x: -12.0,
            y: 0.5,
            z: 99.99,
            azimuth: -179.5,
            elevation: 45.0,
            roll: 0.0,
        };

        assert_eq!(reading.to_string().len(), RECORD_WIDTH);
    }

    #[test]
    fn encode_then_decode_keeps_reported_precision() {
        let readings = [
            RawReading {
                header: 1,
                x: 10.123,
                y: -20.456,
                z: 5.0,
                azimuth: 12.345,
                elevation: -67.891,
                roll: 179.994,
            },
            RawReading {
                header: 2,
                x: -99.999,
                y: 0.004,
                z: -0.5,
                azimuth: -0.001,
                elevation: 89.99,
                roll: -179.99,
            },
        ];

        for reading in readings {
            let decoded: RawReading = reading.to_string().parse().unwrap();
            assert_eq!(decoded.header, reading.header);
            for (a, b) in [
                (decoded.x, reading.x),
                (decoded.y, reading.y),
                (decoded.z, reading.z),
                (decoded.azimuth, reading.azimuth),
                (decoded.elevation, reading.elevation),
                (decoded.roll, reading.roll),
            ] {
                assert!((a - b).abs() <= 0.005 + 1e-9, "{a} vs {b}");
            }
        }
    }
}
