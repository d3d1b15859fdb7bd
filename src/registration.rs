//! Least-squares rigid registration of two corresponding point clouds.
//!
//! Given `A` and `B` as 3xN matrices whose columns correspond, [`fit`] finds
//! the rotation `R` (a proper rotation, never a reflection) and translation
//! `t` minimising `|R A + t - B|`. The method is the SVD solution of Arun,
//! Huang and Blostein, with the Kabsch sign correction.

use log::debug;
use nalgebra::{Matrix3xX, Matrix4};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Mat3, Vec3};

/// Ratio between the second and first principal spreads below which the
/// source points are treated as lying on a line.
const COLLINEAR_TOLERANCE: f64 = 1e-12;

/// Reasons a fit can't be computed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    /// `A` and `B` have a different number of points.
    #[error("point sets differ in size: {source_points} source points, {target_points} target points")]
    ShapeMismatch {
        /// Columns in `A`.
        source_points: usize,
        /// Columns in `B`.
        target_points: usize,
    },

    /// A fit needs at least three points.
    #[error("need at least 3 corresponding points, got {0}")]
    TooFewPoints(usize),

    /// The source points all lie on one line, or on one spot.
    #[error("source points are collinear, rotation is not determined")]
    Collinear,

    /// Point `n` of either cloud has a NaN or infinite coordinate.
    #[error("point {0} has a non-finite coordinate")]
    NonFinite(usize),

    /// The decomposition didn't produce its singular vectors.
    #[error("singular value decomposition failed")]
    SvdFailed,
}

/// A proper rigid transform, plus the per-point residuals of the fit that
/// produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    /// Orthogonal, determinant +1.
    pub rotation: Mat3,
    /// Applied after the rotation.
    pub translation: Vec3,
    /// Distance between each target point and its transformed source point.
    pub residuals: Vec<f64>,
}

impl RigidTransform {
    /// The transform that leaves everything where it is.
    pub fn identity() -> Self {
        Self {
            rotation: Mat3::identity(),
            translation: Vec3::zeros(),
            residuals: Vec::new(),
        }
    }

    /// Transform every column of `points`.
    pub fn apply(&self, points: &Matrix3xX<f64>) -> Matrix3xX<f64> {
        transform_points(points, &self.rotation, &self.translation)
    }

    /// Move a single point.
    pub fn apply_point(&self, point: &Vec3) -> Vec3 {
        self.rotation * point + self.translation
    }

    /// Root mean square of the residuals, zero when there are none.
    pub fn rms_residual(&self) -> f64 {
        if self.residuals.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.residuals.iter().map(|r| r * r).sum();
        (sum / self.residuals.len() as f64).sqrt()
    }

    /// The transform as a homogeneous 4x4 matrix.
    pub fn to_homogeneous(&self) -> Matrix4<f64> {
        let mut m = self.rotation.to_homogeneous();
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }
}

/// `R points + t`, column by column.
pub fn transform_points(points: &Matrix3xX<f64>, rotation: &Mat3, translation: &Vec3) -> Matrix3xX<f64> {
    let mut moved = rotation * points;
    for mut col in moved.column_iter_mut() {
        col += translation;
    }
    moved
}

fn first_non_finite(points: &Matrix3xX<f64>) -> Option<usize> {
    points
        .column_iter()
        .position(|c| c.iter().any(|v| !v.is_finite()))
}

fn centroid(points: &Matrix3xX<f64>) -> Vec3 {
    points.column_mean()
}

fn centred(points: &Matrix3xX<f64>, centre: &Vec3) -> Matrix3xX<f64> {
    let mut out = points.clone();
    for mut col in out.column_iter_mut() {
        col -= centre;
    }
    out
}

/// Rejects source clouds whose spread has fewer than two independent
/// directions.
fn check_spread(centred_source: &Matrix3xX<f64>) -> Result<(), RegistrationError> {
    let scatter: Mat3 = centred_source * centred_source.transpose();
    let mut spread: Vec<f64> = scatter.singular_values().iter().copied().collect();
    spread.sort_by(|a, b| b.total_cmp(a));

    if spread[0] <= f64::EPSILON || spread[1] <= spread[0] * COLLINEAR_TOLERANCE {
        return Err(RegistrationError::Collinear);
    }
    Ok(())
}

/// Find `R`, `t` such that `R a + t` best matches `b`.
pub fn fit(a: &Matrix3xX<f64>, b: &Matrix3xX<f64>) -> Result<RigidTransform, RegistrationError> {
    if a.ncols() != b.ncols() {
        return Err(RegistrationError::ShapeMismatch {
            source_points: a.ncols(),
            target_points: b.ncols(),
        });
    }
    if a.ncols() < 3 {
        return Err(RegistrationError::TooFewPoints(a.ncols()));
    }
    if let Some(point) = first_non_finite(a).or_else(|| first_non_finite(b)) {
        return Err(RegistrationError::NonFinite(point));
    }

    let centroid_a = centroid(a);
    let centroid_b = centroid(b);
    let ac = centred(a, &centroid_a);
    let bc = centred(b, &centroid_b);
    check_spread(&ac)?;

    let h: Mat3 = &ac * bc.transpose();
    let svd = h.svd(true, true);
    let u = svd.u.ok_or(RegistrationError::SvdFailed)?;
    let mut v_t = svd.v_t.ok_or(RegistrationError::SvdFailed)?;

    let mut rotation = v_t.transpose() * u.transpose();
    if rotation.determinant() < 0.0 {
        // Flip the axis belonging to the smallest singular value.
        let weakest = svd.singular_values.imin();
        v_t.row_mut(weakest).neg_mut();
        rotation = v_t.transpose() * u.transpose();
    }

    let translation = centroid_b - rotation * centroid_a;
    let moved = transform_points(a, &rotation, &translation);
    let residuals = (b - moved).column_iter().map(|c| c.norm()).collect();

    debug!("rigid fit over {} points", a.ncols());
    Ok(RigidTransform {
        rotation,
        translation,
        residuals,
    })
}
