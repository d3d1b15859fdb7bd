//! Label-matched rigid fits between the digitised head and the helmet.
//!
//! Two fits are offered. [`fit_fiducials`] moves head space onto the
//! template by matching digitised fiducials against the template's own
//! fiducials. [`fit_device_to_head`] moves the (depth-adjusted) sensor layout
//! onto the digitised OPM points, giving the device to head transform.
//! Points are paired by label; labels without a partner are skipped with a
//! warning and the fit needs three pairs.

use log::{info, warn};
use nalgebra::Matrix3xX;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    point_set::PointSet,
    registration::{fit, RegistrationError, RigidTransform},
    scheme::Category,
    sensor_layout::SensorLayout,
    template::HelmetTemplate,
    units::Unit,
    Vec3,
};

/// Fewest matched pairs a fit will accept.
const MIN_PAIRS: usize = 3;

/// Reasons a coregistration can't be computed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoregistrationError {
    /// Fewer than three template fiducials were digitised.
    #[error("only {found} of the template's {wanted} fiducials were digitised, need at least 3")]
    TooFewFiducials {
        /// Fiducials matched by label.
        found: usize,
        /// Fiducials in the template.
        wanted: usize,
    },

    /// Fewer than three digitised OPM points name a projected sensor.
    #[error("only {0} digitised OPM points match the sensor layout, need at least 3")]
    TooFewSensors(usize),

    /// The matched pairs are degenerate.
    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

/// A fit together with the labels of the pairs it was computed from. The
/// residuals of `transform` are in the same order as `labels`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelledFit {
    /// Label of each matched pair.
    pub labels: Vec<String>,
    /// The fit from the source points onto the target points.
    pub transform: RigidTransform,
    /// Unit of the fitted translation and residuals.
    pub unit: Unit,
}

impl LabelledFit {
    /// `(label, residual)` pairs in fit order.
    pub fn residuals(&self) -> impl Iterator<Item = (&str, f64)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.transform.residuals.iter().copied())
    }
}

struct Pairs {
    labels: Vec<String>,
    source: Vec<Vec3>,
    target: Vec<Vec3>,
}

impl Pairs {
    fn new() -> Self {
        Self {
            labels: Vec::new(),
            source: Vec::new(),
            target: Vec::new(),
        }
    }

    fn push(&mut self, label: &str, source: Vec3, target: Vec3) {
        self.labels.push(label.to_owned());
        self.source.push(source);
        self.target.push(target);
    }

    fn fit(self, unit: Unit) -> Result<LabelledFit, CoregistrationError> {
        let transform = fit(
            &Matrix3xX::from_columns(&self.source),
            &Matrix3xX::from_columns(&self.target),
        )?;
        info!(
            "fitted {} pairs, rms residual {:.4} {}",
            self.labels.len(),
            transform.rms_residual(),
            unit
        );
        Ok(LabelledFit {
            labels: self.labels,
            transform,
            unit,
        })
    }
}

/// Fit digitised fiducials (in `points_unit`) onto the template's
/// fiducials. The result maps head space into template space, in the
/// template's unit.
pub fn fit_fiducials(
    points: &PointSet,
    points_unit: Unit,
    template: &HelmetTemplate,
) -> Result<LabelledFit, CoregistrationError> {
    let k = points_unit.factor_to(template.unit());
    let mut pairs = Pairs::new();
    let mut wanted = 0;

    for (label, target) in template.fiducials() {
        wanted += 1;
        match points.find(label) {
            Some(p) => pairs.push(label, p.position * k, target),
            None => warn!("fiducial {} was not digitised, leaving it out of the fit", label),
        }
    }

    if pairs.labels.len() < MIN_PAIRS {
        return Err(CoregistrationError::TooFewFiducials {
            found: pairs.labels.len(),
            wanted,
        });
    }
    pairs.fit(template.unit())
}

/// Fit the sensor layout onto the digitised OPM points (in `points_unit`).
/// The result maps device space into head space, in the layout's unit.
pub fn fit_device_to_head(
    layout: &SensorLayout,
    points: &PointSet,
    points_unit: Unit,
) -> Result<LabelledFit, CoregistrationError> {
    let k = points_unit.factor_to(layout.unit);
    let mut pairs = Pairs::new();

    for p in points.in_category(Category::Opm) {
        match layout.position(&p.label) {
            Some(device) => pairs.push(&p.label, device, p.position * k),
            None => warn!("{} is not in the sensor layout, leaving it out of the fit", p.label),
        }
    }

    if pairs.labels.len() < MIN_PAIRS {
        return Err(CoregistrationError::TooFewSensors(pairs.labels.len()));
    }
    pairs.fit(layout.unit)
}

/// Every point of `points` converted from `points_unit` into the fit's unit
/// and moved by it. Categories, labels and order are kept.
pub fn to_template_space(points: &PointSet, points_unit: Unit, fit: &LabelledFit) -> PointSet {
    let k = points_unit.factor_to(fit.unit);
    points.map_positions(|p| fit.transform.apply_point(&(p * k)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        point_set::DigitisedPoint,
        sensor_layout::{DepthMeasurement, ProbeGeometry},
        template::tests::small_helmet,
    };
    use approx::assert_abs_diff_eq;
    use nalgebra::Rotation3;

    /// Digitised copies (in cm) of the helmet's fiducials after a known
    /// head motion.
    fn moved_fiducials(rotation: &Rotation3<f64>, shift: Vec3) -> PointSet {
        let t = small_helmet();
        t.fiducials()
            .map(|(label, pos)| DigitisedPoint::new("fiducials", label, (rotation * pos + shift) * 100.0))
            .collect()
    }

    #[test]
    fn fiducials_fit_undoes_head_motion() {
        let template = small_helmet();
        let rotation = Rotation3::from_euler_angles(0.1, 0.2, -0.4);
        let shift = Vec3::new(0.02, -0.01, 0.3);
        let points = moved_fiducials(&rotation, shift);

        let fit = fit_fiducials(&points, Unit::Cm, &template).unwrap();

        assert_eq!(fit.labels, ["nasion", "lpa", "rpa"]);
        assert_eq!(fit.unit, Unit::M);
        assert_abs_diff_eq!(
            fit.transform.rotation,
            rotation.inverse().into_inner(),
            epsilon = 1e-9
        );
        for (_, r) in fit.residuals() {
            assert!(r < 1e-9);
        }
    }

    #[test]
    fn moves_all_points_into_template_space() {
        let template = small_helmet();
        let rotation = Rotation3::from_euler_angles(0.0, 0.0, 1.0);
        let shift = Vec3::new(0.0, 0.05, 0.0);
        let mut points = moved_fiducials(&rotation, shift);
        let on_head = rotation * Vec3::new(0.0, 0.0, 0.1) + shift;
        points.push(DigitisedPoint::new("head", "head", on_head * 100.0));

        let fit = fit_fiducials(&points, Unit::Cm, &template).unwrap();
        let moved = to_template_space(&points, Unit::Cm, &fit);

        assert_eq!(moved.len(), 4);
        assert_eq!(moved.as_slice()[3].label, "head");
        assert_abs_diff_eq!(
            moved.as_slice()[3].position,
            Vec3::new(0.0, 0.0, 0.1),
            epsilon = 1e-9
        );
    }

    #[test]
    fn missing_fiducial_is_too_few() {
        let template = small_helmet();
        let points: PointSet = [
            DigitisedPoint::new("fiducials", "lpa", Vec3::new(0.0, 8.0, -4.0)),
            DigitisedPoint::new("fiducials", "rpa", Vec3::new(0.0, -8.0, -4.0)),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            fit_fiducials(&points, Unit::Cm, &template),
            Err(CoregistrationError::TooFewFiducials {
                found: 2,
                wanted: 3
            })
        );
    }

    #[test]
    fn device_to_head_matches_by_label() {
        let template = small_helmet();
        let depths = ["FL1", "FL2", "FL3", "FL4"].map(|l| DepthMeasurement::new(l, 0.035));
        let layout = SensorLayout::project(&template, &depths, &ProbeGeometry::default()).unwrap();
        let rotation = Rotation3::from_euler_angles(0.3, 0.0, 0.0);
        let shift = Vec3::new(0.01, 0.02, 0.03);

        // Digitised in mm, in a different order, with an unknown sensor.
        let mut points: PointSet = ["FL3", "FL1", "FL4", "FL2"]
            .iter()
            .map(|&l| {
                let head = rotation * layout.position(l).unwrap() + shift;
                DigitisedPoint::new("OPM", l, head * 1000.0)
            })
            .collect();
        points.push(DigitisedPoint::new("OPM", "FL99", Vec3::zeros()));
        points.push(DigitisedPoint::new("EEG", "Cz", Vec3::zeros()));

        let fit = fit_device_to_head(&layout, &points, Unit::Mm).unwrap();

        assert_eq!(fit.labels, ["FL3", "FL1", "FL4", "FL2"]);
        assert_abs_diff_eq!(fit.transform.rotation, rotation.into_inner(), epsilon = 1e-9);
        assert_abs_diff_eq!(fit.transform.translation, shift, epsilon = 1e-9);
    }

    #[test]
    fn device_to_head_needs_three_sensors() {
        let template = small_helmet();
        let depths = [DepthMeasurement::new("FL1", 0.035)];
        let layout = SensorLayout::project(&template, &depths, &ProbeGeometry::default()).unwrap();
        let points: PointSet = [DigitisedPoint::new("OPM", "FL1", Vec3::zeros())]
            .into_iter()
            .collect();

        assert_eq!(
            fit_device_to_head(&layout, &points, Unit::Cm),
            Err(CoregistrationError::TooFewSensors(1))
        );
    }
}
