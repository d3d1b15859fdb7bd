//! Expresses a raw stylus reading in the frame of the head reference
//! receiver.

use nalgebra::{Matrix4, Vector4};

use crate::{frame_decoder::RawReading, Vec3};

/// Rotation about x by `angle` radians, in the tracker's sign convention.
fn roll_matrix(angle: f64) -> Matrix4<f64> {
    let (s, c) = angle.sin_cos();
    Matrix4::new(
        1.0, 0.0, 0.0, 0.0, //
        0.0, c, s, 0.0, //
        0.0, -s, c, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Rotation about y by `angle` radians.
fn elevation_matrix(angle: f64) -> Matrix4<f64> {
    let (s, c) = angle.sin_cos();
    Matrix4::new(
        c, 0.0, -s, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        s, 0.0, c, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Rotation about z by `angle` radians.
fn azimuth_matrix(angle: f64) -> Matrix4<f64> {
    let (s, c) = angle.sin_cos();
    Matrix4::new(
        c, s, 0.0, 0.0, //
        -s, c, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    )
}

fn translation_matrix(offset: Vec3) -> Matrix4<f64> {
    Matrix4::new_translation(&offset)
}

/// Computes where `stylus` sits in the frame anchored at `head`.
///
/// The stylus point is first translated by the negated head position, then
/// rotated by the transposes of the azimuth, elevation and roll matrices, in
/// that order. The three rotations are applied one at a time, never folded
/// into a single matrix, and every downstream distance threshold depends on
/// this exact sequence.
pub fn relative_position(head: &RawReading, stylus: &RawReading) -> Vec3 {
    let azimuth = -head.azimuth.to_radians();
    let elevation = -head.elevation.to_radians();
    let roll = -head.roll.to_radians();

    let raw = Vector4::new(stylus.x, stylus.y, stylus.z, 1.0);

    let translated = translation_matrix(-head.position()) * raw;
    let rotated = azimuth_matrix(azimuth).transpose() * translated;
    let rotated = elevation_matrix(elevation).transpose() * rotated;
    let rotated = roll_matrix(roll).transpose() * rotated;

    rotated.xyz()
}

/// Straight-line distance between the two receivers themselves, ignoring
/// orientation. Used as a sanity check that the stylus touched somewhere near
/// the head.
pub fn receiver_distance(a: &RawReading, b: &RawReading) -> f64 {
    (a.position() - b.position()).norm()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn reading(position: [f64; 3], angles: [f64; 3]) -> RawReading {
        RawReading {
            header: 1,
            x: position[0],
            y: position[1],
            z: position[2],
            azimuth: angles[0],
            elevation: angles[1],
            roll: angles[2],
        }
    }

    #[test]
    fn identical_readings_give_origin() {
        let r = reading([12.5, -3.0, 40.25], [33.0, -71.5, 120.0]);

        let p = relative_position(&r, &r);

        assert_abs_diff_eq!(p, Vec3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn unrotated_head_only_translates() {
        let head = reading([1.0, 2.0, 3.0], [0.0, 0.0, 0.0]);
        let stylus = reading([4.0, 6.0, 8.0], [10.0, 20.0, 30.0]);

        let p = relative_position(&head, &stylus);

        assert_abs_diff_eq!(p, Vec3::new(3.0, 4.0, 5.0), epsilon = 1e-12);
    }

    #[test]
    fn azimuth_turns_about_z() {
        // Head turned 90 degrees to the left, so the world x axis lies along
        // the head's negative y axis.
        let head = reading([0.0, 0.0, 0.0], [90.0, 0.0, 0.0]);
        let stylus = reading([1.0, 0.0, 0.0], [0.0, 0.0, 0.0]);

        let p = relative_position(&head, &stylus);

        assert_abs_diff_eq!(p, Vec3::new(0.0, -1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn elevation_turns_about_y() {
        let head = reading([0.0, 0.0, 0.0], [0.0, 90.0, 0.0]);
        let stylus = reading([1.0, 0.0, 0.0], [0.0, 0.0, 0.0]);

        let p = relative_position(&head, &stylus);

        assert_abs_diff_eq!(p, Vec3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn rotation_preserves_distance_to_head() {
        let head = reading([5.0, -7.0, 2.0], [47.0, -12.0, 163.0]);
        let stylus = reading([-3.0, 11.0, 9.5], [0.0, 0.0, 0.0]);

        let p = relative_position(&head, &stylus);

        assert_abs_diff_eq!(p.norm(), receiver_distance(&head, &stylus), epsilon = 1e-10);
    }

    #[test]
    fn distance_between_receivers() {
        let a = reading([0.0, 0.0, 0.0], [0.0, 0.0, 0.0]);
        let b = reading([3.0, 4.0, 12.0], [90.0, 0.0, 0.0]);

        assert_abs_diff_eq!(receiver_distance(&a, &b), 13.0, epsilon = 1e-12);
    }
}
