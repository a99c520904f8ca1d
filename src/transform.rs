// Copyright 2025 Mikael Lund
//
// Licensed under the Apache license, version 2.0 (the "license");
// you may not use this file except in compliance with the license.
// You may obtain a copy of the license at
//
//     http://www.apache.org/licenses/license-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the license is distributed on an "as is" basis,
// without warranties or conditions of any kind, either express or implied.
// See the license for the specific language governing permissions and
// limitations under the license.

//! Rigid-body transformations and least-squares superposition

use crate::{ModelingError, Point, Result};
use nalgebra::Matrix3;

/// Minimum number of point pairs defining a unique superposition
pub const MIN_SUPERPOSITION_POINTS: usize = 3;

/// Rotation followed by translation, `p' = R p + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    /// Proper rotation matrix (orthonormal, determinant +1)
    pub rotation: Matrix3<f64>,
    pub translation: Point,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Point::zeros(),
        }
    }

    pub fn new(rotation: Matrix3<f64>, translation: Point) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn apply(&self, point: &Point) -> Point {
        self.rotation * point + self.translation
    }

    /// Kabsch solution moving `mobile` onto `reference` with minimal RMSD.
    ///
    /// Point `i` of `mobile` corresponds to point `i` of `reference`. Reflections
    /// are excluded.
    ///
    /// # Errors
    /// [`ModelingError::AlignmentMismatch`] for sets of different size or with fewer
    /// than [`MIN_SUPERPOSITION_POINTS`] points.
    pub fn superpose(reference: &[Point], mobile: &[Point]) -> Result<Self> {
        if reference.len() != mobile.len() {
            return Err(ModelingError::AlignmentMismatch(format!(
                "{} reference points but {} mobile points",
                reference.len(),
                mobile.len()
            )));
        }
        if reference.len() < MIN_SUPERPOSITION_POINTS {
            return Err(ModelingError::AlignmentMismatch(format!(
                "superposition needs at least {} points, got {}",
                MIN_SUPERPOSITION_POINTS,
                reference.len()
            )));
        }
        let reference_center = centroid(reference);
        let mobile_center = centroid(mobile);

        // cross-covariance of the centered sets
        let covariance = mobile
            .iter()
            .zip(reference)
            .fold(Matrix3::zeros(), |acc, (m, r)| {
                acc + (m - mobile_center) * (r - reference_center).transpose()
            });

        let svd = covariance.svd(true, true);
        let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
            return Err(ModelingError::AlignmentMismatch(
                "singular value decomposition failed".to_string(),
            ));
        };
        let v = v_t.transpose();
        let handedness = (v * u.transpose()).determinant().signum();
        let correction = Matrix3::from_diagonal(&Point::new(1.0, 1.0, handedness));
        let rotation = v * correction * u.transpose();
        let translation = reference_center - rotation * mobile_center;
        Ok(Self::new(rotation, translation))
    }
}

pub fn centroid(points: &[Point]) -> Point {
    if points.is_empty() {
        return Point::zeros();
    }
    points.iter().sum::<Point>() / points.len() as f64
}

/// Root-mean-square deviation between corresponding points.
pub fn rmsd(a: &[Point], b: &[Point]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    let sum: f64 = a.iter().zip(b).map(|(p, q)| (p - q).norm_squared()).sum();
    (sum / a.len() as f64).sqrt()
}
