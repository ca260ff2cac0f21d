//! Landmark observations and the measurement likelihood used to weight particles.
//!
//! Observations arrive in the body frame of the agent. For each particle they are moved into the
//! map frame with that particle's pose, associated to the nearest landmark in sensor range, and
//! scored with a bivariate Gaussian with independent axes centred on the matched landmark:
//!
//! $$
//! p(t \mid l) = \frac{1}{2\pi\sigma_x\sigma_y} \exp\left(-\left(\frac{(t_x - l_x)^2}{2\sigma_x^2} + \frac{(t_y - l_y)^2}{2\sigma_y^2}\right)\right)
//! $$
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{FilterError, Result, check_positive_std};
use crate::map::{LandmarkId, Map};
use crate::{Pose2D, body_to_map};

/// A single landmark observation.
///
/// `id` is `None` until the observation has been associated with a landmark.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkObs {
    pub id: Option<LandmarkId>,
    pub x: f64,
    pub y: f64,
}

impl LandmarkObs {
    /// An unassociated observation.
    pub fn new(x: f64, y: f64) -> Self {
        LandmarkObs { id: None, x, y }
    }

    pub fn with_id(id: LandmarkId, x: f64, y: f64) -> Self {
        LandmarkObs { id: Some(id), x, y }
    }

    /// This observation moved from the body frame of `pose` into the map frame.
    pub fn to_map_frame(&self, pose: &Pose2D) -> LandmarkObs {
        let (x, y) = body_to_map(pose, self.x, self.y);
        LandmarkObs { id: self.id, x, y }
    }
}

/// Bivariate Gaussian density with independent axes, evaluated at an offset `(dx, dy)` from the
/// mean.
pub fn bivariate_gaussian(dx: f64, dy: f64, std_x: f64, std_y: f64) -> f64 {
    let exponent = dx * dx / (2.0 * std_x * std_x) + dy * dy / (2.0 * std_y * std_y);
    (-exponent).exp() / (2.0 * PI * std_x * std_y)
}

/// Range-limited landmark sensor with Gaussian position noise.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LandmarkMeasurementModel {
    sensor_range: f64,
    std_landmark: [f64; 2],
}

impl LandmarkMeasurementModel {
    /// Fails unless `sensor_range` is positive and both standard deviations are positive.
    pub fn new(sensor_range: f64, std_landmark: [f64; 2]) -> Result<Self> {
        if sensor_range.is_nan() || sensor_range <= 0.0 {
            return Err(FilterError::InvalidConfiguration(format!(
                "sensor range must be positive, got {sensor_range}"
            )));
        }
        check_positive_std("landmark", &std_landmark)?;
        Ok(LandmarkMeasurementModel {
            sensor_range,
            std_landmark,
        })
    }

    pub fn sensor_range(&self) -> f64 {
        self.sensor_range
    }

    pub fn std_landmark(&self) -> [f64; 2] {
        self.std_landmark
    }

    /// Landmarks the sensor could see from `pose`, as associated observations in the map frame.
    pub fn predicted_landmarks(&self, map: &Map, pose: &Pose2D) -> Vec<LandmarkObs> {
        map.within_range(pose.x, pose.y, self.sensor_range)
            .map(|l| LandmarkObs::with_id(l.id, l.x, l.y))
            .collect()
    }

    /// Likelihood of a map-frame observation at `(x, y)` given a landmark at `(lx, ly)`.
    pub fn likelihood(&self, x: f64, y: f64, lx: f64, ly: f64) -> f64 {
        bivariate_gaussian(x - lx, y - ly, self.std_landmark[0], self.std_landmark[1])
    }
}
