//! Constant turn-rate and velocity (CTRV) motion model
//!
//! The prediction step moves every particle by one control step and then perturbs it with
//! independent zero-mean Gaussian process noise on each axis. For a control $(v, \omega)$ held
//! over $\Delta t$ the exact arc update is
//!
//! $$
//! \begin{aligned}
//! x' &= x + \frac{v}{\omega}\left(\sin(\theta + \omega \Delta t) - \sin\theta\right) \\\\
//! y' &= y + \frac{v}{\omega}\left(\cos\theta - \cos(\theta + \omega \Delta t)\right) \\\\
//! \theta' &= \theta + \omega \Delta t
//! \end{aligned}
//! $$
//!
//! and when $|\omega|$ is below a small threshold the straight-line limit is used instead to
//! avoid dividing by a near-zero yaw rate.
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::Pose2D;
use crate::error::{FilterError, Result, check_non_negative_std};

/// Yaw rates with a smaller magnitude are treated as straight-line motion.
pub const DEFAULT_YAW_RATE_THRESHOLD: f64 = 1e-5;

/// Control input held constant over one prediction step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ControlInput {
    /// Forward velocity (m/s)
    pub velocity: f64,
    /// Yaw rate (rad/s)
    pub yaw_rate: f64,
}

impl ControlInput {
    pub fn new(velocity: f64, yaw_rate: f64) -> Self {
        ControlInput { velocity, yaw_rate }
    }
}

/// Zero-mean Gaussian process noise applied independently to x, y and heading.
#[derive(Clone, Copy, Debug)]
pub struct MotionNoise {
    x: Normal<f64>,
    y: Normal<f64>,
    theta: Normal<f64>,
}

impl MotionNoise {
    /// Build the noise model from per-axis standard deviations `[σx, σy, σθ]`.
    ///
    /// Zero is allowed and disables noise on that axis.
    pub fn new(std: [f64; 3]) -> Result<Self> {
        check_non_negative_std("process noise", &std)?;
        let normal = |s: f64| {
            Normal::new(0.0, s).map_err(|e| FilterError::InvalidConfiguration(e.to_string()))
        };
        Ok(MotionNoise {
            x: normal(std[0])?,
            y: normal(std[1])?,
            theta: normal(std[2])?,
        })
    }

    /// Draw one noise sample per axis and add it to `pose`.
    pub fn perturb<R: Rng>(&self, pose: Pose2D, rng: &mut R) -> Pose2D {
        Pose2D {
            x: pose.x + self.x.sample(rng),
            y: pose.y + self.y.sample(rng),
            theta: pose.theta + self.theta.sample(rng),
        }
    }
}

/// Deterministic CTRV kinematics.
#[derive(Clone, Copy, Debug)]
pub struct MotionModel {
    yaw_rate_threshold: f64,
}

impl Default for MotionModel {
    fn default() -> Self {
        MotionModel {
            yaw_rate_threshold: DEFAULT_YAW_RATE_THRESHOLD,
        }
    }
}

impl MotionModel {
    pub fn new(yaw_rate_threshold: f64) -> Result<Self> {
        if !(yaw_rate_threshold.is_finite() && yaw_rate_threshold >= 0.0) {
            return Err(FilterError::InvalidConfiguration(format!(
                "yaw rate threshold must be finite and non-negative, got {yaw_rate_threshold}"
            )));
        }
        Ok(MotionModel { yaw_rate_threshold })
    }

    pub fn yaw_rate_threshold(&self) -> f64 {
        self.yaw_rate_threshold
    }

    /// Advance `pose` by `control` held for `dt` seconds, without noise.
    ///
    /// The heading is not wrapped.
    pub fn propagate(&self, pose: &Pose2D, control: &ControlInput, dt: f64) -> Pose2D {
        let ControlInput { velocity, yaw_rate } = *control;
        if yaw_rate.abs() < self.yaw_rate_threshold {
            Pose2D {
                x: pose.x + velocity * dt * pose.theta.cos(),
                y: pose.y + velocity * dt * pose.theta.sin(),
                theta: pose.theta,
            }
        } else {
            let theta = pose.theta + yaw_rate * dt;
            let radius = velocity / yaw_rate;
            Pose2D {
                x: pose.x + radius * (theta.sin() - pose.theta.sin()),
                y: pose.y + radius * (pose.theta.cos() - theta.cos()),
                theta,
            }
        }
    }

    /// Propagate and then add one draw of process noise.
    pub fn sample<R: Rng>(
        &self,
        pose: &Pose2D,
        control: &ControlInput,
        dt: f64,
        noise: &MotionNoise,
        rng: &mut R,
    ) -> Pose2D {
        noise.perturb(self.propagate(pose, control, dt), rng)
    }
}
