//! Monte Carlo localization toolbox for a planar agent operating against a known landmark map
//!
//! This crate provides a particle filter that estimates the pose of a moving agent in two
//! dimensions. The filter fuses three sources of information: a noisy prior on the starting
//! pose (typically a GNSS fix), a noisy motion model driven by velocity and yaw rate controls,
//! and noisy observations of landmarks whose positions are known ahead of time. The landmark
//! map is given to the filter and is never modified by it; this crate does not perform SLAM.
//!
//! This crate is primarily built off of three additional dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the rigid transforms between the body and map frames.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): Provides the random number generation for initialization, process noise, and resampling.
//! - [`serde`](https://crates.io/crates/serde): Provides (de)serialization of configuration and result records.
//!
//! ## Crate overview
//!
//! This crate is organized into several modules:
//! - [map]: Contains the landmark map and validated landmark lookup.
//! - [particle]: Contains the particle value type, the particle set, and resampling and estimation strategies.
//! - [motion]: Contains the constant turn-rate and velocity (CTRV) motion model.
//! - [measurements]: Contains landmark observations and the Gaussian measurement likelihood.
//! - [association]: Contains nearest-neighbour data association.
//! - [diagnostics]: Contains helpers for reporting per-particle associations.
//! - [config]: Contains the filter configuration and its file formats.
//! - [filter]: Contains the particle filter that ties everything together.
//! - [sim]: Contains a synthetic scenario generator and CSV utilities for driving the filter.
//!
//! ## Coordinate and state definitions
//!
//! The state of a particle is the planar pose
//!
//! $$
//! x = [p_x, p_y, \theta]
//! $$
//!
//! Where $p_x$ and $p_y$ are the position in the map frame (meters) and $\theta$ is the heading
//! (radians, measured counter-clockwise from the map x-axis). Heading is never wrapped by the
//! filter; after many turns it can grow well beyond $\pm\pi$. All trigonometry is periodic so this
//! has no effect on the estimate, and consumers that need a bounded angle should wrap it
//! themselves.
//!
//! Sensor observations are reported in the body frame of the agent: $x$ forward, $y$ to the left.
//! An observation $(o_x, o_y)$ is moved into the map frame with the particle's pose:
//!
//! $$
//! \begin{bmatrix} t_x \\\\ t_y \end{bmatrix} = \begin{bmatrix} \cos\theta & -\sin\theta \\\\ \sin\theta & \cos\theta \end{bmatrix} \begin{bmatrix} o_x \\\\ o_y \end{bmatrix} + \begin{bmatrix} p_x \\\\ p_y \end{bmatrix}
//! $$
//!
//! ## Filter cycle
//!
//! After a single call to [`filter::ParticleFilter::initialize`], every time step runs
//! `predict → update_weights → resample`. Weights are not normalized between steps; they are
//! relative likelihoods and only their ratios matter to resampling.
pub mod association;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod filter;
pub mod map;
pub mod measurements;
pub mod motion;
pub mod particle;
pub mod sim;

use nalgebra::{Isometry2, Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

pub use error::{FilterError, Result};
pub use filter::ParticleFilter;

/// Planar pose of the agent or of a single particle hypothesis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose2D {
    /// Map-frame x position (m)
    pub x: f64,
    /// Map-frame y position (m)
    pub y: f64,
    /// Heading (rad), unbounded
    pub theta: f64,
}

impl Pose2D {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Pose2D { x, y, theta }
    }

    /// Rigid transform from the body frame of this pose into the map frame.
    pub fn isometry(&self) -> Isometry2<f64> {
        Isometry2::new(Vector2::new(self.x, self.y), self.theta)
    }

    /// Euclidean distance between the positions of two poses, ignoring heading.
    pub fn distance_to(&self, other: &Pose2D) -> f64 {
        distance(self.x, self.y, other.x, other.y)
    }
}

impl Display for Pose2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.4} rad)", self.x, self.y, self.theta)
    }
}

/// Euclidean distance between two points in the plane.
pub fn distance(x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    (x2 - x1).hypot(y2 - y1)
}

/// Transform a body-frame point into the map frame using `pose`: rotate by the heading, then
/// translate by the position. No scaling is applied.
pub fn body_to_map(pose: &Pose2D, x: f64, y: f64) -> (f64, f64) {
    let p = pose.isometry() * Point2::new(x, y);
    (p.x, p.y)
}

/// Inverse of [`body_to_map`].
pub fn map_to_body(pose: &Pose2D, x: f64, y: f64) -> (f64, f64) {
    let p = pose.isometry().inverse_transform_point(&Point2::new(x, y));
    (p.x, p.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_distance() {
        assert_approx_eq!(distance(0.0, 0.0, 3.0, 4.0), 5.0, 1e-12);
        assert_approx_eq!(distance(1.0, 1.0, 1.0, 1.0), 0.0, 1e-12);
    }

    #[test]
    fn test_body_to_map_identity() {
        let pose = Pose2D::default();
        let (tx, ty) = body_to_map(&pose, 2.0, -1.0);
        assert_approx_eq!(tx, 2.0, 1e-12);
        assert_approx_eq!(ty, -1.0, 1e-12);
    }

    #[test]
    fn test_body_to_map_matches_closed_form() {
        let pose = Pose2D::new(4.0, 5.0, -FRAC_PI_2);
        let (ox, oy) = (2.0, 2.0);
        let (tx, ty) = body_to_map(&pose, ox, oy);
        let expected_x = ox * pose.theta.cos() - oy * pose.theta.sin() + pose.x;
        let expected_y = ox * pose.theta.sin() + oy * pose.theta.cos() + pose.y;
        assert_approx_eq!(tx, expected_x, 1e-9);
        assert_approx_eq!(ty, expected_y, 1e-9);
        assert_approx_eq!(tx, 6.0, 1e-9);
        assert_approx_eq!(ty, 3.0, 1e-9);
    }

    #[test]
    fn test_map_to_body_inverts_body_to_map() {
        let pose = Pose2D::new(-3.0, 1.5, 2.2);
        let (tx, ty) = body_to_map(&pose, 1.25, -0.75);
        let (bx, by) = map_to_body(&pose, tx, ty);
        assert_approx_eq!(bx, 1.25, 1e-9);
        assert_approx_eq!(by, -0.75, 1e-9);
    }

    #[test]
    fn test_unwrapped_heading_is_periodic() {
        let a = Pose2D::new(1.0, 1.0, 0.3);
        let b = Pose2D::new(1.0, 1.0, 0.3 + 4.0 * std::f64::consts::PI);
        let (ax, ay) = body_to_map(&a, 1.0, 0.0);
        let (bx, by) = body_to_map(&b, 1.0, 0.0);
        assert_approx_eq!(ax, bx, 1e-9);
        assert_approx_eq!(ay, by, 1e-9);
    }
}
