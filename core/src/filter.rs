//! Particle filter for landmark-based localization
//!
//! [`ParticleFilter`] is the entry point used by a driver program. It owns the particle set and
//! a seeded random number generator, and exposes the four steps of the filter cycle:
//!
//! 1. [`ParticleFilter::initialize`] seeds the particles around a prior pose (once).
//! 2. [`ParticleFilter::predict`] moves every particle with the CTRV model plus process noise.
//! 3. [`ParticleFilter::update_weights`] scores every particle against the landmark observations.
//! 4. [`ParticleFilter::resample`] draws the next generation in proportion to weight.
//!
//! # Usage
//!
//! ```rust
//! use mcl::ParticleFilter;
//! use mcl::config::FilterConfig;
//! use mcl::map::{Landmark, Map};
//! use mcl::measurements::LandmarkObs;
//!
//! let map = Map::new(vec![Landmark::new(1, 10.0, 0.0), Landmark::new(2, 0.0, 10.0)]).unwrap();
//! let mut pf = ParticleFilter::new(FilterConfig::default()).unwrap();
//!
//! pf.initialize(0.0, 0.0, 0.0, [0.3, 0.3, 0.01]).unwrap();
//! pf.predict(0.1, [0.3, 0.3, 0.01], 5.0, 0.0).unwrap();
//! let observations = vec![LandmarkObs::new(9.5, 0.0), LandmarkObs::new(-0.5, 10.0)];
//! pf.update_weights(50.0, [0.3, 0.3], &observations, &map).unwrap();
//! pf.resample().unwrap();
//!
//! let best = pf.best_particle().unwrap();
//! println!("{}", mcl::diagnostics::format_associations(best));
//! ```
use log::{debug, trace};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use std::fmt::{self, Debug};

use crate::association::associate;
use crate::config::FilterConfig;
use crate::error::{FilterError, Result, check_non_negative_std};
use crate::map::{LandmarkId, Map};
use crate::measurements::{LandmarkMeasurementModel, LandmarkObs};
use crate::motion::{ControlInput, MotionModel, MotionNoise};
use crate::particle::{EstimateStrategy, Particle, ParticleSet, highest_weight};
use crate::{Pose2D, diagnostics};

pub struct ParticleFilter {
    config: FilterConfig,
    motion_model: MotionModel,
    set: ParticleSet,
    initialized: bool,
    rng: StdRng,
}

impl Debug for ParticleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let weights: Vec<f64> = self.set.particles().iter().map(Particle::weight).collect();
        let min_weight = weights.iter().copied().fold(f64::INFINITY, f64::min);
        let max_weight = weights.iter().copied().fold(0.0, f64::max);
        let mut s = f.debug_struct("ParticleFilter");
        s.field("num_particles", &self.set.len())
            .field("initialized", &self.initialized)
            .field("effective_particles", &self.effective_sample_size())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            );
        if let Some(pose) = self.estimate() {
            s.field("estimate", &format_args!("{pose}"));
        }
        s.finish()
    }
}

impl ParticleFilter {
    /// Create an uninitialized filter. The generator is seeded from `config.seed`.
    ///
    /// Fails with [`FilterError::InvalidConfiguration`] if the configuration is invalid.
    pub fn new(config: FilterConfig) -> Result<Self> {
        let rng = StdRng::seed_from_u64(config.seed);
        Self::with_rng(config, rng)
    }

    /// Create an uninitialized filter drawing from an explicitly provided generator.
    pub fn with_rng(config: FilterConfig, rng: StdRng) -> Result<Self> {
        config.validate()?;
        let motion_model = MotionModel::new(config.yaw_rate_threshold)?;
        Ok(ParticleFilter {
            config,
            motion_model,
            set: ParticleSet::default(),
            initialized: false,
            rng,
        })
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(FilterError::NotInitialized)
        }
    }

    /// Seed the particle set from a Gaussian prior around `(x, y, theta)`.
    ///
    /// Draws `num_particles` poses independently per axis with standard deviations
    /// `std = [σx, σy, σθ]`, gives every particle weight 1.0 and ids `0..N`. May only be called
    /// once.
    pub fn initialize(&mut self, x: f64, y: f64, theta: f64, std: [f64; 3]) -> Result<()> {
        if self.initialized {
            return Err(FilterError::AlreadyInitialized);
        }
        check_non_negative_std("initial position", &std)?;
        let normal = |mean: f64, s: f64| {
            Normal::new(mean, s).map_err(|e| FilterError::InvalidConfiguration(e.to_string()))
        };
        let dist_x = normal(x, std[0])?;
        let dist_y = normal(y, std[1])?;
        let dist_theta = normal(theta, std[2])?;
        let particles = (0..self.config.num_particles)
            .map(|id| {
                let pose = Pose2D {
                    x: dist_x.sample(&mut self.rng),
                    y: dist_y.sample(&mut self.rng),
                    theta: dist_theta.sample(&mut self.rng),
                };
                Particle::new(id, pose, 1.0)
            })
            .collect();
        self.set = ParticleSet::new(particles);
        self.initialized = true;
        debug!(
            "Initialized {} particles around {}",
            self.set.len(),
            Pose2D::new(x, y, theta)
        );
        Ok(())
    }

    /// Move every particle by one control step and add process noise.
    ///
    /// `std_pos = [σx, σy, σθ]` is the per-axis process noise. The heading is not wrapped.
    pub fn predict(
        &mut self,
        delta_t: f64,
        std_pos: [f64; 3],
        velocity: f64,
        yaw_rate: f64,
    ) -> Result<()> {
        self.ensure_initialized()?;
        let noise = MotionNoise::new(std_pos)?;
        let control = ControlInput::new(velocity, yaw_rate);
        let model = self.motion_model;
        let rng = &mut self.rng;
        self.set.update_each(|p| {
            let pose = model.sample(p.pose(), &control, delta_t, &noise, &mut *rng);
            Ok(p.clone().with_pose(pose))
        })?;
        trace!("Predicted dt = {delta_t}, v = {velocity}, yaw rate = {yaw_rate}");
        Ok(())
    }

    /// Recompute every particle's weight from the landmark observations.
    ///
    /// `observations` are in the body frame. For each particle, landmarks strictly within
    /// `sensor_range` are predicted, observations are moved into the map frame with the
    /// particle's pose and associated with the nearest prediction, and each matched observation
    /// multiplies the weight (reset to 1.0) by its Gaussian likelihood. Unmatched observations
    /// leave the weight unchanged. The matched ids and map-frame coordinates are attached to the
    /// particle as diagnostics.
    ///
    /// The weight accumulator is cleared first and holds one weight per particle afterwards.
    pub fn update_weights(
        &mut self,
        sensor_range: f64,
        std_landmark: [f64; 2],
        observations: &[LandmarkObs],
        map: &Map,
    ) -> Result<()> {
        self.ensure_initialized()?;
        let sensor = LandmarkMeasurementModel::new(sensor_range, std_landmark)?;
        self.set.clear_weights();
        self.set
            .update_each(|p| weigh_particle(p, &sensor, observations, map))?;
        self.set.record_weights();
        debug!(
            "Weighted {} particles against {} observations, N_eff = {:.1}",
            self.set.len(),
            observations.len(),
            self.effective_sample_size()
        );
        Ok(())
    }

    /// Draw a new generation of the same size, proportional to weight, with replacement.
    ///
    /// Fails with [`FilterError::UnweightedParticleSet`] unless [`Self::update_weights`] has run
    /// since the previous resample.
    pub fn resample(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        let strategy = self.config.resampling;
        self.set.resample(&strategy, &mut self.rng)?;
        trace!("Resampled {} particles with {:?}", self.set.len(), strategy);
        Ok(())
    }

    /// Return a copy of `particle` with the given diagnostic associations attached.
    pub fn set_associations(
        particle: Particle,
        associations: Vec<LandmarkId>,
        sense_x: Vec<f64>,
        sense_y: Vec<f64>,
    ) -> Result<Particle> {
        particle.with_associations(associations, sense_x, sense_y)
    }

    pub fn format_associations(particle: &Particle) -> String {
        diagnostics::format_associations(particle)
    }

    pub fn format_sense_x(particle: &Particle) -> String {
        diagnostics::format_sense_x(particle)
    }

    pub fn format_sense_y(particle: &Particle) -> String {
        diagnostics::format_sense_y(particle)
    }

    pub fn particles(&self) -> &[Particle] {
        self.set.particles()
    }

    /// Weights of the most recent weight pass; empty after a resample.
    pub fn weights(&self) -> &[f64] {
        self.set.weights()
    }

    pub fn num_particles(&self) -> usize {
        self.set.len()
    }

    /// The particle with the largest weight. `None` before initialization.
    pub fn best_particle(&self) -> Option<&Particle> {
        highest_weight(self.set.particles())
    }

    /// Pose estimate using the configured [`EstimateStrategy`].
    pub fn estimate(&self) -> Option<Pose2D> {
        self.estimate_with(self.config.estimate)
    }

    pub fn estimate_with(&self, strategy: EstimateStrategy) -> Option<Pose2D> {
        strategy.estimate(self.set.particles())
    }

    /// Effective sample size `(Σw)² / Σw²` of the current particle weights.
    pub fn effective_sample_size(&self) -> f64 {
        let (sum, sum_sq) = self
            .set
            .particles()
            .iter()
            .fold((0.0, 0.0), |(s, sq), p| (s + p.weight(), sq + p.weight() * p.weight()));
        if sum_sq > 0.0 { sum * sum / sum_sq } else { 0.0 }
    }
}

fn weigh_particle(
    particle: &Particle,
    sensor: &LandmarkMeasurementModel,
    observations: &[LandmarkObs],
    map: &Map,
) -> Result<Particle> {
    let pose = *particle.pose();
    let predicted = sensor.predicted_landmarks(map, &pose);
    let mut transformed: Vec<LandmarkObs> = observations
        .iter()
        .map(|obs| obs.to_map_frame(&pose))
        .collect();
    associate(&predicted, &mut transformed);

    let mut weight = 1.0;
    let mut associations = Vec::with_capacity(transformed.len());
    let mut sense_x = Vec::with_capacity(transformed.len());
    let mut sense_y = Vec::with_capacity(transformed.len());
    for obs in &transformed {
        let Some(id) = obs.id else { continue };
        let landmark = map.landmark(id)?;
        weight *= sensor.likelihood(obs.x, obs.y, landmark.x, landmark.y);
        associations.push(id);
        sense_x.push(obs.x);
        sense_y.push(obs.y);
    }
    trace!(
        "Particle {} at {}: {} of {} observations matched, weight {:.4e}",
        particle.id(),
        pose,
        associations.len(),
        transformed.len(),
        weight
    );
    particle
        .clone()
        .with_weight(weight)
        .with_associations(associations, sense_x, sense_y)
}
