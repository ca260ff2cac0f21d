//! Particle hypotheses, the particle set, and the strategies that act on the whole set.
//!
//! A [`Particle`] is a value type: its fields are private and every change goes through a
//! `with_*` method that returns the updated particle. This keeps the diagnostic association
//! lists index aligned at all times. The [`ParticleSet`] owns the particles together with the
//! weight accumulator filled by each weight pass and consumed by each resample.
use log::warn;
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::Pose2D;
use crate::error::{FilterError, Result};
use crate::map::LandmarkId;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Particle {
    id: usize,
    pose: Pose2D,
    weight: f64,
    associations: Vec<LandmarkId>,
    sense_x: Vec<f64>,
    sense_y: Vec<f64>,
}

impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} w={:.4e}", self.id, self.pose, self.weight)?;
        if !self.associations.is_empty() {
            write!(f, " [{} matched]", self.associations.len())?;
        }
        Ok(())
    }
}

impl Particle {
    pub fn new(id: usize, pose: Pose2D, weight: f64) -> Particle {
        Particle {
            id,
            pose,
            weight,
            associations: Vec::new(),
            sense_x: Vec::new(),
            sense_y: Vec::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn pose(&self) -> &Pose2D {
        &self.pose
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Landmark ids associated during the last weight pass (or attached explicitly).
    pub fn associations(&self) -> &[LandmarkId] {
        &self.associations
    }

    /// Map-frame x coordinates of the associated observations.
    pub fn sense_x(&self) -> &[f64] {
        &self.sense_x
    }

    /// Map-frame y coordinates of the associated observations.
    pub fn sense_y(&self) -> &[f64] {
        &self.sense_y
    }

    pub fn with_pose(mut self, pose: Pose2D) -> Self {
        self.pose = pose;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Replace the diagnostic association lists. Any prior attachment is discarded.
    ///
    /// Fails with [`FilterError::MisalignedAssociations`] if the three lists differ in length.
    pub fn with_associations(
        mut self,
        associations: Vec<LandmarkId>,
        sense_x: Vec<f64>,
        sense_y: Vec<f64>,
    ) -> Result<Self> {
        if associations.len() != sense_x.len() || associations.len() != sense_y.len() {
            return Err(FilterError::MisalignedAssociations {
                associations: associations.len(),
                sense_x: sense_x.len(),
                sense_y: sense_y.len(),
            });
        }
        self.associations = associations;
        self.sense_x = sense_x;
        self.sense_y = sense_y;
        Ok(self)
    }
}

/// Fixed-size collection of particles plus the weights of the most recent weight pass.
#[derive(Clone, Debug, Default)]
pub struct ParticleSet {
    particles: Vec<Particle>,
    weights: Vec<f64>,
}

impl ParticleSet {
    pub fn new(particles: Vec<Particle>) -> Self {
        ParticleSet {
            weights: Vec::with_capacity(particles.len()),
            particles,
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Weights recorded since the last resample, in particle order.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Replace every particle with `f` applied to it. On error the set is left unchanged.
    pub(crate) fn update_each<F>(&mut self, f: F) -> Result<()>
    where
        F: FnMut(&Particle) -> Result<Particle>,
    {
        self.particles = self.particles.iter().map(f).collect::<Result<_>>()?;
        Ok(())
    }

    pub(crate) fn clear_weights(&mut self) {
        self.weights.clear();
    }

    /// Copy every particle's current weight into the accumulator, replacing its contents.
    pub(crate) fn record_weights(&mut self) {
        self.weights.clear();
        self.weights.extend(self.particles.iter().map(Particle::weight));
    }

    /// Draw a new generation with `strategy` and clear the accumulator.
    ///
    /// Fails with [`FilterError::UnweightedParticleSet`] unless the accumulator holds exactly
    /// one weight per particle.
    pub fn resample<R: Rng>(
        &mut self,
        strategy: &ResamplingStrategy,
        rng: &mut R,
    ) -> Result<()> {
        if self.weights.is_empty() || self.weights.len() != self.particles.len() {
            return Err(FilterError::UnweightedParticleSet {
                expected: self.particles.len(),
                found: self.weights.len(),
            });
        }
        let indices = strategy.select(&self.weights, rng);
        self.particles = indices
            .into_iter()
            .map(|i| self.particles[i].clone())
            .collect();
        self.weights.clear();
        Ok(())
    }
}

/// Algorithm used to draw the next generation of particles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplingStrategy {
    /// Resampling wheel: categorical start index, then a circular walk with random steps of up
    /// to twice the maximum weight.
    #[default]
    Wheel,
    Systematic,
    Multinomial,
    Residual,
}

impl ResamplingStrategy {
    /// Select `weights.len()` indices with probability proportional to weight, with replacement.
    ///
    /// If the weights carry no usable mass (all zero, or a non-finite total) every index is
    /// equally likely.
    pub fn select<R: Rng>(&self, weights: &[f64], rng: &mut R) -> Vec<usize> {
        let n = weights.len();
        if n == 0 {
            return Vec::new();
        }
        let total: f64 = weights.iter().sum();
        if !(total.is_finite() && total > 0.0) || weights.iter().any(|w| *w < 0.0) {
            warn!("Particle weights carry no usable mass (total = {total}); resampling uniformly");
            return (0..n).map(|_| rng.random_range(0..n)).collect();
        }
        match self {
            ResamplingStrategy::Wheel => Self::wheel(weights, rng),
            ResamplingStrategy::Systematic => Self::systematic(weights, total, weights.len(), rng),
            ResamplingStrategy::Multinomial => Self::multinomial(weights, rng),
            ResamplingStrategy::Residual => Self::residual(weights, total, rng),
        }
    }

    fn categorical<R: Rng>(weights: &[f64], rng: &mut R) -> usize {
        match WeightedIndex::new(weights) {
            Ok(dist) => dist.sample(rng),
            Err(_) => rng.random_range(0..weights.len()),
        }
    }

    fn wheel<R: Rng>(weights: &[f64], rng: &mut R) -> Vec<usize> {
        let n = weights.len();
        let max_weight = weights.iter().copied().fold(0.0, f64::max);
        let mut index = Self::categorical(weights, rng);
        let mut beta = 0.0;
        let mut selected = Vec::with_capacity(n);
        for _ in 0..n {
            beta += rng.random::<f64>() * 2.0 * max_weight;
            while beta > weights[index] {
                beta -= weights[index];
                index = (index + 1) % n;
            }
            selected.push(index);
        }
        selected
    }

    /// Comb of `count` evenly spaced points with a single random offset, laid over the
    /// cumulative weights.
    fn systematic<R: Rng>(weights: &[f64], total: f64, count: usize, rng: &mut R) -> Vec<usize> {
        let n = weights.len();
        let step = total / count as f64;
        let mut position = rng.random::<f64>() * step;
        let mut selected = Vec::with_capacity(count);
        let mut i = 0;
        let mut cumsum = weights[0];
        for _ in 0..count {
            while position > cumsum && i < n - 1 {
                i += 1;
                cumsum += weights[i];
            }
            selected.push(i);
            position += step;
        }
        selected
    }

    fn multinomial<R: Rng>(weights: &[f64], rng: &mut R) -> Vec<usize> {
        match WeightedIndex::new(weights) {
            Ok(dist) => dist.sample_iter(rng).take(weights.len()).collect(),
            Err(_) => (0..weights.len())
                .map(|_| rng.random_range(0..weights.len()))
                .collect(),
        }
    }

    fn residual<R: Rng>(weights: &[f64], total: f64, rng: &mut R) -> Vec<usize> {
        let n = weights.len();
        let mut selected = Vec::with_capacity(n);
        let mut residual = vec![0.0; n];
        for (i, &w) in weights.iter().enumerate() {
            let expected = w / total * n as f64;
            let copies = expected.floor() as usize;
            selected.extend(std::iter::repeat_n(i, copies));
            residual[i] = expected - copies as f64;
        }
        selected.truncate(n);
        let remaining = n - selected.len();
        if remaining > 0 {
            let sum_residual: f64 = residual.iter().sum();
            if sum_residual > 0.0 {
                selected.extend(Self::systematic(&residual, sum_residual, remaining, rng));
            }
            while selected.len() < n {
                selected.push(rng.random_range(0..n));
            }
        }
        selected
    }
}

/// How a single pose estimate is extracted from the particle set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateStrategy {
    /// Pose of the particle with the largest weight.
    #[default]
    HighestWeight,
    /// Weight-averaged pose; heading is averaged on the unit circle.
    WeightedMean,
    /// Plain average pose; heading is averaged on the unit circle.
    UnweightedMean,
}

impl EstimateStrategy {
    /// Estimate a pose from `particles`. Returns `None` for an empty slice.
    pub fn estimate(&self, particles: &[Particle]) -> Option<Pose2D> {
        match self {
            EstimateStrategy::HighestWeight => highest_weight(particles).map(|p| p.pose),
            EstimateStrategy::WeightedMean => {
                let total: f64 = particles.iter().map(Particle::weight).sum();
                if total > 0.0 && total.is_finite() {
                    mean_pose(particles.iter().map(|p| (p.pose, p.weight / total)))
                } else {
                    EstimateStrategy::UnweightedMean.estimate(particles)
                }
            }
            EstimateStrategy::UnweightedMean => {
                let n = particles.len() as f64;
                mean_pose(particles.iter().map(|p| (p.pose, 1.0 / n)))
            }
        }
    }
}

/// Particle with the largest weight; the first one wins ties.
pub fn highest_weight(particles: &[Particle]) -> Option<&Particle> {
    particles.iter().fold(None, |best: Option<&Particle>, p| match best {
        Some(b) if b.weight >= p.weight => Some(b),
        _ => Some(p),
    })
}

fn mean_pose<I: Iterator<Item = (Pose2D, f64)>>(weighted: I) -> Option<Pose2D> {
    let mut mean = Pose2D::default();
    let (mut sin_sum, mut cos_sum) = (0.0, 0.0);
    let mut count = 0usize;
    for (pose, w) in weighted {
        mean.x += w * pose.x;
        mean.y += w * pose.y;
        sin_sum += w * pose.theta.sin();
        cos_sum += w * pose.theta.cos();
        count += 1;
    }
    if count == 0 {
        return None;
    }
    mean.theta = sin_sum.atan2(cos_sum);
    Some(mean)
}
