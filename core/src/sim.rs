//! Simulation utilities and landmark table I/O for exercising the particle filter.
//!
//! This module provides:
//! - Reading and writing landmark maps as header-less `x y id` tables (tab or comma delimited)
//! - A synthetic [`Scenario`] generator: ground truth trajectory, noisy controls, noisy
//!   body-frame landmark observations, and a noisy GNSS-like prior
//! - [`run_scenario`] to drive a [`ParticleFilter`] through a scenario
//! - [`EstimateRecord`] rows for CSV export of the resulting estimates and errors
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::io;
use std::path::Path;

use crate::config::{FilterConfig, extension, load, save};
use crate::diagnostics::format_associations;
use crate::error::{FilterError, Result};
use crate::map::{Landmark, LandmarkId, Map};
use crate::measurements::LandmarkObs;
use crate::motion::{ControlInput, MotionModel};
use crate::{ParticleFilter, Pose2D, map_to_body};

/// One row of a landmark table: map-frame position followed by the landmark id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct LandmarkRecord {
    x: f64,
    y: f64,
    id: LandmarkId,
}

fn delimiter_for(path: &Path) -> u8 {
    match extension(path).as_deref() {
        Some("csv") => b',',
        _ => b'\t',
    }
}

/// Read a landmark map from a header-less `x y id` table.
///
/// Files ending in `.csv` are comma delimited; anything else is tab delimited.
pub fn read_map<P: AsRef<Path>>(path: P) -> std::result::Result<Map, Box<dyn std::error::Error>> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter_for(path))
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut landmarks = Vec::new();
    for result in rdr.deserialize() {
        let record: LandmarkRecord = result?;
        landmarks.push(Landmark::new(record.id, record.x, record.y));
    }
    debug!("Read {} landmarks from {}", landmarks.len(), path.display());
    Ok(Map::new(landmarks)?)
}

/// Write a landmark map as a header-less `x y id` table.
pub fn write_map<P: AsRef<Path>>(map: &Map, path: P) -> io::Result<()> {
    let path = path.as_ref();
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .delimiter(delimiter_for(path))
        .from_path(path)?;
    for l in map.landmarks() {
        writer.serialize(LandmarkRecord {
            x: l.x,
            y: l.y,
            id: l.id,
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Absolute pose error between an estimate and the ground truth.
///
/// The heading error is folded into `[0, π]` so unwrapped headings compare correctly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseError {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

impl PoseError {
    pub fn between(truth: &Pose2D, estimate: &Pose2D) -> Self {
        let mut yaw = (truth.theta - estimate.theta).abs() % (2.0 * PI);
        if yaw > PI {
            yaw = 2.0 * PI - yaw;
        }
        PoseError {
            x: (truth.x - estimate.x).abs(),
            y: (truth.y - estimate.y).abs(),
            yaw,
        }
    }

    /// Planar position error (m).
    pub fn position(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

fn default_num_landmarks() -> usize {
    42
}
fn default_extent() -> f64 {
    150.0
}
fn default_steps() -> usize {
    500
}
fn default_velocity() -> f64 {
    6.0
}
fn default_yaw_amplitude() -> f64 {
    0.2
}
fn default_yaw_period() -> f64 {
    20.0
}
fn default_std_control() -> [f64; 2] {
    [0.1, 0.01]
}
fn default_seed() -> u64 {
    7
}

/// Parameters of a synthetic localization run.
///
/// The agent drives at constant speed with a sinusoidal yaw rate
/// `yaw_amplitude · sin(2πt / yaw_period)`. Measurement ranges and noise levels that are shared
/// with the filter (sensor range, landmark and position noise, time step) are taken from the
/// [`FilterConfig`] passed to [`Scenario::generate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Number of landmarks in a generated map.
    #[serde(default = "default_num_landmarks")]
    pub num_landmarks: usize,
    /// Generated landmarks are placed uniformly in `[-extent, extent]²` around the start.
    #[serde(default = "default_extent")]
    pub extent: f64,
    #[serde(default = "default_steps")]
    pub steps: usize,
    /// Forward speed (m/s)
    #[serde(default = "default_velocity")]
    pub velocity: f64,
    /// Peak yaw rate (rad/s)
    #[serde(default = "default_yaw_amplitude")]
    pub yaw_amplitude: f64,
    /// Period of the yaw rate oscillation (s)
    #[serde(default = "default_yaw_period")]
    pub yaw_period: f64,
    /// Noise on the reported controls `[velocity (m/s), yaw rate (rad/s)]`.
    #[serde(default = "default_std_control")]
    pub std_control: [f64; 2],
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// True starting pose.
    #[serde(default)]
    pub start: Pose2D,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            num_landmarks: default_num_landmarks(),
            extent: default_extent(),
            steps: default_steps(),
            velocity: default_velocity(),
            yaw_amplitude: default_yaw_amplitude(),
            yaw_period: default_yaw_period(),
            std_control: default_std_control(),
            seed: default_seed(),
            start: Pose2D::default(),
        }
    }
}

impl ScenarioConfig {
    /// Read a scenario file; the format follows the extension like [`FilterConfig::from_file`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        load(path)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        save(self, path)
    }
}

/// Sensor data for one time step.
#[derive(Clone, Debug, PartialEq)]
pub struct SimStep {
    pub time: f64,
    pub ground_truth: Pose2D,
    /// Noisy control applied from this step to the next.
    pub control: ControlInput,
    /// Noisy body-frame observations of the landmarks in range of the ground truth pose.
    pub observations: Vec<LandmarkObs>,
}

/// A complete synthetic run: map, noisy prior, and per-step sensor data.
#[derive(Clone, Debug)]
pub struct Scenario {
    pub map: Map,
    /// Noisy estimate of the starting pose, as a GNSS receiver would report it.
    pub prior: Pose2D,
    pub steps: Vec<SimStep>,
}

fn normal(std: f64) -> Result<Normal<f64>> {
    Normal::new(0.0, std).map_err(|e| FilterError::InvalidConfiguration(e.to_string()))
}

impl Scenario {
    /// Generate a scenario. When `map` is `None` a random map is generated.
    pub fn generate(
        scenario: &ScenarioConfig,
        filter: &FilterConfig,
        map: Option<Map>,
    ) -> Result<Self> {
        filter.validate()?;
        let mut rng = StdRng::seed_from_u64(scenario.seed);
        let map = match map {
            Some(map) => map,
            None => random_map(scenario, &mut rng)?,
        };
        let [std_x, std_y, std_theta] = filter.std_position;
        let prior = Pose2D {
            x: scenario.start.x + normal(std_x)?.sample(&mut rng),
            y: scenario.start.y + normal(std_y)?.sample(&mut rng),
            theta: scenario.start.theta + normal(std_theta)?.sample(&mut rng),
        };
        let velocity_noise = normal(scenario.std_control[0])?;
        let yaw_rate_noise = normal(scenario.std_control[1])?;
        let obs_x_noise = normal(filter.std_landmark[0])?;
        let obs_y_noise = normal(filter.std_landmark[1])?;
        let model = MotionModel::new(filter.yaw_rate_threshold)?;

        let mut truth = scenario.start;
        let mut steps = Vec::with_capacity(scenario.steps);
        for k in 0..scenario.steps {
            let time = k as f64 * filter.delta_t;
            let true_control = ControlInput::new(
                scenario.velocity,
                scenario.yaw_amplitude * (2.0 * PI * time / scenario.yaw_period).sin(),
            );
            let observations = map
                .within_range(truth.x, truth.y, filter.sensor_range)
                .map(|l| {
                    let (bx, by) = map_to_body(&truth, l.x, l.y);
                    LandmarkObs::new(
                        bx + obs_x_noise.sample(&mut rng),
                        by + obs_y_noise.sample(&mut rng),
                    )
                })
                .collect();
            let control = ControlInput::new(
                true_control.velocity + velocity_noise.sample(&mut rng),
                true_control.yaw_rate + yaw_rate_noise.sample(&mut rng),
            );
            steps.push(SimStep {
                time,
                ground_truth: truth,
                control,
                observations,
            });
            truth = model.propagate(&truth, &true_control, filter.delta_t);
        }
        info!(
            "Generated scenario with {} landmarks and {} steps",
            map.len(),
            steps.len()
        );
        Ok(Scenario { map, prior, steps })
    }
}

fn random_map<R: Rng>(scenario: &ScenarioConfig, rng: &mut R) -> Result<Map> {
    let extent = scenario.extent.abs();
    let landmarks = (0..scenario.num_landmarks)
        .map(|i| {
            Landmark::new(
                i as LandmarkId + 1,
                scenario.start.x + rng.random_range(-extent..=extent),
                scenario.start.y + rng.random_range(-extent..=extent),
            )
        })
        .collect();
    Map::new(landmarks)
}

/// One row of filter output for CSV export.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimateRecord {
    pub step: usize,
    pub time: f64,
    pub true_x: f64,
    pub true_y: f64,
    pub true_theta: f64,
    pub est_x: f64,
    pub est_y: f64,
    pub est_theta: f64,
    pub error_x: f64,
    pub error_y: f64,
    pub error_yaw: f64,
    pub effective_particles: f64,
    pub observations: usize,
    /// Landmark ids associated by the best particle, space separated.
    pub associations: String,
}

impl EstimateRecord {
    pub fn error(&self) -> PoseError {
        PoseError {
            x: self.error_x,
            y: self.error_y,
            yaw: self.error_yaw,
        }
    }

    /// Write records to a CSV file with a header row.
    pub fn to_csv<P: AsRef<Path>>(records: &[Self], path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read records back from a CSV file written by [`Self::to_csv`].
    pub fn from_csv<P: AsRef<Path>>(
        path: P,
    ) -> std::result::Result<Vec<Self>, Box<dyn std::error::Error>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            records.push(result?);
        }
        Ok(records)
    }
}

/// Drive `filter` through `scenario`.
///
/// The filter is initialized from the scenario prior on the first step. Every later step first
/// predicts with the control reported on the previous step, then weights against the current
/// observations and resamples. The estimate is taken after the weight pass, before resampling.
pub fn run_scenario(filter: &mut ParticleFilter, scenario: &Scenario) -> Result<Vec<EstimateRecord>> {
    let config = filter.config().clone();
    let mut records = Vec::with_capacity(scenario.steps.len());
    let mut previous: Option<&SimStep> = None;
    for (k, step) in scenario.steps.iter().enumerate() {
        match previous {
            None => {
                let p = scenario.prior;
                filter.initialize(p.x, p.y, p.theta, config.std_position)?;
            }
            Some(prev) => filter.predict(
                step.time - prev.time,
                config.std_position,
                prev.control.velocity,
                prev.control.yaw_rate,
            )?,
        }
        filter.update_weights(
            config.sensor_range,
            config.std_landmark,
            &step.observations,
            &scenario.map,
        )?;
        let estimate = filter.estimate().ok_or(FilterError::NotInitialized)?;
        let associations = filter
            .best_particle()
            .map(format_associations)
            .unwrap_or_default();
        let error = PoseError::between(&step.ground_truth, &estimate);
        records.push(EstimateRecord {
            step: k,
            time: step.time,
            true_x: step.ground_truth.x,
            true_y: step.ground_truth.y,
            true_theta: step.ground_truth.theta,
            est_x: estimate.x,
            est_y: estimate.y,
            est_theta: estimate.theta,
            error_x: error.x,
            error_y: error.y,
            error_yaw: error.yaw,
            effective_particles: filter.effective_sample_size(),
            observations: step.observations.len(),
            associations,
        });
        filter.resample()?;
        if k % 100 == 0 {
            info!(
                "Step {k}: position error {:.3} m, yaw error {:.4} rad",
                error.position(),
                error.yaw
            );
        }
        previous = Some(step);
    }
    Ok(records)
}

/// Mean position and yaw error over a set of records.
pub fn summarize(records: &[EstimateRecord]) -> PoseError {
    if records.is_empty() {
        return PoseError::default();
    }
    let n = records.len() as f64;
    PoseError {
        x: records.iter().map(|r| r.error_x).sum::<f64>() / n,
        y: records.iter().map(|r| r.error_y).sum::<f64>() / n,
        yaw: records.iter().map(|r| r.error_yaw).sum::<f64>() / n,
    }
}
