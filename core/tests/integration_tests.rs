//! End-to-end tests for the particle filter through its public API.
//!
//! These tests drive [`ParticleFilter`] the way a driver program would: initialize once, then
//! alternate predict / update_weights / resample, reading the best particle and its diagnostic
//! strings after each cycle. The scenario tests use the synthetic generator in [`mcl::sim`].
//!
//! The error thresholds in the scenario tests are empirical regression bounds for the seeded
//! runs, not design goals.
use std::f64::consts::PI;

use assert_approx_eq::assert_approx_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;

use mcl::association::associate;
use mcl::config::FilterConfig;
use mcl::map::{Landmark, Map};
use mcl::measurements::LandmarkObs;
use mcl::motion::{ControlInput, MotionModel};
use mcl::particle::{EstimateStrategy, ResamplingStrategy};
use mcl::sim::{Scenario, ScenarioConfig, read_map, run_scenario, summarize, write_map};
use mcl::{FilterError, ParticleFilter, Pose2D};

const NO_NOISE: [f64; 3] = [0.0, 0.0, 0.0];
const STD_LANDMARK: [f64; 2] = [0.3, 0.3];

const ALL_STRATEGIES: [ResamplingStrategy; 4] = [
    ResamplingStrategy::Wheel,
    ResamplingStrategy::Systematic,
    ResamplingStrategy::Multinomial,
    ResamplingStrategy::Residual,
];

fn filter(num_particles: usize, resampling: ResamplingStrategy) -> ParticleFilter {
    ParticleFilter::new(FilterConfig {
        num_particles,
        resampling,
        ..Default::default()
    })
    .unwrap()
}

/// A square of landmarks around the origin with non-contiguous ids.
fn square_map() -> Map {
    Map::new(vec![
        Landmark::new(10, 20.0, 20.0),
        Landmark::new(3, -20.0, 20.0),
        Landmark::new(42, -20.0, -20.0),
        Landmark::new(7, 20.0, -20.0),
        Landmark::new(11, 35.0, 0.0),
    ])
    .unwrap()
}

/// Body-frame observations of every landmark in range of `truth`, without noise.
fn observe(map: &Map, truth: &Pose2D, range: f64) -> Vec<LandmarkObs> {
    map.within_range(truth.x, truth.y, range)
        .map(|l| {
            let (x, y) = mcl::map_to_body(truth, l.x, l.y);
            LandmarkObs::new(x, y)
        })
        .collect()
}

#[test]
fn single_particle_single_landmark() {
    let mut pf = filter(1, ResamplingStrategy::Wheel);
    pf.initialize(0.0, 0.0, 0.0, NO_NOISE).unwrap();
    let map = Map::new(vec![Landmark::new(1, 2.0, 0.0)]).unwrap();
    pf.update_weights(10.0, STD_LANDMARK, &[LandmarkObs::new(2.0, 0.0)], &map)
        .unwrap();

    assert_eq!(pf.weights().len(), 1);
    assert_approx_eq!(pf.weights()[0], 1.0 / (2.0 * PI * 0.09), 1e-12);
    assert_approx_eq!(pf.weights()[0], 1.768, 1e-3);

    let best = pf.best_particle().unwrap();
    assert_eq!(ParticleFilter::format_associations(best), "1");
    assert_eq!(ParticleFilter::format_sense_x(best), "2");
    assert_eq!(ParticleFilter::format_sense_y(best), "0");

    pf.resample().unwrap();
    assert_eq!(pf.num_particles(), 1);
    assert_eq!(pf.particles()[0].id(), 0);
}

#[test]
fn nearest_neighbor_association() {
    let predicted = [
        LandmarkObs::with_id(1, 0.0, 0.0),
        LandmarkObs::with_id(2, 5.0, 5.0),
    ];
    let mut observations = [LandmarkObs::new(1.0, 1.0)];
    associate(&predicted, &mut observations);
    assert_eq!(observations[0].id, Some(1));

    let tied = [
        LandmarkObs::with_id(4, 1.0, 0.0),
        LandmarkObs::with_id(9, -1.0, 0.0),
    ];
    let mut observations = [LandmarkObs::new(0.0, 0.0)];
    associate(&tied, &mut observations);
    assert_eq!(observations[0].id, Some(4));
}

#[test]
fn motion_model_closed_form() {
    let model = MotionModel::default();
    let start = Pose2D::new(102.0, 65.0, 5.0 * PI / 8.0);
    let arc = model.propagate(&start, &ControlInput::new(110.0, PI / 8.0), 0.1);
    assert_approx_eq!(arc.x, 97.592046, 1e-5);
    assert_approx_eq!(arc.y, 75.077420, 1e-5);
    assert_approx_eq!(arc.theta, 51.0 * PI / 80.0, 1e-12);

    let line = model.propagate(&start, &ControlInput::new(110.0, 0.0), 0.1);
    assert_approx_eq!(line.x, 102.0 + 11.0 * (5.0 * PI / 8.0).cos(), 1e-12);
    assert_approx_eq!(line.y, 65.0 + 11.0 * (5.0 * PI / 8.0).sin(), 1e-12);
    assert_eq!(line.theta, start.theta);
}

#[test]
fn one_hot_weights_collapse_every_strategy() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut weights = vec![0.0; 25];
    weights[17] = 4.2;
    for strategy in ALL_STRATEGIES {
        let selected = strategy.select(&weights, &mut rng);
        assert_eq!(selected.len(), 25, "{strategy:?}");
        assert!(selected.iter().all(|&i| i == 17), "{strategy:?}");
    }
}

#[test]
fn resampling_draws_only_existing_particles() {
    let map = square_map();
    let truth = Pose2D::new(1.0, -2.0, 0.4);
    let observations = observe(&map, &truth, 50.0);
    for strategy in ALL_STRATEGIES {
        let mut pf = filter(200, strategy);
        pf.initialize(truth.x, truth.y, truth.theta, [1.5, 1.5, 0.1])
            .unwrap();
        let before = pf.particles().to_vec();
        pf.update_weights(50.0, STD_LANDMARK, &observations, &map)
            .unwrap();
        pf.resample().unwrap();
        assert_eq!(pf.num_particles(), 200);
        for p in pf.particles() {
            assert!(p.id() < 200);
            assert_eq!(p.pose(), before[p.id()].pose(), "{strategy:?}");
        }
    }
}

#[test]
fn resample_requires_a_weight_pass() {
    let mut pf = filter(10, ResamplingStrategy::Wheel);
    pf.initialize(0.0, 0.0, 0.0, [0.1, 0.1, 0.01]).unwrap();
    assert_eq!(
        pf.resample(),
        Err(FilterError::UnweightedParticleSet {
            expected: 10,
            found: 0
        })
    );

    let map = square_map();
    let observations = observe(&map, &Pose2D::default(), 50.0);
    pf.update_weights(50.0, STD_LANDMARK, &observations, &map)
        .unwrap();
    pf.update_weights(50.0, STD_LANDMARK, &observations, &map)
        .unwrap();
    assert_eq!(pf.weights().len(), 10);
    pf.resample().unwrap();
    assert!(matches!(
        pf.resample(),
        Err(FilterError::UnweightedParticleSet { found: 0, .. })
    ));
}

#[test]
fn unknown_landmark_id_is_rejected() {
    let map = square_map();
    assert_eq!(
        map.landmark(1).unwrap_err(),
        FilterError::InvalidLandmarkReference { id: 1 }
    );
    assert_eq!(map.landmark(42).unwrap().x, -20.0);
    assert!(matches!(
        Map::new(vec![Landmark::new(5, 0.0, 0.0), Landmark::new(5, 1.0, 1.0)]),
        Err(FilterError::DuplicateLandmark { id: 5 })
    ));
}

#[test]
fn filter_tracks_a_turning_agent() {
    let map = square_map();
    let model = MotionModel::default();
    let dt = 0.1;
    let control = ControlInput::new(4.0, 0.15);
    let mut truth = Pose2D::new(0.0, 0.0, 0.0);

    let mut pf = filter(300, ResamplingStrategy::Systematic);
    pf.initialize(0.4, -0.3, 0.05, [0.5, 0.5, 0.05]).unwrap();
    for _ in 0..60 {
        truth = model.propagate(&truth, &control, dt);
        pf.predict(dt, [0.05, 0.05, 0.005], control.velocity, control.yaw_rate)
            .unwrap();
        let observations = observe(&map, &truth, 60.0);
        pf.update_weights(60.0, STD_LANDMARK, &observations, &map)
            .unwrap();
        pf.resample().unwrap();
    }
    let estimate = pf.estimate_with(EstimateStrategy::WeightedMean).unwrap();
    assert!(
        estimate.distance_to(&truth) < 0.5,
        "estimate {estimate}, truth {truth}"
    );
    assert!((estimate.theta - truth.theta).abs() < 0.05);
}

#[test]
fn seeded_scenario_is_reproducible_and_accurate() {
    let scenario_config = ScenarioConfig {
        num_landmarks: 30,
        extent: 60.0,
        steps: 60,
        ..Default::default()
    };
    let filter_config = FilterConfig {
        num_particles: 150,
        ..Default::default()
    };
    let scenario = Scenario::generate(&scenario_config, &filter_config, None).unwrap();

    let run = || {
        let mut pf = ParticleFilter::new(filter_config.clone()).unwrap();
        run_scenario(&mut pf, &scenario).unwrap()
    };
    let first = run();
    let second = run();
    assert_eq!(first, second);

    let mean = summarize(&first);
    assert!(mean.position() < 1.0, "mean error {mean:?}");
    assert!(mean.yaw < 0.05, "mean error {mean:?}");
}

#[test]
fn scenario_runs_against_a_map_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("map_data.txt");
    write_map(&square_map(), &path).unwrap();
    let map = read_map(&path).unwrap();
    assert_eq!(map.len(), 5);

    let scenario_config = ScenarioConfig {
        steps: 30,
        velocity: 3.0,
        ..Default::default()
    };
    let filter_config = FilterConfig::default();
    let scenario = Scenario::generate(&scenario_config, &filter_config, Some(map)).unwrap();
    let mut pf = ParticleFilter::with_rng(filter_config, StdRng::seed_from_u64(99)).unwrap();
    let records = run_scenario(&mut pf, &scenario).unwrap();
    assert_eq!(records.len(), 30);
    assert!(records.iter().all(|r| r.observations == 5));
    let ids: Vec<&str> = records[0].associations.split(' ').collect();
    assert_eq!(ids.len(), 5);
}
