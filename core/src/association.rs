//! Nearest-neighbour data association between observations and predicted landmarks.
use crate::distance;
use crate::measurements::LandmarkObs;

/// Assign every observation the id of the nearest prediction by Euclidean distance.
///
/// Predictions are scanned in order and an assignment only changes on a strict improvement, so
/// ties resolve to the earliest prediction. Any id already on an observation is discarded, so
/// with no predictions every observation ends up as `None`. Both slices must be in the same
/// frame.
pub fn associate(predicted: &[LandmarkObs], observations: &mut [LandmarkObs]) {
    for obs in observations.iter_mut() {
        obs.id = None;
        let mut min_dist = f64::MAX;
        for pred in predicted {
            let d = distance(obs.x, obs.y, pred.x, pred.y);
            if d < min_dist {
                min_dist = d;
                obs.id = pred.id;
            }
        }
    }
}
