//! Per-particle association bookkeeping for external reporting.
//!
//! The weight pass records, for every particle, which landmark each observation was matched to
//! and where that observation landed in the map frame. These helpers render those lists as
//! space-separated text for logs and simulator feedback.
use std::fmt::Display;

use crate::particle::Particle;

fn join<T: Display>(values: impl IntoIterator<Item = T>) -> String {
    values
        .into_iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Associated landmark ids, e.g. `"1 2 3"`.
pub fn format_associations(particle: &Particle) -> String {
    join(particle.associations())
}

/// Sensed map-frame x coordinates, rendered at single precision.
pub fn format_sense_x(particle: &Particle) -> String {
    join(particle.sense_x().iter().map(|&x| x as f32))
}

/// Sensed map-frame y coordinates, rendered at single precision.
pub fn format_sense_y(particle: &Particle) -> String {
    join(particle.sense_y().iter().map(|&y| y as f32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pose2D;

    #[test]
    fn test_format_round_trip() {
        let p = Particle::new(0, Pose2D::default(), 1.0)
            .with_associations(vec![1, 2, 3], vec![1.5, 2.0, -3.25], vec![0.1, 10.0, 7.0])
            .unwrap();
        assert_eq!(format_associations(&p), "1 2 3");
        assert_eq!(format_sense_x(&p), "1.5 2 -3.25");
        assert_eq!(format_sense_y(&p), "0.1 10 7");
    }

    #[test]
    fn test_format_empty() {
        let p = Particle::new(0, Pose2D::default(), 1.0);
        assert_eq!(format_associations(&p), "");
        assert_eq!(format_sense_x(&p), "");
        assert_eq!(format_sense_y(&p), "");
    }

    #[test]
    fn test_no_trailing_separator() {
        let p = Particle::new(0, Pose2D::default(), 1.0)
            .with_associations(vec![42], vec![6.0], vec![3.0])
            .unwrap();
        assert_eq!(format_associations(&p), "42");
        assert!(!format_sense_x(&p).ends_with(' '));
    }
}
