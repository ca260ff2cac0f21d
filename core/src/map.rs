//! Landmark map used by the weight update.
//!
//! The map is owned by the caller and is only ever borrowed by the filter. Landmarks keep the
//! order in which they were supplied, and lookup by id goes through an explicit index so that
//! ids do not have to be dense, 1-based, or sorted.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{FilterError, Result};

/// Identifier of a landmark in the map.
pub type LandmarkId = u32;

/// A single known landmark in the map frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: LandmarkId,
    /// Map-frame x position (m)
    pub x: f64,
    /// Map-frame y position (m)
    pub y: f64,
}

impl Landmark {
    pub fn new(id: LandmarkId, x: f64, y: f64) -> Self {
        Landmark { id, x, y }
    }
}

/// Read-only collection of landmarks with validated lookup by id.
#[derive(Clone, Debug, Default)]
pub struct Map {
    landmarks: Vec<Landmark>,
    index: HashMap<LandmarkId, usize>,
}

impl Map {
    /// Build a map from landmarks in storage order.
    ///
    /// Fails with [`FilterError::DuplicateLandmark`] if two landmarks share an id.
    pub fn new(landmarks: Vec<Landmark>) -> Result<Self> {
        let mut index = HashMap::with_capacity(landmarks.len());
        for (i, landmark) in landmarks.iter().enumerate() {
            if index.insert(landmark.id, i).is_some() {
                return Err(FilterError::DuplicateLandmark { id: landmark.id });
            }
        }
        Ok(Map { landmarks, index })
    }

    /// Look up a landmark by id.
    pub fn landmark(&self, id: LandmarkId) -> Result<&Landmark> {
        self.index
            .get(&id)
            .map(|&i| &self.landmarks[i])
            .ok_or(FilterError::InvalidLandmarkReference { id })
    }

    /// All landmarks in storage order.
    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    /// Landmarks strictly closer than `range` to `(x, y)`, in storage order.
    pub fn within_range(&self, x: f64, y: f64, range: f64) -> impl Iterator<Item = &Landmark> {
        self.landmarks
            .iter()
            .filter(move |l| crate::distance(x, y, l.x, l.y) < range)
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}
