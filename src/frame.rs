use serde_derive::{Deserialize, Serialize};

use crate::detection::Detection;

/// Detector output for one video frame
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Frame {
    pub dims: (u32, u32),
    pub detections: Vec<Detection>,
}

impl Frame {
    #[inline]
    pub fn new(dims: (u32, u32), detections: Vec<Detection>) -> Self {
        Self { dims, detections }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
