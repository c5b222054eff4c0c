use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};
use crate::detection::{Detection, ObjectClass};
use crate::team::TeamId;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Track {
    pub track_id: u32,
    pub class: ObjectClass,
    pub confidence: f32,
    pub bbox: BBox<Ltrb>,

    // bbox centroid in frame pixels
    pub position: Option<na::Point2<f32>>,

    // position with the accumulated camera pan removed
    pub adjusted_position: Option<na::Point2<f32>>,

    // filled in by ball gap interpolation, not by the detector
    pub interpolated: bool,

    pub team: Option<TeamId>,
    // rgb
    pub team_color: Option<na::Vector3<f32>>,
    pub has_ball: bool,
}

impl Track {
    pub fn new(track_id: u32, class: ObjectClass, bbox: BBox<Ltrb>, confidence: f32) -> Self {
        Self {
            track_id,
            class,
            confidence,
            bbox,
            position: None,
            adjusted_position: None,
            interpolated: false,
            team: None,
            team_color: None,
            has_ball: false,
        }
    }

    pub fn interpolated(track_id: u32, class: ObjectClass, bbox: BBox<Ltrb>) -> Self {
        Self {
            interpolated: true,
            ..Self::new(track_id, class, bbox, 0.0)
        }
    }
}

impl From<&Detection> for Track {
    fn from(det: &Detection) -> Track {
        Track::new(det.track_id, det.class.folded(), det.bbox, det.confidence)
    }
}
