use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb, Xywh};

/// Track id the detector gives the ball, there is only ever one.
pub const BALL_TRACK_ID: u32 = 1;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    Player,
    Goalkeeper,
    Referee,
    Ball,
}

impl ObjectClass {
    /// Goalkeepers carry a jersey like everybody else, so they are stored and
    /// labeled as players.
    #[inline]
    pub fn folded(self) -> Self {
        match self {
            ObjectClass::Goalkeeper => ObjectClass::Player,
            other => other,
        }
    }
}

/// One tracked detection as handed over by the detector/tracker
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    #[serde(rename = "id")]
    pub track_id: u32,
    #[serde(rename = "c")]
    pub class: ObjectClass,
    pub bbox: BBox<Ltrb>,
    #[serde(rename = "p")]
    pub confidence: f32,
}

impl Detection {
    #[inline]
    pub fn new(track_id: u32, class: ObjectClass, bbox: BBox<Ltrb>, confidence: f32) -> Self {
        Self {
            track_id,
            class,
            bbox,
            confidence,
        }
    }

    /// Builds a detection from a center-size box, the format most detector heads emit.
    #[inline]
    pub fn from_xywh(track_id: u32, class: ObjectClass, bbox: BBox<Xywh>, confidence: f32) -> Self {
        Self::new(track_id, class, bbox.as_ltrb(), confidence)
    }

    #[inline]
    pub fn ball(bbox: BBox<Ltrb>, confidence: f32) -> Self {
        Self::new(BALL_TRACK_ID, ObjectClass::Ball, bbox, confidence)
    }
}
