pub mod bbox;
pub mod cache;
pub mod camera;
pub mod cluster;
pub mod config;
pub mod detection;
pub mod error;
pub mod frame;
pub mod image;
pub mod math;
pub mod pipeline;
pub mod possession;
pub mod store;
pub mod team;

mod track;

pub use detection::{Detection, ObjectClass, BALL_TRACK_ID};
pub use frame::Frame;
pub use image::Image;
pub use pipeline::{Pipeline, PipelineOutput};
pub use store::TrackStore;
pub use track::Track;

use error::Error;

/// The external detector/tracker: one `Frame` of tracked detections per image.
pub trait Detector {
    fn detect(&mut self, images: &[Image]) -> Result<Vec<Frame>, Error>;
}

/// Detections that were computed elsewhere, handed out as they are.
pub struct Precomputed(pub Vec<Frame>);

impl Detector for Precomputed {
    #[inline]
    fn detect(&mut self, _images: &[Image]) -> Result<Vec<Frame>, Error> {
        Ok(self.0.clone())
    }
}
