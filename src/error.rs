use crate::detection::ObjectClass;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("empty frame sequence")]
    EmptySequence,

    #[error("frame {frame}: {class:?} track {track_id} has negative bbox coordinates {bbox:?}")]
    NegativeBBox {
        frame: usize,
        class: ObjectClass,
        track_id: u32,
        bbox: [f32; 4],
    },

    #[error("got {frames} frames but {detections} detection frames")]
    LengthMismatch { frames: usize, detections: usize },

    #[error("frame {frame} is {got:?}, expected {expected:?} (width, height)")]
    FrameSize {
        frame: usize,
        got: (usize, usize),
        expected: (usize, usize),
    },

    #[error("need at least 2 players to learn team colors, got {0}")]
    NotEnoughPlayers(usize),

    #[error("Detector Error: {0}")]
    Detector(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("OpenCV Error: {0}")]
    OpenCv(#[from] opencv::Error),
}
