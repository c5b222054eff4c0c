use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cache;
use crate::camera::{CameraMotionEstimator, Displacement};
use crate::config::PipelineConfig;
use crate::error::Error;
use crate::image::{self, Image};
use crate::possession::{PossessionAssigner, PossessionRecord};
use crate::store::TrackStore;
use crate::team::{TeamClassifier, TeamColorModel, TeamId};
use crate::Detector;

/// Everything the renderer needs: enriched tracks, the per-frame camera
/// displacement and the running possession record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub tracks: TrackStore,
    pub camera: Vec<Displacement>,
    pub possession: PossessionRecord,
    pub teams: TeamColorModel,
    pub team_assignments: BTreeMap<u32, TeamId>,
}

impl PipelineOutput {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        cache::write_stub(path.as_ref(), self)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
    track_stub: Option<PathBuf>,
    camera_stub: Option<PathBuf>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            track_stub: None,
            camera_stub: None,
        }
    }

    /// Files to read precomputed tracks / camera movement from, and to save them to.
    pub fn with_stubs(mut self, tracks: Option<PathBuf>, camera: Option<PathBuf>) -> Self {
        self.track_stub = tracks;
        self.camera_stub = camera;
        self
    }

    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run<D: Detector + ?Sized>(
        &self,
        detector: &mut D,
        images: &[Image],
    ) -> Result<PipelineOutput, Error> {
        check_images(images)?;

        let tracks = TrackStore::from_detector(detector, images, self.track_stub.as_deref())?;
        self.process(images, tracks)
    }

    /// Runs every stage over tracks that were already extracted.
    pub fn process(&self, images: &[Image], mut tracks: TrackStore) -> Result<PipelineOutput, Error> {
        check_images(images)?;
        tracks.validate()?;

        if tracks.len() != images.len() {
            return Err(Error::LengthMismatch {
                frames: images.len(),
                detections: tracks.len(),
            });
        }

        if tracks.players[0].len() < 2 {
            return Err(Error::NotEnoughPlayers(tracks.players[0].len()));
        }

        log::info!("processing {} frames", images.len());
        tracks.add_position_to_tracks();

        let mut estimator = CameraMotionEstimator::new(&images[0], self.config.camera.clone());
        estimator.estimate_with_stub(images, self.camera_stub.as_deref())?;
        estimator.adjust(&mut tracks)?;

        tracks.interpolate_ball();

        let classifier = TeamClassifier::learn(&images[0], &tracks.players[0], &self.config.team)?;
        classifier.label_players(images, &mut tracks)?;

        let (_, height) = image::dims(&images[0]);
        let assigner = PossessionAssigner::new(&self.config.possession, height as f32);
        let possession = assigner.assign_frames(&mut tracks);

        log::info!("pipeline finished");

        Ok(PipelineOutput {
            camera: estimator.displacements().unwrap_or_default().to_vec(),
            teams: classifier.model().clone(),
            team_assignments: classifier.assignments(),
            tracks,
            possession,
        })
    }
}

fn check_images(images: &[Image]) -> Result<(), Error> {
    let first = images.first().ok_or(Error::EmptySequence)?;
    let expected = image::dims(first);

    for (frame, img) in images.iter().enumerate() {
        let got = image::dims(img);
        if got != expected {
            return Err(Error::FrameSize {
                frame,
                got,
                expected,
            });
        }
    }

    Ok(())
}
