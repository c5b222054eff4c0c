use nalgebra as na;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::bbox::{BBox, Ltrb};
use crate::cache;
use crate::detection::{ObjectClass, BALL_TRACK_ID};
use crate::error::Error;
use crate::image::Image;
use crate::math;
use crate::track::Track;
use crate::{Detector, Frame};

/// Tracks of one class in one frame, ordered by track id
pub type FrameTracks = BTreeMap<u32, Track>;

/// Every track of every frame, one sequence per object class. All three
/// sequences are indexed by frame and have the same length.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TrackStore {
    pub players: Vec<FrameTracks>,
    pub referees: Vec<FrameTracks>,
    pub ball: Vec<FrameTracks>,

    // running sum of camera displacement, set by `apply_camera_adjustment`
    #[serde(skip)]
    camera_offsets: Option<Vec<na::Vector2<f32>>>,
}

#[inline]
pub fn center_of(bbox: &BBox<Ltrb>) -> na::Point2<f32> {
    bbox.center()
}

impl TrackStore {
    pub fn from_frames(frames: &[Frame]) -> Result<Self, Error> {
        let n = frames.len();
        let mut store = Self {
            players: vec![FrameTracks::new(); n],
            referees: vec![FrameTracks::new(); n],
            ball: vec![FrameTracks::new(); n],
            camera_offsets: None,
        };

        for (idx, frame) in frames.iter().enumerate() {
            for det in frame.iter() {
                let mut track = Track::from(det);
                if track.class == ObjectClass::Ball {
                    // single ball per frame, a later detection replaces an earlier one
                    track.track_id = BALL_TRACK_ID;
                }

                store.class_mut(track.class)[idx].insert(track.track_id, track);
            }
        }

        store.validate()?;

        Ok(store)
    }

    /// Runs the detector over `images`, or loads its previous output from `stub`.
    pub fn from_detector<D: Detector + ?Sized>(
        detector: &mut D,
        images: &[Image],
        stub: Option<&Path>,
    ) -> Result<Self, Error> {
        if let Some(store) = stub.and_then(cache::read_stub::<TrackStore>) {
            match store.validate() {
                Ok(()) if store.len() == images.len() && store.is_consistent() => {
                    return Ok(store)
                }
                Ok(()) => log::warn!(
                    "track stub has {} frames, video has {}; recomputing",
                    store.len(),
                    images.len()
                ),
                Err(err) => log::warn!("track stub rejected: {}; recomputing", err),
            }
        }

        let frames = detector.detect(images)?;
        if frames.len() != images.len() {
            return Err(Error::LengthMismatch {
                frames: images.len(),
                detections: frames.len(),
            });
        }

        let store = Self::from_frames(&frames)?;
        cache::persist(stub, &store);

        Ok(store)
    }

    /// Rejects empty sequences and boxes with negative coordinates.
    pub fn validate(&self) -> Result<(), Error> {
        if self.is_empty() {
            return Err(Error::EmptySequence);
        }

        for class in [ObjectClass::Player, ObjectClass::Referee, ObjectClass::Ball] {
            for (frame, tracks) in self.class(class).iter().enumerate() {
                for track in tracks.values() {
                    if track.bbox.has_negative() {
                        return Err(Error::NegativeBBox {
                            frame,
                            class,
                            track_id: track.track_id,
                            bbox: *track.bbox.as_slice(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    fn is_consistent(&self) -> bool {
        self.players.len() == self.referees.len() && self.players.len() == self.ball.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn class(&self, class: ObjectClass) -> &[FrameTracks] {
        match class.folded() {
            ObjectClass::Referee => &self.referees,
            ObjectClass::Ball => &self.ball,
            _ => &self.players,
        }
    }

    pub fn class_mut(&mut self, class: ObjectClass) -> &mut Vec<FrameTracks> {
        match class.folded() {
            ObjectClass::Referee => &mut self.referees,
            ObjectClass::Ball => &mut self.ball,
            _ => &mut self.players,
        }
    }

    #[inline]
    pub fn ball_bbox(&self, frame: usize) -> Option<&BBox<Ltrb>> {
        self.ball.get(frame)?.get(&BALL_TRACK_ID).map(|t| &t.bbox)
    }

    /// Cumulative camera displacement at each frame, once adjustment has run.
    #[inline]
    pub fn camera_offsets(&self) -> Option<&[na::Vector2<f32>]> {
        self.camera_offsets.as_deref()
    }

    fn all_frames_mut(&mut self) -> impl Iterator<Item = (usize, &mut FrameTracks)> + '_ {
        let players = self.players.iter_mut().enumerate();
        let referees = self.referees.iter_mut().enumerate();
        let ball = self.ball.iter_mut().enumerate();

        players.chain(referees).chain(ball)
    }

    pub fn add_position_to_tracks(&mut self) {
        for (_, tracks) in self.all_frames_mut() {
            for track in tracks.values_mut() {
                track.position = Some(center_of(&track.bbox));
            }
        }
    }

    /// Subtracts the camera displacement accumulated since frame 0 from every
    /// position. `displacements[t]` is the motion between frames `t - 1` and `t`.
    pub fn apply_camera_adjustment(
        &mut self,
        displacements: &[na::Vector2<f32>],
    ) -> Result<(), Error> {
        if displacements.len() != self.len() {
            return Err(Error::LengthMismatch {
                frames: self.len(),
                detections: displacements.len(),
            });
        }

        let offsets: Vec<_> = displacements
            .iter()
            .scan(na::Vector2::<f32>::zeros(), |acc, d| {
                *acc += d;
                Some(*acc)
            })
            .collect();

        for (idx, tracks) in self.all_frames_mut() {
            for track in tracks.values_mut() {
                track.adjusted_position = track.position.map(|p| p - offsets[idx]);
            }
        }

        self.camera_offsets = Some(offsets);

        Ok(())
    }

    /// Fills frames without a ball detection. Filled tracks get their position
    /// (and adjusted position, if adjustment already ran) like detected ones.
    pub fn interpolate_ball(&mut self) {
        let boxes: Vec<_> = (0..self.len()).map(|i| self.ball_bbox(i).copied()).collect();
        let filled = interpolate_ball_track(&boxes);
        let offsets = self.camera_offsets.clone();

        for (idx, (tracks, bbox)) in self.ball.iter_mut().zip(filled).enumerate() {
            let bbox = match bbox {
                Some(b) if !tracks.contains_key(&BALL_TRACK_ID) => b,
                _ => continue,
            };

            let mut track = Track::interpolated(BALL_TRACK_ID, ObjectClass::Ball, bbox);
            let position = center_of(&bbox);
            track.position = Some(position);
            track.adjusted_position = offsets.as_ref().map(|o| position - o[idx]);

            log::debug!("frame {}: interpolated ball at {:?}", idx, bbox.as_slice());
            tracks.insert(BALL_TRACK_ID, track);
        }
    }
}

/// Gap-free version of a ball box sequence. Each coordinate is interpolated
/// linearly between the nearest known frames; frames before the first or
/// after the last known box hold that box. All `None` if nothing is known.
pub fn interpolate_ball_track(boxes: &[Option<BBox<Ltrb>>]) -> Vec<Option<BBox<Ltrb>>> {
    let known: Vec<(usize, [f32; 4])> = boxes
        .iter()
        .enumerate()
        .filter_map(|(i, b)| b.map(|b| (i, *b.as_slice())))
        .collect();

    let (first, last) = match (known.first(), known.last()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => return vec![None; boxes.len()],
    };

    let mut out = vec![None; boxes.len()];

    for slot in out.iter_mut().take(first.0) {
        *slot = Some(BBox::assigned(&first.1));
    }

    for pair in known.windows(2) {
        let (i, a) = pair[0];
        let (j, b) = pair[1];

        for k in i..j {
            let mut coords = [0.0f32; 4];
            for c in 0..4 {
                coords[c] = math::lerp(i as f32, a[c], j as f32, b[c], k as f32);
            }
            out[k] = Some(BBox::assigned(&coords));
        }
    }

    for slot in out.iter_mut().skip(last.0) {
        *slot = Some(BBox::assigned(&last.1));
    }

    out
}
