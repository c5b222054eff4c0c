use nalgebra as na;
use ndarray::prelude::*;
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    video,
};
use rayon::prelude::*;
use std::path::Path;

use crate::cache;
use crate::config::CameraConfig;
use crate::error::Error;
use crate::image::{self, Image};
use crate::math;
use crate::store::TrackStore;

pub type Displacement = na::Vector2<f32>;

/// Camera pan estimation from background texture.
///
/// Corners are picked in the background columns of frame `t - 1` and followed
/// into frame `t` with pyramidal Lucas-Kanade optical flow. The displacement
/// of a frame pair is the medoid of the per-corner displacements, i.e. how far
/// the background moved on screen. Subtracting its running sum from a
/// position gives coordinates in which static things stay put.
pub struct CameraMotionEstimator {
    config: CameraConfig,
    dims: (usize, usize),
    mask: Array2<bool>,
    displacements: Option<Vec<Displacement>>,
}

impl CameraMotionEstimator {
    /// Builds the background mask from the reference frame's size.
    pub fn new(reference: &Image, config: CameraConfig) -> Self {
        let (w, h) = image::dims(reference);
        let mut mask = Array2::from_elem((h, w), false);

        for &(from, to) in &config.background_columns {
            let x1 = ((from.clamp(0.0, 1.0) * w as f32) as usize).min(w);
            let x2 = ((to.clamp(0.0, 1.0) * w as f32) as usize).min(w).max(x1);
            mask.slice_mut(s![.., x1..x2]).fill(true);
        }

        Self {
            config,
            dims: (w, h),
            mask,
            displacements: None,
        }
    }

    #[inline]
    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    /// Result of the last estimation, without recomputing.
    #[inline]
    pub fn displacements(&self) -> Option<&[Displacement]> {
        self.displacements.as_deref()
    }

    /// Running sum of the displacements, i.e. total pan since frame 0.
    pub fn cumulative(&self) -> Option<Vec<Displacement>> {
        let mut acc = Displacement::zeros();

        self.displacements.as_ref().map(|d| {
            d.iter()
                .map(|v| {
                    acc += v;
                    acc
                })
                .collect()
        })
    }

    /// One displacement per frame, frame 0 is always zero.
    pub fn estimate(&mut self, frames: &[Image]) -> Result<&[Displacement], Error> {
        if frames.is_empty() {
            return Err(Error::EmptySequence);
        }

        for (idx, frame) in frames.iter().enumerate() {
            let got = image::dims(frame);
            if got != self.dims {
                return Err(Error::FrameSize {
                    frame: idx,
                    got,
                    expected: self.dims,
                });
            }
        }

        let pairs: Vec<Option<Displacement>> = (1..frames.len())
            .into_par_iter()
            .map(|t| self.measure(&frames[t - 1], &frames[t]))
            .collect::<Result<_, Error>>()?;

        let measured: Vec<Option<Displacement>> = std::iter::once(None).chain(pairs).collect();

        let resolved = resolve(&measured, self.config.min_displacement);
        log::info!("estimated camera movement for {} frames", resolved.len());

        Ok(self.displacements.insert(resolved).as_slice())
    }

    /// Like [`estimate`](Self::estimate) but reads a previous result from
    /// `stub` when one with the right frame count and a still first frame
    /// exists, and saves a fresh one.
    pub fn estimate_with_stub(
        &mut self,
        frames: &[Image],
        stub: Option<&Path>,
    ) -> Result<&[Displacement], Error> {
        if let Some(stored) = stub.and_then(cache::read_stub::<Vec<Displacement>>) {
            let still_first = stored.first() == Some(&Displacement::zeros());

            if stored.len() != frames.len() {
                log::warn!(
                    "camera stub has {} frames, video has {}; recomputing",
                    stored.len(),
                    frames.len()
                );
            } else if !still_first {
                log::warn!("camera stub moves on the first frame; recomputing");
            } else {
                return Ok(self.displacements.insert(stored).as_slice());
            }
        }

        self.estimate(frames)?;

        let displacements = self.displacements.as_deref().unwrap_or_default();
        cache::persist(stub, &displacements);

        Ok(displacements)
    }

    /// Writes adjusted positions into `store` from the last estimate.
    pub fn adjust(&self, store: &mut TrackStore) -> Result<(), Error> {
        match &self.displacements {
            Some(d) => store.apply_camera_adjustment(d),
            None => store.apply_camera_adjustment(&vec![Displacement::zeros(); store.len()]),
        }
    }

    /// Background motion between two frames, `None` if too few corners could be followed.
    fn measure(&self, prev: &Image, curr: &Image) -> Result<Option<Displacement>, Error> {
        let prev = image::to_gray_mat(prev)?;
        let curr = image::to_gray_mat(curr)?;
        let mask = image::mask_to_mat(&self.mask)?;

        let mut corners = Mat::default();
        imgproc::good_features_to_track(
            &prev,
            &mut corners,
            self.config.max_corners as i32,
            self.config.quality_level as f64,
            self.config.min_corner_distance as f64,
            &mask,
            self.config.block_size as i32,
            false,
            0.04,
        )?;

        if (corners.rows() as usize) < self.config.min_features {
            return Ok(None);
        }

        let mut next = Mat::default();
        let mut status = Mat::default();
        let mut err = Mat::default();
        let win = self.config.win_size as i32;
        let criteria = core::TermCriteria::new(
            core::TermCriteria_Type::COUNT as i32 | core::TermCriteria_Type::EPS as i32,
            10,
            0.03,
        )?;

        video::calc_optical_flow_pyr_lk(
            &prev,
            &curr,
            &corners,
            &mut next,
            &mut status,
            &mut err,
            core::Size::new(win, win),
            self.config.max_level as i32,
            criteria,
            0,
            1e-4,
        )?;

        let mut flows = Vec::with_capacity(corners.rows() as usize);
        for i in 0..status.rows() {
            if *status.at::<u8>(i)? == 0 {
                continue;
            }

            let from = corners.at::<core::Point2f>(i)?;
            let to = next.at::<core::Point2f>(i)?;
            flows.push(Displacement::new(to.x - from.x, to.y - from.y));
        }

        if flows.len() < self.config.min_features {
            return Ok(None);
        }

        Ok(math::medoid(&flows))
    }
}

/// Turns per-pair measurements into final displacements: frame 0 is zero,
/// missing measurements repeat the previous frame and motion shorter than
/// `min_displacement` is snapped to exactly zero.
pub fn resolve(measured: &[Option<Displacement>], min_displacement: f32) -> Vec<Displacement> {
    let mut out = Vec::with_capacity(measured.len());
    let mut last = Displacement::zeros();

    for (idx, m) in measured.iter().enumerate() {
        let d = if idx == 0 {
            Displacement::zeros()
        } else {
            match m {
                Some(d) if d.norm() < min_displacement => Displacement::zeros(),
                Some(d) => *d,
                None => {
                    log::warn!(
                        "frame {}: not enough background features, reusing previous camera movement",
                        idx
                    );
                    last
                }
            }
        };

        last = d;
        out.push(d);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Smooth blob texture with plenty of corners and no fine aliasing.
    fn texture(x: f32, y: f32) -> u8 {
        let v = 128.0
            + 50.0 * (x * 0.2).sin() * (y * 0.17).sin()
            + 40.0 * (x * 0.07 + y * 0.11).sin();
        v.clamp(0.0, 255.0) as u8
    }

    /// Textured frame whose content is shifted by (dx, dy) on screen.
    fn panned(w: usize, h: usize, dx: f32, dy: f32) -> Image {
        Image::from_shape_fn((h, w, 3), |(y, x, _)| texture(x as f32 - dx, y as f32 - dy))
    }

    fn config() -> CameraConfig {
        CameraConfig {
            background_columns: vec![(0.0, 0.3), (0.7, 1.0)],
            ..CameraConfig::default()
        }
    }

    #[test]
    fn mask_covers_configured_columns() {
        let est = CameraMotionEstimator::new(&Image::zeros((10, 100, 3)), CameraConfig::default());

        assert!(est.mask()[[0, 0]]);
        assert!(est.mask()[[9, 4]]);
        assert!(!est.mask()[[5, 5]]);
        assert!(!est.mask()[[5, 50]]);
        assert!(est.mask()[[5, 99]]);
    }

    #[test]
    fn recovers_pan() {
        let frames = vec![panned(160, 120, 0.0, 0.0), panned(160, 120, 6.0, -3.0)];
        let mut est = CameraMotionEstimator::new(&frames[0], config());

        let d = est.estimate(&frames).unwrap().to_vec();
        assert_eq!(d[0], Displacement::zeros());
        assert_abs_diff_eq!(d[1].x, 6.0, epsilon = 0.5);
        assert_abs_diff_eq!(d[1].y, -3.0, epsilon = 0.5);
        assert_eq!(est.displacements(), Some(d.as_slice()));
    }

    #[test]
    fn small_motion_snaps_to_zero() {
        let frames = vec![
            panned(160, 120, 0.0, 0.0),
            panned(160, 120, 2.0, 1.0),
            panned(160, 120, 2.0, 1.0),
        ];
        let mut est = CameraMotionEstimator::new(&frames[0], config());

        let d = est.estimate(&frames).unwrap();
        assert!(d.iter().all(|v| *v == Displacement::zeros()));
    }

    #[test]
    fn resolve_carries_last_good_value() {
        let m = [
            None,
            Some(Displacement::new(6.0, 0.0)),
            None,
            Some(Displacement::new(1.0, 1.0)),
            None,
        ];

        assert_eq!(
            resolve(&m, 5.0),
            vec![
                Displacement::zeros(),
                Displacement::new(6.0, 0.0),
                Displacement::new(6.0, 0.0),
                Displacement::zeros(),
                Displacement::zeros(),
            ]
        );
    }

    #[test]
    fn flat_frames_fall_back_to_zero() {
        let frames = vec![Image::from_elem((40, 60, 3), 90); 3];
        let mut est = CameraMotionEstimator::new(&frames[0], config());

        let d = est.estimate(&frames).unwrap();
        assert_eq!(d, &[Displacement::zeros(); 3]);
    }

    #[test]
    fn rejects_mismatched_frames() {
        let frames = vec![Image::zeros((40, 60, 3)), Image::zeros((40, 61, 3))];
        let mut est = CameraMotionEstimator::new(&frames[0], config());

        assert!(matches!(
            est.estimate(&frames),
            Err(Error::FrameSize { frame: 1, .. })
        ));
    }

    #[test]
    fn stub_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let stub = dir.path().join("camera.json");
        let frames = vec![panned(160, 120, 0.0, 0.0), panned(160, 120, 6.0, 0.0)];

        let mut est = CameraMotionEstimator::new(&frames[0], config());
        let first = est.estimate_with_stub(&frames, Some(&stub)).unwrap().to_vec();
        assert!(stub.exists());
        assert_abs_diff_eq!(first[1].x, 6.0, epsilon = 0.5);

        let fake = vec![Displacement::zeros(), Displacement::new(9.0, 9.0)];
        cache::write_stub(&stub, &fake).unwrap();

        let mut again = CameraMotionEstimator::new(&frames[0], config());
        let second = again.estimate_with_stub(&frames, Some(&stub)).unwrap().to_vec();

        assert_eq!(second, fake);
        assert_eq!(
            again.cumulative().unwrap(),
            vec![Displacement::zeros(), Displacement::new(9.0, 9.0)]
        );
    }

    #[test]
    fn stub_moving_on_first_frame_is_recomputed() {
        let dir = tempfile::tempdir().unwrap();
        let stub = dir.path().join("camera.json");
        let frames = vec![Image::from_elem((40, 60, 3), 90); 2];

        let bad = vec![Displacement::new(7.0, 0.0), Displacement::new(9.0, 9.0)];
        cache::write_stub(&stub, &bad).unwrap();

        let mut est = CameraMotionEstimator::new(&frames[0], config());
        let d = est.estimate_with_stub(&frames, Some(&stub)).unwrap().to_vec();

        assert_eq!(d, vec![Displacement::zeros(); 2]);
        let rewritten: Vec<Displacement> = cache::read_stub(&stub).unwrap();
        assert_eq!(rewritten, d);
    }
}
