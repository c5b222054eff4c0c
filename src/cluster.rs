use nalgebra as na;
use opencv::{
    core::{self, Mat},
    prelude::*,
};

use crate::error::Error;

pub type Color = na::Vector3<f32>;

/// k-means over RGB vectors through `cv::kmeans` with k-means++ seeding. The
/// opencv RNG is reseeded with `seed` right before every run, so the same
/// input always gives the same clustering.
#[derive(Debug, Clone)]
pub struct KMeans {
    pub k: usize,
    pub restarts: usize,
    pub max_iter: usize,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct Clustering {
    pub centroids: Vec<Color>,
    pub labels: Vec<usize>,
    pub inertia: f32,
}

impl KMeans {
    pub fn new(k: usize, restarts: usize, seed: u64) -> Self {
        Self {
            k,
            restarts: restarts.max(1),
            max_iter: 300,
            seed,
        }
    }

    /// Best of `restarts` runs by compactness. `Ok(None)` when there are fewer
    /// points than clusters.
    pub fn fit(&self, points: &[Color]) -> Result<Option<Clustering>, Error> {
        if self.k == 0 || points.len() < self.k {
            return Ok(None);
        }

        let mut data = Mat::new_rows_cols_with_default(
            points.len() as i32,
            3,
            core::CV_32FC1,
            core::Scalar::all(0.0),
        )?;

        for (row, p) in data.data_typed_mut::<f32>()?.chunks_exact_mut(3).zip(points) {
            row.copy_from_slice(p.as_slice());
        }

        let criteria = core::TermCriteria::new(
            core::TermCriteria_Type::COUNT as i32 | core::TermCriteria_Type::EPS as i32,
            self.max_iter as i32,
            1e-4,
        )?;

        let mut labels = Mat::default();
        let mut centers = Mat::default();

        // the RNG is per thread, seed it on the thread that clusters
        core::set_rng_seed(self.seed as i32)?;
        let compactness = core::kmeans(
            &data,
            self.k as i32,
            &mut labels,
            criteria,
            self.restarts as i32,
            core::KMEANS_PP_CENTERS,
            &mut centers,
        )?;

        let labels = labels
            .data_typed::<i32>()?
            .iter()
            .map(|&l| l as usize)
            .collect();

        let centroids = centers
            .data_typed::<f32>()?
            .chunks_exact(3)
            .map(|c| Color::new(c[0], c[1], c[2]))
            .collect();

        Ok(Some(Clustering {
            centroids,
            labels,
            inertia: compactness as f32,
        }))
    }
}

/// Index of the closest centroid, the lowest index wins on ties.
pub fn nearest(centroids: &[Color], p: &Color) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;

    for (i, c) in centroids.iter().enumerate() {
        let d = (p - c).norm_squared();
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }

    best
}
