use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Error;
use crate::team::TeamId;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Column ranges, as fractions of frame width, assumed to show only
    /// background (stands, boards). Features are taken from these only.
    pub background_columns: Vec<(f32, f32)>,
    /// Per-frame displacement below this many pixels is treated as no motion.
    pub min_displacement: f32,
    pub max_corners: usize,
    /// Corners weaker than this fraction of the strongest one are dropped.
    pub quality_level: f32,
    pub min_corner_distance: f32,
    /// Neighbourhood used for the corner response.
    pub block_size: usize,
    /// Side of the optical flow search window at each pyramid level.
    pub win_size: usize,
    /// Pyramid levels above the full resolution one, 0 for none.
    pub max_level: usize,
    /// Below this many tracked features the previous displacement is reused.
    pub min_features: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            background_columns: vec![(0.0, 0.05), (0.95, 1.0)],
            min_displacement: 5.0,
            max_corners: 100,
            quality_level: 0.3,
            min_corner_distance: 3.0,
            block_size: 7,
            win_size: 15,
            max_level: 2,
            min_features: 3,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TeamConfig {
    /// Seed of the opencv RNG before every clustering run
    pub seed: u64,
    /// k-means restarts when splitting player colors into teams
    pub restarts: usize,
    /// Track ids whose team is fixed regardless of jersey color
    pub overrides: BTreeMap<u32, TeamId>,
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            restarts: 10,
            overrides: BTreeMap::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PossessionConfig {
    /// Largest foot-to-ball distance, in pixels at `reference_height`, that
    /// still counts as possession.
    pub max_ball_distance: f32,
    pub reference_height: f32,
}

impl Default for PossessionConfig {
    fn default() -> Self {
        Self {
            max_ball_distance: 70.0,
            reference_height: 1080.0,
        }
    }
}

impl PossessionConfig {
    /// Possession threshold for frames `frame_height` pixels tall
    #[inline]
    pub fn threshold(&self, frame_height: f32) -> f32 {
        self.max_ball_distance * frame_height / self.reference_height
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub camera: CameraConfig,
    pub team: TeamConfig,
    pub possession: PossessionConfig,
}

impl PipelineConfig {
    pub fn from_json_str(s: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = PipelineConfig::from_json_str(
            r#"{ "possession": { "max_ball_distance": 50.0 }, "team": { "overrides": { "91": 1 } } }"#,
        )
        .unwrap();

        assert_eq!(cfg.possession.max_ball_distance, 50.0);
        assert_eq!(cfg.possession.reference_height, 1080.0);
        assert_eq!(cfg.camera, CameraConfig::default());
        assert_eq!(cfg.team.overrides.get(&91), Some(&TeamId::One));
        assert_eq!(cfg.team.restarts, 10);
    }

    #[test]
    fn threshold_scales_with_height() {
        let cfg = PossessionConfig::default();

        assert_eq!(cfg.threshold(1080.0), 70.0);
        assert_eq!(cfg.threshold(540.0), 35.0);
    }

    #[test]
    fn bad_json_is_an_error() {
        assert!(matches!(
            PipelineConfig::from_json_str("{ nope"),
            Err(Error::Json(_))
        ));
    }
}
