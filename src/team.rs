use ndarray::Axis;
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::bbox::{BBox, Ltrb};
use crate::cluster::{self, Color, KMeans};
use crate::config::TeamConfig;
use crate::error::Error;
use crate::image::{self, Image};
use crate::store::{FrameTracks, TrackStore};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "u8", into = "u8")]
pub enum TeamId {
    One = 1,
    Two = 2,
}

impl TeamId {
    #[inline]
    fn index(self) -> usize {
        self as usize - 1
    }

    #[inline]
    fn from_index(idx: usize) -> Self {
        if idx == 0 {
            TeamId::One
        } else {
            TeamId::Two
        }
    }
}

impl TryFrom<u8> for TeamId {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(TeamId::One),
            2 => Ok(TeamId::Two),
            _ => Err(format!("team id must be 1 or 2, got {}", v)),
        }
    }
}

impl From<TeamId> for u8 {
    fn from(t: TeamId) -> u8 {
        t as u8
    }
}

/// Jersey color of the player inside `bbox`.
///
/// The upper half of the box is split into two color clusters; the cluster
/// owning most of the four corner pixels is taken as background and the other
/// one as the jersey. `None` when the box has no pixels inside the frame.
pub fn player_color(image: &Image, bbox: &BBox<Ltrb>, seed: u64) -> Result<Option<Color>, Error> {
    let mut half = image::top_half(image::crop(image, bbox));
    if half.is_empty() {
        // a one pixel tall box has no upper half
        half = image::crop(image, bbox);
    }

    let (h, w) = (half.shape()[0], half.shape()[1]);
    let pixels: Vec<Color> = half
        .lanes(Axis(2))
        .into_iter()
        .map(|px| Color::new(px[0] as f32, px[1] as f32, px[2] as f32))
        .collect();

    if pixels.is_empty() {
        return Ok(None);
    }

    let clustering = match KMeans::new(2, 1, seed).fit(&pixels)? {
        Some(c) => c,
        None => return Ok(Some(pixels[0])),
    };

    let corners = [0, w - 1, (h - 1) * w, h * w - 1];
    let background_votes = corners
        .iter()
        .filter(|&&i| clustering.labels[i] == 1)
        .count();
    // ties go to cluster 0 as background
    let background = if background_votes > 2 { 1 } else { 0 };

    Ok(Some(clustering.centroids[1 - background]))
}

/// The two team prototype colors learned from one reference frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TeamColorModel {
    prototypes: [Color; 2],
}

impl TeamColorModel {
    pub fn new(team1: Color, team2: Color) -> Self {
        Self {
            prototypes: [team1, team2],
        }
    }

    /// Clusters the jersey colors of `players` into two teams.
    pub fn learn(image: &Image, players: &FrameTracks, config: &TeamConfig) -> Result<Self, Error> {
        let boxes: Vec<&BBox<Ltrb>> = players.values().map(|t| &t.bbox).collect();
        let colors: Vec<Option<Color>> = boxes
            .par_iter()
            .map(|bbox| player_color(image, bbox, config.seed))
            .collect::<Result<_, Error>>()?;
        let colors: Vec<Color> = colors.into_iter().flatten().collect();

        let clustering = KMeans::new(2, config.restarts, config.seed)
            .fit(&colors)?
            .ok_or(Error::NotEnoughPlayers(colors.len()))?;

        log::info!(
            "team colors learned from {} players: {:?} / {:?}",
            colors.len(),
            clustering.centroids[0].as_slice(),
            clustering.centroids[1].as_slice()
        );

        Ok(Self::new(clustering.centroids[0], clustering.centroids[1]))
    }

    #[inline]
    pub fn color_of(&self, team: TeamId) -> Color {
        self.prototypes[team.index()]
    }

    #[inline]
    pub fn nearest_team(&self, color: &Color) -> TeamId {
        TeamId::from_index(cluster::nearest(&self.prototypes, color))
    }
}

/// Labels player tracks with a team. The first label computed for a track id
/// is kept for the rest of the run.
pub struct TeamClassifier {
    model: TeamColorModel,
    overrides: BTreeMap<u32, TeamId>,
    seed: u64,
    assigned: RwLock<HashMap<u32, TeamId>>,
}

impl TeamClassifier {
    pub fn new(model: TeamColorModel, config: &TeamConfig) -> Self {
        Self {
            model,
            overrides: config.overrides.clone(),
            seed: config.seed,
            assigned: RwLock::new(HashMap::new()),
        }
    }

    pub fn learn(image: &Image, players: &FrameTracks, config: &TeamConfig) -> Result<Self, Error> {
        Ok(Self::new(TeamColorModel::learn(image, players, config)?, config))
    }

    #[inline]
    pub fn model(&self) -> &TeamColorModel {
        &self.model
    }

    /// Team of `track_id`, from the override table, the cache, or the jersey
    /// inside `bbox` (in that order). `None` only if the track was never
    /// labeled before and its box lies outside the frame.
    pub fn classify(
        &self,
        image: &Image,
        bbox: &BBox<Ltrb>,
        track_id: u32,
    ) -> Result<Option<TeamId>, Error> {
        if let Some(team) = self.overrides.get(&track_id) {
            return Ok(Some(*team));
        }

        if let Some(team) = self.cached(track_id) {
            return Ok(Some(team));
        }

        let color = match player_color(image, bbox, self.seed)? {
            Some(c) => c,
            None => return Ok(None),
        };
        let team = self.model.nearest_team(&color);

        let mut assigned = match self.assigned.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // another thread may have labeled it meanwhile, first write wins
        Ok(Some(*assigned.entry(track_id).or_insert(team)))
    }

    fn cached(&self, track_id: u32) -> Option<TeamId> {
        match self.assigned.read() {
            Ok(guard) => guard.get(&track_id).copied(),
            Err(poisoned) => poisoned.into_inner().get(&track_id).copied(),
        }
    }

    /// Snapshot of every label computed so far.
    pub fn assignments(&self) -> BTreeMap<u32, TeamId> {
        let mut out: BTreeMap<u32, TeamId> = match self.assigned.read() {
            Ok(guard) => guard.iter().map(|(k, v)| (*k, *v)).collect(),
            Err(poisoned) => poisoned.into_inner().iter().map(|(k, v)| (*k, *v)).collect(),
        };

        out.extend(self.overrides.iter().map(|(k, v)| (*k, *v)));
        out
    }

    /// Writes `team` and `team_color` into every player track. Frames go in
    /// order, players of one frame are classified in parallel.
    pub fn label_players(&self, images: &[Image], store: &mut TrackStore) -> Result<(), Error> {
        if images.len() != store.len() {
            return Err(Error::LengthMismatch {
                frames: images.len(),
                detections: store.len(),
            });
        }

        for (image, players) in images.iter().zip(store.players.iter_mut()) {
            let labels: Vec<(u32, Option<TeamId>)> = players
                .par_iter()
                .map(|(id, track)| {
                    self.classify(image, &track.bbox, *id)
                        .map(|team| (*id, team))
                })
                .collect::<Result<_, Error>>()?;

            for (id, team) in labels {
                if let Some(track) = players.get_mut(&id) {
                    track.team = team;
                    track.team_color = team.map(|t| self.model.color_of(t));
                }
            }
        }

        Ok(())
    }
}
