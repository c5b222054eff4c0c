use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};
use crate::config::PossessionConfig;
use crate::store::{center_of, FrameTracks, TrackStore};
use crate::team::TeamId;

/// Picks the player whose feet are closest to the ball.
#[derive(Debug, Clone, Copy)]
pub struct PossessionAssigner {
    max_distance: f32,
}

impl PossessionAssigner {
    /// Threshold scaled from the configured reference height to `frame_height`.
    pub fn new(config: &PossessionConfig, frame_height: f32) -> Self {
        Self::with_threshold(config.threshold(frame_height))
    }

    #[inline]
    pub fn with_threshold(max_distance: f32) -> Self {
        Self { max_distance }
    }

    #[inline]
    pub fn max_distance(&self) -> f32 {
        self.max_distance
    }

    /// Foot distance is the smaller of the distances from the ball center to
    /// the two bottom corners of the player box. The nearest player wins if
    /// that distance is strictly below the threshold; on an exact tie the
    /// lower track id wins.
    pub fn assign(&self, players: &FrameTracks, ball: &BBox<Ltrb>) -> Option<u32> {
        let ball = center_of(ball);
        let mut best: Option<(f32, u32)> = None;

        for (id, player) in players {
            let [left, right] = player.bbox.feet();
            let distance = na::distance(&left, &ball).min(na::distance(&right, &ball));

            if distance >= self.max_distance {
                continue;
            }

            match best {
                Some((d, _)) if d <= distance => {}
                _ => best = Some((distance, *id)),
            }
        }

        best.map(|(_, id)| id)
    }

    /// Sets `has_ball` on the player holding the ball in each frame and
    /// returns the team in possession frame by frame.
    pub fn assign_frames(&self, store: &mut TrackStore) -> PossessionRecord {
        let mut record = PossessionRecord::default();

        for frame in 0..store.len() {
            let holder = match store.ball_bbox(frame).copied() {
                Some(ball) => self.assign(&store.players[frame], &ball),
                None => None,
            };

            let team = holder.and_then(|id| {
                let player = store.players[frame].get_mut(&id)?;
                player.has_ball = true;
                player.team
            });

            log::debug!("frame {}: ball holder {:?} team {:?}", frame, holder, team);
            record.push(team);
        }

        record
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Possession {
    Unresolved,
    Team(TeamId),
}

impl Possession {
    #[inline]
    pub fn team(self) -> Option<TeamId> {
        match self {
            Possession::Team(t) => Some(t),
            Possession::Unresolved => None,
        }
    }
}

/// Team in possession for every frame. A frame without a holder repeats the
/// previous frame; before the first holder frames are unresolved.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PossessionRecord {
    frames: Vec<Possession>,
}

impl PossessionRecord {
    pub fn from_assignments<I: IntoIterator<Item = Option<TeamId>>>(teams: I) -> Self {
        let mut record = Self::default();
        for team in teams {
            record.push(team);
        }
        record
    }

    pub fn push(&mut self, team: Option<TeamId>) {
        let value = match team {
            Some(t) => Possession::Team(t),
            None => self.frames.last().copied().unwrap_or(Possession::Unresolved),
        };

        self.frames.push(value);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn get(&self, frame: usize) -> Option<Possession> {
        self.frames.get(frame).copied()
    }

    #[inline]
    pub fn as_slice(&self) -> &[Possession] {
        &self.frames
    }

    /// Share of frames `0..=frame` held by team 1 and team 2, counting
    /// resolved frames only.
    pub fn share_until(&self, frame: usize) -> Option<(f32, f32)> {
        let end = (frame + 1).min(self.frames.len());
        let (mut one, mut two) = (0usize, 0usize);

        for p in &self.frames[..end] {
            match p {
                Possession::Team(TeamId::One) => one += 1,
                Possession::Team(TeamId::Two) => two += 1,
                Possession::Unresolved => {}
            }
        }

        let total = one + two;
        if total == 0 {
            return None;
        }

        Some((one as f32 / total as f32, two as f32 / total as f32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::ObjectClass;
    use crate::track::Track;

    fn players(list: &[(u32, [f32; 4])]) -> FrameTracks {
        list.iter()
            .map(|(id, b)| {
                (
                    *id,
                    Track::new(*id, ObjectClass::Player, BBox::assigned(b), 0.9),
                )
            })
            .collect()
    }

    // ball centered at (200, 300)
    fn ball() -> BBox<Ltrb> {
        BBox::ltrb(195.0, 295.0, 205.0, 305.0)
    }

    #[test]
    fn exactly_at_threshold_is_not_possession() {
        let assigner = PossessionAssigner::with_threshold(70.0);
        // right foot at (130, 300)
        let p = players(&[(7, [100.0, 200.0, 130.0, 300.0])]);

        assert_eq!(assigner.assign(&p, &ball()), None);
    }

    #[test]
    fn just_inside_threshold_is_possession() {
        let assigner = PossessionAssigner::with_threshold(70.0);
        let p = players(&[(7, [100.0, 200.0, 130.01, 300.0])]);

        assert_eq!(assigner.assign(&p, &ball()), Some(7));
    }

    #[test]
    fn nearest_foot_wins() {
        let assigner = PossessionAssigner::with_threshold(70.0);
        let p = players(&[
            // left foot 30 away
            (4, [230.0, 200.0, 260.0, 300.0]),
            // right foot 10 away
            (9, [160.0, 200.0, 190.0, 300.0]),
        ]);

        assert_eq!(assigner.assign(&p, &ball()), Some(9));
    }

    #[test]
    fn tie_goes_to_lower_id() {
        let assigner = PossessionAssigner::with_threshold(70.0);
        let p = players(&[
            (12, [220.0, 200.0, 250.0, 300.0]),
            (5, [150.0, 200.0, 180.0, 300.0]),
        ]);

        assert_eq!(assigner.assign(&p, &ball()), Some(5));
    }

    #[test]
    fn threshold_follows_resolution() {
        let assigner = PossessionAssigner::new(&PossessionConfig::default(), 540.0);
        assert_eq!(assigner.max_distance(), 35.0);
    }

    #[test]
    fn carry_forward() {
        let record = PossessionRecord::from_assignments([
            Some(TeamId::One),
            None,
            None,
            Some(TeamId::Two),
        ]);

        let teams: Vec<_> = record.as_slice().iter().map(|p| p.team()).collect();
        assert_eq!(
            teams,
            vec![
                Some(TeamId::One),
                Some(TeamId::One),
                Some(TeamId::One),
                Some(TeamId::Two)
            ]
        );
    }

    #[test]
    fn unresolved_until_first_holder() {
        let record = PossessionRecord::from_assignments([None, None, Some(TeamId::Two), None]);

        assert_eq!(record.get(0), Some(Possession::Unresolved));
        assert_eq!(record.get(1), Some(Possession::Unresolved));
        assert_eq!(record.get(3), Some(Possession::Team(TeamId::Two)));
        assert_eq!(record.share_until(1), None);
        assert_eq!(record.share_until(3), Some((0.0, 1.0)));
    }

    #[test]
    fn share_counts_resolved_frames() {
        let record = PossessionRecord::from_assignments([
            Some(TeamId::One),
            Some(TeamId::Two),
            None,
            Some(TeamId::One),
        ]);

        assert_eq!(record.share_until(1), Some((0.5, 0.5)));
        assert_eq!(record.share_until(3), Some((0.5, 0.5)));
        assert_eq!(record.share_until(99), Some((0.5, 0.5)));
    }

    #[test]
    fn marks_holder_in_store() {
        let mut store = TrackStore::default();
        let mut p = players(&[(3, [150.0, 200.0, 180.0, 300.0])]);
        p.get_mut(&3).unwrap().team = Some(TeamId::Two);
        store.players = vec![p.clone(), p];
        store.referees = vec![FrameTracks::new(); 2];
        store.ball = vec![FrameTracks::new(); 2];
        store.ball[0].insert(
            crate::detection::BALL_TRACK_ID,
            Track::new(1, ObjectClass::Ball, ball(), 0.7),
        );

        let record = PossessionAssigner::with_threshold(70.0).assign_frames(&mut store);

        assert!(store.players[0][&3].has_ball);
        assert!(!store.players[1][&3].has_ball);
        assert_eq!(record.as_slice(), &[Possession::Team(TeamId::Two); 2]);
    }
}
