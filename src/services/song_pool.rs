//! Assembly of the listening and ranking pool.

use std::collections::{BTreeMap, HashSet};

use rand::{Rng, seq::SliceRandom};

use crate::dao::models::{PlayerSongEntity, PredefinedSongEntity, RankingSongEntity};

/// Smallest pool presented for ranking when enough predefined songs exist.
pub const MIN_POOL_SIZE: usize = 5;

/// Build the final pool: one entry per nominated track, padded with unused
/// predefined songs up to [`MIN_POOL_SIZE`], in random order.
pub fn build_pool<R: Rng + ?Sized>(
    player_songs: &BTreeMap<String, PlayerSongEntity>,
    predefined: &[PredefinedSongEntity],
    rng: &mut R,
) -> Vec<RankingSongEntity> {
    let mut pool: Vec<RankingSongEntity> = Vec::with_capacity(MIN_POOL_SIZE);
    for (player_id, song) in player_songs {
        match pool.iter_mut().find(|entry| entry.track_id == song.track_id) {
            Some(entry) => entry.submitted_by.push(player_id.clone()),
            None => pool.push(RankingSongEntity {
                track_id: song.track_id.clone(),
                name: song.name.clone(),
                artist: song.artist.clone(),
                preview_url: song.preview_url.clone(),
                submitted_by: vec![player_id.clone()],
            }),
        }
    }

    let missing = MIN_POOL_SIZE.saturating_sub(pool.len());
    if missing > 0 {
        let mut seen: HashSet<&str> = pool.iter().map(|song| song.track_id.as_str()).collect();
        let mut candidates: Vec<&PredefinedSongEntity> = predefined
            .iter()
            .filter(|song| seen.insert(song.track_id.as_str()))
            .collect();
        candidates.shuffle(rng);

        let padding: Vec<RankingSongEntity> = candidates
            .into_iter()
            .take(missing)
            .map(|song| RankingSongEntity {
                track_id: song.track_id.clone(),
                name: song.title.clone(),
                artist: song.artist.clone(),
                preview_url: song.preview_url.clone(),
                submitted_by: Vec::new(),
            })
            .collect();
        pool.extend(padding);
    }

    pool.shuffle(rng);
    pool
}
