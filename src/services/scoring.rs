//! Tie-aware rank-sum scoring of a round.

use std::collections::{BTreeMap, HashMap};

use crate::dao::models::{
    PlayerSongEntity, RankingEntity, RoundResultEntity, ScoreEntity, WinnerDataEntity,
};

/// Everything the scoring transaction writes for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundScoring {
    /// One row per nomination, best placed songs first.
    pub results: Vec<RoundResultEntity>,
    /// Score documents keyed by player id.
    pub scores: BTreeMap<String, ScoreEntity>,
    pub winners: WinnerDataEntity,
}

struct UniqueSong<'a> {
    track_id: &'a str,
    submitters: Vec<&'a str>,
    rank_sum: u32,
}

/// Placement points for songs already sorted by ascending rank sum.
///
/// The song at index `i` is worth `n - i`; a block of equal rank sums shares
/// the floored average of the points it spans.
fn placement_points(rank_sums: &[u32]) -> Vec<i64> {
    let n = rank_sums.len() as i64;
    let mut points = Vec::with_capacity(rank_sums.len());
    let mut start = 0;
    while start < rank_sums.len() {
        let mut end = start + 1;
        while end < rank_sums.len() && rank_sums[end] == rank_sums[start] {
            end += 1;
        }
        let total: i64 = (start..end).map(|i| (n - i as i64).max(0)).sum();
        let shared = total / (end - start) as i64;
        points.extend(std::iter::repeat_n(shared, end - start));
        start = end;
    }
    points
}

/// Score every nomination of a round.
///
/// Songs are grouped by track id and only nominated tracks earn points; ranks
/// given to predefined padding songs are ignored. A track nominated by `k`
/// players costs each of them `k - 1` points.
pub fn score_round(
    player_songs: &BTreeMap<String, PlayerSongEntity>,
    player_names: &HashMap<String, String>,
    rankings: &[(String, RankingEntity)],
) -> RoundScoring {
    let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (player_id, song) in player_songs {
        grouped
            .entry(song.track_id.as_str())
            .or_default()
            .push(player_id.as_str());
    }

    let mut songs: Vec<UniqueSong<'_>> = grouped
        .into_iter()
        .map(|(track_id, submitters)| UniqueSong {
            track_id,
            submitters,
            rank_sum: rankings
                .iter()
                .filter_map(|(_, ranking)| ranking.rankings.get(track_id))
                .sum(),
        })
        .collect();
    songs.sort_by(|a, b| {
        a.rank_sum
            .cmp(&b.rank_sum)
            .then_with(|| a.track_id.cmp(b.track_id))
    });

    let rank_sums: Vec<u32> = songs.iter().map(|song| song.rank_sum).collect();
    let points = placement_points(&rank_sums);

    let mut results = Vec::with_capacity(player_songs.len());
    let mut scores = BTreeMap::new();
    for (song, points) in songs.iter().zip(points) {
        let duplicate_penalty = -(song.submitters.len() as i64 - 1);
        let round_score = points + duplicate_penalty;
        for player_id in &song.submitters {
            let Some(nomination) = player_songs.get(*player_id) else {
                continue;
            };
            results.push(RoundResultEntity {
                player_id: (*player_id).to_owned(),
                player_name: player_names.get(*player_id).cloned().unwrap_or_default(),
                track_id: song.track_id.to_owned(),
                song_name: nomination.name.clone(),
                artist: nomination.artist.clone(),
                rank_sum: song.rank_sum,
                points,
                duplicate_penalty,
                total_score: round_score,
                is_winner: false,
            });
            scores.insert(
                (*player_id).to_owned(),
                ScoreEntity {
                    round_score,
                    duplicate_penalty,
                    bonus_points: 0,
                    joker_used: false,
                    total_score_for_round: round_score,
                },
            );
        }
    }

    let best = results.iter().map(|result| result.total_score).max();
    let mut winner_ids = Vec::new();
    if let Some(best) = best {
        for result in results.iter_mut().filter(|result| result.total_score == best) {
            result.is_winner = true;
            winner_ids.push(result.player_id.clone());
        }
    }

    RoundScoring {
        results,
        scores,
        winners: WinnerDataEntity {
            player_ids: winner_ids,
            score: best.unwrap_or(0),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(track_id: &str) -> PlayerSongEntity {
        PlayerSongEntity {
            track_id: track_id.into(),
            name: format!("name {track_id}"),
            artist: "artist".into(),
            preview_url: Some("https://cdn.test/p.mp3".into()),
            submitted_at: 0,
        }
    }

    fn ranking(ranks: &[(&str, u32)]) -> RankingEntity {
        RankingEntity {
            rankings: ranks.iter().map(|(id, r)| ((*id).to_owned(), *r)).collect(),
            submitted_at: 0,
        }
    }

    fn names(ids: &[&str]) -> HashMap<String, String> {
        ids.iter()
            .map(|id| ((*id).to_owned(), id.to_uppercase()))
            .collect()
    }

    #[test]
    fn placement_points_share_tied_blocks() {
        assert_eq!(placement_points(&[1, 1]), vec![1, 1]);
        assert_eq!(placement_points(&[2, 3, 5]), vec![3, 2, 1]);
        assert_eq!(placement_points(&[1, 4, 4, 9]), vec![4, 2, 2, 1]);
        assert_eq!(placement_points(&[]), Vec::<i64>::new());
    }

    #[test]
    fn two_players_ranking_each_other_first_tie() {
        let songs = BTreeMap::from([("p1".to_string(), song("a")), ("p2".to_string(), song("b"))]);
        let rankings = vec![
            ("p1".to_string(), ranking(&[("b", 1)])),
            ("p2".to_string(), ranking(&[("a", 1)])),
        ];

        let scoring = score_round(&songs, &names(&["p1", "p2"]), &rankings);

        assert_eq!(scoring.scores["p1"].total_score_for_round, 1);
        assert_eq!(scoring.scores["p2"].total_score_for_round, 1);
        assert_eq!(scoring.winners.score, 1);
        assert_eq!(
            scoring.winners.player_ids,
            vec!["p1".to_string(), "p2".to_string()]
        );
        assert!(scoring.results.iter().all(|result| result.is_winner));
        assert_eq!(scoring.results[0].player_name, "P1");
    }

    #[test]
    fn untied_points_are_conserved_and_best_wins() {
        let songs = BTreeMap::from([
            ("p1".to_string(), song("a")),
            ("p2".to_string(), song("b")),
            ("p3".to_string(), song("c")),
        ]);
        let rankings = vec![
            ("p1".to_string(), ranking(&[("b", 1), ("c", 2)])),
            ("p2".to_string(), ranking(&[("a", 1), ("c", 2)])),
            ("p3".to_string(), ranking(&[("a", 1), ("b", 2)])),
        ];

        let scoring = score_round(&songs, &names(&["p1", "p2", "p3"]), &rankings);

        let total: i64 = scoring.results.iter().map(|result| result.points).sum();
        assert_eq!(total, 3 + 2 + 1);
        assert_eq!(scoring.scores["p1"].round_score, 3);
        assert_eq!(scoring.scores["p2"].round_score, 2);
        assert_eq!(scoring.scores["p3"].round_score, 1);
        assert_eq!(scoring.winners.player_ids, vec!["p1".to_string()]);
        assert_eq!(scoring.results[0].track_id, "a");
    }

    #[test]
    fn duplicate_nominations_are_penalised() {
        let songs = BTreeMap::from([
            ("p1".to_string(), song("a")),
            ("p2".to_string(), song("a")),
            ("p3".to_string(), song("a")),
            ("p4".to_string(), song("d")),
        ]);
        let rankings = vec![
            ("p1".to_string(), ranking(&[("d", 1)])),
            ("p2".to_string(), ranking(&[("d", 1)])),
            ("p3".to_string(), ranking(&[("d", 1)])),
            ("p4".to_string(), ranking(&[("a", 1)])),
        ];

        let scoring = score_round(&songs, &names(&["p1", "p2", "p3", "p4"]), &rankings);

        // `a` sums 1 and `d` sums 3: a earns 2, d earns 1
        for player in ["p1", "p2", "p3"] {
            assert_eq!(scoring.scores[player].duplicate_penalty, -2);
            assert_eq!(scoring.scores[player].round_score, 0);
        }
        assert_eq!(scoring.scores["p4"].round_score, 1);
        assert_eq!(scoring.winners.player_ids, vec!["p4".to_string()]);
        assert_eq!(scoring.results.len(), 4);
    }

    #[test]
    fn ranks_for_padding_songs_are_ignored() {
        let songs = BTreeMap::from([("p1".to_string(), song("a")), ("p2".to_string(), song("b"))]);
        let rankings = vec![
            ("p1".to_string(), ranking(&[("x", 1), ("b", 2)])),
            ("p2".to_string(), ranking(&[("a", 1), ("x", 2)])),
        ];

        let scoring = score_round(&songs, &names(&["p1", "p2"]), &rankings);

        assert_eq!(scoring.results.len(), 2);
        assert_eq!(scoring.scores["p2"].round_score, 1);
        assert_eq!(scoring.scores["p1"].round_score, 2);
    }
}
