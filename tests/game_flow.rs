use std::{collections::BTreeMap, sync::Arc, time::Duration};

use setlist_back::{
    config::AppConfig,
    dao::{
        document_store::memory::MemoryStore,
        models::{ChallengeEntity, PredefinedSongEntity},
    },
    dto::{
        game::{CreateGameRequest, GameSettingsDto, JoinGameRequest, SessionResponse},
        round::{
            NominationRequest, PlaybackAction, PlaybackRequest, RankingRequest,
            SearchResultInput, SetChallengeRequest, TrackSearchQuery,
        },
    },
    error::ServiceError,
    services::{
        catalog::{StaticCatalog, Track},
        challenge_service::slugify,
        game_service,
        identity::CallerIdentity,
        round_service::{self, NextRound},
        scoring_service, scoring_trigger,
    },
    state::{AppState, SharedState, phase::RoundPhase},
};

fn catalog_track(id: &str, name: &str, explicit: bool) -> Track {
    Track {
        id: id.into(),
        name: name.into(),
        artist: "The Testers".into(),
        album: None,
        preview_url: Some(format!("https://cdn.test/{id}.mp3")),
        explicit,
    }
}

async fn setup() -> SharedState {
    let catalog = StaticCatalog::new(vec![
        catalog_track("r1", "Rain Song", false),
        catalog_track("r2", "Rain Dance", true),
        catalog_track("r3", "November Rain", false),
    ]);
    let state = AppState::new(AppConfig::default(), Arc::new(catalog));
    state.set_store(Arc::new(MemoryStore::new())).await;
    state
}

fn caller(session: &SessionResponse) -> CallerIdentity {
    CallerIdentity {
        game_id: session.game_id.clone(),
        player_id: session.player_id.clone(),
    }
}

fn settings(max_players: u32, allow_explicit: bool) -> GameSettingsDto {
    GameSettingsDto {
        rounds: 3,
        max_players,
        allow_explicit,
        selection_time_limit: Some(90),
        ranking_time_limit: Some(60),
    }
}

async fn create(state: &SharedState, name: &str) -> SessionResponse {
    game_service::create_game(
        state,
        CreateGameRequest {
            player_name: name.into(),
            total_rounds: Some(3),
        },
    )
    .await
    .unwrap()
}

async fn join(
    state: &SharedState,
    game_id: &str,
    name: &str,
) -> Result<SessionResponse, ServiceError> {
    game_service::join_game(
        state,
        JoinGameRequest {
            player_name: name.into(),
            game_id: Some(game_id.into()),
        },
    )
    .await
}

fn search_nomination(track_id: &str) -> NominationRequest {
    NominationRequest {
        search_result: Some(SearchResultInput {
            track_id: track_id.into(),
            name: format!("Song {track_id}"),
            artist: "Someone".into(),
            preview_url: None,
        }),
        predefined_track_id: None,
    }
}

fn ranking(pairs: &[(&str, u32)]) -> RankingRequest {
    RankingRequest {
        rankings: pairs
            .iter()
            .map(|(track, rank)| (track.to_string(), *rank))
            .collect::<BTreeMap<_, _>>(),
    }
}

/// Caller among `players` that hosts the current round.
async fn host_of(
    state: &SharedState,
    game_id: &str,
    players: &[CallerIdentity],
) -> CallerIdentity {
    let game = game_service::get_game(state, game_id).await.unwrap();
    let host = game.round_host_player_id.unwrap();
    players
        .iter()
        .find(|player| player.player_id == host)
        .cloned()
        .unwrap()
}

async fn open_selection(
    state: &SharedState,
    game_id: &str,
    round: u32,
    host: &CallerIdentity,
    challenge: &str,
) {
    let request = SetChallengeRequest {
        challenge: challenge.into(),
    };
    round_service::set_challenge(state, host, game_id, round, request)
        .await
        .unwrap();
    round_service::start_selection_phase(state, host, game_id)
        .await
        .unwrap();
}

/// Game with `names` joined and started, its first round open for nominations.
async fn game_in_selection(
    state: &SharedState,
    names: &[&str],
) -> (String, Vec<CallerIdentity>) {
    let creator = create(state, names[0]).await;
    let game_id = creator.game_id.clone();
    let mut players = vec![caller(&creator)];
    for name in &names[1..] {
        players.push(caller(&join(state, &game_id, name).await.unwrap()));
    }

    game_service::start_game(state, &players[0], &game_id)
        .await
        .unwrap();
    let host = host_of(state, &game_id, &players).await;
    open_selection(state, &game_id, 1, &host, "Songs about trains").await;
    (game_id, players)
}

/// Two players nominate distinct tracks, rank each other and the round is scored.
async fn play_two_player_round(
    state: &SharedState,
    game_id: &str,
    round: u32,
    players: &[CallerIdentity; 2],
) {
    let host = host_of(state, game_id, players).await;
    let challenge = format!("Challenge number {round}");
    open_selection(state, game_id, round, &host, &challenge).await;

    let (a, b) = (format!("a{round}"), format!("b{round}"));
    round_service::submit_song_nomination(state, &players[0], game_id, search_nomination(&a))
        .await
        .unwrap();
    round_service::submit_song_nomination(state, &players[1], game_id, search_nomination(&b))
        .await
        .unwrap();
    round_service::start_ranking_phase(state, &host, game_id)
        .await
        .unwrap();
    round_service::submit_ranking(state, &players[0], game_id, ranking(&[(&b, 1)]))
        .await
        .unwrap();
    round_service::submit_ranking(state, &players[1], game_id, ranking(&[(&a, 1)]))
        .await
        .unwrap();

    let repository = state.repository().await.unwrap();
    scoring_service::calculate_scores(&repository, game_id, round)
        .await
        .unwrap();
}

#[tokio::test]
async fn two_players_play_a_full_round() {
    let state = setup().await;
    let ann = create(&state, "Ann").await;
    let game_id = ann.game_id.clone();
    let bob = join(&state, &game_id, "Bob").await.unwrap();
    let players = [caller(&ann), caller(&bob)];

    let repository = state.repository().await.unwrap();
    let curated = (1..=4)
        .map(|i| PredefinedSongEntity {
            track_id: format!("c{i}"),
            title: format!("Curated {i}"),
            artist: "Archive".into(),
            preview_url: None,
        })
        .collect();
    repository
        .put_challenge(
            None,
            &slugify("Songs about rain"),
            &ChallengeEntity {
                text: "Songs about rain".into(),
                predefined_songs: curated,
            },
        )
        .await
        .unwrap();

    game_service::start_game(&state, &players[0], &game_id)
        .await
        .unwrap();
    let game = game_service::get_game(&state, &game_id).await.unwrap();
    assert_eq!(game.status, "round1_announcing");
    assert_eq!(game.current_round, 1);

    let host = host_of(&state, &game_id, &players).await;
    let guest = players
        .iter()
        .find(|player| player.player_id != host.player_id)
        .cloned()
        .unwrap();

    let request = SetChallengeRequest {
        challenge: "Songs about rain".into(),
    };
    let err = round_service::set_challenge(&state, &guest, &game_id, 1, request)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PermissionDenied(_)));

    open_selection(&state, &game_id, 1, &host, "Songs about rain").await;

    let ann_song = search_nomination("t1");
    let first = round_service::submit_song_nomination(&state, &players[0], &game_id, ann_song)
        .await
        .unwrap();
    assert!(!first.phase_completed);
    let second = search_nomination("t9");
    let err = round_service::submit_song_nomination(&state, &players[0], &game_id, second)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyExists(_)));

    let predefined = NominationRequest {
        search_result: None,
        predefined_track_id: Some("c1".into()),
    };
    let last = round_service::submit_song_nomination(&state, &players[1], &game_id, predefined)
        .await
        .unwrap();
    assert!(last.phase_completed);

    let round = round_service::get_round(&state, &game_id, 1).await.unwrap();
    assert_eq!(round.status, RoundPhase::Listening);
    assert_eq!(round.songs_for_ranking.len(), 5);
    assert!(round.songs_for_ranking.iter().all(|song| song.submitted_by.is_none()));

    let next = PlaybackRequest {
        action: PlaybackAction::Next,
        target_index: None,
    };
    round_service::control_playback(&state, &host, &game_id, next)
        .await
        .unwrap();
    let round = round_service::get_round(&state, &game_id, 1).await.unwrap();
    assert_eq!(round.current_playing_track_index, 1);

    round_service::start_ranking_phase(&state, &host, &game_id)
        .await
        .unwrap();

    let rejected = [
        ranking(&[("t1", 1)]),
        ranking(&[("c1", 1)]),
        ranking(&[("c1", 1), ("c2", 1), ("c3", 2), ("c4", 3)]),
    ];
    for invalid in rejected {
        let err = round_service::submit_ranking(&state, &players[0], &game_id, invalid)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    let ann_ranking = ranking(&[("c1", 1), ("c2", 2), ("c3", 3), ("c4", 4)]);
    let first = round_service::submit_ranking(&state, &players[0], &game_id, ann_ranking)
        .await
        .unwrap();
    assert!(!first.phase_completed);
    let repeat = ranking(&[("c1", 1), ("c2", 2), ("c3", 3), ("c4", 4)]);
    let err = round_service::submit_ranking(&state, &players[0], &game_id, repeat)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyExists(_)));
    let bob_ranking = ranking(&[("t1", 1), ("c2", 2), ("c3", 3), ("c4", 4)]);
    let last = round_service::submit_ranking(&state, &players[1], &game_id, bob_ranking)
        .await
        .unwrap();
    assert!(last.phase_completed);

    let game = game_service::get_game(&state, &game_id).await.unwrap();
    assert_eq!(game.status, "round1_scoring");

    let scoring = scoring_service::calculate_scores(&repository, &game_id, 1)
        .await
        .unwrap();
    assert_eq!(scoring.winners.player_ids.len(), 2);
    assert!(scoring.scores.values().all(|score| score.total_score_for_round == 1));

    let game = game_service::get_game(&state, &game_id).await.unwrap();
    assert_eq!(game.status, "round1_finished");
    assert!(game.players.iter().all(|player| player.score == 1));

    let round = round_service::get_round(&state, &game_id, 1).await.unwrap();
    assert_eq!(round.status, RoundPhase::Finished);
    assert!(!round.is_playing);
    assert_eq!(round.winner_data.unwrap().score, 1);

    let next = round_service::start_next_round(&state, &host, &game_id)
        .await
        .unwrap();
    assert_eq!(
        next,
        NextRound::Started {
            round_number: 2,
            host_player_id: guest.player_id.clone(),
        }
    );
    let game = game_service::get_game(&state, &game_id).await.unwrap();
    assert_eq!(game.status, "round2_announcing");
    assert_eq!(
        game.round_host_player_id.as_deref(),
        Some(guest.player_id.as_str())
    );
}

#[tokio::test]
async fn lobby_enforces_capacity_names_and_phase() {
    let state = setup().await;
    let ann = create(&state, "Ann").await;
    let game_id = ann.game_id.clone();

    let err = game_service::start_game(&state, &caller(&ann), &game_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));

    game_service::update_game_settings(&state, &caller(&ann), &game_id, settings(3, false))
        .await
        .unwrap();

    let err = join(&state, &game_id, "Ann").await.unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyExists(_)));

    let bob = join(&state, &game_id, "Bob").await.unwrap();
    let cleo = game_service::join_game(
        &state,
        JoinGameRequest {
            player_name: "Cleo".into(),
            game_id: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(cleo.game_id, game_id);

    let err = join(&state, &game_id, "Dan").await.unwrap_err();
    assert!(matches!(err, ServiceError::ResourceExhausted(_)));
    let err = join(&state, "NOPE00", "Dan").await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let err = game_service::start_game(&state, &caller(&bob), "NOPE00")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PermissionDenied(_)));

    game_service::start_game(&state, &caller(&bob), &game_id)
        .await
        .unwrap();
    let err = game_service::start_game(&state, &caller(&ann), &game_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));

    let early = search_nomination("t1");
    let err = round_service::submit_song_nomination(&state, &caller(&ann), &game_id, early)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
}

#[tokio::test]
async fn joining_without_a_code_skips_past_full_lobbies() {
    let state = setup().await;
    for lobby in 0..21 {
        let creator = create(&state, "Host").await;
        game_service::update_game_settings(
            &state,
            &caller(&creator),
            &creator.game_id,
            settings(3, false),
        )
        .await
        .unwrap();
        for guest in ["Guest A", "Guest B"] {
            join(&state, &creator.game_id, guest).await.unwrap();
        }
        let game = game_service::get_game(&state, &creator.game_id)
            .await
            .unwrap();
        assert_eq!(game.player_count, 3, "lobby {lobby} should be full");
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
    let open = create(&state, "Zoe").await;

    let joined = game_service::join_game(
        &state,
        JoinGameRequest {
            player_name: "Yann".into(),
            game_id: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(joined.game_id, open.game_id);
}

#[tokio::test]
async fn only_the_creator_changes_settings() {
    let state = setup().await;
    let ann = create(&state, "Ann").await;
    let bob = join(&state, &ann.game_id, "Bob").await.unwrap();
    let before = game_service::get_game(&state, &ann.game_id).await.unwrap();

    let changed = GameSettingsDto {
        rounds: 5,
        max_players: 4,
        allow_explicit: true,
        selection_time_limit: None,
        ranking_time_limit: None,
    };
    let err = game_service::update_game_settings(&state, &caller(&bob), &ann.game_id, changed)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PermissionDenied(_)));

    let after = game_service::get_game(&state, &ann.game_id).await.unwrap();
    assert_eq!(after.settings, before.settings);
    assert_eq!(after.total_rounds, 3);
}

#[tokio::test]
async fn search_follows_the_explicit_setting() {
    let state = setup().await;
    let ann = create(&state, "Ann").await;
    let player = caller(&ann);

    let query = |allow_explicit| TrackSearchQuery {
        query: "rain".into(),
        allow_explicit,
    };
    let clean = round_service::search_music_tracks(&state, &player, &ann.game_id, query(Some(true)))
        .await
        .unwrap();
    assert_eq!(
        clean.iter().map(|track| track.id.as_str()).collect::<Vec<_>>(),
        ["r1", "r3"]
    );

    game_service::update_game_settings(&state, &player, &ann.game_id, settings(6, true))
        .await
        .unwrap();
    let all = round_service::search_music_tracks(&state, &player, &ann.game_id, query(None))
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
    let filtered =
        round_service::search_music_tracks(&state, &player, &ann.game_id, query(Some(false)))
            .await
            .unwrap();
    assert_eq!(filtered.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_last_nominations_complete_the_phase_once() {
    let state = setup().await;
    let (game_id, players) = game_in_selection(&state, &["Ann", "Bob", "Cleo"]).await;

    let handles: Vec<_> = players
        .iter()
        .enumerate()
        .map(|(i, player)| {
            let (state, player, game_id) = (state.clone(), player.clone(), game_id.clone());
            tokio::spawn(async move {
                let nomination = search_nomination(&format!("t{i}"));
                round_service::submit_song_nomination(&state, &player, &game_id, nomination).await
            })
        })
        .collect();

    let mut completed = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().phase_completed {
            completed += 1;
        }
    }
    assert_eq!(completed, 1);

    let round = round_service::get_round(&state, &game_id, 1).await.unwrap();
    assert_eq!(round.status, RoundPhase::Listening);
    assert_eq!(round.nominated_player_ids.len(), 3);
    assert_eq!(round.songs_for_ranking.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_rankings_flip_to_scoring_once_and_reject_repeats() {
    let state = setup().await;
    let (game_id, players) = game_in_selection(&state, &["Ann", "Bob", "Cleo"]).await;
    for (i, player) in players.iter().enumerate() {
        let nomination = search_nomination(&format!("t{i}"));
        round_service::submit_song_nomination(&state, player, &game_id, nomination)
            .await
            .unwrap();
    }
    let host = host_of(&state, &game_id, &players).await;
    round_service::start_ranking_phase(&state, &host, &game_id)
        .await
        .unwrap();

    // Every player submits the same ranking twice at once.
    let handles: Vec<_> = players
        .iter()
        .enumerate()
        .flat_map(|(i, player)| [(i, player.clone()), (i, player.clone())])
        .map(|(i, player)| {
            let (state, game_id) = (state.clone(), game_id.clone());
            tokio::spawn(async move {
                let better = format!("t{}", (i + 1) % 3);
                let worse = format!("t{}", (i + 2) % 3);
                let request = ranking(&[(&better, 1), (&worse, 2)]);
                round_service::submit_ranking(&state, &player, &game_id, request).await
            })
        })
        .collect();

    let (mut accepted, mut duplicates, mut completed) = (0, 0, 0);
    for handle in handles {
        match handle.await.unwrap() {
            Ok(response) => {
                accepted += 1;
                if response.phase_completed {
                    completed += 1;
                }
            }
            Err(ServiceError::AlreadyExists(_)) => duplicates += 1,
            Err(other) => panic!("unexpected ranking error: {other}"),
        }
    }
    assert_eq!((accepted, duplicates, completed), (3, 3, 1));

    let game = game_service::get_game(&state, &game_id).await.unwrap();
    assert_eq!(game.status, "round1_scoring");
    let round = round_service::get_round(&state, &game_id, 1).await.unwrap();
    assert_eq!(round.status, RoundPhase::Scoring);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_fill_the_last_seat_once() {
    let state = setup().await;
    let ann = create(&state, "Ann").await;
    let game_id = ann.game_id.clone();
    game_service::update_game_settings(&state, &caller(&ann), &game_id, settings(3, false))
        .await
        .unwrap();
    join(&state, &game_id, "Bob").await.unwrap();

    let handles: Vec<_> = ["Dan", "Eve", "Fay", "Gus"]
        .into_iter()
        .map(|name| {
            let (state, game_id) = (state.clone(), game_id.clone());
            tokio::spawn(async move { join(&state, &game_id, name).await })
        })
        .collect();

    let (mut joined, mut full) = (0, 0);
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => joined += 1,
            Err(ServiceError::ResourceExhausted(_)) => full += 1,
            Err(other) => panic!("unexpected join error: {other}"),
        }
    }
    assert_eq!((joined, full), (1, 3));

    let game = game_service::get_game(&state, &game_id).await.unwrap();
    assert_eq!(game.player_count, 3);
    assert_eq!(game.players.len(), 3);
}

#[tokio::test]
async fn scoring_runs_when_the_last_ranking_arrives() {
    let state = setup().await;
    let trigger = scoring_trigger::spawn(state.clone());
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (game_id, players) = game_in_selection(&state, &["Ann", "Bob"]).await;
    round_service::submit_song_nomination(&state, &players[0], &game_id, search_nomination("a"))
        .await
        .unwrap();
    round_service::submit_song_nomination(&state, &players[1], &game_id, search_nomination("b"))
        .await
        .unwrap();
    let host = host_of(&state, &game_id, &players).await;
    round_service::start_ranking_phase(&state, &host, &game_id)
        .await
        .unwrap();
    round_service::submit_ranking(&state, &players[0], &game_id, ranking(&[("b", 1)]))
        .await
        .unwrap();
    round_service::submit_ranking(&state, &players[1], &game_id, ranking(&[("a", 1)]))
        .await
        .unwrap();

    let finished = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let round = round_service::get_round(&state, &game_id, 1).await.unwrap();
            if round.status == RoundPhase::Finished {
                return round;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(finished.results.len(), 2);

    let game = game_service::get_game(&state, &game_id).await.unwrap();
    assert_eq!(game.status, "round1_finished");
    trigger.abort();
}

#[tokio::test]
async fn game_finishes_after_the_configured_rounds() {
    let state = setup().await;
    let ann = create(&state, "Ann").await;
    let game_id = ann.game_id.clone();
    let bob = join(&state, &game_id, "Bob").await.unwrap();
    let players = [caller(&ann), caller(&bob)];

    game_service::start_game(&state, &players[0], &game_id)
        .await
        .unwrap();
    for round in 1..=3 {
        play_two_player_round(&state, &game_id, round, &players).await;
        if round < 3 {
            let host = host_of(&state, &game_id, &players).await;
            let next = round_service::start_next_round(&state, &host, &game_id)
                .await
                .unwrap();
            assert!(matches!(
                next,
                NextRound::Started { round_number, .. } if round_number == round + 1
            ));
        }
    }

    let game = game_service::get_game(&state, &game_id).await.unwrap();
    assert_eq!(game.status, "finished");
    assert!(game.players.iter().all(|player| player.score == 3));

    let host = host_of(&state, &game_id, &players).await;
    let next = round_service::start_next_round(&state, &host, &game_id)
        .await
        .unwrap();
    assert_eq!(next, NextRound::GameFinished);

    let repository = state.repository().await.unwrap();
    assert!(repository.get_round(None, &game_id, 4).await.unwrap().is_none());
}
