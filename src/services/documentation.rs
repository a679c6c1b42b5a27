use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Setlist Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::game_stream,
        crate::routes::game::create_game,
        crate::routes::game::join_game,
        crate::routes::game::get_game,
        crate::routes::game::start_game,
        crate::routes::game::update_game_settings,
        crate::routes::round::get_round,
        crate::routes::round::set_challenge,
        crate::routes::round::start_selection_phase,
        crate::routes::round::submit_song_nomination,
        crate::routes::round::start_ranking_phase,
        crate::routes::round::control_playback,
        crate::routes::round::submit_ranking,
        crate::routes::round::start_next_round,
        crate::routes::round::search_music_tracks,
        crate::routes::challenge::get_predefined_challenges,
        crate::routes::challenge::get_challenge_details,
        crate::routes::admin::calculate_scores,
        crate::routes::admin::seed_challenge,
    ),
    components(
        schemas(
            crate::error::ErrorBody,
            crate::dto::health::HealthResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::DocumentChange,
            crate::dto::game::CreateGameRequest,
            crate::dto::game::JoinGameRequest,
            crate::dto::game::SessionResponse,
            crate::dto::game::GameSettingsDto,
            crate::dto::game::GameView,
            crate::dto::game::PlayerView,
            crate::dto::game::ActionResponse,
            crate::dto::round::SetChallengeRequest,
            crate::dto::round::SearchResultInput,
            crate::dto::round::NominationRequest,
            crate::dto::round::PlaybackAction,
            crate::dto::round::PlaybackRequest,
            crate::dto::round::RankingRequest,
            crate::dto::round::SubmissionResponse,
            crate::dto::round::RoundView,
            crate::dto::round::PoolSongView,
            crate::dto::round::RoundResultView,
            crate::dto::round::WinnerView,
            crate::dto::round::ScoresResponse,
            crate::dto::challenge::PredefinedSongDto,
            crate::dto::challenge::SeedChallengeRequest,
            crate::dto::challenge::SeedChallengeResponse,
            crate::services::catalog::Track,
            crate::state::phase::RoundPhase,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "game", description = "Lobby creation, joining and settings"),
        (name = "round", description = "Round phases, nominations, playback and rankings"),
        (name = "challenge", description = "Predefined challenges"),
        (name = "admin", description = "Operator endpoints guarded by the admin token"),
    )
)]
pub struct ApiDoc;
