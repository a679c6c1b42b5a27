use rand::Rng;
use time::OffsetDateTime;

/// Music catalog providers.
pub mod catalog;
/// Predefined challenges and their seeding.
pub mod challenge_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Game lifecycle: create, join, start and settings.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Session-token caller identity.
pub mod identity;
/// Round lifecycle: the phase state machine, nominations and playback.
pub mod round_service;
/// Pure rank-sum scoring.
pub mod scoring;
/// Transactional scoring of a round.
pub mod scoring_service;
/// Store subscription launching scoring when a round enters `scoring`.
pub mod scoring_trigger;
/// Listening pool assembly.
pub mod song_pool;
/// Server-Sent Events forwarding of game changes.
pub mod sse_service;
/// Storage connection supervisor.
pub mod storage_supervisor;

/// Current time in milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Uniform index in `0..len`; `len` must be non-zero.
pub(crate) fn random_index(len: usize) -> usize {
    rand::rng().random_range(0..len)
}
