//! Slash separated document addresses mirroring the persisted layout
//! (`games/{gameId}/rounds/{roundNumber}/rankings/{playerId}`, ...).

use std::fmt;

pub const GAMES: &str = "games";
pub const PLAYERS: &str = "players";
pub const ROUNDS: &str = "rounds";
pub const RANKINGS: &str = "rankings";
pub const SCORES: &str = "scores";
pub const CHALLENGES: &str = "challenges";
pub const SESSIONS: &str = "sessions";

/// Address of a collection: an odd number of segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

/// Address of a single document: an even number of segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(String);

impl CollectionPath {
    /// Top-level collection.
    pub fn root(name: &str) -> Self {
        Self(name.to_owned())
    }

    /// Address of the document `id` inside this collection.
    pub fn doc(&self, id: &str) -> DocPath {
        DocPath(format!("{}/{}", self.0, id))
    }

    /// Last segment, e.g. `rankings`.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl DocPath {
    /// Parse a raw path, rejecting empty segments and odd segment counts.
    pub fn parse(raw: &str) -> Option<Self> {
        let segments: Vec<&str> = raw.split('/').collect();
        if segments.len() % 2 != 0 || segments.iter().any(|segment| segment.is_empty()) {
            return None;
        }
        Some(Self(raw.to_owned()))
    }

    /// Sub-collection `name` owned by this document.
    pub fn collection(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}", self.0, name))
    }

    /// Collection the document lives in.
    pub fn parent(&self) -> CollectionPath {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => CollectionPath(parent.to_owned()),
            None => CollectionPath(String::new()),
        }
    }

    /// Document identifier (last segment).
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments, alternating collection names and ids.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn game(game_id: &str) -> DocPath {
    CollectionPath::root(GAMES).doc(game_id)
}

pub fn players(game_id: &str) -> CollectionPath {
    game(game_id).collection(PLAYERS)
}

pub fn player(game_id: &str, player_id: &str) -> DocPath {
    players(game_id).doc(player_id)
}

pub fn round(game_id: &str, round_number: u32) -> DocPath {
    game(game_id)
        .collection(ROUNDS)
        .doc(&round_number.to_string())
}

pub fn rankings(game_id: &str, round_number: u32) -> CollectionPath {
    round(game_id, round_number).collection(RANKINGS)
}

pub fn ranking(game_id: &str, round_number: u32, player_id: &str) -> DocPath {
    rankings(game_id, round_number).doc(player_id)
}

pub fn scores(game_id: &str, round_number: u32) -> CollectionPath {
    round(game_id, round_number).collection(SCORES)
}

pub fn score(game_id: &str, round_number: u32, player_id: &str) -> DocPath {
    scores(game_id, round_number).doc(player_id)
}

pub fn challenges() -> CollectionPath {
    CollectionPath::root(CHALLENGES)
}

pub fn challenge(slug: &str) -> DocPath {
    challenges().doc(slug)
}

pub fn session(token: &str) -> DocPath {
    CollectionPath::root(SESSIONS).doc(token)
}

/// Typed view over a document path, used by change subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocTarget<'a> {
    Game { game_id: &'a str },
    Player { game_id: &'a str, player_id: &'a str },
    Round { game_id: &'a str, round_number: u32 },
    Ranking { game_id: &'a str, round_number: u32, player_id: &'a str },
    Score { game_id: &'a str, round_number: u32, player_id: &'a str },
    Challenge { slug: &'a str },
    Session,
    Other,
}

impl DocPath {
    /// Classify the path against the known layout.
    pub fn target(&self) -> DocTarget<'_> {
        let segments: Vec<&str> = self.segments().collect();
        match *segments.as_slice() {
            [GAMES, game_id] => DocTarget::Game { game_id },
            [GAMES, game_id, PLAYERS, player_id] => DocTarget::Player { game_id, player_id },
            [GAMES, game_id, ROUNDS, round] => match round.parse() {
                Ok(round_number) => DocTarget::Round {
                    game_id,
                    round_number,
                },
                Err(_) => DocTarget::Other,
            },
            [GAMES, game_id, ROUNDS, round, RANKINGS, player_id] => match round.parse() {
                Ok(round_number) => DocTarget::Ranking {
                    game_id,
                    round_number,
                    player_id,
                },
                Err(_) => DocTarget::Other,
            },
            [GAMES, game_id, ROUNDS, round, SCORES, player_id] => match round.parse() {
                Ok(round_number) => DocTarget::Score {
                    game_id,
                    round_number,
                    player_id,
                },
                Err(_) => DocTarget::Other,
            },
            [CHALLENGES, slug] => DocTarget::Challenge { slug },
            [SESSIONS, _] => DocTarget::Session,
            _ => DocTarget::Other,
        }
    }

    /// Identifier of the game owning this document, if any.
    pub fn game_id(&self) -> Option<&str> {
        let mut segments = self.segments();
        match (segments.next(), segments.next()) {
            (Some(GAMES), Some(game_id)) => Some(game_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_paths() {
        assert_eq!(
            ranking("ABC123", 2, "p1").as_str(),
            "games/ABC123/rounds/2/rankings/p1"
        );
        assert_eq!(rankings("ABC123", 2).name(), "rankings");
        assert_eq!(
            ranking("ABC123", 2, "p1").parent(),
            rankings("ABC123", 2)
        );
    }

    #[test]
    fn classifies_targets() {
        assert_eq!(
            round("G", 3).target(),
            DocTarget::Round {
                game_id: "G",
                round_number: 3
            }
        );
        assert_eq!(session("tok").target(), DocTarget::Session);
        assert_eq!(score("G", 1, "p").game_id(), Some("G"));
        assert_eq!(challenge("eighties").game_id(), None);
    }

    #[test]
    fn rejects_collection_paths_as_documents() {
        assert!(DocPath::parse("games").is_none());
        assert!(DocPath::parse("games//players/x").is_none());
        assert!(DocPath::parse("games/G").is_some());
    }
}
