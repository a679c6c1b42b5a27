//! Typed access to the game documents.
//!
//! Every operation takes an optional [`Transaction`]. With a transaction, reads
//! go through it and writes are staged until the caller commits; without one,
//! reads hit the store directly and each write commits on its own.

use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use serde_with::skip_serializing_none;

use crate::{
    dao::{
        document_store::{DocumentStore, FilterValue, Query, Transaction, Write},
        models::{
            ChallengeEntity, GameEntity, GameSettingsEntity, PlayerEntity, PlayerSongEntity,
            RankingEntity, RankingSongEntity, RoundEntity, RoundResultEntity, ScoreEntity,
            SessionEntity, WinnerDataEntity,
        },
        paths::{self, CollectionPath, DocPath},
        storage::{StorageError, StorageResult},
    },
    state::phase::{GameStatus, RoundPhase},
};

/// Partial update of a game document; `None` fields are left untouched.
#[skip_serializing_none]
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GamePatch {
    pub status: Option<GameStatus>,
    pub current_round: Option<u32>,
    pub total_rounds: Option<u32>,
    pub max_players: Option<u32>,
    pub round_host_player_id: Option<String>,
    pub challenge: Option<String>,
    pub settings: Option<GameSettingsEntity>,
    pub started_at: Option<i64>,
}

/// Partial update of a round document; `None` fields are left untouched.
#[skip_serializing_none]
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundPatch {
    pub status: Option<RoundPhase>,
    pub challenge: Option<String>,
    pub player_songs: Option<std::collections::BTreeMap<String, PlayerSongEntity>>,
    pub songs_for_ranking: Option<Vec<RankingSongEntity>>,
    pub current_playing_track_index: Option<usize>,
    pub is_playing: Option<bool>,
    pub selection_start_time: Option<i64>,
    pub ranking_start_time: Option<i64>,
    pub results: Option<Vec<RoundResultEntity>>,
    pub winner_data: Option<WinnerDataEntity>,
}

/// Store Access Layer over the game, player, round and challenge documents.
#[derive(Clone)]
pub struct GameRepository {
    store: Arc<dyn DocumentStore>,
}

fn encode<T: Serialize>(path: &DocPath, value: &T) -> StorageResult<Value> {
    serde_json::to_value(value).map_err(|source| StorageError::Encode {
        path: path.to_string(),
        source,
    })
}

fn decode<T: DeserializeOwned>(path: &DocPath, value: Value) -> StorageResult<T> {
    serde_json::from_value(value).map_err(|source| StorageError::Decode {
        path: path.to_string(),
        source,
    })
}

fn patch_fields<T: Serialize>(path: &DocPath, patch: &T) -> StorageResult<Map<String, Value>> {
    match encode(path, patch)? {
        Value::Object(fields) => Ok(fields),
        _ => Ok(Map::new()),
    }
}

impl GameRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Underlying store, used to open transactions and subscribe to changes.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    async fn read<T: DeserializeOwned>(
        &self,
        tx: Option<&Transaction>,
        path: DocPath,
    ) -> StorageResult<Option<T>> {
        let raw = match tx {
            Some(tx) => tx.get(&path).await?,
            None => self.store.get(path.clone()).await?,
        };
        raw.map(|value| decode(&path, value)).transpose()
    }

    /// Decode every document of a collection, keyed by document id.
    async fn read_all<T: DeserializeOwned>(
        &self,
        tx: Option<&Transaction>,
        collection: CollectionPath,
    ) -> StorageResult<Vec<(String, T)>> {
        let docs = match tx {
            Some(tx) => tx.list(&collection).await?,
            None => self.store.list(collection).await?,
        };
        docs.into_iter()
            .map(|doc| {
                let id = doc.path.id().to_owned();
                decode(&doc.path, doc.data).map(|entity| (id, entity))
            })
            .collect()
    }

    async fn write(&self, tx: Option<&Transaction>, write: Write) -> StorageResult<()> {
        match tx {
            Some(tx) => tx.stage(write).await,
            None => self.store.commit(vec![write]).await,
        }
    }

    async fn create<T: Serialize>(
        &self,
        tx: Option<&Transaction>,
        path: DocPath,
        entity: &T,
    ) -> StorageResult<()> {
        let data = encode(&path, entity)?;
        self.write(tx, Write::Create { path, data }).await
    }

    async fn update<T: Serialize>(
        &self,
        tx: Option<&Transaction>,
        path: DocPath,
        patch: &T,
    ) -> StorageResult<()> {
        let fields = patch_fields(&path, patch)?;
        self.write(tx, Write::Update { path, fields }).await
    }

    pub async fn get_game(
        &self,
        tx: Option<&Transaction>,
        game_id: &str,
    ) -> StorageResult<Option<GameEntity>> {
        self.read(tx, paths::game(game_id)).await
    }

    pub async fn create_game(
        &self,
        tx: Option<&Transaction>,
        game_id: &str,
        game: &GameEntity,
    ) -> StorageResult<()> {
        self.create(tx, paths::game(game_id), game).await
    }

    pub async fn update_game(
        &self,
        tx: Option<&Transaction>,
        game_id: &str,
        patch: &GamePatch,
    ) -> StorageResult<()> {
        self.update(tx, paths::game(game_id), patch).await
    }

    /// Oldest games still waiting for players, by creation time.
    pub async fn find_waiting_games(
        &self,
        offset: usize,
        limit: usize,
    ) -> StorageResult<Vec<(String, GameEntity)>> {
        let query = Query::new(CollectionPath::root(paths::GAMES))
            .where_eq("status", FilterValue::Str(GameStatus::Waiting.to_string()))
            .order_by("createdAt")
            .offset(offset)
            .limit(limit);
        self.store
            .query(query)
            .await?
            .into_iter()
            .map(|doc| {
                let id = doc.path.id().to_owned();
                decode(&doc.path, doc.data).map(|game| (id, game))
            })
            .collect()
    }

    /// Atomic add to `playerCount`.
    pub async fn increment_player_count(
        &self,
        tx: Option<&Transaction>,
        game_id: &str,
        by: i64,
    ) -> StorageResult<()> {
        let write = Write::Increment {
            path: paths::game(game_id),
            field: "playerCount".into(),
            by,
        };
        self.write(tx, write).await
    }

    pub async fn get_player(
        &self,
        tx: Option<&Transaction>,
        game_id: &str,
        player_id: &str,
    ) -> StorageResult<Option<PlayerEntity>> {
        self.read(tx, paths::player(game_id, player_id)).await
    }

    pub async fn list_players(
        &self,
        tx: Option<&Transaction>,
        game_id: &str,
    ) -> StorageResult<Vec<(String, PlayerEntity)>> {
        self.read_all(tx, paths::players(game_id)).await
    }

    pub async fn create_player(
        &self,
        tx: Option<&Transaction>,
        game_id: &str,
        player_id: &str,
        player: &PlayerEntity,
    ) -> StorageResult<()> {
        self.create(tx, paths::player(game_id, player_id), player)
            .await
    }

    /// Atomic add to the running `score` of a player.
    pub async fn increment_player_score(
        &self,
        tx: Option<&Transaction>,
        game_id: &str,
        player_id: &str,
        by: i64,
    ) -> StorageResult<()> {
        let write = Write::Increment {
            path: paths::player(game_id, player_id),
            field: "score".into(),
            by,
        };
        self.write(tx, write).await
    }

    pub async fn get_round(
        &self,
        tx: Option<&Transaction>,
        game_id: &str,
        round_number: u32,
    ) -> StorageResult<Option<RoundEntity>> {
        self.read(tx, paths::round(game_id, round_number)).await
    }

    pub async fn create_round(
        &self,
        tx: Option<&Transaction>,
        game_id: &str,
        round: &RoundEntity,
    ) -> StorageResult<()> {
        self.create(tx, paths::round(game_id, round.round_number), round)
            .await
    }

    pub async fn update_round(
        &self,
        tx: Option<&Transaction>,
        game_id: &str,
        round_number: u32,
        patch: &RoundPatch,
    ) -> StorageResult<()> {
        self.update(tx, paths::round(game_id, round_number), patch)
            .await
    }

    pub async fn get_ranking(
        &self,
        tx: Option<&Transaction>,
        game_id: &str,
        round_number: u32,
        player_id: &str,
    ) -> StorageResult<Option<RankingEntity>> {
        self.read(tx, paths::ranking(game_id, round_number, player_id))
            .await
    }

    pub async fn list_rankings(
        &self,
        tx: Option<&Transaction>,
        game_id: &str,
        round_number: u32,
    ) -> StorageResult<Vec<(String, RankingEntity)>> {
        self.read_all(tx, paths::rankings(game_id, round_number))
            .await
    }

    pub async fn create_ranking(
        &self,
        tx: Option<&Transaction>,
        game_id: &str,
        round_number: u32,
        player_id: &str,
        ranking: &RankingEntity,
    ) -> StorageResult<()> {
        self.create(tx, paths::ranking(game_id, round_number, player_id), ranking)
            .await
    }

    pub async fn list_scores(
        &self,
        tx: Option<&Transaction>,
        game_id: &str,
        round_number: u32,
    ) -> StorageResult<Vec<(String, ScoreEntity)>> {
        self.read_all(tx, paths::scores(game_id, round_number)).await
    }

    pub async fn create_score(
        &self,
        tx: Option<&Transaction>,
        game_id: &str,
        round_number: u32,
        player_id: &str,
        score: &ScoreEntity,
    ) -> StorageResult<()> {
        self.create(tx, paths::score(game_id, round_number, player_id), score)
            .await
    }

    pub async fn get_challenge(
        &self,
        tx: Option<&Transaction>,
        slug: &str,
    ) -> StorageResult<Option<ChallengeEntity>> {
        self.read(tx, paths::challenge(slug)).await
    }

    pub async fn list_challenges(
        &self,
        tx: Option<&Transaction>,
    ) -> StorageResult<Vec<(String, ChallengeEntity)>> {
        self.read_all(tx, paths::challenges()).await
    }

    /// Insert or replace a challenge.
    pub async fn put_challenge(
        &self,
        tx: Option<&Transaction>,
        slug: &str,
        challenge: &ChallengeEntity,
    ) -> StorageResult<()> {
        let path = paths::challenge(slug);
        let data = encode(&path, challenge)?;
        self.write(tx, Write::Set { path, data }).await
    }

    pub async fn get_session(
        &self,
        tx: Option<&Transaction>,
        token: &str,
    ) -> StorageResult<Option<SessionEntity>> {
        self.read(tx, paths::session(token)).await
    }

    pub async fn create_session(
        &self,
        tx: Option<&Transaction>,
        token: &str,
        session: &SessionEntity,
    ) -> StorageResult<()> {
        self.create(tx, paths::session(token), session).await
    }
}
