//! Supabase REST API client using service_role key

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{info, warn};

use super::{GameId, GameStore, SaveMeta, SaveRecord, SavedGame, StoreError, UserId};

const GAMES_TABLE: &str = "games";

/// Supabase client for server-side database operations
/// Uses service_role key which bypasses RLS - handle with care!
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_role_key: String,
}

impl SupabaseClient {
    pub fn new(base_url: impl Into<String>, service_role_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_role_key: service_role_key.into(),
        }
    }

    /// Get the REST API URL for a table
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header("Content-Type", "application/json")
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SupabaseError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SupabaseError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Make an authenticated GET request expecting a single row
    pub async fn get_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
    ) -> Result<Option<T>, SupabaseError> {
        let url = format!("{}?{}", self.rest_url(table), query);

        let response = self
            .authed(self.client.get(&url))
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        if response.status() == reqwest::StatusCode::NOT_ACCEPTABLE {
            // No rows found
            return Ok(None);
        }

        let response = Self::check(response).await?;
        response.json().await.map(Some).map_err(SupabaseError::Parse)
    }

    /// Make an authenticated POST request (insert)
    pub async fn insert<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        data: &T,
    ) -> Result<R, SupabaseError> {
        let response = self
            .authed(self.client.post(self.rest_url(table)))
            .header("Prefer", "return=representation")
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        let response = Self::check(response).await?;

        // PostgREST returns an array, get first element
        let results: Vec<R> = response.json().await.map_err(SupabaseError::Parse)?;
        results
            .into_iter()
            .next()
            .ok_or(SupabaseError::NoRowReturned)
    }

    /// Make an authenticated PATCH request (update)
    pub async fn update<T: Serialize>(
        &self,
        table: &str,
        query: &str,
        data: &T,
    ) -> Result<(), SupabaseError> {
        let url = format!("{}?{}", self.rest_url(table), query);

        let response = self
            .authed(self.client.patch(&url))
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        Self::check(response).await?;
        Ok(())
    }
}

/// Row of the games table
#[derive(Debug, Clone, Deserialize)]
struct GameRow {
    id: GameId,
    player1_id: UserId,
    player2_id: UserId,
    snapshot: Option<serde_json::Value>,
    meta: Option<serde_json::Value>,
}

/// New game for insertion
#[derive(Debug, Clone, Serialize)]
struct NewGameRow {
    player1_id: UserId,
    player2_id: UserId,
}

/// Columns written by a save
#[derive(Debug, Clone, Serialize)]
struct GameSaveRow {
    snapshot: serde_json::Value,
    meta: SaveMeta,
    updated_at: DateTime<Utc>,
}

impl GameRow {
    fn into_saved(self) -> SavedGame {
        // Rows written by older servers may carry meta in another shape
        let meta = self.meta.and_then(|raw| match serde_json::from_value(raw) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(game_id = self.id, error = %e, "Ignoring unreadable save meta");
                None
            }
        });
        SavedGame {
            id: self.id,
            player1_id: self.player1_id,
            player2_id: self.player2_id,
            snapshot: self.snapshot,
            meta,
        }
    }
}

/// Game store backed by the Supabase `games` table
#[derive(Clone)]
pub struct SupabaseGameStore {
    client: SupabaseClient,
}

impl SupabaseGameStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GameStore for SupabaseGameStore {
    async fn create_game(&self, player1: UserId, player2: UserId) -> Result<GameId, StoreError> {
        if player1 == player2 {
            return Err(StoreError::SamePlayer);
        }

        let row: GameRow = self
            .client
            .insert(
                GAMES_TABLE,
                &NewGameRow {
                    player1_id: player1,
                    player2_id: player2,
                },
            )
            .await?;

        info!(game_id = row.id, player1, player2, "Persisted game created");
        Ok(row.id)
    }

    async fn load_game(&self, game_id: GameId) -> Result<SavedGame, StoreError> {
        let query = format!(
            "id=eq.{}&select=id,player1_id,player2_id,snapshot,meta",
            game_id
        );
        let row: Option<GameRow> = self.client.get_one(GAMES_TABLE, &query).await?;
        row.map(GameRow::into_saved)
            .ok_or(StoreError::GameNotFound(game_id))
    }

    async fn save_game(&self, game_id: GameId, record: SaveRecord) -> Result<(), StoreError> {
        let query = format!("id=eq.{}", game_id);
        let row = GameSaveRow {
            snapshot: record.snapshot,
            meta: record.meta,
            updated_at: Utc::now(),
        };
        self.client.update(GAMES_TABLE, &query, &row).await?;
        Ok(())
    }
}

/// Supabase errors
#[derive(Debug, thiserror::Error)]
pub enum SupabaseError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),

    #[error("No row returned from insert")]
    NoRowReturned,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rest_urls_ignore_trailing_slash() {
        let client = SupabaseClient::new("https://db.example.com/", "key");
        assert_eq!(client.rest_url("games"), "https://db.example.com/rest/v1/games");
    }

    #[test]
    fn rows_with_foreign_meta_still_load() {
        let row: GameRow = serde_json::from_value(json!({
            "id": 4,
            "player1_id": 10,
            "player2_id": 11,
            "snapshot": { "gameStarted": false },
            "meta": { "savedBy": "someone" },
        }))
        .unwrap();

        let saved = row.into_saved();
        assert_eq!(saved.slot_of(11), Some(1));
        assert!(saved.snapshot.is_some());
        assert_eq!(saved.meta, None);
    }
}
