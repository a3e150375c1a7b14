// Database access layer (SQLite via sqlx): players, games and game sessions.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

const ADJECTIVES: [&str; 7] = ["Fast", "Red", "Clever", "Sneaky", "Brave", "Quick", "Fuzzy"];
const NOUNS: [&str; 7] = ["Tiger", "Robot", "Wizard", "Ninja", "Eagle", "Panther", "Fox"];

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Player {
    pub id: i64,
    pub username: String,
    pub joined_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Game {
    pub id: i64,
    pub status: String,
    pub max_players: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GameSession {
    pub id: i64,
    pub session_token: String,
    pub player_id: i64,
    pub game_id: i64,
}

/// Lifecycle of a game row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Waiting,
    Active,
    Finished,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Waiting => "waiting",
            GameStatus::Active => "active",
            GameStatus::Finished => "finished",
        }
    }
}

/// Everything a join produces: who joined, into which game, and who is there.
#[derive(Debug, Clone)]
pub struct JoinRecord {
    pub player: Player,
    pub game: Game,
    pub session: GameSession,
    pub players: Vec<String>,
}

/// A random `<Adjective><Noun><NNNN>` name. Not checked for uniqueness.
pub fn random_username<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adj = ADJECTIVES.choose(rng).copied().unwrap_or("Quick");
    let noun = NOUNS.choose(rng).copied().unwrap_or("Robot");
    let number: u32 = rng.gen_range(0..10_000);
    format!("{adj}{noun}{number:04}")
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        // Every connection to `:memory:` opens its own database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS players (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                joined_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS games (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                status TEXT NOT NULL DEFAULT 'waiting',
                max_players INTEGER NOT NULL DEFAULT 2,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS game_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_token TEXT NOT NULL UNIQUE,
                player_id INTEGER NOT NULL REFERENCES players(id) ON DELETE CASCADE,
                game_id INTEGER NOT NULL REFERENCES games(id) ON DELETE CASCADE,
                UNIQUE(player_id, game_id)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Players ───────────────────────────────────────────────────────

    pub async fn get_player_by_username(&self, username: &str) -> Result<Option<Player>, sqlx::Error> {
        let row = sqlx::query_as::<_, Player>(
            "SELECT id, username, joined_at FROM players WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn create_player(&self, username: &str) -> Result<Player, sqlx::Error> {
        let row = sqlx::query_as::<_, Player>(
            "INSERT INTO players (username) VALUES (?) RETURNING id, username, joined_at",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn find_or_create_player(&self, username: &str) -> Result<Player, sqlx::Error> {
        match self.get_player_by_username(username).await? {
            Some(player) => Ok(player),
            None => self.create_player(username).await,
        }
    }

    /// Draw random usernames until one is not taken.
    pub async fn generate_unique_username(&self) -> Result<String, sqlx::Error> {
        loop {
            let candidate = random_username(&mut rand::thread_rng());
            if self.get_player_by_username(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
    }

    // ── Games ─────────────────────────────────────────────────────────

    pub async fn create_game(&self, max_players: i64) -> Result<Game, sqlx::Error> {
        let row = sqlx::query_as::<_, Game>(
            "INSERT INTO games (max_players) VALUES (?) RETURNING id, status, max_players, created_at",
        )
        .bind(max_players)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_game(&self, id: i64) -> Result<Option<Game>, sqlx::Error> {
        let row = sqlx::query_as::<_, Game>(
            "SELECT id, status, max_players, created_at FROM games WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// The oldest waiting game that still has a free seat.
    pub async fn find_open_game(&self) -> Result<Option<Game>, sqlx::Error> {
        let row = sqlx::query_as::<_, Game>(
            r#"
            SELECT g.id, g.status, g.max_players, g.created_at
            FROM games g
            WHERE g.status = 'waiting'
              AND (SELECT COUNT(*) FROM game_sessions s WHERE s.game_id = g.id) < g.max_players
            ORDER BY g.id
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Move a game from `from` to `to`. Returns false if it was not in `from`,
    /// so only one caller wins a transition.
    pub async fn transition_game(
        &self,
        id: i64,
        from: GameStatus,
        to: GameStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE games SET status = ? WHERE id = ? AND status = ?")
            .bind(to.as_str())
            .bind(id)
            .bind(from.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    // ── Sessions ──────────────────────────────────────────────────────

    pub async fn get_session(
        &self,
        player_id: i64,
        game_id: i64,
    ) -> Result<Option<GameSession>, sqlx::Error> {
        let row = sqlx::query_as::<_, GameSession>(
            "SELECT id, session_token, player_id, game_id FROM game_sessions WHERE player_id = ? AND game_id = ?",
        )
        .bind(player_id)
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Take a seat in `game_id` while it is still waiting and has room.
    ///
    /// The seat check and the insert are one statement, so concurrent joins
    /// cannot overfill a game. `None` when the game filled up or closed first.
    pub async fn claim_seat(&self, player_id: i64, game_id: i64) -> Result<Option<GameSession>, sqlx::Error> {
        let token = uuid::Uuid::new_v4().to_string();
        let row = sqlx::query_as::<_, GameSession>(
            r#"
            INSERT OR IGNORE INTO game_sessions (session_token, player_id, game_id)
            SELECT ?, ?, g.id
            FROM games g
            WHERE g.id = ?
              AND g.status = 'waiting'
              AND (SELECT COUNT(*) FROM game_sessions s WHERE s.game_id = g.id) < g.max_players
            RETURNING id, session_token, player_id, game_id
            "#,
        )
        .bind(&token)
        .bind(player_id)
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Usernames seated in a game, in join order.
    pub async fn list_game_players(&self, game_id: i64) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT p.username
            FROM game_sessions s
            JOIN players p ON p.id = s.player_id
            WHERE s.game_id = ?
            ORDER BY s.id
            "#,
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Seat a player: find or create the player, pick an open game (or start a
    /// new one) and claim a seat in it unless the player already has one.
    /// A game that fills up in the meantime is skipped for the next open one.
    pub async fn join_game(&self, username: &str, max_players: i64) -> Result<JoinRecord, sqlx::Error> {
        let player = self.find_or_create_player(username).await?;

        loop {
            let game = match self.find_open_game().await? {
                Some(game) => game,
                None => self.create_game(max_players).await?,
            };

            let session = match self.get_session(player.id, game.id).await? {
                Some(session) => Some(session),
                None => self.claim_seat(player.id, game.id).await?,
            };
            let Some(session) = session else {
                tracing::debug!("Game {} filled up before {username} got a seat", game.id);
                continue;
            };

            let players = self.list_game_players(game.id).await?;
            return Ok(JoinRecord {
                player,
                game,
                session,
                players,
            });
        }
    }
}
