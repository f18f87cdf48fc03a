//! User and conversation storage using SQLite
//!
//! Conversation history is grouped into windows, one per user per calendar
//! day (UTC). Appending within the same day reuses the day's window;
//! the first message after midnight opens a new one.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use crate::conversation::{Message, Role};

/// Timestamp layout used throughout the store. Lexicographic order matches
/// chronological order, so day-boundary comparisons are plain string
/// comparisons.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How many most-recent day windows are surfaced into generation context.
const DEFAULT_RECENT_WINDOWS: i64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "dark" => Theme::Dark,
            _ => Theme::Light,
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub preferred_name: String,
    pub assistant_name: String,
    pub theme_preference: Theme,
    pub voice_enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a user at signup.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub preferred_name: String,
    pub assistant_name: String,
}

/// Partial profile update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct PreferencesUpdate {
    pub preferred_name: Option<String>,
    pub assistant_name: Option<String>,
    pub theme_preference: Option<Theme>,
    pub voice_enabled: Option<bool>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn create(&self, user: NewUser) -> Result<Uuid, StoreError>;
    async fn update_preferences(
        &self,
        id: Uuid,
        update: PreferencesUpdate,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append messages into the user's current calendar-day window,
    /// creating the window if this is the first write of the day.
    async fn append_and_save(&self, user_id: Uuid, messages: &[Message]) -> Result<(), StoreError>;

    /// Most recent `limit` messages across the most recent day windows,
    /// in chronological order.
    async fn get_recent(&self, user_id: Uuid, limit: usize) -> Result<Vec<Message>, StoreError>;

    async fn clear(&self, user_id: Uuid) -> Result<(), StoreError>;
}

/// SQLite-backed implementation of both stores.
pub struct SqliteStore {
    pool: SqlitePool,
    recent_windows: i64,
}

impl SqliteStore {
    /// Open (or create) a database at the given path.
    pub async fn new(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .map_err(sqlx::Error::from)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            recent_windows: DEFAULT_RECENT_WINDOWS,
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create an in-memory store for testing.
    pub async fn new_in_memory_async() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self {
            pool,
            recent_windows: DEFAULT_RECENT_WINDOWS,
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// Override how many day windows feed `get_recent`.
    pub fn with_recent_windows(mut self, n: i64) -> Self {
        self.recent_windows = n;
        self
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                preferred_name TEXT NOT NULL,
                assistant_name TEXT NOT NULL,
                theme_preference TEXT NOT NULL DEFAULT 'light',
                voice_enabled INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversation_windows (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                last_updated TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                window_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (window_id) REFERENCES conversation_windows(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_windows_user
            ON conversation_windows(user_id, last_updated)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Find or create the window covering today (UTC) for this user.
    async fn today_window(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<i64, StoreError> {
        let start_of_day = format!("{} 00:00:00", now.format("%Y-%m-%d"));
        let now_str = now.format(TIMESTAMP_FORMAT).to_string();

        let existing: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM conversation_windows
            WHERE user_id = ? AND last_updated >= ?
            ORDER BY last_updated DESC
            LIMIT 1
            "#,
        )
        .bind(user_id.to_string())
        .bind(&start_of_day)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((id,)) = existing {
            sqlx::query("UPDATE conversation_windows SET last_updated = ? WHERE id = ?")
                .bind(&now_str)
                .bind(id)
                .execute(&self.pool)
                .await?;
            return Ok(id);
        }

        let result = sqlx::query(
            "INSERT INTO conversation_windows (user_id, last_updated) VALUES (?, ?)",
        )
        .bind(user_id.to_string())
        .bind(&now_str)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }
}

type UserRow = (
    String, // id
    String, // username
    String, // email
    String, // password_hash
    String, // preferred_name
    String, // assistant_name
    String, // theme_preference
    bool,   // voice_enabled
    String, // created_at
);

fn user_from_row(row: UserRow) -> Result<User, StoreError> {
    let (id, username, email, password_hash, preferred_name, assistant_name, theme, voice, created) =
        row;
    let id = Uuid::parse_str(&id).map_err(|e| StoreError::Corrupt(format!("user id: {e}")))?;
    let created_at = NaiveDateTime::parse_from_str(&created, TIMESTAMP_FORMAT)
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now());

    Ok(User {
        id,
        username,
        email,
        password_hash,
        preferred_name,
        assistant_name,
        theme_preference: Theme::from_str_lossy(&theme),
        voice_enabled: voice,
        created_at,
    })
}

const SELECT_USER: &str = "SELECT id, username, email, password_hash, preferred_name, \
     assistant_name, theme_preference, voice_enabled, created_at FROM users";

#[async_trait]
impl UserStore for SqliteStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(&format!("{SELECT_USER} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(user_from_row).transpose()
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(&format!("{SELECT_USER} WHERE username = ?"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.map(user_from_row).transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(&format!("{SELECT_USER} WHERE email = ?"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.map(user_from_row).transpose()
    }

    async fn create(&self, user: NewUser) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let created_at = Utc::now().format(TIMESTAMP_FORMAT).to_string();

        sqlx::query(
            r#"
            INSERT INTO users
                (id, username, email, password_hash, preferred_name, assistant_name,
                 theme_preference, voice_enabled, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 'light', 1, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.preferred_name)
        .bind(&user.assistant_name)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn update_preferences(
        &self,
        id: Uuid,
        update: PreferencesUpdate,
    ) -> Result<(), StoreError> {
        if let Some(name) = update.preferred_name {
            sqlx::query("UPDATE users SET preferred_name = ? WHERE id = ?")
                .bind(name)
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
        }
        if let Some(name) = update.assistant_name {
            sqlx::query("UPDATE users SET assistant_name = ? WHERE id = ?")
                .bind(name)
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
        }
        if let Some(theme) = update.theme_preference {
            sqlx::query("UPDATE users SET theme_preference = ? WHERE id = ?")
                .bind(theme.as_str())
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
        }
        if let Some(voice) = update.voice_enabled {
            sqlx::query("UPDATE users SET voice_enabled = ? WHERE id = ?")
                .bind(voice)
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for SqliteStore {
    async fn append_and_save(&self, user_id: Uuid, messages: &[Message]) -> Result<(), StoreError> {
        if messages.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let window_id = self.today_window(user_id, now).await?;
        let now_str = now.format(TIMESTAMP_FORMAT).to_string();

        for message in messages {
            sqlx::query(
                "INSERT INTO messages (window_id, role, content, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(window_id)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(&now_str)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn get_recent(&self, user_id: Uuid, limit: usize) -> Result<Vec<Message>, StoreError> {
        // Message ids increase with append order, so ordering by id within
        // the recent windows yields chronological order.
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT m.role, m.content
            FROM messages m
            WHERE m.window_id IN (
                SELECT id FROM conversation_windows
                WHERE user_id = ?
                ORDER BY last_updated DESC
                LIMIT ?
            )
            ORDER BY m.id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id.to_string())
        .bind(self.recent_windows)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .rev()
            .map(|(role, content)| Message {
                role: Role::from_str_lossy(&role),
                content,
            })
            .collect())
    }

    async fn clear(&self, user_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            DELETE FROM messages WHERE window_id IN (
                SELECT id FROM conversation_windows WHERE user_id = ?
            )
            "#,
        )
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;

        sqlx::query("DELETE FROM conversation_windows WHERE user_id = ?")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
