//! User Profile Store.
//!
//! Keeps one [`UserProfile`] per user id, creating a default record the first
//! time an unseen id is read.  Every mutation is written through a
//! [`ProfileBackend`] before the call returns.
//!
//! # Backends
//!
//! | backend | strategy |
//! |---------|----------|
//! | [`JsonFileBackend`] | whole-collection rewrite of a single JSON document on every mutation |
//! | [`SqliteBackend`]   | per-key upsert into a `user_profiles` table |
//!
//! The JSON file is the simple default; rewriting the whole collection gets
//! expensive as the user base grows, which is what the SQLite backend is for.
//!
//! # Concurrency
//!
//! The read-merge-write cycle runs under a single async mutex, so concurrent
//! writers are serialised.  Two updates to different fields of the same user
//! are applied in arrival order (last writer wins).
//!
//! # Example
//!
//! ```rust
//! # tokio_test_block(async {
//! use kindred_memory::profile::{ProfileStore, SqliteBackend};
//! use kindred_types::{ProfileUpdate, Tone};
//!
//! let store = ProfileStore::open(SqliteBackend::open_in_memory().unwrap()).await.unwrap();
//! store.update_profile("ada", ProfileUpdate::tone(Tone::Formal)).await.unwrap();
//! assert_eq!(store.get_profile("ada").await.unwrap().preferred_tone, Tone::Formal);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kindred_types::{KindredError, ProfileUpdate, UserProfile};
use parking_lot::Mutex as SyncMutex;
use rusqlite::{Connection, params};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// All profiles keyed by user id.
pub type ProfileMap = BTreeMap<String, UserProfile>;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from profile persistence.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed profile data: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Blocking task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl From<ProfileError> for KindredError {
    fn from(e: ProfileError) -> Self {
        KindredError::Profile(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend trait
// ─────────────────────────────────────────────────────────────────────────────

/// Durable storage contract for the profile store.
///
/// `persist` and `remove` receive both the affected record and the complete
/// post-mutation collection, so a backend can choose between a full rewrite
/// and a per-key write.
#[async_trait]
pub trait ProfileBackend: Send + Sync {
    /// Read every stored profile.  A missing location is an empty collection.
    async fn load_all(&self) -> Result<ProfileMap, ProfileError>;

    /// Make `changed` durable.
    async fn persist(&self, changed: &UserProfile, all: &ProfileMap) -> Result<(), ProfileError>;

    /// Forget `user_id`.
    async fn remove(&self, user_id: &str, all: &ProfileMap) -> Result<(), ProfileError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// JsonFileBackend
// ─────────────────────────────────────────────────────────────────────────────

/// Stores the whole collection as one pretty-printed JSON object.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> ProfileError {
        ProfileError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn ensure_parent(&self) -> Result<(), ProfileError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_err(e))?;
        }
        Ok(())
    }

    async fn write_all(&self, all: &ProfileMap) -> Result<(), ProfileError> {
        self.ensure_parent().await?;
        let raw = serde_json::to_vec_pretty(all)?;
        // Write beside the target and rename so readers never see a torn file.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw)
            .await
            .map_err(|e| self.io_err(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_err(e))?;
        debug!(path = %self.path.display(), profiles = all.len(), "profile collection rewritten");
        Ok(())
    }
}

#[async_trait]
impl ProfileBackend for JsonFileBackend {
    async fn load_all(&self) -> Result<ProfileMap, ProfileError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(ProfileMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no profile file yet; starting empty");
                self.ensure_parent().await?;
                Ok(ProfileMap::new())
            }
            Err(e) => Err(self.io_err(e)),
        }
    }

    async fn persist(&self, _changed: &UserProfile, all: &ProfileMap) -> Result<(), ProfileError> {
        self.write_all(all).await
    }

    async fn remove(&self, _user_id: &str, all: &ProfileMap) -> Result<(), ProfileError> {
        self.write_all(all).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SqliteBackend
// ─────────────────────────────────────────────────────────────────────────────

/// Per-key profile storage in a local SQLite database.
///
/// A single table `user_profiles` is created if it does not exist:
///
/// | column             | type | description                          |
/// |--------------------|------|--------------------------------------|
/// | id                 | TEXT | user id, primary key                 |
/// | name               | TEXT | display name                         |
/// | preferred_tone     | TEXT | lower-case tone label                |
/// | interaction_rhythm | TEXT | lower-case rhythm label              |
/// | do_not_mention     | TEXT | JSON array of topics                 |
/// | last_interaction   | TEXT | RFC-3339 timestamp (UTC)             |
pub struct SqliteBackend {
    conn: Arc<SyncMutex<Connection>>,
}

impl SqliteBackend {
    /// Open (or create) a persistent SQLite database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| ProfileError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, ProfileError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, ProfileError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS user_profiles (
                id                 TEXT NOT NULL PRIMARY KEY,
                name               TEXT NOT NULL,
                preferred_tone     TEXT NOT NULL,
                interaction_rhythm TEXT NOT NULL,
                do_not_mention     TEXT NOT NULL,
                last_interaction   TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Arc::new(SyncMutex::new(conn)),
        })
    }

    fn read_all(conn: &Connection) -> Result<ProfileMap, ProfileError> {
        let mut stmt = conn.prepare(
            "SELECT id, name, preferred_tone, interaction_rhythm, do_not_mention, last_interaction
             FROM user_profiles",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut profiles = ProfileMap::new();
        for row in rows {
            let (id, name, tone, rhythm, topics, ts) = row?;
            let last_interaction = ts.parse::<DateTime<Utc>>().map_err(|e| {
                rusqlite::Error::InvalidColumnType(5, e.to_string(), rusqlite::types::Type::Text)
            })?;
            let profile = UserProfile {
                id: id.clone(),
                name,
                preferred_tone: serde_json::from_value(serde_json::Value::String(tone))?,
                interaction_rhythm: serde_json::from_value(serde_json::Value::String(rhythm))?,
                do_not_mention: serde_json::from_str::<BTreeSet<String>>(&topics)?,
                last_interaction,
            };
            profiles.insert(id, profile);
        }
        Ok(profiles)
    }

    fn upsert(conn: &Connection, p: &UserProfile) -> Result<(), ProfileError> {
        conn.execute(
            "INSERT OR REPLACE INTO user_profiles
                 (id, name, preferred_tone, interaction_rhythm, do_not_mention, last_interaction)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                p.id,
                p.name,
                p.preferred_tone.to_string(),
                p.interaction_rhythm.to_string(),
                serde_json::to_string(&p.do_not_mention)?,
                p.last_interaction.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl ProfileBackend for SqliteBackend {
    async fn load_all(&self) -> Result<ProfileMap, ProfileError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || Self::read_all(&conn.lock())).await?
    }

    async fn persist(&self, changed: &UserProfile, _all: &ProfileMap) -> Result<(), ProfileError> {
        let conn = Arc::clone(&self.conn);
        let profile = changed.clone();
        tokio::task::spawn_blocking(move || Self::upsert(&conn.lock(), &profile)).await?
    }

    async fn remove(&self, user_id: &str, _all: &ProfileMap) -> Result<(), ProfileError> {
        let conn = Arc::clone(&self.conn);
        let id = user_id.to_string();
        tokio::task::spawn_blocking(move || {
            conn.lock()
                .execute("DELETE FROM user_profiles WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ProfileStore
// ─────────────────────────────────────────────────────────────────────────────

/// Process-wide profile store shared by every session.
pub struct ProfileStore {
    backend: Box<dyn ProfileBackend>,
    profiles: Mutex<ProfileMap>,
}

impl ProfileStore {
    /// Load every profile from `backend`.
    ///
    /// # Errors
    ///
    /// Any backend error other than a missing location is returned; callers
    /// treat it as fatal at startup.
    pub async fn open(backend: impl ProfileBackend + 'static) -> Result<Self, ProfileError> {
        let profiles = backend.load_all().await.map_err(|e| {
            error!(error = %e, "failed to load user profiles");
            e
        })?;
        info!(profiles = profiles.len(), "profile store opened");
        Ok(Self {
            backend: Box::new(backend),
            profiles: Mutex::new(profiles),
        })
    }

    /// Shorthand for a [`JsonFileBackend`] at `path`.
    pub async fn open_json(path: impl Into<PathBuf>) -> Result<Self, ProfileError> {
        Self::open(JsonFileBackend::new(path)).await
    }

    /// Return the profile of `user_id`, creating and persisting a default
    /// record when the id has never been seen.
    pub async fn get_profile(&self, user_id: &str) -> Result<UserProfile, ProfileError> {
        let mut profiles = self.profiles.lock().await;
        if let Some(existing) = profiles.get(user_id) {
            return Ok(existing.clone());
        }

        let fresh = UserProfile::new(user_id);
        profiles.insert(user_id.to_string(), fresh.clone());
        if let Err(e) = self.backend.persist(&fresh, &profiles).await {
            profiles.remove(user_id);
            return Err(e);
        }
        debug!(user = %user_id, "created default profile");
        Ok(fresh)
    }

    /// Merge `update` into the profile of `user_id` (creating it if needed),
    /// stamp `last_interaction` with the current time and persist.
    pub async fn update_profile(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> Result<UserProfile, ProfileError> {
        let mut profiles = self.profiles.lock().await;
        let previous = profiles.get(user_id).cloned();

        let mut profile = previous
            .clone()
            .unwrap_or_else(|| UserProfile::new(user_id));
        profile.apply(update);
        profile.last_interaction = Utc::now();
        profiles.insert(user_id.to_string(), profile.clone());

        if let Err(e) = self.backend.persist(&profile, &profiles).await {
            match previous {
                Some(p) => profiles.insert(user_id.to_string(), p),
                None => profiles.remove(user_id),
            };
            return Err(e);
        }
        Ok(profile)
    }

    /// Delete the profile of `user_id`.  Returns `false` if there was none.
    pub async fn delete_profile(&self, user_id: &str) -> Result<bool, ProfileError> {
        let mut profiles = self.profiles.lock().await;
        let Some(removed) = profiles.remove(user_id) else {
            return Ok(false);
        };
        if let Err(e) = self.backend.remove(user_id, &profiles).await {
            profiles.insert(user_id.to_string(), removed);
            return Err(e);
        }
        info!(user = %user_id, "profile deleted");
        Ok(true)
    }

    /// `true` if a profile exists for `user_id`.  Never creates one.
    pub async fn contains(&self, user_id: &str) -> bool {
        self.profiles.lock().await.contains_key(user_id)
    }

    pub async fn len(&self) -> usize {
        self.profiles.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.profiles.lock().await.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
