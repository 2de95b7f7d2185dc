//! Configuration Vault – reads/writes `~/.kindred/config.toml`.

use kindred_kernel::DEFAULT_PERSONA_ID;
use kindred_memory::RetentionPolicy;
use kindred_types::KindredError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Which embedding adapter backs semantic intent routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// Keyword heuristic only.
    #[default]
    None,
    Ollama,
}

impl std::fmt::Display for EmbedderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbedderKind::None => write!(f, "none"),
            EmbedderKind::Ollama => write!(f, "ollama"),
        }
    }
}

/// Where user profiles are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileBackendKind {
    /// One JSON document rewritten on every change.
    #[default]
    Json,
    /// Per-user rows in a SQLite database.
    Sqlite,
}

impl ProfileBackendKind {
    fn default_file_name(self) -> &'static str {
        match self {
            ProfileBackendKind::Json => "profiles.json",
            ProfileBackendKind::Sqlite => "profiles.db",
        }
    }
}

impl std::fmt::Display for ProfileBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileBackendKind::Json => write!(f, "json"),
            ProfileBackendKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Persisted user configuration stored in `~/.kindred/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Id under which the REPL user's profile is stored.
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Persona every new session starts in.
    #[serde(default = "default_persona")]
    pub default_persona: String,

    #[serde(default)]
    pub embedder: EmbedderKind,

    /// Base URL of the Ollama instance.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Ollama model used for embeddings (e.g. "nomic-embed-text").
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Per-message embedding budget before falling back to keywords.
    #[serde(default = "default_embedding_timeout_ms")]
    pub embedding_timeout_ms: u64,

    #[serde(default)]
    pub profile_backend: ProfileBackendKind,

    /// Explicit profile location.  Defaults to `~/.kindred/profiles.json`
    /// or `~/.kindred/profiles.db` depending on the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_path: Option<PathBuf>,

    /// Retention buffer eviction constants.
    #[serde(default)]
    pub retention: RetentionPolicy,
}

fn default_user_id() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "local".to_string())
}
fn default_persona() -> String {
    DEFAULT_PERSONA_ID.to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_embedding_timeout_ms() -> u64 {
    2000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            default_persona: default_persona(),
            embedder: EmbedderKind::default(),
            ollama_url: default_ollama_url(),
            embedding_model: default_embedding_model(),
            embedding_timeout_ms: default_embedding_timeout_ms(),
            profile_backend: ProfileBackendKind::default(),
            profile_path: None,
            retention: RetentionPolicy::default(),
        }
    }
}

impl Config {
    /// The profile location, falling back to the backend's default file next
    /// to the config file.
    pub fn resolved_profile_path(&self) -> PathBuf {
        self.resolved_profile_path_in(&kindred_dir())
    }

    fn resolved_profile_path_in(&self, dir: &Path) -> PathBuf {
        self.profile_path
            .clone()
            .unwrap_or_else(|| dir.join(self.profile_backend.default_file_name()))
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn kindred_dir() -> PathBuf {
    kindred_dir_for_home(&home_dir())
}

fn kindred_dir_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".kindred")
}

/// Return the path to `~/.kindred/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    kindred_dir_for_home(home).join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, KindredError> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, KindredError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        KindredError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| KindredError::Config(format!("failed to parse {}: {e}", path.display())))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `KINDRED_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `KINDRED_OLLAMA_URL` | `ollama_url` |
/// | `KINDRED_EMBEDDING_MODEL` | `embedding_model` |
/// | `KINDRED_EMBEDDING_TIMEOUT_MS` | `embedding_timeout_ms` |
/// | `KINDRED_PROFILE_PATH` | `profile_path` |
/// | `KINDRED_DEFAULT_PERSONA` | `default_persona` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("KINDRED_OLLAMA_URL") {
        cfg.ollama_url = v;
    }
    if let Ok(v) = std::env::var("KINDRED_EMBEDDING_MODEL") {
        cfg.embedding_model = v;
    }
    if let Ok(v) = std::env::var("KINDRED_EMBEDDING_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.embedding_timeout_ms = ms;
    }
    if let Ok(v) = std::env::var("KINDRED_PROFILE_PATH")
        && !v.is_empty()
    {
        cfg.profile_path = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("KINDRED_DEFAULT_PERSONA") {
        cfg.default_persona = v;
    }
}

/// Save the config to disk, creating `~/.kindred/` if necessary.
pub fn save(cfg: &Config) -> Result<(), KindredError> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), KindredError> {
    let io_err = |what: &str, e: std::io::Error| KindredError::Config(format!("{what}: {e}"));

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err("failed to create config directory", e))?;
        // Owner-only directory (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| io_err("failed to set config directory permissions", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| KindredError::Config(format!("failed to serialize config: {e}")))?;
    // Owner-only file (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| io_err(&format!("failed to write {}", path.display()), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| io_err(&format!("failed to write {}", path.display()), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.user_id, cfg.user_id);
        assert_eq!(loaded.embedder, EmbedderKind::None);
        assert_eq!(loaded.embedding_timeout_ms, 2000);
        assert_eq!(loaded.profile_backend, ProfileBackendKind::Json);
        assert_eq!(loaded.retention, RetentionPolicy::default());
    }

    #[test]
    fn sparse_file_gets_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "embedder = \"ollama\"\nprofile_backend = \"sqlite\"\n\n[retention]\ndecay_threshold = 0.25\n",
        )
        .unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.embedder, EmbedderKind::Ollama);
        assert_eq!(cfg.profile_backend, ProfileBackendKind::Sqlite);
        assert_eq!(cfg.retention.decay_threshold, 0.25);
        assert_eq!(cfg.retention.max_history, 20);
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "embedder = [").unwrap();
        assert!(matches!(load_from(&path), Err(KindredError::Config(_))));
    }

    #[test]
    fn config_path_points_to_kindred_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".kindred"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn profile_path_defaults_follow_backend() {
        let dir = Path::new("/home/u/.kindred");
        let mut cfg = Config::default();
        assert_eq!(cfg.resolved_profile_path_in(dir), dir.join("profiles.json"));
        cfg.profile_backend = ProfileBackendKind::Sqlite;
        assert_eq!(cfg.resolved_profile_path_in(dir), dir.join("profiles.db"));
        cfg.profile_path = Some(PathBuf::from("/srv/p.db"));
        assert_eq!(cfg.resolved_profile_path_in(dir), PathBuf::from("/srv/p.db"));
    }

    #[test]
    fn apply_env_overrides_changes_ollama_url() {
        // SAFETY: each override test uses its own variable.
        unsafe { std::env::set_var("KINDRED_OLLAMA_URL", "http://gpu-box:11434") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.ollama_url, "http://gpu-box:11434");
        unsafe { std::env::remove_var("KINDRED_OLLAMA_URL") };
    }

    #[test]
    fn apply_env_overrides_changes_embedding_model() {
        // SAFETY: each override test uses its own variable.
        unsafe { std::env::set_var("KINDRED_EMBEDDING_MODEL", "mxbai-embed-large") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.embedding_model, "mxbai-embed-large");
        unsafe { std::env::remove_var("KINDRED_EMBEDDING_MODEL") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_timeout() {
        // SAFETY: each override test uses its own variable.
        unsafe { std::env::set_var("KINDRED_EMBEDDING_TIMEOUT_MS", "soon") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.embedding_timeout_ms, 2000);
        unsafe { std::env::remove_var("KINDRED_EMBEDDING_TIMEOUT_MS") };
    }

    #[test]
    fn apply_env_overrides_changes_profile_path() {
        // SAFETY: each override test uses its own variable.
        unsafe { std::env::set_var("KINDRED_PROFILE_PATH", "/tmp/kindred-profiles.json") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.profile_path, Some(PathBuf::from("/tmp/kindred-profiles.json")));
        unsafe { std::env::remove_var("KINDRED_PROFILE_PATH") };
    }

    #[test]
    fn apply_env_overrides_changes_default_persona() {
        // SAFETY: each override test uses its own variable.
        unsafe { std::env::set_var("KINDRED_DEFAULT_PERSONA", "coach") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.default_persona, "coach");
        unsafe { std::env::remove_var("KINDRED_DEFAULT_PERSONA") };
    }
}
