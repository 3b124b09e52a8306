use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Spotify application credentials and OAuth parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    /// Client id from the Spotify developer dashboard.  Left empty until the
    /// operator fills it in; the auth flow refuses to start without it.
    #[serde(default)]
    pub client_id: String,
    /// Redirect URI registered for the app.  Must match the dashboard entry.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// Scopes requested at authorization time, space-joined into the URL.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// User-configurable paths for the persisted queue document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// The queue document.  Defaults to `~/.local/share/likelater/queue.json`.
    #[serde(default = "default_queue_file")]
    pub queue_file: PathBuf,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            redirect_uri: default_redirect_uri(),
            scopes: default_scopes(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            queue_file: default_queue_file(),
        }
    }
}

fn default_redirect_uri() -> String {
    format!("http://127.0.0.1:{}/callback", platform::AUTH_CALLBACK_PORT)
}

fn default_scopes() -> Vec<String> {
    vec![
        "user-read-recently-played".to_string(),
        "user-read-currently-playing".to_string(),
    ]
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    platform::DAEMON_HTTP_PORT
}

fn default_queue_file() -> PathBuf {
    platform::data_dir().join("queue.json")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spotify: SpotifyConfig::default(),
            http: HttpConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.http.enabled);
        assert_eq!(config.http.port, 9787);
        assert_eq!(config.http.bind_address, "127.0.0.1");
        assert!(config.spotify.client_id.is_empty());
        assert_eq!(config.spotify.scopes.len(), 2);
        assert!(config.spotify.redirect_uri.ends_with("/callback"));
        assert!(config.paths.queue_file.ends_with("likelater/queue.json"));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [spotify]
            client_id = "abc123"
            "#,
        )
        .unwrap();
        assert_eq!(config.spotify.client_id, "abc123");
        assert_eq!(config.spotify.scopes.len(), 2);
        assert_eq!(config.http.port, 9787);
    }
}
