//! Treecho configuration

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::session::{sanitize_threshold, SessionSettings};

/// Treecho service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreechoConfig {
    /// Service host
    pub host: String,
    /// Service port
    pub port: u16,
    /// Echo configuration
    pub echo: EchoSettings,
    /// Storage configuration
    pub storage: StorageSettings,
}

impl Default for TreechoConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8085,
            echo: EchoSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl TreechoConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self> {
        // Try to load .env file
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();

        // PORT takes priority over TREECHO_PORT
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse::<u16>() {
                cfg.port = p;
            }
        } else if let Ok(port) = std::env::var("TREECHO_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                cfg.port = p;
            }
        }
        if let Ok(host) = std::env::var("TREECHO_HOST") {
            cfg.host = host;
        }

        // Echo settings
        if let Ok(val) = std::env::var("TREECHO_ECHO_ENABLED") {
            if let Ok(v) = val.parse() {
                cfg.echo.enabled = v;
            }
        }
        if let Ok(val) = std::env::var("TREECHO_ECHO_THRESHOLD") {
            if let Ok(v) = val.parse::<f64>() {
                cfg.echo.threshold = sanitize_threshold(v);
            }
        }
        if let Ok(val) = std::env::var("TREECHO_MAX_TREE_DEPTH") {
            if let Ok(v) = val.parse() {
                cfg.echo.max_tree_depth = v;
            }
        }

        // Storage settings
        if let Ok(val) = std::env::var("TREECHO_DATA_DIR") {
            cfg.storage.data_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("TREECHO_AUTOSAVE_EVERY") {
            if let Ok(v) = val.parse() {
                cfg.storage.autosave_every = v;
            }
        }

        Ok(cfg)
    }

    /// Settings applied to every new session
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            echo_enabled: self.echo.enabled,
            echo_threshold: self.echo.threshold,
            max_tree_depth: self.echo.max_tree_depth,
            autosave_every: self.storage.autosave_every,
        }
    }
}

/// Echo advisory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoSettings {
    /// Whether advisories are produced
    pub enabled: bool,
    /// Prediction an advisory must exceed
    pub threshold: f64,
    /// Soft depth cap, reported in summaries
    pub max_tree_depth: usize,
}

impl Default for EchoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: crate::DEFAULT_ECHO_THRESHOLD,
            max_tree_depth: crate::DEFAULT_MAX_TREE_DEPTH,
        }
    }
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Directory holding one document per session
    pub data_dir: PathBuf,
    /// Save a session when its history length is a multiple of this
    pub autosave_every: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/tmp/treecho"),
            autosave_every: crate::DEFAULT_AUTOSAVE_EVERY,
        }
    }
}
