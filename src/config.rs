//! Layered settings: built-in defaults, then an optional TOML file, then
//! `GRAPHITE__SECTION__KEY` environment variables.
use ::config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::Result;

pub const DEFAULT_FILE: &str = "graphite.toml";
/// Environment variable naming the settings file to read instead of [`DEFAULT_FILE`].
pub const FILE_VARIABLE: &str = "GRAPHITE_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub backend: Backend,
    /// SQLite file; without one the SQLite backend lives in memory.
    #[serde(default)]
    pub path: Option<PathBuf>,
    pub namespace: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub server: ServerSettings,
    pub log: LogSettings,
}

impl Settings {
    pub fn load() -> Result<Settings> {
        let file = std::env::var(FILE_VARIABLE).unwrap_or_else(|_| DEFAULT_FILE.to_owned());
        Self::load_from(&file)
    }
    /// Reads `file` if it exists; a missing file leaves the defaults in place.
    pub fn load_from(file: &str) -> Result<Settings> {
        let settings = Config::builder()
            .set_default("database.backend", "sqlite")?
            .set_default("database.namespace", ":db")?
            .set_default("server.bind", "127.0.0.1:8470")?
            .set_default("log.filter", "info")?
            .add_source(File::with_name(file).required(false))
            .add_source(Environment::with_prefix("GRAPHITE").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
