//! In-memory preference store with JSON file overrides

use super::{keys, Preferences};
use crate::error::{ConfigError, Error, Result};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default port of the MCP server agents are pointed at
pub const DEFAULT_MCP_PORT: u16 = 9000;
/// Default registration name of the MCP server
pub const DEFAULT_MCP_NAME: &str = "acpvisor-ide";

/// Preference store with a fixed defaults layer and a mutable overrides layer
#[derive(Debug)]
pub struct PreferenceStore {
    defaults: HashMap<String, Value>,
    overrides: RwLock<BTreeMap<String, Value>>,
}

impl PreferenceStore {
    /// Store with the engine's built-in defaults and no overrides
    pub fn new() -> Self {
        Self::with_defaults(Self::builtin_defaults())
    }

    pub fn with_defaults(defaults: HashMap<String, Value>) -> Self {
        Self {
            defaults,
            overrides: RwLock::new(BTreeMap::new()),
        }
    }

    fn builtin_defaults() -> HashMap<String, Value> {
        let working_dir = dirs::home_dir()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();

        HashMap::from([
            (keys::WORKING_DIR.to_string(), Value::String(working_dir)),
            (keys::FILE_READ.to_string(), Value::Bool(true)),
            (keys::FILE_WRITE.to_string(), Value::Bool(true)),
            (keys::PROMPT_FOR_MCP.to_string(), Value::Bool(true)),
            (keys::MCP_SERVER_ENABLED.to_string(), Value::Bool(false)),
            (
                keys::MCP_SERVER_HTTP_PORT.to_string(),
                Value::String(DEFAULT_MCP_PORT.to_string()),
            ),
            (
                keys::MCP_SERVER_NAME.to_string(),
                Value::String(DEFAULT_MCP_NAME.to_string()),
            ),
        ])
    }

    /// Default location of the overrides file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("acpvisor").join("preferences.json"))
    }

    /// Store with built-in defaults and overrides read from `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let store = Self::new();
        store.load_overrides(path)?;
        Ok(store)
    }

    /// Replace all overrides with the contents of `path`.
    /// A missing file means no overrides.
    pub fn load_overrides(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No preferences file at {:?}, using defaults", path);
            *self.overrides.write() = BTreeMap::new();
            return Ok(());
        }

        let content = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content).map_err(|e| invalid_file(path, e))?;
        let Value::Object(map) = value else {
            return Err(invalid_file(path, "expected a JSON object"));
        };

        info!("Loaded {} preference overrides from {:?}", map.len(), path);
        *self.overrides.write() = map.into_iter().collect();
        Ok(())
    }

    /// Write the overrides layer to `path`, creating parent directories
    pub fn save_overrides(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let map: Map<String, Value> = self
            .overrides
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        std::fs::write(path, serde_json::to_string_pretty(&Value::Object(map))?)?;
        debug!("Saved preferences to {:?}", path);
        Ok(())
    }

    /// Current overrides, sorted by key
    pub fn overrides(&self) -> BTreeMap<String, Value> {
        self.overrides.read().clone()
    }

    /// Keys with a built-in default, sorted
    pub fn known_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.defaults.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Whether `key` is a preference the engine knows about
    pub fn is_known_key(&self, key: &str) -> bool {
        self.defaults.contains_key(key) || keys::startup_command_agent(key).is_some()
    }

    /// Set an override from user input, converting it to the type of the
    /// key's default value.
    pub fn set_from_str(&self, key: &str, raw: &str) -> Result<()> {
        if !self.is_known_key(key) {
            return Err(ConfigError::UnknownKey(key.to_string()).into());
        }

        let value = match self.defaults.get(key) {
            Some(Value::Bool(_)) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Value::Bool(true),
                "false" | "no" | "off" | "0" => Value::Bool(false),
                _ => return Err(wrong_type(key, "boolean")),
            },
            _ if key == keys::MCP_SERVER_HTTP_PORT => {
                let port: u16 = raw.trim().parse().map_err(|_| wrong_type(key, "port number"))?;
                Value::String(port.to_string())
            }
            _ => Value::String(raw.to_string()),
        };

        self.set(key, value);
        Ok(())
    }
}

impl Default for PreferenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Preferences for PreferenceStore {
    fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.overrides.read().get(key) {
            return Some(value.clone());
        }
        self.defaults.get(key).cloned()
    }

    fn default_value(&self, key: &str) -> Option<Value> {
        self.defaults.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) {
        self.overrides.write().insert(key.to_string(), value);
    }

    fn reset(&self, key: &str) {
        self.overrides.write().remove(key);
    }
}

fn invalid_file(path: &Path, reason: impl std::fmt::Display) -> Error {
    Error::Config(ConfigError::InvalidFile {
        path: path.display().to_string(),
        reason: reason.to_string(),
    })
}

fn wrong_type(key: &str, expected: &'static str) -> Error {
    Error::Config(ConfigError::WrongType {
        key: key.to_string(),
        expected,
    })
}
