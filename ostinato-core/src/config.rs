use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    history: HistoryConfig,
    #[serde(default)]
    runtime: RuntimeConfig,
    #[serde(default)]
    engine: EngineConfig,
}

#[derive(Deserialize, Default)]
struct HistoryConfig {
    undo_depth: Option<usize>,
}

#[derive(Deserialize, Default)]
struct RuntimeConfig {
    autosave: Option<bool>,
    autosave_interval_minutes: Option<u64>,
}

#[derive(Deserialize, Default)]
struct EngineConfig {
    startup_timeout_secs: Option<u64>,
    shutdown_timeout_secs: Option<u64>,
}

pub struct Config {
    history: HistoryConfig,
    runtime: RuntimeConfig,
    engine: EngineConfig,
}

impl Config {
    pub fn load() -> Self {
        let mut base: ConfigFile =
            toml::from_str(DEFAULT_CONFIG).expect("Failed to parse embedded config.toml");

        if let Some(path) = user_config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => {
                            merge_history(&mut base.history, user.history);
                            merge_runtime(&mut base.runtime, user.runtime);
                            merge_engine(&mut base.engine, user.engine);
                        }
                        Err(e) => {
                            log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        Config {
            history: base.history,
            runtime: base.runtime,
            engine: base.engine,
        }
    }

    /// Undo history depth (clamped to 1..1024).
    pub fn undo_depth(&self) -> usize {
        self.history.undo_depth.unwrap_or(64).clamp(1, 1024)
    }

    /// Whether periodic autosave is enabled.
    pub fn autosave_enabled(&self) -> bool {
        self.runtime.autosave.unwrap_or(true)
    }

    /// Autosave interval in minutes (clamped to 1..10080).
    pub fn autosave_interval_minutes(&self) -> u64 {
        self.runtime
            .autosave_interval_minutes
            .unwrap_or(2)
            .clamp(1, 10_080)
    }

    pub fn engine_startup_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.startup_timeout_secs.unwrap_or(10).clamp(1, 300))
    }

    pub fn engine_shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.shutdown_timeout_secs.unwrap_or(5).clamp(1, 300))
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ostinato").join("config.toml"))
}

fn merge_history(base: &mut HistoryConfig, user: HistoryConfig) {
    if user.undo_depth.is_some() {
        base.undo_depth = user.undo_depth;
    }
}

fn merge_runtime(base: &mut RuntimeConfig, user: RuntimeConfig) {
    if user.autosave.is_some() {
        base.autosave = user.autosave;
    }
    if user.autosave_interval_minutes.is_some() {
        base.autosave_interval_minutes = user.autosave_interval_minutes;
    }
}

fn merge_engine(base: &mut EngineConfig, user: EngineConfig) {
    if user.startup_timeout_secs.is_some() {
        base.startup_timeout_secs = user.startup_timeout_secs;
    }
    if user.shutdown_timeout_secs.is_some() {
        base.shutdown_timeout_secs = user.shutdown_timeout_secs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_parse() {
        let base: ConfigFile = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(base.history.undo_depth, Some(64));
        assert_eq!(base.runtime.autosave, Some(true));
        assert_eq!(base.engine.startup_timeout_secs, Some(10));
    }

    #[test]
    fn user_values_override_base() {
        let mut base: ConfigFile = toml::from_str(DEFAULT_CONFIG).unwrap();
        let user: ConfigFile = toml::from_str(
            "[history]\nundo_depth = 16\n[engine]\nshutdown_timeout_secs = 30\n",
        )
        .unwrap();
        merge_history(&mut base.history, user.history);
        merge_engine(&mut base.engine, user.engine);
        assert_eq!(base.history.undo_depth, Some(16));
        assert_eq!(base.engine.shutdown_timeout_secs, Some(30));
        assert_eq!(base.engine.startup_timeout_secs, Some(10));
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let config = Config {
            history: HistoryConfig {
                undo_depth: Some(0),
            },
            runtime: RuntimeConfig::default(),
            engine: EngineConfig {
                startup_timeout_secs: Some(0),
                shutdown_timeout_secs: None,
            },
        };
        assert_eq!(config.undo_depth(), 1);
        assert_eq!(config.engine_startup_timeout(), Duration::from_secs(1));
        assert_eq!(config.engine_shutdown_timeout(), Duration::from_secs(5));
    }
}
