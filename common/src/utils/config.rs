use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub http_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Root holding `graphs_config.json` and one working directory per graph.
    #[serde(default)]
    pub graphs_dir: Option<String>,
    /// Working directory of the engine served when no graph is active.
    #[serde(default)]
    pub default_working_dir: Option<String>,
    #[serde(default = "default_max_cached_instances")]
    pub max_cached_instances: usize,
    /// When set, protected routes require this key.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http_port: 0,
            data_dir: default_data_dir(),
            graphs_dir: None,
            default_working_dir: None,
            max_cached_instances: default_max_cached_instances(),
            api_key: None,
        }
    }
}

impl AppConfig {
    pub fn graphs_root(&self) -> PathBuf {
        self.graphs_dir
            .as_ref()
            .map_or_else(|| PathBuf::from(&self.data_dir).join("graphs"), PathBuf::from)
    }

    pub fn default_graph_dir(&self) -> PathBuf {
        self.default_working_dir.as_ref().map_or_else(
            || PathBuf::from(&self.data_dir).join("default_graph"),
            PathBuf::from,
        )
    }
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_max_cached_instances() -> usize {
    8
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    let config: AppConfig = config.try_deserialize()?;
    if config.max_cached_instances == 0 {
        return Err(ConfigError::Message(
            "MAX_CACHED_INSTANCES must be greater than zero".to_string(),
        ));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_directories_follow_data_dir() {
        let config = AppConfig {
            data_dir: "/srv/kg".to_string(),
            ..Default::default()
        };

        assert_eq!(config.graphs_root(), PathBuf::from("/srv/kg/graphs"));
        assert_eq!(
            config.default_graph_dir(),
            PathBuf::from("/srv/kg/default_graph")
        );
    }

    #[test]
    fn test_explicit_directories_win() {
        let config = AppConfig {
            graphs_dir: Some("/mnt/graphs".to_string()),
            default_working_dir: Some("/mnt/rag".to_string()),
            ..Default::default()
        };

        assert_eq!(config.graphs_root(), PathBuf::from("/mnt/graphs"));
        assert_eq!(config.default_graph_dir(), PathBuf::from("/mnt/rag"));
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.data_dir, "./data");
        assert_eq!(config.max_cached_instances, 8);
        assert!(config.api_key.is_none());
    }
}
