use crate::datasource::QuerySet;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub data_source: DataSourceConfig,
    /// Zero disables the periodic refresh.
    pub refresh_interval_secs: u64,
    pub refresh_on_start: bool,
}

#[derive(Debug, Clone)]
pub enum DataSourceConfig {
    Csv {
        dir: PathBuf,
    },
    Analytics {
        api_url: String,
        api_key: String,
        queries: QuerySet,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .filter(|s| !s.trim().is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = required(&env_map, "DATABASE_PATH")?;

        let data_source = match env_map
            .get("DATA_SOURCE")
            .map(|s| s.as_str())
            .unwrap_or("csv")
        {
            "csv" => DataSourceConfig::Csv {
                dir: PathBuf::from(required(&env_map, "DATA_DIR")?),
            },
            "analytics" => DataSourceConfig::Analytics {
                api_url: required(&env_map, "ANALYTICS_API_URL")?,
                api_key: required(&env_map, "ANALYTICS_API_KEY")?,
                queries: match env_map.get("ANALYTICS_QUERIES_DIR") {
                    Some(dir) => load_queries(Path::new(dir))?,
                    None => QuerySet::default(),
                },
            },
            other => {
                return Err(ConfigError::InvalidValue(
                    "DATA_SOURCE".to_string(),
                    format!("must be csv or analytics, got {}", other),
                ))
            }
        };

        let refresh_interval_secs = env_map
            .get("REFRESH_INTERVAL_SECS")
            .map(|s| s.as_str())
            .unwrap_or("3600")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "REFRESH_INTERVAL_SECS".to_string(),
                    "must be a non-negative integer".to_string(),
                )
            })?;

        let refresh_on_start = match env_map
            .get("REFRESH_ON_START")
            .map(|s| s.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "REFRESH_ON_START".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        Ok(Config {
            port,
            database_path,
            data_source,
            refresh_interval_secs,
            refresh_on_start,
        })
    }
}

/// Read `<table>.sql` overrides. `actions.sql` falls back to the built-in
/// query; a missing enrichment file leaves that table empty.
fn load_queries(dir: &Path) -> Result<QuerySet, ConfigError> {
    let read = |file: &str| -> Result<Option<String>, ConfigError> {
        let path = dir.join(file);
        match std::fs::read_to_string(&path) {
            Ok(sql) => Ok(Some(sql.trim().to_string()).filter(|s| !s.is_empty())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(_) => Err(ConfigError::InvalidValue(
                "ANALYTICS_QUERIES_DIR".to_string(),
                format!("{} unreadable", path.display()),
            )),
        }
    };

    let defaults = QuerySet::default();
    Ok(QuerySet {
        actions: read("actions.sql")?.unwrap_or(defaults.actions),
        holdings: read("holdings.sql")?,
        fund_sources: read("fund_sources.sql")?,
        protocol_interactions: read("protocol_interactions.sql")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map.insert("DATA_DIR".to_string(), "/tmp/data".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.refresh_interval_secs, 3600);
        assert!(config.refresh_on_start);
        match config.data_source {
            DataSourceConfig::Csv { dir } => assert_eq!(dir, PathBuf::from("/tmp/data")),
            other => panic!("Expected csv source, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_data_dir_for_csv() {
        let mut env_map = setup_required_env();
        env_map.remove("DATA_DIR");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATA_DIR"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_analytics_requires_api_key() {
        let mut env_map = setup_required_env();
        env_map.insert("DATA_SOURCE".to_string(), "analytics".to_string());
        env_map.insert(
            "ANALYTICS_API_URL".to_string(),
            "https://api.example.invalid".to_string(),
        );
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "ANALYTICS_API_KEY"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_analytics_query_overrides() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("holdings.sql"), "select 1\n").unwrap();

        let mut env_map = setup_required_env();
        env_map.insert("DATA_SOURCE".to_string(), "analytics".to_string());
        env_map.insert(
            "ANALYTICS_API_URL".to_string(),
            "https://api.example.invalid".to_string(),
        );
        env_map.insert("ANALYTICS_API_KEY".to_string(), "k".to_string());
        env_map.insert(
            "ANALYTICS_QUERIES_DIR".to_string(),
            dir.path().to_string_lossy().to_string(),
        );

        match Config::from_env_map(env_map).unwrap().data_source {
            DataSourceConfig::Analytics { queries, .. } => {
                assert_eq!(queries.holdings.as_deref(), Some("select 1"));
                assert!(queries.fund_sources.is_none());
                assert_eq!(queries.actions, QuerySet::default().actions);
            }
            other => panic!("Expected analytics source, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_data_source() {
        let mut env_map = setup_required_env();
        env_map.insert("DATA_SOURCE".to_string(), "ftp".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "DATA_SOURCE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_refresh_settings() {
        let mut env_map = setup_required_env();
        env_map.insert("REFRESH_INTERVAL_SECS".to_string(), "0".to_string());
        env_map.insert("REFRESH_ON_START".to_string(), "FALSE".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.refresh_interval_secs, 0);
        assert!(!config.refresh_on_start);

        let mut env_map = setup_required_env();
        env_map.insert("REFRESH_ON_START".to_string(), "maybe".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "REFRESH_ON_START"),
            _ => panic!("Expected InvalidValue error"),
        }
    }
}
