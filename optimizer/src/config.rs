//! Process configuration: `conf/config.toml` plus environment overrides,
//! covering exactly the recognized env vars below.

use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub database: DatabaseConfig,
    pub equivalence: EquivalenceConfig,
    pub benchmark: BenchmarkConfig,
    pub mission: MissionConfig,
    pub catalogs: CatalogConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider_url: String,
    pub api_key: String,
    pub model: String,
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub session_pool_size: usize,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EquivalenceConfig {
    pub max_rows: u64,
    pub tolerance: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    pub runs: u32,
    pub warmup: u32,
    pub race: bool,
    /// Two timing runs under the same cache state must differ by less
    /// than this fraction, or the run is retried.
    pub variance_bound: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    pub deadline_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub pathology_profile_path: String,
    pub transform_catalog_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Config {
    /// Loading order: config.toml, then env overrides, then validation —
    /// same three-step shape a layered config loader uses.
    pub fn load() -> Result<Self, anyhow::Error> {
        let mut config = if let Some(path) = Self::find_config_file() {
            Self::from_toml(&path)?
        } else {
            tracing::warn!("configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Recognized env vars, one-for-one with the exhaustive list below.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("APP_SERVER_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = std::env::var("APP_SERVER_PORT") {
            if let Ok(v) = v.parse() {
                self.server.port = v;
            }
        }

        if let Ok(v) = std::env::var("LLM_PROVIDER_URL") {
            self.llm.provider_url = v;
        }
        if let Ok(v) = std::env::var("LLM_API_KEY") {
            self.llm.api_key = v;
        }
        if let Ok(v) = std::env::var("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("LLM_MAX_CONCURRENCY") {
            if let Ok(v) = v.parse() {
                self.llm.max_concurrency = v;
            }
        }

        if let Ok(v) = std::env::var("DB_SESSION_POOL_SIZE") {
            if let Ok(v) = v.parse() {
                self.database.session_pool_size = v;
            }
        }
        if let Ok(v) = std::env::var("DB_IDLE_TIMEOUT_SECS") {
            if let Ok(v) = v.parse() {
                self.database.idle_timeout_secs = v;
            }
        }

        if let Ok(v) = std::env::var("MISSION_DEADLINE_SECS") {
            if let Ok(v) = v.parse() {
                self.mission.deadline_secs = v;
            }
        }

        if let Ok(v) = std::env::var("EQUIV_MAX_ROWS") {
            if let Ok(v) = v.parse() {
                self.equivalence.max_rows = v;
            }
        }
        if let Ok(v) = std::env::var("EQUIV_TOLERANCE") {
            if let Ok(v) = v.parse() {
                self.equivalence.tolerance = v;
            }
        }

        if let Ok(v) = std::env::var("BENCH_RUNS") {
            if let Ok(v) = v.parse() {
                self.benchmark.runs = v;
            }
        }
        if let Ok(v) = std::env::var("BENCH_WARMUP") {
            if let Ok(v) = v.parse() {
                self.benchmark.warmup = v;
            }
        }
        if let Ok(v) = std::env::var("BENCH_RACE") {
            if let Ok(v) = v.parse() {
                self.benchmark.race = v;
            }
        }

        if let Ok(v) = std::env::var("PATHOLOGY_PROFILE_PATH") {
            self.catalogs.pathology_profile_path = v;
        }
        if let Ok(v) = std::env::var("TRANSFORM_CATALOG_PATH") {
            self.catalogs.transform_catalog_path = v;
        }

        if let Ok(v) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("server port cannot be 0");
        }
        if self.database.session_pool_size == 0 {
            anyhow::bail!("database.session_pool_size must be > 0");
        }
        if self.equivalence.max_rows == 0 {
            anyhow::bail!("equivalence.max_rows must be > 0");
        }
        if self.benchmark.runs == 0 {
            anyhow::bail!("benchmark.runs must be > 0");
        }
        // PATHOLOGY_PROFILE_PATH/TRANSFORM_CATALOG_PATH are required.
        if self.catalogs.pathology_profile_path.is_empty() {
            anyhow::bail!("catalogs.pathology_profile_path is required (set PATHOLOGY_PROFILE_PATH)");
        }
        if self.catalogs.transform_catalog_path.is_empty() {
            anyhow::bail!("catalogs.transform_catalog_path is required (set TRANSFORM_CATALOG_PATH)");
        }
        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let candidates = ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];
        candidates.iter().find(|p| Path::new(p).exists()).map(|p| p.to_string())
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider_url: String::new(),
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            max_concurrency: 8,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { session_pool_size: 4, idle_timeout_secs: 900 }
    }
}

impl Default for EquivalenceConfig {
    fn default() -> Self {
        Self { max_rows: 10_000, tolerance: 1e-9 }
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self { runs: 2, warmup: 1, race: false, variance_bound: 0.20 }
    }
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self { deadline_secs: 300 }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self { pathology_profile_path: String::new(), transform_catalog_path: String::new() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,sql_optimizer=debug".to_string(), file: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Exercises every recognized env var in one test so the
    /// `std::env::set_var`/`remove_var` calls for a given key never race
    /// against another test reading the same key.
    #[test]
    fn env_overrides_apply_over_defaults() {
        std::env::set_var("APP_SERVER_HOST", "127.0.0.1");
        std::env::set_var("APP_SERVER_PORT", "9090");
        std::env::set_var("LLM_MODEL", "custom-model");
        std::env::set_var("LLM_MAX_CONCURRENCY", "16");
        std::env::set_var("DB_SESSION_POOL_SIZE", "7");
        std::env::set_var("MISSION_DEADLINE_SECS", "600");
        std::env::set_var("EQUIV_MAX_ROWS", "5000");
        std::env::set_var("BENCH_RACE", "true");
        std::env::set_var("PATHOLOGY_PROFILE_PATH", "/tmp/p.yaml");
        std::env::set_var("TRANSFORM_CATALOG_PATH", "/tmp/t.yaml");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.llm.model, "custom-model");
        assert_eq!(config.llm.max_concurrency, 16);
        assert_eq!(config.database.session_pool_size, 7);
        assert_eq!(config.mission.deadline_secs, 600);
        assert_eq!(config.equivalence.max_rows, 5000);
        assert!(config.benchmark.race);
        assert_eq!(config.catalogs.pathology_profile_path, "/tmp/p.yaml");
        assert_eq!(config.catalogs.transform_catalog_path, "/tmp/t.yaml");

        for key in [
            "APP_SERVER_HOST",
            "APP_SERVER_PORT",
            "LLM_MODEL",
            "LLM_MAX_CONCURRENCY",
            "DB_SESSION_POOL_SIZE",
            "MISSION_DEADLINE_SECS",
            "EQUIV_MAX_ROWS",
            "BENCH_RACE",
            "PATHOLOGY_PROFILE_PATH",
            "TRANSFORM_CATALOG_PATH",
        ] {
            std::env::remove_var(key);
        }
    }

    /// An unparsable override (e.g. a non-numeric port) is ignored rather
    /// than left as a silently-truncated default — the existing value
    /// survives untouched.
    #[test]
    fn unparsable_numeric_override_is_ignored() {
        std::env::set_var("APP_SERVER_PORT", "not-a-number");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.server.port, ServerConfig::default().port);
        std::env::remove_var("APP_SERVER_PORT");
    }

    #[test]
    fn validate_rejects_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        config.catalogs.pathology_profile_path = "p.yaml".to_string();
        config.catalogs.transform_catalog_path = "t.yaml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_catalog_paths() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_a_fully_specified_config() {
        let mut config = Config::default();
        config.catalogs.pathology_profile_path = "p.yaml".to_string();
        config.catalogs.transform_catalog_path = "t.yaml".to_string();
        assert!(config.validate().is_ok());
    }
}
