//! Engine configuration loader for Cortex.
//!
//! Reads `config.toml` from the data directory (`~/.cortex/` in production)
//! and deserializes it into [`EngineConfig`]. Falls back to the stock engine
//! when the file is missing or malformed.

use std::path::Path;

use cortex_types::config::EngineConfig;

/// File name of the engine configuration inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Load engine configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`EngineConfig::default()`].
/// - If the file exists but fails to read, parse, or validate, logs a warning
///   and returns the default.
/// - Sections and fields left out of the file keep their defaults.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    let config = match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            return EngineConfig::default();
        }
    };

    match config.validate() {
        Ok(()) => config,
        Err(err) => {
            tracing::warn!("Invalid {}: {err}, using defaults", config_path.display());
            EngineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_engine_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.memory.duplicate_threshold, 0.8);
        assert_eq!(config.failure.blocking_threshold, 0.7);
        assert_eq!(config.pipeline.default_limit, 10);
    }

    #[tokio::test]
    async fn load_engine_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
[memory]
decay_interval_hours = 12
deletion_threshold = 0.25

[pipeline]
default_limit = 5
"#,
        )
        .await
        .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.memory.decay_interval_hours, 12);
        assert_eq!(config.memory.deletion_threshold, 0.25);
        assert_eq!(config.memory.decay_rate, 0.05);
        assert_eq!(config.pipeline.default_limit, 5);
        assert_eq!(config.failure.blocking_threshold, 0.7);
    }

    #[tokio::test]
    async fn load_engine_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join(CONFIG_FILE), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.memory.duplicate_threshold, 0.8);
        assert_eq!(config.pipeline.default_min_confidence, 0.3);
    }

    #[tokio::test]
    async fn load_engine_config_wrong_type_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join(CONFIG_FILE),
            "[failure]\nblocking_threshold = \"high\"\n",
        )
        .await
        .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.failure.blocking_threshold, 0.7);
    }

    #[tokio::test]
    async fn load_engine_config_out_of_range_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join(CONFIG_FILE),
            "[memory]\ndecay_rate = -0.1\nmax_confidence = 2.0\n",
        )
        .await
        .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.memory.decay_rate, 0.05);
        assert_eq!(config.memory.max_confidence, 1.0);
    }
}
