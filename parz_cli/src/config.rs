use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::Serialize;

use parz_core::PipelineConfig;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "parz.toml";

/// Prefix of environment variables that override config file values,
/// e.g. `PARZ_BLOCK_SIZE=65536`.
pub const ENV_PREFIX: &str = "PARZ_";

/// Values given on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_pool_size: Option<u32>,
}

/// Build the run configuration, lowest priority first:
/// built-in defaults, TOML file, `PARZ_*` environment, command line.
pub fn load(config_file: Option<&Path>, overrides: &ConfigOverrides) -> anyhow::Result<PipelineConfig> {
    let file = match config_file {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("config file {:?} does not exist", path);
            }
            path.to_path_buf()
        }
        None => PathBuf::from(DEFAULT_CONFIG_FILE),
    };
    tracing::trace!(file = %file.display(), "loading configuration");

    let config: PipelineConfig = Figment::from(Serialized::defaults(PipelineConfig::default()))
        .merge(Toml::file(&file))
        .merge(Env::prefixed(ENV_PREFIX))
        .merge(Serialized::defaults(overrides))
        .extract()
        .with_context(|| format!("reading configuration (file {:?})", file))?;

    config.validate()?;
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("parz.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "block_size = 4096\nbatch_size = 8\n");

        let config = load(Some(&path), &ConfigOverrides::default()).unwrap();
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.thread_pool_size, PipelineConfig::default().thread_pool_size);
    }

    #[test]
    fn command_line_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "block_size = 4096\nthread_pool_size = 2\n");
        let overrides = ConfigOverrides {
            block_size: Some(1024),
            ..ConfigOverrides::default()
        };

        let config = load(Some(&path), &overrides).unwrap();
        assert_eq!(config.block_size, 1024);
        assert_eq!(config.thread_pool_size, 2);
    }

    #[test]
    fn oversized_batch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "batch_size = 100\n");
        let err = load(Some(&path), &ConfigOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("batch_size"), "got: {err}");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(&dir.path().join("absent.toml")), &ConfigOverrides::default()).is_err());
    }
}
