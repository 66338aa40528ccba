use serde::{Deserialize, Serialize};

use crate::error::{ParzError, Result};
use crate::format::{DEFAULT_BLOCK_SIZE, MAX_BATCH_SIZE};

/// Tunables for one compress or decompress run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Raw bytes per block. Only used when compressing; decompression takes
    /// block boundaries from the container index.
    pub block_size: u64,
    /// Blocks dispatched together, capped at [`MAX_BATCH_SIZE`].
    pub batch_size: u32,
    /// Block processors allowed to run at the same time.
    pub thread_pool_size: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            batch_size: MAX_BATCH_SIZE,
            thread_pool_size: default_thread_pool_size(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(ParzError::InvalidConfig("block_size must be greater than zero".into()));
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ParzError::InvalidConfig(format!(
                "batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }
        if self.thread_pool_size == 0 {
            return Err(ParzError::InvalidConfig(
                "thread_pool_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// One less than the number of logical CPUs, leaving a core for the
/// scheduler and reassembly; never below one.
pub fn default_thread_pool_size() -> u32 {
    num_cpus::get().saturating_sub(1).max(1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert_eq!(config.block_size, 1024 * 1024);
        assert_eq!(config.batch_size, 64);
        assert!(config.thread_pool_size >= 1);
        config.validate().unwrap();
    }

    #[test]
    fn batch_size_is_capped() {
        let config = PipelineConfig {
            batch_size: 65,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ParzError::InvalidConfig(_))));
    }

    #[test]
    fn zero_values_are_rejected() {
        for config in [
            PipelineConfig {
                block_size: 0,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                batch_size: 0,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                thread_pool_size: 0,
                ..PipelineConfig::default()
            },
        ] {
            assert!(config.validate().is_err(), "{config:?} should be rejected");
        }
    }
}
