pub mod cancel;
pub mod codec;
pub mod config;
pub mod container;
pub mod error;
pub mod format;
pub mod gate;
pub mod index;
pub mod pipeline;
pub mod planner;
pub mod processor;
pub mod scheduler;

pub use codec::Codec;
pub use config::PipelineConfig;
pub use error::{ParzError, Result};
pub use format::{HeaderPrefix, FIXED_PREFIX, MAGIC};
pub use index::BlockDescriptor;
pub use pipeline::{outcome_status, run, Command, Pipeline, RunSummary, Status};
