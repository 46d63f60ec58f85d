pub mod config;
pub mod duck;
pub mod fetch;
pub mod pipeline;
pub mod process;

pub use config::PipelineConfig;
pub use duck::DeathsStore;
pub use pipeline::{run, RunSummary};
