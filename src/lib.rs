pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod harness;
pub mod labels;
pub mod math;
pub mod metrics;
pub mod model;
pub mod prelude;
pub mod report;
pub mod split;

pub use config::PipelineConfig;
pub use error::{StockcastError, StockcastResult};
pub use harness::Pipeline;
pub use report::RunReport;
