pub mod arch;
pub mod dataset;
pub mod error;
pub mod optimization;
pub mod params;
pub mod precision;
pub mod schedule;

pub use dataset::Batch;
pub use error::{MlErr, Result};
pub use params::{Param, ParamId, ParamStore};
