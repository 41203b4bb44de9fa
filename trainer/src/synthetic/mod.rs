//! Small self-contained collaborators for running and testing the loop
//! without real data.

mod dataset;
mod loss;
mod model;
mod validator;

pub use dataset::{SyntheticDataset, SyntheticSpec};
pub use loss::{DetectionLoss, LossGains, mean_items};
pub use model::TinyDetector;
pub use validator::LossValidator;
